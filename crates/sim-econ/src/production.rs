//! Province revenue: runs every building of every province in a fixed order,
//! charging upkeep and inputs and crediting outputs and effects.

use crate::effects::ProvinceLedger;
use crate::modifiers::Modifiers;
use crate::EconError;
use serde::Serialize;
use sim_core::{
    BuildingKind, Catalog, Constants, Nation, NationId, Percent, ProvinceField, Resource,
    ResourceStock, TickState,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// What a building was short of when it could not run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shortfall {
    Money { needed: i64, available: i64 },
    Energy { needed: i64, available: i64 },
    Resource { resource: Resource, needed: i64, available: i64 },
}

/// Outcome of the pre-run affordability check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Affordability {
    Affordable,
    Insufficient(Shortfall),
}

impl Affordability {
    pub fn is_affordable(&self) -> bool {
        matches!(self, Affordability::Affordable)
    }
}

/// Concrete per-tick amounts for `count` buildings of one kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildingPlan {
    pub kind: Option<BuildingKind>,
    pub count: i64,
    pub upkeep: i64,
    pub energy_draw: i64,
    pub energy_output: i64,
    pub inputs: Vec<(Resource, i64)>,
    pub outputs: Vec<(Resource, i64)>,
    pub province_outputs: Vec<(ProvinceField, i64)>,
    /// Signed percentage deltas.
    pub effects: Vec<(ProvinceField, i64)>,
}

/// Upkeep and output multiplier from productivity, neutral at 50.
pub fn productivity_multiplier(constants: &Constants, productivity: Percent) -> f64 {
    1.0 + (productivity.value() - Percent::NEUTRAL.value()) as f64
        * constants.productivity_production_multiplier
}

fn ceil_amount(kind: BuildingKind, what: &'static str, raw: f64) -> Result<i64, EconError> {
    if !raw.is_finite() || raw >= i64::MAX as f64 {
        return Err(EconError::Overflow { kind, what });
    }
    Ok(raw.ceil().max(0.0) as i64)
}

/// Resolve the spec, modifiers, and province context into concrete amounts.
pub fn plan_building(
    catalog: &Catalog,
    mods: &Modifiers<'_>,
    kind: BuildingKind,
    count: i64,
    land: i64,
    productivity: Percent,
) -> Result<BuildingPlan, EconError> {
    let spec = catalog
        .building(kind)
        .ok_or(EconError::MissingSpec(kind))?;
    let category = spec.category;
    let n = count as f64;
    let mut plan = BuildingPlan {
        kind: Some(kind),
        count,
        ..BuildingPlan::default()
    };

    let productivity = productivity_multiplier(&catalog.constants, productivity);
    plan.upkeep = ceil_amount(
        kind,
        "upkeep",
        spec.money as f64 * n * productivity * mods.upkeep(kind, category),
    )?;
    if spec.energy_consumer {
        plan.energy_draw = count;
    }
    if spec.is_energy_producer() {
        let per = spec.energy as f64 + mods.energy_bonus(kind, category);
        plan.energy_output = ceil_amount(kind, "energy", per * n)?;
    }

    let input_factor = mods.input(kind, category);
    for (resource, amount) in &spec.minus {
        let needed = ceil_amount(kind, "input", *amount as f64 * n * input_factor)?;
        plan.inputs.push((*resource, needed));
    }

    let multiplier = productivity + mods.output_bonus(kind, category);
    let land_extra = if spec.land_bonus {
        (land.max(0) as f64 * catalog.constants.land_farm_production_addition).floor()
    } else {
        0.0
    };
    for (resource, amount) in &spec.plus {
        let made = ceil_amount(kind, "output", (*amount as f64 + land_extra) * n * multiplier)?;
        plan.outputs.push((*resource, made));
    }
    for (field, amount) in &spec.plus_province {
        let made = ceil_amount(kind, "output", *amount as f64 * n * multiplier)?;
        plan.province_outputs.push((*field, made));
    }

    for (field, amount) in &spec.eff {
        let factor = mods.effect(kind, category, *field, true);
        let delta = ceil_amount(kind, "effect", *amount as f64 * n * factor)?;
        plan.effects.push((*field, delta));
    }
    for (field, amount) in &spec.effminus {
        let factor = mods.effect(kind, category, *field, false);
        let delta = ceil_amount(kind, "effect", *amount as f64 * n * factor)?;
        plan.effects.push((*field, -delta));
    }
    Ok(plan)
}

/// Check money, then energy, then each input. The first failure wins.
pub fn check_affordability(
    plan: &BuildingPlan,
    money: i64,
    stock: &ResourceStock,
    ledger: &ProvinceLedger,
) -> Affordability {
    if money < plan.upkeep {
        return Affordability::Insufficient(Shortfall::Money {
            needed: plan.upkeep,
            available: money,
        });
    }
    if plan.energy_draw > 0 && !ledger.can_draw_energy(plan.energy_draw) {
        return Affordability::Insufficient(Shortfall::Energy {
            needed: plan.energy_draw,
            available: ledger.energy(),
        });
    }
    for (resource, needed) in &plan.inputs {
        if !stock.covers(*resource, *needed) {
            return Affordability::Insufficient(Shortfall::Resource {
                resource: *resource,
                needed: *needed,
                available: stock.get(*resource),
            });
        }
    }
    Affordability::Affordable
}

fn apply_plan(
    plan: &BuildingPlan,
    nation: &mut Nation,
    ledger: &mut ProvinceLedger,
    report: &mut RevenueReport,
) {
    nation.money -= plan.upkeep;
    report.upkeep_paid = report.upkeep_paid.saturating_add(plan.upkeep);
    if plan.energy_draw > 0 {
        ledger.draw_energy(plan.energy_draw);
    }
    ledger.produce_energy(plan.energy_output);
    for (resource, amount) in &plan.inputs {
        nation.resources.try_take(*resource, *amount);
        tally(&mut report.consumed, *resource, *amount);
    }
    for (resource, amount) in &plan.outputs {
        nation.resources.add(*resource, *amount);
        tally(&mut report.produced, *resource, *amount);
    }
    for (field, amount) in &plan.province_outputs {
        ledger.add(*field, *amount);
    }
    for (field, delta) in &plan.effects {
        ledger.add(*field, *delta);
    }
}

fn tally(map: &mut BTreeMap<Resource, i64>, resource: Resource, amount: i64) {
    let slot = map.entry(resource).or_insert(0);
    *slot = slot.saturating_add(amount);
}

/// Totals for one revenue pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RevenueReport {
    pub provinces: usize,
    pub buildings_run: usize,
    pub buildings_skipped: usize,
    pub anomalies: usize,
    pub upkeep_paid: i64,
    pub produced: BTreeMap<Resource, i64>,
    pub consumed: BTreeMap<Resource, i64>,
}

/// Run one revenue tick over every province in ascending id order.
///
/// Provinces of the same nation draw on one shared treasury and stockpile, so
/// an earlier province can starve a later one. Buildings that cannot afford
/// their costs are skipped whole; anomalies are logged and contribute nothing.
pub fn run_province_revenue(catalog: &Catalog, state: &mut TickState) -> RevenueReport {
    let TickState { provinces, nations } = state;
    let mut report = RevenueReport::default();
    let mut mods_by_nation: BTreeMap<NationId, Modifiers<'_>> = BTreeMap::new();

    for province in provinces.values_mut() {
        report.provinces += 1;
        let nation = nations
            .entry(province.nation_id)
            .or_insert_with(|| Nation::empty(province.nation_id));
        let mods = mods_by_nation
            .entry(nation.id)
            .or_insert_with(|| Modifiers::for_nation(catalog, &nation.policies, &nation.upgrades));

        let mut ledger = ProvinceLedger::seed(province);
        let productivity = province.fields.productivity;
        for (kind, count) in province.buildings.occupied() {
            let plan = match plan_building(catalog, mods, kind, count, province.land, productivity)
            {
                Ok(plan) => plan,
                Err(err) => {
                    warn!(province = %province.id, building = %kind, error = %err, "building skipped");
                    report.anomalies += 1;
                    continue;
                }
            };
            match check_affordability(&plan, nation.money, &nation.resources, &ledger) {
                Affordability::Affordable => {
                    apply_plan(&plan, nation, &mut ledger, &mut report);
                    report.buildings_run += 1;
                }
                Affordability::Insufficient(shortfall) => {
                    debug!(province = %province.id, building = %kind, ?shortfall, "cannot afford");
                    report.buildings_skipped += 1;
                }
            }
        }

        let productivity = mods.productivity();
        if productivity != 1.0 {
            ledger.scale(ProvinceField::Productivity, productivity);
        }
        let happiness = mods.happiness();
        if happiness != 1.0 {
            ledger.scale(ProvinceField::Happiness, happiness);
        }
        ledger.write_back(province);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_core::{PolicyCode, Province, ProvinceId, UpgradeSet};

    fn catalog() -> Catalog {
        Catalog::standard().unwrap()
    }

    fn single(money: i64, setup: impl FnOnce(&mut Province, &mut Nation)) -> TickState {
        let mut state = TickState::default();
        let mut nation = Nation::empty(NationId(1));
        nation.money = money;
        let mut province = Province::new(ProvinceId(1), NationId(1));
        setup(&mut province, &mut nation);
        state.nations.insert(nation.id, nation);
        state.provinces.insert(province.id, province);
        state
    }

    #[test]
    fn productivity_multiplier_is_neutral_at_fifty() {
        let c = catalog().constants;
        assert_eq!(productivity_multiplier(&c, Percent::NEUTRAL), 1.0);
        assert!(productivity_multiplier(&c, Percent::MAX) > 1.0);
        assert!(productivity_multiplier(&c, Percent::MIN) < 1.0);
    }

    #[test]
    fn farm_pays_upkeep_and_yields_with_land_bonus() {
        let catalog = catalog();
        let mut state = single(10_000, |p, _| {
            p.land = 4;
            p.buildings.set(BuildingKind::Farms, 2);
        });
        let report = run_province_revenue(&catalog, &mut state);
        let nation = &state.nations[&NationId(1)];
        // (12 + floor(4 * 1.5)) * 2 at neutral productivity
        assert_eq!(nation.resources.get(Resource::Rations), 36);
        assert_eq!(nation.money, 10_000 - 6_000);
        assert_eq!(report.buildings_run, 1);
        assert_eq!(state.provinces[&ProvinceId(1)].fields.pollution.value(), 52);
    }

    #[test]
    fn productivity_scales_upkeep_and_output_alike() {
        let catalog = catalog();
        let mut state = single(1_000_000, |p, _| {
            p.fields.productivity = Percent::MAX;
            p.buildings.set(BuildingKind::Farms, 1);
        });
        let report = run_province_revenue(&catalog, &mut state);
        // multiplier 1 + 50 * 0.009 = 1.45
        assert_eq!(report.upkeep_paid, 4_350);
        assert_eq!(state.nations[&NationId(1)].money, 1_000_000 - 4_350);
        // ceil((12 + floor(1 * 1.5)) * 1.45)
        assert_eq!(state.nations[&NationId(1)].resources.get(Resource::Rations), 19);

        let mut state = single(1_000_000, |p, _| {
            p.fields.productivity = Percent::MIN;
            p.buildings.set(BuildingKind::Farms, 1);
        });
        let report = run_province_revenue(&catalog, &mut state);
        assert_eq!(report.upkeep_paid, 1_650);
    }

    #[test]
    fn money_shortfall_skips_the_building_entirely() {
        let catalog = catalog();
        let mut state = single(5_999, |p, _| p.buildings.set(BuildingKind::Farms, 2));
        let report = run_province_revenue(&catalog, &mut state);
        let nation = &state.nations[&NationId(1)];
        assert_eq!(nation.money, 5_999);
        assert_eq!(nation.resources.get(Resource::Rations), 0);
        assert_eq!(report.buildings_skipped, 1);
        assert_eq!(state.provinces[&ProvinceId(1)].fields.pollution.value(), 50);
    }

    #[test]
    fn consumers_need_energy_produced_earlier_in_the_same_province() {
        let catalog = catalog();
        let mut state = single(1_000_000, |p, n| {
            p.buildings.set(BuildingKind::SolarFields, 1);
            p.buildings.set(BuildingKind::GeneralStores, 4);
            n.resources.set(Resource::Coal, 0);
        });
        let report = run_province_revenue(&catalog, &mut state);
        // 3 energy for 4 stores: stores skip, energy stays at 3
        assert_eq!(report.buildings_skipped, 1);
        assert_eq!(state.provinces[&ProvinceId(1)].energy, 3);
        assert_eq!(state.nations[&NationId(1)].resources.get(Resource::ConsumerGoods), 0);
    }

    #[test]
    fn energy_is_recomputed_from_zero_each_tick() {
        let catalog = catalog();
        let mut state = single(1_000_000, |p, _| {
            p.energy = 500;
            p.buildings.set(BuildingKind::SolarFields, 1);
        });
        run_province_revenue(&catalog, &mut state);
        assert_eq!(state.provinces[&ProvinceId(1)].energy, 3);
    }

    #[test]
    fn input_shortfall_leaves_stock_untouched() {
        let catalog = catalog();
        let mut state = single(1_000_000, |p, n| {
            p.buildings.set(BuildingKind::HydroDams, 1);
            p.buildings.set(BuildingKind::ComponentFactories, 1);
            n.resources.set(Resource::Copper, 100);
            n.resources.set(Resource::Steel, 100);
            n.resources.set(Resource::Lead, 19);
        });
        run_province_revenue(&catalog, &mut state);
        let stock = &state.nations[&NationId(1)].resources;
        assert_eq!(stock.get(Resource::Copper), 100);
        assert_eq!(stock.get(Resource::Lead), 19);
        assert_eq!(stock.get(Resource::Components), 0);
    }

    #[test]
    fn provinces_share_one_treasury_in_id_order() {
        let catalog = catalog();
        let mut state = single(3_000, |p, _| p.buildings.set(BuildingKind::Farms, 1));
        let mut second = Province::new(ProvinceId(2), NationId(1));
        second.buildings.set(BuildingKind::Farms, 1);
        state.provinces.insert(second.id, second);
        let report = run_province_revenue(&catalog, &mut state);
        assert_eq!(report.buildings_run, 1);
        assert_eq!(report.buildings_skipped, 1);
        assert_eq!(state.nations[&NationId(1)].money, 0);
    }

    #[test]
    fn missing_spec_is_an_anomaly_not_a_failure() {
        let mut catalog = catalog();
        catalog.buildings.remove(&BuildingKind::Farms);
        let mut state = single(10_000, |p, _| {
            p.buildings.set(BuildingKind::Farms, 1);
            p.buildings.set(BuildingKind::CoalMines, 1);
        });
        let report = run_province_revenue(&catalog, &mut state);
        assert_eq!(report.anomalies, 1);
        assert_eq!(report.buildings_run, 1);
        assert_eq!(state.nations[&NationId(1)].resources.get(Resource::Coal), 31);
    }

    #[test]
    fn upgrades_reduce_inputs_and_policies_scale_fields() {
        let catalog = catalog();
        let mut state = single(1_000_000, |p, n| {
            p.fields.happiness = Percent::clamped(100);
            p.buildings.set(BuildingKind::HydroDams, 1);
            p.buildings.set(BuildingKind::SteelMills, 1);
            n.resources.set(Resource::Coal, 100);
            n.resources.set(Resource::Iron, 100);
            n.upgrades = ["larger_forges"].into_iter().collect::<UpgradeSet>();
            n.policies.insert(PolicyCode(2));
        });
        run_province_revenue(&catalog, &mut state);
        let stock = &state.nations[&NationId(1)].resources;
        // ceil(35 * 0.7) = 25
        assert_eq!(stock.get(Resource::Coal), 75);
        assert_eq!(stock.get(Resource::Steel), 15);
        assert_eq!(state.provinces[&ProvinceId(1)].fields.happiness.value(), 89);
    }

    #[test]
    fn nation_without_a_row_is_treated_as_empty() {
        let catalog = catalog();
        let mut state = TickState::default();
        let mut p = Province::new(ProvinceId(3), NationId(9));
        p.buildings.set(BuildingKind::SolarFields, 2);
        state.provinces.insert(p.id, p);
        let report = run_province_revenue(&catalog, &mut state);
        assert_eq!(report.buildings_skipped, 1);
        assert_eq!(state.nations[&NationId(9)].money, 0);
    }

    proptest! {
        #[test]
        fn revenue_never_breaks_invariants(
            money in 0i64..5_000_000,
            counts in proptest::collection::vec(0i64..6, BuildingKind::COUNT),
            stock in proptest::collection::vec(0i64..500, Resource::COUNT),
            fields in proptest::array::uniform4(0i64..=100),
        ) {
            let catalog = catalog();
            let mut state = single(money, |p, n| {
                for (kind, c) in BuildingKind::ALL.iter().zip(&counts) {
                    p.buildings.set(*kind, *c);
                }
                for (r, a) in Resource::ALL.iter().zip(&stock) {
                    n.resources.set(*r, *a);
                }
                for (f, v) in ProvinceField::ALL.iter().zip(fields) {
                    p.fields.set(*f, v);
                }
            });
            run_province_revenue(&catalog, &mut state);
            prop_assert!(state.check_invariants().is_ok());
            prop_assert!(state.provinces[&ProvinceId(1)].energy >= 0);
        }
    }
}
