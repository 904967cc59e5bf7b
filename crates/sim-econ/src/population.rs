//! Population growth: carrying capacity from cities, land, happiness, and
//! pollution; growth gated by ration coverage.

use crate::modifiers::Modifiers;
use serde::Serialize;
use sim_core::{Catalog, Constants, Nation, NationId, Percent, Province, Resource, TickState};
use std::collections::BTreeMap;
use tracing::trace;

/// Centered `(value - 50) / 50`, in `[-1, 1]`.
fn centered(p: Percent) -> f64 {
    (p.value() - Percent::NEUTRAL.value()) as f64 / Percent::NEUTRAL.value() as f64
}

/// Carrying capacity of a province. Never below the base capacity.
pub fn max_population(constants: &Constants, province: &Province) -> i64 {
    let base = constants.default_max_population;
    let raw = base
        .saturating_add(province.city_count.max(0).saturating_mul(constants.city_max_population_addition))
        .saturating_add(province.land.max(0).saturating_mul(constants.land_max_population_addition));
    let multiplier = 1.0
        + centered(province.fields.happiness) * constants.happiness_growth_multiplier
        + centered(province.fields.pollution) * constants.pollution_growth_multiplier;
    let scaled = (raw as f64 * multiplier).floor();
    if scaled >= i64::MAX as f64 {
        return i64::MAX;
    }
    (scaled as i64).max(base)
}

/// Rations a province needs per tick. At least one.
pub fn rations_needed(constants: &Constants, population: i64) -> i64 {
    (population.max(0) / constants.rations_per).max(1)
}

/// Rations a whole nation consumes per tick at full coverage.
pub fn nation_rations_needed(constants: &Constants, state: &TickState, nation: NationId) -> i64 {
    state.total_population(nation) / constants.rations_per
}

/// Result of growing one province.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Growth {
    pub population: i64,
    pub max_population: i64,
    pub rations_used: i64,
}

/// Grow one province with `rations` available to it.
///
/// Growth is a share of capacity scaled by ration coverage (capped at full)
/// and the nation's growth boost. Capacity sets the rate, not a ceiling.
pub fn grow(constants: &Constants, province: &Province, rations: i64, boost: f64) -> Growth {
    let max_pop = max_population(constants, province);
    let needed = rations_needed(constants, province.population);
    let rations = rations.max(0);
    let coverage = (rations as f64 / needed as f64).min(1.0);
    let rate = constants.max_growth_rate_percent * coverage;
    let growth = (max_pop as f64 / 100.0 * rate * boost).round();
    let growth = if growth.is_finite() { growth.max(0.0) as i64 } else { 0 };
    let population = province.population.saturating_add(growth).max(0);
    Growth {
        population,
        max_population: max_pop,
        rations_used: needed.min(rations),
    }
}

/// Totals for one growth pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GrowthReport {
    pub provinces: usize,
    pub population_added: i64,
    pub rations_consumed: i64,
}

/// Grow every province. Provinces of one nation draw on its ration stock in
/// ascending id order.
pub fn run_population_growth(catalog: &Catalog, state: &mut TickState) -> GrowthReport {
    let TickState { provinces, nations } = state;
    let mut report = GrowthReport::default();
    let mut boosts: BTreeMap<NationId, f64> = BTreeMap::new();

    for province in provinces.values_mut() {
        let nation = nations
            .entry(province.nation_id)
            .or_insert_with(|| Nation::empty(province.nation_id));
        let boost = *boosts.entry(nation.id).or_insert_with(|| {
            Modifiers::for_nation(catalog, &nation.policies, &nation.upgrades).population_growth()
        });
        let available = nation.resources.get(Resource::Rations);
        let growth = grow(&catalog.constants, province, available, boost);
        nation.resources.take_up_to(Resource::Rations, growth.rations_used);
        trace!(province = %province.id, from = province.population, to = growth.population, "grew");

        report.provinces += 1;
        report.population_added += growth.population - province.population;
        report.rations_consumed += growth.rations_used;
        province.population = growth.population;
    }
    report
}
