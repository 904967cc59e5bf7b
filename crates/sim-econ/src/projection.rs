//! Read-only revenue projection: runs one revenue pass and one tax pass on a
//! copy of a nation's state and reports what would change.

use crate::production::run_province_revenue;
use crate::tax::run_tax_income;
use serde::Serialize;
use sim_core::{Catalog, Nation, NationId, Resource, TickState};
use std::collections::BTreeMap;

/// What the next revenue and tax ticks would do for one nation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RevenueProjection {
    pub nation: i64,
    /// Produced per resource before any consumption.
    pub gross: BTreeMap<Resource, i64>,
    /// Stock change per resource after production, inputs, and tax consumption.
    pub net: BTreeMap<Resource, i64>,
    pub upkeep: i64,
    pub tax_income: i64,
    pub net_money: i64,
}

/// Project one nation's next ticks. `None` if the state knows nothing about it.
pub fn project_revenue(
    catalog: &Catalog,
    state: &TickState,
    nation: NationId,
) -> Option<RevenueProjection> {
    let mut scratch = TickState::default();
    for p in state.provinces_of(nation) {
        scratch.provinces.insert(p.id, p.clone());
    }
    match state.nations.get(&nation) {
        Some(n) => {
            scratch.nations.insert(nation, n.clone());
        }
        None if scratch.provinces.is_empty() => return None,
        None => {
            scratch.nations.insert(nation, Nation::empty(nation));
        }
    }
    let before = scratch.nations.get(&nation)?.clone();

    let revenue = run_province_revenue(catalog, &mut scratch);
    let tax = run_tax_income(catalog, &mut scratch);
    let after = scratch.nations.get(&nation)?;

    let net = Resource::ALL
        .iter()
        .map(|r| (*r, after.resources.get(*r) - before.resources.get(*r)))
        .filter(|(_, delta)| *delta != 0)
        .collect();
    Some(RevenueProjection {
        nation: nation.0,
        gross: revenue.produced,
        net,
        upkeep: revenue.upkeep_paid,
        tax_income: tax.total_income,
        net_money: after.money - before.money,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{BuildingKind, Province, ProvinceId};

    #[test]
    fn projection_does_not_touch_the_source_state() {
        let catalog = Catalog::standard().unwrap();
        let mut state = TickState::default();
        let mut p = Province::new(ProvinceId(1), NationId(1));
        p.population = 800_000;
        p.buildings.set(BuildingKind::Farms, 1);
        p.buildings.set(BuildingKind::HydroDams, 1);
        p.buildings.set(BuildingKind::GeneralStores, 1);
        state.provinces.insert(p.id, p);
        let mut n = Nation::empty(NationId(1));
        n.money = 100_000;
        state.nations.insert(n.id, n);
        let snapshot = state.clone();

        let proj = project_revenue(&catalog, &state, NationId(1)).unwrap();
        assert_eq!(state, snapshot);
        assert_eq!(proj.upkeep, 3_000 + 24_000 + 35_000);
        assert_eq!(proj.gross[&Resource::Rations], 13);
        assert_eq!(proj.gross[&Resource::ConsumerGoods], 8);
        // 10 goods demanded, 8 available: consumed by the tax pass
        assert_eq!(proj.net.get(&Resource::ConsumerGoods), None);
        assert_eq!(proj.tax_income, 40_000 * 14 / 10);
        assert_eq!(proj.net_money, proj.tax_income - proj.upkeep);
    }

    #[test]
    fn unknown_nation_has_no_projection() {
        let catalog = Catalog::standard().unwrap();
        assert!(project_revenue(&catalog, &TickState::default(), NationId(3)).is_none());
    }
}
