//! In-memory tick state: nations, provinces, and the fields the engine mutates.

use crate::building::BuildingInventory;
use crate::resource::{ProvinceField, Resource, ResourceStock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Identifier of a nation (one per player).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NationId(pub i64);

/// Identifier of a province.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProvinceId(pub i64);

impl fmt::Display for NationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProvinceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An integer percentage clamped to `[0, 100]` on construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Percent(u8);

impl Percent {
    pub const MIN: Percent = Percent(0);
    pub const MAX: Percent = Percent(100);
    /// Midpoint at which multipliers centered on 50 are neutral.
    pub const NEUTRAL: Percent = Percent(50);

    pub fn clamped(value: i64) -> Self {
        Percent(value.clamp(0, 100) as u8)
    }

    pub fn value(self) -> i64 {
        i64::from(self.0)
    }
}

impl From<i64> for Percent {
    fn from(v: i64) -> Self {
        Percent::clamped(v)
    }
}

impl From<Percent> for i64 {
    fn from(p: Percent) -> Self {
        p.value()
    }
}

impl Default for Percent {
    fn default() -> Self {
        Percent::NEUTRAL
    }
}

/// The four percentage-bounded fields of a province.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvinceFields {
    pub happiness: Percent,
    pub productivity: Percent,
    pub pollution: Percent,
    pub consumer_spending: Percent,
}

impl ProvinceFields {
    pub fn get(&self, field: ProvinceField) -> Percent {
        match field {
            ProvinceField::Happiness => self.happiness,
            ProvinceField::Productivity => self.productivity,
            ProvinceField::Pollution => self.pollution,
            ProvinceField::ConsumerSpending => self.consumer_spending,
        }
    }

    pub fn set(&mut self, field: ProvinceField, value: i64) {
        let slot = match field {
            ProvinceField::Happiness => &mut self.happiness,
            ProvinceField::Productivity => &mut self.productivity,
            ProvinceField::Pollution => &mut self.pollution,
            ProvinceField::ConsumerSpending => &mut self.consumer_spending,
        };
        *slot = Percent::clamped(value);
    }
}

/// A sub-unit of a nation holding buildings and percentage fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Province {
    pub id: ProvinceId,
    pub nation_id: NationId,
    /// Never negative.
    pub population: i64,
    pub land: i64,
    pub city_count: i64,
    pub fields: ProvinceFields,
    /// Signed running balance, reset to zero at the start of a revenue tick.
    pub energy: i64,
    pub buildings: BuildingInventory,
}

impl Province {
    pub fn new(id: ProvinceId, nation_id: NationId) -> Self {
        Self {
            id,
            nation_id,
            population: 0,
            land: 1,
            city_count: 1,
            fields: ProvinceFields::default(),
            energy: 0,
            buildings: BuildingInventory::default(),
        }
    }
}

/// Small integer code identifying an active policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyCode(pub u8);

impl fmt::Display for PolicyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Active policies of a nation. An absent row means no active policies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicySet(BTreeSet<PolicyCode>);

impl PolicySet {
    pub fn insert(&mut self, code: PolicyCode) {
        self.0.insert(code);
    }

    pub fn contains(&self, code: PolicyCode) -> bool {
        self.0.contains(&code)
    }

    pub fn iter(&self) -> impl Iterator<Item = PolicyCode> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PolicyCode> for PolicySet {
    fn from_iter<I: IntoIterator<Item = PolicyCode>>(iter: I) -> Self {
        PolicySet(iter.into_iter().collect())
    }
}

/// Purchased upgrades of a nation, by catalog name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpgradeSet(BTreeSet<String>);

impl UpgradeSet {
    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for UpgradeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        UpgradeSet(iter.into_iter().map(Into::into).collect())
    }
}

/// A player's nation: treasury, stockpiles, policies, upgrades.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nation {
    pub id: NationId,
    pub money: i64,
    pub resources: ResourceStock,
    pub policies: PolicySet,
    pub upgrades: UpgradeSet,
}

impl Nation {
    /// A nation with no money, no stock, no policies, no upgrades.
    pub fn empty(id: NationId) -> Self {
        Self {
            id,
            money: 0,
            resources: ResourceStock::default(),
            policies: PolicySet::default(),
            upgrades: UpgradeSet::default(),
        }
    }
}

/// Everything one tick reads and mutates, keyed by id. Maps are ordered so
/// processing order is deterministic (ascending province id).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickState {
    pub provinces: BTreeMap<ProvinceId, Province>,
    pub nations: BTreeMap<NationId, Nation>,
}

impl TickState {
    pub fn provinces_of(&self, nation: NationId) -> impl Iterator<Item = &Province> + '_ {
        self.provinces
            .values()
            .filter(move |p| p.nation_id == nation)
    }

    pub fn total_population(&self, nation: NationId) -> i64 {
        self.provinces_of(nation)
            .fold(0i64, |acc, p| acc.saturating_add(p.population))
    }

    /// Nations that own at least one province, ascending.
    pub fn owning_nations(&self) -> BTreeSet<NationId> {
        self.provinces.values().map(|p| p.nation_id).collect()
    }

    /// Check the post-tick invariants that the types do not already enforce.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        for p in self.provinces.values() {
            if p.population < 0 {
                return Err(ValidationError::NegativePopulation(p.id));
            }
        }
        for n in self.nations.values() {
            if n.money < 0 {
                return Err(ValidationError::NegativeMoney(n.id));
            }
            for (resource, amount) in n.resources.iter() {
                if amount < 0 {
                    return Err(ValidationError::NegativeStock(n.id, resource));
                }
            }
        }
        Ok(())
    }
}

/// Violations of tick-state invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("province {0} has negative population")]
    NegativePopulation(ProvinceId),
    #[error("nation {0} has negative money")]
    NegativeMoney(NationId),
    #[error("nation {0} has negative {1}")]
    NegativeStock(NationId, Resource),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn provinces_are_grouped_by_nation() {
        let mut state = TickState::default();
        for (pid, nid, pop) in [(1, 7, 100), (2, 8, 50), (3, 7, 25)] {
            let mut p = Province::new(ProvinceId(pid), NationId(nid));
            p.population = pop;
            state.provinces.insert(p.id, p);
        }
        assert_eq!(state.total_population(NationId(7)), 125);
        assert_eq!(
            state.owning_nations().into_iter().collect::<Vec<_>>(),
            vec![NationId(7), NationId(8)]
        );
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn invariant_check_flags_negative_money() {
        let mut state = TickState::default();
        let mut n = Nation::empty(NationId(1));
        n.money = -1;
        state.nations.insert(n.id, n);
        assert_eq!(
            state.check_invariants(),
            Err(ValidationError::NegativeMoney(NationId(1)))
        );
    }

    proptest! {
        #[test]
        fn percent_is_always_in_range(v in any::<i64>()) {
            let p = Percent::clamped(v);
            prop_assert!((0..=100).contains(&p.value()));
        }

        #[test]
        fn field_writes_clamp(v in -1_000i64..1_000) {
            let mut fields = ProvinceFields::default();
            fields.set(ProvinceField::Pollution, v);
            prop_assert_eq!(fields.pollution.value(), v.clamp(0, 100));
        }
    }
}
