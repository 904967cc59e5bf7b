//! Nation-level resources and province-level percentage fields.

use crate::names::name_enum;
use serde::{Deserialize, Serialize};

/// A stockpiled resource held by a nation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Resource {
    Rations,
    Oil,
    Coal,
    Uranium,
    Bauxite,
    Iron,
    Lead,
    Copper,
    Lumber,
    Components,
    Steel,
    ConsumerGoods,
    Aluminium,
    Gasoline,
    Ammunition,
}

name_enum!(Resource, "resource", {
    Rations => "rations",
    Oil => "oil",
    Coal => "coal",
    Uranium => "uranium",
    Bauxite => "bauxite",
    Iron => "iron",
    Lead => "lead",
    Copper => "copper",
    Lumber => "lumber",
    Components => "components",
    Steel => "steel",
    ConsumerGoods => "consumer_goods",
    Aluminium => "aluminium",
    Gasoline => "gasoline",
    Ammunition => "ammunition",
});

/// A percentage-bounded province field. Values always live in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ProvinceField {
    Happiness,
    Productivity,
    Pollution,
    ConsumerSpending,
}

name_enum!(ProvinceField, "province field", {
    Happiness => "happiness",
    Productivity => "productivity",
    Pollution => "pollution",
    ConsumerSpending => "consumer_spending",
});

/// Per-nation resource amounts, indexed by [`Resource`]. Amounts never go
/// below zero: writes clamp and withdrawals are all-or-nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceStock {
    amounts: [i64; Resource::COUNT],
}

impl Default for ResourceStock {
    fn default() -> Self {
        Self {
            amounts: [0; Resource::COUNT],
        }
    }
}

impl ResourceStock {
    pub fn get(&self, resource: Resource) -> i64 {
        self.amounts[resource.index()]
    }

    /// Overwrite an amount; negative input is stored as zero.
    pub fn set(&mut self, resource: Resource, amount: i64) {
        self.amounts[resource.index()] = amount.max(0);
    }

    /// Add a non-negative amount, saturating at `i64::MAX`.
    pub fn add(&mut self, resource: Resource, amount: i64) {
        let slot = &mut self.amounts[resource.index()];
        *slot = slot.saturating_add(amount.max(0));
    }

    pub fn covers(&self, resource: Resource, amount: i64) -> bool {
        self.get(resource) >= amount
    }

    /// Remove `amount` if the whole of it is on hand. Returns `false` and
    /// leaves the stock untouched otherwise.
    pub fn try_take(&mut self, resource: Resource, amount: i64) -> bool {
        if amount < 0 || !self.covers(resource, amount) {
            return false;
        }
        self.amounts[resource.index()] -= amount;
        true
    }

    /// Remove up to `amount`, returning how much was actually removed.
    pub fn take_up_to(&mut self, resource: Resource, amount: i64) -> i64 {
        let removed = amount.clamp(0, self.get(resource));
        self.amounts[resource.index()] -= removed;
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (Resource, i64)> + '_ {
        Resource::ALL.iter().map(move |r| (*r, self.get(*r)))
    }
}
