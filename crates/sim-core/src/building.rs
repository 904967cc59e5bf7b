//! Building kinds, categories, and per-province inventories.

use crate::names::name_enum;
use serde::{Deserialize, Serialize};

/// A kind of building a province can hold.
///
/// Declaration order is processing order within a province: energy producers
/// come first so consumers later in the same tick can draw on their output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BuildingKind {
    CoalBurners,
    OilBurners,
    HydroDams,
    NuclearReactors,
    SolarFields,
    GasStations,
    GeneralStores,
    FarmersMarkets,
    Malls,
    Banks,
    CityParks,
    Hospitals,
    Libraries,
    Universities,
    Monorails,
    ArmyBases,
    Aerodomes,
    Harbours,
    AdminBuildings,
    Silos,
    Farms,
    Pumpjacks,
    CoalMines,
    BauxiteMines,
    CopperMines,
    UraniumMines,
    LeadMines,
    IronMines,
    LumberMills,
    ComponentFactories,
    SteelMills,
    AmmunitionFactories,
    AluminiumRefineries,
    OilRefineries,
}

name_enum!(BuildingKind, "building", {
    CoalBurners => "coal_burners",
    OilBurners => "oil_burners",
    HydroDams => "hydro_dams",
    NuclearReactors => "nuclear_reactors",
    SolarFields => "solar_fields",
    GasStations => "gas_stations",
    GeneralStores => "general_stores",
    FarmersMarkets => "farmers_markets",
    Malls => "malls",
    Banks => "banks",
    CityParks => "city_parks",
    Hospitals => "hospitals",
    Libraries => "libraries",
    Universities => "universities",
    Monorails => "monorails",
    ArmyBases => "army_bases",
    Aerodomes => "aerodomes",
    Harbours => "harbours",
    AdminBuildings => "admin_buildings",
    Silos => "silos",
    Farms => "farms",
    Pumpjacks => "pumpjacks",
    CoalMines => "coal_mines",
    BauxiteMines => "bauxite_mines",
    CopperMines => "copper_mines",
    UraniumMines => "uranium_mines",
    LeadMines => "lead_mines",
    IronMines => "iron_mines",
    LumberMills => "lumber_mills",
    ComponentFactories => "component_factories",
    SteelMills => "steel_mills",
    AmmunitionFactories => "ammunition_factories",
    AluminiumRefineries => "aluminium_refineries",
    OilRefineries => "oil_refineries",
});

/// Category membership used to target upgrades at groups of buildings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Category {
    Energy,
    Retail,
    PublicWorks,
    Military,
    Agriculture,
    Mining,
    Industry,
}

name_enum!(Category, "category", {
    Energy => "energy",
    Retail => "retail",
    PublicWorks => "public_works",
    Military => "military",
    Agriculture => "agriculture",
    Mining => "mining",
    Industry => "industry",
});

/// Building counts for one province, indexed by [`BuildingKind`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildingInventory {
    counts: [i64; BuildingKind::COUNT],
}

impl Default for BuildingInventory {
    fn default() -> Self {
        Self {
            counts: [0; BuildingKind::COUNT],
        }
    }
}

impl BuildingInventory {
    pub fn get(&self, kind: BuildingKind) -> i64 {
        self.counts[kind.index()]
    }

    /// Negative counts are stored as zero.
    pub fn set(&mut self, kind: BuildingKind, count: i64) {
        self.counts[kind.index()] = count.max(0);
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|c| *c == 0)
    }

    /// Kinds with a non-zero count, in processing order.
    pub fn occupied(&self) -> impl Iterator<Item = (BuildingKind, i64)> + '_ {
        BuildingKind::ALL
            .iter()
            .map(move |k| (*k, self.get(*k)))
            .filter(|(_, count)| *count > 0)
    }
}
