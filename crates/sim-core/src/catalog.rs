//! Immutable catalog: building specs, policy and upgrade modifiers, and the
//! numeric tuning constants. Loaded once from YAML and validated before use.

use crate::building::{BuildingKind, Category};
use crate::resource::{ProvinceField, Resource};
use crate::state::PolicyCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

const STANDARD_CATALOG: &str = include_str!("../assets/catalog.yaml");

/// Errors produced while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Numeric tuning constants shared by the tax, population, and production models.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Constants {
    /// Base carrying capacity of every province.
    pub default_max_population: i64,
    pub city_max_population_addition: i64,
    pub land_max_population_addition: i64,
    /// Scales `(happiness - 50) / 50` into a capacity multiplier.
    pub happiness_growth_multiplier: f64,
    /// Scales `(pollution - 50) / 50`; negative so pollution shrinks capacity.
    pub pollution_growth_multiplier: f64,
    /// Growth per tick, as a percentage of capacity, at full ration coverage.
    pub max_growth_rate_percent: f64,
    /// Population fed by one ration per tick.
    pub rations_per: i64,
    /// Population served by one consumer good per tick.
    pub consumer_goods_per: i64,
    /// Money per inhabitant per tick before multipliers.
    pub default_tax_income: f64,
    pub default_land_tax_multiplier: f64,
    /// Income multiplier when consumer-goods demand is fully met.
    pub consumer_goods_tax_multiplier: f64,
    /// Extra per-farm output per unit of land.
    pub land_farm_production_addition: f64,
    /// Output change per productivity point away from 50.
    pub productivity_production_multiplier: f64,
}

/// Static description of one building kind, per unit owned.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuildingSpec {
    #[serde(default)]
    pub category: Option<Category>,
    /// Money upkeep.
    #[serde(default)]
    pub money: i64,
    /// Resources consumed.
    #[serde(default)]
    pub minus: BTreeMap<Resource, i64>,
    /// Nation resources produced.
    #[serde(default)]
    pub plus: BTreeMap<Resource, i64>,
    /// Province percentage fields produced (scaled like other output).
    #[serde(default)]
    pub plus_province: BTreeMap<ProvinceField, i64>,
    /// Energy produced.
    #[serde(default)]
    pub energy: i64,
    /// Draws one unit of energy per building.
    #[serde(default)]
    pub energy_consumer: bool,
    /// Output per building grows with province land.
    #[serde(default)]
    pub land_bonus: bool,
    /// Percentage effects added to the province.
    #[serde(default)]
    pub eff: BTreeMap<ProvinceField, i64>,
    /// Percentage effects subtracted from the province.
    #[serde(default)]
    pub effminus: BTreeMap<ProvinceField, i64>,
}

impl BuildingSpec {
    pub fn is_energy_producer(&self) -> bool {
        self.energy > 0
    }
}

/// Picks out buildings either by kind or by category.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default)]
    pub building: Option<BuildingKind>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl Selector {
    pub fn matches(&self, kind: BuildingKind, category: Option<Category>) -> bool {
        match (self.building, self.category) {
            (Some(b), _) if b == kind => true,
            (_, Some(c)) => category == Some(c),
            _ => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.building.is_none() && self.category.is_none()
    }
}

/// Multiplies an amount for the selected buildings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Factor {
    #[serde(flatten)]
    pub target: Selector,
    pub factor: f64,
}

/// Multiplies one positive percentage effect for the selected buildings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldFactor {
    #[serde(flatten)]
    pub target: Selector,
    pub field: ProvinceField,
    pub factor: f64,
}

/// Adds a flat amount for the selected buildings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bonus {
    #[serde(flatten)]
    pub target: Selector,
    pub amount: f64,
}

/// Modifiers granted by an active policy. Multipliers default to 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    #[serde(default = "one")]
    pub tax: f64,
    #[serde(default = "one")]
    pub productivity: f64,
    #[serde(default = "one")]
    pub happiness: f64,
    #[serde(default = "one")]
    pub population_growth: f64,
    #[serde(default)]
    pub upkeep: Vec<Factor>,
    /// Scales both added and subtracted percentage effects.
    #[serde(default)]
    pub effect: Vec<Factor>,
}

/// Modifiers granted by a purchased upgrade.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpgradeSpec {
    #[serde(default)]
    pub upkeep: Vec<Factor>,
    /// Scales consumed input amounts.
    #[serde(default)]
    pub input: Vec<Factor>,
    /// Added to the output multiplier.
    #[serde(default)]
    pub output: Vec<Bonus>,
    /// Extra energy per producing building.
    #[serde(default)]
    pub energy: Vec<Bonus>,
    /// Scales positive percentage effects.
    #[serde(default)]
    pub effect: Vec<FieldFactor>,
}

fn one() -> f64 {
    1.0
}

/// The immutable catalog used by every tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    pub constants: Constants,
    #[serde(default)]
    pub buildings: BTreeMap<BuildingKind, BuildingSpec>,
    #[serde(default)]
    pub policies: BTreeMap<u8, PolicySpec>,
    #[serde(default)]
    pub upgrades: BTreeMap<String, UpgradeSpec>,
}

impl Catalog {
    /// The catalog shipped with the engine.
    pub fn standard() -> Result<Self, CatalogError> {
        Self::from_yaml_str(STANDARD_CATALOG)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_yaml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn building(&self, kind: BuildingKind) -> Option<&BuildingSpec> {
        self.buildings.get(&kind)
    }

    pub fn policy(&self, code: PolicyCode) -> Option<&PolicySpec> {
        self.policies.get(&code.0)
    }

    pub fn upgrade(&self, name: &str) -> Option<&UpgradeSpec> {
        self.upgrades.get(name)
    }

    pub fn is_known_policy(&self, code: PolicyCode) -> bool {
        self.policies.contains_key(&code.0)
    }

    pub fn is_known_upgrade(&self, name: &str) -> bool {
        self.upgrades.contains_key(name)
    }

    /// Validate constants and every spec. Missing building kinds are allowed;
    /// the engine treats them as contributing nothing.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let c = &self.constants;
        if c.rations_per <= 0 || c.consumer_goods_per <= 0 {
            return Err(invalid("per-capita divisors must be > 0"));
        }
        if c.default_max_population <= 0
            || c.city_max_population_addition < 0
            || c.land_max_population_addition < 0
        {
            return Err(invalid("population capacities must be non-negative"));
        }
        for (name, v) in [
            ("happiness_growth_multiplier", c.happiness_growth_multiplier),
            ("pollution_growth_multiplier", c.pollution_growth_multiplier),
            ("max_growth_rate_percent", c.max_growth_rate_percent),
            ("default_tax_income", c.default_tax_income),
            ("default_land_tax_multiplier", c.default_land_tax_multiplier),
            ("consumer_goods_tax_multiplier", c.consumer_goods_tax_multiplier),
            ("land_farm_production_addition", c.land_farm_production_addition),
            (
                "productivity_production_multiplier",
                c.productivity_production_multiplier,
            ),
        ] {
            if !v.is_finite() {
                return Err(invalid(format!("{name} must be finite")));
            }
        }
        if c.max_growth_rate_percent < 0.0 || c.default_tax_income < 0.0 {
            return Err(invalid("growth and tax rates must be non-negative"));
        }

        for (kind, spec) in &self.buildings {
            validate_building(*kind, spec)?;
        }
        for (code, spec) in &self.policies {
            if *code == 0 {
                return Err(invalid("policy code 0 is reserved"));
            }
            for (label, v) in [
                ("tax", spec.tax),
                ("productivity", spec.productivity),
                ("happiness", spec.happiness),
                ("population_growth", spec.population_growth),
            ] {
                check_factor(&format!("policy {code} {label}"), v)?;
            }
            for f in spec.upkeep.iter().chain(&spec.effect) {
                check_selector(&format!("policy {code}"), &f.target)?;
                check_factor(&format!("policy {code}"), f.factor)?;
            }
        }
        for (name, spec) in &self.upgrades {
            for f in spec.upkeep.iter().chain(&spec.input) {
                check_selector(name, &f.target)?;
                check_factor(name, f.factor)?;
            }
            for b in spec.output.iter().chain(&spec.energy) {
                check_selector(name, &b.target)?;
                if !b.amount.is_finite() || b.amount < 0.0 {
                    return Err(invalid(format!("{name}: bonus must be >= 0")));
                }
            }
            for f in &spec.effect {
                check_selector(name, &f.target)?;
                check_factor(name, f.factor)?;
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> CatalogError {
    CatalogError::Invalid(msg.into())
}

fn check_factor(owner: &str, v: f64) -> Result<(), CatalogError> {
    if !v.is_finite() || v < 0.0 {
        return Err(invalid(format!("{owner}: factor must be finite and >= 0")));
    }
    Ok(())
}

fn check_selector(owner: &str, s: &Selector) -> Result<(), CatalogError> {
    if s.is_empty() {
        return Err(invalid(format!("{owner}: selector names no building or category")));
    }
    Ok(())
}

fn validate_building(kind: BuildingKind, spec: &BuildingSpec) -> Result<(), CatalogError> {
    let negative = spec.money < 0
        || spec.energy < 0
        || spec.minus.values().any(|v| *v < 0)
        || spec.plus.values().any(|v| *v < 0)
        || spec.plus_province.values().any(|v| *v < 0)
        || spec.eff.values().any(|v| *v < 0)
        || spec.effminus.values().any(|v| *v < 0);
    if negative {
        return Err(invalid(format!("{kind}: amounts must be non-negative")));
    }
    if spec.energy_consumer && spec.is_energy_producer() {
        return Err(invalid(format!("{kind}: cannot both produce and consume energy")));
    }
    Ok(())
}
