//! Core domain models and invariants for the province economy.
//!
//! This crate defines the closed name sets (resources, buildings, province
//! fields), the in-memory tick state, and the immutable catalog that every
//! simulation job reads. Names that cross a storage or configuration boundary
//! go through the allow-list enums here and nowhere else.

mod names;

pub mod building;
pub mod catalog;
pub mod resource;
pub mod state;

pub use building::{BuildingInventory, BuildingKind, Category};
pub use catalog::{
    Bonus, BuildingSpec, Catalog, CatalogError, Constants, Factor, FieldFactor, PolicySpec,
    Selector, UpgradeSpec,
};
pub use resource::{ProvinceField, Resource, ResourceStock};
pub use state::{
    Nation, NationId, Percent, PolicyCode, PolicySet, Province, ProvinceFields, ProvinceId,
    TickState, UpgradeSet, ValidationError,
};

use thiserror::Error;

/// A name that is not part of a closed allow-list.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {name}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}
