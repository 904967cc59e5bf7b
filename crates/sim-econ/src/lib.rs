//! Economic models for the province economy.
//!
//! Everything here is pure computation over an in-memory [`TickState`]:
//! - the production/consumption engine behind the revenue tick
//! - tax income with the consumer-goods demand adjustment
//! - population growth gated by rations
//! - a read-only projection of the next revenue and tax ticks
//!
//! Loading, persisting, locking, and retrying live in other crates.
//!
//! [`TickState`]: sim_core::TickState

pub mod effects;
pub mod modifiers;
pub mod population;
pub mod production;
pub mod projection;
pub mod tax;

pub use effects::ProvinceLedger;
pub use modifiers::Modifiers;
pub use population::{run_population_growth, Growth, GrowthReport};
pub use production::{run_province_revenue, Affordability, BuildingPlan, RevenueReport, Shortfall};
pub use projection::{project_revenue, RevenueProjection};
pub use tax::{run_tax_income, TaxAssessment, TaxReport};

use sim_core::BuildingKind;
use thiserror::Error;

/// Per-entity anomalies. A building hitting one contributes nothing this
/// tick; the tick itself carries on.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    #[error("no catalog spec for {0}")]
    MissingSpec(BuildingKind),
    #[error("{what} for {kind} overflows")]
    Overflow {
        kind: BuildingKind,
        what: &'static str,
    },
}
