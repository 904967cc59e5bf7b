//! Read-only views over persisted state for the UI layer. Served from the
//! loader's per-nation snapshot cache; nothing here writes.

use crate::JobError;
use persistence::{BulkStateLoader, Database};
use serde::Serialize;
use sim_core::{Nation, NationId, ProvinceId};
use sim_econ::{population, tax, RevenueProjection, TaxAssessment};
use std::sync::Arc;

/// Current percentage fields and energy balance of one province.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProvinceEffects {
    pub province: i64,
    pub happiness: i64,
    pub productivity: i64,
    pub pollution: i64,
    pub consumer_spending: i64,
    pub energy: i64,
}

pub struct Projections {
    db: Arc<Database>,
    loader: Arc<BulkStateLoader>,
}

impl Projections {
    pub fn new(db: Arc<Database>, loader: Arc<BulkStateLoader>) -> Self {
        Self { db, loader }
    }

    /// Tax the nation would collect next tick. `None` when it owns no provinces.
    pub async fn compute_tax_income(&self, nation: NationId) -> Result<Option<TaxAssessment>, JobError> {
        let snapshot = self.loader.nation_snapshot(&self.db.pool(), nation).await?;
        let owner = snapshot
            .nations
            .get(&nation)
            .cloned()
            .unwrap_or_else(|| Nation::empty(nation));
        Ok(tax::assess_nation(self.loader.catalog(), &snapshot, &owner))
    }

    pub async fn rations_needed_for(&self, nation: NationId) -> Result<i64, JobError> {
        let snapshot = self.loader.nation_snapshot(&self.db.pool(), nation).await?;
        Ok(population::nation_rations_needed(
            &self.loader.catalog().constants,
            &snapshot,
            nation,
        ))
    }

    /// `None` when the province does not exist.
    pub async fn current_effects(&self, province: ProvinceId) -> Result<Option<ProvinceEffects>, JobError> {
        let pool = self.db.pool();
        let Some(owner) = self.loader.province_owner(&pool, province).await? else {
            return Ok(None);
        };
        let snapshot = self.loader.nation_snapshot(&pool, owner).await?;
        Ok(snapshot.provinces.get(&province).map(|p| ProvinceEffects {
            province: p.id.0,
            happiness: p.fields.happiness.value(),
            productivity: p.fields.productivity.value(),
            pollution: p.fields.pollution.value(),
            consumer_spending: p.fields.consumer_spending.value(),
            energy: p.energy,
        }))
    }

    /// Dry run of the next revenue and tax ticks for one nation.
    pub async fn projected_revenue(&self, nation: NationId) -> Result<Option<RevenueProjection>, JobError> {
        let snapshot = self.loader.nation_snapshot(&self.db.pool(), nation).await?;
        Ok(sim_econ::project_revenue(self.loader.catalog(), &snapshot, nation))
    }
}
