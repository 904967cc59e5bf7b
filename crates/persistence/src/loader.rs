//! Bulk state loading: six keyed batch reads turn the stored rows into one
//! in-memory [`TickState`]. Names outside the allow-lists are logged and
//! skipped so one bad row never sinks a tick.

use crate::cache::TtlCache;
use crate::error::StoreError;
use sim_core::{
    BuildingKind, Catalog, Nation, NationId, Percent, PolicyCode, Province, ProvinceFields,
    ProvinceId, Resource, TickState,
};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::QueryBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which provinces (and their nations) to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    All,
    Nations(Vec<NationId>),
}

type ProvinceRow = (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64);

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, scope: &Scope) {
    if let Scope::Nations(ids) = scope {
        qb.push(" WHERE ").push(column).push(" IN (");
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(id.0);
        }
        list.push_unseparated(")");
    }
}

/// Loads tick state and keeps short-lived per-nation snapshots for reads.
pub struct BulkStateLoader {
    catalog: Arc<Catalog>,
    snapshots: TtlCache<NationId, TickState>,
}

impl BulkStateLoader {
    pub fn new(catalog: Arc<Catalog>, snapshot_ttl: Duration) -> Self {
        Self {
            catalog,
            snapshots: TtlCache::new(snapshot_ttl),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Read everything in `scope` on the given connection (usually inside the
    /// tick's transaction).
    pub async fn load(
        &self,
        conn: &mut SqliteConnection,
        scope: &Scope,
    ) -> Result<TickState, StoreError> {
        let mut state = TickState::default();
        if matches!(scope, Scope::Nations(ids) if ids.is_empty()) {
            return Ok(state);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, nation_id, population, land, city_count, happiness, productivity, \
             pollution, consumer_spending, energy FROM provinces",
        );
        push_scope(&mut qb, "nation_id", scope);
        qb.push(" ORDER BY id");
        let rows: Vec<ProvinceRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (id, nation, population, land, cities, hap, prod, pol, spend, energy) in rows {
            let mut p = Province::new(ProvinceId(id), NationId(nation));
            p.population = population.max(0);
            p.land = land;
            p.city_count = cities;
            p.fields = ProvinceFields {
                happiness: Percent::clamped(hap),
                productivity: Percent::clamped(prod),
                pollution: Percent::clamped(pol),
                consumer_spending: Percent::clamped(spend),
            };
            p.energy = energy;
            state.provinces.insert(p.id, p);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT b.province_id, b.building, b.count FROM province_buildings b \
             JOIN provinces p ON p.id = b.province_id",
        );
        push_scope(&mut qb, "p.nation_id", scope);
        let rows: Vec<(i64, String, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (province, name, count) in rows {
            let Some(p) = state.provinces.get_mut(&ProvinceId(province)) else {
                continue;
            };
            match name.parse::<BuildingKind>() {
                Ok(kind) => p.buildings.set(kind, count),
                Err(err) => warn!(province, error = %err, "skipping building row"),
            }
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, money FROM nations");
        push_scope(&mut qb, "id", scope);
        let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (id, money) in rows {
            let mut n = Nation::empty(NationId(id));
            n.money = money.max(0);
            state.nations.insert(n.id, n);
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT nation_id, resource, amount FROM nation_resources");
        push_scope(&mut qb, "nation_id", scope);
        let rows: Vec<(i64, String, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (nation, name, amount) in rows {
            let Some(n) = state.nations.get_mut(&NationId(nation)) else {
                continue;
            };
            match name.parse::<Resource>() {
                Ok(resource) => n.resources.set(resource, amount),
                Err(err) => warn!(nation, error = %err, "skipping resource row"),
            }
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT nation_id, policy FROM nation_policies");
        push_scope(&mut qb, "nation_id", scope);
        let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (nation, policy) in rows {
            let Some(n) = state.nations.get_mut(&NationId(nation)) else {
                continue;
            };
            match u8::try_from(policy).map(PolicyCode) {
                Ok(code) if self.catalog.is_known_policy(code) => n.policies.insert(code),
                _ => warn!(nation, policy, "skipping unknown policy"),
            }
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT nation_id, upgrade FROM nation_upgrades");
        push_scope(&mut qb, "nation_id", scope);
        let rows: Vec<(i64, String)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        for (nation, upgrade) in rows {
            let Some(n) = state.nations.get_mut(&NationId(nation)) else {
                continue;
            };
            if self.catalog.is_known_upgrade(&upgrade) {
                n.upgrades.insert(upgrade);
            } else {
                warn!(nation, upgrade = %upgrade, "skipping unknown upgrade");
            }
        }

        debug!(
            provinces = state.provinces.len(),
            nations = state.nations.len(),
            "state loaded"
        );
        Ok(state)
    }

    /// One nation's provinces and row, served from the cache when fresh.
    pub async fn nation_snapshot(
        &self,
        pool: &SqlitePool,
        nation: NationId,
    ) -> Result<Arc<TickState>, StoreError> {
        if let Some(hit) = self.snapshots.get(&nation) {
            return Ok(hit);
        }
        let mut conn = pool.acquire().await?;
        let state = self.load(&mut conn, &Scope::Nations(vec![nation])).await?;
        Ok(self.snapshots.insert(nation, state))
    }

    /// The nation owning a province, if the province exists.
    pub async fn province_owner(
        &self,
        pool: &SqlitePool,
        province: ProvinceId,
    ) -> Result<Option<NationId>, StoreError> {
        let owner: Option<i64> = sqlx::query_scalar("SELECT nation_id FROM provinces WHERE id = ?")
            .bind(province.0)
            .fetch_optional(pool)
            .await?;
        Ok(owner.map(NationId))
    }

    /// Drop a nation's cached snapshot. Call after any write touching it.
    pub fn invalidate_nation(&self, nation: NationId) {
        self.snapshots.invalidate(&nation);
    }

    pub fn invalidate_all(&self) {
        self.snapshots.clear();
    }
}
