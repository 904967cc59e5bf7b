//! Bulk writes of one tick's results.
//!
//! Money and stockpiles are written as deltas against the loaded baseline so
//! that writers outside the tick are never overwritten. Province columns owned
//! by the job are written as absolute values in one statement per chunk.

use crate::error::{db_code, StoreError, SQLITE_CONSTRAINT, SQLITE_CONSTRAINT_CHECK};
use sim_core::{Nation, NationId, Province, Resource, TickState};
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::QueryBuilder;
use tracing::debug;

/// Conservative SQLite bound-parameter limit per statement.
const MAX_BINDS: usize = 999;

/// A province column a job may own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvinceColumn {
    Population,
    Happiness,
    Productivity,
    Pollution,
    ConsumerSpending,
    Energy,
}

impl ProvinceColumn {
    fn name(self) -> &'static str {
        match self {
            ProvinceColumn::Population => "population",
            ProvinceColumn::Happiness => "happiness",
            ProvinceColumn::Productivity => "productivity",
            ProvinceColumn::Pollution => "pollution",
            ProvinceColumn::ConsumerSpending => "consumer_spending",
            ProvinceColumn::Energy => "energy",
        }
    }

    fn read(self, p: &Province) -> i64 {
        match self {
            ProvinceColumn::Population => p.population,
            ProvinceColumn::Happiness => p.fields.happiness.value(),
            ProvinceColumn::Productivity => p.fields.productivity.value(),
            ProvinceColumn::Pollution => p.fields.pollution.value(),
            ProvinceColumn::ConsumerSpending => p.fields.consumer_spending.value(),
            ProvinceColumn::Energy => p.energy,
        }
    }
}

/// What a job is allowed to write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WritePlan {
    pub money: bool,
    pub resources: bool,
    pub province_columns: &'static [ProvinceColumn],
}

impl WritePlan {
    pub const TAX_INCOME: WritePlan = WritePlan {
        money: true,
        resources: true,
        province_columns: &[],
    };
    pub const PROVINCE_REVENUE: WritePlan = WritePlan {
        money: true,
        resources: true,
        province_columns: &[
            ProvinceColumn::Happiness,
            ProvinceColumn::Productivity,
            ProvinceColumn::Pollution,
            ProvinceColumn::ConsumerSpending,
            ProvinceColumn::Energy,
        ],
    };
    pub const POPULATION_GROWTH: WritePlan = WritePlan {
        money: false,
        resources: true,
        province_columns: &[ProvinceColumn::Population],
    };
}

/// Row counts written by one [`persist`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub nations: usize,
    pub resources: usize,
    pub provinces: usize,
    /// Nations whose rows changed; their cached snapshots are stale.
    pub touched: Vec<NationId>,
}

struct NationDelta {
    id: NationId,
    money: i64,
    resources: Vec<(Resource, i64)>,
}

fn nation_deltas(baseline: &TickState, updated: &TickState, plan: &WritePlan) -> Vec<NationDelta> {
    let mut out = Vec::new();
    for (id, after) in &updated.nations {
        let empty;
        let before = match baseline.nations.get(id) {
            Some(n) => n,
            None => {
                empty = Nation::empty(*id);
                &empty
            }
        };
        let money = if plan.money { after.money - before.money } else { 0 };
        let resources: Vec<(Resource, i64)> = if plan.resources {
            Resource::ALL
                .iter()
                .map(|r| (*r, after.resources.get(*r) - before.resources.get(*r)))
                .filter(|(_, d)| *d != 0)
                .collect()
        } else {
            Vec::new()
        };
        if money != 0 || !resources.is_empty() {
            out.push(NationDelta {
                id: *id,
                money,
                resources,
            });
        }
    }
    out
}

fn conflict_or(err: sqlx::Error, what: &str) -> StoreError {
    let code = db_code(&err);
    if matches!(code.as_deref(), Some(SQLITE_CONSTRAINT_CHECK | SQLITE_CONSTRAINT)) {
        StoreError::Conflict(format!("{what} would go negative"))
    } else {
        StoreError::Sqlx(err)
    }
}

/// Write the difference between `baseline` and `updated` allowed by `plan`.
/// Runs on the caller's connection so it shares the tick's transaction.
pub async fn persist(
    conn: &mut SqliteConnection,
    baseline: &TickState,
    updated: &TickState,
    plan: &WritePlan,
) -> Result<PersistSummary, StoreError> {
    let mut summary = PersistSummary::default();
    let deltas = nation_deltas(baseline, updated, plan);

    // Rows are created first so the delta updates never insert a negative
    // candidate row; CHECK constraints fire before upsert resolution.
    for chunk in deltas.chunks(MAX_BINDS) {
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO nations (id) ");
        qb.push_values(chunk, |mut row, d| {
            row.push_bind(d.id.0);
        });
        qb.push(" ON CONFLICT (id) DO NOTHING");
        qb.build().execute(&mut *conn).await?;
    }
    let money: Vec<&NationDelta> = deltas.iter().filter(|d| d.money != 0).collect();
    for chunk in money.chunks(MAX_BINDS / 2) {
        let mut qb = QueryBuilder::<Sqlite>::new("WITH v(id, delta) AS (");
        qb.push_values(chunk, |mut row, d| {
            row.push_bind(d.id.0).push_bind(d.money);
        });
        qb.push(") UPDATE nations SET money = nations.money + v.delta FROM v WHERE nations.id = v.id");
        qb.build()
            .execute(&mut *conn)
            .await
            .map_err(|e| conflict_or(e, "money"))?;
        summary.nations += chunk.len();
    }

    let resource_rows: Vec<(i64, &'static str, i64)> = deltas
        .iter()
        .flat_map(|d| d.resources.iter().map(move |(r, a)| (d.id.0, r.as_str(), *a)))
        .collect();
    for chunk in resource_rows.chunks(MAX_BINDS / 2) {
        let mut qb =
            QueryBuilder::<Sqlite>::new("INSERT INTO nation_resources (nation_id, resource) ");
        qb.push_values(chunk, |mut row, (nation, resource, _)| {
            row.push_bind(*nation).push_bind(*resource);
        });
        qb.push(" ON CONFLICT (nation_id, resource) DO NOTHING");
        qb.build().execute(&mut *conn).await?;
    }
    for chunk in resource_rows.chunks(MAX_BINDS / 3) {
        let mut qb = QueryBuilder::<Sqlite>::new("WITH v(nation_id, resource, delta) AS (");
        qb.push_values(chunk, |mut row, (nation, resource, amount)| {
            row.push_bind(*nation).push_bind(*resource).push_bind(*amount);
        });
        qb.push(
            ") UPDATE nation_resources SET amount = nation_resources.amount + v.delta FROM v \
             WHERE nation_resources.nation_id = v.nation_id AND nation_resources.resource = v.resource",
        );
        qb.build()
            .execute(&mut *conn)
            .await
            .map_err(|e| conflict_or(e, "stockpile"))?;
        summary.resources += chunk.len();
    }

    let columns = plan.province_columns;
    if !columns.is_empty() {
        let changed: Vec<&Province> = updated
            .provinces
            .values()
            .filter(|p| match baseline.provinces.get(&p.id) {
                Some(before) => columns.iter().any(|c| c.read(before) != c.read(p)),
                None => true,
            })
            .collect();
        for chunk in changed.chunks(MAX_BINDS / (columns.len() + 1)) {
            let mut qb = QueryBuilder::<Sqlite>::new("WITH v(id");
            for c in columns {
                qb.push(", ").push(c.name());
            }
            qb.push(") AS (");
            qb.push_values(chunk, |mut row, p| {
                row.push_bind(p.id.0);
                for c in columns {
                    row.push_bind(c.read(p));
                }
            });
            qb.push(") UPDATE provinces SET ");
            let mut sets = qb.separated(", ");
            for c in columns {
                sets.push(format!("{0} = v.{0}", c.name()));
            }
            qb.push(" FROM v WHERE provinces.id = v.id");
            qb.build().execute(&mut *conn).await?;
            summary.provinces += chunk.len();
        }
        for p in changed {
            summary.touched.push(p.nation_id);
        }
    }

    summary.touched.extend(deltas.iter().map(|d| d.id));
    summary.touched.sort();
    summary.touched.dedup();
    debug!(
        nations = summary.nations,
        resources = summary.resources,
        provinces = summary.provinces,
        "tick persisted"
    );
    Ok(summary)
}
