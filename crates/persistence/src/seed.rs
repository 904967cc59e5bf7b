//! Deterministic demo data: a generated fleet of nations and provinces, and
//! the bulk insert that stores any [`TickState`].

use crate::error::StoreError;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sim_core::{
    BuildingKind, Catalog, Nation, NationId, Percent, PolicyCode, Province, ProvinceFields,
    ProvinceId, Resource, TickState,
};
use sqlx::sqlite::Sqlite;
use sqlx::{QueryBuilder, SqlitePool};
use tracing::info;

const CHUNK: usize = 150;

/// Shape of a generated fleet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FleetSpec {
    pub nations: u32,
    pub provinces_per_nation: u32,
    pub seed: u64,
}

impl Default for FleetSpec {
    fn default() -> Self {
        Self {
            nations: 4,
            provinces_per_nation: 5,
            seed: 42,
        }
    }
}

/// Generate a fleet. The same spec always yields the same state.
pub fn demo_fleet(catalog: &Catalog, spec: FleetSpec) -> TickState {
    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
    let mut state = TickState::default();
    let policy_codes: Vec<u8> = catalog.policies.keys().copied().collect();
    let upgrade_names: Vec<&String> = catalog.upgrades.keys().collect();
    let energy: Vec<BuildingKind> = BuildingKind::ALL
        .iter()
        .copied()
        .filter(|k| catalog.building(*k).is_some_and(|b| b.is_energy_producer()))
        .collect();

    for n in 1..=i64::from(spec.nations) {
        let mut nation = Nation::empty(NationId(n));
        nation.money = rng.gen_range(1_000_000..50_000_000);
        for r in Resource::ALL {
            nation.resources.set(*r, rng.gen_range(0..5_000));
        }
        for code in &policy_codes {
            if rng.gen_bool(0.3) {
                nation.policies.insert(PolicyCode(*code));
            }
        }
        for name in &upgrade_names {
            if rng.gen_bool(0.3) {
                nation.upgrades.insert(name.as_str());
            }
        }

        for i in 0..i64::from(spec.provinces_per_nation) {
            let id = ProvinceId((n - 1) * i64::from(spec.provinces_per_nation) + i + 1);
            let mut p = Province::new(id, nation.id);
            p.population = rng.gen_range(100_000..1_500_000);
            p.land = rng.gen_range(1..60);
            p.city_count = rng.gen_range(1..5);
            p.fields = ProvinceFields {
                happiness: Percent::clamped(rng.gen_range(30..80)),
                productivity: Percent::clamped(rng.gen_range(30..80)),
                pollution: Percent::clamped(rng.gen_range(20..70)),
                consumer_spending: Percent::clamped(rng.gen_range(30..80)),
            };
            if let Some(kind) = energy.choose(&mut rng) {
                p.buildings.set(*kind, rng.gen_range(1..4));
            }
            for kind in BuildingKind::ALL {
                if p.buildings.get(*kind) == 0 && rng.gen_bool(0.25) {
                    p.buildings.set(*kind, rng.gen_range(1..4));
                }
            }
            state.provinces.insert(id, p);
        }
        state.nations.insert(nation.id, nation);
    }
    state
}

/// Store a whole state, upserting rows with the same keys. Rows the state
/// does not mention (policies, upgrades, buildings) are left in place.
pub async fn seed_state(pool: &SqlitePool, state: &TickState) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    let nations: Vec<&Nation> = state.nations.values().collect();
    for chunk in nations.chunks(CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO nations (id, name, money) ");
        qb.push_values(chunk, |mut row, n| {
            row.push_bind(n.id.0)
                .push_bind(format!("Nation {}", n.id))
                .push_bind(n.money);
        });
        qb.push(" ON CONFLICT (id) DO UPDATE SET name = excluded.name, money = excluded.money");
        qb.build().execute(&mut *tx).await?;
    }

    let resources: Vec<(i64, &'static str, i64)> = nations
        .iter()
        .flat_map(|n| n.resources.iter().map(move |(r, a)| (n.id.0, r.as_str(), a)))
        .collect();
    for chunk in resources.chunks(CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO nation_resources (nation_id, resource, amount) ",
        );
        qb.push_values(chunk, |mut row, (n, r, a)| {
            row.push_bind(*n).push_bind(*r).push_bind(*a);
        });
        qb.push(" ON CONFLICT (nation_id, resource) DO UPDATE SET amount = excluded.amount");
        qb.build().execute(&mut *tx).await?;
    }

    let policies: Vec<(i64, i64)> = nations
        .iter()
        .flat_map(|n| n.policies.iter().map(move |c| (n.id.0, i64::from(c.0))))
        .collect();
    for chunk in policies.chunks(CHUNK) {
        let mut qb =
            QueryBuilder::<Sqlite>::new("INSERT INTO nation_policies (nation_id, policy) ");
        qb.push_values(chunk, |mut row, (n, c)| {
            row.push_bind(*n).push_bind(*c);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build().execute(&mut *tx).await?;
    }

    let upgrades: Vec<(i64, String)> = nations
        .iter()
        .flat_map(|n| n.upgrades.iter().map(move |u| (n.id.0, u.to_string())))
        .collect();
    for chunk in upgrades.chunks(CHUNK) {
        let mut qb =
            QueryBuilder::<Sqlite>::new("INSERT INTO nation_upgrades (nation_id, upgrade) ");
        qb.push_values(chunk, |mut row, (n, u)| {
            row.push_bind(*n).push_bind(u.clone());
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build().execute(&mut *tx).await?;
    }

    let provinces: Vec<&Province> = state.provinces.values().collect();
    for chunk in provinces.chunks(CHUNK / 2) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO provinces (id, nation_id, name, population, land, city_count, \
             happiness, productivity, pollution, consumer_spending, energy) ",
        );
        qb.push_values(chunk, |mut row, p| {
            row.push_bind(p.id.0)
                .push_bind(p.nation_id.0)
                .push_bind(format!("Province {}", p.id))
                .push_bind(p.population)
                .push_bind(p.land)
                .push_bind(p.city_count)
                .push_bind(p.fields.happiness.value())
                .push_bind(p.fields.productivity.value())
                .push_bind(p.fields.pollution.value())
                .push_bind(p.fields.consumer_spending.value())
                .push_bind(p.energy);
        });
        qb.push(
            " ON CONFLICT (id) DO UPDATE SET nation_id = excluded.nation_id, name = excluded.name, \
             population = excluded.population, land = excluded.land, \
             city_count = excluded.city_count, happiness = excluded.happiness, \
             productivity = excluded.productivity, pollution = excluded.pollution, \
             consumer_spending = excluded.consumer_spending, energy = excluded.energy",
        );
        qb.build().execute(&mut *tx).await?;
    }

    let buildings: Vec<(i64, &'static str, i64)> = provinces
        .iter()
        .flat_map(|p| p.buildings.occupied().map(move |(k, c)| (p.id.0, k.as_str(), c)))
        .collect();
    for chunk in buildings.chunks(CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO province_buildings (province_id, building, count) ",
        );
        qb.push_values(chunk, |mut row, (p, k, c)| {
            row.push_bind(*p).push_bind(*k).push_bind(*c);
        });
        qb.push(" ON CONFLICT (province_id, building) DO UPDATE SET count = excluded.count");
        qb.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    info!(
        nations = state.nations.len(),
        provinces = state.provinces.len(),
        "state seeded"
    );
    Ok(())
}
