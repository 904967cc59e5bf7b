use criterion::{criterion_group, criterion_main, Criterion};
use sim_core::{
    BuildingKind, Catalog, Nation, NationId, Province, ProvinceId, Resource, TickState,
};

fn fleet(nations: i64, provinces_per: i64) -> TickState {
    let mut state = TickState::default();
    for n in 0..nations {
        let mut nation = Nation::empty(NationId(n));
        nation.money = 50_000_000;
        for r in Resource::ALL {
            nation.resources.set(*r, 10_000);
        }
        state.nations.insert(nation.id, nation);
        for i in 0..provinces_per {
            let id = ProvinceId(n * provinces_per + i);
            let mut p = Province::new(id, NationId(n));
            p.population = 250_000 + i * 1_000;
            p.land = 1 + i % 40;
            for (k, kind) in BuildingKind::ALL.iter().enumerate() {
                p.buildings.set(*kind, ((id.0 + k as i64) % 4) as i64);
            }
            state.provinces.insert(id, p);
        }
    }
    state
}

fn bench_ticks(c: &mut Criterion) {
    let catalog = Catalog::standard().unwrap();
    let base = fleet(200, 50);
    c.bench_function("province_revenue_10k", |b| {
        b.iter(|| {
            let mut state = base.clone();
            sim_econ::run_province_revenue(&catalog, &mut state)
        })
    });
    c.bench_function("population_growth_10k", |b| {
        b.iter(|| {
            let mut state = base.clone();
            sim_econ::run_population_growth(&catalog, &mut state)
        })
    });
}

criterion_group!(benches, bench_ticks);
criterion_main!(benches);
