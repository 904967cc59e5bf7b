use persistence::seed::{demo_fleet, seed_state, FleetSpec};
use persistence::{Database, LockCoordinator, Scope};
use sim_core::{BuildingKind, Catalog, Nation, NationId, Province, ProvinceId, Resource, TickState};
use sim_runtime::{EngineConfig, JobKind, JobOutcome, JobReport, JobRunner, RetryCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(url: &str) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.database.url = url.to_string();
    config.lock.holder = Some("test-worker".into());
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

async fn runner_for(url: &str) -> JobRunner {
    let cfg = config(url);
    let db = Database::connect(url, 2).await.unwrap();
    db.migrate().await.unwrap();
    let catalog = Arc::new(Catalog::standard().unwrap());
    let retry = RetryCoordinator::with_seed(cfg.retry, 7);
    JobRunner::new(cfg, Arc::new(db), catalog).with_retry(retry)
}

async fn setup(state: &TickState) -> (JobRunner, String, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
    let runner = runner_for(&url).await;
    seed_state(&runner.database().pool(), state).await.unwrap();
    (runner, url, dir)
}

async fn stored(runner: &JobRunner) -> TickState {
    let pool = runner.database().pool();
    let mut conn = pool.acquire().await.unwrap();
    runner.loader().load(&mut conn, &Scope::All).await.unwrap()
}

fn single_province(money: i64, build: &[(BuildingKind, i64)]) -> TickState {
    let mut state = TickState::default();
    let mut p = Province::new(ProvinceId(1), NationId(1));
    p.population = 800_000;
    for (kind, count) in build {
        p.buildings.set(*kind, *count);
    }
    state.provinces.insert(p.id, p);
    let mut n = Nation::empty(NationId(1));
    n.money = money;
    state.nations.insert(n.id, n);
    state
}

#[tokio::test]
async fn second_run_in_the_window_is_skipped() {
    let catalog = Catalog::standard().unwrap();
    let (runner, _url, _dir) = setup(&demo_fleet(&catalog, FleetSpec::default())).await;

    let first = runner.run(JobKind::ProvinceRevenue).await.unwrap();
    assert!(first.is_completed());
    let after_first = stored(&runner).await;

    let second = runner.run(JobKind::ProvinceRevenue).await.unwrap();
    assert_eq!(second, JobOutcome::SkippedRecentRun);
    assert_eq!(stored(&runner).await, after_first);
}

#[tokio::test]
async fn held_lock_skips_without_writing() {
    let (runner, _url, _dir) = setup(&single_province(10, &[])).await;
    let pool = runner.database().pool();
    let other = LockCoordinator::new("other-worker", Duration::from_secs(3600));
    let held = other
        .try_acquire(&pool, JobKind::TaxIncome.name(), persistence::now_ms())
        .await
        .unwrap()
        .unwrap();

    let outcome = runner.run(JobKind::TaxIncome).await.unwrap();
    assert_eq!(outcome, JobOutcome::SkippedLocked);
    assert_eq!(stored(&runner).await.nations[&NationId(1)].money, 10);

    other.release(&pool, held).await.unwrap();
}

#[tokio::test]
async fn concurrent_workers_run_a_job_once() {
    let (a, url, _dir) = setup(&single_province(0, &[])).await;
    let b = runner_for(&url).await;

    let (ra, rb) = tokio::join!(a.run(JobKind::TaxIncome), b.run(JobKind::TaxIncome));
    let completed = [ra.unwrap(), rb.unwrap()]
        .iter()
        .filter(|o| o.is_completed())
        .count();
    assert_eq!(completed, 1);
    // 800_000 * 0.05, no consumer goods
    assert_eq!(stored(&a).await.nations[&NationId(1)].money, 40_000);
}

#[tokio::test]
async fn unaffordable_building_changes_nothing() {
    let (runner, _url, _dir) = setup(&single_province(50, &[(BuildingKind::Farms, 1)])).await;

    let outcome = runner.run(JobKind::ProvinceRevenue).await.unwrap();
    let JobOutcome::Completed {
        report: JobReport::Revenue(report),
    } = outcome
    else {
        panic!("expected a revenue report, got {outcome:?}");
    };
    assert_eq!(report.buildings_run, 0);
    assert_eq!(report.buildings_skipped, 1);

    let state = stored(&runner).await;
    let nation = &state.nations[&NationId(1)];
    assert_eq!(nation.money, 50);
    assert_eq!(nation.resources.get(Resource::Rations), 0);
}

#[tokio::test]
async fn partial_consumer_goods_drain_to_zero() {
    let mut state = single_province(0, &[]);
    state
        .nations
        .get_mut(&NationId(1))
        .unwrap()
        .resources
        .set(Resource::ConsumerGoods, 5);
    let (runner, _url, _dir) = setup(&state).await;

    runner.run(JobKind::TaxIncome).await.unwrap();
    let nation = &stored(&runner).await.nations[&NationId(1)];
    // 40_000 * (1 + 0.5 * 5/10)
    assert_eq!(nation.money, 50_000);
    assert_eq!(nation.resources.get(Resource::ConsumerGoods), 0);
}

#[tokio::test]
async fn all_jobs_keep_the_fleet_valid() {
    let catalog = Catalog::standard().unwrap();
    let fleet = demo_fleet(
        &catalog,
        FleetSpec {
            nations: 6,
            provinces_per_nation: 8,
            seed: 11,
        },
    );
    let (runner, _url, _dir) = setup(&fleet).await;

    for job in [JobKind::ProvinceRevenue, JobKind::PopulationGrowth, JobKind::TaxIncome] {
        assert!(runner.run(job).await.unwrap().is_completed(), "{job} did not run");
    }

    let state = stored(&runner).await;
    state.check_invariants().unwrap();
    for p in state.provinces.values() {
        assert!(p.population >= fleet.provinces[&p.id].population);
        for v in [
            p.fields.happiness,
            p.fields.productivity,
            p.fields.pollution,
            p.fields.consumer_spending,
        ] {
            assert!((0..=100).contains(&v.value()));
        }
    }
    let runs = persistence::task_runs::all_runs(&runner.database().pool())
        .await
        .unwrap();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.last_success.is_some()));
}

#[tokio::test]
async fn committed_ticks_invalidate_cached_snapshots() {
    let (runner, _url, _dir) = setup(&single_province(0, &[])).await;
    let pool = runner.database().pool();
    let before = runner.loader().nation_snapshot(&pool, NationId(1)).await.unwrap();
    assert_eq!(before.nations[&NationId(1)].money, 0);

    runner.run(JobKind::TaxIncome).await.unwrap();
    let after = runner.loader().nation_snapshot(&pool, NationId(1)).await.unwrap();
    assert_eq!(after.nations[&NationId(1)].money, 40_000);
}
