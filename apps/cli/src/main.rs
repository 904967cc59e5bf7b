#![deny(warnings)]

//! Headless CLI: run or schedule the economy jobs, check their health, and
//! query read projections.

use anyhow::{anyhow, bail, Context, Result};
use persistence::seed::{demo_fleet, seed_state, FleetSpec};
use serde::Serialize;
use sim_core::{NationId, ProvinceId};
use sim_runtime::{EngineConfig, JobKind, Projections, SchedulerClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq)]
enum Command {
    Run(JobKind),
    Serve,
    Health,
    Tax(NationId),
    Rations(NationId),
    Effects(ProvinceId),
    Revenue(NationId),
    Seed(FleetSpec),
    Version,
}

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    command: Command,
}

const USAGE: &str = "usage: cli [--config <path>] <run <job>|serve|health|tax <nation>|rations <nation>|effects <province>|revenue <nation>|seed [--nations N] [--provinces N] [--seed S]|version>";

fn parse_id(value: Option<String>, what: &str) -> Result<i64> {
    let value = value.ok_or_else(|| anyhow!("missing {what} id\n{USAGE}"))?;
    value
        .parse()
        .with_context(|| format!("invalid {what} id: {value}"))
}

/// A non-negative number that fits `T`.
fn parse_count<T: TryFrom<i64>>(value: Option<String>, what: &str) -> Result<T> {
    let raw = parse_id(value, what)?;
    T::try_from(raw).map_err(|_| anyhow!("{what} out of range: {raw}"))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut config: Option<PathBuf> = None;
    let mut command: Option<Command> = None;
    let mut fleet = FleetSpec::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => config = it.next().map(PathBuf::from),
            "--nations" => fleet.nations = parse_count(it.next(), "nation count")?,
            "--provinces" => fleet.provinces_per_nation = parse_count(it.next(), "province count")?,
            "--seed" => fleet.seed = parse_count(it.next(), "seed")?,
            "run" => {
                let job = it.next().ok_or_else(|| anyhow!("missing job name\n{USAGE}"))?;
                command = Some(Command::Run(job.parse()?));
            }
            "serve" => command = Some(Command::Serve),
            "health" => command = Some(Command::Health),
            "tax" => command = Some(Command::Tax(NationId(parse_id(it.next(), "nation")?))),
            "rations" => command = Some(Command::Rations(NationId(parse_id(it.next(), "nation")?))),
            "effects" => {
                command = Some(Command::Effects(ProvinceId(parse_id(it.next(), "province")?)))
            }
            "revenue" => command = Some(Command::Revenue(NationId(parse_id(it.next(), "nation")?))),
            "seed" => command = Some(Command::Seed(FleetSpec::default())),
            "version" | "--version" => command = Some(Command::Version),
            other => bail!("unexpected argument: {other}\n{USAGE}"),
        }
    }
    let command = match command {
        Some(Command::Seed(_)) => Command::Seed(fleet),
        Some(c) => c,
        None => bail!("{USAGE}"),
    };
    Ok(Args { config, command })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.command == Command::Version {
        println!("cli {} ({} {})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"), env!("BUILD_DATE"));
        return Ok(());
    }
    let config = EngineConfig::load(args.config.as_deref())?;
    info!(command = ?args.command, url = %config.database.url, "starting CLI");

    if let Some(dir) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .map(std::path::Path::new)
        .and_then(|p| p.parent())
        .filter(|d| !d.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let runner = Arc::new(sim_runtime::bootstrap(config).await?);
    let projections = Projections::new(Arc::clone(runner.database()), Arc::clone(runner.loader()));

    match args.command {
        Command::Run(job) => print_json(&runner.run(job).await?)?,
        Command::Serve => {
            let mut scheduler = SchedulerClient::new(Arc::clone(&runner));
            scheduler.init()?;
            info!("scheduler running; ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown().await;
        }
        Command::Health => {
            let threshold = Duration::from_secs(runner.config().health.stale_after_secs);
            let report =
                sim_runtime::job_health(&runner.database().pool(), threshold, chrono::Utc::now())
                    .await?;
            print_json(&report)?;
            if !sim_runtime::all_healthy(&report) {
                bail!("one or more jobs are stale");
            }
        }
        Command::Tax(nation) => match projections.compute_tax_income(nation).await? {
            Some(assessment) => print_json(&assessment)?,
            None => bail!("nation {nation} owns no provinces"),
        },
        Command::Rations(nation) => {
            println!("{}", projections.rations_needed_for(nation).await?)
        }
        Command::Effects(province) => match projections.current_effects(province).await? {
            Some(effects) => print_json(&effects)?,
            None => bail!("no province {province}"),
        },
        Command::Revenue(nation) => match projections.projected_revenue(nation).await? {
            Some(projection) => print_json(&projection)?,
            None => bail!("no nation {nation}"),
        },
        Command::Seed(spec) => {
            let state = demo_fleet(runner.loader().catalog(), spec);
            seed_state(&runner.database().pool(), &state).await?;
            runner.loader().invalidate_all();
            println!(
                "Seeded | nations: {} | provinces: {}",
                state.nations.len(),
                state.provinces.len()
            );
        }
        Command::Version => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Result<Args> {
        parse_args(s.split_whitespace().map(String::from))
    }

    #[test]
    fn parses_commands_and_config() {
        let a = args("--config engine.yaml run generate_province_revenue").unwrap();
        assert_eq!(a.config, Some(PathBuf::from("engine.yaml")));
        assert_eq!(a.command, Command::Run(JobKind::ProvinceRevenue));
        assert_eq!(args("effects 12").unwrap().command, Command::Effects(ProvinceId(12)));
    }

    #[test]
    fn seed_options_apply_in_any_order() {
        let a = args("--nations 2 seed --seed 9").unwrap();
        let Command::Seed(spec) = a.command else {
            panic!("expected seed");
        };
        assert_eq!((spec.nations, spec.provinces_per_nation, spec.seed), (2, 5, 9));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(args("").is_err());
        assert!(args("run war").is_err());
        assert!(args("tax abc").is_err());
        assert!(args("seed --nations -1").is_err());
        assert!(args("seed --provinces 4294967296").is_err());
        assert!(args("seed --seed -5").is_err());
    }
}
