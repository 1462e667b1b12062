//! Monte-Carlo race sweep
//!
//! Run with:
//! ```
//! cargo run --release -- --races 200 --seed 7
//! cargo run --release -- --config sweep.json --route route.json --json
//! ```
//!
//! `--config` takes a JSON `SimulationConfig` (any field may be omitted),
//! `--route` a JSON array of `{ "length": m, "gradient": decimal }` segments.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use peloton::{default_route, physics, Body, Route, SimulationConfig, Simulator};
use tracing_subscriber::EnvFilter;

struct Args {
    config: Option<PathBuf>,
    route: Option<PathBuf>,
    races: Option<usize>,
    riders: Option<usize>,
    seed: Option<u64>,
    json: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        route: None,
        races: None,
        riders: None,
        seed: None,
        json: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(next_value(&mut iter, &arg)?.into()),
            "--route" => args.route = Some(next_value(&mut iter, &arg)?.into()),
            "--races" => {
                let value = next_value(&mut iter, &arg)?;
                args.races = Some(value.parse().with_context(|| format!("invalid --races value: {value}"))?);
            }
            "--riders" => {
                let value = next_value(&mut iter, &arg)?;
                args.riders = Some(value.parse().with_context(|| format!("invalid --riders value: {value}"))?);
            }
            "--seed" => {
                let value = next_value(&mut iter, &arg)?;
                args.seed = Some(value.parse().with_context(|| format!("invalid --seed value: {value}"))?);
            }
            "--json" => args.json = true,
            "--help" | "-h" => {
                println!(
                    "Usage: peloton [--config FILE] [--route FILE] [--races N] [--riders N] [--seed S] [--json]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(args)
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    iter.next().with_context(|| format!("{flag} needs a value"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;

    let mut config: SimulationConfig = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SimulationConfig::default(),
    };
    if let Some(races) = args.races {
        config.races = races;
    }
    if let Some(riders) = args.riders {
        config.riders_per_race = riders;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let route: Route = match &args.route {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading route {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing route {}", path.display()))?
        }
        None => default_route(),
    };

    let simulator = Simulator::new(route, config).context("invalid simulation setup")?;
    let summary = simulator.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let route = simulator.route();
    let constants = simulator.config().race.constants;
    let reference = Body::new(72.5, 0.3, 0.004);
    println!(
        "Route: {:.1} km, net elevation {:+.0} m",
        route.total_length() / 1000.0,
        route.elevation_gain()
    );
    for section in route.terrain_profile() {
        let gradient = section.gradient_pct / 100.0;
        let speed = physics::steady_state_speed(320.0, gradient, &reference, 1.0, &constants);
        println!(
            "  #{} {:>5.2} km {:>+5.1}% {:<8} (~{:.1} km/h solo at 320 W)",
            section.segment_index,
            section.length_km,
            section.gradient_pct,
            section.terrain.to_string(),
            speed * 3.6
        );
    }
    println!();
    println!("{summary}");

    Ok(())
}
