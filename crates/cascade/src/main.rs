use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use cascade::scenario::{
    ScenarioDefinition, ScenarioExecutor, ScenarioExecutorConfig, build_simulation,
};
use cascade::{AppConfig, RainDemo};
use cascade_core::{Materials, Simulation, TickCounters, render_ascii};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run a RON scenario instead of the rain demo
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Configuration file (default: cascade.ron if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks for the rain demo
    #[arg(long)]
    ticks: Option<u64>,

    /// World width in cells
    #[arg(long)]
    width: Option<usize>,

    /// World height in cells
    #[arg(long)]
    height: Option<usize>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Seed for the rain demo
    #[arg(long)]
    seed: Option<u64>,

    /// Print the final grid as text
    #[arg(long)]
    dump: bool,

    /// Write the scenario execution report to this RON file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn progress_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
        .progress_chars("█▓░"))
}

fn run_scenario(path: &Path, config: &AppConfig, args: &Args) -> Result<()> {
    let scenario = ScenarioDefinition::from_file(path)?;
    let mut sim = build_simulation(&scenario, &config.sim)?;

    let mut executor = ScenarioExecutor::with_config(ScenarioExecutorConfig {
        verbose: true,
        dump_final_grid: config.run.dump,
    });
    let report = executor.execute_scenario(&scenario, &mut sim)?;

    log::info!(
        "Scenario '{}': {} ticks, {} flows, {} grains moved, final mass {:.4}",
        report.scenario_name,
        report.counters.ticks,
        report.counters.flows,
        report.counters.grains_moved,
        report.final_mass
    );
    log::info!("{}", report.performance.summary());

    if let Some(grid) = &report.final_grid {
        println!("{grid}");
    }
    if let Some(out) = &args.report {
        report
            .save_ron(out)
            .with_context(|| format!("Failed to save report to {}", out.display()))?;
        log::info!("Report written to {}", out.display());
    }

    if !report.success() {
        for failure in &report.verification_failures {
            log::error!("FAIL {}", failure.message);
        }
        bail!(
            "Scenario '{}' failed {} of {} checks",
            report.scenario_name,
            report.verification_failures.len(),
            scenario.verify.len()
        );
    }
    log::info!("Scenario '{}' passed", report.scenario_name);
    Ok(())
}

fn run_demo(config: &AppConfig) -> Result<()> {
    let run = &config.run;
    let mut sim = Simulation::new(Materials::with_defaults(), config.sim.clone())?;
    let mut demo = RainDemo::new(run.seed, run.rain_per_tick);
    demo.build_world(&mut sim)?;

    let progress = if run.progress {
        let bar = ProgressBar::new(run.ticks);
        bar.set_style(progress_style()?);
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut counters = TickCounters::default();
    let start = Instant::now();
    for _ in 0..run.ticks {
        let report = demo.step(&mut sim, &mut counters)?;
        progress.set_message(format!(
            "mass {:.1}, {} frozen",
            report.total_mass, report.frozen_sections
        ));
        progress.inc(1);
    }
    progress.finish_and_clear();

    let elapsed = start.elapsed();
    log::info!(
        "Rain demo: {} ticks in {:.2}s ({:.3}ms/tick), {} flows, {} grains moved, {} sections frozen, {} woken",
        counters.ticks,
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / counters.ticks.max(1) as f64,
        counters.flows,
        counters.grains_moved,
        counters.sections_frozen,
        counters.sections_woken
    );
    log::info!("Final liquid mass: {:.4}", sim.total_liquid_mass());

    if run.dump {
        println!(
            "{}",
            render_ascii(sim.grid(), sim.materials(), sim.config().max_mass)
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(ticks) = args.ticks {
        config.run.ticks = ticks;
    }
    if let Some(width) = args.width {
        config.sim.width = width;
    }
    if let Some(height) = args.height {
        config.sim.height = height;
    }
    if let Some(threads) = args.threads {
        config.sim.worker_threads = threads;
    }
    if let Some(seed) = args.seed {
        config.run.seed = seed;
    }
    config.run.dump |= args.dump;

    match &args.scenario {
        Some(path) => run_scenario(path, &config, &args),
        None => {
            log::info!(
                "Starting rain demo: {}x{}, {} ticks, seed {}",
                config.sim.width,
                config.sim.height,
                config.run.ticks,
                config.run.seed
            );
            run_demo(&config)
        }
    }
}
