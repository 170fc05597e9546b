//! Runner configuration with layered loading
//!
//! Configuration is loaded from multiple sources (lowest to highest priority):
//! 1. Compiled defaults
//! 2. `cascade.ron` file (if exists), or the file passed with `--config`
//! 3. Environment variables prefixed with `CASCADE_`
//!
//! Example environment variable: `CASCADE_SIM__MAX_SPEED=0.5`

use std::path::Path;

use anyhow::{Context, Result};
use cascade_core::SimConfig;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Top-level runner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub sim: SimConfig,

    #[serde(default)]
    pub run: RunConfig,
}

/// Headless run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Ticks to simulate when no scenario is given
    pub ticks: u64,
    /// Seed for the rain demo
    pub seed: u64,
    /// Liquid cells dropped per tick by the rain demo
    pub rain_per_tick: u32,
    /// Print the final grid as text
    pub dump: bool,
    /// Show a progress bar while ticking
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: 600,
            seed: 42,
            rain_per_tick: 4,
            dump: false,
            progress: true,
        }
    }
}

impl AppConfig {
    /// Load configuration with layered priority:
    /// 1. Compiled defaults (lowest priority)
    /// 2. `cascade.ron` in the working directory, or `path` if given
    /// 3. Environment variables prefixed with `CASCADE_` (highest priority)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = AppConfig::default();
        let sim = &defaults.sim;
        let run = &defaults.run;

        let mut builder = Config::builder()
            // Layer 1: Compiled defaults
            .set_default("sim.width", sim.width as i64)?
            .set_default("sim.height", sim.height as i64)?
            .set_default("sim.chunk_size", sim.chunk_size as i64)?
            .set_default("sim.max_mass", sim.max_mass as f64)?
            .set_default("sim.max_compression", sim.max_compression as f64)?
            .set_default("sim.min_mass", sim.min_mass as f64)?
            .set_default("sim.min_flow", sim.min_flow as f64)?
            .set_default("sim.max_speed", sim.max_speed as f64)?
            .set_default("sim.freeze_after_ticks", sim.freeze_after_ticks as i64)?
            .set_default("sim.worker_threads", sim.worker_threads as i64)?
            .set_default("sim.load_all_sections", sim.load_all_sections)?
            .set_default("run.ticks", run.ticks as i64)?
            .set_default("run.seed", run.seed as i64)?
            .set_default("run.rain_per_tick", run.rain_per_tick as i64)?
            .set_default("run.dump", run.dump)?
            .set_default("run.progress", run.progress)?;

        // Layer 2: Config file
        builder = match path {
            Some(path) => builder.add_source(File::from(path).format(FileFormat::Ron).required(true)),
            None => builder.add_source(
                File::with_name("cascade")
                    .format(FileFormat::Ron)
                    .required(false),
            ),
        };

        // Layer 3: Environment variables (CASCADE_SIM__WIDTH, etc.)
        let config = builder
            .add_source(
                Environment::with_prefix("CASCADE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.sim
            .validate()
            .context("Invalid simulation configuration")?;
        Ok(app)
    }
}
