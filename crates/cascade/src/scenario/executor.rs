//! Scenario execution engine

use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use cascade_core::{Materials, SimConfig, Simulation, TickCounters, render_ascii};
use glam::IVec2;

use super::definition::{ScenarioAction, ScenarioDefinition};
use super::results::ExecutionReport;

/// Configuration for scenario executor
#[derive(Debug, Clone, Default)]
pub struct ScenarioExecutorConfig {
    /// Echo log lines through `log::info!`
    pub verbose: bool,

    /// Attach a text rendering of the final grid to the report
    pub dump_final_grid: bool,
}

/// Executes scenario actions against a simulation
#[derive(Debug, Default)]
pub struct ScenarioExecutor {
    config: ScenarioExecutorConfig,

    /// Action execution log
    log: Vec<String>,

    /// Simulation totals for the current run
    counters: TickCounters,

    /// Tick timings (milliseconds)
    tick_times: Vec<f64>,
}

/// Build the world a scenario asks for on top of the runner's settings
pub fn build_simulation(scenario: &ScenarioDefinition, base: &SimConfig) -> Result<Simulation> {
    let world = &scenario.world;
    let config = SimConfig {
        width: world.width,
        height: world.height,
        chunk_size: world.chunk_size.unwrap_or(base.chunk_size),
        max_speed: world.max_speed.unwrap_or(base.max_speed),
        freeze_after_ticks: world.freeze_after_ticks.unwrap_or(base.freeze_after_ticks),
        ..base.clone()
    };
    Simulation::new(Materials::with_defaults(), config)
        .with_context(|| format!("Failed to create world for scenario '{}'", scenario.name))
}

impl ScenarioExecutor {
    /// Create new executor with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new executor with custom config
    pub fn with_config(config: ScenarioExecutorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    fn log(&mut self, message: &str) {
        if self.config.verbose {
            log::info!("{message}");
        }
        self.log.push(message.to_string());
    }

    /// Execute a complete scenario
    pub fn execute_scenario(
        &mut self,
        scenario: &ScenarioDefinition,
        sim: &mut Simulation,
    ) -> Result<ExecutionReport> {
        let start_time = Instant::now();
        let mut report = ExecutionReport::new(scenario.name.clone());

        self.log.clear();
        self.tick_times.clear();
        self.counters = TickCounters::default();

        self.log(&format!("Starting scenario: {}", scenario.name));
        if !scenario.description.is_empty() {
            self.log(&format!("Description: {}", scenario.description));
        }

        if !scenario.setup.is_empty() {
            self.log(&format!("Running {} setup actions", scenario.setup.len()));
            for (idx, action) in scenario.setup.iter().enumerate() {
                if let Err(e) = self.execute_action(action, sim) {
                    let msg = format!("Setup action {idx} failed: {e:#}");
                    self.log(&msg);
                    return Err(anyhow!(msg));
                }
            }
        }

        self.log(&format!("Running {} main actions", scenario.actions.len()));
        for (idx, action) in scenario.actions.iter().enumerate() {
            if let Err(e) = self.execute_action(action, sim) {
                let msg = format!("Action {idx} failed: {e:#}");
                self.log(&msg);
                return Err(anyhow!(msg));
            }
        }
        report.actions_executed = scenario.setup.len() + scenario.actions.len();

        if !scenario.verify.is_empty() {
            self.log(&format!("Running {} verifications", scenario.verify.len()));
            for condition in &scenario.verify {
                let result = condition.evaluate(sim);
                self.log(&format!(
                    "  {} {}",
                    if result.passed { "PASS" } else { "FAIL" },
                    result.message
                ));
                if !result.passed {
                    report.verification_failures.push(result);
                }
            }
        }

        if self.config.dump_final_grid {
            report.final_grid = Some(render_ascii(
                sim.grid(),
                sim.materials(),
                sim.config().max_mass,
            ));
        }

        report.passed = report.success();
        report.counters = self.counters.clone();
        report.final_mass = sim.total_liquid_mass();
        report.log = self.log.clone();

        report.performance.total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        if !self.tick_times.is_empty() {
            report.performance.avg_tick_time_ms =
                self.tick_times.iter().sum::<f64>() / self.tick_times.len() as f64;
            report.performance.peak_tick_time_ms =
                self.tick_times.iter().copied().fold(0.0, f64::max);
        }

        Ok(report)
    }

    fn material(sim: &Simulation, name: &str) -> Result<u16> {
        sim.materials()
            .by_name(name)
            .map(|m| m.id)
            .ok_or_else(|| anyhow!("Unknown material '{name}'"))
    }

    /// Execute a single action
    pub fn execute_action(&mut self, action: &ScenarioAction, sim: &mut Simulation) -> Result<()> {
        match action {
            ScenarioAction::SetMaterial { x, y, material } => {
                let id = Self::material(sim, material)?;
                sim.set_material(*x, *y, id)?;
            }

            ScenarioAction::FillRect {
                min_x,
                min_y,
                max_x,
                max_y,
                material,
            } => {
                let id = Self::material(sim, material)?;
                sim.fill_rect(*min_x, *min_y, *max_x, *max_y, id)?;
            }

            ScenarioAction::AddMass { x, y, amount } => {
                sim.add_mass(*x, *y, *amount)?;
            }

            ScenarioAction::MarkSource { x, y } => sim.mark_infinite_source(*x, *y),

            ScenarioAction::ClearSource { x, y } => sim.clear_infinite_source(*x, *y),

            ScenarioAction::Activate {
                chunk_x,
                chunk_y,
                permanent,
            } => {
                let coord = IVec2::new(*chunk_x, *chunk_y);
                if *permanent {
                    sim.activate_permanent(coord)?;
                } else {
                    sim.activate(coord)?;
                }
            }

            ScenarioAction::Deactivate { chunk_x, chunk_y } => {
                sim.deactivate(IVec2::new(*chunk_x, *chunk_y))?;
            }

            ScenarioAction::Tick { count } => {
                for _ in 0..*count {
                    let tick_start = Instant::now();
                    sim.tick_with_stats(&mut self.counters)?;
                    self.tick_times
                        .push(tick_start.elapsed().as_secs_f64() * 1000.0);
                }
                self.log(&format!(
                    "Ticked {} times (now at tick {})",
                    count,
                    sim.tick_count()
                ));
            }

            ScenarioAction::Log { message } => self.log(message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{VerificationCondition, WorldSpec};

    fn scenario(actions: Vec<ScenarioAction>, verify: Vec<VerificationCondition>) -> ScenarioDefinition {
        ScenarioDefinition {
            name: "test".to_string(),
            description: String::new(),
            world: WorldSpec {
                width: 3,
                height: 3,
                ..Default::default()
            },
            setup: vec![],
            actions,
            verify,
        }
    }

    #[test]
    fn test_falling_water_scenario() {
        let scenario = scenario(
            vec![
                ScenarioAction::SetMaterial {
                    x: 1,
                    y: 1,
                    material: "water".to_string(),
                },
                ScenarioAction::Tick { count: 1 },
            ],
            vec![
                VerificationCondition::CellMaterial {
                    x: 1,
                    y: 2,
                    material: "water".to_string(),
                },
                VerificationCondition::CellMaterial {
                    x: 1,
                    y: 1,
                    material: "air".to_string(),
                },
            ],
        );
        let mut sim = build_simulation(&scenario, &SimConfig::default()).unwrap();
        let report = ScenarioExecutor::new()
            .execute_scenario(&scenario, &mut sim)
            .unwrap();

        assert!(report.passed, "{:?}", report.verification_failures);
        assert_eq!(report.counters.ticks, 1);
        assert_eq!(report.actions_executed, 2);
        assert!((report.final_mass - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_verification_is_reported() {
        let scenario = scenario(
            vec![ScenarioAction::Tick { count: 2 }],
            vec![VerificationCondition::MassAbove {
                x: 0,
                y: 0,
                min: 0.5,
            }],
        );
        let mut sim = build_simulation(&scenario, &SimConfig::default()).unwrap();
        let report = ScenarioExecutor::new()
            .execute_scenario(&scenario, &mut sim)
            .unwrap();

        assert!(!report.passed);
        assert_eq!(report.verification_failures.len(), 1);
        assert!(report.log.iter().any(|line| line.contains("FAIL")));
    }

    #[test]
    fn test_unknown_material_aborts() {
        let scenario = scenario(
            vec![ScenarioAction::SetMaterial {
                x: 0,
                y: 0,
                material: "lava".to_string(),
            }],
            vec![],
        );
        let mut sim = build_simulation(&scenario, &SimConfig::default()).unwrap();
        let err = ScenarioExecutor::new()
            .execute_scenario(&scenario, &mut sim)
            .unwrap_err();
        assert!(err.to_string().contains("lava"));
    }

    #[test]
    fn test_out_of_range_chunk_aborts() {
        let scenario = scenario(
            vec![ScenarioAction::Activate {
                chunk_x: 4,
                chunk_y: 0,
                permanent: false,
            }],
            vec![],
        );
        let mut sim = build_simulation(&scenario, &SimConfig::default()).unwrap();
        assert!(ScenarioExecutor::new()
            .execute_scenario(&scenario, &mut sim)
            .is_err());
    }

    #[test]
    fn test_dump_final_grid() {
        let scenario = scenario(
            vec![ScenarioAction::FillRect {
                min_x: 0,
                min_y: 2,
                max_x: 2,
                max_y: 2,
                material: "stone".to_string(),
            }],
            vec![],
        );
        let mut sim = build_simulation(&scenario, &SimConfig::default()).unwrap();
        let mut executor = ScenarioExecutor::with_config(ScenarioExecutorConfig {
            dump_final_grid: true,
            ..Default::default()
        });
        let report = executor.execute_scenario(&scenario, &mut sim).unwrap();
        assert_eq!(report.final_grid.as_deref(), Some("   \n   \n###\n"));
    }
}
