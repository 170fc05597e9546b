//! Scenario definition and RON file loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::verification::VerificationCondition;

/// World a scenario runs in; unset fields fall back to the runner config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSpec {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub max_speed: Option<f32>,
    #[serde(default)]
    pub freeze_after_ticks: Option<u32>,
}

/// One edit or step applied to the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScenarioAction {
    /// Place a material (by registry name) in one cell
    SetMaterial { x: i32, y: i32, material: String },

    /// Place a material in every cell of an inclusive rectangle
    FillRect {
        min_x: i32,
        min_y: i32,
        max_x: i32,
        max_y: i32,
        material: String,
    },

    /// Add liquid mass to a cell
    AddMass { x: i32, y: i32, amount: f32 },

    /// Turn a cell into an infinite source
    MarkSource { x: i32, y: i32 },

    /// Remove an infinite source
    ClearSource { x: i32, y: i32 },

    /// Load a section, optionally so it never freezes
    Activate {
        chunk_x: i32,
        chunk_y: i32,
        #[serde(default)]
        permanent: bool,
    },

    /// Unload a section
    Deactivate { chunk_x: i32, chunk_y: i32 },

    /// Advance the simulation
    Tick { count: u64 },

    /// Write a message to the execution log
    Log { message: String },
}

/// Top-level scenario definition loaded from RON files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Scenario name
    pub name: String,

    /// Description
    #[serde(default)]
    pub description: String,

    pub world: WorldSpec,

    /// Initial setup actions (run before main scenario)
    #[serde(default)]
    pub setup: Vec<ScenarioAction>,

    /// Main scenario actions
    pub actions: Vec<ScenarioAction>,

    /// Verification checks to run after scenario
    #[serde(default)]
    pub verify: Vec<VerificationCondition>,
}

impl ScenarioDefinition {
    /// Load scenario from RON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;

        Self::from_ron(&content)
            .with_context(|| format!("Failed to parse RON scenario: {}", path.display()))
    }

    pub fn from_ron(content: &str) -> Result<Self> {
        let scenario = ron::from_str(content)?;
        Ok(scenario)
    }

    /// Save scenario to RON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let ron = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to serialize scenario to RON")?;

        std::fs::write(path.as_ref(), ron).with_context(|| {
            format!("Failed to write scenario file: {}", path.as_ref().display())
        })?;

        Ok(())
    }

    /// Total ticks the actions request
    pub fn tick_count(&self) -> u64 {
        self.setup
            .iter()
            .chain(&self.actions)
            .map(|action| match action {
                ScenarioAction::Tick { count } => *count,
                _ => 0,
            })
            .sum()
    }
}
