//! Simulation configuration

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use cascade_simulation::DEFAULT_CHUNK_SIZE;

/// World dimensions, flow constants and scheduling knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World width in cells
    pub width: usize,
    /// World height in cells
    pub height: usize,
    /// Edge length of a chunk section in cells
    pub chunk_size: usize,

    /// Mass of a full, uncompressed liquid cell
    pub max_mass: f32,
    /// Extra mass a cell may hold per cell of liquid stacked above it
    pub max_compression: f32,
    /// Cells below this mass render as air
    pub min_mass: f32,
    /// Flows smaller than this are halved to damp flicker
    pub min_flow: f32,
    /// Largest mass moved across one face per tick
    pub max_speed: f32,

    /// Ticks without any cell change before a loaded section freezes (0 = never)
    pub freeze_after_ticks: u32,
    /// Rayon worker threads (0 = rayon default)
    pub worker_threads: usize,
    /// Start with every section loaded instead of unloaded
    pub load_all_sections: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_mass: 1.0,
            max_compression: 0.02,
            min_mass: 0.0001,
            min_flow: 0.01,
            max_speed: 1.0,
            freeze_after_ticks: 60,
            worker_threads: 0,
            load_all_sections: false,
        }
    }
}

impl SimConfig {
    /// Config for a `width` x `height` world with default constants
    pub fn with_size(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Upper bound for a committed cell mass: a full column under compression
    pub fn mass_ceiling(&self) -> f32 {
        self.max_mass + self.max_compression * self.height as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SimError::InvalidConfig(format!(
                "world size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > i32::MAX as usize || self.height > i32::MAX as usize {
            return Err(SimError::InvalidConfig(format!(
                "world size {}x{} exceeds coordinate range",
                self.width, self.height
            )));
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(SimError::InvalidConfig("world area overflows".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(SimError::InvalidConfig(
                "chunk size must be non-zero".to_string(),
            ));
        }
        let positive = [
            ("max_mass", self.max_mass),
            ("max_speed", self.max_speed),
            ("min_mass", self.min_mass),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let non_negative = [
            ("max_compression", self.max_compression),
            ("min_flow", self.min_flow),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if self.min_mass > self.max_mass {
            return Err(SimError::InvalidConfig(format!(
                "min_mass {} exceeds max_mass {}",
                self.min_mass, self.max_mass
            )));
        }
        Ok(())
    }
}
