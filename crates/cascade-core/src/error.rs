//! Simulation errors

use glam::IVec2;
use thiserror::Error;

use cascade_simulation::{MaterialError, MaterialType};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Material(#[from] MaterialError),
    #[error("material id {0} is not registered")]
    InvalidMaterial(u16),
    #[error("no {0:?} material registered")]
    MissingMaterial(MaterialType),
    #[error("chunk ({}, {}) is outside the world", .0.x, .0.y)]
    ChunkOutOfRange(IVec2),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("mass delta must be finite, got {0}")]
    InvalidMass(f32),
    #[error("failed to allocate {cells} cells for {what}")]
    Allocation { what: &'static str, cells: usize },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
