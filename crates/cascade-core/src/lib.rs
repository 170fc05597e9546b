//! Cascade core - cellular-automaton material transport
//!
//! Liquid mass flow and falling powders over a double-buffered grid, scheduled
//! per fixed-size chunk section and run on a rayon worker pool.

pub mod chunk;
pub mod config;
pub mod error;
pub mod flow;
pub mod granular;
pub mod grid;
pub mod partition;
pub mod render;
pub mod scheduler;
pub mod simulation;
pub mod stats;

pub use chunk::{DirtyRect, SectionState};
pub use config::SimConfig;
pub use error::{Result, SimError};
pub use grid::Grid;
pub use render::render_ascii;
pub use simulation::Simulation;
pub use stats::{NoopStats, SimStats, TickCounters, TickReport};

// Re-export the data crate so hosts need only one dependency
pub use cascade_simulation::{
    Cell, DEFAULT_CHUNK_SIZE, MaterialDef, MaterialError, MaterialId, MaterialType, Materials,
};
