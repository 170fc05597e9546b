//! Material and cell data for Cascade
//!
//! This crate provides the foundational data types for the material simulation:
//! - Material definitions (MaterialId, MaterialDef, Materials)
//! - Material types (MaterialType)
//! - Cell type and chunk constants (Cell, DEFAULT_CHUNK_SIZE)

mod cell;
mod materials;

pub use cell::{Cell, DEFAULT_CHUNK_SIZE};
pub use materials::{MaterialDef, MaterialError, MaterialId, MaterialType, Materials};
