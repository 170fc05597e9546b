//! Cell type and chunk constants
//!
//! Foundational types for the cell-based simulation.

use crate::MaterialId;
use serde::{Deserialize, Serialize};

/// Default edge length of a chunk section in cells
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// A single cell in the world
#[derive(Clone, Copy, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Material type (0 = air)
    pub material_id: u16,
    /// Liquid mass, zero for solids
    pub mass: f32,
}

impl Cell {
    pub const AIR: Cell = Cell {
        material_id: MaterialId::AIR,
        mass: 0.0,
    };

    pub fn new(material_id: u16, mass: f32) -> Self {
        Self { material_id, mass }
    }

    /// Cell of a solid or powder material
    pub fn solid(material_id: u16) -> Self {
        Self::new(material_id, 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.material_id == MaterialId::AIR && self.mass <= 0.0
    }
}
