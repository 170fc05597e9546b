//! Material definitions and registry

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ids of the materials registered by [`Materials::with_defaults`]
pub struct MaterialId;

impl MaterialId {
    pub const AIR: u16 = 0;
    pub const STONE: u16 = 1;
    pub const SAND: u16 = 2;
    pub const WATER: u16 = 3;
    pub const BEDROCK: u16 = 4;
}

/// How a material behaves physically
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialType {
    /// Doesn't move (stone, bedrock)
    Solid,
    /// Falls, piles up (sand, gravel)
    Powder,
    /// Carries mass, flows and seeks level (water)
    Liquid,
    /// Empty space (air)
    Gas,
}

impl MaterialType {
    /// Solids and powders block liquid flow and falling grains
    pub fn is_solid(self) -> bool {
        matches!(self, MaterialType::Solid | MaterialType::Powder)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterialError {
    #[error("material id {id} out of range ({registered} registered)")]
    OutOfRange { id: u16, registered: usize },
    #[error("material registry is full")]
    RegistryFull,
}

/// Definition of a material's properties
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialDef {
    pub id: u16,
    pub name: String,
    pub material_type: MaterialType,

    /// Base color (RGBA)
    pub color: [u8; 4],
}

impl MaterialDef {
    #[inline]
    pub fn is_solid(&self) -> bool {
        self.material_type.is_solid()
    }
}

/// Append-only registry of all materials.
///
/// Ids are handed out sequentially starting at 0, which is always air.
#[derive(Clone, Debug)]
pub struct Materials {
    materials: Vec<MaterialDef>,
}

impl Materials {
    /// Registry holding only air
    pub fn new() -> Self {
        let mut materials = Self {
            materials: Vec::new(),
        };
        materials.materials.push(MaterialDef {
            id: MaterialId::AIR,
            name: "air".to_string(),
            material_type: MaterialType::Gas,
            color: [0, 0, 0, 0], // Transparent
        });
        materials
    }

    /// Registry with the stock materials listed in [`MaterialId`]
    pub fn with_defaults() -> Self {
        let mut materials = Self::new();
        materials.register_defaults();
        materials
    }

    fn register_defaults(&mut self) {
        let defaults = [
            (MaterialId::STONE, "stone", MaterialType::Solid, [128, 128, 128, 255]),
            (MaterialId::SAND, "sand", MaterialType::Powder, [194, 178, 128, 255]),
            (MaterialId::WATER, "water", MaterialType::Liquid, [64, 164, 223, 200]),
            (MaterialId::BEDROCK, "bedrock", MaterialType::Solid, [40, 40, 50, 255]),
        ];
        self.materials
            .extend(defaults.map(|(id, name, material_type, color)| MaterialDef {
                id,
                name: name.to_string(),
                material_type,
                color,
            }));
    }

    /// Append a material and return its definition with the assigned id
    pub fn register(
        &mut self,
        name: impl Into<String>,
        material_type: MaterialType,
        color: [u8; 4],
    ) -> Result<MaterialDef, MaterialError> {
        let id = u16::try_from(self.materials.len()).map_err(|_| MaterialError::RegistryFull)?;
        let material = MaterialDef {
            id,
            name: name.into(),
            material_type,
            color,
        };
        log::debug!(
            "Registered material {} '{}' ({:?})",
            id,
            material.name,
            material_type
        );
        self.materials.push(material.clone());
        Ok(material)
    }

    /// Get material definition by ID
    pub fn get(&self, id: u16) -> Result<&MaterialDef, MaterialError> {
        self.materials
            .get(id as usize)
            .ok_or(MaterialError::OutOfRange {
                id,
                registered: self.materials.len(),
            })
    }

    pub fn try_get(&self, id: u16) -> Option<&MaterialDef> {
        self.materials.get(id as usize)
    }

    pub fn contains(&self, id: u16) -> bool {
        (id as usize) < self.materials.len()
    }

    /// Unregistered ids count as non-solid
    pub fn is_solid(&self, id: u16) -> bool {
        self.try_get(id).is_some_and(MaterialDef::is_solid)
    }

    /// Get color for a material (transparent for unknown ids)
    pub fn get_color(&self, id: u16) -> [u8; 4] {
        self.try_get(id).map_or([0, 0, 0, 0], |m| m.color)
    }

    /// First registered material of the given type
    pub fn first_of(&self, material_type: MaterialType) -> Option<&MaterialDef> {
        self.materials
            .iter()
            .find(|m| m.material_type == material_type)
    }

    /// Look up a material by name
    pub fn by_name(&self, name: &str) -> Option<&MaterialDef> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Per-id material types, indexed by material id
    pub fn type_table(&self) -> Vec<MaterialType> {
        self.materials.iter().map(|m| m.material_type).collect()
    }

    /// Per-id solidity, indexed by material id
    pub fn solid_table(&self) -> Vec<bool> {
        self.materials.iter().map(MaterialDef::is_solid).collect()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Never true: air is always registered
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialDef> {
        self.materials.iter()
    }
}

impl Default for Materials {
    fn default() -> Self {
        Self::new()
    }
}
