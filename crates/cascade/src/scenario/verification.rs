//! Verification conditions and state checks for scenarios

use cascade_core::{SectionState, Simulation};
use glam::IVec2;
use serde::{Deserialize, Serialize};

/// Conditions that can be verified against simulation state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VerificationCondition {
    // === CELL CHECKS ===
    /// Assert the material of one cell
    CellMaterial { x: i32, y: i32, material: String },

    /// Assert a cell holds more than `min` mass
    MassAbove { x: i32, y: i32, min: f32 },

    /// Assert exact material count in region
    MaterialCount {
        material: String,
        region: Region,
        expected: usize,
        tolerance: Option<usize>, // Allow ±N variance
    },

    // === WORLD CHECKS ===
    /// Assert the total liquid mass
    TotalMass { expected: f64, tolerance: f64 },

    /// Assert the state of a section
    SectionIs {
        chunk_x: i32,
        chunk_y: i32,
        expected: SectionState,
    },

    // === LOGICAL OPERATORS ===
    /// All conditions must pass
    All {
        conditions: Vec<VerificationCondition>,
    },

    /// Any condition must pass
    Any {
        conditions: Vec<VerificationCondition>,
    },

    /// Condition must NOT pass
    Not {
        condition: Box<VerificationCondition>,
    },
}

/// Spatial region for verification
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Region {
    /// Inclusive rectangle, clamped to the world
    Rect {
        min_x: i32,
        min_y: i32,
        max_x: i32,
        max_y: i32,
    },

    /// Entire world
    Whole,
}

/// Result of a verification check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub message: String,
    pub actual_value: Option<String>, // For debugging
}

impl VerificationResult {
    fn failed(message: String) -> Self {
        Self {
            passed: false,
            message,
            actual_value: None,
        }
    }
}

/// Resolve a material name, falling back to a numeric id
fn material_id(sim: &Simulation, name: &str) -> Option<u16> {
    sim.materials()
        .by_name(name)
        .map(|m| m.id)
        .or_else(|| name.parse().ok().filter(|&id| sim.materials().contains(id)))
}

fn material_name(sim: &Simulation, id: u16) -> String {
    sim.materials()
        .try_get(id)
        .map_or_else(|| id.to_string(), |m| m.name.clone())
}

fn count_material_in_region(sim: &Simulation, material: u16, region: &Region) -> usize {
    let grid = sim.grid();
    let (min_x, min_y, max_x, max_y) = match *region {
        Region::Whole => (0, 0, grid.width() - 1, grid.height() - 1),
        Region::Rect {
            min_x,
            min_y,
            max_x,
            max_y,
        } => {
            let (x0, y0) = grid.clamp_coords(min_x.min(max_x), min_y.min(max_y));
            let (x1, y1) = grid.clamp_coords(min_x.max(max_x), min_y.max(max_y));
            (x0, y0, x1, y1)
        }
    };

    let mut count = 0;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            if grid.get_index(x + y * grid.width()).material_id == material {
                count += 1;
            }
        }
    }
    count
}

impl VerificationCondition {
    /// Evaluate condition against simulation state
    pub fn evaluate(&self, sim: &Simulation) -> VerificationResult {
        match self {
            VerificationCondition::CellMaterial { x, y, material } => {
                let Some(expected) = material_id(sim, material) else {
                    return VerificationResult::failed(format!("Unknown material '{material}'"));
                };
                let actual = sim.get_cell(*x, *y).material_id;
                VerificationResult {
                    passed: actual == expected,
                    message: format!(
                        "Material at ({}, {}): expected {}, got {}",
                        x,
                        y,
                        material,
                        material_name(sim, actual)
                    ),
                    actual_value: Some(actual.to_string()),
                }
            }

            VerificationCondition::MassAbove { x, y, min } => {
                let actual = sim.get_cell(*x, *y).mass;
                VerificationResult {
                    passed: actual > *min,
                    message: format!("Mass at ({x}, {y}): expected > {min}, got {actual}"),
                    actual_value: Some(actual.to_string()),
                }
            }

            VerificationCondition::MaterialCount {
                material,
                region,
                expected,
                tolerance,
            } => {
                let Some(id) = material_id(sim, material) else {
                    return VerificationResult::failed(format!("Unknown material '{material}'"));
                };
                let actual = count_material_in_region(sim, id, region);
                let tol = tolerance.unwrap_or(0);
                let passed = actual >= expected.saturating_sub(tol) && actual <= expected + tol;

                VerificationResult {
                    passed,
                    message: format!(
                        "Material {} count in {:?}: expected {}±{}, got {}",
                        material, region, expected, tol, actual
                    ),
                    actual_value: Some(actual.to_string()),
                }
            }

            VerificationCondition::TotalMass {
                expected,
                tolerance,
            } => {
                let actual = sim.total_liquid_mass();
                VerificationResult {
                    passed: (actual - expected).abs() <= *tolerance,
                    message: format!(
                        "Total liquid mass: expected {expected}±{tolerance}, got {actual:.4}"
                    ),
                    actual_value: Some(format!("{actual:.6}")),
                }
            }

            VerificationCondition::SectionIs {
                chunk_x,
                chunk_y,
                expected,
            } => match sim.section_state(IVec2::new(*chunk_x, *chunk_y)) {
                Ok(actual) => VerificationResult {
                    passed: actual == *expected,
                    message: format!(
                        "Section ({chunk_x}, {chunk_y}): expected {expected:?}, got {actual:?}"
                    ),
                    actual_value: Some(format!("{actual:?}")),
                },
                Err(e) => VerificationResult::failed(e.to_string()),
            },

            VerificationCondition::All { conditions } => {
                let results: Vec<_> = conditions.iter().map(|c| c.evaluate(sim)).collect();
                let failed: Vec<_> = results.iter().filter(|r| !r.passed).collect();
                VerificationResult {
                    passed: failed.is_empty(),
                    message: format!(
                        "All: {}/{} passed",
                        results.len() - failed.len(),
                        results.len()
                    ),
                    actual_value: failed.first().map(|r| r.message.clone()),
                }
            }

            VerificationCondition::Any { conditions } => {
                let results: Vec<_> = conditions.iter().map(|c| c.evaluate(sim)).collect();
                let passed = results.iter().filter(|r| r.passed).count();
                VerificationResult {
                    passed: passed > 0,
                    message: format!("Any: {}/{} passed", passed, results.len()),
                    actual_value: None,
                }
            }

            VerificationCondition::Not { condition } => {
                let inner = condition.evaluate(sim);
                VerificationResult {
                    passed: !inner.passed,
                    message: format!("Not: {}", inner.message),
                    actual_value: inner.actual_value,
                }
            }
        }
    }
}
