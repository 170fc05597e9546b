//! Liquid mass transport
//!
//! Every liquid cell pushes mass to its neighbours in the order down, left,
//! right, up. Downward flow fills the column to its compressed equilibrium,
//! sideways flow equalises, and whatever pressure is left pushes mass up.
//! All reads come from the pre-tick snapshot; the amounts are scattered as
//! deltas into the scratch mass buffer.

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::chunk::SectionMask;
use crate::config::SimConfig;
use crate::grid::GridView;
use crate::partition::{RowWindow, for_each_row_striped};
use cascade_simulation::{MaterialId, MaterialType};

/// Flow constants, see [`SimConfig`] for their meaning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowParams {
    pub max_mass: f32,
    pub max_compression: f32,
    pub min_mass: f32,
    pub min_flow: f32,
    pub max_speed: f32,
    pub mass_ceiling: f32,
}

impl From<&SimConfig> for FlowParams {
    fn from(config: &SimConfig) -> Self {
        Self {
            max_mass: config.max_mass,
            max_compression: config.max_compression,
            min_mass: config.min_mass,
            min_flow: config.min_flow,
            max_speed: config.max_speed,
            mass_ceiling: config.mass_ceiling(),
        }
    }
}

impl FlowParams {
    /// Mass the lower of two stacked cells holds at equilibrium when the pair
    /// carries `total` mass
    pub fn stable_mass(&self, total: f32) -> f32 {
        let max = self.max_mass;
        let compression = self.max_compression;
        if total <= max {
            max
        } else if total < 2.0 * max + compression {
            (max * max + total * compression) / (max + compression)
        } else {
            (total + compression) / 2.0
        }
    }

    /// Damp small flows, then bound by speed and by what the cell has left
    #[inline]
    fn limit(&self, flow: f32, remaining: f32) -> f32 {
        let flow = if flow < self.min_flow { flow * 0.5 } else { flow };
        flow.max(0.0).min(self.max_speed.min(remaining))
    }
}

/// Liquid flow kernel
#[derive(Debug, Clone)]
pub struct FlowSimulator {
    params: FlowParams,
}

impl FlowSimulator {
    pub fn new(params: FlowParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    /// Scatter this tick's flows into `masses` (pre-filled with the snapshot).
    /// Returns the number of non-zero transfers.
    pub fn accumulate(
        &self,
        pool: &ThreadPool,
        view: GridView<'_>,
        solid: &[bool],
        mask: &SectionMask,
        masses: &mut [f32],
    ) -> usize {
        let counts = for_each_row_striped(pool, masses, view.width(), |y, window| {
            self.flow_row(view, solid, mask, y, window)
        });
        counts.into_iter().sum()
    }

    fn flow_row(
        &self,
        view: GridView<'_>,
        solid: &[bool],
        mask: &SectionMask,
        y: usize,
        window: &mut RowWindow<'_, f32>,
    ) -> usize {
        let is_solid = |x: usize, y: usize| -> bool {
            solid
                .get(view.material(x, y) as usize)
                .copied()
                .unwrap_or(false)
        };
        let width = view.width();
        let height = view.height();
        let p = &self.params;
        let mut transfers = 0;

        for span in mask.row_spans(y) {
            for x in span {
                if is_solid(x, y) {
                    continue;
                }
                let mut remaining = view.mass(x, y);
                if remaining <= 0.0 {
                    continue;
                }

                // Down
                if y + 1 < height && !is_solid(x, y + 1) {
                    let below = view.mass(x, y + 1);
                    let flow = p.limit(p.stable_mass(remaining + below) - below, remaining);
                    if transfer(window, (x, y), (x, y + 1), flow) {
                        remaining -= flow;
                        transfers += 1;
                    }
                }
                if remaining <= 0.0 {
                    continue;
                }

                // Left
                if x > 0 && !is_solid(x - 1, y) {
                    let left = view.mass(x - 1, y);
                    let flow = p.limit((remaining - left) / 4.0, remaining);
                    if transfer(window, (x, y), (x - 1, y), flow) {
                        remaining -= flow;
                        transfers += 1;
                    }
                }
                if remaining <= 0.0 {
                    continue;
                }

                // Right
                if x + 1 < width && !is_solid(x + 1, y) {
                    let right = view.mass(x + 1, y);
                    let flow = p.limit((remaining - right) / 4.0, remaining);
                    if transfer(window, (x, y), (x + 1, y), flow) {
                        remaining -= flow;
                        transfers += 1;
                    }
                }
                if remaining <= 0.0 {
                    continue;
                }

                // Up, only what the column below can't hold
                if y > 0 && !is_solid(x, y - 1) {
                    let above = view.mass(x, y - 1);
                    let flow = p.limit(remaining - p.stable_mass(remaining + above), remaining);
                    if transfer(window, (x, y), (x, y - 1), flow) {
                        transfers += 1;
                    }
                }
            }
        }

        transfers
    }

    /// Clamp committed masses and make the material ids agree with them.
    ///
    /// Solids carry no mass. A non-solid cell holding at least `min_mass`
    /// becomes liquid (keeping its own liquid if it already is one), anything
    /// lighter turns to air.
    pub fn settle(
        &self,
        pool: &ThreadPool,
        types: &[MaterialType],
        liquid: u16,
        materials: &mut [u16],
        masses: &mut [f32],
    ) {
        let p = &self.params;
        pool.install(|| {
            materials
                .par_iter_mut()
                .zip(masses.par_iter_mut())
                .for_each(|(material, mass)| {
                    let material_type = types
                        .get(*material as usize)
                        .copied()
                        .unwrap_or(MaterialType::Gas);
                    if material_type.is_solid() {
                        *mass = 0.0;
                        return;
                    }
                    *mass = mass.max(0.0).min(p.mass_ceiling);
                    if *mass >= p.min_mass {
                        if material_type != MaterialType::Liquid {
                            *material = liquid;
                        }
                    } else {
                        *material = MaterialId::AIR;
                    }
                });
        });
    }
}

/// Move `amount` from one slot of the window to another
#[inline]
fn transfer(
    window: &mut RowWindow<'_, f32>,
    from: (usize, usize),
    to: (usize, usize),
    amount: f32,
) -> bool {
    if amount <= 0.0 {
        return false;
    }
    match window.get_mut(to.0, to.1) {
        Some(slot) => *slot += amount,
        None => return false,
    }
    if let Some(slot) = window.get_mut(from.0, from.1) {
        *slot -= amount;
    }
    true
}
