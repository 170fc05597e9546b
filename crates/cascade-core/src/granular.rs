//! Falling powders
//!
//! A powder falls straight down into any non-solid cell. When blocked it tries
//! one diagonal, chosen by the tick-global `fall_left` flag, which flips every
//! tick so piles grow symmetrically. Moves are planned from the snapshot and
//! written into the scratch material buffer.

use rayon::ThreadPool;

use crate::chunk::SectionMask;
use crate::grid::GridView;
use crate::partition::{RowWindow, for_each_row_striped};
use cascade_simulation::{MaterialId, MaterialType};

/// One powder cell moving from `from` to `to` (linear indices)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrainMove {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone)]
pub struct GranularSimulator {
    fall_left: bool,
}

impl Default for GranularSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl GranularSimulator {
    pub fn new() -> Self {
        Self { fall_left: true }
    }

    /// Diagonal preference of the current tick
    pub fn fall_left(&self) -> bool {
        self.fall_left
    }

    /// Advance the diagonal parity, once per tick
    pub fn flip(&mut self) {
        self.fall_left = !self.fall_left;
    }

    /// Plan and write this tick's powder moves into `materials` (pre-filled
    /// with the snapshot)
    pub fn plan(
        &self,
        pool: &ThreadPool,
        view: GridView<'_>,
        types: &[MaterialType],
        mask: &SectionMask,
        materials: &mut [u16],
    ) -> Vec<GrainMove> {
        let rows = for_each_row_striped(pool, materials, view.width(), |y, window| {
            self.plan_row(view, types, mask, y, window)
        });
        rows.into_iter().flatten().collect()
    }

    fn plan_row(
        &self,
        view: GridView<'_>,
        types: &[MaterialType],
        mask: &SectionMask,
        y: usize,
        window: &mut RowWindow<'_, u16>,
    ) -> Vec<GrainMove> {
        let mut moves = Vec::new();
        if y + 1 >= view.height() {
            return moves;
        }

        let type_of = |x: usize, y: usize| -> MaterialType {
            types
                .get(view.material(x, y) as usize)
                .copied()
                .unwrap_or(MaterialType::Gas)
        };
        let below = y + 1;

        for span in mask.row_spans(y) {
            for x in span {
                if type_of(x, y) != MaterialType::Powder {
                    continue;
                }

                let target_x = if !type_of(x, below).is_solid() {
                    Some(x)
                } else {
                    self.diagonal_target(view, mask, x, y, &type_of)
                };
                let Some(target_x) = target_x else {
                    continue;
                };

                let powder = view.material(x, y);
                if let Some(slot) = window.get_mut(target_x, below) {
                    *slot = powder;
                } else {
                    continue;
                }
                if let Some(slot) = window.get_mut(x, y) {
                    *slot = MaterialId::AIR;
                }
                moves.push(GrainMove {
                    from: view.index(x, y),
                    to: view.index(target_x, below),
                });
            }
        }

        moves
    }

    fn diagonal_target(
        &self,
        view: GridView<'_>,
        mask: &SectionMask,
        x: usize,
        y: usize,
        type_of: &impl Fn(usize, usize) -> MaterialType,
    ) -> Option<usize> {
        let target_x = if self.fall_left {
            x.checked_sub(1)?
        } else {
            let right = x + 1;
            if right >= view.width() {
                return None;
            }
            right
        };
        if type_of(target_x, y + 1).is_solid() {
            return None;
        }
        // A moving powder directly above the target falls into it this tick
        if type_of(target_x, y) == MaterialType::Powder && mask.contains(target_x, y) {
            return None;
        }
        Some(target_x)
    }

    /// Liquid displaced by a sinking powder moves into the cell it vacated
    pub fn displace_mass(moves: &[GrainMove], masses: &mut [f32]) {
        for grain in moves {
            masses[grain.from] = masses[grain.to];
            masses[grain.to] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use cascade_simulation::{Cell, Materials};

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    fn step(grid: &mut Grid, sim: &GranularSimulator) -> Vec<GrainMove> {
        let types = Materials::with_defaults().type_table();
        let mask = SectionMask::all(grid.width(), grid.height(), 64);
        let mut scratch = grid.begin_tick().unwrap();
        let moves = sim.plan(&pool(), grid.snapshot(), &types, &mask, scratch.materials_mut());
        GranularSimulator::displace_mass(&moves, scratch.masses_mut());
        grid.commit_tick(scratch);
        moves
    }

    #[test]
    fn test_falls_one_row_per_tick() {
        let mut grid = Grid::new(3, 5).unwrap();
        grid.set(1, 0, Cell::solid(MaterialId::SAND));
        let sim = GranularSimulator::new();

        for expected_y in 1..5 {
            let moves = step(&mut grid, &sim);
            assert_eq!(moves.len(), 1);
            assert_eq!(grid.get(1, expected_y).material_id, MaterialId::SAND);
            assert_eq!(grid.get(1, expected_y - 1).material_id, MaterialId::AIR);
        }

        // Resting on the bottom edge
        assert!(step(&mut grid, &sim).is_empty());
        assert_eq!(grid.get(1, 4).material_id, MaterialId::SAND);
    }

    #[test]
    fn test_diagonal_follows_fall_left() {
        let mut grid = Grid::new(3, 2).unwrap();
        grid.set(1, 0, Cell::solid(MaterialId::SAND));
        grid.set(1, 1, Cell::solid(MaterialId::STONE));

        let mut sim = GranularSimulator::new();
        assert!(sim.fall_left());
        step(&mut grid, &sim);
        assert_eq!(grid.get(0, 1).material_id, MaterialId::SAND);

        grid.set(0, 1, Cell::AIR);
        grid.set(1, 0, Cell::solid(MaterialId::SAND));
        sim.flip();
        step(&mut grid, &sim);
        assert_eq!(grid.get(2, 1).material_id, MaterialId::SAND);
        assert_eq!(grid.get(1, 0).material_id, MaterialId::AIR);
    }

    #[test]
    fn test_blocked_at_edge_stays() {
        let mut grid = Grid::new(2, 2).unwrap();
        grid.set(0, 0, Cell::solid(MaterialId::SAND));
        grid.set(0, 1, Cell::solid(MaterialId::STONE));
        grid.set(1, 1, Cell::solid(MaterialId::STONE));

        let sim = GranularSimulator::new();
        assert!(step(&mut grid, &sim).is_empty());
        assert_eq!(grid.get(0, 0).material_id, MaterialId::SAND);
    }

    #[test]
    fn test_diagonal_yields_to_falling_powder() {
        // Two grains side by side, the left one on stone
        let mut grid = Grid::new(3, 2).unwrap();
        grid.set(1, 0, Cell::solid(MaterialId::SAND));
        grid.set(0, 0, Cell::solid(MaterialId::SAND));
        grid.set(1, 1, Cell::solid(MaterialId::STONE));

        let sim = GranularSimulator::new();
        let moves = step(&mut grid, &sim);

        // (0,0) falls straight; (1,0) may not slide into the same cell
        assert_eq!(moves.len(), 1);
        assert_eq!(grid.get(0, 1).material_id, MaterialId::SAND);
        assert_eq!(grid.get(1, 0).material_id, MaterialId::SAND);
        assert_eq!(grid.get(0, 0).material_id, MaterialId::AIR);
    }

    #[test]
    fn test_sinks_through_liquid() {
        let mut grid = Grid::new(1, 2).unwrap();
        grid.set(0, 0, Cell::solid(MaterialId::SAND));
        grid.set(0, 1, Cell::new(MaterialId::WATER, 0.8));

        step(&mut grid, &GranularSimulator::new());

        assert_eq!(grid.get(0, 1), Cell::new(MaterialId::SAND, 0.0));
        assert_eq!(grid.get(0, 0).mass, 0.8);
    }

    #[test]
    fn test_column_moves_together() {
        let mut grid = Grid::new(1, 4).unwrap();
        grid.set(0, 0, Cell::solid(MaterialId::SAND));
        grid.set(0, 1, Cell::solid(MaterialId::SAND));

        // Only the bottom grain sees air below
        let moves = step(&mut grid, &GranularSimulator::new());
        assert_eq!(moves, vec![GrainMove { from: 1, to: 2 }]);
        assert_eq!(grid.get(0, 0).material_id, MaterialId::SAND);
        assert_eq!(grid.get(0, 1).material_id, MaterialId::AIR);
        assert_eq!(grid.get(0, 2).material_id, MaterialId::SAND);
    }
}
