//! Grid storage - per-cell material ids and masses with a double buffer
//!
//! The live state is two parallel arrays indexed by `x + y * width`. A tick reads
//! the live arrays through a [`GridView`] and writes into [`ScratchBuffers`]
//! obtained from [`Grid::begin_tick`]; [`Grid::commit_tick`] swaps them in.

use crate::error::{Result, SimError};
use cascade_simulation::{Cell, MaterialId};

fn try_alloc<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| SimError::Allocation { what, cells: len })?;
    buffer.resize(len, value);
    Ok(buffer)
}

/// Write target for one tick
#[derive(Debug)]
pub struct ScratchBuffers {
    materials: Vec<u16>,
    masses: Vec<f32>,
}

impl ScratchBuffers {
    fn allocate(len: usize) -> Result<Self> {
        Ok(Self {
            materials: try_alloc("scratch materials", len, MaterialId::AIR)?,
            masses: try_alloc("scratch masses", len, 0.0)?,
        })
    }

    pub fn materials(&self) -> &[u16] {
        &self.materials
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn materials_mut(&mut self) -> &mut [u16] {
        &mut self.materials
    }

    pub fn masses_mut(&mut self) -> &mut [f32] {
        &mut self.masses
    }

    /// Both buffers at once, for passes that touch ids and masses together
    pub fn split_mut(&mut self) -> (&mut [u16], &mut [f32]) {
        (&mut self.materials, &mut self.masses)
    }
}

/// Read-only view of the grid state at the start of a tick
#[derive(Clone, Copy, Debug)]
pub struct GridView<'a> {
    width: usize,
    height: usize,
    materials: &'a [u16],
    masses: &'a [f32],
}

impl<'a> GridView<'a> {
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }

    #[inline]
    pub fn material(&self, x: usize, y: usize) -> u16 {
        self.materials[self.index(x, y)]
    }

    #[inline]
    pub fn mass(&self, x: usize, y: usize) -> f32 {
        self.masses[self.index(x, y)]
    }

    pub fn materials(&self) -> &'a [u16] {
        self.materials
    }

    pub fn masses(&self) -> &'a [f32] {
        self.masses
    }
}

/// Owner of the world's cell state
#[derive(Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    materials: Vec<u16>,
    masses: Vec<f32>,
    /// Buffers displaced by the last commit, reused by the next tick
    spare: Option<ScratchBuffers>,
}

impl Grid {
    /// All-air grid with both buffer pairs allocated up front
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 || width > i32::MAX as usize || height > i32::MAX as usize
        {
            return Err(SimError::InvalidConfig(format!(
                "grid size {width}x{height} out of range"
            )));
        }
        let len = width.checked_mul(height).ok_or(SimError::Allocation {
            what: "grid",
            cells: usize::MAX,
        })?;
        Ok(Self {
            width,
            height,
            materials: try_alloc("grid materials", len, MaterialId::AIR)?,
            masses: try_alloc("grid masses", len, 0.0)?,
            spare: Some(ScratchBuffers::allocate(len)?),
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Never true: zero-sized grids are rejected at construction
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Clamp arbitrary coordinates into the grid
    #[inline]
    pub fn clamp_coords(&self, x: i32, y: i32) -> (usize, usize) {
        let max_x = self.width as i32 - 1;
        let max_y = self.height as i32 - 1;
        (x.clamp(0, max_x) as usize, y.clamp(0, max_y) as usize)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Linear index of the clamped position
    #[inline]
    pub fn index(&self, x: i32, y: i32) -> usize {
        let (x, y) = self.clamp_coords(x, y);
        x + y * self.width
    }

    pub fn get(&self, x: i32, y: i32) -> Cell {
        self.get_index(self.index(x, y))
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> Cell {
        Cell::new(self.materials[index], self.masses[index])
    }

    pub fn set(&mut self, x: i32, y: i32, cell: Cell) {
        let index = self.index(x, y);
        self.set_index(index, cell);
    }

    #[inline]
    pub fn set_index(&mut self, index: usize, cell: Cell) {
        self.materials[index] = cell.material_id;
        self.masses[index] = cell.mass;
    }

    pub fn snapshot(&self) -> GridView<'_> {
        GridView {
            width: self.width,
            height: self.height,
            materials: &self.materials,
            masses: &self.masses,
        }
    }

    pub fn materials(&self) -> &[u16] {
        &self.materials
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    /// Scratch buffers pre-filled with the current state
    pub fn begin_tick(&mut self) -> Result<ScratchBuffers> {
        let mut scratch = match self.spare.take() {
            Some(scratch) => scratch,
            None => ScratchBuffers::allocate(self.len())?,
        };
        scratch.materials.copy_from_slice(&self.materials);
        scratch.masses.copy_from_slice(&self.masses);
        Ok(scratch)
    }

    /// Make the tick's buffers the live state
    pub fn commit_tick(&mut self, mut scratch: ScratchBuffers) {
        debug_assert_eq!(scratch.materials.len(), self.materials.len());
        debug_assert_eq!(scratch.masses.len(), self.masses.len());
        std::mem::swap(&mut self.materials, &mut scratch.materials);
        std::mem::swap(&mut self.masses, &mut scratch.masses);
        self.spare = Some(scratch);
    }

    /// Sum of mass over non-solid cells
    pub fn total_mass(&self, solid: &[bool]) -> f64 {
        self.materials
            .iter()
            .zip(&self.masses)
            .filter(|(id, _)| !solid.get(**id as usize).copied().unwrap_or(false))
            .map(|(_, mass)| *mass as f64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid_is_air() {
        let grid = Grid::new(8, 4).unwrap();
        assert_eq!(grid.len(), 32);
        assert!(grid.materials().iter().all(|&m| m == MaterialId::AIR));
        assert!(grid.masses().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_rejects_zero_size() {
        assert!(Grid::new(0, 4).is_err());
        assert!(Grid::new(4, 0).is_err());
    }

    #[test]
    fn test_cell_access() {
        let mut grid = Grid::new(8, 8).unwrap();
        grid.set(3, 5, Cell::new(MaterialId::WATER, 0.5));
        assert_eq!(grid.get(3, 5), Cell::new(MaterialId::WATER, 0.5));
        assert_eq!(grid.get_index(3 + 5 * 8).mass, 0.5);
    }

    #[test]
    fn test_coordinates_clamp() {
        let mut grid = Grid::new(4, 3).unwrap();
        assert_eq!(grid.clamp_coords(-5, -5), (0, 0));
        assert_eq!(grid.clamp_coords(100, 100), (3, 2));
        assert_eq!(grid.clamp_coords(i32::MIN, i32::MAX), (0, 2));

        grid.set(i32::MAX, i32::MAX, Cell::solid(MaterialId::STONE));
        assert_eq!(grid.get(3, 2).material_id, MaterialId::STONE);
        assert!(!grid.in_bounds(4, 0));
        assert!(!grid.in_bounds(-1, 0));
        assert!(grid.in_bounds(3, 2));
    }

    #[test]
    fn test_reads_see_snapshot_until_commit() {
        let mut grid = Grid::new(4, 4).unwrap();
        grid.set(1, 1, Cell::new(MaterialId::WATER, 1.0));

        let mut scratch = grid.begin_tick().unwrap();
        scratch.masses_mut()[1 + 4] = 0.25;
        scratch.materials_mut()[2] = MaterialId::SAND;

        // Live state untouched while the tick is in flight
        assert_eq!(grid.get(1, 1).mass, 1.0);
        assert_eq!(grid.snapshot().material(2, 0), MaterialId::AIR);

        grid.commit_tick(scratch);
        assert_eq!(grid.get(1, 1).mass, 0.25);
        assert_eq!(grid.get(2, 0).material_id, MaterialId::SAND);
    }

    #[test]
    fn test_dropped_scratch_leaves_state_and_reallocates() {
        let mut grid = Grid::new(4, 4).unwrap();
        grid.set(0, 0, Cell::new(MaterialId::WATER, 0.7));

        let mut scratch = grid.begin_tick().unwrap();
        scratch.masses_mut()[0] = 0.0;
        drop(scratch);

        assert_eq!(grid.get(0, 0).mass, 0.7);
        let scratch = grid.begin_tick().unwrap();
        assert_eq!(scratch.masses()[0], 0.7);
        grid.commit_tick(scratch);
        assert_eq!(grid.get(0, 0).mass, 0.7);
    }

    #[test]
    fn test_total_mass_skips_solids() {
        let mut grid = Grid::new(4, 1).unwrap();
        grid.set(0, 0, Cell::new(MaterialId::WATER, 0.5));
        grid.set(1, 0, Cell::new(MaterialId::STONE, 3.0));
        grid.set(2, 0, Cell::new(MaterialId::AIR, 0.25));
        let solid = [false, true, true, false, true];
        assert!((grid.total_mass(&solid) - 0.75).abs() < 1e-9);
    }
}
