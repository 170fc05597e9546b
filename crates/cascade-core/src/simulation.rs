//! Simulation - the world facade hosts drive
//!
//! Owns the material registry, the grid, the section scheduler and the worker
//! pool. Edits go through here so the owning sections get loaded and marked
//! dirty.

use std::collections::BTreeSet;

use glam::IVec2;
use rayon::ThreadPool;

use crate::chunk::{DirtyRect, SectionState};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::flow::{FlowParams, FlowSimulator};
use crate::granular::GranularSimulator;
use crate::grid::Grid;
use crate::scheduler::{ChunkScheduler, MaterialTables, TickInputs};
use crate::stats::{NoopStats, SimStats, TickReport};
use cascade_simulation::{Cell, MaterialType, Materials};

pub struct Simulation {
    config: SimConfig,
    materials: Materials,
    tables: MaterialTables,
    grid: Grid,
    scheduler: ChunkScheduler,
    flow: FlowSimulator,
    granular: GranularSimulator,
    /// Linear indices of infinite sources
    sources: BTreeSet<usize>,
    pool: ThreadPool,
    tick_count: u64,
}

impl Simulation {
    /// Build a world of air. `materials` must contain a liquid.
    pub fn new(materials: Materials, config: SimConfig) -> Result<Self> {
        config.validate()?;
        let tables = MaterialTables::new(&materials)?;
        let grid = Grid::new(config.width, config.height)?;
        let scheduler = ChunkScheduler::new(&config);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("cascade-worker-{i}"))
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?;

        log::info!(
            "Simulation created: {}x{} cells, {} sections of {}, {} materials, {} workers",
            config.width,
            config.height,
            scheduler.sections().len(),
            config.chunk_size,
            materials.len(),
            pool.current_num_threads()
        );

        Ok(Self {
            flow: FlowSimulator::new(FlowParams::from(&config)),
            granular: GranularSimulator::new(),
            sources: BTreeSet::new(),
            tick_count: 0,
            config,
            materials,
            tables,
            grid,
            scheduler,
            pool,
        })
    }

    /// Advance one step
    pub fn tick(&mut self) -> Result<TickReport> {
        self.tick_with_stats(&mut NoopStats)
    }

    pub fn tick_with_stats(&mut self, stats: &mut dyn SimStats) -> Result<TickReport> {
        let inputs = TickInputs {
            pool: &self.pool,
            tables: &self.tables,
            flow: &self.flow,
            sources: &self.sources,
        };
        let mut report =
            self.scheduler
                .run_tick(&mut self.grid, &mut self.granular, inputs, stats)?;
        self.tick_count += 1;
        report.tick = self.tick_count;

        log::debug!(
            "Tick {}: {} flows, {} grains, {} cells changed, {} simulated / {} frozen sections",
            report.tick,
            report.flows,
            report.grains_moved,
            report.changed_cells,
            report.simulated_sections,
            report.frozen_sections
        );
        Ok(report)
    }

    /// Cell at clamped coordinates
    pub fn get_cell(&self, x: i32, y: i32) -> Cell {
        self.grid.get(x, y)
    }

    /// Replace the material of a cell. Liquids start full, everything else
    /// carries no mass.
    pub fn set_material(&mut self, x: i32, y: i32, material_id: u16) -> Result<()> {
        let material = self
            .materials
            .try_get(material_id)
            .ok_or(SimError::InvalidMaterial(material_id))?;
        let (cx, cy) = self.grid.clamp_coords(x, y);
        let index = cx + cy * self.grid.width();

        let mass = if material.material_type == MaterialType::Liquid {
            self.config.max_mass
        } else {
            0.0
        };
        if material.is_solid() && self.sources.remove(&index) {
            log::debug!("Source at ({cx}, {cy}) covered by {}", material.name);
        }

        let old = self.grid.get_index(index);
        if old.material_id != material_id {
            log::trace!(
                "[MODIFY] ({cx}, {cy}) set to {} (was {})",
                material.name,
                old.material_id
            );
        }
        self.grid.set_index(index, Cell::new(material_id, mass));
        self.scheduler.touch_cell(cx, cy);
        Ok(())
    }

    /// Set every cell of the inclusive rectangle to `material_id`
    pub fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, material_id: u16) -> Result<()> {
        if !self.materials.contains(material_id) {
            return Err(SimError::InvalidMaterial(material_id));
        }
        let (min_x, min_y) = self.grid.clamp_coords(x0.min(x1), y0.min(y1));
        let (max_x, max_y) = self.grid.clamp_coords(x0.max(x1), y0.max(y1));
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                self.set_material(x as i32, y as i32, material_id)?;
            }
        }
        Ok(())
    }

    /// Add liquid mass to a cell, returning its new mass.
    ///
    /// The result is clamped to `[min_mass, max_mass]` and the cell becomes
    /// liquid. Solid cells are left alone.
    pub fn add_mass(&mut self, x: i32, y: i32, delta: f32) -> Result<f32> {
        let (cx, cy) = self.grid.clamp_coords(x, y);
        let index = cx + cy * self.grid.width();
        let cell = self.grid.get_index(index);

        if self.tables.is_solid(cell.material_id) {
            log::warn!("add_mass: ({cx}, {cy}) is solid, ignoring {delta}");
            return Ok(cell.mass);
        }
        if !delta.is_finite() {
            return Err(SimError::InvalidMass(delta));
        }

        let mass = (cell.mass + delta).clamp(self.config.min_mass, self.config.max_mass);
        let material_id = if self.tables.material_type(cell.material_id) == MaterialType::Liquid {
            cell.material_id
        } else {
            self.tables.liquid
        };
        self.grid.set_index(index, Cell::new(material_id, mass));
        self.scheduler.touch_cell(cx, cy);
        Ok(mass)
    }

    /// Keep the cell at no less than a full liquid cell every tick
    pub fn mark_infinite_source(&mut self, x: i32, y: i32) {
        let (cx, cy) = self.grid.clamp_coords(x, y);
        if self.sources.insert(cx + cy * self.grid.width()) {
            log::debug!("Infinite source added at ({cx}, {cy})");
        }
        self.scheduler.touch_cell(cx, cy);
    }

    pub fn clear_infinite_source(&mut self, x: i32, y: i32) {
        let (cx, cy) = self.grid.clamp_coords(x, y);
        if self.sources.remove(&(cx + cy * self.grid.width())) {
            log::debug!("Infinite source removed at ({cx}, {cy})");
        }
    }

    pub fn is_infinite_source(&self, x: i32, y: i32) -> bool {
        let (cx, cy) = self.grid.clamp_coords(x, y);
        self.sources.contains(&(cx + cy * self.grid.width()))
    }

    pub fn is_dirty(&self, coord: IVec2) -> Result<bool> {
        self.scheduler.is_dirty(coord)
    }

    pub fn dirty_rect(&self, coord: IVec2) -> Result<Option<DirtyRect>> {
        self.scheduler.dirty_rect(coord)
    }

    pub fn clear_dirty(&mut self, coord: IVec2) -> Result<()> {
        self.scheduler.clear_dirty(coord)
    }

    pub fn dirty_sections(&self) -> Vec<IVec2> {
        self.scheduler.dirty_sections()
    }

    pub fn activate(&mut self, coord: IVec2) -> Result<()> {
        self.scheduler.activate(coord)
    }

    pub fn activate_permanent(&mut self, coord: IVec2) -> Result<()> {
        self.scheduler.activate_permanent(coord)
    }

    pub fn deactivate(&mut self, coord: IVec2) -> Result<()> {
        self.scheduler.deactivate(coord)
    }

    pub fn section_state(&self, coord: IVec2) -> Result<SectionState> {
        self.scheduler.state(coord)
    }

    /// Section owning a world position
    pub fn section_of(&self, x: i32, y: i32) -> IVec2 {
        let (cx, cy) = self.grid.clamp_coords(x, y);
        self.scheduler.world_to_chunk_coords(cx as i32, cy as i32).0
    }

    /// Sum of mass over all non-solid cells
    pub fn total_liquid_mass(&self) -> f64 {
        self.grid.total_mass(&self.tables.solid)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Diagonal preference the next tick will use
    pub fn fall_left(&self) -> bool {
        self.granular.fall_left()
    }

    pub fn materials(&self) -> &Materials {
        &self.materials
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn scheduler(&self) -> &ChunkScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Render color of a cell; liquid alpha follows its fill level
    pub fn cell_color(&self, x: i32, y: i32) -> [u8; 4] {
        let cell = self.grid.get(x, y);
        let mut color = self.materials.get_color(cell.material_id);
        if self.tables.material_type(cell.material_id) == MaterialType::Liquid {
            let fill = (cell.mass / self.config.max_mass).clamp(0.0, 1.0);
            color[3] = (color[3] as f32 * fill).round() as u8;
        }
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_simulation::MaterialId;

    fn sim(width: usize, height: usize) -> Simulation {
        Simulation::new(Materials::with_defaults(), SimConfig::with_size(width, height)).unwrap()
    }

    #[test]
    fn test_requires_liquid_material() {
        let result = Simulation::new(Materials::new(), SimConfig::with_size(8, 8));
        assert!(matches!(
            result,
            Err(SimError::MissingMaterial(MaterialType::Liquid))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = Simulation::new(Materials::with_defaults(), SimConfig::with_size(0, 8));
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_set_material_masses() {
        let mut sim = sim(8, 8);
        sim.set_material(1, 1, MaterialId::WATER).unwrap();
        sim.set_material(2, 1, MaterialId::SAND).unwrap();
        assert_eq!(sim.get_cell(1, 1), Cell::new(MaterialId::WATER, 1.0));
        assert_eq!(sim.get_cell(2, 1), Cell::new(MaterialId::SAND, 0.0));

        assert_eq!(
            sim.set_material(0, 0, 999),
            Err(SimError::InvalidMaterial(999))
        );
        assert_eq!(sim.get_cell(0, 0), Cell::AIR);
    }

    #[test]
    fn test_edit_marks_section_dirty() {
        let mut sim = sim(128, 128);
        sim.set_material(70, 10, MaterialId::STONE).unwrap();
        let coord = IVec2::new(1, 0);
        assert!(sim.is_dirty(coord).unwrap());
        assert_eq!(sim.section_state(coord).unwrap(), SectionState::Loaded);
        assert_eq!(sim.section_of(70, 10), coord);
        assert_eq!(sim.dirty_sections(), vec![coord]);
    }

    #[test]
    fn test_add_mass_clamps_and_converts() {
        let mut sim = sim(8, 8);
        assert_eq!(sim.add_mass(3, 3, 0.4).unwrap(), 0.4);
        assert_eq!(sim.get_cell(3, 3).material_id, MaterialId::WATER);
        assert_eq!(sim.add_mass(3, 3, 5.0).unwrap(), 1.0);
        assert_eq!(sim.add_mass(3, 3, -5.0).unwrap(), sim.config().min_mass);
    }

    #[test]
    fn test_add_mass_rejects_non_finite_delta() {
        let mut sim = sim(8, 8);
        assert!(matches!(
            sim.add_mass(3, 3, f32::NAN),
            Err(SimError::InvalidMass(delta)) if delta.is_nan()
        ));
        assert_eq!(
            sim.add_mass(3, 3, f32::INFINITY),
            Err(SimError::InvalidMass(f32::INFINITY))
        );
        assert_eq!(sim.get_cell(3, 3), Cell::AIR);
    }

    #[test]
    fn test_add_mass_on_solid_is_noop() {
        let mut sim = sim(8, 8);
        sim.set_material(2, 2, MaterialId::STONE).unwrap();
        assert_eq!(sim.add_mass(2, 2, 0.5).unwrap(), 0.0);
        assert_eq!(sim.get_cell(2, 2), Cell::solid(MaterialId::STONE));
    }

    #[test]
    fn test_solid_clears_source() {
        let mut sim = sim(8, 8);
        sim.mark_infinite_source(4, 0);
        assert!(sim.is_infinite_source(4, 0));
        sim.set_material(4, 0, MaterialId::WATER).unwrap();
        assert!(sim.is_infinite_source(4, 0));
        sim.set_material(4, 0, MaterialId::STONE).unwrap();
        assert!(!sim.is_infinite_source(4, 0));
    }

    #[test]
    fn test_infinite_source_fills_basin() {
        let config = SimConfig {
            freeze_after_ticks: 0,
            ..SimConfig::with_size(4, 4)
        };
        let mut sim = Simulation::new(Materials::with_defaults(), config).unwrap();
        sim.mark_infinite_source(1, 0);
        for _ in 0..200 {
            sim.tick().unwrap();
        }
        for y in 0..4 {
            for x in 0..4 {
                assert!(sim.get_cell(x, y).mass >= 0.9, "({x}, {y})");
            }
        }
        sim.clear_infinite_source(1, 0);
        assert!(!sim.is_infinite_source(1, 0));
    }

    #[test]
    fn test_fill_rect_clamps() {
        let mut sim = sim(8, 8);
        sim.fill_rect(-10, 6, 100, 100, MaterialId::STONE).unwrap();
        for x in 0..8 {
            assert_eq!(sim.get_cell(x, 6).material_id, MaterialId::STONE);
            assert_eq!(sim.get_cell(x, 7).material_id, MaterialId::STONE);
        }
        assert_eq!(sim.get_cell(0, 5).material_id, MaterialId::AIR);
    }

    #[test]
    fn test_tick_counts_and_flips() {
        let mut sim = sim(8, 8);
        assert!(sim.fall_left());
        let report = sim.tick().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(sim.tick_count(), 1);
        assert!(!sim.fall_left());
        sim.tick().unwrap();
        assert!(sim.fall_left());
    }

    #[test]
    fn test_cell_color() {
        let mut sim = sim(8, 8);
        assert_eq!(sim.cell_color(0, 0)[3], 0);
        sim.add_mass(1, 1, 0.5).unwrap();
        let full = sim.materials().get_color(MaterialId::WATER)[3] as f32;
        assert_eq!(sim.cell_color(1, 1)[3], (full * 0.5).round() as u8);
        sim.set_material(2, 2, MaterialId::STONE).unwrap();
        assert_eq!(
            sim.cell_color(2, 2),
            sim.materials().get_color(MaterialId::STONE)
        );
    }
}
