//! Chunk scheduling - which sections run each tick, and the tick pipeline
//!
//! The world is cut into `chunk_size` squares. Only `Loaded` and
//! `PermanentlyLoaded` sections are simulated; everything else is copied
//! through unchanged. After each commit the changed cells are folded back
//! into the sections: changed sections become dirty and stay awake, frozen
//! neighbours of changed sections wake up, and sections where no cell changed
//! count towards freezing.

use std::collections::BTreeSet;

use glam::IVec2;
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::chunk::{ChunkSection, DirtyRect, SectionBounds, SectionMask, SectionState};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::flow::FlowSimulator;
use crate::granular::GranularSimulator;
use crate::grid::{Grid, GridView};
use crate::stats::{SimStats, TickReport};
use cascade_simulation::{MaterialType, Materials};

/// Per-material lookup tables for the hot loops
#[derive(Debug, Clone)]
pub struct MaterialTables {
    pub solid: Vec<bool>,
    pub types: Vec<MaterialType>,
    /// Liquid assigned to cells that gain mass
    pub liquid: u16,
}

impl MaterialTables {
    pub fn new(materials: &Materials) -> Result<Self> {
        let liquid = materials
            .first_of(MaterialType::Liquid)
            .ok_or(SimError::MissingMaterial(MaterialType::Liquid))?
            .id;
        Ok(Self {
            solid: materials.solid_table(),
            types: materials.type_table(),
            liquid,
        })
    }

    #[inline]
    pub fn is_solid(&self, id: u16) -> bool {
        self.solid.get(id as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub fn material_type(&self, id: u16) -> MaterialType {
        self.types
            .get(id as usize)
            .copied()
            .unwrap_or(MaterialType::Gas)
    }
}

/// Everything a tick reads besides the grid
pub struct TickInputs<'a> {
    pub pool: &'a ThreadPool,
    pub tables: &'a MaterialTables,
    pub flow: &'a FlowSimulator,
    /// Linear indices replenished to full every tick
    pub sources: &'a BTreeSet<usize>,
}

/// Changed columns of one row that fall in one chunk column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChangeSpan {
    chunk_x: usize,
    min_x: usize,
    max_x: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RowChanges {
    y: usize,
    cells: usize,
    spans: Vec<ChangeSpan>,
}

/// Compare the committed buffers against the snapshot, row by row.
///
/// Masses are compared bit for bit: any mass change marks its section dirty
/// and resets the section's quiet count.
fn detect_changes(
    pool: &ThreadPool,
    before: GridView<'_>,
    after_materials: &[u16],
    after_masses: &[f32],
    chunk_size: usize,
) -> Vec<RowChanges> {
    let width = before.width();
    pool.install(|| {
        (0..before.height())
            .into_par_iter()
            .filter_map(|y| {
                let mut spans: Vec<ChangeSpan> = Vec::new();
                let mut cells = 0;
                for x in 0..width {
                    let i = before.index(x, y);
                    let changed = before.materials()[i] != after_materials[i]
                        || before.masses()[i].to_bits() != after_masses[i].to_bits();
                    if !changed {
                        continue;
                    }
                    cells += 1;
                    let chunk_x = x / chunk_size;
                    match spans.last_mut() {
                        Some(span) if span.chunk_x == chunk_x => span.max_x = x,
                        _ => spans.push(ChangeSpan {
                            chunk_x,
                            min_x: x,
                            max_x: x,
                        }),
                    }
                }
                (cells > 0).then_some(RowChanges { y, cells, spans })
            })
            .collect()
    })
}

/// Replenish infinite sources in the scratch buffers
fn apply_sources(
    sources: &BTreeSet<usize>,
    tables: &MaterialTables,
    max_mass: f32,
    materials: &mut [u16],
    masses: &mut [f32],
) {
    for &index in sources {
        let Some(material) = materials.get_mut(index) else {
            continue;
        };
        if tables.is_solid(*material) {
            continue;
        }
        if tables.material_type(*material) != MaterialType::Liquid {
            *material = tables.liquid;
        }
        masses[index] = masses[index].max(max_mass);
    }
}

/// Section table and tick driver
#[derive(Debug, Clone)]
pub struct ChunkScheduler {
    width: usize,
    height: usize,
    chunk_size: usize,
    chunks_x: usize,
    chunks_y: usize,
    sections: Vec<ChunkSection>,
    freeze_after_ticks: u32,
    max_mass: f32,
}

impl ChunkScheduler {
    pub fn new(config: &SimConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let chunks_x = config.width.div_ceil(chunk_size);
        let chunks_y = config.height.div_ceil(chunk_size);
        let mut sections = Vec::with_capacity(chunks_x * chunks_y);

        for cy in 0..chunks_y {
            for cx in 0..chunks_x {
                let origin_x = cx * chunk_size;
                let origin_y = cy * chunk_size;
                let bounds = SectionBounds {
                    origin_x,
                    origin_y,
                    width: chunk_size.min(config.width - origin_x),
                    height: chunk_size.min(config.height - origin_y),
                };
                let mut section = ChunkSection::new(IVec2::new(cx as i32, cy as i32), bounds);
                if config.load_all_sections {
                    section.state = SectionState::Loaded;
                }
                sections.push(section);
            }
        }

        Self {
            width: config.width,
            height: config.height,
            chunk_size,
            chunks_x,
            chunks_y,
            sections,
            freeze_after_ticks: config.freeze_after_ticks,
            max_mass: config.max_mass,
        }
    }

    /// Convert world coordinates to chunk coordinates and local offsets
    pub fn world_to_chunk_coords(&self, world_x: i32, world_y: i32) -> (IVec2, usize, usize) {
        let size = self.chunk_size as i32;
        let chunk_x = world_x.div_euclid(size);
        let chunk_y = world_y.div_euclid(size);
        let local_x = world_x.rem_euclid(size) as usize;
        let local_y = world_y.rem_euclid(size) as usize;
        (IVec2::new(chunk_x, chunk_y), local_x, local_y)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of sections along each axis
    pub fn chunk_counts(&self) -> IVec2 {
        IVec2::new(self.chunks_x as i32, self.chunks_y as i32)
    }

    pub fn sections(&self) -> &[ChunkSection] {
        &self.sections
    }

    fn section_index(&self, coord: IVec2) -> Result<usize> {
        if coord.x < 0
            || coord.y < 0
            || coord.x as usize >= self.chunks_x
            || coord.y as usize >= self.chunks_y
        {
            return Err(SimError::ChunkOutOfRange(coord));
        }
        Ok(coord.x as usize + coord.y as usize * self.chunks_x)
    }

    pub fn section(&self, coord: IVec2) -> Result<&ChunkSection> {
        let index = self.section_index(coord)?;
        Ok(&self.sections[index])
    }

    /// Simulate the section until it goes quiet
    pub fn activate(&mut self, coord: IVec2) -> Result<()> {
        self.set_state(coord, SectionState::Loaded)
    }

    /// Simulate the section every tick, never freezing it
    pub fn activate_permanent(&mut self, coord: IVec2) -> Result<()> {
        self.set_state(coord, SectionState::PermanentlyLoaded)
    }

    /// Stop simulating the section; incoming material loads it again
    pub fn deactivate(&mut self, coord: IVec2) -> Result<()> {
        self.set_state(coord, SectionState::Unloaded)
    }

    fn set_state(&mut self, coord: IVec2, state: SectionState) -> Result<()> {
        let index = self.section_index(coord)?;
        let section = &mut self.sections[index];
        if section.state != state {
            log::debug!("Section {coord}: {:?} -> {state:?}", section.state);
        }
        section.state = state;
        section.quiet_ticks = 0;
        Ok(())
    }

    pub fn state(&self, coord: IVec2) -> Result<SectionState> {
        Ok(self.section(coord)?.state)
    }

    pub fn is_dirty(&self, coord: IVec2) -> Result<bool> {
        Ok(self.section(coord)?.is_dirty())
    }

    pub fn dirty_rect(&self, coord: IVec2) -> Result<Option<DirtyRect>> {
        Ok(self.section(coord)?.dirty_rect())
    }

    /// Acknowledge that the renderer has re-read the section
    pub fn clear_dirty(&mut self, coord: IVec2) -> Result<()> {
        let index = self.section_index(coord)?;
        self.sections[index].clear_dirty();
        Ok(())
    }

    /// Coordinates of every section with a pending dirty rect, row-major
    pub fn dirty_sections(&self) -> Vec<IVec2> {
        self.sections
            .iter()
            .filter(|section| section.is_dirty())
            .map(|section| section.coord)
            .collect()
    }

    pub fn count_in_state(&self, state: SectionState) -> usize {
        self.sections.iter().filter(|s| s.state == state).count()
    }

    /// Record an edit at an in-bounds cell: load or wake its section, mark it
    /// dirty and wake frozen neighbours
    pub fn touch_cell(&mut self, x: usize, y: usize) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = x / self.chunk_size + (y / self.chunk_size) * self.chunks_x;
        let section = &mut self.sections[index];
        if section.state != SectionState::Loaded && section.state != SectionState::PermanentlyLoaded
        {
            log::trace!("Edit at ({x}, {y}) loads section {}", section.coord);
        }
        section.wake();
        section.mark_dirty(x, y);
        self.wake_neighbours(index);
    }

    /// Wake frozen sections around `index`, returning their coordinates
    fn wake_neighbours(&mut self, index: usize) -> Vec<IVec2> {
        let cx = (index % self.chunks_x) as i32;
        let cy = (index / self.chunks_x) as i32;
        let mut woken = Vec::new();
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let Ok(neighbour) = self.section_index(IVec2::new(cx + dx, cy + dy)) else {
                    continue;
                };
                let section = &mut self.sections[neighbour];
                if section.state == SectionState::Frozen {
                    section.wake();
                    woken.push(section.coord);
                }
            }
        }
        woken
    }

    /// Cells updated by the next tick
    pub fn active_mask(&self) -> SectionMask {
        let active: Vec<bool> = self
            .sections
            .iter()
            .map(|section| section.state.is_simulated())
            .collect();
        SectionMask::from_sections(self.width, self.height, self.chunk_size, &active)
    }

    /// Run one tick: flow, powder moves, sources, settle, commit, bookkeeping
    pub fn run_tick(
        &mut self,
        grid: &mut Grid,
        granular: &mut GranularSimulator,
        inputs: TickInputs<'_>,
        stats: &mut dyn SimStats,
    ) -> Result<TickReport> {
        let TickInputs {
            pool,
            tables,
            flow,
            sources,
        } = inputs;
        let simulated: Vec<bool> = self
            .sections
            .iter()
            .map(|section| section.state.is_simulated())
            .collect();
        let simulated_sections = simulated.iter().filter(|&&s| s).count();
        let mask = self.active_mask();

        let mut report = TickReport {
            simulated_sections,
            ..TickReport::default()
        };

        if !mask.is_empty() || !sources.is_empty() {
            let mut scratch = grid.begin_tick()?;
            let changes = {
                let view = grid.snapshot();
                report.flows = flow.accumulate(pool, view, &tables.solid, &mask, scratch.masses_mut());
                let moves = granular.plan(pool, view, &tables.types, &mask, scratch.materials_mut());
                report.grains_moved = moves.len();

                let (materials, masses) = scratch.split_mut();
                GranularSimulator::displace_mass(&moves, masses);
                apply_sources(sources, tables, self.max_mass, materials, masses);
                flow.settle(pool, &tables.types, tables.liquid, materials, masses);

                detect_changes(
                    pool,
                    view,
                    scratch.materials(),
                    scratch.masses(),
                    self.chunk_size,
                )
            };
            grid.commit_tick(scratch);

            report.changed_cells = changes.iter().map(|row| row.cells).sum();
            self.apply_changes(&changes, &simulated, &mut report, stats);
        }
        granular.flip();

        stats.record_tick();
        stats.record_flows(report.flows);
        stats.record_grains_moved(report.grains_moved);

        report.dirty_sections = self.sections.iter().filter(|s| s.is_dirty()).count();
        report.frozen_sections = self.count_in_state(SectionState::Frozen);
        report.total_mass = grid.total_mass(&tables.solid);
        Ok(report)
    }

    /// Fold a tick's changes into the section table
    fn apply_changes(
        &mut self,
        changes: &[RowChanges],
        simulated: &[bool],
        report: &mut TickReport,
        stats: &mut dyn SimStats,
    ) {
        let mut changed = vec![false; self.sections.len()];
        for row in changes {
            let cy = row.y / self.chunk_size;
            for span in &row.spans {
                let index = span.chunk_x + cy * self.chunks_x;
                let section = &mut self.sections[index];
                section.mark_dirty(span.min_x, row.y);
                section.mark_dirty(span.max_x, row.y);
                changed[index] = true;
            }
        }

        for (index, _) in changed.iter().enumerate().filter(|(_, c)| **c) {
            let section = &mut self.sections[index];
            let coord = section.coord;
            if section.state == SectionState::Unloaded {
                log::debug!("Section {coord} loaded by incoming material");
            }
            if section.wake() {
                report.woken += 1;
                stats.record_section_woken(coord);
            }
            for coord in self.wake_neighbours(index) {
                report.woken += 1;
                stats.record_section_woken(coord);
            }
        }

        for index in 0..self.sections.len() {
            if changed[index] || !simulated[index] {
                continue;
            }
            let section = &mut self.sections[index];
            section.quiet_ticks = section.quiet_ticks.saturating_add(1);
            if section.state == SectionState::Loaded
                && self.freeze_after_ticks > 0
                && section.quiet_ticks >= self.freeze_after_ticks
            {
                section.state = SectionState::Frozen;
                report.newly_frozen += 1;
                stats.record_section_frozen(section.coord);
                log::debug!(
                    "Section {} frozen after {} quiet ticks",
                    section.coord,
                    section.quiet_ticks
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowParams;
    use crate::stats::{NoopStats, TickCounters};
    use cascade_simulation::{Cell, MaterialId};

    fn config(width: usize, height: usize, chunk_size: usize) -> SimConfig {
        SimConfig {
            chunk_size,
            freeze_after_ticks: 3,
            ..SimConfig::with_size(width, height)
        }
    }

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap()
    }

    struct Harness {
        grid: Grid,
        scheduler: ChunkScheduler,
        granular: GranularSimulator,
        flow: FlowSimulator,
        tables: MaterialTables,
        sources: BTreeSet<usize>,
        pool: ThreadPool,
    }

    impl Harness {
        fn new(config: SimConfig) -> Self {
            Self {
                grid: Grid::new(config.width, config.height).unwrap(),
                scheduler: ChunkScheduler::new(&config),
                granular: GranularSimulator::new(),
                flow: FlowSimulator::new(FlowParams::from(&config)),
                tables: MaterialTables::new(&Materials::with_defaults()).unwrap(),
                sources: BTreeSet::new(),
                pool: pool(),
            }
        }

        fn tick(&mut self, stats: &mut dyn SimStats) -> TickReport {
            let inputs = TickInputs {
                pool: &self.pool,
                tables: &self.tables,
                flow: &self.flow,
                sources: &self.sources,
            };
            self.scheduler
                .run_tick(&mut self.grid, &mut self.granular, inputs, stats)
                .unwrap()
        }
    }

    #[test]
    fn test_world_to_chunk_coords() {
        let scheduler = ChunkScheduler::new(&config(256, 256, 64));
        assert_eq!(
            scheduler.world_to_chunk_coords(100, 200),
            (IVec2::new(1, 3), 36, 8)
        );
        assert_eq!(
            scheduler.world_to_chunk_coords(-100, -200),
            (IVec2::new(-2, -4), 28, 56)
        );
        assert_eq!(scheduler.world_to_chunk_coords(64, 128), (IVec2::new(1, 2), 0, 0));
    }

    #[test]
    fn test_partial_edge_sections() {
        let scheduler = ChunkScheduler::new(&config(100, 70, 64));
        assert_eq!(scheduler.chunk_counts(), IVec2::new(2, 2));
        let corner = scheduler.section(IVec2::new(1, 1)).unwrap();
        assert_eq!(corner.bounds.width, 36);
        assert_eq!(corner.bounds.height, 6);
    }

    #[test]
    fn test_state_transitions() {
        let mut scheduler = ChunkScheduler::new(&config(128, 128, 64));
        let coord = IVec2::new(1, 0);
        assert_eq!(scheduler.state(coord).unwrap(), SectionState::Unloaded);

        scheduler.activate(coord).unwrap();
        assert_eq!(scheduler.state(coord).unwrap(), SectionState::Loaded);
        scheduler.activate_permanent(coord).unwrap();
        assert_eq!(scheduler.state(coord).unwrap(), SectionState::PermanentlyLoaded);
        scheduler.deactivate(coord).unwrap();
        assert_eq!(scheduler.state(coord).unwrap(), SectionState::Unloaded);
    }

    #[test]
    fn test_out_of_range_chunk() {
        let mut scheduler = ChunkScheduler::new(&config(128, 128, 64));
        assert_eq!(
            scheduler.activate(IVec2::new(2, 0)),
            Err(SimError::ChunkOutOfRange(IVec2::new(2, 0)))
        );
        assert!(scheduler.state(IVec2::new(-1, 0)).is_err());
        assert!(scheduler.clear_dirty(IVec2::new(0, i32::MAX)).is_err());
    }

    #[test]
    fn test_touch_cell_loads_and_marks_dirty() {
        let mut scheduler = ChunkScheduler::new(&config(128, 128, 64));
        scheduler.touch_cell(70, 5);

        let coord = IVec2::new(1, 0);
        assert_eq!(scheduler.state(coord).unwrap(), SectionState::Loaded);
        assert_eq!(
            scheduler.dirty_rect(coord).unwrap(),
            Some(DirtyRect::new(6, 5))
        );
        assert_eq!(scheduler.dirty_sections(), vec![coord]);

        scheduler.clear_dirty(coord).unwrap();
        assert!(!scheduler.is_dirty(coord).unwrap());
        // Cleared flags stay cleared until something changes
        assert!(scheduler.dirty_sections().is_empty());
    }

    #[test]
    fn test_touch_wakes_frozen_neighbours() {
        let mut scheduler = ChunkScheduler::new(&config(192, 192, 64));
        for coord in [IVec2::new(0, 0), IVec2::new(2, 2)] {
            let index = scheduler.section_index(coord).unwrap();
            scheduler.sections[index].state = SectionState::Frozen;
        }
        scheduler.touch_cell(100, 100);

        assert_eq!(scheduler.state(IVec2::new(0, 0)).unwrap(), SectionState::Loaded);
        assert_eq!(scheduler.state(IVec2::new(2, 2)).unwrap(), SectionState::Loaded);
        // Unloaded neighbours stay unloaded
        assert_eq!(scheduler.state(IVec2::new(1, 0)).unwrap(), SectionState::Unloaded);
    }

    #[test]
    fn test_idle_world_skips_work() {
        let mut harness = Harness::new(config(16, 16, 8));
        harness.grid.set(3, 3, Cell::new(MaterialId::WATER, 1.0));

        let report = harness.tick(&mut NoopStats);
        assert_eq!(report.simulated_sections, 0);
        assert_eq!(report.changed_cells, 0);
        // Nothing loaded, so the water hangs in place
        assert_eq!(harness.grid.get(3, 3).mass, 1.0);
        assert!(!harness.granular.fall_left());
    }

    #[test]
    fn test_changed_sections_become_dirty() {
        let mut harness = Harness::new(config(16, 16, 8));
        harness.grid.set(3, 3, Cell::solid(MaterialId::SAND));
        harness.scheduler.touch_cell(3, 3);
        harness.scheduler.clear_dirty(IVec2::ZERO).unwrap();

        let report = harness.tick(&mut NoopStats);
        assert_eq!(report.grains_moved, 1);
        assert_eq!(report.changed_cells, 2);
        assert_eq!(
            harness.scheduler.dirty_rect(IVec2::ZERO).unwrap(),
            Some(DirtyRect {
                min_x: 3,
                min_y: 3,
                max_x: 3,
                max_y: 4
            })
        );
    }

    #[test]
    fn test_material_crossing_boundary_loads_section() {
        let mut harness = Harness::new(config(16, 16, 8));
        harness.grid.set(2, 7, Cell::solid(MaterialId::SAND));
        harness.scheduler.touch_cell(2, 7);

        harness.tick(&mut NoopStats);
        assert_eq!(harness.grid.get(2, 8).material_id, MaterialId::SAND);
        assert_eq!(
            harness.scheduler.state(IVec2::new(0, 1)).unwrap(),
            SectionState::Loaded
        );
        assert!(harness.scheduler.is_dirty(IVec2::new(0, 1)).unwrap());
    }

    #[test]
    fn test_quiet_sections_freeze_and_wake() {
        let mut harness = Harness::new(config(16, 16, 8));
        harness.scheduler.activate(IVec2::ZERO).unwrap();
        harness.scheduler.activate_permanent(IVec2::new(1, 0)).unwrap();

        let mut counters = TickCounters::default();
        for _ in 0..3 {
            harness.tick(&mut counters);
        }
        assert_eq!(
            harness.scheduler.state(IVec2::ZERO).unwrap(),
            SectionState::Frozen
        );
        assert_eq!(
            harness.scheduler.state(IVec2::new(1, 0)).unwrap(),
            SectionState::PermanentlyLoaded
        );
        assert_eq!(counters.sections_frozen, 1);

        // Sand falling in the permanent neighbour wakes the frozen section
        harness.grid.set(10, 2, Cell::solid(MaterialId::SAND));
        let report = harness.tick(&mut counters);
        assert_eq!(report.woken, 1);
        assert_eq!(counters.sections_woken, 1);
        assert_eq!(harness.scheduler.state(IVec2::ZERO).unwrap(), SectionState::Loaded);
    }

    #[test]
    fn test_sources_replenish() {
        let mut harness = Harness::new(config(8, 8, 8));
        let index = harness.grid.index(4, 0);
        harness.sources.insert(index);

        let report = harness.tick(&mut NoopStats);
        assert_eq!(report.simulated_sections, 0);
        assert_eq!(harness.grid.get(4, 0), Cell::new(MaterialId::WATER, 1.0));

        // Stone over a source blocks it
        harness.grid.set(4, 0, Cell::solid(MaterialId::STONE));
        harness.tick(&mut NoopStats);
        assert_eq!(harness.grid.get(4, 0), Cell::solid(MaterialId::STONE));
    }
}
