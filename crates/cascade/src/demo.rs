//! Rain demo: a stone basin that fills with falling water and sand

use anyhow::Result;
use cascade_core::{MaterialId, SimStats, Simulation, TickReport};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Share of drops that are sand instead of water
const SAND_CHANCE: f64 = 0.2;

/// Seeded generator for the rain demo world and its per-tick drops
pub struct RainDemo {
    rng: Xoshiro256StarStar,
    drops_per_tick: u32,
}

impl RainDemo {
    pub fn new(seed: u64, drops_per_tick: u32) -> Self {
        Self {
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            drops_per_tick,
        }
    }

    /// Bedrock floor and walls with a stone ledge sloping into the middle
    pub fn build_world(&mut self, sim: &mut Simulation) -> Result<()> {
        let w = sim.grid().width() as i32;
        let h = sim.grid().height() as i32;

        sim.fill_rect(0, h - 1, w - 1, h - 1, MaterialId::BEDROCK)?;
        sim.fill_rect(0, 0, 0, h - 1, MaterialId::BEDROCK)?;
        sim.fill_rect(w - 1, 0, w - 1, h - 1, MaterialId::BEDROCK)?;

        if w < 16 || h < 16 {
            return Ok(());
        }

        // Ledge from the left wall down to a third of the width
        let ledge_top = h / 2;
        for x in 1..w / 3 {
            let y = ledge_top + x / 2;
            sim.fill_rect(x, y, x, y + 1, MaterialId::STONE)?;
        }

        // Pillars with random heights on the basin floor
        let pillars = (w / 24).max(1);
        for _ in 0..pillars {
            let x = self.rng.gen_range(w / 3..w - 2);
            let height = self.rng.gen_range(2..(h / 4).max(3));
            sim.fill_rect(x, h - 1 - height, x + 1, h - 2, MaterialId::STONE)?;
        }

        log::info!("Rain demo world built: {w}x{h}, {pillars} pillars");
        Ok(())
    }

    /// Drop new cells along the top row, then advance one tick
    pub fn step(&mut self, sim: &mut Simulation, stats: &mut dyn SimStats) -> Result<TickReport> {
        let w = sim.grid().width() as i32;
        if w > 2 {
            for _ in 0..self.drops_per_tick {
                let x = self.rng.gen_range(1..w - 1);
                if sim.get_cell(x, 0).material_id != MaterialId::AIR {
                    continue;
                }
                let material = if self.rng.gen_bool(SAND_CHANCE) {
                    MaterialId::SAND
                } else {
                    MaterialId::WATER
                };
                sim.set_material(x, 0, material)?;
            }
        }
        Ok(sim.tick_with_stats(stats)?)
    }
}
