//! Row-stripe partitioning for parallel scatter writes
//!
//! A cell update writes into its own slot and into the slots of its orthogonal
//! and diagonal-below neighbours, so every write of row `r` lands in rows
//! `r - 1 ..= r + 1`. Centre rows `r ≡ phase (mod 3)` therefore own pairwise
//! disjoint three-row windows of the scratch buffer. The three phases run one
//! after another; within a phase every window goes to its own rayon task.
//!
//! Each slot sees its writers in a fixed order (phase, then column), so the
//! result does not depend on how many threads the pool has.

use rayon::ThreadPool;
use rayon::prelude::*;

/// Mutable rows `first_row ..` of a scratch buffer, owned by one task
pub struct RowWindow<'a, T> {
    first_row: usize,
    width: usize,
    rows: &'a mut [T],
}

impl<'a, T> RowWindow<'a, T> {
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    pub fn row_count(&self) -> usize {
        self.rows.len() / self.width
    }

    /// Slot at global coordinates, `None` outside this window
    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if x >= self.width {
            return None;
        }
        let local_y = y.checked_sub(self.first_row)?;
        self.rows.get_mut(local_y * self.width + x)
    }
}

/// Split `buffer` into the windows of one phase, paired with their centre row
fn stripe_windows<T>(
    buffer: &mut [T],
    width: usize,
    height: usize,
    phase: usize,
) -> Vec<(usize, RowWindow<'_, T>)> {
    let mut windows = Vec::with_capacity(height / 3 + 1);
    let mut rest = buffer;
    let mut row = 0;
    let mut centre = phase;

    while centre < height {
        let start = centre.saturating_sub(1);
        let end = (centre + 2).min(height);
        let (_, tail) = std::mem::take(&mut rest).split_at_mut((start - row) * width);
        let (rows, tail) = tail.split_at_mut((end - start) * width);
        windows.push((
            centre,
            RowWindow {
                first_row: start,
                width,
                rows,
            },
        ));
        rest = tail;
        row = end;
        centre += 3;
    }

    windows
}

/// Call `update` once per grid row with a window covering that row and its two
/// neighbours. Results come back in row order of phase 0, then 1, then 2.
pub fn for_each_row_striped<T, R, F>(
    pool: &ThreadPool,
    buffer: &mut [T],
    width: usize,
    update: F,
) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(usize, &mut RowWindow<'_, T>) -> R + Sync,
{
    if width == 0 {
        return Vec::new();
    }
    let height = buffer.len() / width;
    let mut results = Vec::with_capacity(height);

    for phase in 0..3 {
        let windows = stripe_windows(buffer, width, height, phase);
        let phase_results: Vec<R> = pool.install(|| {
            windows
                .into_par_iter()
                .map(|(centre, mut window)| update(centre, &mut window))
                .collect()
        });
        results.extend(phase_results);
    }

    results
}
