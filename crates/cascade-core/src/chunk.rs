//! Chunk sections - fixed-size rectangular regions of the grid

use std::ops::Range;

use glam::IVec2;
use serde::{Deserialize, Serialize};

/// Lifecycle of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SectionState {
    /// Never touched, not simulated
    #[default]
    Unloaded,
    /// Simulated every tick, freezes once quiet
    Loaded,
    /// Simulated every tick, never freezes
    PermanentlyLoaded,
    /// Quiet for long enough, skipped until woken
    Frozen,
}

impl SectionState {
    /// Whether cells of this section are updated by a tick
    pub fn is_simulated(self) -> bool {
        matches!(self, SectionState::Loaded | SectionState::PermanentlyLoaded)
    }
}

/// World-space rectangle covered by a section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionBounds {
    pub origin_x: usize,
    pub origin_y: usize,
    pub width: usize,
    pub height: usize,
}

impl SectionBounds {
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.origin_x
            && y >= self.origin_y
            && x < self.origin_x + self.width
            && y < self.origin_y + self.height
    }

    /// Section-local coordinates of a global cell
    #[inline]
    pub fn to_local(&self, x: usize, y: usize) -> (usize, usize) {
        (x - self.origin_x, y - self.origin_y)
    }
}

/// Bounding rect of modified cells, in section-local coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRect {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl DirtyRect {
    pub fn new(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Scheduling state of one section
#[derive(Clone, Debug)]
pub struct ChunkSection {
    pub coord: IVec2,
    pub bounds: SectionBounds,
    pub state: SectionState,
    /// Consecutive simulated ticks without a change
    pub quiet_ticks: u32,
    dirty_rect: Option<DirtyRect>,
}

impl ChunkSection {
    pub fn new(coord: IVec2, bounds: SectionBounds) -> Self {
        Self {
            coord,
            bounds,
            state: SectionState::Unloaded,
            quiet_ticks: 0,
            dirty_rect: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_rect.is_some()
    }

    pub fn dirty_rect(&self) -> Option<DirtyRect> {
        self.dirty_rect
    }

    /// Mark a global cell as modified
    pub fn mark_dirty(&mut self, x: usize, y: usize) {
        let (local_x, local_y) = self.bounds.to_local(x, y);
        if let Some(ref mut rect) = self.dirty_rect {
            rect.expand(local_x, local_y);
        } else {
            self.dirty_rect = Some(DirtyRect::new(local_x, local_y));
        }
    }

    pub fn clear_dirty(&mut self) {
        self.dirty_rect = None;
    }

    /// Make sure the section is simulated. Returns true if it was frozen.
    pub fn wake(&mut self) -> bool {
        let was_frozen = self.state == SectionState::Frozen;
        if matches!(self.state, SectionState::Unloaded | SectionState::Frozen) {
            self.state = SectionState::Loaded;
        }
        self.quiet_ticks = 0;
        was_frozen
    }
}

/// Which cells a tick updates: the union of simulated sections, as
/// contiguous column spans per chunk row
#[derive(Clone, Debug)]
pub struct SectionMask {
    chunk_size: usize,
    width: usize,
    height: usize,
    spans: Vec<Vec<Range<usize>>>,
}

impl SectionMask {
    /// Mask from a row-major table of per-section flags
    pub fn from_sections(width: usize, height: usize, chunk_size: usize, active: &[bool]) -> Self {
        let chunks_x = width.div_ceil(chunk_size);
        let chunks_y = height.div_ceil(chunk_size);
        let mut spans = Vec::with_capacity(chunks_y);

        for cy in 0..chunks_y {
            let mut row: Vec<Range<usize>> = Vec::new();
            for cx in 0..chunks_x {
                if !active.get(cx + cy * chunks_x).copied().unwrap_or(false) {
                    continue;
                }
                let start = cx * chunk_size;
                let end = (start + chunk_size).min(width);
                match row.last_mut() {
                    Some(last) if last.end == start => last.end = end,
                    _ => row.push(start..end),
                }
            }
            spans.push(row);
        }

        Self {
            chunk_size,
            width,
            height,
            spans,
        }
    }

    /// Every cell of the grid
    pub fn all(width: usize, height: usize, chunk_size: usize) -> Self {
        let sections = width.div_ceil(chunk_size) * height.div_ceil(chunk_size);
        Self::from_sections(width, height, chunk_size, &vec![true; sections])
    }

    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(Vec::is_empty)
    }

    /// Active column ranges of grid row `y`
    pub fn row_spans(&self, y: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        let spans: &[Range<usize>] = if y < self.height {
            self.spans
                .get(y / self.chunk_size)
                .map(Vec::as_slice)
                .unwrap_or(&[])
        } else {
            &[]
        };
        spans.iter().cloned()
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && self.row_spans(y).any(|span| span.contains(&x))
    }
}
