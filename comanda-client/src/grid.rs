//! Viewport virtualization for order grids
//!
//! Board views can hold thousands of order cards, far more than fit on
//! screen. The grid math here maps a scroll position onto the small
//! index window worth rendering, plus the offsets a host needs to keep
//! the scrollbar honest. All units are abstract layout units (pixels,
//! terminal rows, whatever the host measures in).

use std::ops::Range;
use std::time::{Duration, Instant};

/// Fixed-geometry grid layout: uniform card height, fixed column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    /// Height of one card row, in layout units
    pub item_height: u64,
    /// Cards per row
    pub columns: usize,
    /// Extra rows materialized above and below the viewport, so small
    /// scrolls land on already-rendered cards
    pub buffer_rows: u64,
}

impl GridSpec {
    pub const DEFAULT_BUFFER_ROWS: u64 = 3;

    /// Create a spec. Zero heights and zero columns are clamped to one;
    /// a degenerate geometry renders badly but never divides by zero.
    pub fn new(item_height: u64, columns: usize) -> Self {
        Self {
            item_height: item_height.max(1),
            columns: columns.max(1),
            buffer_rows: Self::DEFAULT_BUFFER_ROWS,
        }
    }

    pub fn with_buffer_rows(mut self, buffer_rows: u64) -> Self {
        self.buffer_rows = buffer_rows;
        self
    }

    /// Rows needed to lay out `count` cards, final partial row included.
    pub fn total_rows(&self, count: usize) -> u64 {
        (count as u64).div_ceil(self.columns as u64)
    }

    /// Full scrollable content height for `count` cards.
    pub fn total_height(&self, count: usize) -> u64 {
        self.total_rows(count) * self.item_height
    }

    /// Compute the renderable window for a scroll position.
    ///
    /// `scroll_top` is how far the content is scrolled past the top of
    /// the viewport; overscroll past the end yields an empty window at
    /// the tail rather than an error.
    pub fn window(&self, count: usize, scroll_top: u64, viewport_height: u64) -> GridWindow {
        let columns = self.columns as u64;
        let total_rows = self.total_rows(count);
        let total_height = total_rows * self.item_height;

        if count == 0 {
            return GridWindow {
                total_height,
                ..GridWindow::default()
            };
        }

        let first_visible_row = scroll_top / self.item_height;
        let last_visible_row = (scroll_top + viewport_height).div_ceil(self.item_height);

        let last_row = (last_visible_row + self.buffer_rows).min(total_rows);
        let first_row = first_visible_row
            .saturating_sub(self.buffer_rows)
            .min(last_row);

        let start = ((first_row * columns) as usize).min(count);
        let end = ((last_row * columns) as usize).min(count);

        // Pad the final partial row so the tail keeps its grid shape
        let trailing_placeholders = if end == count && end > start && count % self.columns != 0 {
            self.columns - count % self.columns
        } else {
            0
        };

        GridWindow {
            start,
            end,
            first_row,
            offset_y: first_row * self.item_height,
            total_height,
            trailing_placeholders,
        }
    }
}

/// One materialized slice of the grid: which card indices to render and
/// where to place them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridWindow {
    /// First card index to render (inclusive)
    pub start: usize,
    /// Last card index to render (exclusive)
    pub end: usize,
    /// Grid row the window starts at
    pub first_row: u64,
    /// Layout offset of the window from the top of the content
    pub offset_y: u64,
    /// Full scrollable content height
    pub total_height: u64,
    /// Empty cells to draw after the last card
    pub trailing_placeholders: usize,
}

impl GridWindow {
    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices().contains(&index)
    }
}

/// Scroll event limiter
///
/// Wheel and drag events arrive far faster than redraws are worth
/// doing. Callers pass their own clock, which keeps the limiter off
/// the wall clock and easy to test.
#[derive(Debug, Clone)]
pub struct ScrollThrottle {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl ScrollThrottle {
    /// Roughly one accepted event per 60 Hz frame
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(16);

    pub fn new() -> Self {
        Self::with_interval(Self::DEFAULT_INTERVAL)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
        }
    }

    /// Whether an event at `now` should be processed. The first event is
    /// always accepted; acceptance starts the next interval.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

impl Default for ScrollThrottle {
    fn default() -> Self {
        Self::new()
    }
}
