use serde::Serialize;

use crate::geometry::CanvasBox;

/// Rows a cut must avoid: a coarse box's vertical extent plus margin,
/// merged with any band it overlaps or touches. End exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnsafeBand {
    pub start: u32,
    pub end: u32,
}

impl UnsafeBand {
    pub fn contains(&self, row: u32) -> bool {
        self.start <= row && row < self.end
    }

    pub fn height(&self) -> u32 {
        self.end - self.start
    }
}

/// Builds the merged band list for `boxes` on a canvas `height` rows tall.
/// A box covering rows `y..y+h` blocks `y-margin ..= y+h+margin`. Only the
/// vertical extent counts, so zero-width and zero-height boxes still block.
pub fn unsafe_bands(boxes: &[CanvasBox], margin: u32, height: u32) -> Vec<UnsafeBand> {
    let mut raw: Vec<UnsafeBand> = boxes
        .iter()
        .map(|bbox| UnsafeBand {
            start: bbox.y.saturating_sub(margin).min(height),
            end: bbox
                .bottom()
                .saturating_add(margin)
                .saturating_add(1)
                .min(height),
        })
        .filter(|band| band.end > band.start)
        .collect();
    raw.sort_by_key(|band| (band.start, band.end));

    let mut merged: Vec<UnsafeBand> = Vec::with_capacity(raw.len());
    for band in raw {
        if let Some(last) = merged.last_mut() {
            if band.start <= last.end {
                last.end = last.end.max(band.end);
                continue;
            }
        }
        merged.push(band);
    }
    merged
}

/// `bands` must be sorted and disjoint, as returned by [`unsafe_bands`].
pub fn covers(bands: &[UnsafeBand], row: u32) -> bool {
    let idx = bands.partition_point(|band| band.end <= row);
    bands.get(idx).is_some_and(|band| band.contains(row))
}

/// True when any band shares a row with `start..end`.
pub fn overlaps(bands: &[UnsafeBand], start: u32, end: u32) -> bool {
    let idx = bands.partition_point(|band| band.end <= start);
    bands.get(idx).is_some_and(|band| band.start < end)
}

/// Distance in rows from `row` to the nearest banded row; zero inside a
/// band, `None` when there are no bands.
pub fn clearance(bands: &[UnsafeBand], row: u32) -> Option<u32> {
    let idx = bands.partition_point(|band| band.end <= row);
    let below = bands.get(idx).map(|band| band.start.saturating_sub(row));
    let above = idx
        .checked_sub(1)
        .and_then(|prev| bands.get(prev))
        .map(|band| row - (band.end - 1));
    match (above, below) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
