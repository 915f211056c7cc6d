use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;
use crate::geometry::CanvasBox;

/// Where one source image landed on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub source_id: usize,
    pub canvas_y_start: u32,
    pub canvas_y_end: u32,
    /// Left padding applied to center the source.
    pub x_offset: u32,
    /// Width normalization factor; 1.0 unless `max_width` forced a downscale.
    pub scale: f32,
    /// Width of the source on the canvas, after scaling.
    pub width: u32,
}

impl OffsetEntry {
    pub fn height(&self) -> u32 {
        self.canvas_y_end - self.canvas_y_start
    }

    pub fn contains(&self, canvas_y: u32) -> bool {
        self.canvas_y_start <= canvas_y && canvas_y < self.canvas_y_end
    }
}

/// Answer to "which source row is canvas row y?".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceLocation {
    pub source_id: usize,
    /// Row inside the source as placed on the canvas (scaled pixels).
    pub local_y: u32,
    /// Row inside the original, unscaled source image.
    pub source_y: u32,
    pub x_offset: u32,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetTable {
    entries: Vec<OffsetEntry>,
    height: u32,
}

impl OffsetTable {
    pub fn new(entries: Vec<OffsetEntry>, height: u32) -> Result<Self, AssemblyError> {
        validate_tiling(&entries, 0, height)?;
        Ok(Self { entries, height })
    }

    pub fn entries(&self) -> &[OffsetEntry] {
        &self.entries
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        validate_tiling(&self.entries, 0, self.height)
    }

    pub fn locate(&self, canvas_y: u32) -> Option<SourceLocation> {
        if canvas_y >= self.height {
            return None;
        }
        let idx = self
            .entries
            .partition_point(|entry| entry.canvas_y_start <= canvas_y)
            .checked_sub(1)?;
        let entry = self.entries.get(idx)?;
        if !entry.contains(canvas_y) {
            return None;
        }
        let local_y = canvas_y - entry.canvas_y_start;
        let source_y = if entry.scale > 0.0 {
            (local_y as f32 / entry.scale).floor() as u32
        } else {
            local_y
        };
        Some(SourceLocation {
            source_id: entry.source_id,
            local_y,
            source_y,
            x_offset: entry.x_offset,
            scale: entry.scale,
        })
    }

    /// Entries intersecting `start..end`, clipped to that range.
    pub fn clip(&self, start: u32, end: u32) -> Vec<OffsetEntry> {
        let first = self
            .entries
            .partition_point(|entry| entry.canvas_y_end <= start);
        self.entries[first..]
            .iter()
            .take_while(|entry| entry.canvas_y_start < end)
            .map(|entry| OffsetEntry {
                canvas_y_start: entry.canvas_y_start.max(start),
                canvas_y_end: entry.canvas_y_end.min(end),
                ..*entry
            })
            .collect()
    }

    /// Maps a box given in a source image's own pixels onto the canvas.
    pub fn source_to_canvas(
        &self,
        source_id: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Option<CanvasBox> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.source_id == source_id)?;
        let scale = entry.scale;
        let scaled = |value: u32| (value as f32 * scale).round() as u32;
        let top = entry.canvas_y_start + scaled(y).min(entry.height());
        let bottom = (entry.canvas_y_start + scaled(y.saturating_add(h))).min(entry.canvas_y_end);
        let left = entry.x_offset + scaled(x).min(entry.width);
        let right = entry.x_offset + scaled(x.saturating_add(w)).min(entry.width);
        Some(CanvasBox::from_ltrb(left, top, right, bottom))
    }
}

/// Checks that `entries` tile `start..end` exactly: contiguous, non-empty,
/// non-overlapping.
pub(crate) fn validate_tiling(
    entries: &[OffsetEntry],
    start: u32,
    end: u32,
) -> Result<(), AssemblyError> {
    if entries.is_empty() {
        if start == end {
            return Ok(());
        }
        return Err(AssemblyError::offsets(format!(
            "no entries for rows {}..{}",
            start, end
        )));
    }
    let mut cursor = start;
    for (idx, entry) in entries.iter().enumerate() {
        if entry.canvas_y_start != cursor {
            return Err(AssemblyError::offsets(format!(
                "entry {} starts at row {} but previous coverage ends at {}",
                idx, entry.canvas_y_start, cursor
            )));
        }
        if entry.canvas_y_end <= entry.canvas_y_start {
            return Err(AssemblyError::offsets(format!(
                "entry {} covers an empty range {}..{}",
                idx, entry.canvas_y_start, entry.canvas_y_end
            )));
        }
        cursor = entry.canvas_y_end;
    }
    if cursor != end {
        return Err(AssemblyError::offsets(format!(
            "entries end at row {} but the canvas ends at {}",
            cursor, end
        )));
    }
    Ok(())
}
