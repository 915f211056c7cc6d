use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const DEFAULT_BACKGROUND_TOLERANCE: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOptions {
    /// A row is safe when its largest deviation from the modal color is
    /// strictly below this value.
    pub background_tolerance: u8,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            background_tolerance: DEFAULT_BACKGROUND_TOLERANCE,
        }
    }
}

/// Dispersion of one pixel row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowStat {
    /// Most frequent value per channel.
    pub modal: [u8; 3],
    /// Largest absolute distance from `modal` over every pixel and channel.
    pub deviation: u8,
}

impl RowStat {
    pub fn is_safe(&self, tolerance: u8) -> bool {
        self.deviation < tolerance
    }
}

/// A maximal run of consecutive safe rows, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeRun {
    pub start: u32,
    pub end: u32,
}

impl SafeRun {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn last(&self) -> u32 {
        self.end.saturating_sub(1)
    }

    pub fn midpoint(&self) -> u32 {
        (self.start + self.last()) / 2
    }

    pub fn rows(&self) -> Range<u32> {
        self.start..self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowSafety {
    safe: Vec<bool>,
    stats: Vec<RowStat>,
    tolerance: u8,
}

impl RowSafety {
    /// Synthetic profile: safe rows get deviation 0, unsafe rows 255.
    pub fn from_mask(mask: Vec<bool>) -> Self {
        let stats = mask
            .iter()
            .map(|safe| RowStat {
                modal: [255; 3],
                deviation: if *safe { 0 } else { u8::MAX },
            })
            .collect();
        Self {
            safe: mask,
            stats,
            tolerance: DEFAULT_BACKGROUND_TOLERANCE,
        }
    }

    pub fn len(&self) -> usize {
        self.safe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.safe.is_empty()
    }

    pub fn height(&self) -> u32 {
        self.safe.len() as u32
    }

    pub fn tolerance(&self) -> u8 {
        self.tolerance
    }

    pub fn is_safe(&self, row: u32) -> bool {
        self.safe.get(row as usize).copied().unwrap_or(false)
    }

    pub fn mask(&self) -> &[bool] {
        &self.safe
    }

    pub fn stats(&self) -> &[RowStat] {
        &self.stats
    }

    pub fn safe_rows(&self) -> usize {
        self.safe.iter().filter(|safe| **safe).count()
    }

    pub fn runs(&self) -> Vec<SafeRun> {
        let mut runs = Vec::new();
        let mut open: Option<u32> = None;
        for (row, safe) in self.safe.iter().enumerate() {
            let row = row as u32;
            match (open, *safe) {
                (None, true) => open = Some(row),
                (Some(start), false) => {
                    runs.push(SafeRun { start, end: row });
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            runs.push(SafeRun {
                start,
                end: self.height(),
            });
        }
        runs
    }
}

pub fn profile_rows(image: &RgbImage, options: &ProfileOptions) -> RowSafety {
    let tolerance = options.background_tolerance;
    let height = image.height() as usize;
    if image.width() == 0 {
        return RowSafety {
            safe: vec![true; height],
            stats: vec![
                RowStat {
                    modal: [0; 3],
                    deviation: 0,
                };
                height
            ],
            tolerance,
        };
    }

    let mut safe = Vec::with_capacity(height);
    let mut stats = Vec::with_capacity(height);
    for row in image.as_raw().chunks_exact(image.width() as usize * 3) {
        let stat = row_stat(row);
        safe.push(stat.is_safe(tolerance));
        stats.push(stat);
    }
    RowSafety {
        safe,
        stats,
        tolerance,
    }
}

/// Statistic for one row of interleaved RGB bytes.
pub fn row_stat(row: &[u8]) -> RowStat {
    let mut histograms = [[0u32; 256]; 3];
    for pixel in row.chunks_exact(3) {
        for (channel, value) in pixel.iter().enumerate() {
            histograms[channel][*value as usize] += 1;
        }
    }

    let mut modal = [0u8; 3];
    let mut deviation = 0u8;
    for (channel, histogram) in histograms.iter().enumerate() {
        let mode = histogram
            .iter()
            .enumerate()
            .max_by_key(|(value, count)| (**count, std::cmp::Reverse(*value)))
            .map(|(value, _)| value as u8)
            .unwrap_or(0);
        modal[channel] = mode;
        let spread = histogram
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(value, _)| (value as i16 - mode as i16).unsigned_abs() as u8)
            .max()
            .unwrap_or(0);
        deviation = deviation.max(spread);
    }
    RowStat { modal, deviation }
}
