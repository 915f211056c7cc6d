use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::bands::{self, UnsafeBand};
use super::profile::RowSafety;
use crate::error::AssemblyError;
use crate::geometry::CanvasBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOptions {
    pub min_height: u32,
    pub max_height: u32,
    /// Rows added above and below every coarse box.
    pub margin: u32,
    /// Shortest safe run that may host a cut.
    pub min_run_height: u32,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            min_height: 500,
            max_height: 2000,
            margin: 50,
            min_run_height: 20,
        }
    }
}

impl SplitOptions {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.max_height == 0 {
            return Err(AssemblyError::InvalidConfig(
                "split.max_height must be greater than zero".to_string(),
            ));
        }
        if self.min_height > self.max_height {
            return Err(AssemblyError::InvalidConfig(format!(
                "split.min_height ({}) exceeds split.max_height ({})",
                self.min_height, self.max_height
            )));
        }
        Ok(())
    }
}

/// How a cut row was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutKind {
    /// Middle of an eligible safe run.
    Midpoint,
    /// Blank row outside every band, found when no run fit the window.
    BlankRow,
    /// Row outside every band that the profiler did not consider blank.
    /// Degraded: the row has visible content the coarse pass missed.
    BandClear,
    /// Cut at the size cap through an unsafe band.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cut {
    pub row: u32,
    pub kind: CutKind,
    /// Rows between the cut and the nearest unsafe band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearance: Option<u32>,
}

impl Cut {
    pub fn is_forced(&self) -> bool {
        self.kind == CutKind::Forced
    }

    /// The cut crosses a row with content: either forced through a band or
    /// placed on a non-blank row outside every band.
    pub fn is_degraded(&self) -> bool {
        matches!(self.kind, CutKind::Forced | CutKind::BandClear)
    }
}

/// Half-open row range of one sub-panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: u32,
    pub end: u32,
    /// A degraded cut sits on the top or bottom edge.
    pub degraded: bool,
}

impl Segment {
    pub fn height(&self) -> u32 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    cuts: Vec<Cut>,
    height: u32,
}

impl SplitPlan {
    pub fn new(cuts: Vec<Cut>, height: u32) -> Result<Self, AssemblyError> {
        let plan = Self { cuts, height };
        plan.validate()?;
        Ok(plan)
    }

    /// Plan from bare cut rows, e.g. hand-picked or read back from disk.
    pub fn from_rows(rows: &[u32], height: u32) -> Result<Self, AssemblyError> {
        let cuts = rows
            .iter()
            .map(|row| Cut {
                row: *row,
                kind: CutKind::Midpoint,
                clearance: None,
            })
            .collect();
        Self::new(cuts, height)
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.height == 0 {
            return Err(AssemblyError::plan("canvas has no rows"));
        }
        let mut prev = 0u32;
        for cut in &self.cuts {
            if cut.row <= prev || cut.row >= self.height {
                return Err(AssemblyError::plan(format!(
                    "cut at row {} is not strictly increasing inside 0..{}",
                    cut.row, self.height
                )));
            }
            prev = cut.row;
        }
        Ok(())
    }

    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    pub fn rows(&self) -> Vec<u32> {
        self.cuts.iter().map(|cut| cut.row).collect()
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn forced_cuts(&self) -> impl Iterator<Item = &Cut> {
        self.cuts.iter().filter(|cut| cut.is_forced())
    }

    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(self.cuts.len() + 1);
        let mut start = 0u32;
        let mut top_degraded = false;
        for cut in &self.cuts {
            segments.push(Segment {
                start,
                end: cut.row,
                degraded: top_degraded || cut.is_degraded(),
            });
            start = cut.row;
            top_degraded = cut.is_degraded();
        }
        segments.push(Segment {
            start,
            end: self.height,
            degraded: top_degraded,
        });
        segments
    }
}

/// Chooses cut rows for a canvas described by `safety`, keeping clear of
/// every coarse text box.
pub fn plan_splits(
    safety: &RowSafety,
    coarse: &[CanvasBox],
    options: &SplitOptions,
) -> Result<SplitPlan, AssemblyError> {
    options.validate()?;
    let height = safety.height();
    if height == 0 {
        return Err(AssemblyError::plan("canvas has no rows"));
    }

    let bands = bands::unsafe_bands(coarse, options.margin, height);
    let candidates = candidate_rows(safety, &bands, options.min_run_height);
    debug!(
        "split: {} rows, {} unsafe bands, {} candidate cuts",
        height,
        bands.len(),
        candidates.len()
    );

    let mut cuts = Vec::new();
    let mut start = 0u32;
    while height - start > options.max_height {
        let lo = start + options.min_height.max(1);
        let hi = start + options.max_height;
        let cut = match best_candidate(&candidates, lo, hi) {
            Some(row) => Cut {
                row,
                kind: CutKind::Midpoint,
                clearance: bands::clearance(&bands, row),
            },
            None => escape_cut(safety, &bands, lo, hi),
        };
        match cut.kind {
            CutKind::Forced => warn!(
                "split: no safe row between {} and {}; forced cut at row {}",
                lo, hi, cut.row
            ),
            CutKind::BandClear => warn!(
                "split: no blank row between {} and {}; cut at row {} crosses unlabelled content",
                lo, hi, cut.row
            ),
            _ => {}
        }
        cuts.push(cut);
        start = cut.row;
    }

    SplitPlan::new(cuts, height)
}

/// Midpoints of safe runs that are tall enough and clear of every band.
pub fn candidate_rows(safety: &RowSafety, bands: &[UnsafeBand], min_run_height: u32) -> Vec<u32> {
    safety
        .runs()
        .into_iter()
        .filter(|run| run.len() >= min_run_height.max(1))
        .filter(|run| !bands::overlaps(bands, run.start, run.end))
        .map(|run| run.midpoint())
        .collect()
}

fn best_candidate(candidates: &[u32], lo: u32, hi: u32) -> Option<u32> {
    let idx = candidates.partition_point(|row| *row <= hi);
    let row = *candidates.get(idx.checked_sub(1)?)?;
    (row >= lo).then_some(row)
}

fn escape_cut(safety: &RowSafety, bands: &[UnsafeBand], lo: u32, hi: u32) -> Cut {
    let mut band_clear = None;
    for row in (lo..=hi).rev() {
        if bands::covers(bands, row) {
            continue;
        }
        if safety.is_safe(row) {
            return Cut {
                row,
                kind: CutKind::BlankRow,
                clearance: bands::clearance(bands, row),
            };
        }
        if band_clear.is_none() {
            band_clear = Some(row);
        }
    }
    match band_clear {
        Some(row) => Cut {
            row,
            kind: CutKind::BandClear,
            clearance: bands::clearance(bands, row),
        },
        None => Cut {
            row: hi,
            kind: CutKind::Forced,
            clearance: bands::clearance(bands, hi),
        },
    }
}
