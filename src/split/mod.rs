//! Cutting a stitched canvas into sub-panels without slicing through text.
//!
//! The flow is profile -> plan -> slice. [`profile_rows`] marks visually
//! blank rows, [`plan_splits`] turns those rows and the coarse text boxes into
//! a [`SplitPlan`], and [`slice_canvas`] crops the canvas along the plan.

mod bands;
mod planner;
mod profile;
mod slice;

use tracing::debug;

use crate::canvas::{Canvas, OffsetTable};
use crate::error::AssemblyError;
use crate::geometry::CanvasBox;

pub use bands::{UnsafeBand, clearance, covers, overlaps, unsafe_bands};
pub use planner::{Cut, CutKind, Segment, SplitOptions, SplitPlan, candidate_rows, plan_splits};
pub use profile::{
    DEFAULT_BACKGROUND_TOLERANCE, ProfileOptions, RowSafety, RowStat, SafeRun, profile_rows,
    row_stat,
};
pub use slice::{PanelEdge, SplitWarning, SubPanel, slice_canvas};

/// Everything produced by one split of a canvas.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub width: u32,
    /// Offset table of the whole canvas, kept for locating rows later.
    pub offsets: OffsetTable,
    pub bands: Vec<UnsafeBand>,
    pub plan: SplitPlan,
    pub panels: Vec<SubPanel>,
}

impl SplitOutcome {
    pub fn degraded_panels(&self) -> impl Iterator<Item = &SubPanel> {
        self.panels.iter().filter(|panel| panel.is_degraded())
    }
}

pub fn split_canvas(
    canvas: Canvas,
    coarse: &[CanvasBox],
    profile: &ProfileOptions,
    options: &SplitOptions,
) -> Result<SplitOutcome, AssemblyError> {
    let safety = profile_rows(canvas.image(), profile);
    debug!(
        "profile: {}/{} rows safe (tolerance {})",
        safety.safe_rows(),
        safety.len(),
        safety.tolerance()
    );
    let plan = plan_splits(&safety, coarse, options)?;
    let bands = unsafe_bands(coarse, options.margin, canvas.height());
    let width = canvas.width();
    let offsets = canvas.offsets().clone();
    let panels = slice_canvas(canvas, &plan)?;
    Ok(SplitOutcome {
        width,
        offsets,
        bands,
        plan,
        panels,
    })
}
