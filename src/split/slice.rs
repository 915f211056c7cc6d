use image::{RgbImage, imageops};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use super::planner::{CutKind, SplitPlan};
use crate::canvas::{Canvas, OffsetEntry, validate_tiling};
use crate::error::AssemblyError;
use crate::geometry::{CanvasBox, PanelBox, PanelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelEdge {
    Top,
    Bottom,
}

/// A degraded cut on one edge of a sub-panel; text there may be truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitWarning {
    pub row: u32,
    pub edge: PanelEdge,
    pub kind: CutKind,
}

impl fmt::Display for SplitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edge = match self.edge {
            PanelEdge::Top => "top",
            PanelEdge::Bottom => "bottom",
        };
        let kind = match self.kind {
            CutKind::Forced => "forced cut",
            _ => "cut through non-blank rows",
        };
        write!(f, "{} at canvas row {} on the {} edge", kind, self.row, edge)
    }
}

#[derive(Debug, Clone)]
pub struct SubPanel {
    index: usize,
    image: RgbImage,
    canvas_y_start: u32,
    canvas_y_end: u32,
    sources: Vec<OffsetEntry>,
    warnings: Vec<SplitWarning>,
}

impl SubPanel {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn canvas_y_start(&self) -> u32 {
        self.canvas_y_start
    }

    pub fn canvas_y_end(&self) -> u32 {
        self.canvas_y_end
    }

    pub fn height(&self) -> u32 {
        self.canvas_y_end - self.canvas_y_start
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Offset entries clipped to this panel's rows, still in canvas rows.
    pub fn sources(&self) -> &[OffsetEntry] {
        &self.sources
    }

    pub fn warnings(&self) -> &[SplitWarning] {
        &self.warnings
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn to_canvas(&self, bbox: &PanelBox) -> CanvasBox {
        CanvasBox::new(
            bbox.x,
            bbox.y.saturating_add(self.canvas_y_start),
            bbox.w,
            bbox.h,
        )
    }

    /// The part of `bbox` that falls on this panel, in panel coordinates.
    pub fn to_local(&self, bbox: &CanvasBox) -> Option<PanelBox> {
        let clipped = CanvasBox::from_ltrb(
            bbox.x.min(self.width()),
            bbox.y.max(self.canvas_y_start),
            bbox.right().min(self.width()),
            bbox.bottom().min(self.canvas_y_end),
        );
        if clipped.is_empty() {
            return None;
        }
        clipped.with_frame::<PanelFrame>(0, -i64::from(self.canvas_y_start))
    }
}

/// Crops `canvas` along `plan`. The canvas is consumed.
pub fn slice_canvas(canvas: Canvas, plan: &SplitPlan) -> Result<Vec<SubPanel>, AssemblyError> {
    plan.validate()?;
    if plan.height() != canvas.height() {
        return Err(AssemblyError::plan(format!(
            "plan covers {} rows but the canvas has {}",
            plan.height(),
            canvas.height()
        )));
    }

    let (image, offsets) = canvas.into_parts();
    let segments = plan.segments();
    let mut panels = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        let sources = offsets.clip(segment.start, segment.end);
        validate_tiling(&sources, segment.start, segment.end)?;

        let mut warnings = Vec::new();
        let cuts = plan.cuts();
        if index > 0 && cuts[index - 1].is_degraded() {
            warnings.push(SplitWarning {
                row: segment.start,
                edge: PanelEdge::Top,
                kind: cuts[index - 1].kind,
            });
        }
        if index < cuts.len() && cuts[index].is_degraded() {
            warnings.push(SplitWarning {
                row: segment.end,
                edge: PanelEdge::Bottom,
                kind: cuts[index].kind,
            });
        }
        for warning in &warnings {
            warn!("sub-panel {}: {}", index, warning);
        }

        let crop = imageops::crop_imm(&image, 0, segment.start, image.width(), segment.height())
            .to_image();
        panels.push(SubPanel {
            index,
            image: crop,
            canvas_y_start: segment.start,
            canvas_y_end: segment.end,
            sources,
            warnings,
        });
    }
    info!("split: {} sub-panels from {} rows", panels.len(), plan.height());
    Ok(panels)
}
