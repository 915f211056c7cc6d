mod merge;
mod text;

use serde::{Deserialize, Serialize};

use crate::canvas::OffsetTable;
use crate::geometry::{BBox, CanvasBox, CanvasFrame, Frame, PanelBox, PanelFrame};

pub use merge::{Link, MergeOptions, link, merge_detections};
pub use text::clean_text;

/// One OCR hit in a known coordinate frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Detection<F: Frame> {
    pub bbox: BBox<F>,
    pub text: String,
    pub confidence: f32,
}

/// Fine-pass hit, local to the sub-panel it was read from.
pub type RawDetection = Detection<PanelFrame>;
/// Coarse-pass hit on the stitched canvas.
pub type CoarseDetection = Detection<CanvasFrame>;

impl<F: Frame> Detection<F> {
    pub fn new(bbox: BBox<F>, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            text: text.into(),
            confidence,
        }
    }
}

/// Detector output before it is tied to a frame.
///
/// `source` is set when the hit was produced on one of the original images
/// rather than on the image handed to the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrHit {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<usize>,
}

fn default_confidence() -> f32 {
    1.0
}

impl OcrHit {
    pub fn into_detection<F: Frame>(self) -> Detection<F> {
        Detection {
            bbox: BBox::new(self.x, self.y, self.w, self.h),
            text: self.text,
            confidence: self.confidence,
        }
    }

    /// Canvas box for a coarse hit. Hits tagged with a source image go
    /// through the offset table; `None` when that source is unknown.
    pub fn canvas_box(&self, offsets: &OffsetTable) -> Option<CanvasBox> {
        match self.source {
            Some(source_id) => offsets.source_to_canvas(source_id, self.x, self.y, self.w, self.h),
            None => Some(CanvasBox::new(self.x, self.y, self.w, self.h)),
        }
    }
}

/// A merged text unit on one sub-panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    bbox: PanelBox,
    text: String,
    confidence: f32,
    member_count: usize,
}

impl TextRegion {
    pub(crate) fn new(bbox: PanelBox, text: String, confidence: f32, member_count: usize) -> Self {
        Self {
            bbox,
            text,
            confidence,
            member_count,
        }
    }

    pub fn bbox(&self) -> PanelBox {
        self.bbox
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn member_count(&self) -> usize {
        self.member_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::OffsetEntry;

    #[test]
    fn hits_map_through_their_source_image() {
        let offsets = OffsetTable::new(
            vec![
                OffsetEntry {
                    source_id: 0,
                    canvas_y_start: 0,
                    canvas_y_end: 100,
                    x_offset: 0,
                    scale: 1.0,
                    width: 80,
                },
                OffsetEntry {
                    source_id: 1,
                    canvas_y_start: 100,
                    canvas_y_end: 160,
                    x_offset: 10,
                    scale: 1.0,
                    width: 60,
                },
            ],
            160,
        )
        .unwrap();
        let hits: Vec<OcrHit> = serde_json::from_str(
            r#"[{"x":5,"y":5,"w":10,"h":10},{"x":5,"y":5,"w":10,"h":10,"confidence":0.5,"source":1}]"#,
        )
        .unwrap();
        assert_eq!(hits[0].confidence, 1.0);
        assert_eq!(hits[0].canvas_box(&offsets), Some(CanvasBox::new(5, 5, 10, 10)));
        assert_eq!(hits[1].canvas_box(&offsets), Some(CanvasBox::new(15, 105, 10, 10)));

        let detection: RawDetection = hits[1].clone().into_detection();
        assert_eq!(detection.bbox, PanelBox::new(5, 5, 10, 10));
    }
}
