//! Stitches a chapter's page images into one canvas, cuts it into
//! sub-panels at rows clear of text, and merges fine OCR detections into
//! stable text regions.

pub mod canvas;
pub mod compose;
pub mod config;
pub mod debug;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod mask;
mod paths;
pub mod pipeline;
pub mod regions;
pub mod settings;
pub mod split;
pub mod store;
#[cfg(test)]
mod test_util;

pub use canvas::{Canvas, CanvasOptions, OffsetEntry, OffsetTable, SourceLocation, build_canvas};
pub use config::EngineConfig;
pub use error::{AssemblyError, PanelError};
pub use geometry::{BBox, CanvasBox, PanelBox};
pub use pipeline::{ChapterAssembly, ChapterPipeline, PanelOutcome};
pub use regions::{MergeOptions, OcrHit, RawDetection, TextRegion, merge_detections};
pub use split::{
    ProfileOptions, SplitOptions, SplitOutcome, SplitPlan, SubPanel, plan_splits, profile_rows,
    split_canvas,
};
