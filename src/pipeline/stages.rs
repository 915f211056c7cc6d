use anyhow::Result;
use image::{GrayImage, RgbImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::regions::{OcrHit, TextRegion};
use crate::split::SubPanel;

/// An OCR engine. Called from a blocking worker thread.
pub trait TextDetector: Send + Sync + 'static {
    fn detect(&self, image: &RgbImage) -> Result<Vec<OcrHit>>;
}

/// Decides which regions get redrawn. Returns one flag per region, in order.
pub trait RegionFilter: Send + Sync {
    fn keep(&self, panel: &SubPanel, regions: &[TextRegion]) -> Result<Vec<bool>>;
}

/// Erases original text. Always handed every region of the panel.
pub trait Inpainter: Send + Sync {
    fn inpaint(&self, panel: &SubPanel, regions: &[TextRegion], mask: &GrayImage)
    -> Result<RgbImage>;
}

/// Cooperative cancellation shared between a pipeline and its callers.
/// Checked before each sub-panel starts; running panels finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
