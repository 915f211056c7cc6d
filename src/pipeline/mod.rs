//! Chapter orchestration: canvas, coarse pass, split, then the fine pass and
//! merge for every sub-panel concurrently.
//!
//! Each sub-panel ends with its own `Result`. A failed or cancelled panel
//! never aborts its siblings; only structural errors (empty input, broken
//! offsets, invalid options, a failed coarse pass) abort the chapter.

mod stages;

use futures_util::stream::{self, StreamExt};
use image::{RgbImage, imageops};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::canvas::{OffsetTable, build_canvas};
use crate::compose::ReassemblyPiece;
use crate::config::EngineConfig;
use crate::debug::{region_overlay_svg, render_svg_png};
use crate::error::{AssemblyError, PanelError};
use crate::geometry::{CanvasBox, PanelFrame};
use crate::mask::build_mask;
use crate::regions::{OcrHit, RawDetection, TextRegion, merge_detections};
use crate::split::{SplitOutcome, SplitPlan, SubPanel, UnsafeBand, split_canvas};
use crate::store::{ArtifactStore, PersistedPanel};

pub use stages::{CancelFlag, Inpainter, RegionFilter, TextDetector};

#[derive(Debug, Clone)]
pub struct PanelOutcome {
    pub panel: Arc<SubPanel>,
    /// Set when the pipeline has a store and the panel was written.
    pub stored: Option<PersistedPanel>,
    pub regions: Result<Vec<TextRegion>, PanelError>,
}

#[derive(Debug, Clone)]
pub struct ChapterAssembly {
    pub width: u32,
    pub offsets: OffsetTable,
    pub coarse: Vec<CanvasBox>,
    pub bands: Vec<UnsafeBand>,
    pub plan: SplitPlan,
    pub panels: Vec<PanelOutcome>,
}

impl ChapterAssembly {
    pub fn failures(&self) -> impl Iterator<Item = &PanelError> {
        self.panels
            .iter()
            .filter_map(|outcome| outcome.regions.as_ref().err())
    }

    pub fn region_count(&self) -> usize {
        self.panels
            .iter()
            .filter_map(|outcome| outcome.regions.as_ref().ok())
            .map(Vec::len)
            .sum()
    }
}

/// What the downstream stages made of one sub-panel.
#[derive(Debug, Clone)]
pub struct DownstreamOutcome {
    pub index: usize,
    pub canvas_y_start: u32,
    /// Regions the filter kept for redrawing.
    pub kept: Vec<TextRegion>,
    /// Number of regions handed to the inpainter.
    pub erased: usize,
    pub image: RgbImage,
}

impl From<DownstreamOutcome> for ReassemblyPiece {
    fn from(outcome: DownstreamOutcome) -> Self {
        Self {
            canvas_y_start: outcome.canvas_y_start,
            image: outcome.image,
        }
    }
}

pub struct ChapterPipeline<C, F> {
    coarse: Arc<C>,
    fine: Arc<F>,
    config: EngineConfig,
    concurrency: usize,
    cancel: CancelFlag,
    store: Option<ArtifactStore>,
    debug_artifacts: bool,
}

impl<C: TextDetector, F: TextDetector> ChapterPipeline<C, F> {
    pub fn new(coarse: C, fine: F, config: EngineConfig) -> Self {
        Self {
            coarse: Arc::new(coarse),
            fine: Arc::new(fine),
            config,
            concurrency: num_cpus::get().max(1),
            cancel: CancelFlag::default(),
            store: None,
            debug_artifacts: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Persist every sub-panel as soon as it is sliced, and its merged
    /// regions once the fine pass is done.
    pub fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Also write a region overlay per sub-panel into the store's debug
    /// directory. No effect without a store.
    pub fn with_debug_artifacts(mut self, enabled: bool) -> Self {
        self.debug_artifacts = enabled;
        self
    }

    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn assemble(&self, sources: Vec<RgbImage>) -> Result<ChapterAssembly, AssemblyError> {
        self.config.validate()?;
        let canvas = build_canvas(&sources, &self.config.canvas)?;
        drop(sources);

        let detector = self.coarse.clone();
        let (canvas, hits) = tokio::task::spawn_blocking(move || {
            let hits = detector.detect(canvas.image());
            (canvas, hits)
        })
        .await
        .map_err(|err| AssemblyError::CoarseDetection(format!("worker stopped: {}", err)))?;
        let hits = hits.map_err(|err| AssemblyError::CoarseDetection(format!("{:#}", err)))?;
        let coarse = coarse_boxes(&hits, canvas.offsets());
        info!(
            "pipeline: coarse pass found {} boxes on {}x{} canvas",
            coarse.len(),
            canvas.width(),
            canvas.height()
        );

        let SplitOutcome {
            width,
            offsets,
            bands,
            plan,
            panels,
        } = split_canvas(canvas, &coarse, &self.config.profile, &self.config.split)?;

        let prepared: Vec<(Arc<SubPanel>, Result<Option<PersistedPanel>, PanelError>)> = panels
            .into_iter()
            .map(|panel| {
                let stored = self.persist(&panel);
                (Arc::new(panel), stored)
            })
            .collect();
        let outcomes = self.run_panels(prepared).await;

        let assembly = ChapterAssembly {
            width,
            offsets,
            coarse,
            bands,
            plan,
            panels: outcomes,
        };
        let failed = assembly.failures().count();
        if failed > 0 {
            warn!(
                "pipeline: {} of {} sub-panels failed",
                failed,
                assembly.panels.len()
            );
        }
        Ok(assembly)
    }

    /// Fine pass and merge for panels that were sliced elsewhere.
    pub async fn detect_panels(&self, panels: Vec<SubPanel>) -> Vec<PanelOutcome> {
        let prepared = panels
            .into_iter()
            .map(|panel| (Arc::new(panel), Ok(None)))
            .collect();
        self.run_panels(prepared).await
    }

    /// Runs the filter and the inpainter on every successful panel. The
    /// inpainter always receives the full region list.
    pub fn hand_off<R: RegionFilter, I: Inpainter>(
        &self,
        assembly: &ChapterAssembly,
        filter: &R,
        inpainter: &I,
    ) -> Vec<Result<DownstreamOutcome, PanelError>> {
        assembly
            .panels
            .iter()
            .map(|outcome| hand_off_panel(outcome, filter, inpainter, self.config.mask_dilation))
            .collect()
    }

    fn persist(&self, panel: &SubPanel) -> Result<Option<PersistedPanel>, PanelError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(None);
        };
        store
            .persist_panel(panel)
            .map(Some)
            .map_err(|err| PanelError::Persist {
                index: panel.index(),
                message: format!("{:#}", err),
            })
    }

    async fn run_panels(
        &self,
        prepared: Vec<(Arc<SubPanel>, Result<Option<PersistedPanel>, PanelError>)>,
    ) -> Vec<PanelOutcome> {
        stream::iter(prepared)
            .map(|(panel, stored)| self.process_panel(panel, stored))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn process_panel(
        &self,
        panel: Arc<SubPanel>,
        stored: Result<Option<PersistedPanel>, PanelError>,
    ) -> PanelOutcome {
        let index = panel.index();
        let (stored, regions) = match stored {
            Err(err) => (None, Err(err)),
            Ok(stored) if self.cancel.is_cancelled() => {
                debug!("pipeline: sub-panel {} skipped after cancellation", index);
                (stored, Err(PanelError::Cancelled(index)))
            }
            Ok(stored) => {
                let regions = self
                    .fine_pass(panel.clone())
                    .await
                    .and_then(|regions| self.record_regions(&panel, regions));
                (stored, regions)
            }
        };
        if let Err(err) = &regions {
            if !matches!(err, PanelError::Cancelled(_)) {
                warn!("pipeline: {}", err);
            }
        }
        PanelOutcome {
            panel,
            stored,
            regions,
        }
    }

    async fn fine_pass(&self, panel: Arc<SubPanel>) -> Result<Vec<TextRegion>, PanelError> {
        let index = panel.index();
        let detector = self.fine.clone();
        let hits = tokio::task::spawn_blocking(move || detector.detect(panel.image()))
            .await
            .map_err(|err| PanelError::Worker {
                index,
                message: err.to_string(),
            })?
            .map_err(|err| PanelError::Detection {
                index,
                message: format!("{:#}", err),
            })?;
        let detections: Vec<RawDetection> = hits
            .into_iter()
            .map(OcrHit::into_detection::<PanelFrame>)
            .collect();
        let regions = merge_detections(&detections, &self.config.merge);
        debug!(
            "pipeline: sub-panel {} -> {} hits, {} regions",
            index,
            detections.len(),
            regions.len()
        );
        Ok(regions)
    }
}

impl<C, F> ChapterPipeline<C, F> {
    fn record_regions(
        &self,
        panel: &SubPanel,
        regions: Vec<TextRegion>,
    ) -> Result<Vec<TextRegion>, PanelError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(regions);
        };
        let index = panel.index();
        store
            .write_regions(index, &regions)
            .map_err(|err| PanelError::Persist {
                index,
                message: format!("{:#}", err),
            })?;
        if self.debug_artifacts {
            if let Err(err) = write_region_overlay(store, panel, &regions) {
                warn!(
                    "pipeline: region overlay for sub-panel {} failed: {:#}",
                    index, err
                );
            }
        }
        Ok(regions)
    }
}

fn write_region_overlay(
    store: &ArtifactStore,
    panel: &SubPanel,
    regions: &[TextRegion],
) -> anyhow::Result<()> {
    let svg = region_overlay_svg(panel.image(), regions)?;
    let png = render_svg_png(&svg)?;
    store.write_debug(&format!("panel_{:04}_regions.png", panel.index()), &png)?;
    Ok(())
}

pub fn hand_off_panel<R: RegionFilter, I: Inpainter>(
    outcome: &PanelOutcome,
    filter: &R,
    inpainter: &I,
    mask_dilation: u32,
) -> Result<DownstreamOutcome, PanelError> {
    let regions = outcome.regions.as_ref().map_err(Clone::clone)?;
    let panel = outcome.panel.as_ref();
    let index = panel.index();
    let downstream = |stage: &str, err: anyhow::Error| PanelError::Downstream {
        index,
        message: format!("{}: {:#}", stage, err),
    };

    let mask = build_mask(panel.width(), panel.height(), regions, mask_dilation);
    let image = inpainter
        .inpaint(panel, regions, &mask)
        .map_err(|err| downstream("inpaint", err))?;
    let image = if image.dimensions() == panel.image().dimensions() {
        image
    } else {
        warn!(
            "sub-panel {}: inpainter returned {}x{}, resizing to {}x{}",
            index,
            image.width(),
            image.height(),
            panel.width(),
            panel.height()
        );
        imageops::resize(
            &image,
            panel.width(),
            panel.height(),
            imageops::FilterType::Lanczos3,
        )
    };

    let decisions = filter
        .keep(panel, regions)
        .map_err(|err| downstream("filter", err))?;
    if decisions.len() != regions.len() {
        return Err(PanelError::Downstream {
            index,
            message: format!(
                "filter returned {} decisions for {} regions",
                decisions.len(),
                regions.len()
            ),
        });
    }
    let kept = regions
        .iter()
        .zip(&decisions)
        .filter(|(_, keep)| **keep)
        .map(|(region, _)| region.clone())
        .collect();

    Ok(DownstreamOutcome {
        index,
        canvas_y_start: panel.canvas_y_start(),
        kept,
        erased: regions.len(),
        image,
    })
}

/// Maps coarse hits onto the canvas. Hits naming an unknown source are
/// dropped with a warning.
pub fn coarse_boxes(hits: &[OcrHit], offsets: &OffsetTable) -> Vec<CanvasBox> {
    hits.iter()
        .filter_map(|hit| {
            let mapped = hit.canvas_box(offsets);
            if mapped.is_none() {
                warn!(
                    "pipeline: coarse hit references unknown source {:?}",
                    hit.source
                );
            }
            mapped
        })
        .collect()
}
