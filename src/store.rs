use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use time::{OffsetDateTime, format_description};
use tracing::{debug, info};

use crate::canvas::{OffsetTable, SourceLocation};
use crate::error::AssemblyError;
use crate::regions::TextRegion;
use crate::split::{Cut, SplitOutcome, SplitPlan, SplitWarning, SubPanel};

pub const STITCHED_DIR: &str = "stitched";
pub const SPLITS_DIR: &str = "splits";
pub const OCR_DIR: &str = "ocr";
pub const DEBUG_DIR: &str = "debug";
pub const MANIFEST_FILE: &str = "manifest.json";

/// On-disk layout for one chapter's artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPanel {
    pub index: usize,
    pub path: PathBuf,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPanel {
    pub index: usize,
    /// File name relative to the manifest's directory.
    pub file: String,
    pub canvas_y_start: u32,
    pub canvas_y_end: u32,
    pub md5: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SplitWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub created_at: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub offsets: OffsetTable,
    pub cuts: Vec<Cut>,
    pub panels: Vec<ManifestPanel>,
}

impl SplitManifest {
    pub fn new(outcome: &SplitOutcome, persisted: &[PersistedPanel]) -> Self {
        let created_at = OffsetDateTime::now_utc()
            .format(&format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        let panels = outcome
            .panels
            .iter()
            .map(|panel| {
                let stored = persisted.iter().find(|item| item.index == panel.index());
                ManifestPanel {
                    index: panel.index(),
                    file: panel_file_name(panel.index()),
                    canvas_y_start: panel.canvas_y_start(),
                    canvas_y_end: panel.canvas_y_end(),
                    md5: stored.map(|item| item.md5.clone()).unwrap_or_default(),
                    warnings: panel.warnings().to_vec(),
                }
            })
            .collect();
        Self {
            created_at,
            canvas_width: outcome.width,
            canvas_height: outcome.plan.height(),
            offsets: outcome.offsets.clone(),
            cuts: outcome.plan.cuts().to_vec(),
            panels,
        }
    }

    /// Rejects manifests whose geometry does not add up.
    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.offsets.height() != self.canvas_height {
            return Err(AssemblyError::offsets(format!(
                "manifest offsets cover {} rows but the canvas has {}",
                self.offsets.height(),
                self.canvas_height
            )));
        }
        self.offsets.validate()?;
        let plan = self.plan()?;
        let segments = plan.segments();
        if segments.len() != self.panels.len() {
            return Err(AssemblyError::plan(format!(
                "{} cuts describe {} panels but the manifest lists {}",
                self.cuts.len(),
                segments.len(),
                self.panels.len()
            )));
        }
        for (segment, panel) in segments.iter().zip(&self.panels) {
            if segment.start != panel.canvas_y_start || segment.end != panel.canvas_y_end {
                return Err(AssemblyError::plan(format!(
                    "panel {} covers {}..{} but the cuts give {}..{}",
                    panel.index, panel.canvas_y_start, panel.canvas_y_end, segment.start, segment.end
                )));
            }
        }
        Ok(())
    }

    pub fn plan(&self) -> Result<SplitPlan, AssemblyError> {
        SplitPlan::new(self.cuts.clone(), self.canvas_height)
    }

    pub fn locate(&self, canvas_y: u32) -> Option<SourceLocation> {
        self.offsets.locate(canvas_y)
    }
}

impl ArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [STITCHED_DIR, SPLITS_DIR, OCR_DIR, DEBUG_DIR] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path)
                .with_context(|| format!("failed to create workspace dir: {}", path.display()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn splits_dir(&self) -> PathBuf {
        self.root.join(SPLITS_DIR)
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join(DEBUG_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.splits_dir().join(MANIFEST_FILE)
    }

    pub fn panel_path(&self, index: usize) -> PathBuf {
        self.splits_dir().join(panel_file_name(index))
    }

    /// Writes the panel PNG atomically and returns its digest.
    pub fn persist_panel(&self, panel: &SubPanel) -> Result<PersistedPanel> {
        let bytes = encode_png(panel.image())?;
        let path = self.panel_path(panel.index());
        write_atomic(&path, &bytes)?;
        let md5 = format!("{:x}", md5::compute(&bytes));
        debug!(
            "store: panel {} -> {} (md5={})",
            panel.index(),
            path.display(),
            md5
        );
        Ok(PersistedPanel {
            index: panel.index(),
            path,
            md5,
        })
    }

    pub fn save_canvas(&self, image: &RgbImage) -> Result<PathBuf> {
        let path = self.root.join(STITCHED_DIR).join("canvas.png");
        write_atomic(&path, &encode_png(image)?)?;
        info!("store: canvas -> {}", path.display());
        Ok(path)
    }

    pub fn write_manifest(&self, manifest: &SplitManifest) -> Result<PathBuf> {
        let path = self.manifest_path();
        let json = serde_json::to_vec_pretty(manifest).with_context(|| "failed to encode manifest")?;
        write_atomic(&path, &json)?;
        info!("store: manifest -> {}", path.display());
        Ok(path)
    }

    pub fn read_manifest(path: &Path) -> Result<SplitManifest> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        let manifest: SplitManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse manifest: {}", path.display()))?;
        manifest
            .validate()
            .with_context(|| format!("inconsistent manifest: {}", path.display()))?;
        Ok(manifest)
    }

    pub fn write_regions(&self, index: usize, regions: &[TextRegion]) -> Result<PathBuf> {
        let path = self
            .root
            .join(OCR_DIR)
            .join(format!("panel_{:04}.regions.json", index));
        let json = serde_json::to_vec_pretty(regions).with_context(|| "failed to encode regions")?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    pub fn write_debug(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.debug_dir().join(sanitize_filename_component(name));
        write_atomic(&path, bytes)?;
        debug!("store: debug artifact -> {}", path.display());
        Ok(path)
    }
}

pub fn panel_file_name(index: usize) -> String {
    format!("panel_{:04}.png", index)
}

pub(crate) fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .with_context(|| "failed to encode png")?;
    Ok(bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create dir: {}", dir.display()))?;
    let mut file = tempfile::Builder::new()
        .prefix(".panel-splitter-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("failed to move temp file to {}", path.display()))?;
    Ok(())
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }
    if out.is_empty() || out.chars().all(|ch| ch == '.') {
        "artifact".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CanvasOptions, build_canvas};
    use crate::geometry::PanelBox;
    use crate::split::{ProfileOptions, SplitOptions, split_canvas};
    use image::Rgb;

    fn outcome() -> SplitOutcome {
        let sources = vec![
            RgbImage::from_pixel(40, 300, Rgb([255, 255, 255])),
            RgbImage::from_pixel(30, 200, Rgb([250, 250, 250])),
        ];
        let canvas = build_canvas(&sources, &CanvasOptions::default()).expect("canvas");
        let options = SplitOptions {
            min_height: 100,
            max_height: 200,
            margin: 5,
            min_run_height: 10,
        };
        split_canvas(canvas, &[], &ProfileOptions::default(), &options).expect("split")
    }

    #[test]
    fn panels_and_manifest_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::open(dir.path().join("chapter")).expect("store");
        let outcome = outcome();
        let persisted: Vec<PersistedPanel> = outcome
            .panels
            .iter()
            .map(|panel| store.persist_panel(panel).expect("persist"))
            .collect();
        assert_eq!(persisted.len(), outcome.panels.len());
        for item in &persisted {
            let bytes = std::fs::read(&item.path).expect("read panel");
            assert_eq!(format!("{:x}", md5::compute(&bytes)), item.md5);
        }
        let first = image::open(&persisted[0].path).expect("decode").to_rgb8();
        assert_eq!(first.dimensions(), (40, outcome.panels[0].height()));

        let manifest = SplitManifest::new(&outcome, &persisted);
        let path = store.write_manifest(&manifest).expect("write manifest");
        assert_eq!(path, store.manifest_path());
        let loaded = ArtifactStore::read_manifest(&path).expect("read manifest");
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.panels[0].file, "panel_0000.png");
        assert_eq!(loaded.locate(350).map(|loc| (loc.source_id, loc.local_y)), Some((1, 50)));
        assert_eq!(loaded.plan().expect("plan"), outcome.plan);

        let leftovers: Vec<_> = std::fs::read_dir(store.splits_dir())
            .expect("list")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn tampered_manifest_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::open(dir.path()).expect("store");
        let mut manifest = SplitManifest::new(&outcome(), &[]);
        manifest.panels.pop();
        let path = store.write_manifest(&manifest).expect("write");
        let err = ArtifactStore::read_manifest(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("inconsistent manifest"));
    }

    #[test]
    fn regions_are_written_as_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::open(dir.path()).expect("store");
        let regions = vec![TextRegion::new(PanelBox::new(1, 2, 3, 4), "HI".to_string(), 0.5, 2)];
        let path = store.write_regions(3, &regions).expect("regions");
        assert!(path.ends_with("ocr/panel_0003.regions.json"));
        let loaded: Vec<TextRegion> =
            serde_json::from_slice(&std::fs::read(path).expect("read")).expect("json");
        assert_eq!(loaded, regions);
        insta::assert_json_snapshot!(loaded, @r###"
        [
          {
            "bbox": {
              "x": 1,
              "y": 2,
              "w": 3,
              "h": 4
            },
            "text": "HI",
            "confidence": 0.5,
            "member_count": 2
          }
        ]
        "###);
    }

    #[test]
    fn debug_names_are_sanitized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::open(dir.path()).expect("store");
        let path = store.write_debug("../split overlay.svg", b"<svg/>").expect("debug");
        assert_eq!(path.file_name().and_then(|name| name.to_str()), Some("..split_overlay.svg"));
        assert!(path.starts_with(store.debug_dir()));
    }
}
