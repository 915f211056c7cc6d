use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};

use panel_splitter_rust::compose::{ReassemblyPiece, reassemble};
use panel_splitter_rust::geometry::PanelFrame;
use panel_splitter_rust::pipeline::coarse_boxes;
use panel_splitter_rust::settings::{self, Settings};
use panel_splitter_rust::store::{ArtifactStore, SplitManifest};
use panel_splitter_rust::{
    EngineConfig, OcrHit, RawDetection, build_canvas, canvas, debug, logging, merge_detections,
    split_canvas,
};

#[derive(Parser, Debug)]
#[command(
    name = "panel-splitter-rust",
    version,
    about = "Stitch chapter pages into a canvas and split it at rows clear of text"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings", global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the canvas, plan cuts, and write sub-panels plus a manifest
    Split(SplitArgs),
    /// Merge one sub-panel's OCR detections into text regions
    Merge(MergeArgs),
    /// Resolve a canvas row to its source image
    Locate(LocateArgs),
    /// Stack processed sub-panels back into one chapter image
    Reassemble(ReassembleArgs),
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// Source images in reading order
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Coarse OCR boxes (JSON array of {x, y, w, h, confidence, source?})
    #[arg(short = 'c', long = "coarse")]
    coarse: Option<PathBuf>,

    /// Output directory (default: workspace from settings)
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    #[arg(long = "min-height")]
    min_height: Option<u32>,

    #[arg(long = "max-height")]
    max_height: Option<u32>,

    /// Rows kept clear above and below each coarse box
    #[arg(long = "margin")]
    margin: Option<u32>,

    /// Background tolerance for blank-row detection
    #[arg(long = "tolerance")]
    tolerance: Option<u8>,

    /// Downscale sources wider than this
    #[arg(long = "max-width")]
    max_width: Option<u32>,

    /// Write an overlay of bands and cuts to the debug directory
    #[arg(long = "debug-overlay")]
    debug_overlay: bool,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Fine OCR detections for one sub-panel (JSON array)
    detections: PathBuf,

    /// Write regions JSON here instead of stdout
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// The sub-panel image the detections belong to
    #[arg(long = "image")]
    image: Option<PathBuf>,

    /// Render the merged regions over --image into this PNG
    #[arg(long = "overlay", requires = "image")]
    overlay: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LocateArgs {
    manifest: PathBuf,
    row: u32,
}

#[derive(Args, Debug)]
struct ReassembleArgs {
    manifest: PathBuf,

    /// Directory holding replacement panel images (default: next to the manifest)
    #[arg(long = "panels-dir")]
    panels_dir: Option<PathBuf>,

    #[arg(short = 'o', long = "out")]
    out: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    let settings = settings::load_settings(cli.settings.as_deref())?;

    match cli.command {
        Command::Split(args) => run_split(&settings, args),
        Command::Merge(args) => run_merge(&settings, args),
        Command::Locate(args) => run_locate(args),
        Command::Reassemble(args) => run_reassemble(&settings, args),
    }
}

fn run_split(settings: &Settings, args: SplitArgs) -> Result<()> {
    let config = split_config(settings, &args)?;
    let sources = canvas::load_sources(&args.images)?;
    let canvas = build_canvas(&sources, &config.canvas)?;
    drop(sources);

    let hits = match args.coarse.as_deref() {
        Some(path) => read_hits(path)?,
        None => Vec::new(),
    };
    let coarse = coarse_boxes(&hits, canvas.offsets());

    let root = args.out.clone().unwrap_or_else(|| settings.workspace());
    let store = ArtifactStore::open(&root)?;
    store.save_canvas(canvas.image())?;
    let overlay_source = if args.debug_overlay || settings.save_debug_artifacts {
        Some(canvas.image().clone())
    } else {
        None
    };

    let outcome = split_canvas(canvas, &coarse, &config.profile, &config.split)?;
    let persisted = outcome
        .panels
        .iter()
        .map(|panel| store.persist_panel(panel))
        .collect::<Result<Vec<_>>>()?;
    let manifest = SplitManifest::new(&outcome, &persisted);
    let manifest_path = store.write_manifest(&manifest)?;

    if let Some(image) = overlay_source {
        let svg = debug::split_overlay_svg(&image, &outcome.bands, &coarse, &outcome.plan)?;
        store.write_debug("split_overlay.svg", svg.as_bytes())?;
        let png = debug::render_svg_png(&svg)?;
        store.write_debug("split_overlay.png", &png)?;
    }

    for (panel, stored) in outcome.panels.iter().zip(&persisted) {
        let flag = if panel.is_degraded() { " degraded" } else { "" };
        println!(
            "{}\t{}..{}\t{}x{}\t{}{}",
            panel.index(),
            panel.canvas_y_start(),
            panel.canvas_y_end(),
            panel.width(),
            panel.height(),
            stored.path.display(),
            flag
        );
    }
    println!("manifest\t{}", manifest_path.display());
    Ok(())
}

fn split_config(settings: &Settings, args: &SplitArgs) -> Result<EngineConfig> {
    let mut config = settings.engine_config()?;
    if let Some(value) = args.min_height {
        config.split.min_height = value;
    }
    if let Some(value) = args.max_height {
        config.split.max_height = value;
    }
    if let Some(value) = args.margin {
        config.split.margin = value;
    }
    if let Some(value) = args.tolerance {
        config.profile.background_tolerance = value;
    }
    if let Some(value) = args.max_width {
        config.canvas.max_width = if value == 0 { None } else { Some(value) };
    }
    config
        .validate()
        .with_context(|| "invalid split options")?;
    Ok(config)
}

fn run_merge(settings: &Settings, args: MergeArgs) -> Result<()> {
    let config = settings.engine_config()?;
    let detections: Vec<RawDetection> = read_hits(&args.detections)?
        .into_iter()
        .map(OcrHit::into_detection::<PanelFrame>)
        .collect();
    let regions = merge_detections(&detections, &config.merge);
    let json = serde_json::to_string_pretty(&regions).with_context(|| "failed to encode regions")?;
    match args.out.as_deref() {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write regions: {}", path.display()))?,
        None => println!("{}", json),
    }

    let overlay = match (args.overlay, args.image.as_deref(), args.out.as_deref()) {
        (Some(path), _, _) => Some(path),
        (None, Some(_), Some(out)) if settings.save_debug_artifacts => {
            Some(out.with_extension("overlay.png"))
        }
        _ => None,
    };
    if let (Some(path), Some(panel_path)) = (overlay, args.image.as_deref()) {
        let panel = image::open(panel_path)
            .with_context(|| format!("failed to open panel: {}", panel_path.display()))?
            .to_rgb8();
        let svg = debug::region_overlay_svg(&panel, &regions)?;
        fs::write(&path, debug::render_svg_png(&svg)?)
            .with_context(|| format!("failed to write overlay: {}", path.display()))?;
    }
    Ok(())
}

fn run_locate(args: LocateArgs) -> Result<()> {
    let manifest = ArtifactStore::read_manifest(&args.manifest)?;
    let location = manifest.locate(args.row).ok_or_else(|| {
        anyhow!(
            "row {} is outside the canvas (height {})",
            args.row,
            manifest.canvas_height
        )
    })?;
    println!(
        "source {}\trow {}\tcanvas row {}",
        location.source_id, location.source_y, args.row
    );
    Ok(())
}

fn run_reassemble(settings: &Settings, args: ReassembleArgs) -> Result<()> {
    let manifest = ArtifactStore::read_manifest(&args.manifest)?;
    let panels_dir = match args.panels_dir {
        Some(dir) => dir,
        None => args
            .manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let mut pieces = Vec::with_capacity(manifest.panels.len());
    for panel in &manifest.panels {
        let path = panels_dir.join(&panel.file);
        let image = image::open(&path)
            .with_context(|| format!("failed to open panel: {}", path.display()))?
            .to_rgb8();
        pieces.push(ReassemblyPiece {
            canvas_y_start: panel.canvas_y_start,
            image,
        });
    }
    let image = reassemble(pieces, settings.engine.canvas.background)?;
    image
        .save(&args.out)
        .with_context(|| format!("failed to write image: {}", args.out.display()))?;
    println!("{}", args.out.display());
    Ok(())
}

fn read_hits(path: &Path) -> Result<Vec<OcrHit>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
