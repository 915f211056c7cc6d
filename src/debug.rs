use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbImage;
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::geometry::CanvasBox;
use crate::regions::TextRegion;
use crate::split::{CutKind, SplitPlan, UnsafeBand};
use crate::store::encode_png;

const BAND_FILL: &str = "#ffab00";
const COARSE_STROKE: &str = "#2962ff";
const CUT_STROKE: &str = "#00c853";
const FORCED_STROKE: &str = "#ff1744";
const REGION_STROKE: &str = "#00c853";

/// Canvas overlay: unsafe bands shaded, coarse boxes outlined, cut rows
/// drawn across the full width. Forced cuts are red.
pub fn split_overlay_svg(
    image: &RgbImage,
    bands: &[UnsafeBand],
    coarse: &[CanvasBox],
    plan: &SplitPlan,
) -> Result<String> {
    let width = image.width();
    let mut svg = svg_with_background(image)?;
    for band in bands {
        svg.push_str(&format!(
            r#"<rect x="0" y="{y}" width="{w}" height="{h}" fill="{fill}" fill-opacity="0.25"/>"#,
            y = band.start,
            w = width,
            h = band.height(),
            fill = BAND_FILL
        ));
    }
    for bbox in coarse {
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{stroke}" stroke-width="2"/>"#,
            x = bbox.x,
            y = bbox.y,
            w = bbox.w,
            h = bbox.h,
            stroke = COARSE_STROKE
        ));
    }
    for cut in plan.cuts() {
        let stroke = if cut.kind == CutKind::Forced {
            FORCED_STROKE
        } else {
            CUT_STROKE
        };
        svg.push_str(&format!(
            r#"<line x1="0" y1="{y}" x2="{w}" y2="{y}" stroke="{stroke}" stroke-width="3"/>"#,
            y = cut.row,
            w = width,
            stroke = stroke
        ));
    }
    svg.push_str("</svg>");
    Ok(svg)
}

/// Sub-panel overlay with every merged region outlined and labelled with
/// its member count.
pub fn region_overlay_svg(image: &RgbImage, regions: &[TextRegion]) -> Result<String> {
    let mut svg = svg_with_background(image)?;
    for region in regions {
        let bbox = region.bbox();
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{stroke}" stroke-width="2"><title>{title}</title></rect>"#,
            x = bbox.x,
            y = bbox.y,
            w = bbox.w,
            h = bbox.h,
            stroke = REGION_STROKE,
            title = escape_xml(region.text())
        ));
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="12" fill="{fill}">{count}</text>"#,
            x = bbox.x,
            y = bbox.y.saturating_sub(2).max(12),
            fill = REGION_STROKE,
            count = region.member_count()
        ));
    }
    svg.push_str("</svg>");
    Ok(svg)
}

fn svg_with_background(image: &RgbImage) -> Result<String> {
    let (width, height) = image.dimensions();
    let encoded = BASE64.encode(encode_png(image)?);
    let data_uri = format!("data:image/png;base64,{}", encoded);
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));
    Ok(svg)
}

/// Rasterizes an overlay to PNG bytes.
pub fn render_svg_png(svg: &str) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode overlay png")?;
    Ok(bytes)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
