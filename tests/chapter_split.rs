use image::{Rgb, RgbImage};
use panel_splitter_rust::split::{CutKind, PanelEdge};
use panel_splitter_rust::{
    CanvasBox, CanvasOptions, MergeOptions, PanelBox, ProfileOptions, RawDetection, SplitOptions,
    build_canvas, merge_detections, split_canvas,
};

fn blank(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
}

fn split_options() -> SplitOptions {
    SplitOptions {
        min_height: 500,
        max_height: 900,
        margin: 20,
        min_run_height: 20,
    }
}

#[test]
fn three_pages_tile_the_canvas() {
    let sources = vec![blank(900, 1000), blank(900, 800), blank(900, 1200)];
    let canvas = build_canvas(&sources, &CanvasOptions::default()).expect("canvas");
    assert_eq!((canvas.width(), canvas.height()), (900, 3000));
    let ranges: Vec<(u32, u32)> = canvas
        .offsets()
        .entries()
        .iter()
        .map(|entry| (entry.canvas_y_start, entry.canvas_y_end))
        .collect();
    assert_eq!(ranges, vec![(0, 1000), (1000, 1800), (1800, 3000)]);

    let location = canvas.offsets().locate(1799).expect("locate");
    assert_eq!((location.source_id, location.local_y), (1, 799));
}

#[test]
fn blank_canvas_splits_at_the_cap() {
    let canvas = build_canvas(&[blank(120, 2000)], &CanvasOptions::default()).expect("canvas");
    let outcome =
        split_canvas(canvas, &[], &ProfileOptions::default(), &split_options()).expect("split");
    let rendered = outcome
        .panels
        .iter()
        .map(|panel| format!("{}..{}", panel.canvas_y_start(), panel.canvas_y_end()))
        .collect::<Vec<_>>()
        .join(" ");
    insta::assert_snapshot!(rendered, @"0..900 900..1800 1800..2000");
    assert!(outcome.degraded_panels().next().is_none());
}

#[test]
fn coarse_text_pushes_the_cut_above_its_band() {
    let mut page = blank(400, 2000);
    for y in 880..920 {
        for x in 100..400 {
            page.put_pixel(x, y, Rgb([20, 20, 20]));
        }
    }
    let canvas = build_canvas(&[page], &CanvasOptions::default()).expect("canvas");
    let coarse = [CanvasBox::new(100, 880, 300, 40)];
    let outcome =
        split_canvas(canvas, &coarse, &ProfileOptions::default(), &split_options()).expect("split");

    assert_eq!(outcome.plan.rows(), vec![859, 1759]);
    assert_eq!(outcome.plan.cuts()[0].kind, CutKind::BlankRow);
    for cut in outcome.plan.cuts() {
        assert!(!(860..941).contains(&cut.row));
    }
    let heights: Vec<u32> = outcome.panels.iter().map(|panel| panel.height()).collect();
    assert_eq!(heights, vec![859, 900, 241]);

    let first = &outcome.panels[0];
    let local = first.to_local(&CanvasBox::new(0, 100, 10, 10)).expect("inside first panel");
    assert_eq!(local, PanelBox::new(0, 100, 10, 10));
    assert!(outcome.panels[1].to_local(&CanvasBox::new(0, 100, 10, 10)).is_none());
}

#[test]
fn content_on_every_row_without_coarse_boxes_is_flagged() {
    let mut page = blank(100, 1000);
    for y in 0..1000 {
        for x in 0..50 {
            page.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    let canvas = build_canvas(&[page], &CanvasOptions::default()).expect("canvas");
    let options = SplitOptions {
        min_height: 100,
        max_height: 400,
        margin: 0,
        min_run_height: 20,
    };
    let outcome =
        split_canvas(canvas, &[], &ProfileOptions::default(), &options).expect("split");

    assert_eq!(outcome.plan.rows(), vec![400, 800]);
    assert!(outcome.plan.cuts().iter().all(|cut| cut.kind == CutKind::BandClear));
    assert!(outcome.plan.forced_cuts().next().is_none());
    assert_eq!(outcome.degraded_panels().count(), 3);

    let middle = outcome.panels[1].warnings();
    assert_eq!(middle.len(), 2);
    assert!(middle.iter().all(|warning| warning.kind == CutKind::BandClear));
    assert_eq!(
        middle.iter().map(|warning| warning.edge).collect::<Vec<_>>(),
        vec![PanelEdge::Top, PanelEdge::Bottom]
    );
}

#[test]
fn stacked_lines_merge_into_one_region() {
    let detections: Vec<RawDetection> = vec![
        RawDetection::new(PanelBox::new(100, 100, 200, 30), "WHERE ARE", 0.875),
        RawDetection::new(PanelBox::new(110, 140, 180, 30), "YOU GOING?", 0.75),
        RawDetection::new(PanelBox::new(600, 800, 100, 30), "BANG", 0.9),
        RawDetection::new(PanelBox::new(50, 1500, 100, 30), "...", 0.8),
    ];
    let options = MergeOptions {
        horizontal_gap: 15,
        vertical_gap: 15,
        min_confidence: 0.5,
        dilation: 0,
    };
    let regions = merge_detections(&detections, &options);
    insta::assert_json_snapshot!(regions, @r###"
    [
      {
        "bbox": {
          "x": 100,
          "y": 100,
          "w": 200,
          "h": 70
        },
        "text": "WHERE ARE YOU GOING?",
        "confidence": 0.75,
        "member_count": 2
      },
      {
        "bbox": {
          "x": 600,
          "y": 800,
          "w": 100,
          "h": 30
        },
        "text": "BANG",
        "confidence": 0.9,
        "member_count": 1
      },
      {
        "bbox": {
          "x": 50,
          "y": 1500,
          "w": 100,
          "h": 30
        },
        "text": "...",
        "confidence": 0.8,
        "member_count": 1
      }
    ]
    "###);
}
