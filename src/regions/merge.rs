use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

use super::text::{clean_text, join_inline};
use super::{RawDetection, TextRegion};
use crate::geometry::{BBox, Frame, PanelBox, vertical_overlap_ratio};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Largest column gap between two linked detections.
    pub horizontal_gap: u32,
    /// Largest row gap between two linked detections.
    pub vertical_gap: u32,
    /// Detections below this are dropped before grouping.
    pub min_confidence: f32,
    /// Pixels added around each merged box.
    pub dilation: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            horizontal_gap: 10,
            vertical_gap: 10,
            min_confidence: 0.6,
            dilation: 0,
        }
    }
}

/// Measured distance between two linked boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub vertical_gap: u32,
    pub horizontal_gap: u32,
}

/// `Some` when `a` and `b` belong to the same text unit under `options`.
pub fn link<F: Frame>(a: &BBox<F>, b: &BBox<F>, options: &MergeOptions) -> Option<Link> {
    let vertical_gap = a.vertical_gap(b);
    let horizontal_gap = a.horizontal_gap(b);
    (vertical_gap <= options.vertical_gap && horizontal_gap <= options.horizontal_gap).then_some(
        Link {
            vertical_gap,
            horizontal_gap,
        },
    )
}

pub fn merge_detections(detections: &[RawDetection], options: &MergeOptions) -> Vec<TextRegion> {
    let mut nodes: Vec<RawDetection> = detections
        .iter()
        .filter(|detection| detection.confidence >= options.min_confidence)
        .filter(|detection| !detection.bbox.is_empty())
        .filter_map(|detection| {
            let text = clean_text(&detection.text);
            (!text.is_empty()).then(|| RawDetection {
                bbox: detection.bbox,
                text,
                confidence: detection.confidence,
            })
        })
        .collect();
    if nodes.is_empty() {
        debug!(
            "merge: no detections above confidence {} (of {})",
            options.min_confidence,
            detections.len()
        );
        return Vec::new();
    }
    nodes.sort_by(reading_cmp);

    let mut sets = DisjointSet::new(nodes.len());
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            if link(&nodes[i].bbox, &nodes[j].bbox, options).is_some() {
                sets.union(i, j);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<&RawDetection>> = BTreeMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        components.entry(sets.find(idx)).or_default().push(node);
    }

    let mut regions: Vec<TextRegion> = components
        .into_values()
        .map(|members| build_region(&members, options.dilation))
        .collect();
    regions.sort_by(|a, b| {
        (a.bbox().y, a.bbox().x, a.bbox().h, a.bbox().w)
            .cmp(&(b.bbox().y, b.bbox().x, b.bbox().h, b.bbox().w))
            .then_with(|| a.text().cmp(b.text()))
    });
    debug!(
        "merge: {} detections -> {} regions",
        nodes.len(),
        regions.len()
    );
    regions
}

fn build_region(members: &[&RawDetection], dilation: u32) -> TextRegion {
    let bbox = members
        .iter()
        .fold(PanelBox::new(0, 0, 0, 0), |acc, member| acc.union(&member.bbox))
        .dilate(dilation);
    let confidence = members
        .iter()
        .map(|member| member.confidence)
        .fold(f32::INFINITY, f32::min);
    TextRegion::new(bbox, reading_order_text(members), confidence, members.len())
}

/// Joins member text line by line, top to bottom, left to right.
fn reading_order_text(members: &[&RawDetection]) -> String {
    let mut sorted: Vec<&RawDetection> = members.to_vec();
    sorted.sort_by(|a, b| reading_cmp(a, b));

    let mut lines: Vec<(PanelBox, Vec<&RawDetection>)> = Vec::new();
    for member in sorted {
        if let Some((extent, line)) = lines.last_mut() {
            if vertical_overlap_ratio(extent, &member.bbox) > 0.5 {
                *extent = extent.union(&member.bbox);
                line.push(member);
                continue;
            }
        }
        lines.push((member.bbox, vec![member]));
    }

    lines
        .into_iter()
        .map(|(_, mut line)| {
            line.sort_by(|a, b| a.bbox.x.cmp(&b.bbox.x).then_with(|| reading_cmp(a, b)));
            line.iter()
                .fold(String::new(), |acc, member| join_inline(&acc, &member.text))
        })
        .fold(String::new(), |acc, line| join_inline(&acc, &line))
}

/// Total order so grouping and text never depend on input order.
fn reading_cmp(a: &RawDetection, b: &RawDetection) -> Ordering {
    (a.bbox.y, a.bbox.x, a.bbox.h, a.bbox.w)
        .cmp(&(b.bbox.y, b.bbox.x, b.bbox.h, b.bbox.w))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.confidence.total_cmp(&b.confidence))
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut idx: usize) -> usize {
        let mut root = idx;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[idx] != root {
            let next = self.parent[idx];
            self.parent[idx] = root;
            idx = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};

    fn det(x: u32, y: u32, w: u32, h: u32, text: &str, confidence: f32) -> RawDetection {
        RawDetection::new(PanelBox::new(x, y, w, h), text, confidence)
    }

    fn options(gap: u32) -> MergeOptions {
        MergeOptions {
            horizontal_gap: gap,
            vertical_gap: gap,
            min_confidence: 0.5,
            dilation: 0,
        }
    }

    #[test]
    fn stacked_lines_merge_and_isolated_hits_stay_alone() {
        let detections = vec![
            det(100, 100, 200, 30, "WHERE ARE", 0.875),
            det(110, 140, 180, 30, "YOU GOING?", 0.75),
            det(600, 800, 100, 30, "BANG", 0.9),
            det(50, 1500, 100, 30, "...", 0.8),
        ];
        let regions = merge_detections(&detections, &options(15));
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].bbox(), PanelBox::new(100, 100, 200, 70));
        assert_eq!(regions[0].text(), "WHERE ARE YOU GOING?");
        assert_eq!(regions[0].confidence(), 0.75);
        assert_eq!(regions[0].member_count(), 2);
        assert_eq!(regions[1].member_count(), 1);
        assert_eq!(regions[2].text(), "...");
    }

    #[test]
    fn low_confidence_noise_cannot_bridge_clusters() {
        let detections = vec![
            det(0, 0, 100, 20, "TOP", 0.9),
            det(0, 25, 100, 20, "noise", 0.1),
            det(0, 50, 100, 20, "BOTTOM", 0.9),
        ];
        let regions = merge_detections(&detections, &options(10));
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|region| region.member_count() == 1));
    }

    #[test]
    fn nothing_above_the_floor_is_empty() {
        let detections = vec![det(0, 0, 10, 10, "x", 0.2), det(0, 0, 10, 10, "|~", 0.9)];
        assert!(merge_detections(&detections, &options(10)).is_empty());
        assert!(merge_detections(&[], &options(10)).is_empty());
    }

    #[test]
    fn same_line_fragments_read_left_to_right() {
        let detections = vec![
            det(220, 12, 80, 20, "world", 0.9),
            det(100, 10, 100, 20, "hello", 0.9),
            det(100, 40, 60, 20, "again", 0.9),
        ];
        let regions = merge_detections(&detections, &options(25));
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text(), "hello world again");
    }

    #[test]
    fn cjk_lines_join_without_spaces() {
        let detections = vec![
            det(10, 10, 100, 20, "どこへ", 0.9),
            det(10, 35, 100, 20, "行くの？", 0.9),
        ];
        let regions = merge_detections(&detections, &options(10));
        assert_eq!(regions[0].text(), "どこへ行くの？");
    }

    #[test]
    fn dilation_grows_the_union_and_stops_at_zero() {
        let detections = vec![det(3, 4, 10, 10, "A", 0.9)];
        let regions = merge_detections(
            &detections,
            &MergeOptions {
                dilation: 5,
                ..options(10)
            },
        );
        assert_eq!(regions[0].bbox(), PanelBox::from_ltrb(0, 0, 18, 19));
    }

    #[test]
    fn link_reports_gaps() {
        let a = PanelBox::new(0, 0, 50, 10);
        let b = PanelBox::new(60, 15, 50, 10);
        assert_eq!(
            link(&a, &b, &options(10)),
            Some(Link {
                vertical_gap: 5,
                horizontal_gap: 10
            })
        );
        assert_eq!(link(&a, &b, &options(9)), None);
    }

    #[derive(Debug, Clone)]
    struct Hits(Vec<RawDetection>);

    impl Arbitrary for Hits {
        fn arbitrary(g: &mut Gen) -> Self {
            let count = usize::arbitrary(g) % 16;
            let hits = (0..count)
                .map(|idx| {
                    det(
                        u32::arbitrary(g) % 400,
                        u32::arbitrary(g) % 400,
                        u32::arbitrary(g) % 60 + 1,
                        u32::arbitrary(g) % 30 + 1,
                        &format!("w{}", idx),
                        f32::from(u8::arbitrary(g) % 5) * 0.25,
                    )
                })
                .collect();
            Hits(hits)
        }
    }

    #[test]
    fn merge_ignores_input_order() {
        fn prop(hits: Hits) -> bool {
            let options = options(12);
            let forward = merge_detections(&hits.0, &options);
            let mut reversed = hits.0.clone();
            reversed.reverse();
            let backward = merge_detections(&reversed, &options);
            forward == backward
        }
        QuickCheck::new()
            .tests(200)
            .quickcheck(prop as fn(Hits) -> bool);
    }

    #[test]
    fn wider_thresholds_never_split_clusters() {
        fn prop(hits: Hits, small: u8, extra: u8) -> TestResult {
            let tight = merge_detections(&hits.0, &options(u32::from(small % 40)));
            let loose = merge_detections(
                &hits.0,
                &options(u32::from(small % 40) + u32::from(extra % 40)),
            );
            let members: usize = tight.iter().map(TextRegion::member_count).sum();
            let loose_members: usize = loose.iter().map(TextRegion::member_count).sum();
            TestResult::from_bool(members == loose_members && loose.len() <= tight.len())
        }
        QuickCheck::new()
            .tests(200)
            .quickcheck(prop as fn(Hits, u8, u8) -> TestResult);
    }
}
