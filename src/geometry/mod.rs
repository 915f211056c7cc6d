//! Pixel boxes tagged with the coordinate frame they live in.
//!
//! A box produced from the stitched canvas is a [`CanvasBox`]; a box produced
//! by OCR on a sub-panel is a [`PanelBox`]. The two never mix implicitly: the
//! only conversions go through [`crate::split::SubPanel`], which knows where
//! it sits on the canvas.

mod overlap;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

pub use overlap::{horizontal_overlap_ratio, iou, vertical_overlap_ratio};

pub trait Frame: Copy + Clone + fmt::Debug + PartialEq + Eq + Default + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Rows and columns of the stitched canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanvasFrame;

/// Rows and columns local to one sub-panel, origin at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelFrame;

impl Frame for CanvasFrame {
    const NAME: &'static str = "canvas";
}

impl Frame for PanelFrame {
    const NAME: &'static str = "panel";
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BBox<F: Frame> {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(skip)]
    frame: PhantomData<F>,
}

pub type CanvasBox = BBox<CanvasFrame>;
pub type PanelBox = BBox<PanelFrame>;

impl<F: Frame> fmt::Debug for BBox<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{},{} {}x{}]",
            F::NAME,
            self.x,
            self.y,
            self.w,
            self.h
        )
    }
}

impl<F: Frame> BBox<F> {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            frame: PhantomData,
        }
    }

    /// Right and bottom are exclusive.
    pub fn from_ltrb(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self::new(
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn rows(&self) -> Range<u32> {
        self.y..self.bottom()
    }

    pub fn columns(&self) -> Range<u32> {
        self.x..self.right()
    }

    pub fn union(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Self::from_ltrb(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Grows the box by `margin` on every side, stopping at the origin.
    pub fn dilate(&self, margin: u32) -> Self {
        Self::from_ltrb(
            self.x.saturating_sub(margin),
            self.y.saturating_sub(margin),
            self.right().saturating_add(margin),
            self.bottom().saturating_add(margin),
        )
    }

    /// Clips the box to `0..width` x `0..height`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let left = self.x.min(width);
        let top = self.y.min(height);
        Self::from_ltrb(
            left,
            top,
            self.right().min(width),
            self.bottom().min(height),
        )
    }

    /// Empty rows between the two boxes; zero when their row ranges overlap.
    pub fn vertical_gap(&self, other: &Self) -> u32 {
        if other.y >= self.bottom() {
            other.y - self.bottom()
        } else if self.y >= other.bottom() {
            self.y - other.bottom()
        } else {
            0
        }
    }

    /// Empty columns between the two boxes; zero when their column ranges overlap.
    pub fn horizontal_gap(&self, other: &Self) -> u32 {
        if other.x >= self.right() {
            other.x - self.right()
        } else if self.x >= other.right() {
            self.x - other.right()
        } else {
            0
        }
    }

    pub(crate) fn with_frame<G: Frame>(&self, dx: i64, dy: i64) -> Option<BBox<G>> {
        let x = i64::from(self.x) + dx;
        let y = i64::from(self.y) + dy;
        if x < 0 || y < 0 || x > i64::from(u32::MAX) || y > i64::from(u32::MAX) {
            return None;
        }
        Some(BBox::new(x as u32, y as u32, self.w, self.h))
    }
}
