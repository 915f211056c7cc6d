use super::{BBox, Frame};

pub fn iou<F: Frame>(a: &BBox<F>, b: &BBox<F>) -> f32 {
    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = a.right().min(b.right());
    let iy2 = a.bottom().min(b.bottom());

    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }
    let inter = (ix2 - ix1) as f32 * (iy2 - iy1) as f32;
    let area_a = (a.w as f32) * (a.h as f32);
    let area_b = (b.w as f32) * (b.h as f32);
    inter / (area_a + area_b - inter).max(1.0)
}

pub fn horizontal_overlap_ratio<F: Frame>(a: &BBox<F>, b: &BBox<F>) -> f32 {
    let ix1 = a.x.max(b.x);
    let ix2 = a.right().min(b.right());
    if ix2 <= ix1 {
        return 0.0;
    }
    let inter = (ix2 - ix1) as f32;
    inter / (a.w.min(b.w) as f32).max(1.0)
}

pub fn vertical_overlap_ratio<F: Frame>(a: &BBox<F>, b: &BBox<F>) -> f32 {
    let iy1 = a.y.max(b.y);
    let iy2 = a.bottom().min(b.bottom());
    if iy2 <= iy1 {
        return 0.0;
    }
    let inter = (iy2 - iy1) as f32;
    inter / (a.h.min(b.h) as f32).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PanelBox;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = PanelBox::new(0, 0, 10, 10);
        assert!((iou(&a, &a) - 1.0).abs() < f32::EPSILON);
        assert_eq!(iou(&a, &PanelBox::new(10, 10, 5, 5)), 0.0);
    }

    #[test]
    fn overlap_ratios_use_the_smaller_extent() {
        let wide = PanelBox::new(0, 0, 100, 10);
        let narrow = PanelBox::new(40, 5, 20, 10);
        assert!((horizontal_overlap_ratio(&wide, &narrow) - 1.0).abs() < f32::EPSILON);
        assert!((vertical_overlap_ratio(&wide, &narrow) - 0.5).abs() < f32::EPSILON);
    }
}
