use image::{GrayImage, Luma};

use crate::regions::TextRegion;

pub const ERASE: u8 = 255;

/// Rasterizes `regions` into an inpainting mask: 255 where text must be
/// erased, 0 elsewhere. Every region box is grown by `dilation` pixels and
/// clipped to the image.
pub fn build_mask(width: u32, height: u32, regions: &[TextRegion], dilation: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for region in regions {
        let area = region.bbox().dilate(dilation).clamp_to(width, height);
        for y in area.rows() {
            for x in area.columns() {
                mask.put_pixel(x, y, Luma([ERASE]));
            }
        }
    }
    mask
}

pub fn erased_pixels(mask: &GrayImage) -> usize {
    mask.pixels().filter(|pixel| pixel.0[0] == ERASE).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PanelBox;

    #[test]
    fn mask_covers_dilated_boxes_inside_the_image() {
        let regions = vec![
            TextRegion::new(PanelBox::new(2, 2, 4, 4), "a".to_string(), 0.9, 1),
            TextRegion::new(PanelBox::new(18, 8, 10, 10), "b".to_string(), 0.9, 1),
        ];
        let mask = build_mask(20, 12, &regions, 1);
        assert_eq!(mask.get_pixel(1, 1).0[0], ERASE);
        assert_eq!(mask.get_pixel(6, 6).0[0], ERASE);
        assert_eq!(mask.get_pixel(7, 7).0[0], 0);
        assert_eq!(mask.get_pixel(19, 11).0[0], ERASE);
        assert_eq!(erased_pixels(&mask), 36 + 3 * 5);
    }

    #[test]
    fn empty_region_list_yields_blank_mask() {
        let mask = build_mask(8, 8, &[], 3);
        assert_eq!(erased_pixels(&mask), 0);
    }
}
