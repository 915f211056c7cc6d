use image::RgbImage;
use tracing::{info, warn};

use crate::canvas::stack_vertically;
use crate::error::AssemblyError;
use crate::split::SubPanel;

/// A processed sub-panel image and where its source slice started.
#[derive(Debug, Clone)]
pub struct ReassemblyPiece {
    pub canvas_y_start: u32,
    pub image: RgbImage,
}

impl From<SubPanel> for ReassemblyPiece {
    fn from(panel: SubPanel) -> Self {
        Self {
            canvas_y_start: panel.canvas_y_start(),
            image: panel.into_image(),
        }
    }
}

/// Re-concatenates pieces in canvas order into one chapter image.
pub fn reassemble(
    mut pieces: Vec<ReassemblyPiece>,
    background: [u8; 3],
) -> Result<RgbImage, AssemblyError> {
    if pieces.is_empty() {
        return Err(AssemblyError::EmptyInput);
    }
    pieces.sort_by_key(|piece| piece.canvas_y_start);
    for pair in pieces.windows(2) {
        if pair[0].canvas_y_start == pair[1].canvas_y_start {
            warn!(
                "reassemble: two pieces start at canvas row {}",
                pair[0].canvas_y_start
            );
        }
    }
    let images: Vec<&RgbImage> = pieces.iter().map(|piece| &piece.image).collect();
    let (image, _) = stack_vertically(&images, background);
    info!(
        "reassemble: {} pieces into {}x{}",
        pieces.len(),
        image.width(),
        image.height()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn pieces_are_stacked_in_canvas_order() {
        let pieces = vec![
            ReassemblyPiece {
                canvas_y_start: 30,
                image: RgbImage::from_pixel(10, 5, Rgb([2, 2, 2])),
            },
            ReassemblyPiece {
                canvas_y_start: 0,
                image: RgbImage::from_pixel(10, 30, Rgb([1, 1, 1])),
            },
            ReassemblyPiece {
                canvas_y_start: 35,
                image: RgbImage::from_pixel(6, 10, Rgb([3, 3, 3])),
            },
        ];
        let image = reassemble(pieces, [255, 255, 255]).unwrap();
        assert_eq!(image.dimensions(), (10, 45));
        assert_eq!(image.get_pixel(0, 29)[0], 1);
        assert_eq!(image.get_pixel(0, 30)[0], 2);
        assert_eq!(image.get_pixel(0, 40)[0], 255);
        assert_eq!(image.get_pixel(2, 40)[0], 3);
    }

    #[test]
    fn nothing_to_reassemble_is_an_error() {
        assert!(matches!(
            reassemble(Vec::new(), [0, 0, 0]),
            Err(AssemblyError::EmptyInput)
        ));
    }
}
