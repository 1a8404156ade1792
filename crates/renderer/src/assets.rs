use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};

const PLACEHOLDER_SIZE: u32 = 256;
const PLACEHOLDER_CELL: u32 = 32;

/// Decodes an image file into 8-bit RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        anyhow::bail!("image {} has an empty extent {width}x{height}", path.display());
    }
    tracing::debug!(path = %path.display(), width, height, "loaded image");
    Ok(image)
}

/// Image shown when no file was given: a grey checkerboard with a red
/// corner cell, so orientation is visible.
pub fn placeholder_image() -> RgbaImage {
    RgbaImage::from_fn(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, |x, y| {
        let (cx, cy) = (x / PLACEHOLDER_CELL, y / PLACEHOLDER_CELL);
        if cx == 0 && cy == 0 {
            Rgba([220, 40, 40, 255])
        } else if (cx + cy) % 2 == 0 {
            Rgba([230, 230, 230, 255])
        } else {
            Rgba([60, 60, 60, 255])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_a_checkerboard() {
        let image = placeholder_image();
        assert_eq!(image.dimensions(), (256, 256));
        assert_eq!(image.get_pixel(0, 0), &Rgba([220, 40, 40, 255]));
        assert_eq!(image.get_pixel(40, 0), &Rgba([60, 60, 60, 255]));
        assert_eq!(image.get_pixel(40, 40), &Rgba([230, 230, 230, 255]));
    }

    #[test]
    fn loads_png_as_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_image(Path::new("/nonexistent/lattice.png")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/lattice.png"));
    }

    #[test]
    fn undecodable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(load_image(&path).is_err());
    }
}
