//! Texture atlas export.

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use silvie_decode::{DecodeError, DecodeResult, Texture};

use crate::error::Result;
use crate::palette::Palette;

/// Expand the atlas's palette indices into an RGB image.
///
/// Only the first `width * height` pixels are used; the buffer may be longer.
pub fn atlas_image(texture: &Texture, palette: &Palette) -> DecodeResult<RgbImage> {
    let width = usize::try_from(texture.width)
        .map_err(|_| DecodeError::MalformedTexture(format!("width {}", texture.width)))?;
    let needed = width
        .checked_mul(usize::try_from(texture.height).unwrap_or(usize::MAX))
        .filter(|&needed| needed <= texture.pixels.len())
        .ok_or_else(|| {
            DecodeError::MalformedTexture(format!(
                "{}x{} atlas needs more than the {} stored pixels",
                texture.width,
                texture.height,
                texture.pixels.len()
            ))
        })?;
    if needed == 0 {
        return Err(DecodeError::MalformedTexture(format!(
            "atlas is {}x{}",
            texture.width, texture.height
        )));
    }

    Ok(RgbImage::from_fn(texture.width, texture.height, |x, y| {
        let index = y as usize * width + x as usize;
        Rgb(palette.color(texture.pixels[index]))
    }))
}

/// Write the atlas as a PNG file at `path`.
pub fn encode_atlas(texture: &Texture, palette: &Palette, path: &Path) -> Result<()> {
    let image = atlas_image(texture, palette)?;
    image.save_with_format(path, ImageFormat::Png)?;
    tracing::debug!(
        path = %path.display(),
        width = texture.width,
        height = texture.height,
        "wrote atlas"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_palette() -> Palette {
        let bytes: Vec<u8> = (0..=255_u8).flat_map(|i| [i, i, i]).collect();
        Palette::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn pixels_map_through_palette() {
        let texture = Texture {
            width: 3,
            height: 2,
            stride: 3,
            pixels: vec![0, 1, 2, 10, 11, 12, 0, 0],
            ..Texture::default()
        };
        let image = atlas_image(&texture, &gray_palette()).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 0), &Rgb([2, 2, 2]));
        assert_eq!(image.get_pixel(0, 1), &Rgb([10, 10, 10]));
    }

    #[test]
    fn short_buffer_is_malformed() {
        let texture = Texture {
            width: 4,
            height: 4,
            pixels: vec![0; 15],
            ..Texture::default()
        };
        let err = atlas_image(&texture, &gray_palette()).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedTexture(_)));
    }

    #[test]
    fn empty_atlas_is_malformed() {
        let err = atlas_image(&Texture::default(), &gray_palette()).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedTexture(_)));
    }
}
