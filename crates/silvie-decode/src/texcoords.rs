//! Per-corner texture coordinates.
//!
//! Faces either carry explicit atlas texels or, when color-indexed, a palette
//! index that is looked up in the material's atlas column. The resolved
//! coordinates are normalised to the atlas as `(u / width, 1 - v / height)`.

use glam::Vec2;

use crate::error::{DecodeError, DecodeResult};
use crate::scene::{Face, FaceVertex, Scene, Texture};

/// Row of the first pixel equal to `color` in the atlas column that starts at
/// byte `offset`.
///
/// The scan steps one atlas row at a time and stops before a row whose end
/// would reach the declared buffer size, so the last row is never inspected.
#[must_use]
pub fn find_row(texture: &Texture, color: u16, offset: u32) -> Option<usize> {
    let width = usize::try_from(texture.width).ok().filter(|&w| w > 0)?;
    let start = usize::try_from(offset).ok()?;
    let size = texture.pixels.len();
    (start..)
        .step_by(width)
        .take_while(|&i| i.checked_add(width).is_some_and(|end| end < size))
        .position(|i| u16::from(texture.pixels[i]) == color)
}

/// Resolves face corners against one scene's atlas and material table.
#[derive(Debug, Clone, Copy)]
pub struct TexCoordResolver<'a> {
    texture: &'a Texture,
    material_offsets: &'a [u32],
}

impl<'a> TexCoordResolver<'a> {
    #[must_use]
    pub fn new(scene: &'a Scene) -> Self {
        Self {
            texture: &scene.texture,
            material_offsets: &scene.material_offsets,
        }
    }

    /// Atlas pixel offset of `material`.
    pub fn material_offset(&self, material: u8) -> DecodeResult<u32> {
        self.material_offsets
            .get(usize::from(material))
            .copied()
            .ok_or(DecodeError::UnknownMaterial {
                material,
                count: self.material_offsets.len(),
            })
    }

    /// Unnormalised `(u, v)` texel of one corner of `face`.
    #[allow(clippy::cast_precision_loss)]
    pub fn texel(&self, face: &Face, vertex: &FaceVertex) -> DecodeResult<[f64; 2]> {
        if !face.flags.color_indexed() {
            return Ok(vertex.texel.map(f64::from));
        }
        let offset = self.material_offset(face.material)?;
        let row = find_row(self.texture, vertex.color, offset);
        if row.is_none() {
            tracing::trace!(
                color = vertex.color,
                material = face.material,
                offset,
                "palette index not found in material column"
            );
        }
        Ok([1.0, row.map_or(0.0, |row| row as f64)])
    }

    /// Normalised texture coordinate of one corner of `face`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn resolve(&self, face: &Face, vertex: &FaceVertex) -> DecodeResult<Vec2> {
        let [width, height] = atlas_size(self.texture)?;
        let [u, v] = self.texel(face, vertex)?;
        Ok(Vec2::new((u / width) as f32, (1.0 - v / height) as f32))
    }
}

/// Atlas dimensions as divisors; zero is malformed.
pub(crate) fn atlas_size(texture: &Texture) -> DecodeResult<[f64; 2]> {
    if texture.width == 0 || texture.height == 0 {
        return Err(DecodeError::MalformedTexture(format!(
            "atlas is {}x{}",
            texture.width, texture.height
        )));
    }
    Ok([f64::from(texture.width), f64::from(texture.height)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::FaceFlags;
    use crate::testing;

    fn column_texture() -> Texture {
        // 3 wide, 10 rows; column 1 holds 100 + row.
        let mut pixels = vec![0_u8; 30];
        for row in 0..10 {
            pixels[row * 3 + 1] = 100 + u8::try_from(row).unwrap();
        }
        Texture {
            width: 3,
            height: 10,
            stride: 3,
            pixels,
            ..Texture::default()
        }
    }

    fn indexed(material: u8) -> Face {
        Face {
            flags: FaceFlags(FaceFlags::COLOR_INDEXED),
            material,
            ..Face::default()
        }
    }

    fn vertex(color: u16, texel: [u16; 2]) -> FaceVertex {
        FaceVertex {
            position: 0,
            color,
            texel,
        }
    }

    #[test]
    fn finds_row_in_column() {
        let texture = column_texture();
        assert_eq!(find_row(&texture, 105, 1), Some(5));
        assert_eq!(find_row(&texture, 100, 1), Some(0));
        assert_eq!(find_row(&texture, 42, 1), None);
    }

    #[test]
    fn last_row_is_never_scanned() {
        let texture = column_texture();
        // Row 9 starts at 28; 28 + 3 is past the buffer.
        assert_eq!(find_row(&texture, 108, 1), Some(8));
        assert_eq!(find_row(&texture, 109, 1), None);
    }

    #[test]
    fn colors_beyond_a_byte_never_match() {
        let mut texture = column_texture();
        texture.pixels[1] = 0x05;
        assert_eq!(find_row(&texture, 0x0105, 1), None);
    }

    #[test]
    fn indexed_faces_use_row_lookup() {
        let scene = Scene {
            material_offsets: vec![0, 1],
            texture: column_texture(),
            ..Scene::default()
        };
        let resolver = TexCoordResolver::new(&scene);
        assert_eq!(
            resolver.texel(&indexed(1), &vertex(105, [7, 7])).unwrap(),
            [1.0, 5.0]
        );
        assert_eq!(
            resolver.texel(&indexed(1), &vertex(42, [7, 7])).unwrap(),
            [1.0, 0.0]
        );

        let uv = resolver.resolve(&indexed(1), &vertex(105, [0, 0])).unwrap();
        assert!((uv - Vec2::new(1.0 / 3.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn explicit_texels_are_normalised() {
        let scene = testing::sample_scene();
        let resolver = TexCoordResolver::new(&scene);
        let face = &scene.meshes[0].faces[0];
        let uv = resolver.resolve(face, &face.vertices[2]).unwrap();
        assert_eq!(uv, Vec2::new(0.0, 0.5));
    }

    #[test]
    fn unknown_material_is_rejected() {
        let scene = testing::sample_scene();
        let err = TexCoordResolver::new(&scene)
            .resolve(&indexed(9), &vertex(0, [0, 0]))
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnknownMaterial {
                material: 9,
                count: 2
            }
        ));
    }

    #[test]
    fn empty_atlas_is_malformed() {
        let scene = Scene {
            material_offsets: vec![0],
            ..Scene::default()
        };
        let err = TexCoordResolver::new(&scene)
            .resolve(&Face::default(), &vertex(0, [0, 0]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedTexture(_)));
    }
}
