//! 256-color palettes shared by the game's indexed images.
//!
//! # Format
//!
//! A palette file starts with 256 `(red, green, blue)` byte triples. Anything
//! after the last triple is ignored.

use std::fs;
use std::path::Path;

use silvie_decode::{Cursor, DecodeResult};

use crate::error::{Error, Result};

/// Number of colors in a palette.
pub const PALETTE_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Parse the leading 256 triples of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> DecodeResult<Self> {
        let raw = Cursor::from_slice(bytes).read_bytes(PALETTE_LEN * 3)?;
        let colors = raw
            .chunks_exact(3)
            .map(|rgb| [rgb[0], rgb[1], rgb[2]])
            .collect();
        Ok(Self { colors })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let palette = Self::from_bytes(&bytes)?;
        tracing::debug!(path = %path.display(), "loaded palette");
        Ok(palette)
    }

    /// RGB value of palette entry `index`.
    #[must_use]
    pub fn color(&self, index: u8) -> [u8; 3] {
        self.colors[usize::from(index)]
    }
}

#[cfg(test)]
mod tests {
    use silvie_decode::DecodeError;

    use super::*;

    #[test]
    fn reads_leading_triples() {
        let mut bytes: Vec<u8> = (0..=255).flat_map(|i| [i, 255 - i, 7]).collect();
        bytes.extend_from_slice(b"trailing");
        let palette = Palette::from_bytes(&bytes).unwrap();
        assert_eq!(palette.color(0), [0, 255, 7]);
        assert_eq!(palette.color(200), [200, 55, 7]);
        assert_eq!(palette.color(255), [255, 0, 7]);
    }

    #[test]
    fn short_palette_is_truncated() {
        let err = Palette::from_bytes(&[0; 767]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                offset: 0,
                requested: 768
            }
        ));
    }
}
