//! Shared fixtures for conversion tests.

use std::fs;
use std::path::{Path, PathBuf};

use silvie::ConvertRequest;
use silvie_decode::Scene;
use silvie_decode::testing;
use tempfile::TempDir;

/// A scratch directory holding a model, a palette and the conversion outputs.
/// Removed when dropped.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `scene` as `HERO.CHR` plus a ramp palette and return the request
    /// converting it to `out/hero`.
    pub fn request_for(&self, scene: &Scene) -> ConvertRequest {
        let model = self.root().join("HERO.CHR");
        fs::write(&model, testing::encode_scene(scene)).unwrap();

        let palette = self.root().join("HERO.PAL");
        let colors: Vec<u8> = (0..=255_u8).flat_map(|i| [i, 0, 255 - i]).collect();
        fs::write(&palette, colors).unwrap();

        fs::create_dir_all(self.root().join("out")).unwrap();
        ConvertRequest {
            model,
            palette,
            output_prefix: self.root().join("out").join("hero"),
        }
    }

    /// File names in the output directory, sorted.
    pub fn outputs(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root().join("out"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root().join(relative)
    }
}
