//! The CHR conversion pipeline: model and palette in, glTF scene and PNG
//! atlas out.

use std::fs;
use std::path::{Path, PathBuf};

use silvie_decode::{DecodeOptions, ExportScene, Scene};

use crate::atlas;
use crate::error::{Error, Result};
use crate::gltf_writer;
use crate::output::{StagedFile, with_suffix};
use crate::palette::Palette;

/// Inputs and output location of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRequest {
    pub model: PathBuf,
    pub palette: PathBuf,
    /// Common part of the output paths; `.gltf` and `.png` are appended.
    pub output_prefix: PathBuf,
}

impl ConvertRequest {
    #[must_use]
    pub fn gltf_path(&self) -> PathBuf {
        with_suffix(&self.output_prefix, ".gltf")
    }

    #[must_use]
    pub fn texture_path(&self) -> PathBuf {
        with_suffix(&self.output_prefix, ".png")
    }
}

/// A decoded model with its palette, ready to be saved.
#[derive(Debug)]
pub struct LoadedChr {
    pub scene: Scene,
    pub export: ExportScene,
    pub palette: Palette,
}

/// Paths written by a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOutput {
    pub gltf: PathBuf,
    pub texture: PathBuf,
}

/// Read, decode and assemble the model, then load its palette.
pub fn load_chr(request: &ConvertRequest) -> Result<LoadedChr> {
    let bytes = fs::read(&request.model).map_err(|e| Error::io(&request.model, e))?;
    tracing::info!(
        model = %request.model.display(),
        bytes = bytes.len(),
        "loading CHR model"
    );
    let options = DecodeOptions::for_path(&request.model);
    let (scene, export) = silvie_decode::load_scene(&bytes, &options)?;
    let palette = Palette::load(&request.palette)?;
    Ok(LoadedChr {
        scene,
        export,
        palette,
    })
}

/// Write the atlas and the glTF scene. Neither file appears unless both were
/// written successfully.
pub fn save_chr(loaded: &LoadedChr, request: &ConvertRequest) -> Result<ConvertOutput> {
    let texture = StagedFile::new(request.texture_path());
    let gltf = StagedFile::new(request.gltf_path());

    atlas::encode_atlas(&loaded.scene.texture, &loaded.palette, texture.staging_path())?;
    gltf_writer::write_gltf(&loaded.export, &texture_uri(texture.target()), gltf.staging_path())?;

    let texture = texture.commit()?;
    let gltf = match gltf.commit() {
        Ok(path) => path,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&texture) {
                tracing::warn!(path = %texture.display(), "failed to remove atlas: {cleanup}");
            }
            return Err(e);
        }
    };
    let output = ConvertOutput { gltf, texture };
    tracing::info!(
        gltf = %output.gltf.display(),
        texture = %output.texture.display(),
        "saved CHR model"
    );
    Ok(output)
}

/// Full conversion: [`load_chr`] then [`save_chr`].
pub fn convert_chr(request: &ConvertRequest) -> Result<ConvertOutput> {
    let loaded = load_chr(request)?;
    save_chr(&loaded, request)
}

/// The atlas is referenced by file name, relative to the glTF next to it.
fn texture_uri(texture: &Path) -> String {
    texture
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_share_the_prefix() {
        let request = ConvertRequest {
            model: PathBuf::from("HERO.CHR"),
            palette: PathBuf::from("HERO.PAL"),
            output_prefix: PathBuf::from("out/hero"),
        };
        assert_eq!(request.gltf_path(), PathBuf::from("out/hero.gltf"));
        assert_eq!(request.texture_path(), PathBuf::from("out/hero.png"));
        assert_eq!(texture_uri(&request.texture_path()), "hero.png");
    }
}
