//! Convert Silver game assets into standard interchange formats.
//!
//! Decoding lives in [`silvie_decode`]; this crate adds the file-facing side:
//! palettes, atlas images, glTF scenes and all-or-nothing output.
//!
//! # Example
//!
//! ```no_run
//! use silvie::ConvertRequest;
//!
//! let request = ConvertRequest {
//!     model: "HERO.CHR".into(),
//!     palette: "HERO.PAL".into(),
//!     output_prefix: "out/hero".into(),
//! };
//! let output = silvie::convert_chr(&request)?;
//! println!("wrote {}", output.gltf.display());
//! # Ok::<(), silvie::Error>(())
//! ```

mod error;

pub mod atlas;
pub mod convert;
pub mod gltf_writer;
pub mod output;
pub mod palette;

pub use convert::{ConvertOutput, ConvertRequest, LoadedChr, convert_chr, load_chr, save_chr};
pub use error::{Error, Result};
pub use output::StagedFile;
pub use palette::Palette;
pub use silvie_decode as decode;
