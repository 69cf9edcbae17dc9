//! Decode Silver CHR models into triangle scenes.
//!
//! This crate holds the pure, synchronous part of the CHR pipeline. It never
//! touches the filesystem beyond the reader it is handed; writing images and
//! interchange files is left to the caller.
//!
//! # Pipeline
//!
//! - [`Cursor`]: bounds-checked little-endian reads over a byte source
//! - [`decode`]/[`decode_scene`]: chunk tree to [`Scene`]
//! - [`Tessellator`]: polygon faces to triangles via a [`TessellationEngine`]
//! - [`TexCoordResolver`]: per-corner texture coordinates
//! - [`Assembler`]: [`Scene`] to [`ExportScene`], one merged mesh per node
//!
//! Any error aborts the whole model; no partial scene is ever returned.

mod error;

pub mod assemble;
pub mod chunk;
pub mod cursor;
pub mod scene;
pub mod tessellate;
pub mod texcoords;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use assemble::{Assembler, ExportMaterial, ExportMesh, ExportNode, ExportScene};
pub use chunk::{ChunkId, DecodeOptions, decode, decode_scene};
pub use cursor::{ByteSource, Cursor};
pub use error::{ChunkFault, DecodeError, DecodeResult, GeometryError};
pub use scene::{Face, FaceFlags, FaceVertex, Mesh, MeshGroup, Node, Scene, Texture};
pub use tessellate::{
    EarClipper, PrimitiveMode, TessellationEngine, TessellationSink, Tessellator, Triangle,
    TriangleAssembler,
};
pub use texcoords::TexCoordResolver;

/// Decode and assemble a model held in memory with the built-in tessellator.
pub fn load_scene(bytes: &[u8], options: &DecodeOptions) -> DecodeResult<(Scene, ExportScene)> {
    let scene = decode(&mut Cursor::from_slice(bytes), options)?;
    let export = Assembler::default().assemble(&scene)?;
    Ok((scene, export))
}
