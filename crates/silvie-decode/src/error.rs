//! Error types for CHR decoding, tessellation and assembly.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Everything that can go wrong between the first byte read and the
/// assembled export scene. Any of these aborts the whole asset.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A read ran past the end of the byte source.
    #[error("unexpected end of stream at offset {offset} (wanted {requested} bytes)")]
    Truncated { offset: usize, requested: usize },

    /// A chunk could not be decoded as declared.
    #[error("malformed chunk {id:#06x} at offset {offset}: {fault}")]
    MalformedChunk {
        id: u32,
        offset: usize,
        fault: ChunkFault,
    },

    /// A mesh group carries a type tag outside none/single/list.
    #[error("unknown mesh group type {kind} for node {node}")]
    MalformedGroup { node: usize, kind: u32 },

    /// A mesh group references a mesh id absent from the mesh table.
    #[error("unknown mesh id {mesh_id} referenced by node {node}")]
    UnknownMeshId { node: usize, mesh_id: u32 },

    /// A face references a material offset that does not exist.
    #[error("unknown material {material} (model declares {count})")]
    UnknownMaterial { material: u8, count: usize },

    /// The texture atlas cannot back the faces that sample it.
    #[error("malformed texture: {0}")]
    MalformedTexture(String),

    /// Node parent links loop back on themselves.
    #[error("node {node} is part of a parent cycle")]
    NodeCycle { node: usize },

    /// A size or index does not fit the target numeric range.
    #[error("numeric overflow converting {what} ({value})")]
    NumericOverflow { what: &'static str, value: u64 },

    /// The tessellation engine rejected a polygon.
    #[error("tessellation failed: {0}")]
    Geometry(#[from] GeometryError),

    /// The underlying reader failed for a reason other than end of stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a chunk was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkFault {
    #[error("unknown chunk identifier")]
    UnknownId,
    #[error("expected {expected} chunk")]
    Unexpected { expected: &'static str },
    #[error("chunk size mismatch: declared {declared} bytes, consumed {consumed}")]
    SizeMismatch { declared: u32, consumed: usize },
    #[error("{what} index {index} out of range (limit {limit})")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        limit: usize,
    },
    #[error("declared buffer of {declared} bytes is too small")]
    BufferTooSmall { declared: u32 },
}

/// Errors reported by a tessellation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("polygon is degenerate")]
    Degenerate,
    #[error("polygon is self-intersecting")]
    SelfIntersecting,
    #[error("polygon could not be triangulated")]
    NoEar,
    #[error("tessellation engine emitted {emitted} triangles, expected {expected}")]
    TriangleCount { emitted: usize, expected: usize },
    #[error("vertex {index} is outside the polygon")]
    VertexOutOfRange { index: usize },
}

impl DecodeError {
    pub(crate) fn overflow(what: &'static str, value: impl TryInto<u64>) -> Self {
        Self::NumericOverflow {
            what,
            value: value.try_into().unwrap_or(u64::MAX),
        }
    }
}
