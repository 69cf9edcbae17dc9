//! Recursive descent over the CHR chunk tree.
//!
//! # Format
//!
//! Every chunk starts with a little-endian `id: u32, size: u32` header; `size`
//! counts the payload bytes that follow. The tree is fixed:
//!
//! ```text
//! 0x8000 file
//! └── 0x8001 root
//!     ├── 0x7f01 material offsets
//!     ├── 0x7f03 meshes
//!     │   └── 0x7f02 mesh (× mesh count)
//!     ├── 0x7f04 texture
//!     ├── 0x7f05 nodes
//!     └── 0x7f06 mesh groups (one group per node)
//! ```
//!
//! Child order is part of the format. Every chunk must consume exactly its
//! declared size.

use std::path::Path;

use glam::Mat4;

use crate::cursor::{ByteSource, Cursor};
use crate::error::{ChunkFault, DecodeError, DecodeResult};
use crate::scene::{Face, FaceFlags, FaceVertex, Mesh, MeshGroup, Node, Scene, Texture};

/// Shipped models whose stored mesh ids are known to be wrong.
pub const KNOWN_BROKEN_MESH_IDS: &[&str] = &[
    "BOOTS2.CHR",
    "EROCK1.CHR",
    "EROCK2.CHR",
    "EROCK3.CHR",
    "RINGB.CHR",
    "RING2.CHR",
    "VILLAGR2.CHR",
];

/// Chunk identifiers of the CHR format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkId {
    File,
    Root,
    MaterialOffsets,
    Mesh,
    Meshes,
    Texture,
    Nodes,
    MeshGroups,
}

impl ChunkId {
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::MaterialOffsets => 0x7f01,
            Self::Mesh => 0x7f02,
            Self::Meshes => 0x7f03,
            Self::Texture => 0x7f04,
            Self::Nodes => 0x7f05,
            Self::MeshGroups => 0x7f06,
            Self::File => 0x8000,
            Self::Root => 0x8001,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Root => "root",
            Self::MaterialOffsets => "material offsets",
            Self::Mesh => "mesh",
            Self::Meshes => "meshes",
            Self::Texture => "texture",
            Self::Nodes => "nodes",
            Self::MeshGroups => "mesh groups",
        }
    }
}

impl TryFrom<u32> for ChunkId {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, u32> {
        Ok(match raw {
            0x7f01 => Self::MaterialOffsets,
            0x7f02 => Self::Mesh,
            0x7f03 => Self::Meshes,
            0x7f04 => Self::Texture,
            0x7f05 => Self::Nodes,
            0x7f06 => Self::MeshGroups,
            0x8000 => Self::File,
            0x8001 => Self::Root,
            other => return Err(other),
        })
    }
}

/// Raw chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: u32,
    pub size: u32,
}

/// Per-file decoding context.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// File name of the model, used to recognise known-broken assets.
    pub source_name: Option<String>,
}

impl DecodeOptions {
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        Self {
            source_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }

    /// Whether this file is one of the shipped models with broken mesh ids.
    #[must_use]
    pub fn has_known_broken_mesh_ids(&self) -> bool {
        self.source_name.as_deref().is_some_and(|name| {
            KNOWN_BROKEN_MESH_IDS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(name))
        })
    }
}

/// Decode a complete CHR model held in memory.
pub fn decode_scene(bytes: &[u8]) -> DecodeResult<Scene> {
    decode(&mut Cursor::from_slice(bytes), &DecodeOptions::default())
}

/// Decode a complete CHR model from `cursor`.
///
/// Nothing is returned unless the whole tree decodes; the first error aborts.
pub fn decode<S: ByteSource>(
    cursor: &mut Cursor<S>,
    options: &DecodeOptions,
) -> DecodeResult<Scene> {
    let scene = ChunkDecoder {
        cursor: &mut *cursor,
        options,
    }
    .file()?;
    tracing::debug!(
        materials = scene.material_offsets.len(),
        meshes = scene.meshes.len(),
        nodes = scene.nodes.len(),
        atlas_width = scene.texture.width,
        atlas_height = scene.texture.height,
        "decoded CHR scene"
    );
    if let Some(trailing) = cursor.remaining().filter(|&n| n > 0) {
        tracing::debug!(trailing, "ignoring bytes after the file chunk");
    }
    Ok(scene)
}

struct ChunkDecoder<'a, S> {
    cursor: &'a mut Cursor<S>,
    options: &'a DecodeOptions,
}

impl<S: ByteSource> ChunkDecoder<'_, S> {
    /// Read one chunk header, check it is `expected`, decode its payload and
    /// verify the payload consumed exactly the declared size.
    fn chunk<T>(
        &mut self,
        expected: ChunkId,
        payload: impl FnOnce(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        let offset = self.cursor.position();
        let header = ChunkHeader {
            id: self.cursor.read_u32()?,
            size: self.cursor.read_u32()?,
        };
        let malformed = |fault| DecodeError::MalformedChunk {
            id: header.id,
            offset,
            fault,
        };

        let id = ChunkId::try_from(header.id).map_err(|_| malformed(ChunkFault::UnknownId))?;
        if id != expected {
            return Err(malformed(ChunkFault::Unexpected {
                expected: expected.name(),
            }));
        }

        let start = self.cursor.position();
        let value = payload(self)?;
        let consumed = self.cursor.position() - start;
        if usize::try_from(header.size).ok() != Some(consumed) {
            return Err(malformed(ChunkFault::SizeMismatch {
                declared: header.size,
                consumed,
            }));
        }
        Ok(value)
    }

    fn count(&mut self) -> DecodeResult<usize> {
        let count = self.cursor.read_u32()?;
        usize::try_from(count).map_err(|_| DecodeError::overflow("element count", count))
    }

    fn file(&mut self) -> DecodeResult<Scene> {
        self.chunk(ChunkId::File, |d| d.chunk(ChunkId::Root, Self::root))
    }

    fn root(&mut self) -> DecodeResult<Scene> {
        let material_offsets = self.chunk(ChunkId::MaterialOffsets, Self::material_offsets)?;
        let (first_mesh_id, meshes) = self.chunk(ChunkId::Meshes, Self::meshes)?;
        let texture = self.chunk(ChunkId::Texture, Self::texture)?;
        let nodes = self.chunk(ChunkId::Nodes, Self::nodes)?;
        let mesh_groups = self.chunk(ChunkId::MeshGroups, |d| d.mesh_groups(nodes.len()))?;
        Ok(Scene {
            material_offsets,
            first_mesh_id,
            meshes,
            texture,
            nodes,
            mesh_groups,
        })
    }

    fn material_offsets(&mut self) -> DecodeResult<Vec<u32>> {
        let count = self.count()?;
        self.cursor.read_u32_array(count)
    }

    fn meshes(&mut self) -> DecodeResult<(u32, Vec<Mesh>)> {
        let count = self.count()?;
        let first_mesh_id = self.cursor.read_u32()?;
        let mut meshes = Vec::with_capacity(self.cursor.capacity_hint(count, 8));
        for index in 0..count {
            let mut mesh = self.chunk(ChunkId::Mesh, Self::mesh)?;
            let repaired = u32::try_from(index)
                .ok()
                .and_then(|index| first_mesh_id.checked_add(index))
                .ok_or_else(|| DecodeError::overflow("mesh id", index))?;
            if mesh.id != repaired {
                if self.options.has_known_broken_mesh_ids() {
                    tracing::debug!(index, stored = mesh.id, repaired, "repairing mesh id");
                } else {
                    tracing::warn!(
                        index,
                        stored = mesh.id,
                        repaired,
                        "mesh id does not follow the first mesh id, repairing"
                    );
                }
            }
            mesh.id = repaired;
            meshes.push(mesh);
        }
        Ok((first_mesh_id, meshes))
    }

    fn mesh(&mut self) -> DecodeResult<Mesh> {
        let index = self.cursor.read_u32()?;
        let id = self.cursor.read_u32()?;
        self.cursor.skip(4)?;
        let vertex_count = self.count()?;
        let normal_count = self.count()?;
        let face_count = self.count()?;
        self.cursor.skip(8)?;
        let origin = self.cursor.read_vec3()?;
        let mut matrix = [0.0; 16];
        for value in &mut matrix {
            *value = self.cursor.read_f32()?;
        }
        let positions = self.cursor.read_vec3_array(vertex_count)?;
        let normals = self.cursor.read_vec3_array(normal_count)?;

        let mut faces = Vec::with_capacity(self.cursor.capacity_hint(face_count, 8));
        for _ in 0..face_count {
            faces.push(self.face(vertex_count)?);
        }
        tracing::trace!(index, id, vertex_count, face_count, "decoded mesh");

        Ok(Mesh {
            index,
            id,
            origin,
            transform: Mat4::from_cols_array(&matrix),
            positions,
            normals,
            faces,
        })
    }

    fn face(&mut self, vertex_count: usize) -> DecodeResult<Face> {
        let offset = self.cursor.position();
        let flags = FaceFlags(self.cursor.read_u8()?);
        let index = self.cursor.read_u8()?;
        let count = usize::from(self.cursor.read_u8()?);
        let material = self.cursor.read_u8()?;
        self.cursor.skip(4)?;

        let mut vertices = Vec::with_capacity(count);
        for _ in 0..count {
            let position = self.cursor.read_u32()?;
            self.cursor.skip(4)?;
            let color = self.cursor.read_u16()?;
            let u = self.cursor.read_u16()?;
            self.cursor.skip(2)?;
            let v = self.cursor.read_u16()?;

            if !usize::try_from(position).is_ok_and(|p| p < vertex_count) {
                return Err(DecodeError::MalformedChunk {
                    id: ChunkId::Mesh.raw(),
                    offset,
                    fault: ChunkFault::IndexOutOfRange {
                        what: "face vertex",
                        index: i64::from(position),
                        limit: vertex_count,
                    },
                });
            }
            vertices.push(FaceVertex {
                position,
                color,
                texel: [u, v],
            });
        }

        Ok(Face {
            flags,
            index,
            material,
            vertices,
        })
    }

    fn texture(&mut self) -> DecodeResult<Texture> {
        let offset = self.cursor.position();
        self.cursor.skip(4)?;
        let width = self.cursor.read_u32()?;
        let height = self.cursor.read_u32()?;
        self.cursor.skip(4)?;
        let buffer_size = self.cursor.read_u32()?;
        let stride = self.cursor.read_u32()?;
        let buffer_offset = self.cursor.read_u32()?;
        self.cursor.skip(5 * 4)?;
        let rows = usize::try_from(height).map_err(|_| DecodeError::overflow("atlas height", height))?;
        let row_table = self.cursor.read_i32_array(rows)?;

        let declared = usize::try_from(buffer_size)
            .map_err(|_| DecodeError::overflow("atlas buffer size", buffer_size))?;
        let stored = declared
            .checked_sub(Texture::MISSING_TAIL)
            .ok_or(DecodeError::MalformedChunk {
                id: ChunkId::Texture.raw(),
                offset,
                fault: ChunkFault::BufferTooSmall {
                    declared: buffer_size,
                },
            })?;
        let mut pixels = self.cursor.read_bytes(stored)?;
        pixels.resize(declared, 0);

        if stride != width {
            tracing::debug!(width, stride, "atlas stride differs from width");
        }

        Ok(Texture {
            width,
            height,
            stride,
            buffer_offset,
            row_table,
            pixels,
        })
    }

    fn nodes(&mut self) -> DecodeResult<Vec<Node>> {
        let offset = self.cursor.position();
        self.cursor.skip(4)?;
        let count = self.count()?;
        let mut nodes = Vec::with_capacity(self.cursor.capacity_hint(count, 16));
        for _ in 0..count {
            nodes.push(Node {
                parent: self.cursor.read_i32()?,
                position: self.cursor.read_vec3()?,
            });
        }

        for (index, node) in nodes.iter().enumerate() {
            let in_range = usize::try_from(node.parent).is_ok_and(|parent| parent < count);
            if node.parent != -1 && !in_range {
                return Err(DecodeError::MalformedChunk {
                    id: ChunkId::Nodes.raw(),
                    offset,
                    fault: ChunkFault::IndexOutOfRange {
                        what: "node parent",
                        index: i64::from(node.parent),
                        limit: count,
                    },
                });
            }
            tracing::trace!(index, parent = node.parent, "decoded node");
        }
        Ok(nodes)
    }

    fn mesh_groups(&mut self, node_count: usize) -> DecodeResult<Vec<MeshGroup>> {
        let mut groups = Vec::with_capacity(self.cursor.capacity_hint(node_count, 4));
        for node in 0..node_count {
            let kind = self.cursor.read_u32()?;
            let group = match kind {
                MeshGroup::TYPE_NONE => MeshGroup::None,
                MeshGroup::TYPE_SINGLE => MeshGroup::Single(self.cursor.read_u32()?),
                MeshGroup::TYPE_LIST => {
                    let count = self.count()?;
                    MeshGroup::List(self.cursor.read_u32_array(count)?)
                }
                _ => return Err(DecodeError::MalformedGroup { node, kind }),
            };
            groups.push(group);
        }
        Ok(groups)
    }
}
