//! Fixture encoder for CHR tests.
//!
//! Writes the legacy chunk layout byte-for-byte so tests can build models,
//! and deliberately broken variants of them, without shipping game assets.

use glam::{Mat4, Vec3};

use crate::chunk::ChunkId;
use crate::scene::{Face, FaceFlags, FaceVertex, Mesh, MeshGroup, Node, Scene, Texture};

/// Little-endian byte sink.
#[derive(Debug, Default)]
pub struct ChrWriter {
    bytes: Vec<u8>,
}

impl ChrWriter {
    /// Frame `payload` as a chunk whose size matches the payload exactly.
    #[must_use]
    pub fn chunk(id: u32, payload: &[u8]) -> Vec<u8> {
        let size = u32::try_from(payload.len()).expect("fixture chunk fits in u32");
        Self::chunk_with_size(id, size, payload)
    }

    /// Frame `payload` with an arbitrary declared size.
    #[must_use]
    pub fn chunk_with_size(id: u32, size: u32, payload: &[u8]) -> Vec<u8> {
        let mut writer = Self::default();
        writer.u32(id);
        writer.u32(size);
        writer.bytes(payload);
        writer.into_bytes()
    }

    pub fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn vec3(&mut self, value: Vec3) {
        for component in value.to_array() {
            self.f32(component);
        }
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn len_u32(&mut self, len: usize) {
        self.u32(u32::try_from(len).expect("fixture length fits in u32"));
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encode a whole scene. Mesh ids are written as stored in `scene`.
#[must_use]
pub fn encode_scene(scene: &Scene) -> Vec<u8> {
    wrap_root(&encode_root_children(scene))
}

/// Wrap already-encoded root children in the root and file chunks.
#[must_use]
pub fn wrap_root(children: &[Vec<u8>]) -> Vec<u8> {
    let root = ChrWriter::chunk(ChunkId::Root.raw(), &children.concat());
    ChrWriter::chunk(ChunkId::File.raw(), &root)
}

/// The five root children in file order: material offsets, meshes, texture,
/// nodes, mesh groups.
#[must_use]
pub fn encode_root_children(scene: &Scene) -> Vec<Vec<u8>> {
    vec![
        encode_material_offsets(&scene.material_offsets),
        encode_meshes(scene.first_mesh_id, &scene.meshes),
        encode_texture(&scene.texture),
        encode_nodes(&scene.nodes),
        encode_mesh_groups(&scene.mesh_groups),
    ]
}

fn encode_material_offsets(offsets: &[u32]) -> Vec<u8> {
    let mut w = ChrWriter::default();
    w.len_u32(offsets.len());
    for &offset in offsets {
        w.u32(offset);
    }
    ChrWriter::chunk(ChunkId::MaterialOffsets.raw(), &w.into_bytes())
}

fn encode_meshes(first_mesh_id: u32, meshes: &[Mesh]) -> Vec<u8> {
    let mut w = ChrWriter::default();
    w.len_u32(meshes.len());
    w.u32(first_mesh_id);
    for mesh in meshes {
        w.bytes(&encode_mesh(mesh));
    }
    ChrWriter::chunk(ChunkId::Meshes.raw(), &w.into_bytes())
}

/// Encode a single mesh chunk.
#[must_use]
pub fn encode_mesh(mesh: &Mesh) -> Vec<u8> {
    let mut w = ChrWriter::default();
    w.u32(mesh.index);
    w.u32(mesh.id);
    w.u32(0);
    w.len_u32(mesh.positions.len());
    w.len_u32(mesh.normals.len());
    w.len_u32(mesh.faces.len());
    w.i32(0);
    w.i32(0);
    w.vec3(mesh.origin);
    for value in mesh.transform.to_cols_array() {
        w.f32(value);
    }
    for &position in &mesh.positions {
        w.vec3(position);
    }
    for &normal in &mesh.normals {
        w.vec3(normal);
    }
    for face in &mesh.faces {
        w.u8(face.flags.0);
        w.u8(face.index);
        w.u8(u8::try_from(face.vertices.len()).expect("face fits in u8"));
        w.u8(face.material);
        w.i32(0);
        for vertex in &face.vertices {
            w.u32(vertex.position);
            w.i32(0);
            w.u16(vertex.color);
            w.u16(vertex.texel[0]);
            w.u16(0);
            w.u16(vertex.texel[1]);
        }
    }
    ChrWriter::chunk(ChunkId::Mesh.raw(), &w.into_bytes())
}

/// `pixels` supplies the declared buffer size; its last
/// [`Texture::MISSING_TAIL`] bytes are not written, as in shipped files.
fn encode_texture(texture: &Texture) -> Vec<u8> {
    let mut w = ChrWriter::default();
    w.i32(0);
    w.u32(texture.width);
    w.u32(texture.height);
    w.i32(0);
    w.len_u32(texture.pixels.len());
    w.u32(texture.stride);
    w.u32(texture.buffer_offset);
    for _ in 0..5 {
        w.i32(0);
    }
    for &row in &texture.row_table {
        w.i32(row);
    }
    let stored = texture.pixels.len().saturating_sub(Texture::MISSING_TAIL);
    w.bytes(&texture.pixels[..stored]);
    ChrWriter::chunk(ChunkId::Texture.raw(), &w.into_bytes())
}

fn encode_nodes(nodes: &[Node]) -> Vec<u8> {
    let mut w = ChrWriter::default();
    w.i32(0);
    w.len_u32(nodes.len());
    for node in nodes {
        w.i32(node.parent);
        w.vec3(node.position);
    }
    ChrWriter::chunk(ChunkId::Nodes.raw(), &w.into_bytes())
}

fn encode_mesh_groups(groups: &[MeshGroup]) -> Vec<u8> {
    let mut w = ChrWriter::default();
    for group in groups {
        match group {
            MeshGroup::None => w.u32(MeshGroup::TYPE_NONE),
            MeshGroup::Single(id) => {
                w.u32(MeshGroup::TYPE_SINGLE);
                w.u32(*id);
            }
            MeshGroup::List(ids) => {
                w.u32(MeshGroup::TYPE_LIST);
                w.len_u32(ids.len());
                for &id in ids {
                    w.u32(id);
                }
            }
        }
    }
    ChrWriter::chunk(ChunkId::MeshGroups.raw(), &w.into_bytes())
}

/// A small valid model.
///
/// - 4×8 atlas whose first 24 pixels hold their own index; the 8-byte tail is zero.
/// - Materials at pixel offsets 0 and 2.
/// - Mesh 10: one explicitly textured triangle using material 0.
/// - Mesh 11: one color-indexed quad using material 1.
/// - Node 0 is the root with no meshes; node 1 is its child and carries both meshes.
#[must_use]
pub fn sample_scene() -> Scene {
    let mut pixels: Vec<u8> = (0..24).collect();
    pixels.resize(32, 0);

    let triangle = Mesh {
        index: 0,
        id: 10,
        origin: Vec3::ZERO,
        transform: Mat4::IDENTITY,
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        normals: vec![Vec3::Z],
        faces: vec![Face {
            flags: FaceFlags::default(),
            index: 0,
            material: 0,
            vertices: vec![
                textured_vertex(0, [0, 0]),
                textured_vertex(1, [2, 0]),
                textured_vertex(2, [0, 4]),
            ],
        }],
    };

    let quad = Mesh {
        index: 1,
        id: 11,
        origin: Vec3::new(0.5, 0.0, 0.0),
        transform: Mat4::IDENTITY,
        positions: vec![
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ],
        normals: vec![Vec3::Z, Vec3::Z],
        faces: vec![Face {
            flags: FaceFlags(FaceFlags::COLOR_INDEXED),
            index: 1,
            material: 1,
            vertices: vec![
                indexed_vertex(0, 6),
                indexed_vertex(1, 18),
                indexed_vertex(2, 22),
                indexed_vertex(3, 200),
            ],
        }],
    };

    Scene {
        material_offsets: vec![0, 2],
        first_mesh_id: 10,
        meshes: vec![triangle, quad],
        texture: Texture {
            width: 4,
            height: 8,
            stride: 4,
            buffer_offset: 0,
            row_table: (0..8).map(|row| row * 4).collect(),
            pixels,
        },
        nodes: vec![
            Node {
                parent: -1,
                position: Vec3::ZERO,
            },
            Node {
                parent: 0,
                position: Vec3::new(1.0, 2.0, 3.0),
            },
        ],
        mesh_groups: vec![MeshGroup::None, MeshGroup::List(vec![10, 11])],
    }
}

fn textured_vertex(position: u32, texel: [u16; 2]) -> FaceVertex {
    FaceVertex {
        position,
        color: 0,
        texel,
    }
}

fn indexed_vertex(position: u32, color: u16) -> FaceVertex {
    FaceVertex {
        position,
        color,
        texel: [0, 0],
    }
}
