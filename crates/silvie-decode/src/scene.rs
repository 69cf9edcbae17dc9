//! In-memory CHR scene, as decoded from the chunk tree.

use glam::{Mat4, Vec3};

/// A decoded CHR model. Built once by the chunk decoder, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    /// Atlas pixel offset of each material, indexed by material number.
    pub material_offsets: Vec<u32>,
    /// First mesh id declared by the meshes chunk.
    pub first_mesh_id: u32,
    pub meshes: Vec<Mesh>,
    pub texture: Texture,
    pub nodes: Vec<Node>,
    /// One group per node, same order as `nodes`.
    pub mesh_groups: Vec<MeshGroup>,
}

impl Scene {
    /// Exact-match lookup by mesh id.
    #[must_use]
    pub fn mesh_by_id(&self, id: u32) -> Option<&Mesh> {
        self.meshes.iter().find(|mesh| mesh.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Position within the meshes chunk.
    pub index: u32,
    /// Id referenced by mesh groups (after repair, see [`crate::chunk`]).
    pub id: u32,
    pub origin: Vec3,
    pub transform: Mat4,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub faces: Vec<Face>,
}

impl Mesh {
    /// Triangles this mesh contributes once every face is tessellated.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(Face::triangle_count).sum()
    }
}

/// Face flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaceFlags(pub u8);

impl FaceFlags {
    /// Texture coordinates come from palette lookups in the atlas rather
    /// than from explicit texels.
    pub const COLOR_INDEXED: u8 = 0x08;

    #[must_use]
    pub fn color_indexed(self) -> bool {
        self.0 & Self::COLOR_INDEXED != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Face {
    pub flags: FaceFlags,
    pub index: u8,
    /// Index into [`Scene::material_offsets`].
    pub material: u8,
    pub vertices: Vec<FaceVertex>,
}

impl Face {
    /// `n - 2` for polygons, zero for anything smaller than a triangle.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.vertices.len().saturating_sub(2)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaceVertex {
    /// Index into the owning mesh's `positions`.
    pub position: u32,
    /// Palette index, used by color-indexed faces.
    pub color: u16,
    /// Explicit atlas texel (u, v), used by every other face.
    pub texel: [u16; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Node {
    /// Parent node index; `-1` or the node's own index mean "no parent".
    pub parent: i32,
    pub position: Vec3,
}

impl Node {
    /// Parent index, or `None` for root sentinels.
    #[must_use]
    pub fn parent_index(&self, own_index: usize) -> Option<usize> {
        match usize::try_from(self.parent) {
            Ok(parent) if parent != own_index => Some(parent),
            _ => None,
        }
    }
}

/// Which meshes a node carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MeshGroup {
    #[default]
    None,
    Single(u32),
    List(Vec<u32>),
}

impl MeshGroup {
    pub const TYPE_NONE: u32 = 0;
    pub const TYPE_SINGLE: u32 = 1;
    pub const TYPE_LIST: u32 = 2;

    /// Referenced mesh ids, in declaration order.
    #[must_use]
    pub fn mesh_ids(&self) -> &[u32] {
        match self {
            Self::None => &[],
            Self::Single(id) => std::slice::from_ref(id),
            Self::List(ids) => ids,
        }
    }
}

/// The packed, palette-indexed texture atlas shared by every material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    /// Second width field of the header; matches `width` in shipped files.
    pub stride: u32,
    pub buffer_offset: u32,
    /// One opaque value per atlas row.
    pub row_table: Vec<i32>,
    /// Palette indices, sized to the declared buffer size. The final
    /// [`Texture::MISSING_TAIL`] bytes are absent from every file and stay zero.
    pub pixels: Vec<u8>,
}

impl Texture {
    /// The game overreads the last 8 atlas bytes from the next chunk; they are
    /// never stored in the texture chunk itself.
    pub const MISSING_TAIL: usize = 8;
}
