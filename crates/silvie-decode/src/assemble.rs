//! Scene assembly: node hierarchy, merged per-node meshes and materials,
//! ready for an interchange writer.

use glam::{Vec2, Vec3};

use crate::chunk::ChunkId;
use crate::error::{ChunkFault, DecodeError, DecodeResult};
use crate::scene::{Mesh, Node, Scene, Texture};
use crate::tessellate::{EarClipper, TessellationEngine, Tessellator};
use crate::texcoords::{TexCoordResolver, atlas_size};

/// A scene flattened for export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportScene {
    /// One entry per decoded node, same order.
    pub nodes: Vec<ExportNode>,
    pub meshes: Vec<ExportMesh>,
    /// One entry per material offset, same order.
    pub materials: Vec<ExportMaterial>,
}

impl ExportScene {
    /// Indices of nodes without a parent.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(index, _)| index)
    }

    /// Indices of the direct children of `parent`, in node order.
    pub fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| node.parent == Some(parent))
            .map(|(index, _)| index)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportNode {
    pub name: String,
    pub parent: Option<usize>,
    pub translation: Vec3,
    /// Index into [`ExportScene::meshes`].
    pub mesh: Option<usize>,
}

/// All meshes of one node merged into a single triangle list.
///
/// Corners are never shared: `positions[i]` and `tex_coords[i]` belong to
/// exactly one triangle corner and `indices` is `0..positions.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub indices: Vec<u32>,
    /// Material index of each triangle.
    pub triangle_materials: Vec<u8>,
}

impl ExportMesh {
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangle_materials.len()
    }

    /// Distinct materials in first-use order.
    #[must_use]
    pub fn materials_used(&self) -> Vec<u8> {
        let mut used = Vec::new();
        for &material in &self.triangle_materials {
            if !used.contains(&material) {
                used.push(material);
            }
        }
        used
    }

    /// Corner indices of the triangles that use `material`.
    pub fn indices_for(&self, material: u8) -> impl Iterator<Item = u32> + '_ {
        self.indices
            .chunks_exact(3)
            .zip(&self.triangle_materials)
            .filter(move |(_, m)| **m == material)
            .flat_map(|(corners, _)| corners.iter().copied())
    }
}

/// A material's place in the shared atlas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportMaterial {
    pub name: String,
    /// Atlas pixel column and row of the material origin.
    pub column: u32,
    pub row: u32,
    /// `(column / width, row / height)`; writers apply their own sign
    /// convention.
    pub uv_offset: Vec2,
}

/// Builds an [`ExportScene`] from a decoded [`Scene`].
#[derive(Debug)]
pub struct Assembler<E = EarClipper> {
    tessellator: Tessellator<E>,
}

impl Default for Assembler<EarClipper> {
    fn default() -> Self {
        Self::new(Tessellator::default())
    }
}

impl<E: TessellationEngine> Assembler<E> {
    pub fn new(tessellator: Tessellator<E>) -> Self {
        Self { tessellator }
    }

    pub fn assemble(&mut self, scene: &Scene) -> DecodeResult<ExportScene> {
        check_forest(&scene.nodes)?;
        let resolver = TexCoordResolver::new(scene);

        let materials = scene
            .material_offsets
            .iter()
            .enumerate()
            .map(|(index, &offset)| material(index, offset, &scene.texture))
            .collect::<DecodeResult<Vec<_>>>()?;

        let mut export = ExportScene {
            materials,
            ..ExportScene::default()
        };
        for (index, node) in scene.nodes.iter().enumerate() {
            let ids = scene
                .mesh_groups
                .get(index)
                .map_or(&[][..], |group| group.mesh_ids());
            let mesh = if ids.is_empty() {
                None
            } else {
                let merged = self.merge(scene, &resolver, index, ids)?;
                export.meshes.push(merged);
                Some(export.meshes.len() - 1)
            };
            export.nodes.push(ExportNode {
                name: index.to_string(),
                parent: node.parent_index(index),
                translation: node.position,
                mesh,
            });
        }

        tracing::debug!(
            nodes = export.nodes.len(),
            meshes = export.meshes.len(),
            materials = export.materials.len(),
            "assembled scene"
        );
        Ok(export)
    }

    fn merge(
        &mut self,
        scene: &Scene,
        resolver: &TexCoordResolver<'_>,
        node: usize,
        ids: &[u32],
    ) -> DecodeResult<ExportMesh> {
        let sources = ids
            .iter()
            .map(|&mesh_id| {
                scene
                    .mesh_by_id(mesh_id)
                    .ok_or(DecodeError::UnknownMeshId { node, mesh_id })
            })
            .collect::<DecodeResult<Vec<&Mesh>>>()?;

        let triangles: usize = sources.iter().map(|mesh| mesh.triangle_count()).sum();
        let corners = triangles * 3;
        let mut out = ExportMesh {
            name: node.to_string(),
            positions: Vec::with_capacity(corners),
            tex_coords: Vec::with_capacity(corners),
            indices: Vec::with_capacity(corners),
            triangle_materials: Vec::with_capacity(triangles),
        };

        for mesh in sources {
            for face in &mesh.faces {
                if !face.flags.color_indexed() && resolver.material_offset(face.material).is_err() {
                    tracing::warn!(
                        node,
                        mesh = mesh.id,
                        material = face.material,
                        materials = scene.material_offsets.len(),
                        "explicit-texel face uses a material outside the offset table"
                    );
                }
                for triangle in self.tessellator.tessellate_face(face, &mesh.positions)? {
                    for corner in triangle {
                        let index = u32::try_from(out.positions.len())
                            .map_err(|_| DecodeError::overflow("vertex index", out.positions.len()))?;
                        let position = usize::try_from(corner.position)
                            .ok()
                            .and_then(|p| mesh.positions.get(p))
                            .ok_or(DecodeError::MalformedChunk {
                                id: ChunkId::Mesh.raw(),
                                offset: 0,
                                fault: ChunkFault::IndexOutOfRange {
                                    what: "face vertex",
                                    index: i64::from(corner.position),
                                    limit: mesh.positions.len(),
                                },
                            })?;
                        out.positions.push(*position);
                        out.tex_coords.push(resolver.resolve(face, corner)?);
                        out.indices.push(index);
                    }
                    out.triangle_materials.push(face.material);
                }
            }
        }
        tracing::trace!(node, meshes = ids.len(), triangles = out.triangle_count(), "merged node meshes");
        Ok(out)
    }
}

fn material(index: usize, offset: u32, texture: &Texture) -> DecodeResult<ExportMaterial> {
    let [width, height] = atlas_size(texture)?;
    let column = offset % texture.width;
    let row = offset / texture.width;
    #[allow(clippy::cast_possible_truncation)]
    let uv_offset = Vec2::new(
        (f64::from(column) / width) as f32,
        (f64::from(row) / height) as f32,
    );
    Ok(ExportMaterial {
        name: format!("mat{index}"),
        column,
        row,
        uv_offset,
    })
}

/// Parent links must form a forest.
fn check_forest(nodes: &[Node]) -> DecodeResult<()> {
    for start in 0..nodes.len() {
        let mut current = start;
        let mut depth = 0;
        while let Some(parent) = nodes[current].parent_index(current) {
            if parent >= nodes.len() {
                return Err(DecodeError::MalformedChunk {
                    id: ChunkId::Nodes.raw(),
                    offset: 0,
                    fault: ChunkFault::IndexOutOfRange {
                        what: "node parent",
                        index: i64::from(nodes[current].parent),
                        limit: nodes.len(),
                    },
                });
            }
            depth += 1;
            if depth > nodes.len() {
                return Err(DecodeError::NodeCycle { node: start });
            }
            current = parent;
        }
    }
    Ok(())
}
