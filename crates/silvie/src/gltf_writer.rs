//! glTF 2.0 export of assembled scenes.
//!
//! Geometry is embedded as a single base64 data-URI buffer. Every material
//! samples the shared atlas image; its atlas offset and the flip from the
//! model's bottom-up V axis are expressed with `KHR_texture_transform`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::{Engine, prelude::BASE64_STANDARD};
use glam::Vec3;
use gltf::json::{
    self, Index,
    accessor::{ComponentType, GenericComponentType, Type},
    buffer::Target,
    extensions::texture::{
        TextureTransform, TextureTransformOffset, TextureTransformRotation, TextureTransformScale,
    },
    image::MimeType,
    material::{PbrMetallicRoughness, StrengthFactor},
    mesh::{Mode, Semantic},
    texture::{MagFilter, MinFilter},
    validation::{Checked, USize64},
};
use silvie_decode::{DecodeError, ExportMaterial, ExportMesh, ExportScene};

use crate::error::{Error, Result};

/// Name of the extension carrying per-material atlas offsets.
pub const TEXTURE_TRANSFORM: &str = "KHR_texture_transform";

const GENERATOR: &str = concat!("silvie ", env!("CARGO_PKG_VERSION"));

/// Build the glTF document for `export`. `texture_uri` is stored verbatim as
/// the atlas image reference.
pub fn build_root(export: &ExportScene, texture_uri: &str) -> Result<json::Root> {
    let mut builder = RootBuilder::default();
    let materials = builder.materials(&export.materials, texture_uri)?;

    let mut meshes = Vec::with_capacity(export.meshes.len());
    for mesh in &export.meshes {
        meshes.push(builder.mesh(mesh, &materials)?);
    }

    for (index, node) in export.nodes.iter().enumerate() {
        let children = export
            .children(index)
            .map(index_of)
            .collect::<Result<Vec<Index<json::Node>>>>()?;
        builder.root.nodes.push(json::Node {
            name: Some(node.name.clone()),
            translation: Some(node.translation.to_array()),
            mesh: node.mesh.and_then(|mesh| meshes[mesh]),
            children: (!children.is_empty()).then_some(children),
            ..Default::default()
        });
    }

    let roots = export.roots().map(index_of).collect::<Result<Vec<_>>>()?;
    builder.root.scenes.push(json::Scene {
        extensions: None,
        extras: None,
        name: None,
        nodes: roots,
    });
    builder.root.scene = Some(Index::new(0));
    Ok(builder.finish())
}

/// Build the glTF document for `export` and write it as JSON to `path`.
pub fn write_gltf(export: &ExportScene, texture_uri: &str, path: &Path) -> Result<()> {
    let root = build_root(export, texture_uri)?;
    let bytes = serde_json::to_vec_pretty(&root)?;
    fs::write(path, bytes).map_err(|e| Error::io(path, e))?;
    tracing::debug!(
        path = %path.display(),
        nodes = root.nodes.len(),
        meshes = root.meshes.len(),
        "wrote glTF"
    );
    Ok(())
}

#[derive(Default)]
struct RootBuilder {
    root: json::Root,
    buffer: Vec<u8>,
}

impl RootBuilder {
    fn finish(mut self) -> json::Root {
        self.root.asset = json::Asset {
            version: "2.0".to_string(),
            generator: Some(GENERATOR.to_string()),
            ..Default::default()
        };
        if !self.buffer.is_empty() {
            self.root.buffers.push(json::Buffer {
                byte_length: size(self.buffer.len()),
                uri: Some(format!(
                    "data:application/octet-stream;base64,{}",
                    BASE64_STANDARD.encode(&self.buffer)
                )),
                name: None,
                extensions: None,
                extras: None,
            });
        }
        self.root
    }

    fn materials(
        &mut self,
        materials: &[ExportMaterial],
        texture_uri: &str,
    ) -> Result<Vec<Index<json::Material>>> {
        if materials.is_empty() {
            return Ok(Vec::new());
        }

        let image = push(
            &mut self.root.images,
            json::Image {
                buffer_view: None,
                mime_type: Some(MimeType("image/png".to_string())),
                name: Some("atlas".to_string()),
                uri: Some(texture_uri.to_string()),
                extensions: None,
                extras: None,
            },
        )?;
        let sampler = push(
            &mut self.root.samplers,
            json::texture::Sampler {
                mag_filter: Some(Checked::Valid(MagFilter::Nearest)),
                min_filter: Some(Checked::Valid(MinFilter::Nearest)),
                ..Default::default()
            },
        )?;
        let texture = push(
            &mut self.root.textures,
            json::Texture {
                name: Some("atlas".to_string()),
                sampler: Some(sampler),
                source: image,
                extensions: None,
                extras: None,
            },
        )?;
        self.root.extensions_used.push(TEXTURE_TRANSFORM.to_string());

        let mut indices = Vec::with_capacity(materials.len());
        for material in materials {
            // Stored V runs bottom-up from the atlas origin; glTF samples top-down.
            let transform = TextureTransform {
                offset: TextureTransformOffset([material.uv_offset.x, 1.0 + material.uv_offset.y]),
                rotation: TextureTransformRotation(0.0),
                scale: TextureTransformScale([1.0, -1.0]),
                tex_coord: None,
                extras: None,
            };
            let info = json::texture::Info {
                index: texture,
                tex_coord: 0,
                extensions: Some(json::extensions::texture::Info {
                    texture_transform: Some(transform),
                    ..Default::default()
                }),
                extras: None,
            };
            indices.push(push(
                &mut self.root.materials,
                json::Material {
                    name: Some(material.name.clone()),
                    pbr_metallic_roughness: PbrMetallicRoughness {
                        base_color_texture: Some(info),
                        metallic_factor: StrengthFactor(0.0),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )?);
        }
        Ok(indices)
    }

    /// Meshes without triangles have no glTF counterpart.
    fn mesh(
        &mut self,
        mesh: &ExportMesh,
        materials: &[Index<json::Material>],
    ) -> Result<Option<Index<json::Mesh>>> {
        if mesh.triangle_count() == 0 {
            tracing::debug!(mesh = %mesh.name, "skipping mesh without triangles");
            return Ok(None);
        }

        let (min, max) = mesh.positions.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        );
        let bytes: Vec<u8> = mesh
            .positions
            .iter()
            .flat_map(|p| p.to_array())
            .flat_map(f32::to_le_bytes)
            .collect();
        let view = self.view(&bytes, Target::ArrayBuffer)?;
        let positions = self.accessor(
            view,
            mesh.positions.len(),
            ComponentType::F32,
            Type::Vec3,
            Some((
                serde_json::json!(min.to_array()),
                serde_json::json!(max.to_array()),
            )),
        )?;

        let bytes: Vec<u8> = mesh
            .tex_coords
            .iter()
            .flat_map(|uv| uv.to_array())
            .flat_map(f32::to_le_bytes)
            .collect();
        let view = self.view(&bytes, Target::ArrayBuffer)?;
        let tex_coords = self.accessor(
            view,
            mesh.tex_coords.len(),
            ComponentType::F32,
            Type::Vec2,
            None,
        )?;

        let mut primitives = Vec::new();
        for material in mesh.materials_used() {
            let indices: Vec<u32> = mesh.indices_for(material).collect();
            let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
            let view = self.view(&bytes, Target::ElementArrayBuffer)?;
            let accessor =
                self.accessor(view, indices.len(), ComponentType::U32, Type::Scalar, None)?;
            primitives.push(json::mesh::Primitive {
                attributes: BTreeMap::from([
                    (Checked::Valid(Semantic::Positions), positions),
                    (Checked::Valid(Semantic::TexCoords(0)), tex_coords),
                ]),
                extensions: None,
                extras: None,
                indices: Some(accessor),
                material: materials.get(usize::from(material)).copied(),
                mode: Checked::Valid(Mode::Triangles),
                targets: None,
            });
        }

        push(
            &mut self.root.meshes,
            json::Mesh {
                extensions: None,
                extras: None,
                name: Some(mesh.name.clone()),
                primitives,
                weights: None,
            },
        )
        .map(Some)
    }

    fn view(&mut self, bytes: &[u8], target: Target) -> Result<Index<json::buffer::View>> {
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        push(
            &mut self.root.buffer_views,
            json::buffer::View {
                buffer: Index::new(0),
                byte_length: size(bytes.len()),
                byte_offset: Some(size(offset)),
                byte_stride: None,
                target: Some(Checked::Valid(target)),
                name: None,
                extensions: None,
                extras: None,
            },
        )
    }

    fn accessor(
        &mut self,
        view: Index<json::buffer::View>,
        count: usize,
        component: ComponentType,
        type_: Type,
        bounds: Option<(serde_json::Value, serde_json::Value)>,
    ) -> Result<Index<json::Accessor>> {
        let (min, max) = bounds.unzip();
        push(
            &mut self.root.accessors,
            json::Accessor {
                buffer_view: Some(view),
                byte_offset: Some(USize64(0)),
                component_type: Checked::Valid(GenericComponentType(component)),
                count: size(count),
                type_: Checked::Valid(type_),
                min,
                max,
                name: None,
                normalized: false,
                sparse: None,
                extensions: None,
                extras: None,
            },
        )
    }
}

fn size(len: usize) -> USize64 {
    USize64(len as u64)
}

fn index_of<T>(index: usize) -> Result<Index<T>> {
    u32::try_from(index).map(Index::new).map_err(|_| {
        Error::Decode(DecodeError::NumericOverflow {
            what: "glTF index",
            value: index as u64,
        })
    })
}

fn push<T>(items: &mut Vec<T>, item: T) -> Result<Index<T>> {
    let index = index_of(items.len())?;
    items.push(item);
    Ok(index)
}

#[cfg(test)]
mod tests {
    use silvie_decode::{Assembler, testing};

    use super::*;

    fn sample_root() -> json::Root {
        let export = Assembler::default()
            .assemble(&testing::sample_scene())
            .unwrap();
        build_root(&export, "hero.png").unwrap()
    }

    fn transform_offset(root: &json::Root, material: usize) -> [f32; 2] {
        let info = root.materials[material]
            .pbr_metallic_roughness
            .base_color_texture
            .as_ref()
            .unwrap();
        let transform = info
            .extensions
            .as_ref()
            .and_then(|ext| ext.texture_transform.as_ref())
            .unwrap();
        assert_eq!(transform.scale.0, [1.0, -1.0]);
        transform.offset.0
    }

    fn values<T>(indices: &[Index<T>]) -> Vec<usize> {
        indices.iter().map(|index| index.value()).collect()
    }

    #[test]
    fn hierarchy_follows_parent_links() {
        let root = sample_root();
        assert_eq!(root.nodes.len(), 2);
        assert_eq!(values(&root.scenes[0].nodes), [0]);
        assert_eq!(values(root.nodes[0].children.as_deref().unwrap()), [1]);
        assert!(root.nodes[0].mesh.is_none());
        assert_eq!(root.nodes[1].mesh.map(|mesh| mesh.value()), Some(0));
        assert!(root.nodes[1].children.is_none());
        assert_eq!(root.nodes[1].translation, Some([1.0, 2.0, 3.0]));
        assert_eq!(root.nodes[1].name.as_deref(), Some("1"));
    }

    #[test]
    fn one_primitive_per_material() {
        let root = sample_root();
        let primitives = &root.meshes[0].primitives;
        assert_eq!(primitives.len(), 2);
        let materials: Vec<_> = primitives
            .iter()
            .map(|p| p.material.map(|m| m.value()))
            .collect();
        assert_eq!(materials, [Some(0), Some(1)]);

        // Shared vertex attributes, separate index lists.
        let attributes = |p: &json::mesh::Primitive| {
            p.attributes.values().map(|a| a.value()).collect::<Vec<_>>()
        };
        assert_eq!(attributes(&primitives[0]), attributes(&primitives[1]));

        let counts: Vec<u64> = primitives
            .iter()
            .map(|p| root.accessors[p.indices.unwrap().value()].count.0)
            .collect();
        assert_eq!(counts, [3, 6]);
    }

    #[test]
    fn materials_carry_atlas_offsets() {
        let root = sample_root();
        assert_eq!(root.extensions_used, [TEXTURE_TRANSFORM]);
        assert_eq!(root.materials.len(), 2);
        assert_eq!(root.materials[1].name.as_deref(), Some("mat1"));
        assert_eq!(transform_offset(&root, 0), [0.0, 1.0]);
        assert_eq!(transform_offset(&root, 1), [0.5, 1.0]);
        assert_eq!(root.images[0].uri.as_deref(), Some("hero.png"));
    }

    #[test]
    fn buffer_is_embedded() {
        let root = sample_root();
        let uri = root.buffers[0].uri.as_deref().unwrap();
        let encoded = uri
            .strip_prefix("data:application/octet-stream;base64,")
            .unwrap();
        let decoded = BASE64_STANDARD.decode(encoded).unwrap();
        // 9 corners of position + uv, then 3 + 6 indices.
        assert_eq!(decoded.len(), 9 * 12 + 9 * 8 + 9 * 4);
        assert_eq!(root.buffers[0].byte_length.0, decoded.len() as u64);

        let json = serde_json::to_string(&root).unwrap();
        assert!(json.contains("\"KHR_texture_transform\""));
    }

    #[test]
    fn material_outside_table_leaves_primitive_untextured() {
        let mut scene = testing::sample_scene();
        scene.meshes[0].faces[0].material = 4;
        let export = Assembler::default().assemble(&scene).unwrap();
        let root = build_root(&export, "hero.png").unwrap();

        let materials: Vec<_> = root.meshes[0]
            .primitives
            .iter()
            .map(|p| p.material.map(|m| m.value()))
            .collect();
        assert_eq!(materials, [None, Some(1)]);
    }

    #[test]
    fn empty_scene_has_no_buffer() {
        let root = build_root(&ExportScene::default(), "unused.png").unwrap();
        assert!(root.buffers.is_empty());
        assert!(root.images.is_empty());
        assert!(root.extensions_used.is_empty());
        assert_eq!(root.asset.version, "2.0");
    }
}
