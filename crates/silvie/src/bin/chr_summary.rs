//! Print a JSON summary of a CHR model's chunk contents.
//!
//! Useful when poking at unfamiliar models: shows what every chunk declared
//! without writing any output files.
//!
//! Run: `cargo run -p silvie --features test-tools --bin chr_summary -- <chr_file>`

use std::env;
use std::fs;
use std::path::Path;

use silvie::decode::{self, DecodeOptions, MeshGroup};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1).map(Path::new) else {
        eprintln!("Usage: chr_summary <chr_file>");
        std::process::exit(1);
    };

    let bytes = fs::read(path)?;
    let options = DecodeOptions::for_path(path);
    let scene = decode::decode(&mut decode::Cursor::from_slice(&bytes), &options)?;

    let summary = serde_json::json!({
        "file": path.display().to_string(),
        "bytes": bytes.len(),
        "known_broken_mesh_ids": options.has_known_broken_mesh_ids(),
        "material_offsets": scene.material_offsets,
        "first_mesh_id": scene.first_mesh_id,
        "meshes": scene.meshes.iter().map(|mesh| {
            serde_json::json!({
                "index": mesh.index,
                "id": mesh.id,
                "vertex_count": mesh.positions.len(),
                "normal_count": mesh.normals.len(),
                "face_count": mesh.faces.len(),
                "triangle_count": mesh.triangle_count(),
                "color_indexed_faces": mesh.faces.iter().filter(|f| f.flags.color_indexed()).count(),
                "origin": mesh.origin.to_array(),
            })
        }).collect::<Vec<_>>(),
        "texture": {
            "width": scene.texture.width,
            "height": scene.texture.height,
            "stride": scene.texture.stride,
            "buffer_offset": scene.texture.buffer_offset,
            "buffer_size": scene.texture.pixels.len(),
        },
        "nodes": scene.nodes.iter().zip(&scene.mesh_groups).map(|(node, group)| {
            let kind = match group {
                MeshGroup::None => "none",
                MeshGroup::Single(_) => "single",
                MeshGroup::List(_) => "list",
            };
            serde_json::json!({
                "parent": node.parent,
                "position": node.position.to_array(),
                "group": kind,
                "mesh_ids": group.mesh_ids(),
            })
        }).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
