mod common;

use common::Workspace;
use silvie::Error;
use silvie_decode::{DecodeError, MeshGroup, testing};

#[test]
fn converts_sample_model() {
    let workspace = Workspace::new();
    let request = workspace.request_for(&testing::sample_scene());

    let output = silvie::convert_chr(&request).unwrap();
    assert_eq!(output.gltf, request.gltf_path());
    assert_eq!(output.texture, request.texture_path());
    assert_eq!(workspace.outputs(), ["hero.gltf", "hero.png"]);

    let atlas = image::open(&output.texture).unwrap().to_rgb8();
    assert_eq!(atlas.dimensions(), (4, 8));
    // Pixel 5 holds palette index 5.
    assert_eq!(atlas.get_pixel(1, 1).0, [5, 0, 250]);

    let document = gltf::Gltf::open(&output.gltf).unwrap();
    assert_eq!(document.nodes().count(), 2);
    assert_eq!(document.materials().count(), 2);
    let image = document.images().next().unwrap();
    match image.source() {
        gltf::image::Source::Uri { uri, .. } => assert_eq!(uri, "hero.png"),
        gltf::image::Source::View { .. } => panic!("atlas should be referenced by uri"),
    }

    let mesh = document.meshes().next().unwrap();
    let triangles: usize = mesh
        .primitives()
        .map(|p| p.indices().unwrap().count() / 3)
        .sum();
    assert_eq!(triangles, 3);
}

#[test]
fn failed_conversion_leaves_no_files() {
    let workspace = Workspace::new();
    let mut scene = testing::sample_scene();
    scene.mesh_groups[1] = MeshGroup::Single(42);
    let request = workspace.request_for(&scene);

    let err = silvie::convert_chr(&request).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::UnknownMeshId { node: 1, mesh_id: 42 })
    ));
    assert!(workspace.outputs().is_empty());
}

#[test]
fn failure_while_saving_removes_staged_atlas() {
    let workspace = Workspace::new();
    let request = workspace.request_for(&testing::sample_scene());
    let loaded = silvie::load_chr(&request).unwrap();

    // A directory in the way of the glTF makes the final rename fail.
    std::fs::create_dir_all(request.gltf_path().join("blocker")).unwrap();
    assert!(silvie::save_chr(&loaded, &request).is_err());

    // Only the blocking directory remains.
    assert_eq!(workspace.outputs(), ["hero.gltf"]);
}

#[test]
fn missing_palette_reports_path() {
    let workspace = Workspace::new();
    let mut request = workspace.request_for(&testing::sample_scene());
    request.palette = workspace.path("MISSING.PAL");

    let err = silvie::convert_chr(&request).unwrap_err();
    match err {
        Error::Io { path, .. } => assert_eq!(path, request.palette),
        other => panic!("expected an I/O error, got {other:?}"),
    }
    assert!(workspace.outputs().is_empty());
}
