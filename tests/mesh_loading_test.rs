use std::path::Path;

use ibl_ngin::{
    config::MeshImportOptions, error::AssetError, resources::mesh::load_mesh_into_host_buffers,
};

use crate::common::test_utils::*;

mod common;

#[tokio::test]
async fn obj_quad_is_welded_and_flipped() {
    init_logger();
    let dir = scratch_dir("obj-quad");
    let path = write_file(&dir, "quad.obj", QUAD_OBJ.as_bytes());

    let (vertices, indices) = load_mesh_into_host_buffers(&path, MeshImportOptions::default())
        .await
        .unwrap();

    assert_eq!(vertices.len(), 4);
    assert_eq!(indices, vec![0, 1, 2, 0, 3, 1]);
    assert_eq!(vertices[0].position, [-1.0, -1.0, 0.0]);
    assert_eq!(vertices[0].normal, [0.0, 0.0, 1.0]);
    // v is stored flipped
    assert_eq!(vertices[0].tex_coords, [0.0, 1.0]);
    assert_eq!(vertices[1].tex_coords, [1.0, 0.0]);
}

#[tokio::test]
async fn obj_keeps_source_winding_when_asked() {
    let dir = scratch_dir("obj-raw");
    let path = write_file(&dir, "quad.obj", QUAD_OBJ.as_bytes());
    let options = MeshImportOptions {
        flip_winding_order: false,
        flip_v: false,
    };

    let (vertices, indices) = load_mesh_into_host_buffers(&path, options).await.unwrap();

    assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
    assert_eq!(vertices[0].tex_coords, [0.0, 0.0]);
}

#[tokio::test]
async fn obj_without_normals_gets_smooth_normals() {
    let dir = scratch_dir("obj-no-normals");
    let obj = "\
v -1.0 -1.0 0.0
v 1.0 -1.0 0.0
v 1.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
f 1/1 2/2 3/3
";
    let path = write_file(&dir, "tri.obj", obj.as_bytes());

    let (vertices, indices) = load_mesh_into_host_buffers(&path, MeshImportOptions::default())
        .await
        .unwrap();

    assert_eq!(indices.len(), 3);
    for vertex in &vertices {
        assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
    }
}

#[tokio::test]
async fn obj_without_uvs_is_rejected() {
    let dir = scratch_dir("obj-no-uvs");
    let obj = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vn 0.0 0.0 1.0
f 1//1 2//1 3//1
";
    let path = write_file(&dir, "tri.obj", obj.as_bytes());

    let err = load_mesh_into_host_buffers(&path, MeshImportOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<AssetError>(),
        Some(&AssetError::MissingAttributes(path.clone()))
    );
    assert!(err.root_cause().to_string().starts_with("model must have normals and uvs"));
}

#[tokio::test]
async fn identical_corners_merge_across_objects() {
    let dir = scratch_dir("obj-merge");
    let obj = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
vn 0.0 0.0 1.0
o first
f 1/1/1 2/2/1 3/3/1
o second
f 1/1/1 2/2/1 3/3/1
";
    let path = write_file(&dir, "twice.obj", obj.as_bytes());

    let (vertices, indices) = load_mesh_into_host_buffers(&path, MeshImportOptions::default())
        .await
        .unwrap();

    assert_eq!(vertices.len(), 3);
    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
}

#[tokio::test]
async fn gltf_node_transform_is_baked_in() {
    let dir = scratch_dir("gltf-quad");
    let path = write_quad_gltf(&dir);

    let (vertices, indices) = load_mesh_into_host_buffers(&path, MeshImportOptions::default())
        .await
        .unwrap();

    assert_eq!(vertices.len(), 4);
    assert_eq!(indices, vec![0, 1, 2, 0, 3, 1]);
    for vertex in &vertices {
        assert_eq!(vertex.position[2], 5.0);
        assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
    }
    assert_eq!(vertices[0].position, [-1.0, -1.0, 5.0]);
    assert_eq!(vertices[0].tex_coords, [0.0, 1.0]);
}

#[tokio::test]
async fn gltf_triangle_fans_are_triangulated() {
    let dir = scratch_dir("gltf-fan");
    let path = write_quad_fan_gltf(&dir);

    let (vertices, indices) = load_mesh_into_host_buffers(&path, MeshImportOptions::default())
        .await
        .unwrap();

    // fan (1, 2, 0), (2, 3, 0) with flipped winding, welded in first-seen order
    assert_eq!(vertices.len(), 4);
    assert_eq!(indices, vec![0, 1, 2, 2, 1, 3]);
    assert_eq!(vertices[0].position, [1.0, -1.0, 5.0]);
    assert_eq!(vertices[1].position, [-1.0, -1.0, 5.0]);
}

#[tokio::test]
async fn unsupported_mesh_type_is_rejected() {
    let err = load_mesh_into_host_buffers(Path::new("statue.stl"), MeshImportOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<AssetError>(),
        Some(&AssetError::UnsupportedMeshType("stl".into()))
    );
}

#[tokio::test]
async fn obj_without_faces_is_empty() {
    let dir = scratch_dir("obj-empty");
    let obj = "\
v 0.0 0.0 0.0
vt 0.0 0.0
vn 0.0 0.0 1.0
";
    let path = write_file(&dir, "points.obj", obj.as_bytes());

    let err = load_mesh_into_host_buffers(&path, MeshImportOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<AssetError>(),
        Some(&AssetError::EmptyMesh(path.clone()))
    );
}
