use std::{
    collections::HashMap,
    io::{BufReader, Cursor},
    path::Path,
};

use anyhow::Context;
use cgmath::{InnerSpace, Matrix, SquareMatrix};

use crate::{
    config::MeshImportOptions,
    data_structures::vertex::Vertex,
    error::AssetError,
    resources::{file_extension, load_binary, load_string},
};

/**
 * Geometry of one imported sub-mesh, indexed the same way for every attribute.
 *
 * Importers fill this in; [`weld_submeshes`] turns a list of them into one
 * deduplicated vertex/index pair.
 */
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
}

/// Deduplicates vertices by value while building an index list.
#[derive(Debug, Default)]
pub struct VertexWelder {
    lut: HashMap<Vertex, u32>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl VertexWelder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one corner and returns the index it was given.
    pub fn push(&mut self, vertex: Vertex) -> anyhow::Result<u32> {
        let idx = match self.lut.get(&vertex) {
            Some(&idx) => idx,
            None => {
                let idx = u32::try_from(self.vertices.len())
                    .context("mesh has more unique vertices than a u32 index can address")?;
                self.lut.insert(vertex, idx);
                self.vertices.push(vertex);
                idx
            }
        };
        self.indices.push(idx);
        Ok(idx)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn finish(self) -> (Vec<Vertex>, Vec<u32>) {
        (self.vertices, self.indices)
    }
}

/// Imports `path` and returns welded host-side vertex and index buffers.
///
/// OBJ files go through `tobj`, `.gltf`/`.glb` through `gltf`. Every triangle
/// corner is welded against all previous corners of all sub-meshes.
pub async fn load_mesh_into_host_buffers(
    path: &Path,
    options: MeshImportOptions,
) -> anyhow::Result<(Vec<Vertex>, Vec<u32>)> {
    let submeshes = match file_extension(path).as_str() {
        "obj" => import_obj(path).await,
        "gltf" | "glb" => import_gltf(path).await,
        other => Err(AssetError::UnsupportedMeshType(other.to_string()).into()),
    }
    .with_context(|| format!("failed to import {}", path.display()))?;

    let (vertices, indices) = weld_submeshes(path, &submeshes, options)?;
    log::debug!(
        "{}: {} sub-meshes, {} unique vertices, {} triangles",
        path.display(),
        submeshes.len(),
        vertices.len(),
        indices.len() / 3
    );
    Ok((vertices, indices))
}

/// Welds the triangles of all `submeshes` into one vertex/index pair.
///
/// Sub-meshes without normals get smooth normals; sub-meshes without texture
/// coordinates are rejected.
pub fn weld_submeshes(
    path: &Path,
    submeshes: &[SubMesh],
    options: MeshImportOptions,
) -> anyhow::Result<(Vec<Vertex>, Vec<u32>)> {
    let mut welder = VertexWelder::new();

    for (mesh_idx, submesh) in submeshes.iter().enumerate() {
        let tex_coords = submesh
            .tex_coords
            .as_ref()
            .ok_or_else(|| AssetError::MissingAttributes(path.to_path_buf()))?;
        let generated;
        let normals = match &submesh.normals {
            Some(normals) => normals,
            None => {
                generated = smooth_normals(&submesh.positions, &submesh.indices);
                &generated
            }
        };

        let corner = |idx: u32| -> Option<Vertex> {
            let i = idx as usize;
            let uv = tex_coords.get(i)?;
            let v = if options.flip_v { 1.0 - uv[1] } else { uv[1] };
            Some(Vertex::new(
                *submesh.positions.get(i)?,
                *normals.get(i)?,
                [uv[0], v],
            ))
        };

        let triangles = submesh.indices.chunks_exact(3);
        if !triangles.remainder().is_empty() {
            log::warn!(
                "{}: sub-mesh {} has {} trailing indices that do not form a triangle",
                path.display(),
                mesh_idx,
                triangles.remainder().len()
            );
        }
        for tri in triangles {
            let (Some(a), Some(b), Some(c)) = (corner(tri[0]), corner(tri[1]), corner(tri[2]))
            else {
                log::warn!(
                    "{}: sub-mesh {} references a vertex out of range, skipping triangle {:?}",
                    path.display(),
                    mesh_idx,
                    tri
                );
                continue;
            };
            let ordered = if options.flip_winding_order {
                [a, c, b]
            } else {
                [a, b, c]
            };
            for vertex in ordered {
                welder.push(vertex)?;
            }
        }
    }

    if welder.index_count() == 0 {
        return Err(AssetError::EmptyMesh(path.to_path_buf()).into());
    }
    Ok(welder.finish())
}

/**
 * Area-weighted smooth normals.
 *
 * Face normals are accumulated per distinct position rather than per index so
 * that UV seams, which split a position into several indices, stay smooth.
 */
pub fn smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let key = |p: &[f32; 3]| p.map(|f| if f == 0.0 { 0u32 } else { f.to_bits() });
    let mut accumulated: HashMap<[u32; 3], cgmath::Vector3<f32>> = HashMap::new();

    for tri in indices.chunks_exact(3) {
        let (Some(p0), Some(p1), Some(p2)) = (
            positions.get(tri[0] as usize),
            positions.get(tri[1] as usize),
            positions.get(tri[2] as usize),
        ) else {
            continue;
        };
        let v0: cgmath::Vector3<f32> = (*p0).into();
        let v1: cgmath::Vector3<f32> = (*p1).into();
        let v2: cgmath::Vector3<f32> = (*p2).into();
        // Not normalised: the cross product's length is twice the area
        let face = (v1 - v0).cross(v2 - v0);
        for p in [p0, p1, p2] {
            *accumulated
                .entry(key(p))
                .or_insert_with(|| cgmath::Vector3::new(0.0, 0.0, 0.0)) += face;
        }
    }

    positions
        .iter()
        .map(|p| match accumulated.get(&key(p)) {
            Some(n) if n.magnitude2() > 0.0 => n.normalize().into(),
            _ => [0.0, 0.0, 0.0],
        })
        .collect()
}

async fn import_obj(path: &Path) -> anyhow::Result<Vec<SubMesh>> {
    let obj_text = load_string(path).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    // Material maps are passed explicitly, so .mtl files are never read.
    let (models, _) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| async move { tobj::MTLLoadResult::Ok(Default::default()) },
    )
    .await?;

    Ok(models
        .into_iter()
        .filter(|m| !m.mesh.positions.is_empty())
        .map(|m| {
            let vertex_count = m.mesh.positions.len() / 3;
            let positions = m
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();
            let normals = (m.mesh.normals.len() == vertex_count * 3).then(|| {
                m.mesh
                    .normals
                    .chunks_exact(3)
                    .map(|n| [n[0], n[1], n[2]])
                    .collect()
            });
            let tex_coords = (m.mesh.texcoords.len() == vertex_count * 2).then(|| {
                m.mesh
                    .texcoords
                    .chunks_exact(2)
                    .map(|t| [t[0], t[1]])
                    .collect()
            });
            if normals.is_none() {
                log::debug!("{}: object {} has no normals", path.display(), m.name);
            }
            SubMesh {
                positions,
                normals,
                tex_coords,
                indices: m.mesh.indices,
            }
        })
        .collect())
}

async fn import_gltf(path: &Path) -> anyhow::Result<Vec<SubMesh>> {
    let bytes = load_binary(path).await?;
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(&bytes)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::EmptyMesh(path.to_path_buf()))?;

    let mut submeshes = Vec::new();
    for node in scene.nodes() {
        collect_node(
            path,
            &node,
            cgmath::Matrix4::identity(),
            &buffers,
            &mut submeshes,
        )?;
    }
    Ok(submeshes)
}

/**
 * Expands strip and fan indices into a triangle list.
 *
 * Strips alternate winding so every triangle keeps the orientation of the
 * first one; fans pivot on their first index. Triangles that repeat an index
 * (strip restarts) are dropped.
 */
pub fn triangle_list(mode: gltf::mesh::Mode, indices: Vec<u32>) -> Vec<u32> {
    let triangles: Vec<[u32; 3]> = match mode {
        gltf::mesh::Mode::TriangleStrip => indices
            .windows(3)
            .enumerate()
            .map(|(i, w)| if i % 2 == 0 { [w[0], w[1], w[2]] } else { [w[0], w[2], w[1]] })
            .collect(),
        gltf::mesh::Mode::TriangleFan => match indices.first() {
            Some(&pivot) => indices[1..]
                .windows(2)
                .map(|w| [w[0], w[1], pivot])
                .collect(),
            None => Vec::new(),
        },
        _ => return indices,
    };
    triangles
        .into_iter()
        .filter(|[a, b, c]| a != b && b != c && a != c)
        .flatten()
        .collect()
}

/// Walks the node tree, baking every node's world matrix into its geometry.
fn collect_node(
    path: &Path,
    node: &gltf::Node,
    parent: cgmath::Matrix4<f32>,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<SubMesh>,
) -> anyhow::Result<()> {
    let local: cgmath::Matrix4<f32> = node.transform().matrix().into();
    let world = parent * local;

    if let Some(mesh) = node.mesh() {
        let linear = cgmath::Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
        let normal_matrix = linear
            .invert()
            .map(|m| m.transpose())
            .unwrap_or_else(cgmath::Matrix3::identity);

        for primitive in mesh.primitives() {
            if !matches!(
                primitive.mode(),
                gltf::mesh::Mode::Triangles
                    | gltf::mesh::Mode::TriangleStrip
                    | gltf::mesh::Mode::TriangleFan
            ) {
                log::warn!(
                    "{}: skipping primitive {} of mesh {:?} with mode {:?}",
                    path.display(),
                    primitive.index(),
                    mesh.name(),
                    primitive.mode()
                );
                continue;
            }
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));

            let positions: Vec<[f32; 3]> = match reader.read_positions() {
                Some(positions) => positions
                    .map(|p| {
                        let p = world * cgmath::Vector4::new(p[0], p[1], p[2], 1.0);
                        [p.x, p.y, p.z]
                    })
                    .collect(),
                None => continue,
            };
            let normals = reader.read_normals().map(|normals| {
                normals
                    .map(|n| {
                        let n = normal_matrix * cgmath::Vector3::from(n);
                        if n.magnitude2() > 0.0 {
                            n.normalize().into()
                        } else {
                            [0.0, 0.0, 0.0]
                        }
                    })
                    .collect()
            });
            let tex_coords = reader
                .read_tex_coords(0)
                .map(|uvs| uvs.into_f32().collect());
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let indices = triangle_list(primitive.mode(), indices);

            out.push(SubMesh {
                positions,
                normals,
                tex_coords,
                indices,
            });
        }
    }

    for child in node.children() {
        collect_node(path, &child, world, buffers, out)?;
    }
    Ok(())
}
