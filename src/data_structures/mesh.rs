//! A renderable mesh: device geometry, material maps and a world transform.

use std::path::{Path, PathBuf};

use anyhow::Context;
use cgmath::{Deg, Euler};

use crate::{
    config::LoaderConfig,
    data_structures::{
        image::ImageWrapper,
        transform::{PerModelUniform, WorldTransform},
        vertex::Vertex,
    },
    device::{BufferHandle, DeviceManager},
    resources::{
        mesh::load_mesh_into_host_buffers,
        texture::{TextureSource, load_texture_source, upload_texture_2d},
    },
};

pub const MAPS_PER_MESH: usize = 5;

/// Shading model a mesh is drawn with. The discriminant is what shaders see.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialType {
    HdrProbe = 0,
    FresnelSchlickGgxSmith = 1,
}

impl MaterialType {
    pub const COUNT: usize = 2;
}

/// Material map slots in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapSlot {
    Albedo = 0,
    Normal = 1,
    Roughness = 2,
    Metalness = 3,
    AmbientOcclusion = 4,
}

impl MapSlot {
    pub const ALL: [MapSlot; MAPS_PER_MESH] = [
        MapSlot::Albedo,
        MapSlot::Normal,
        MapSlot::Roughness,
        MapSlot::Metalness,
        MapSlot::AmbientOcclusion,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MapSlot::Albedo => "albedo",
            MapSlot::Normal => "normal",
            MapSlot::Roughness => "roughness",
            MapSlot::Metalness => "metalness",
            MapSlot::AmbientOcclusion => "ambient occlusion",
        }
    }
}

/// Paths of the material maps to load with a mesh. Absent maps stay unbound.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaterialMaps {
    pub albedo: Option<PathBuf>,
    pub normal: Option<PathBuf>,
    pub roughness: Option<PathBuf>,
    pub metalness: Option<PathBuf>,
    pub ambient_occlusion: Option<PathBuf>,
}

impl MaterialMaps {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_albedo(mut self, path: impl Into<PathBuf>) -> Self {
        self.albedo = Some(path.into());
        self
    }

    pub fn with_normal(mut self, path: impl Into<PathBuf>) -> Self {
        self.normal = Some(path.into());
        self
    }

    pub fn with_roughness(mut self, path: impl Into<PathBuf>) -> Self {
        self.roughness = Some(path.into());
        self
    }

    pub fn with_metalness(mut self, path: impl Into<PathBuf>) -> Self {
        self.metalness = Some(path.into());
        self
    }

    pub fn with_ambient_occlusion(mut self, path: impl Into<PathBuf>) -> Self {
        self.ambient_occlusion = Some(path.into());
        self
    }

    pub fn get(&self, slot: MapSlot) -> Option<&Path> {
        match slot {
            MapSlot::Albedo => self.albedo.as_deref(),
            MapSlot::Normal => self.normal.as_deref(),
            MapSlot::Roughness => self.roughness.as_deref(),
            MapSlot::Metalness => self.metalness.as_deref(),
            MapSlot::AmbientOcclusion => self.ambient_occlusion.as_deref(),
        }
    }

    pub fn count(&self) -> usize {
        MapSlot::ALL.iter().filter(|s| self.get(**s).is_some()).count()
    }
}

/**
 * A mesh on the device.
 *
 * The transform lives on the host; the uniform buffer only catches up in
 * [`VMesh::update_host_uniform_buffer`], and only when a setter touched the
 * transform since the last write.
 */
#[derive(Debug)]
pub struct VMesh {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    vertex_count: u32,
    index_count: u32,
    maps: [Option<ImageWrapper>; MAPS_PER_MESH],
    material_type: MaterialType,
    transform: WorldTransform,
    uniform: PerModelUniform,
    uniform_buffer: BufferHandle,
    uniform_data_changed: bool,
}

impl VMesh {
    /// Loads `model` and the given material maps; relative paths resolve
    /// against the configured asset root.
    ///
    /// Every file is read and decoded before the first device allocation, so
    /// a broken asset leaves the device untouched. If an upload fails, what
    /// was already created is released before the error is returned.
    pub async fn load(
        manager: &mut dyn DeviceManager,
        config: &LoaderConfig,
        model: &Path,
        maps: &MaterialMaps,
    ) -> anyhow::Result<VMesh> {
        let start = instant::Instant::now();
        let model_path = config.resolve(model);

        let map_paths: Vec<(MapSlot, PathBuf)> = MapSlot::ALL
            .iter()
            .filter_map(|slot| maps.get(*slot).map(|p| (*slot, config.resolve(p))))
            .collect();
        let sources = futures::future::try_join_all(
            map_paths.iter().map(|(_, path)| load_texture_source(path)),
        )
        .await?;

        let (vertices, indices) = load_mesh_into_host_buffers(&model_path, config.import)
            .await
            .with_context(|| format!("cannot load mesh {}", model_path.display()))?;

        let name = model_path.display().to_string();
        let mut parts = DeviceParts::default();
        let created = Self::upload(
            manager,
            config,
            &name,
            map_paths.iter().map(|(slot, path)| (*slot, path)).zip(sources),
            &vertices,
            &indices,
            &mut parts,
        );
        if let Err(e) = created {
            parts.release(manager);
            return Err(e);
        }
        let (Some(vertex_buffer), Some(index_buffer), Some(uniform_buffer)) =
            (parts.vertex_buffer, parts.index_buffer, parts.uniform_buffer)
        else {
            parts.release(manager);
            anyhow::bail!("{} was uploaded without all of its buffers", name);
        };

        log::debug!(
            "loaded {} ({} vertices, {} indices, {} maps) in {:?}",
            name,
            vertices.len(),
            indices.len(),
            map_paths.len(),
            start.elapsed()
        );

        Ok(VMesh {
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            maps: parts.maps,
            material_type: MaterialType::FresnelSchlickGgxSmith,
            transform: WorldTransform::new(),
            uniform: PerModelUniform::default(),
            uniform_buffer,
            uniform_data_changed: true,
        })
    }

    /// Device half of [`VMesh::load`]. Everything it creates is recorded in
    /// `parts` as it goes.
    fn upload<'a>(
        manager: &mut dyn DeviceManager,
        config: &LoaderConfig,
        name: &str,
        maps: impl Iterator<Item = ((MapSlot, &'a PathBuf), TextureSource)>,
        vertices: &[Vertex],
        indices: &[u32],
        parts: &mut DeviceParts,
    ) -> anyhow::Result<()> {
        for ((slot, path), source) in maps {
            let label = format!("{} map {}", slot.label(), path.display());
            parts.maps[slot as usize] =
                Some(upload_texture_2d(manager, &label, source, config.generate_mip_levels)?);
        }

        parts.vertex_buffer = Some(manager.create_buffer_from_host_data(
            &format!("{} vertices", name),
            bytemuck::cast_slice(vertices),
            wgpu::BufferUsages::VERTEX,
        )?);
        parts.index_buffer = Some(manager.create_buffer_from_host_data(
            &format!("{} indices", name),
            bytemuck::cast_slice(indices),
            wgpu::BufferUsages::INDEX,
        )?);
        parts.uniform_buffer = Some(manager.create_buffer(
            &format!("{} model uniform", name),
            PerModelUniform::SIZE,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?);
        Ok(())
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    pub fn uniform_buffer(&self) -> BufferHandle {
        self.uniform_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn map(&self, slot: MapSlot) -> Option<&ImageWrapper> {
        self.maps[slot as usize].as_ref()
    }

    pub fn material_type(&self) -> MaterialType {
        self.material_type
    }

    pub fn set_material_type(&mut self, material_type: MaterialType) {
        self.material_type = material_type;
    }

    pub fn transform(&self) -> &WorldTransform {
        &self.transform
    }

    /// Last uniform written to the device.
    pub fn uniform(&self) -> &PerModelUniform {
        &self.uniform
    }

    pub fn is_dirty(&self) -> bool {
        self.uniform_data_changed
    }

    pub fn set_position(&mut self, position: cgmath::Vector3<f32>) {
        self.transform.position = position;
        self.uniform_data_changed = true;
    }

    pub fn translate(&mut self, offset: cgmath::Vector3<f32>) {
        self.transform.position += offset;
        self.uniform_data_changed = true;
    }

    pub fn set_rotation(&mut self, rotation: cgmath::Quaternion<f32>) {
        self.transform.rotation = rotation;
        self.uniform_data_changed = true;
    }

    /// Rotation from euler angles in degrees, applied x, then y, then z.
    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.set_rotation(Euler::new(Deg(x), Deg(y), Deg(z)).into());
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.transform.scale = scale;
        self.uniform_data_changed = true;
    }

    /// Writes the per-model uniform if the transform changed. Returns whether
    /// a write happened.
    pub fn update_host_uniform_buffer(
        &mut self,
        manager: &mut dyn DeviceManager,
    ) -> anyhow::Result<bool> {
        if !self.uniform_data_changed {
            return Ok(false);
        }
        let uniform = self.transform.to_uniform();
        manager.write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&uniform))?;
        self.uniform = uniform;
        self.uniform_data_changed = false;
        Ok(true)
    }

    pub fn destroy(self, manager: &mut dyn DeviceManager) {
        manager.destroy_buffer(self.vertex_buffer);
        manager.destroy_buffer(self.index_buffer);
        manager.destroy_buffer(self.uniform_buffer);
        for map in self.maps.into_iter().flatten() {
            map.destroy(manager);
        }
    }
}

/// Device objects of a mesh that is still being uploaded.
#[derive(Debug, Default)]
struct DeviceParts {
    maps: [Option<ImageWrapper>; MAPS_PER_MESH],
    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    uniform_buffer: Option<BufferHandle>,
}

impl DeviceParts {
    fn release(self, manager: &mut dyn DeviceManager) {
        for buffer in [self.vertex_buffer, self.index_buffer, self.uniform_buffer]
            .into_iter()
            .flatten()
        {
            manager.destroy_buffer(buffer);
        }
        for map in self.maps.into_iter().flatten() {
            map.destroy(manager);
        }
    }
}

/// Anything the renderer draws as a mesh.
pub trait MeshAsset {
    fn mesh(&self) -> &VMesh;

    fn mesh_mut(&mut self) -> &mut VMesh;

    fn material_type(&self) -> MaterialType {
        self.mesh().material_type()
    }

    fn update_uniforms(&mut self, manager: &mut dyn DeviceManager) -> anyhow::Result<bool> {
        self.mesh_mut().update_host_uniform_buffer(manager)
    }
}

impl MeshAsset for VMesh {
    fn mesh(&self) -> &VMesh {
        self
    }

    fn mesh_mut(&mut self) -> &mut VMesh {
        self
    }
}
