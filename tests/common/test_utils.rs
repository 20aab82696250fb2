#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use ibl_ngin::{
    device::{
        BufferHandle, DeviceManager, ImageDesc, ImageHandle, SamplerDesc, SamplerHandle, ViewDesc,
        ViewHandle,
    },
    error::AssetError,
};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedBuffer {
    pub label: String,
    pub data: Vec<u8>,
    pub usage: wgpu::BufferUsages,
    pub writes: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedImage {
    pub desc: ImageDesc,
    pub data: Option<Vec<u8>>,
}

/// A `DeviceManager` that keeps everything in host memory so tests can look
/// at what the asset code asked for.
#[derive(Debug, Default)]
pub(crate) struct RecordingDevice {
    next: u32,
    pub buffers: HashMap<BufferHandle, RecordedBuffer>,
    pub images: HashMap<ImageHandle, RecordedImage>,
    pub views: HashMap<ViewHandle, (ImageHandle, ViewDesc)>,
    pub samplers: HashMap<SamplerHandle, SamplerDesc>,
    pub destroyed_buffers: Vec<BufferHandle>,
    pub destroyed_images: Vec<ImageHandle>,
    /// Number of images that can still be created before `create_image`
    /// fails. `None` never fails.
    pub image_budget: Option<usize>,
    pub buffer_budget: Option<usize>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `images` more images be created, then fails.
    pub fn fail_images_after(mut self, images: usize) -> Self {
        self.image_budget = Some(images);
        self
    }

    pub fn fail_buffers_after(mut self, buffers: usize) -> Self {
        self.buffer_budget = Some(buffers);
        self
    }

    /// Nothing is left allocated.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
            && self.images.is_empty()
            && self.views.is_empty()
            && self.samplers.is_empty()
    }

    fn next_id(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    pub fn buffer(&self, handle: BufferHandle) -> &RecordedBuffer {
        self.buffers.get(&handle).expect("unknown buffer")
    }

    pub fn image(&self, handle: ImageHandle) -> &RecordedImage {
        self.images.get(&handle).expect("unknown image")
    }

    pub fn views_of(&self, image: ImageHandle) -> Vec<ViewDesc> {
        let mut views: Vec<(ViewHandle, ViewDesc)> = self
            .views
            .iter()
            .filter(|(_, (owner, _))| *owner == image)
            .map(|(handle, (_, desc))| (*handle, *desc))
            .collect();
        views.sort_by_key(|(handle, _)| *handle);
        views.into_iter().map(|(_, desc)| desc).collect()
    }

    /// Stands in for a render pass writing into `image`.
    pub fn fill_image(&mut self, image: ImageHandle, data: Vec<u8>) {
        let entry = self.images.get_mut(&image).expect("unknown image");
        assert_eq!(data.len(), entry.desc.host_byte_size());
        entry.data = Some(data);
    }
}

impl DeviceManager for RecordingDevice {
    fn create_buffer_from_host_data(
        &mut self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> anyhow::Result<BufferHandle> {
        take_budget(&mut self.buffer_budget, "buffer")?;
        let handle = BufferHandle(self.next_id());
        self.buffers.insert(
            handle,
            RecordedBuffer {
                label: label.to_string(),
                data: contents.to_vec(),
                usage,
                writes: 0,
            },
        );
        Ok(handle)
    }

    fn create_buffer(
        &mut self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> anyhow::Result<BufferHandle> {
        self.create_buffer_from_host_data(label, &vec![0; size as usize], usage)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let entry = self.buffers.get_mut(&buffer).ok_or(AssetError::UnknownHandle {
            kind: "buffer",
            id: buffer.0,
        })?;
        let start = offset as usize;
        anyhow::ensure!(start + data.len() <= entry.data.len(), "write past end of buffer");
        entry.data[start..start + data.len()].copy_from_slice(data);
        entry.writes += 1;
        Ok(())
    }

    fn create_image(&mut self, desc: &ImageDesc) -> anyhow::Result<ImageHandle> {
        take_budget(&mut self.image_budget, "image")?;
        let handle = ImageHandle(self.next_id());
        self.images.insert(
            handle,
            RecordedImage {
                desc: desc.clone(),
                data: None,
            },
        );
        Ok(handle)
    }

    fn transfer_host_data_to_image(
        &mut self,
        image: ImageHandle,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let entry = self.images.get_mut(&image).ok_or(AssetError::UnknownHandle {
            kind: "image",
            id: image.0,
        })?;
        let expected = entry.desc.host_byte_size();
        if data.len() != expected {
            return Err(AssetError::ImageDataSize {
                expected,
                actual: data.len(),
            }
            .into());
        }
        entry.data = Some(data.to_vec());
        Ok(())
    }

    fn read_image(&mut self, image: ImageHandle) -> anyhow::Result<Vec<u8>> {
        let entry = self.images.get(&image).ok_or(AssetError::UnknownHandle {
            kind: "image",
            id: image.0,
        })?;
        Ok(entry
            .data
            .clone()
            .unwrap_or_else(|| vec![0; entry.desc.host_byte_size()]))
    }

    fn create_image_view(
        &mut self,
        image: ImageHandle,
        desc: &ViewDesc,
    ) -> anyhow::Result<ViewHandle> {
        anyhow::ensure!(self.images.contains_key(&image), "unknown image {}", image);
        let handle = ViewHandle(self.next_id());
        self.views.insert(handle, (image, *desc));
        Ok(handle)
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> anyhow::Result<SamplerHandle> {
        let handle = SamplerHandle(self.next_id());
        self.samplers.insert(handle, *desc);
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_some() {
            self.destroyed_buffers.push(buffer);
        }
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.views.retain(|_, (owner, _)| *owner != image);
        if self.images.remove(&image).is_some() {
            self.destroyed_images.push(image);
        }
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler);
    }
}

fn take_budget(budget: &mut Option<usize>, kind: &str) -> anyhow::Result<()> {
    match budget {
        Some(0) => anyhow::bail!("out of {} memory", kind),
        Some(left) => *left -= 1,
        None => {}
    }
    Ok(())
}

/// A fresh directory under the system temp dir, unique per test name.
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ibl-ngin-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("failed to create scratch dir");
    dir
}

/// Unit quad in the xy plane facing +z, split along the 1-3 diagonal.
pub(crate) const QUAD_OBJ: &str = "\
o quad
v -1.0 -1.0 0.0
v 1.0 -1.0 0.0
v 1.0 1.0 0.0
v -1.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

pub(crate) fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("failed to write fixture");
    path
}

/// The same quad as `QUAD_OBJ` as a glTF with an external buffer, placed by a
/// node translated to z = 5.
pub(crate) fn write_quad_gltf(dir: &Path) -> PathBuf {
    write_quad_primitive_gltf(dir, "quad", 4, &[0, 1, 2, 0, 2, 3])
}

/// The quad drawn as a triangle fan around its first corner.
pub(crate) fn write_quad_fan_gltf(dir: &Path) -> PathBuf {
    write_quad_primitive_gltf(dir, "quad-fan", 6, &[0, 1, 2, 3])
}

fn write_quad_primitive_gltf(dir: &Path, name: &str, mode: u32, indices: &[u16]) -> PathBuf {
    let positions: [[f32; 3]; 4] = [
        [-1.0, -1.0, 0.0],
        [1.0, -1.0, 0.0],
        [1.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0],
    ];
    let normals: [[f32; 3]; 4] = [[0.0, 0.0, 1.0]; 4];
    let uvs: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut bin = Vec::new();
    bin.extend_from_slice(bytemuck::cast_slice(&positions));
    bin.extend_from_slice(bytemuck::cast_slice(&normals));
    bin.extend_from_slice(bytemuck::cast_slice(&uvs));
    for index in indices {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    let bin_name = format!("{}.bin", name);
    write_file(dir, &bin_name, &bin);

    let json = format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "mesh": 0, "translation": [0.0, 0.0, 5.0] }}],
  "meshes": [{{
    "primitives": [{{
      "attributes": {{ "POSITION": 0, "NORMAL": 1, "TEXCOORD_0": 2 }},
      "indices": 3,
      "mode": {mode}
    }}]
  }}],
  "buffers": [{{ "uri": "{bin_name}", "byteLength": {bin_len} }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 48 }},
    {{ "buffer": 0, "byteOffset": 48, "byteLength": 48 }},
    {{ "buffer": 0, "byteOffset": 96, "byteLength": 32 }},
    {{ "buffer": 0, "byteOffset": 128, "byteLength": {index_len} }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3",
      "min": [-1.0, -1.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5126, "count": 4, "type": "VEC3" }},
    {{ "bufferView": 2, "componentType": 5126, "count": 4, "type": "VEC2" }},
    {{ "bufferView": 3, "componentType": 5123, "count": {count}, "type": "SCALAR" }}
  ]
}}"#,
        bin_len = bin.len(),
        index_len = indices.len() * 2,
        count = indices.len(),
    );
    write_file(dir, &format!("{}.gltf", name), json.as_bytes())
}

pub(crate) const VK_R8G8B8A8_UNORM: u32 = 37;
pub(crate) const VK_R32G32_SFLOAT: u32 = 103;
pub(crate) const VK_R32G32B32A32_SFLOAT: u32 = 109;
pub(crate) const VK_BC3_UNORM_BLOCK: u32 = 137;
pub(crate) const VK_R8_UNORM: u32 = 9;

/**
 * Builds an uncompressed KTX2 container. `levels[i]` holds every face of
 * level `i`. A minimal data format descriptor follows the level index, then
 * the level data.
 */
pub(crate) fn ktx2_bytes(
    vk_format: u32,
    width: u32,
    height: u32,
    faces: u32,
    levels: &[Vec<u8>],
) -> Vec<u8> {
    const IDENTIFIER: [u8; 12] = [
        0xAB, 0x4B, 0x54, 0x58, 0x20, 0x32, 0x30, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
    ];
    let level_index_size = 24 * levels.len();
    let dfd_offset = 80 + level_index_size;
    let dfd_length = 44;
    let mut data_offset = dfd_offset + dfd_length;

    let mut out = Vec::new();
    out.extend_from_slice(&IDENTIFIER);
    for value in [
        vk_format,
        1, // typeSize
        width,
        height,
        0, // pixelDepth
        0, // layerCount
        faces,
        levels.len() as u32,
        0, // supercompressionScheme
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    // dfd offset/length, kvd offset/length, sgd offset/length
    out.extend_from_slice(&(dfd_offset as u32).to_le_bytes());
    out.extend_from_slice(&(dfd_length as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    assert_eq!(out.len(), 80);

    for level in levels {
        out.extend_from_slice(&(data_offset as u64).to_le_bytes());
        out.extend_from_slice(&(level.len() as u64).to_le_bytes());
        out.extend_from_slice(&(level.len() as u64).to_le_bytes());
        data_offset += level.len();
    }

    out.extend_from_slice(&(dfd_length as u32).to_le_bytes());
    out.extend_from_slice(&[0; 40]);
    for level in levels {
        out.extend_from_slice(level);
    }
    out
}

pub(crate) const GL_RGBA8: u32 = 0x8058;
pub(crate) const GL_RGBA32F: u32 = 0x8814;
pub(crate) const GL_R8: u32 = 0x8229;

/// A little-endian KTX1 container with 8 bytes of key/value data. `levels[i]`
/// holds every face of level `i`.
pub(crate) fn ktx1_bytes(
    gl_internal_format: u32,
    width: u32,
    height: u32,
    faces: u32,
    levels: &[Vec<u8>],
) -> Vec<u8> {
    const IDENTIFIER: [u8; 12] = [
        0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
    ];
    let mut out = Vec::new();
    out.extend_from_slice(&IDENTIFIER);
    for value in [
        0x0403_0201,
        0,      // glType
        1,      // glTypeSize
        0x1908, // glFormat
        gl_internal_format,
        0x1908, // glBaseInternalFormat
        width,
        height,
        0, // pixelDepth
        0, // numberOfArrayElements
        faces,
        levels.len() as u32,
        8, // bytesOfKeyValueData
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    assert_eq!(out.len(), 64);
    out.extend_from_slice(b"\x04\0\0\0k\0v\0");
    for level in levels {
        let image_size = if faces == 6 { level.len() / 6 } else { level.len() };
        out.extend_from_slice(&(image_size as u32).to_le_bytes());
        out.extend_from_slice(level);
    }
    out
}

/// A DX10 DDS file. `data` is in the DDS layout: every level of face 0, then
/// every level of face 1, and so on.
pub(crate) fn dds_bytes(
    format: ddsfile::DxgiFormat,
    width: u32,
    height: u32,
    levels: u32,
    is_cubemap: bool,
    data: Vec<u8>,
) -> Vec<u8> {
    let mut dds = ddsfile::Dds::new_dxgi(ddsfile::NewDxgiParams {
        height,
        width,
        depth: None,
        format,
        mipmap_levels: Some(levels),
        array_layers: None,
        caps2: None,
        is_cubemap,
        resource_dimension: ddsfile::D3D10ResourceDimension::Texture2D,
        alpha_mode: ddsfile::AlphaMode::Straight,
    })
    .expect("failed to build DDS header");
    dds.data = data;
    let mut out = Vec::new();
    dds.write(&mut out).expect("failed to encode DDS");
    out
}

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 0, 255])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("failed to encode PNG");
    out.into_inner()
}

/// Constant RGBA32F face data for `faces` faces of a `size` cube with a full
/// chain of `levels` levels, in the host layout.
pub(crate) fn float_cube_host_data(size: u32, levels: u32, faces: u32, value: f32) -> Vec<u8> {
    let texels: u32 = (0..levels)
        .map(|level| {
            let edge = (size >> level).max(1);
            edge * edge
        })
        .sum();
    let floats = vec![value; (texels * faces * 4) as usize];
    bytemuck::cast_slice(&floats).to_vec()
}
