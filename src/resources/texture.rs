use std::path::Path;

use anyhow::Context;
use image::imageops::FilterType;

use crate::{
    data_structures::image::{ImageWrapper, full_mip_chain},
    device::{
        DeviceManager, ImageDesc, ImageHandle, SamplerDesc, SamplerHandle, ViewDesc, ViewHandle,
        checked_level_byte_size, level_byte_size, level_extent,
    },
    error::AssetError,
    resources::{file_extension, load_binary},
};

/// Container formats that may hold cubemaps and pre-built mip chains.
const CONTAINER_EXTENSIONS: [&str; 3] = ["ktx", "ktx2", "dds"];
/// Plain images decoded with the `image` crate.
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "hdr"];

/// `«KTX 11»\r\n\x1A\n`
const KTX1_IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const KTX1_HEADER_LEN: usize = 64;
const KTX1_NATIVE_ENDIAN: u32 = 0x0403_0201;

/**
 * A decoded texture before it goes to the device.
 *
 * `levels[0]` is the base level; each level holds every layer (cube face)
 * back to back, which is exactly the host layout [`DeviceManager`] expects.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct TextureSource {
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub levels: Vec<Vec<u8>>,
}

impl TextureSource {
    /// Decodes `bytes`, picking the decoder from the extension of `path`.
    pub fn decode(path: &Path, bytes: &[u8]) -> anyhow::Result<Self> {
        let ext = file_extension(path);
        let source = match ext.as_str() {
            "ktx" | "ktx2" if bytes.starts_with(&KTX1_IDENTIFIER) => Self::from_ktx1(bytes)?,
            "ktx" | "ktx2" => Self::from_ktx2(bytes)?,
            "dds" => Self::from_dds(bytes)?,
            "png" | "jpg" | "jpeg" | "hdr" => Self::from_image(bytes, &ext)?,
            _ => return Err(AssetError::UnsupportedTextureType(ext).into()),
        };
        source.validate(path)?;
        Ok(source)
    }

    fn from_ktx2(bytes: &[u8]) -> anyhow::Result<Self> {
        let reader = ktx2::Reader::new(bytes).map_err(|e| anyhow::anyhow!("{:?}", e))?;
        let header = reader.header();
        if let Some(scheme) = header.supercompression_scheme {
            return Err(AssetError::UnsupportedFormat(format!("supercompressed ({:?})", scheme)).into());
        }
        let format = header
            .format
            .and_then(format_from_ktx2)
            .ok_or_else(|| AssetError::UnsupportedFormat(format!("{:?}", header.format)))?;

        Ok(Self {
            format,
            width: header.pixel_width,
            height: header.pixel_height.max(1),
            layers: header.layer_count.max(1) * header.face_count.max(1),
            levels: reader.levels().map(|level| level.to_vec()).collect(),
        })
    }

    /**
     * Reads a little-endian KTX1 container.
     *
     * Levels are stored as a 4-byte `imageSize` followed by every array
     * element and face of that level, which is already the host layout. For
     * a non-array cubemap `imageSize` counts a single face.
     */
    fn from_ktx1(bytes: &[u8]) -> anyhow::Result<Self> {
        let word = |offset: usize| -> anyhow::Result<u32> {
            bytes
                .get(offset..offset + 4)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or_else(|| anyhow::anyhow!("KTX1 file ends at byte {}", bytes.len()))
        };
        let header = |field: usize| word(KTX1_IDENTIFIER.len() + 4 * field);

        if header(0)? != KTX1_NATIVE_ENDIAN {
            return Err(AssetError::UnsupportedFormat("big-endian KTX1".into()).into());
        }
        let internal_format = header(4)?;
        let format = format_from_gl(internal_format).ok_or_else(|| {
            AssetError::UnsupportedFormat(format!("KTX1 glInternalFormat {:#06x}", internal_format))
        })?;
        let width = header(6)?;
        let height = header(7)?.max(1);
        if header(8)? > 1 {
            return Err(AssetError::UnsupportedFormat("3D KTX1 texture".into()).into());
        }
        let array_elements = header(9)?.max(1);
        let faces = header(10)?.max(1);
        let level_count = header(11)?.max(1);
        let key_value_bytes = header(12)? as usize;

        let invalid = AssetError::InvalidExtent {
            width,
            height,
            layers: array_elements,
            levels: level_count,
        };
        let layers = array_elements.checked_mul(faces).ok_or(invalid.clone())?;
        let sizes = level_sizes(format, width, height, layers, level_count)?;

        let mut offset = KTX1_HEADER_LEN.checked_add(key_value_bytes).ok_or(invalid)?;
        let mut levels = Vec::with_capacity(sizes.len());
        for size in sizes {
            let image_size = word(offset)? as usize;
            offset += 4;
            let level_bytes = size * layers as usize;
            let stored = if faces == 6 && array_elements == 1 {
                image_size.saturating_mul(6)
            } else {
                image_size
            };
            if stored != level_bytes {
                return Err(AssetError::ImageDataSize {
                    expected: level_bytes,
                    actual: stored,
                }
                .into());
            }
            let end = offset.saturating_add(level_bytes);
            let data = bytes.get(offset..end).ok_or(AssetError::ImageDataSize {
                expected: end,
                actual: bytes.len(),
            })?;
            levels.push(data.to_vec());
            // mipPadding
            offset = end.next_multiple_of(4);
        }

        Ok(Self {
            format,
            width,
            height,
            layers,
            levels,
        })
    }

    fn from_dds(bytes: &[u8]) -> anyhow::Result<Self> {
        let dds = ddsfile::Dds::read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| anyhow::anyhow!("invalid DDS file: {:?}", e))?;
        // ddsfile maps a legacy DXT5 header to the sRGB DXGI format, so legacy
        // headers go through the D3D mapping
        let legacy = match dds.header10 {
            Some(_) => None,
            None => dds.get_d3d_format(),
        };
        let format = if let Some(d3d) = legacy {
            let name = format!("{:?}", d3d);
            format_from_d3d(d3d).ok_or(AssetError::UnsupportedFormat(name))?
        } else if let Some(dxgi) = dds.get_dxgi_format() {
            let name = format!("{:?}", dxgi);
            format_from_dxgi(dxgi).ok_or(AssetError::UnsupportedFormat(name))?
        } else {
            return Err(AssetError::UnsupportedFormat("unknown DDS pixel format".into()).into());
        };

        let is_cube = dds.header.caps2.contains(ddsfile::Caps2::CUBEMAP)
            || dds
                .header10
                .as_ref()
                .is_some_and(|h| h.misc_flag.contains(ddsfile::MiscFlag::TEXTURECUBE));
        let faces = if is_cube { 6 } else { 1 };
        let width = dds.get_width();
        let height = dds.get_height().max(1);
        let level_count = dds.get_num_mipmap_levels().max(1);
        // legacy headers report a cubemap's six faces as array layers
        let array_layers = match dds.header10 {
            Some(ref header10) => header10.array_size.max(1),
            None => 1,
        };
        let layers = array_layers
            .checked_mul(faces)
            .ok_or(AssetError::InvalidExtent {
                width,
                height,
                layers: array_layers,
                levels: level_count,
            })?;

        let levels = layer_major_to_levels(&dds.data, format, width, height, layers, level_count)?;
        Ok(Self {
            format,
            width,
            height,
            layers,
            levels,
        })
    }

    fn from_image(bytes: &[u8], ext: &str) -> anyhow::Result<Self> {
        let image_format = image::ImageFormat::from_extension(ext)
            .ok_or_else(|| AssetError::UnsupportedTextureType(ext.to_string()))?;
        let img = image::load_from_memory_with_format(bytes, image_format)?;
        let (width, height) = (img.width(), img.height());

        let (format, data) = if image_format == image::ImageFormat::Hdr {
            let rgba = img.to_rgba32f();
            (
                wgpu::TextureFormat::Rgba32Float,
                bytemuck::cast_slice::<f32, u8>(rgba.as_raw()).to_vec(),
            )
        } else {
            (wgpu::TextureFormat::Rgba8Unorm, img.to_rgba8().into_raw())
        };

        Ok(Self {
            format,
            width,
            height,
            layers: 1,
            levels: vec![data],
        })
    }

    /// Rejects empty textures and levels whose size does not match the format.
    fn validate(&self, path: &Path) -> anyhow::Result<()> {
        if self.width == 0 || self.levels.is_empty() || self.levels.iter().all(|l| l.is_empty()) {
            return Err(AssetError::EmptyTexture(path.to_path_buf()).into());
        }
        let sizes = level_sizes(
            self.format,
            self.width,
            self.height,
            self.layers,
            self.mip_level_count(),
        )
        .with_context(|| format!("bad header in {}", path.display()))?;
        for (level, (data, size)) in self.levels.iter().zip(sizes).enumerate() {
            let expected = size * self.layers as usize;
            if data.len() != expected {
                return Err(AssetError::ImageDataSize {
                    expected,
                    actual: data.len(),
                })
                .with_context(|| format!("level {} of {}", level, path.display()));
            }
        }
        Ok(())
    }

    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn is_block_compressed(&self) -> bool {
        self.format.block_dimensions() != (1, 1)
    }

    /**
     * Builds a full mip chain from the base level with a linear filter.
     *
     * Each level is filtered from the previous one. Only single-layer,
     * single-level RGBA8/RGBA32F/RG32F sources are filtered; anything else is
     * returned unchanged.
     */
    pub fn generate_mipmaps(mut self) -> Self {
        if self.layers != 1 || self.levels.len() != 1 {
            log::warn!("mip generation needs a single-layer, single-level source");
            return self;
        }
        let (w, h) = (self.width, self.height);
        if Some(self.levels[0].len()) != checked_level_byte_size(self.format, w, h) {
            log::warn!("base level does not match {}x{} {:?}", w, h, self.format);
            return self;
        }
        let level_count = full_mip_chain(w, h);
        let levels = match self.format {
            wgpu::TextureFormat::Rgba8Unorm => rgba8_chain(&self.levels[0], w, h, level_count),
            wgpu::TextureFormat::Rgba32Float => box_chain_f32(&self.levels[0], w, h, 4, level_count),
            wgpu::TextureFormat::Rg32Float => box_chain_f32(&self.levels[0], w, h, 2, level_count),
            other => {
                log::warn!("cannot generate mip levels for {:?}, keeping a single level", other);
                return self;
            }
        };
        self.levels = levels;
        self
    }

    /// Concatenates all levels into the host layout.
    pub fn into_host_data(self) -> Vec<u8> {
        self.levels.concat()
    }

    fn image_desc(&self, label: &str, usage: wgpu::TextureUsages) -> ImageDesc {
        ImageDesc {
            label: label.to_string(),
            width: self.width,
            height: self.height,
            layers: self.layers,
            mip_level_count: self.mip_level_count(),
            format: self.format,
            usage,
        }
    }
}

fn rgba8_chain(base: &[u8], width: u32, height: u32, level_count: u32) -> Vec<Vec<u8>> {
    let mut levels = vec![base.to_vec()];
    let Some(mut previous) = image::RgbaImage::from_raw(width, height, base.to_vec()) else {
        return levels;
    };
    for level in 1..level_count {
        let (w, h) = level_extent(width, height, level);
        previous = image::imageops::resize(&previous, w, h, FilterType::Triangle);
        levels.push(previous.as_raw().clone());
    }
    levels
}

/// 2x2 box filter over float texels. `image`'s resamplers clamp floats to
/// `[0, 1]`, which would flatten HDR data.
fn box_chain_f32(
    base: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    level_count: u32,
) -> Vec<Vec<u8>> {
    let mut levels = vec![base.to_vec()];
    let mut previous: Vec<f32> = bytemuck::pod_collect_to_vec(base);
    let (mut pw, mut ph) = (width as usize, height as usize);

    for level in 1..level_count {
        let (w, h) = level_extent(width, height, level);
        let (w, h) = (w as usize, h as usize);
        let mut next = vec![0f32; w * h * channels];
        for y in 0..h {
            let ys = [(2 * y).min(ph - 1), (2 * y + 1).min(ph - 1)];
            for x in 0..w {
                let xs = [(2 * x).min(pw - 1), (2 * x + 1).min(pw - 1)];
                for c in 0..channels {
                    let mut sum = 0.0;
                    for sy in ys {
                        for sx in xs {
                            sum += previous[(sy * pw + sx) * channels + c];
                        }
                    }
                    next[(y * w + x) * channels + c] = sum * 0.25;
                }
            }
        }
        levels.push(bytemuck::cast_slice::<f32, u8>(&next).to_vec());
        previous = next;
        pw = w;
        ph = h;
    }
    levels
}

pub fn format_from_ktx2(format: ktx2::Format) -> Option<wgpu::TextureFormat> {
    if format == ktx2::Format::R8G8B8A8_UNORM {
        Some(wgpu::TextureFormat::Rgba8Unorm)
    } else if format == ktx2::Format::R32G32B32A32_SFLOAT {
        Some(wgpu::TextureFormat::Rgba32Float)
    } else if format == ktx2::Format::BC3_UNORM_BLOCK {
        Some(wgpu::TextureFormat::Bc3RgbaUnorm)
    } else if format == ktx2::Format::R32G32_SFLOAT {
        Some(wgpu::TextureFormat::Rg32Float)
    } else {
        None
    }
}

/// Sized OpenGL internal formats, as stored in KTX1 headers.
pub fn format_from_gl(internal_format: u32) -> Option<wgpu::TextureFormat> {
    match internal_format {
        0x8058 => Some(wgpu::TextureFormat::Rgba8Unorm), // GL_RGBA8
        0x8814 => Some(wgpu::TextureFormat::Rgba32Float), // GL_RGBA32F
        0x83F3 => Some(wgpu::TextureFormat::Bc3RgbaUnorm), // GL_COMPRESSED_RGBA_S3TC_DXT5_EXT
        0x8230 => Some(wgpu::TextureFormat::Rg32Float),   // GL_RG32F
        _ => None,
    }
}

pub fn format_from_dxgi(format: ddsfile::DxgiFormat) -> Option<wgpu::TextureFormat> {
    match format {
        ddsfile::DxgiFormat::R8G8B8A8_UNorm => Some(wgpu::TextureFormat::Rgba8Unorm),
        ddsfile::DxgiFormat::R32G32B32A32_Float => Some(wgpu::TextureFormat::Rgba32Float),
        ddsfile::DxgiFormat::BC3_UNorm => Some(wgpu::TextureFormat::Bc3RgbaUnorm),
        ddsfile::DxgiFormat::R32G32_Float => Some(wgpu::TextureFormat::Rg32Float),
        _ => None,
    }
}

pub fn format_from_d3d(format: ddsfile::D3DFormat) -> Option<wgpu::TextureFormat> {
    match format {
        ddsfile::D3DFormat::A8B8G8R8 => Some(wgpu::TextureFormat::Rgba8Unorm),
        ddsfile::D3DFormat::A32B32G32R32F => Some(wgpu::TextureFormat::Rgba32Float),
        ddsfile::D3DFormat::DXT5 => Some(wgpu::TextureFormat::Bc3RgbaUnorm),
        ddsfile::D3DFormat::G32R32F => Some(wgpu::TextureFormat::Rg32Float),
        _ => None,
    }
}

/**
 * Per-layer byte size of every level of an extent read from a file header.
 *
 * Fails when the chain is longer than a full one or when the whole image
 * (all layers, all levels) would not fit in a `usize`. Once this passes, the
 * unchecked size helpers are safe for the same extent.
 */
pub(crate) fn level_sizes(
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    layers: u32,
    level_count: u32,
) -> Result<Vec<usize>, AssetError> {
    let invalid = AssetError::InvalidExtent {
        width,
        height,
        layers,
        levels: level_count,
    };
    if level_count > full_mip_chain(width, height) {
        return Err(invalid);
    }
    let mut sizes = Vec::with_capacity(level_count as usize);
    let mut total = 0usize;
    for level in 0..level_count {
        let (w, h) = level_extent(width, height, level);
        let size = checked_level_byte_size(format, w, h).ok_or_else(|| invalid.clone())?;
        total = size
            .checked_mul(layers as usize)
            .and_then(|bytes| total.checked_add(bytes))
            .ok_or_else(|| invalid.clone())?;
        sizes.push(size);
    }
    Ok(sizes)
}

/// Splits layer-major data (every level of layer 0, then layer 1, ...) into
/// per-level buffers holding every layer.
pub(crate) fn layer_major_to_levels(
    data: &[u8],
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    layers: u32,
    level_count: u32,
) -> anyhow::Result<Vec<Vec<u8>>> {
    let sizes = level_sizes(format, width, height, layers, level_count)?;
    let layer_size: usize = sizes.iter().sum();
    let expected = layer_size * layers as usize;
    if data.len() < expected {
        return Err(AssetError::ImageDataSize {
            expected,
            actual: data.len(),
        }
        .into());
    }

    let mut levels: Vec<Vec<u8>> = sizes
        .iter()
        .map(|size| Vec::with_capacity(size * layers as usize))
        .collect();
    for layer in data[..expected].chunks_exact(layer_size) {
        let mut offset = 0;
        for (level, size) in sizes.iter().enumerate() {
            levels[level].extend_from_slice(&layer[offset..offset + size]);
            offset += size;
        }
    }
    Ok(levels)
}

/// Inverse of [`layer_major_to_levels`] for data in the host layout.
pub(crate) fn host_to_layer_major(
    data: &[u8],
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    layers: u32,
    level_count: u32,
) -> anyhow::Result<Vec<u8>> {
    let mut per_layer: Vec<Vec<u8>> = vec![Vec::new(); layers as usize];
    let mut offset = 0;
    for level in 0..level_count {
        let (w, h) = level_extent(width, height, level);
        let size = level_byte_size(format, w, h);
        for layer in per_layer.iter_mut() {
            let chunk = data.get(offset..offset + size).ok_or(AssetError::ImageDataSize {
                expected: offset + size,
                actual: data.len(),
            })?;
            layer.extend_from_slice(chunk);
            offset += size;
        }
    }
    Ok(per_layer.concat())
}

/// Reads and decodes a 2D texture without touching the device.
pub async fn load_texture_source(path: &Path) -> anyhow::Result<TextureSource> {
    let ext = file_extension(path);
    if !CONTAINER_EXTENSIONS.contains(&ext.as_str()) && !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AssetError::UnsupportedTextureType(ext))
            .with_context(|| format!("cannot load {}", path.display()));
    }
    let data = load_binary(path)
        .await
        .with_context(|| format!("cannot read texture {}", path.display()))?;
    TextureSource::decode(path, &data).with_context(|| format!("cannot decode {}", path.display()))
}

/// Loads a 2D texture from disk and uploads it.
pub async fn load_texture_2d(
    manager: &mut dyn DeviceManager,
    path: &Path,
    generate_mip_levels: bool,
) -> anyhow::Result<ImageWrapper> {
    let source = load_texture_source(path).await?;
    upload_texture_2d(manager, &path.display().to_string(), source, generate_mip_levels)
}

/**
 * Uploads a decoded 2D texture: one image sampled by shaders, one view over
 * all levels and a repeating linear sampler.
 *
 * A single-level source gets a full mip chain when `generate_mip_levels` is
 * set and its format can be filtered.
 */
pub fn upload_texture_2d(
    manager: &mut dyn DeviceManager,
    label: &str,
    source: TextureSource,
    generate_mip_levels: bool,
) -> anyhow::Result<ImageWrapper> {
    if source.layers != 1 {
        anyhow::bail!("{} has {} layers, expected a 2D texture", label, source.layers);
    }
    let source = if source.mip_level_count() == 1 && generate_mip_levels {
        if source.is_block_compressed() {
            log::warn!(
                "{}: block-compressed {:?} cannot be filtered, keeping a single mip level",
                label,
                source.format
            );
            source
        } else {
            source.generate_mipmaps()
        }
    } else {
        source
    };

    let desc = source.image_desc(
        label,
        wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
    );
    let image = manager.create_image(&desc)?;
    let (views, sampler) = populate_image(
        manager,
        image,
        Some(source.into_host_data().as_slice()),
        &[ViewDesc {
            dimension: wgpu::TextureViewDimension::D2,
            base_mip_level: 0,
            mip_level_count: desc.mip_level_count,
        }],
        &SamplerDesc::repeat(desc.mip_level_count.saturating_sub(1) as f32),
    )?;
    log::debug!(
        "uploaded {} ({}x{}, {:?}, {} levels)",
        label,
        desc.width,
        desc.height,
        desc.format,
        desc.mip_level_count
    );

    Ok(wrapper_for(&desc, image, views, sampler))
}

/// Loads a cubemap container from disk and uploads it with its own mip chain.
pub async fn load_cubemap(
    manager: &mut dyn DeviceManager,
    path: &Path,
) -> anyhow::Result<ImageWrapper> {
    let source = load_cubemap_source(path).await?;
    upload_cubemap(manager, &path.display().to_string(), source)
}

/// Reads and decodes a six-face container without touching the device.
pub async fn load_cubemap_source(path: &Path) -> anyhow::Result<TextureSource> {
    let ext = file_extension(path);
    if !CONTAINER_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AssetError::UnsupportedTextureType(ext))
            .with_context(|| format!("cannot load cubemap {}", path.display()));
    }
    let data = load_binary(path)
        .await
        .with_context(|| format!("cannot read cubemap {}", path.display()))?;
    let source = TextureSource::decode(path, &data)
        .with_context(|| format!("cannot decode {}", path.display()))?;
    if source.layers != 6 {
        return Err(AssetError::NotACubemap {
            path: path.to_path_buf(),
            faces: source.layers,
        }
        .into());
    }
    Ok(source)
}

pub fn upload_cubemap(
    manager: &mut dyn DeviceManager,
    label: &str,
    source: TextureSource,
) -> anyhow::Result<ImageWrapper> {
    let desc = source.image_desc(
        label,
        wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
    );
    let image = manager.create_image(&desc)?;
    let (views, sampler) = populate_image(
        manager,
        image,
        Some(source.into_host_data().as_slice()),
        &[ViewDesc {
            dimension: wgpu::TextureViewDimension::Cube,
            base_mip_level: 0,
            mip_level_count: desc.mip_level_count,
        }],
        &SamplerDesc::clamp_to_edge(desc.mip_level_count.saturating_sub(1) as f32),
    )?;
    log::debug!("uploaded cubemap {} ({} levels)", label, desc.mip_level_count);

    Ok(wrapper_for(&desc, image, views, sampler))
}

/**
 * Allocates an empty RGBA32F cubemap that a render pass fills later.
 *
 * Besides the view over the whole chain, a target with more than one level
 * gets one cube view per level so each level can be rendered separately.
 */
pub fn create_irradiance_target(
    manager: &mut dyn DeviceManager,
    label: &str,
    size: u32,
    mip_levels: u32,
) -> anyhow::Result<ImageWrapper> {
    let desc = ImageDesc {
        label: label.to_string(),
        width: size,
        height: size,
        layers: 6,
        mip_level_count: mip_levels,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
    };
    let image = manager.create_image(&desc)?;

    let mut view_descs = vec![ViewDesc {
        dimension: wgpu::TextureViewDimension::Cube,
        base_mip_level: 0,
        mip_level_count: mip_levels,
    }];
    if mip_levels > 1 {
        view_descs.extend((0..mip_levels).map(|level| ViewDesc {
            dimension: wgpu::TextureViewDimension::Cube,
            base_mip_level: level,
            mip_level_count: 1,
        }));
    }
    let (views, sampler) = populate_image(
        manager,
        image,
        None,
        &view_descs,
        &SamplerDesc::clamp_to_edge(mip_levels.saturating_sub(1) as f32),
    )?;

    Ok(wrapper_for(&desc, image, views, sampler))
}

/// Uploads `data` into a freshly created image, then adds its views and a
/// sampler. The image is destroyed again if any step fails.
fn populate_image(
    manager: &mut dyn DeviceManager,
    image: ImageHandle,
    data: Option<&[u8]>,
    views: &[ViewDesc],
    sampler: &SamplerDesc,
) -> anyhow::Result<(Vec<ViewHandle>, SamplerHandle)> {
    let populated = (|| -> anyhow::Result<(Vec<ViewHandle>, SamplerHandle)> {
        if let Some(data) = data {
            manager.transfer_host_data_to_image(image, data)?;
        }
        let views = views
            .iter()
            .map(|view| manager.create_image_view(image, view))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((views, manager.create_sampler(sampler)?))
    })();
    if populated.is_err() {
        manager.destroy_image(image);
    }
    populated
}

fn wrapper_for(
    desc: &ImageDesc,
    image: ImageHandle,
    views: Vec<ViewHandle>,
    sampler: SamplerHandle,
) -> ImageWrapper {
    ImageWrapper {
        image,
        views,
        sampler: Some(sampler),
        format: desc.format,
        width: desc.width,
        height: desc.height,
        depth: 1,
        layers: desc.layers,
        mip_level_count: desc.mip_level_count,
    }
}
