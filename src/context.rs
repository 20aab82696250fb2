//! Headless `wgpu` device that backs the [`DeviceManager`] handles.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::{
    device::{
        BufferHandle, DeviceManager, ImageDesc, ImageHandle, SamplerDesc, SamplerHandle, ViewDesc,
        ViewHandle, level_block_rows, level_byte_size, level_extent, level_row_bytes,
    },
    error::AssetError,
};

/// Live device objects keyed by handle id. Ids are never reused.
#[derive(Debug)]
struct Registry<T> {
    next: u32,
    entries: HashMap<u32, T>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            next: 0,
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, value: T) -> u32 {
        let id = self.next;
        self.next += 1;
        self.entries.insert(id, value);
        id
    }

    fn get(&self, kind: &'static str, id: u32) -> Result<&T, AssetError> {
        self.entries
            .get(&id)
            .ok_or(AssetError::UnknownHandle { kind, id })
    }

    fn remove(&mut self, id: u32) -> Option<T> {
        self.entries.remove(&id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug)]
struct ImageEntry {
    texture: wgpu::Texture,
    desc: ImageDesc,
}

#[derive(Debug)]
struct ViewEntry {
    view: wgpu::TextureView,
    image: ImageHandle,
}

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    buffers: Registry<wgpu::Buffer>,
    images: Registry<ImageEntry>,
    views: Registry<ViewEntry>,
    samplers: Registry<wgpu::Sampler>,
}

impl Context {
    /**
     * Opens the default adapter without a surface.
     *
     * BC texture compression and filterable 32-bit float textures are
     * enabled when the adapter offers them; images in formats that need a
     * missing feature are refused at creation.
     */
    pub async fn new_headless() -> anyhow::Result<Self> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Err(e) = env_logger::try_init() {
                log::debug!("logger already initialised: {}", e);
            };
        }
        #[cfg(target_arch = "wasm32")]
        {
            if let Err(e) = console_log::init_with_level(log::Level::Info) {
                log::debug!("logger already initialised: {}", e);
            };
        }

        let mut instance_desc = wgpu::InstanceDescriptor::new_without_display_handle();
        instance_desc.backends = if cfg!(target_arch = "wasm32") {
            wgpu::Backends::GL
        } else {
            wgpu::Backends::PRIMARY
        };
        let instance = wgpu::Instance::new(instance_desc);

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let wanted = wgpu::Features::TEXTURE_COMPRESSION_BC | wgpu::Features::FLOAT32_FILTERABLE;
        let required_features = adapter.features() & wanted;
        log::info!(
            "using {} with features {:?}",
            adapter.get_info().name,
            required_features
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("asset device"),
                required_features,
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await?;

        Ok(Self::from_device(device, queue))
    }

    /// Wraps a device and queue the caller already owns.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            buffers: Registry::new(),
            images: Registry::new(),
            views: Registry::new(),
            samplers: Registry::new(),
        }
    }

    pub fn buffer(&self, handle: BufferHandle) -> anyhow::Result<&wgpu::Buffer> {
        Ok(self.buffers.get("buffer", handle.0)?)
    }

    pub fn texture(&self, handle: ImageHandle) -> anyhow::Result<&wgpu::Texture> {
        Ok(&self.images.get("image", handle.0)?.texture)
    }

    pub fn view(&self, handle: ViewHandle) -> anyhow::Result<&wgpu::TextureView> {
        Ok(&self.views.get("view", handle.0)?.view)
    }

    pub fn sampler(&self, handle: SamplerHandle) -> anyhow::Result<&wgpu::Sampler> {
        Ok(self.samplers.get("sampler", handle.0)?)
    }

    /// Number of live buffers, images and samplers, for leak checks.
    pub fn live_resources(&self) -> (usize, usize, usize) {
        (self.buffers.len(), self.images.len(), self.samplers.len())
    }

    fn image(&self, handle: ImageHandle) -> Result<&ImageEntry, AssetError> {
        self.images.get("image", handle.0)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn map_for_read(&self, buffer: &wgpu::Buffer) -> anyhow::Result<Vec<u8>> {
        let buffer_slice = buffer.slice(..);
        // the mapping has to be requested before polling
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        futures::executor::block_on(rx.receive())
            .ok_or_else(|| anyhow::anyhow!("readback channel closed"))??;

        let data = buffer_slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }

    #[cfg(target_arch = "wasm32")]
    fn map_for_read(&self, _buffer: &wgpu::Buffer) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("blocking image readback is not available on the web")
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl DeviceManager for Context {
    fn create_buffer_from_host_data(
        &mut self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> anyhow::Result<BufferHandle> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        Ok(BufferHandle(self.buffers.insert(buffer)))
    }

    fn create_buffer(
        &mut self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> anyhow::Result<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Ok(BufferHandle(self.buffers.insert(buffer)))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let buffer = self.buffers.get("buffer", buffer.0)?;
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_image(&mut self, desc: &ImageDesc) -> anyhow::Result<ImageHandle> {
        let missing = desc.format.required_features() - self.device.features();
        if !missing.is_empty() {
            return Err(AssetError::UnsupportedFormat(format!(
                "{:?} (device lacks {:?})",
                desc.format, missing
            ))
            .into());
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        Ok(ImageHandle(self.images.insert(ImageEntry {
            texture,
            desc: desc.clone(),
        })))
    }

    fn transfer_host_data_to_image(
        &mut self,
        image: ImageHandle,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let ImageEntry { texture, desc } = self.image(image)?;
        let expected = desc.host_byte_size();
        if data.len() != expected {
            return Err(AssetError::ImageDataSize {
                expected,
                actual: data.len(),
            }
            .into());
        }

        let mut offset = 0;
        for level in 0..desc.mip_level_count {
            let (width, height) = level_extent(desc.width, desc.height, level);
            let layer_size = level_byte_size(desc.format, width, height);
            let size = wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            }
            .physical_size(desc.format);
            for layer in 0..desc.layers {
                self.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        aspect: wgpu::TextureAspect::All,
                        texture,
                        mip_level: level,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: layer,
                        },
                    },
                    &data[offset..offset + layer_size],
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(level_row_bytes(desc.format, width)),
                        rows_per_image: Some(level_block_rows(desc.format, height)),
                    },
                    size,
                );
                offset += layer_size;
            }
        }
        Ok(())
    }

    /**
     * Copies every level into one staging buffer whose rows are padded to
     * `COPY_BYTES_PER_ROW_ALIGNMENT`, then strips the padding so the result
     * is in the tightly packed host layout.
     */
    fn read_image(&mut self, image: ImageHandle) -> anyhow::Result<Vec<u8>> {
        let ImageEntry { texture, desc } = self.image(image)?;
        if !desc.usage.contains(wgpu::TextureUsages::COPY_SRC) {
            anyhow::bail!("{} ({}) was not created with COPY_SRC", image, desc.label);
        }

        struct LevelCopy {
            offset: u64,
            row_bytes: u32,
            padded_row_bytes: u32,
            rows: u32,
        }

        let mut copies = Vec::with_capacity(desc.mip_level_count as usize);
        let mut staging_size = 0u64;
        for level in 0..desc.mip_level_count {
            let (width, height) = level_extent(desc.width, desc.height, level);
            let row_bytes = level_row_bytes(desc.format, width);
            let padded_row_bytes = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
            let rows = level_block_rows(desc.format, height);
            copies.push(LevelCopy {
                offset: staging_size,
                row_bytes,
                padded_row_bytes,
                rows,
            });
            staging_size += padded_row_bytes as u64 * rows as u64 * desc.layers as u64;
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("image readback"),
            size: staging_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("image readback encoder"),
            });
        for (level, copy) in copies.iter().enumerate() {
            let (width, height) = level_extent(desc.width, desc.height, level as u32);
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: copy.offset,
                        bytes_per_row: Some(copy.padded_row_bytes),
                        rows_per_image: Some(copy.rows),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: desc.layers,
                }
                .physical_size(desc.format),
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        let padded = self.map_for_read(&staging)?;
        let mut data = Vec::with_capacity(desc.host_byte_size());
        for copy in &copies {
            for row in 0..(copy.rows * desc.layers) as u64 {
                let start = (copy.offset + row * copy.padded_row_bytes as u64) as usize;
                data.extend_from_slice(&padded[start..start + copy.row_bytes as usize]);
            }
        }
        log::debug!("read back {} bytes of {}", data.len(), desc.label);
        Ok(data)
    }

    fn create_image_view(
        &mut self,
        image: ImageHandle,
        desc: &ViewDesc,
    ) -> anyhow::Result<ViewHandle> {
        let entry = self.image(image)?;
        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&entry.desc.label),
            dimension: Some(desc.dimension),
            base_mip_level: desc.base_mip_level,
            mip_level_count: Some(desc.mip_level_count),
            ..Default::default()
        });
        Ok(ViewHandle(self.views.insert(ViewEntry { view, image })))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> anyhow::Result<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            mipmap_filter: match desc.filter {
                wgpu::FilterMode::Nearest => wgpu::MipmapFilterMode::Nearest,
                wgpu::FilterMode::Linear => wgpu::MipmapFilterMode::Linear,
            },
            lod_min_clamp: 0.0,
            lod_max_clamp: desc.max_lod,
            ..Default::default()
        });
        Ok(SamplerHandle(self.samplers.insert(sampler)))
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(sampler.0);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(buffer.0) {
            buffer.destroy();
        }
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.views.entries.retain(|_, entry| entry.image != image);
        if let Some(entry) = self.images.remove(image.0) {
            entry.texture.destroy();
        }
    }
}
