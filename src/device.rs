//! The seam between asset code and the graphics device.
//!
//! Assets never touch `wgpu` objects directly. They ask a [`DeviceManager`]
//! for buffers, images, views and samplers and keep the returned handles.
//! [`crate::context::Context`] is the `wgpu` implementation; tests plug in a
//! recording one.
//!
//! Host image data always uses one layout: mip level 0 first, within a level
//! every array layer (cube face) in order, each tightly packed in texel
//! blocks. [`level_byte_size`] gives the size of one layer of one level.

use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// A device buffer (vertex, index or uniform).
    BufferHandle
);
handle!(
    /// A device image with all of its levels and layers.
    ImageHandle
);
handle!(ViewHandle);
handle!(SamplerHandle);

/// Everything needed to allocate an image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// 1 for 2D images, 6 for cubemaps.
    pub layers: u32,
    pub mip_level_count: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl ImageDesc {
    pub fn is_cube(&self) -> bool {
        self.layers == 6
    }

    /// Size in bytes of the whole image in the host layout.
    pub fn host_byte_size(&self) -> usize {
        (0..self.mip_level_count)
            .map(|level| {
                let (w, h) = level_extent(self.width, self.height, level);
                level_byte_size(self.format, w, h) * self.layers as usize
            })
            .sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewDesc {
    pub dimension: wgpu::TextureViewDimension,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub address_mode: wgpu::AddressMode,
    pub filter: wgpu::FilterMode,
    pub max_lod: f32,
}

impl SamplerDesc {
    /// Repeat addressing with linear filtering, for material maps.
    pub fn repeat(max_lod: f32) -> Self {
        Self {
            address_mode: wgpu::AddressMode::Repeat,
            filter: wgpu::FilterMode::Linear,
            max_lod,
        }
    }

    /// Clamp-to-edge addressing with linear filtering, for cubemaps.
    pub fn clamp_to_edge(max_lod: f32) -> Self {
        Self {
            address_mode: wgpu::AddressMode::ClampToEdge,
            filter: wgpu::FilterMode::Linear,
            max_lod,
        }
    }
}

/// Graphics device operations the asset layer relies on.
pub trait DeviceManager {
    /// Allocates a buffer initialised with `contents`.
    fn create_buffer_from_host_data(
        &mut self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> anyhow::Result<BufferHandle>;

    /// Allocates an uninitialised buffer of `size` bytes.
    fn create_buffer(
        &mut self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> anyhow::Result<BufferHandle>;

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8])
    -> anyhow::Result<()>;

    fn create_image(&mut self, desc: &ImageDesc) -> anyhow::Result<ImageHandle>;

    /// Uploads every level and layer of `image`. `data` must be in the host
    /// layout and exactly [`ImageDesc::host_byte_size`] long.
    fn transfer_host_data_to_image(&mut self, image: ImageHandle, data: &[u8])
    -> anyhow::Result<()>;

    /// Reads every level and layer of `image` back in the host layout.
    fn read_image(&mut self, image: ImageHandle) -> anyhow::Result<Vec<u8>>;

    fn create_image_view(&mut self, image: ImageHandle, desc: &ViewDesc)
    -> anyhow::Result<ViewHandle>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> anyhow::Result<SamplerHandle>;

    /// Unknown handles are ignored.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Releases the image together with every view created from it.
    fn destroy_image(&mut self, image: ImageHandle);

    fn destroy_sampler(&mut self, sampler: SamplerHandle);
}

/// Width and height of `level`, never below one texel.
pub fn level_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    (
        width.checked_shr(level).unwrap_or(0).max(1),
        height.checked_shr(level).unwrap_or(0).max(1),
    )
}

/// Bytes per row of one layer of a level, in whole texel blocks.
pub fn level_row_bytes(format: wgpu::TextureFormat, width: u32) -> u32 {
    let (block_w, _) = format.block_dimensions();
    let block_size = format.block_copy_size(None).unwrap_or(0);
    width.div_ceil(block_w) * block_size
}

/// Number of block rows in one layer of a level.
pub fn level_block_rows(format: wgpu::TextureFormat, height: u32) -> u32 {
    let (_, block_h) = format.block_dimensions();
    height.div_ceil(block_h)
}

/// Bytes of one layer of a level whose extent is `width` x `height`.
///
/// The extent must already be known to fit in memory; use
/// [`checked_level_byte_size`] for sizes read from a file header.
pub fn level_byte_size(format: wgpu::TextureFormat, width: u32, height: u32) -> usize {
    level_row_bytes(format, width) as usize * level_block_rows(format, height) as usize
}

/// [`level_byte_size`] for untrusted extents. `None` when the size does not
/// fit in a `usize`.
pub fn checked_level_byte_size(
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> Option<usize> {
    let (block_w, block_h) = format.block_dimensions();
    let block_size = u64::from(format.block_copy_size(None).unwrap_or(0));
    let blocks = u64::from(width.div_ceil(block_w)) * u64::from(height.div_ceil(block_h));
    usize::try_from(blocks.checked_mul(block_size)?).ok()
}
