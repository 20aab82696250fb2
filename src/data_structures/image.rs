//! Uploaded GPU textures.
//!
//! [`ImageWrapper`] is what asset code keeps after a texture went to the
//! device: the image handle, its views and enough metadata to bind or read it
//! back later.

use crate::device::{DeviceManager, ImageHandle, SamplerHandle, ViewHandle};

/// A texture that lives on the device.
///
/// `views[0]` always spans the whole mip chain. Render-target cubemaps that
/// get filled level by level also carry one view per level, starting at
/// `views[1]` for level 0.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageWrapper {
    pub image: ImageHandle,
    pub views: Vec<ViewHandle>,
    pub sampler: Option<SamplerHandle>,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// 1 for 2D textures, 6 for cubemaps.
    pub layers: u32,
    pub mip_level_count: u32,
}

impl ImageWrapper {
    pub fn is_cube(&self) -> bool {
        self.layers == 6
    }

    /// The view spanning every mip level.
    pub fn full_view(&self) -> Option<ViewHandle> {
        self.views.first().copied()
    }

    /// Releases the image with its views and its sampler.
    pub fn destroy(self, manager: &mut dyn DeviceManager) {
        if let Some(sampler) = self.sampler {
            manager.destroy_sampler(sampler);
        }
        manager.destroy_image(self.image);
    }

    /// The single-level view for `level`, if per-level views were created.
    pub fn level_view(&self, level: u32) -> Option<ViewHandle> {
        if self.views.len() as u32 != self.mip_level_count + 1 {
            return None;
        }
        self.views.get(level as usize + 1).copied()
    }
}

/// `floor(log2(size) + 0.5) + 1`: the chain length used for irradiance
/// targets, 10 for a 512 edge.
pub fn mip_levels_for(size: u32) -> u32 {
    ((size.max(1) as f32).log2() + 0.5).floor() as u32 + 1
}

/// Length of a full chain down to 1x1.
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}
