//! Writes device cubemaps back to disk so the next start can load them
//! instead of recomputing.

use std::{fs::File, io::BufWriter, path::Path};

use anyhow::Context;

use crate::{
    data_structures::image::ImageWrapper,
    device::DeviceManager,
    error::AssetError,
    resources::texture::host_to_layer_major,
};

fn dxgi_for(format: wgpu::TextureFormat) -> Option<ddsfile::DxgiFormat> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Some(ddsfile::DxgiFormat::R8G8B8A8_UNorm),
        wgpu::TextureFormat::Rgba32Float => Some(ddsfile::DxgiFormat::R32G32B32A32_Float),
        wgpu::TextureFormat::Bc3RgbaUnorm => Some(ddsfile::DxgiFormat::BC3_UNorm),
        wgpu::TextureFormat::Rg32Float => Some(ddsfile::DxgiFormat::R32G32_Float),
        _ => None,
    }
}

/// Encodes host-layout image data as a DX10 DDS file.
pub fn encode_dds(wrapper: &ImageWrapper, host_data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let format = dxgi_for(wrapper.format)
        .ok_or_else(|| AssetError::UnsupportedFormat(format!("{:?}", wrapper.format)))?;
    let is_cubemap = wrapper.is_cube();

    let mut dds = ddsfile::Dds::new_dxgi(ddsfile::NewDxgiParams {
        height: wrapper.height,
        width: wrapper.width,
        depth: None,
        format,
        mipmap_levels: Some(wrapper.mip_level_count),
        // a cubemap counts as one array element holding six faces
        array_layers: Some(if is_cubemap { 1 } else { wrapper.layers }),
        caps2: None,
        is_cubemap,
        resource_dimension: ddsfile::D3D10ResourceDimension::Texture2D,
        alpha_mode: ddsfile::AlphaMode::Straight,
    })
    .map_err(|e| anyhow::anyhow!("cannot build DDS header: {:?}", e))?;

    dds.data = host_to_layer_major(
        host_data,
        wrapper.format,
        wrapper.width,
        wrapper.height,
        wrapper.layers,
        wrapper.mip_level_count,
    )?;

    let mut out = Vec::new();
    dds.write(&mut out)
        .map_err(|e| anyhow::anyhow!("cannot encode DDS: {:?}", e))?;
    Ok(out)
}

/// Reads `wrapper` back from the device and writes it to `path` as DDS.
pub fn save_image_dds(
    manager: &mut dyn DeviceManager,
    wrapper: &ImageWrapper,
    path: &Path,
) -> anyhow::Result<()> {
    let host_data = manager
        .read_image(wrapper.image)
        .with_context(|| format!("cannot read back {}", wrapper.image))?;
    let encoded = encode_dds(wrapper, &host_data)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    std::io::Write::write_all(&mut BufWriter::new(file), &encoded)
        .with_context(|| format!("cannot write {}", path.display()))?;
    log::info!(
        "saved {}x{} {:?} ({} levels) to {}",
        wrapper.width,
        wrapper.height,
        wrapper.format,
        wrapper.mip_level_count,
        path.display()
    );
    Ok(())
}
