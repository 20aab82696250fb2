//! ibl-ngin
//!
//! Mesh and environment-probe assets for an image-based-lighting renderer.
//! Meshes are imported from OBJ or glTF and welded into indexed geometry,
//! textures and cubemaps are decoded from KTX2, DDS or common image formats,
//! and a skybox tracks whether its irradiance maps were loaded from disk or
//! still need to be computed and saved.
//!
//! High-level modules
//! - `config`: loader settings and irradiance map sizes
//! - `context`: headless `wgpu` device behind the `DeviceManager` handles
//! - `data_structures`: vertices, images, meshes and the skybox
//! - `device`: the `DeviceManager` trait and resource handles
//! - `error`: typed asset failures
//! - `resources`: file loading, mesh import, texture decoding and DDS export
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod error;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use config::{LoaderConfig, MeshImportOptions};
pub use context::Context;
pub use data_structures::{
    image::ImageWrapper,
    mesh::{MapSlot, MaterialMaps, MaterialType, MeshAsset, VMesh},
    skybox::{ProbeMapState, Skybox},
    vertex::Vertex,
};
pub use device::DeviceManager;
pub use error::AssetError;
pub use cgmath;
pub use wgpu;
