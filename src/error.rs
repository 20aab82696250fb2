//! Typed failures raised while loading assets.
//!
//! Public loaders return `anyhow::Result` and attach the offending file as
//! context. The root cause is always one of these variants, so callers that
//! care can `downcast_ref::<AssetError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssetError {
    #[error("mesh type .{0} is not supported")]
    UnsupportedMeshType(String),

    #[error("texture type .{0} is not supported")]
    UnsupportedTextureType(String),

    #[error("texture format {0} is not supported")]
    UnsupportedFormat(String),

    #[error("cannot load texture {0}: it contains no data")]
    EmptyTexture(PathBuf),

    #[error("{path} has {faces} faces, a cubemap needs 6")]
    NotACubemap { path: PathBuf, faces: u32 },

    #[error("model must have normals and uvs ({0})")]
    MissingAttributes(PathBuf),

    #[error("{0} contains no triangles")]
    EmptyMesh(PathBuf),

    #[error("radiance map required but not provided")]
    RadianceMapRequired,

    #[error("{map} irradiance map cannot go from {from:?} to {to:?}")]
    InvalidProbeTransition {
        map: &'static str,
        from: crate::data_structures::skybox::ProbeMapState,
        to: crate::data_structures::skybox::ProbeMapState,
    },

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },

    #[error("invalid image extent {width}x{height} with {layers} layers and {levels} levels")]
    InvalidExtent {
        width: u32,
        height: u32,
        layers: u32,
        levels: u32,
    },

    #[error("expected {expected} bytes of image data, got {actual}")]
    ImageDataSize { expected: usize, actual: usize },
}
