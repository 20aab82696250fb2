//! Asset data structures.
//!
//! - `vertex` is the welded vertex format and its buffer layout
//! - `image` wraps uploaded textures and cubemaps
//! - `transform` holds a mesh's world transform and per-model uniform
//! - `mesh` is a renderable mesh with its material maps
//! - `skybox` is the environment probe and its irradiance map lifecycle

pub mod image;
pub mod mesh;
pub mod skybox;
pub mod transform;
pub mod vertex;
