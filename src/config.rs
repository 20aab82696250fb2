//! Loader configuration.

use std::path::{Path, PathBuf};

/// Edge length of the computed diffuse irradiance cubemap.
pub const DIFF_IRRADIANCE_MAP_SIZE: u32 = 32;
/// Edge length of the computed specular irradiance cubemap (mip 0).
pub const SPEC_IRRADIANCE_MAP_SIZE: u32 = 512;

/// Environment variable that overrides [`LoaderConfig::asset_root`].
pub const ASSET_ROOT_ENV: &str = "IBL_ASSET_ROOT";

/// Knobs shared by every loader in [`crate::resources`].
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfig {
    /// Relative asset paths are resolved against this directory.
    pub asset_root: PathBuf,
    /// Build a full mip chain for single-level 2D textures.
    pub generate_mip_levels: bool,
    pub import: MeshImportOptions,
    pub diffuse_irradiance_size: u32,
    pub specular_irradiance_size: u32,
}

/// Post-processing applied to every imported mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshImportOptions {
    /// Emit triangles as `(a, c, b)` instead of `(a, b, c)`.
    pub flip_winding_order: bool,
    /// Store `1 - v` as the texture coordinate's second component.
    pub flip_v: bool,
}

impl Default for MeshImportOptions {
    fn default() -> Self {
        Self {
            flip_winding_order: true,
            flip_v: true,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("./assets"),
            generate_mip_levels: true,
            import: MeshImportOptions::default(),
            diffuse_irradiance_size: DIFF_IRRADIANCE_MAP_SIZE,
            specular_irradiance_size: SPEC_IRRADIANCE_MAP_SIZE,
        }
    }
}

impl LoaderConfig {
    /// Defaults, with the asset root taken from `IBL_ASSET_ROOT` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = std::env::var_os(ASSET_ROOT_ENV) {
            config.asset_root = PathBuf::from(root);
        }
        config
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }
}
