//! Loading meshes and textures from external files.
//!
//! - `mesh` imports OBJ/glTF geometry and welds identical vertices
//! - `texture` decodes KTX2/DDS/PNG/HDR textures and uploads them
//! - `persist` writes computed cubemaps back to disk

use std::path::Path;

pub mod mesh;
pub mod persist;
pub mod texture;

/// Lower-cased extension of `path` without the dot, empty when there is none.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(target_arch = "wasm32")]
fn format_url(path: &Path) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("page has no origin"))?;
    let base = reqwest::Url::parse(&format!("{}/", origin))?;
    Ok(base.join(&path.to_string_lossy())?)
}

pub async fn load_string(path: &Path) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(path)?;
        reqwest::get(url).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = tokio::fs::read_to_string(path).await?;

    Ok(txt)
}

pub async fn load_binary(path: &Path) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(path)?;
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = tokio::fs::read(path).await?;

    Ok(data)
}
