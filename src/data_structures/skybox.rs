//! Environment probe drawn around the scene.
//!
//! A skybox owns the radiance cubemap it shows plus the two irradiance maps
//! image-based lighting samples. Irradiance maps come from disk when a file
//! is given. Otherwise an empty render target is allocated, the renderer
//! fills it, and the result can be persisted so the next start loads it.

use std::path::Path;

use crate::{
    config::LoaderConfig,
    data_structures::{
        image::{ImageWrapper, mip_levels_for},
        mesh::{MaterialMaps, MaterialType, MeshAsset, VMesh},
    },
    device::DeviceManager,
    error::AssetError,
    resources::{
        persist::save_image_dds,
        texture::{TextureSource, create_irradiance_target, load_cubemap_source, upload_cubemap},
    },
};

/// Where an irradiance map's contents came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProbeMapState {
    /// Read from a file.
    Loaded,
    /// Allocated but not rendered yet.
    PendingCompute,
    /// Rendered this session, not written to disk.
    Computed,
    /// Rendered and written to disk.
    Persisted,
}

impl ProbeMapState {
    /// The map holds valid data and can be sampled.
    pub fn is_ready(self) -> bool {
        !matches!(self, ProbeMapState::PendingCompute)
    }

    /// The map is (or will be) computed and has not been written to disk.
    pub fn should_save(self) -> bool {
        matches!(self, ProbeMapState::PendingCompute | ProbeMapState::Computed)
    }

    fn advance(
        &mut self,
        map: &'static str,
        from: ProbeMapState,
        to: ProbeMapState,
    ) -> Result<(), AssetError> {
        if *self != from {
            return Err(AssetError::InvalidProbeTransition {
                map,
                from: *self,
                to,
            });
        }
        *self = to;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Skybox {
    pub mesh: VMesh,
    pub radiance_map: ImageWrapper,
    pub specular_irradiance_map: ImageWrapper,
    pub diffuse_irradiance_map: ImageWrapper,
    spec_state: ProbeMapState,
    diff_state: ProbeMapState,
}

impl Skybox {
    /**
     * Loads the radiance cubemap and the irradiance maps that were given, and
     * allocates render targets for those that were not.
     *
     * The specular target gets a full chain of `mip_levels_for(size)`
     * levels, the diffuse target a single level. All cubemap files are
     * decoded before anything is allocated, and a failed allocation releases
     * whatever was created before it.
     */
    pub async fn load(
        manager: &mut dyn DeviceManager,
        config: &LoaderConfig,
        model: &Path,
        radiance: Option<&Path>,
        specular: Option<&Path>,
        diffuse: Option<&Path>,
    ) -> anyhow::Result<Skybox> {
        let radiance = radiance.ok_or(AssetError::RadianceMapRequired)?;
        let radiance = decode_probe_map(config, radiance).await?;
        let specular = match specular {
            Some(path) => Some(decode_probe_map(config, path).await?),
            None => None,
        };
        let diffuse = match diffuse {
            Some(path) => Some(decode_probe_map(config, path).await?),
            None => None,
        };

        let mut mesh = VMesh::load(manager, config, model, &MaterialMaps::none()).await?;
        mesh.set_material_type(MaterialType::HdrProbe);

        let mut maps = ProbeMaps::default();
        let uploaded = upload_probe_maps(manager, config, radiance, specular, diffuse, &mut maps);
        match (uploaded, maps.radiance, maps.specular, maps.diffuse) {
            (
                Ok((spec_state, diff_state)),
                Some(radiance_map),
                Some(specular_irradiance_map),
                Some(diffuse_irradiance_map),
            ) => {
                log::debug!(
                    "skybox ready, specular {:?}, diffuse {:?}",
                    spec_state,
                    diff_state
                );
                Ok(Skybox {
                    mesh,
                    radiance_map,
                    specular_irradiance_map,
                    diffuse_irradiance_map,
                    spec_state,
                    diff_state,
                })
            }
            (uploaded, radiance, specular, diffuse) => {
                for map in [radiance, specular, diffuse].into_iter().flatten() {
                    map.destroy(manager);
                }
                mesh.destroy(manager);
                Err(uploaded
                    .err()
                    .unwrap_or_else(|| anyhow::anyhow!("skybox was uploaded without all of its maps")))
            }
        }
    }

    pub fn specular_state(&self) -> ProbeMapState {
        self.spec_state
    }

    pub fn diffuse_state(&self) -> ProbeMapState {
        self.diff_state
    }

    pub fn spec_map_ready(&self) -> bool {
        self.spec_state.is_ready()
    }

    pub fn diff_map_ready(&self) -> bool {
        self.diff_state.is_ready()
    }

    pub fn should_save_spec_map(&self) -> bool {
        self.spec_state.should_save()
    }

    pub fn should_save_diff_map(&self) -> bool {
        self.diff_state.should_save()
    }

    /// Called once the renderer has filled the specular target.
    pub fn mark_specular_computed(&mut self) -> Result<(), AssetError> {
        self.spec_state.advance(
            "specular",
            ProbeMapState::PendingCompute,
            ProbeMapState::Computed,
        )
    }

    /// Called once the renderer has filled the diffuse target.
    pub fn mark_diffuse_computed(&mut self) -> Result<(), AssetError> {
        self.diff_state.advance(
            "diffuse",
            ProbeMapState::PendingCompute,
            ProbeMapState::Computed,
        )
    }

    /// For callers that wrote the specular map themselves.
    pub fn mark_specular_persisted(&mut self) -> Result<(), AssetError> {
        self.spec_state
            .advance("specular", ProbeMapState::Computed, ProbeMapState::Persisted)
    }

    pub fn mark_diffuse_persisted(&mut self) -> Result<(), AssetError> {
        self.diff_state
            .advance("diffuse", ProbeMapState::Computed, ProbeMapState::Persisted)
    }

    /// Reads the computed specular map back and writes it to `path` as DDS.
    pub fn persist_specular_map(
        &mut self,
        manager: &mut dyn DeviceManager,
        path: &Path,
    ) -> anyhow::Result<()> {
        ensure_computed("specular", self.spec_state)?;
        save_image_dds(manager, &self.specular_irradiance_map, path)?;
        self.mark_specular_persisted()?;
        Ok(())
    }

    /// Reads the computed diffuse map back and writes it to `path` as DDS.
    pub fn persist_diffuse_map(
        &mut self,
        manager: &mut dyn DeviceManager,
        path: &Path,
    ) -> anyhow::Result<()> {
        ensure_computed("diffuse", self.diff_state)?;
        save_image_dds(manager, &self.diffuse_irradiance_map, path)?;
        self.mark_diffuse_persisted()?;
        Ok(())
    }

    pub fn destroy(self, manager: &mut dyn DeviceManager) {
        self.radiance_map.destroy(manager);
        self.specular_irradiance_map.destroy(manager);
        self.diffuse_irradiance_map.destroy(manager);
        self.mesh.destroy(manager);
    }
}

async fn decode_probe_map(
    config: &LoaderConfig,
    path: &Path,
) -> anyhow::Result<(String, TextureSource)> {
    let path = config.resolve(path);
    let source = load_cubemap_source(&path).await?;
    Ok((path.display().to_string(), source))
}

#[derive(Debug, Default)]
struct ProbeMaps {
    radiance: Option<ImageWrapper>,
    specular: Option<ImageWrapper>,
    diffuse: Option<ImageWrapper>,
}

/// Uploads the radiance map, then the specular and diffuse maps or their
/// render targets, storing each in `maps` as soon as it exists.
fn upload_probe_maps(
    manager: &mut dyn DeviceManager,
    config: &LoaderConfig,
    (radiance_label, radiance): (String, TextureSource),
    specular: Option<(String, TextureSource)>,
    diffuse: Option<(String, TextureSource)>,
    maps: &mut ProbeMaps,
) -> anyhow::Result<(ProbeMapState, ProbeMapState)> {
    maps.radiance = Some(upload_cubemap(manager, &radiance_label, radiance)?);

    let spec_state = match specular {
        Some((label, source)) => {
            maps.specular = Some(upload_cubemap(manager, &label, source)?);
            ProbeMapState::Loaded
        }
        None => {
            let size = config.specular_irradiance_size;
            maps.specular = Some(create_irradiance_target(
                manager,
                "specular irradiance",
                size,
                mip_levels_for(size),
            )?);
            ProbeMapState::PendingCompute
        }
    };

    let diff_state = match diffuse {
        Some((label, source)) => {
            maps.diffuse = Some(upload_cubemap(manager, &label, source)?);
            ProbeMapState::Loaded
        }
        None => {
            maps.diffuse = Some(create_irradiance_target(
                manager,
                "diffuse irradiance",
                config.diffuse_irradiance_size,
                1,
            )?);
            ProbeMapState::PendingCompute
        }
    };
    Ok((spec_state, diff_state))
}

fn ensure_computed(map: &'static str, state: ProbeMapState) -> Result<(), AssetError> {
    if state == ProbeMapState::Computed {
        Ok(())
    } else {
        Err(AssetError::InvalidProbeTransition {
            map,
            from: state,
            to: ProbeMapState::Persisted,
        })
    }
}

impl MeshAsset for Skybox {
    fn mesh(&self) -> &VMesh {
        &self.mesh
    }

    fn mesh_mut(&mut self) -> &mut VMesh {
        &mut self.mesh
    }
}
