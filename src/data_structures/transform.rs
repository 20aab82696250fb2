//! World transform of a mesh and the per-model uniform derived from it.

use cgmath::{Matrix, One, SquareMatrix};

/// Position, rotation (as quaternion) and uniform scale of a mesh in world
/// space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldTransform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: f32,
}

impl WorldTransform {
    /// Identity transform: origin, no rotation, unit scale.
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: 1.0,
        }
    }

    /// Scale first, then rotate, then translate.
    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_scale(self.scale)
    }

    pub fn to_uniform(&self) -> PerModelUniform {
        let model = self.to_matrix();
        let model_inv_trans = match model.invert() {
            Some(inverse) => inverse.transpose(),
            None => {
                log::warn!(
                    "model matrix with scale {} is not invertible, normals will not be transformed",
                    self.scale
                );
                cgmath::Matrix4::identity()
            }
        };
        PerModelUniform {
            model: model.into(),
            model_inv_trans: model_inv_trans.into(),
        }
    }
}

impl Default for WorldTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl From<cgmath::Vector3<f32>> for WorldTransform {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        WorldTransform {
            position,
            ..Default::default()
        }
    }
}

/**
 * The per-model uniform is the actual data stored on the GPU: the model
 * matrix and its inverse transpose for normals, both column-major.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PerModelUniform {
    pub model: [[f32; 4]; 4],
    pub model_inv_trans: [[f32; 4]; 4],
}

impl PerModelUniform {
    pub const SIZE: u64 = std::mem::size_of::<PerModelUniform>() as u64;
}

impl Default for PerModelUniform {
    fn default() -> Self {
        WorldTransform::new().to_uniform()
    }
}
