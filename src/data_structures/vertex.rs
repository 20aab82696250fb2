//! The mesh vertex and the layout it has on the GPU.

use std::hash::{Hash, Hasher};

/// Describes how a vertex type is laid out in a vertex buffer.
pub trait VertexLayout {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

/// One welded mesh vertex.
///
/// Two vertices are equal when all eight floats have the same bit pattern,
/// with `-0.0` treated as `+0.0`. Hashing uses the same canonical bits, so a
/// `HashMap<Vertex, u32>` deduplicates exactly the vertices `==` considers
/// equal. NaN components compare equal to themselves.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coords: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coords,
        }
    }

    fn key(&self) -> [u32; 8] {
        let canon = |f: f32| if f == 0.0 { 0u32 } else { f.to_bits() };
        [
            canon(self.position[0]),
            canon(self.position[1]),
            canon(self.position[2]),
            canon(self.normal[0]),
            canon(self.normal[1]),
            canon(self.normal[2]),
            canon(self.tex_coords[0]),
            canon(self.tex_coords[1]),
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/**
 * Binding 0, one element per vertex:
 *
 * location 0: position (vec3)
 * location 1: normal (vec3)
 * location 2: texture coordinates (vec2)
 */
impl VertexLayout for Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}
