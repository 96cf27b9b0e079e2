//! Mesh data and its GPU-resident form

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::{GpuBuffer, GpuDevice};

/// Vertex with position, normal and texture coordinate
///
/// Layout matches the geometry pipeline's vertex input: binding 0,
/// locations 0..=2, tightly packed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in object space
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// CPU-side triangle list with 32-bit indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Index data, three per triangle
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a new mesh
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Full-screen quad in normalized device coordinates
    ///
    /// Four corners at z = 0 with texture coordinates spanning [0, 1], drawn
    /// as two triangles.
    pub fn fullscreen_quad() -> Self {
        let normal = [0.0, 0.0, 1.0];
        Self::new(
            vec![
                Vertex::new([-1.0, -1.0, 0.0], normal, [0.0, 0.0]),
                Vertex::new([1.0, -1.0, 0.0], normal, [1.0, 0.0]),
                Vertex::new([1.0, 1.0, 0.0], normal, [1.0, 1.0]),
                Vertex::new([-1.0, 1.0, 0.0], normal, [0.0, 1.0]),
            ],
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    /// Number of whole triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Vertex and index buffers uploaded for drawing
///
/// An empty mesh owns no buffers and draws nothing.
#[derive(Debug, Default)]
pub struct GpuMesh {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    vertex_count: u32,
    index_count: u32,
}

impl GpuMesh {
    /// Upload `mesh` into host-visible vertex and index buffers
    pub fn upload(device: &dyn GpuDevice, mesh: &Mesh) -> RenderResult<Self> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            log::debug!("Skipping upload of empty mesh");
            return Ok(Self::default());
        }
        let vertex_count = count_u32(mesh.vertices.len(), "vertices")?;
        let index_count = count_u32(mesh.indices.len(), "indices")?;

        let vertex_buffer = device.create_buffer_with_data(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = match device
            .create_buffer_with_data(vk::BufferUsageFlags::INDEX_BUFFER, bytemuck::cast_slice(&mesh.indices))
        {
            Ok(buffer) => buffer,
            Err(e) => {
                device.destroy_buffer(&vertex_buffer);
                return Err(e);
            }
        };

        log::debug!(
            "Uploaded mesh: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count,
            index_count,
        })
    }

    /// Whether there is nothing to draw
    pub fn is_empty(&self) -> bool {
        self.index_count == 0
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.buffer
    }

    /// Index buffer handle
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.buffer
    }

    /// Release both buffers; safe to call more than once
    pub fn destroy(&mut self, device: &dyn GpuDevice) {
        self.vertex_buffer.destroy(device);
        self.index_buffer.destroy(device);
        self.vertex_count = 0;
        self.index_count = 0;
    }
}

fn count_u32(len: usize, what: &str) -> RenderResult<u32> {
    u32::try_from(len).map_err(|_| RenderError::InvalidOperation {
        reason: format!("mesh has {} {}, more than a 32-bit draw can address", len, what),
    })
}
