//! Renderable component: geometry, texture and per-object uniform data

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_cols_array, Mat4};
use crate::render::{
    align_up, CommandEncoder, DescriptorResource, GpuBuffer, GpuDevice, GpuImage, GpuMesh, RenderError,
    RenderResult,
};
use crate::scene::component::Component;

/// Descriptor set index the per-object bindings are pushed to
pub const OBJECT_SET_INDEX: u32 = 1;
/// Binding of the object's texture within [`OBJECT_SET_INDEX`]
pub const TEXTURE_BINDING: u32 = 0;
/// Binding of the object's uniform data within [`OBJECT_SET_INDEX`]
pub const OBJECT_UNIFORM_BINDING: u32 = 1;

/// Per-draw uniform data: this frame's and last frame's model matrix
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectRenderInfo {
    /// Model matrix, column-major
    pub model: [[f32; 4]; 4],
    /// Previous frame's model matrix, column-major
    pub previous_model: [[f32; 4]; 4],
}

impl ObjectRenderInfo {
    /// Pack both matrices
    pub fn new(model: &Mat4, previous_model: &Mat4) -> Self {
        Self {
            model: to_cols_array(model),
            previous_model: to_cols_array(previous_model),
        }
    }
}

/// Frame-scoped values a draw needs besides the component itself
pub struct DrawContext<'a> {
    /// Device the uniform slot is allocated from
    pub device: &'a dyn GpuDevice,
    /// Layout of the geometry pipeline
    pub layout: vk::PipelineLayout,
    /// Sampler paired with the texture
    pub sampler: vk::Sampler,
    /// Frames-in-flight slot being recorded
    pub frame_slot: usize,
    /// Number of frames-in-flight slots
    pub frames_in_flight: usize,
}

/// Mesh plus texture, drawn with one indexed draw
#[derive(Debug)]
pub struct RenderableComponent {
    name: String,
    mesh: GpuMesh,
    texture: Option<GpuImage>,
    uniforms: Option<GpuBuffer>,
    uniform_stride: vk::DeviceSize,
    previous_model: Option<Mat4>,
    destroyed: bool,
}

impl Default for RenderableComponent {
    fn default() -> Self {
        Self::new("renderable")
    }
}

impl RenderableComponent {
    /// Create with an empty mesh and no texture
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh: GpuMesh::default(),
            texture: None,
            uniforms: None,
            uniform_stride: 0,
            previous_model: None,
            destroyed: false,
        }
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the component
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Current mesh
    pub fn mesh(&self) -> &GpuMesh {
        &self.mesh
    }

    /// Current texture, if assigned
    pub fn texture(&self) -> Option<&GpuImage> {
        self.texture.as_ref()
    }

    /// Replace the mesh, destroying the previous one
    pub fn set_mesh(&mut self, device: &dyn GpuDevice, mesh: GpuMesh) {
        self.mesh.destroy(device);
        self.mesh = mesh;
    }

    /// Replace the texture, destroying the previous one
    pub fn set_texture(&mut self, device: &dyn GpuDevice, texture: GpuImage) {
        if let Some(mut old) = self.texture.replace(texture) {
            old.destroy(device);
        }
    }

    /// Pair `model` with the model matrix of the previous call
    ///
    /// The first call pairs the matrix with itself so a new object reports no
    /// motion.
    pub fn next_render_info(&mut self, model: Mat4) -> ObjectRenderInfo {
        let previous = self.previous_model.replace(model).unwrap_or(model);
        ObjectRenderInfo::new(&model, &previous)
    }

    /// Record this object's draw
    ///
    /// Returns the number of draw calls issued: 0 for an empty mesh, 1
    /// otherwise. Drawing geometry without a texture fails with
    /// [`RenderError::MissingTexture`].
    pub fn draw(
        &mut self,
        ctx: &DrawContext<'_>,
        encoder: &mut dyn CommandEncoder,
        info: &ObjectRenderInfo,
    ) -> RenderResult<u32> {
        if self.destroyed {
            return Err(RenderError::InvalidOperation {
                reason: format!("renderable '{}' drawn after destroy", self.name),
            });
        }
        if self.mesh.is_empty() {
            return Ok(0);
        }
        let texture_view = match &self.texture {
            Some(texture) => texture.view,
            None => {
                return Err(RenderError::MissingTexture {
                    name: self.name.clone(),
                })
            }
        };

        let offset = self.write_uniforms(ctx, info)?;
        let uniforms = self.uniforms.as_ref().map(|b| b.buffer).unwrap_or_default();

        encoder.push_descriptor_set(
            ctx.layout,
            OBJECT_SET_INDEX,
            &[
                (
                    TEXTURE_BINDING,
                    DescriptorResource::shader_read(texture_view, ctx.sampler),
                ),
                (
                    OBJECT_UNIFORM_BINDING,
                    DescriptorResource::UniformBuffer {
                        buffer: uniforms,
                        offset,
                        range: std::mem::size_of::<ObjectRenderInfo>() as vk::DeviceSize,
                    },
                ),
            ],
        );
        encoder.bind_vertex_buffer(self.mesh.vertex_buffer());
        encoder.bind_index_buffer(self.mesh.index_buffer());
        encoder.draw_indexed(self.mesh.index_count());
        Ok(1)
    }

    /// Write `info` into the region owned by the current frame slot, allocating on first use
    fn write_uniforms(&mut self, ctx: &DrawContext<'_>, info: &ObjectRenderInfo) -> RenderResult<vk::DeviceSize> {
        let slots = ctx.frames_in_flight.max(1) as vk::DeviceSize;
        if self.uniforms.is_none() {
            let stride = align_up(
                std::mem::size_of::<ObjectRenderInfo>() as vk::DeviceSize,
                ctx.device.min_uniform_alignment(),
            );
            let buffer = ctx
                .device
                .create_buffer(stride * slots, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
            log::debug!("Allocated uniform slot for '{}' ({} x {} bytes)", self.name, slots, stride);
            self.uniform_stride = stride;
            self.uniforms = Some(buffer);
        }

        let offset = self.uniform_stride * (ctx.frame_slot as vk::DeviceSize % slots);
        if let Some(buffer) = &self.uniforms {
            ctx.device.write_buffer(buffer, offset, bytemuck::bytes_of(info))?;
        }
        Ok(offset)
    }
}

impl Component for RenderableComponent {
    fn destroy(&mut self, device: &dyn GpuDevice) {
        if self.destroyed {
            return;
        }
        self.mesh.destroy(device);
        if let Some(mut texture) = self.texture.take() {
            texture.destroy(device);
        }
        if let Some(mut uniforms) = self.uniforms.take() {
            uniforms.destroy(device);
        }
        self.previous_model = None;
        self.destroyed = true;
        log::debug!("Destroyed renderable '{}'", self.name);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImageData;
    use crate::foundation::math::Vec3;
    use crate::render::Mesh;
    use crate::testing::{Command, DeviceCall, RecordingDevice, RecordingEncoder};
    use ash::vk::Handle;

    fn context(device: &RecordingDevice) -> DrawContext<'_> {
        DrawContext {
            device,
            layout: vk::PipelineLayout::from_raw(900),
            sampler: vk::Sampler::from_raw(901),
            frame_slot: 1,
            frames_in_flight: 2,
        }
    }

    fn textured(device: &RecordingDevice) -> RenderableComponent {
        let mut r = RenderableComponent::new("quad");
        r.set_mesh(device, GpuMesh::upload(device, &Mesh::fullscreen_quad()).unwrap());
        r.set_texture(
            device,
            device.create_texture(&ImageData::solid_color(1, 1, [255; 4]), "white").unwrap(),
        );
        r
    }

    #[test]
    fn test_empty_mesh_draws_nothing() {
        let device = RecordingDevice::new();
        let mut r = RenderableComponent::new("empty");
        let mut encoder = RecordingEncoder::new();
        let info = ObjectRenderInfo::new(&Mat4::identity(), &Mat4::identity());

        assert_eq!(r.draw(&context(&device), &mut encoder, &info).unwrap(), 0);
        assert!(encoder.commands().is_empty());
    }

    #[test]
    fn test_missing_texture_fails_fast() {
        let device = RecordingDevice::new();
        let mut r = RenderableComponent::new("untextured");
        r.set_mesh(&device, GpuMesh::upload(&device, &Mesh::fullscreen_quad()).unwrap());
        let mut encoder = RecordingEncoder::new();
        let info = ObjectRenderInfo::new(&Mat4::identity(), &Mat4::identity());

        let err = r.draw(&context(&device), &mut encoder, &info).unwrap_err();
        assert!(matches!(err, RenderError::MissingTexture { ref name } if name == "untextured"));
        assert_eq!(encoder.draw_count(), 0);
    }

    #[test]
    fn test_draw_issues_one_indexed_draw() {
        let device = RecordingDevice::new();
        let mut r = textured(&device);
        let mut encoder = RecordingEncoder::new();
        let info = ObjectRenderInfo::new(&Mat4::identity(), &Mat4::identity());

        assert_eq!(r.draw(&context(&device), &mut encoder, &info).unwrap(), 1);
        assert_eq!(encoder.indexed_draws(), vec![6]);
        let pushed = encoder
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::PushDescriptorSet { set_index, bindings, .. } => Some((*set_index, bindings.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(pushed.0, OBJECT_SET_INDEX);
        assert_eq!(pushed.1.len(), 2);
        assert_eq!(pushed.1[0].0, TEXTURE_BINDING);
        match pushed.1[1].1 {
            DescriptorResource::UniformBuffer { offset, .. } => {
                assert_eq!(offset, align_up(128, device.min_uniform_alignment()))
            }
            other => panic!("unexpected binding {:?}", other),
        }
    }

    #[test]
    fn test_uniform_slot_allocated_once() {
        let device = RecordingDevice::new();
        let mut r = textured(&device);
        let info = ObjectRenderInfo::new(&Mat4::identity(), &Mat4::identity());
        let before = device.created_buffer_count();

        for _ in 0..3 {
            r.draw(&context(&device), &mut RecordingEncoder::new(), &info).unwrap();
        }
        assert_eq!(device.created_buffer_count(), before + 1);
    }

    #[test]
    fn test_previous_model_tracks_last_call() {
        let mut r = RenderableComponent::new("moving");
        let a = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0));
        let b = Mat4::new_translation(&Vec3::new(2.0, 0.0, 0.0));

        let first = r.next_render_info(a);
        assert_eq!(first.model, first.previous_model);
        let second = r.next_render_info(b);
        assert_eq!(second.previous_model, to_cols_array(&a));
        assert_eq!(second.model, to_cols_array(&b));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let device = RecordingDevice::new();
        let mut r = textured(&device);
        r.draw(
            &context(&device),
            &mut RecordingEncoder::new(),
            &ObjectRenderInfo::new(&Mat4::identity(), &Mat4::identity()),
        )
        .unwrap();

        r.destroy(&device);
        let after_first = device.calls().len();
        r.destroy(&device);
        assert_eq!(device.calls().len(), after_first);
        assert!(r.is_destroyed());

        let calls = device.calls();
        let buffers = calls.iter().filter(|c| matches!(c, DeviceCall::DestroyBuffer(_))).count();
        let images = calls.iter().filter(|c| matches!(c, DeviceCall::DestroyImage(_))).count();
        assert_eq!(buffers, 3);
        assert_eq!(images, 1);
    }
}
