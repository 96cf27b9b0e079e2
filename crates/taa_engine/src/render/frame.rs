//! Per-frame command recording
//!
//! [`FrameOrchestrator`] owns the resources every frame touches and records
//! the fixed pass sequence into the presenter's command buffer:
//!
//! ```text
//! geometry -> copy to post-process -> post-process -> save history -> UI -> present
//! ```
//!
//! Every image transition between passes goes through the [`LayoutTracker`],
//! so a transition that does not match the image's recorded layout fails the
//! frame instead of racing on the GPU.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::config::RenderSettings;
use crate::foundation::math::{to_cols_array, Mat4};
use crate::render::descriptors::{DescriptorResource, DescriptorTable};
use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::{align_up, Attachment, CommandEncoder, GpuBuffer, GpuDevice, LoadAction, RenderingInfo};
use crate::render::mesh::{GpuMesh, Mesh};
use crate::render::presenter::{FrameTarget, PipelineHandles, UiOverlay};
use crate::render::sync::{ImageTransition, LayoutTracker};
use crate::render::targets::ResolutionTargets;
use crate::scene::{DrawContext, Scene};

/// Descriptor set index of the frame transform block
pub const FRAME_SET_INDEX: u32 = 0;
/// Binding of the frame transform block within [`FRAME_SET_INDEX`]
pub const FRAME_TRANSFORM_BINDING: u32 = 0;

const MOTION_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
const DEPTH_CLEAR: f32 = 1.0;

/// Camera transform for this frame and the previous one
///
/// `previous` for frame N is `current` from frame N-1, which lets the
/// geometry pass derive per-pixel motion.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameTransformBlock {
    /// Projection x view for the frame being recorded, column-major
    pub current: [[f32; 4]; 4],
    /// Projection x view of the previous frame, column-major
    pub previous: [[f32; 4]; 4],
}

impl FrameTransformBlock {
    /// Start with both matrices equal to `initial`
    pub fn new(initial: &Mat4) -> Self {
        let m = to_cols_array(initial);
        Self { current: m, previous: m }
    }

    /// Replace the current matrix
    pub fn set_current(&mut self, matrix: &Mat4) {
        self.current = to_cols_array(matrix);
    }

    /// Make the current matrix the next frame's previous
    pub fn advance(&mut self) {
        self.previous = self.current;
    }
}

/// Push constants of the post-process pass
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PostProcessConstants {
    /// Antialiasing mode, see [`crate::config::AntialiasingMode::shader_value`]
    pub mode: u32,
    /// Edge threshold of the spatial mode
    pub threshold: f32,
    /// Monotonic frame counter
    pub frame_index: u32,
}

impl PostProcessConstants {
    /// Constants for `settings` at `frame_index`
    pub fn from_settings(settings: &RenderSettings, frame_index: u32) -> Self {
        Self {
            mode: settings.antialiasing.shader_value(),
            threshold: settings.fxaa_threshold,
            frame_index,
        }
    }
}

/// Timing shown by the UI overlay
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frames recorded so far
    pub frame_index: u64,
    /// Wall-clock seconds of the last frame
    pub delta_seconds: f64,
    /// Frames per second estimated from the last delta
    pub fps: f64,
}

/// Counts reported by one recorded frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Draw calls issued by the geometry pass
    pub geometry_draws: u32,
}

/// Owner of frame-shared GPU state and the pass sequence
pub struct FrameOrchestrator {
    pipelines: PipelineHandles,
    targets: ResolutionTargets,
    tracker: LayoutTracker,
    frame_descriptors: DescriptorTable,
    post_descriptors: DescriptorTable,
    frame_uniforms: GpuBuffer,
    frame_uniform_stride: vk::DeviceSize,
    frames_in_flight: usize,
    transforms: FrameTransformBlock,
    quad: GpuMesh,
    clear_color: [f32; 4],
    frame_index: u32,
}

impl FrameOrchestrator {
    /// Allocate the frame transform buffer and the full-screen quad
    ///
    /// Resolution-dependent targets start released; call
    /// [`FrameOrchestrator::restore`] before the first frame.
    pub fn new(
        device: &dyn GpuDevice,
        pipelines: PipelineHandles,
        frames_in_flight: usize,
        clear_color: [f32; 4],
    ) -> RenderResult<Self> {
        let frames_in_flight = frames_in_flight.max(1);
        let block_size = std::mem::size_of::<FrameTransformBlock>() as vk::DeviceSize;
        let stride = align_up(block_size, device.min_uniform_alignment());
        let frame_uniforms = device.create_buffer(
            stride * frames_in_flight as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        let quad = match GpuMesh::upload(device, &Mesh::fullscreen_quad()) {
            Ok(quad) => quad,
            Err(e) => {
                device.destroy_buffer(&frame_uniforms);
                return Err(e);
            }
        };

        let mut frame_descriptors = DescriptorTable::new(pipelines.frame_set);
        frame_descriptors.bind(
            FRAME_TRANSFORM_BINDING,
            DescriptorResource::UniformBufferDynamic {
                buffer: frame_uniforms.buffer,
                range: block_size,
            },
        );
        frame_descriptors.flush(device);

        log::debug!(
            "Frame orchestrator ready: {} frame(s) in flight, transform stride {} bytes",
            frames_in_flight,
            stride
        );

        Ok(Self {
            pipelines,
            targets: ResolutionTargets::new(),
            tracker: LayoutTracker::new(),
            frame_descriptors,
            post_descriptors: DescriptorTable::new(pipelines.post_process_set),
            frame_uniforms,
            frame_uniform_stride: stride,
            frames_in_flight,
            transforms: FrameTransformBlock::new(&Mat4::identity()),
            quad,
            clear_color,
            frame_index: 0,
        })
    }

    /// Resolution-dependent images
    pub fn targets(&self) -> &ResolutionTargets {
        &self.targets
    }

    /// Bindings of the post-process descriptor set
    pub fn post_process_descriptors(&self) -> &DescriptorTable {
        &self.post_descriptors
    }

    /// Frame transform block as of the last recorded frame
    pub fn transforms(&self) -> &FrameTransformBlock {
        &self.transforms
    }

    /// Layout tracker
    pub fn tracker(&self) -> &LayoutTracker {
        &self.tracker
    }

    /// Number of frames recorded
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Set this frame's projection x view matrix
    pub fn set_view_projection(&mut self, matrix: &Mat4) {
        self.transforms.set_current(matrix);
    }

    /// Create resolution-dependent targets at `extent`
    pub fn restore(&mut self, device: &dyn GpuDevice, extent: vk::Extent2D, color_format: vk::Format) -> RenderResult<()> {
        self.targets.restore(
            device,
            &mut self.tracker,
            &mut self.post_descriptors,
            self.pipelines.linear_sampler,
            extent,
            color_format,
        )
    }

    /// Destroy resolution-dependent targets
    pub fn release(&mut self, device: &dyn GpuDevice) {
        self.targets.release(device, &mut self.tracker);
    }

    /// Record a full frame into `target`'s command buffer
    ///
    /// The transform block advances after recording completes, whether or
    /// not the scene drew anything.
    pub fn draw_frame(
        &mut self,
        device: &dyn GpuDevice,
        target: &FrameTarget,
        scene: &mut Scene,
        settings: &RenderSettings,
        ui: &mut dyn UiOverlay,
    ) -> RenderResult<FrameReport> {
        if !self.targets.is_ready() {
            return Err(RenderError::ResourcesReleased);
        }
        if target.extent != self.targets.extent() {
            return Err(RenderError::InvalidOperation {
                reason: format!(
                    "frame target is {}x{} but render targets are {}x{}",
                    target.extent.width,
                    target.extent.height,
                    self.targets.extent().width,
                    self.targets.extent().height
                ),
            });
        }

        let slot = target.slot % self.frames_in_flight;
        let uniform_offset = self.frame_uniform_stride * slot as vk::DeviceSize;
        device.write_buffer(&self.frame_uniforms, uniform_offset, bytemuck::bytes_of(&self.transforms))?;

        let mut encoder = device.encoder(target.command_buffer);
        let encoder = encoder.as_mut();
        self.tracker.assume(target.image, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let geometry_draws = self.record_geometry(device, encoder, target, scene, slot, uniform_offset as u32)?;
        self.record_copy_to_post_process(encoder, target)?;
        self.record_post_process(encoder, target, settings)?;
        self.record_save_history(encoder, target)?;
        self.record_ui(encoder, target, settings, ui)?;
        self.tracker.transition(
            encoder,
            target.image,
            vk::ImageAspectFlags::COLOR,
            &ImageTransition::PRESENT_READY,
        )?;
        // swapchain images are re-assumed every frame and replaced on recreate
        self.tracker.forget(target.image);

        self.transforms.advance();
        self.frame_index = self.frame_index.wrapping_add(1);
        log::trace!("Recorded frame {} ({} geometry draws)", self.frame_index, geometry_draws);
        Ok(FrameReport { geometry_draws })
    }

    fn record_geometry(
        &mut self,
        device: &dyn GpuDevice,
        encoder: &mut dyn CommandEncoder,
        target: &FrameTarget,
        scene: &mut Scene,
        slot: usize,
        uniform_offset: u32,
    ) -> RenderResult<u32> {
        self.reuse_depth(encoder)?;
        let color = [
            Attachment::color(target.view, LoadAction::ClearColor(self.clear_color)),
            Attachment::color(self.targets.motion().view, LoadAction::ClearColor(MOTION_CLEAR)),
        ];
        encoder.begin_rendering(&RenderingInfo {
            extent: target.extent,
            color: &color,
            depth: Some(Attachment::depth(
                self.targets.depth().view,
                LoadAction::ClearDepth(DEPTH_CLEAR),
            )),
        });
        encoder.set_viewport_and_scissor(target.extent);
        encoder.bind_pipeline(self.pipelines.geometry);
        encoder.bind_descriptor_set(
            self.pipelines.geometry_layout,
            FRAME_SET_INDEX,
            self.frame_descriptors.set(),
            &[uniform_offset],
        );

        let ctx = DrawContext {
            device,
            layout: self.pipelines.geometry_layout,
            sampler: self.pipelines.linear_sampler,
            frame_slot: slot,
            frames_in_flight: self.frames_in_flight,
        };
        let mut draws = 0;
        for id in scene.object_ids() {
            let Some(model) = scene.get_transform(id).map(|t| t.model_matrix()) else {
                continue;
            };
            let Some(renderable) = scene.get_renderable_mut(id) else {
                continue;
            };
            let info = renderable.next_render_info(model);
            draws += renderable.draw(&ctx, encoder, &info)?;
        }

        encoder.end_rendering();
        Ok(draws)
    }

    fn record_copy_to_post_process(&mut self, encoder: &mut dyn CommandEncoder, target: &FrameTarget) -> RenderResult<()> {
        let post_process = self.targets.post_process().image;
        self.copy_color(encoder, target, post_process)?;
        self.tracker.transition(
            encoder,
            self.targets.motion().image,
            vk::ImageAspectFlags::COLOR,
            &ImageTransition::ATTACHMENT_TO_SHADER_READ,
        )
    }

    fn record_post_process(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        target: &FrameTarget,
        settings: &RenderSettings,
    ) -> RenderResult<()> {
        self.post_descriptors.ensure_flushed()?;

        let color = [Attachment::color(target.view, LoadAction::DontCare)];
        encoder.begin_rendering(&RenderingInfo {
            extent: target.extent,
            color: &color,
            depth: None,
        });
        encoder.set_viewport_and_scissor(target.extent);
        encoder.bind_pipeline(self.pipelines.post_process);
        encoder.bind_descriptor_set(
            self.pipelines.post_process_layout,
            0,
            self.post_descriptors.set(),
            &[],
        );
        let constants = PostProcessConstants::from_settings(settings, self.frame_index);
        encoder.push_constants(
            self.pipelines.post_process_layout,
            vk::ShaderStageFlags::FRAGMENT,
            bytemuck::bytes_of(&constants),
        );
        encoder.bind_vertex_buffer(self.quad.vertex_buffer());
        encoder.bind_index_buffer(self.quad.index_buffer());
        encoder.draw_indexed(self.quad.index_count());
        encoder.end_rendering();

        self.tracker.transition(
            encoder,
            self.targets.motion().image,
            vk::ImageAspectFlags::COLOR,
            &ImageTransition::SHADER_READ_TO_ATTACHMENT,
        )
    }

    fn record_save_history(&mut self, encoder: &mut dyn CommandEncoder, target: &FrameTarget) -> RenderResult<()> {
        let history = self.targets.history().image;
        self.copy_color(encoder, target, history)
    }

    fn record_ui(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        target: &FrameTarget,
        settings: &RenderSettings,
        ui: &mut dyn UiOverlay,
    ) -> RenderResult<()> {
        self.reuse_depth(encoder)?;
        let color = [Attachment::color(target.view, LoadAction::Load)];
        encoder.begin_rendering(&RenderingInfo {
            extent: target.extent,
            color: &color,
            depth: Some(Attachment::depth(self.targets.depth().view, LoadAction::Load)),
        });
        if settings.show_ui {
            ui.record(encoder, target.extent);
        }
        encoder.end_rendering();
        Ok(())
    }

    /// Order earlier depth writes before the next rendering scope touches the depth image
    fn reuse_depth(&mut self, encoder: &mut dyn CommandEncoder) -> RenderResult<()> {
        let depth = self.targets.depth().image;
        self.tracker.transition(
            encoder,
            depth,
            vk::ImageAspectFlags::DEPTH,
            &ImageTransition::DEPTH_ATTACHMENT_REUSE,
        )
    }

    /// Copy the swapchain image into a sampled image and return both to their working layouts
    fn copy_color(&mut self, encoder: &mut dyn CommandEncoder, target: &FrameTarget, dst: vk::Image) -> RenderResult<()> {
        let color = vk::ImageAspectFlags::COLOR;
        self.tracker.transition(encoder, target.image, color, &ImageTransition::COPY_SOURCE)?;
        self.tracker.transition(encoder, dst, color, &ImageTransition::COPY_DESTINATION)?;
        encoder.copy_image(target.image, dst, target.extent);
        self.tracker.transition(encoder, dst, color, &ImageTransition::SHADER_READ_AFTER_COPY)?;
        self.tracker.transition(encoder, target.image, color, &ImageTransition::COLOR_ATTACHMENT_READY)
    }

    /// Release everything the orchestrator owns
    pub fn destroy(&mut self, device: &dyn GpuDevice) {
        self.release(device);
        self.quad.destroy(device);
        self.frame_uniforms.destroy(device);
    }
}
