//! Collaborator interfaces
//!
//! These traits define the services the frame loop consumes but does not
//! implement: swapchain presentation, compiled pipelines and the UI overlay.
//! Applications provide implementations backed by their windowing and UI
//! libraries.

use ash::vk;

use crate::config::RenderSettings;
use crate::render::error::RenderResult;
use crate::render::frame::FrameStats;
use crate::render::gpu::CommandEncoder;

/// A swapchain image acquired for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTarget {
    /// Frames-in-flight slot this frame records into
    pub slot: usize,
    /// Swapchain image, handed over in `COLOR_ATTACHMENT_OPTIMAL`
    pub image: vk::Image,
    /// View of the swapchain image
    pub view: vk::ImageView,
    /// Size of the swapchain image
    pub extent: vk::Extent2D,
    /// Command buffer in the recording state
    pub command_buffer: vk::CommandBuffer,
}

/// Presentation service: swapchain acquire, submit and present
pub trait FramePresenter {
    /// Current drawable surface size
    fn surface_size(&self) -> vk::Extent2D;

    /// Format of the swapchain images
    fn color_format(&self) -> vk::Format;

    /// Number of frames that may be recorded while earlier ones execute
    fn frames_in_flight(&self) -> usize;

    /// Request a present mode with or without vertical sync
    ///
    /// Takes effect once the caller rebuilds resolution-dependent resources.
    fn set_vsync(&mut self, enabled: bool);

    /// Wait for the slot's previous work, acquire an image and begin recording
    ///
    /// Returns `None` when the frame must be skipped, for example because the
    /// swapchain is out of date.
    fn begin_frame(&mut self) -> RenderResult<Option<FrameTarget>>;

    /// Finish recording, submit and present
    fn end_frame(&mut self, target: &FrameTarget) -> RenderResult<()>;

    /// Rebuild the swapchain after a size or present mode change
    ///
    /// The device is idle when this is called.
    fn recreate(&mut self) -> RenderResult<()>;
}

/// Compiled pipeline objects the passes bind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineHandles {
    /// Geometry pass pipeline
    pub geometry: vk::Pipeline,
    /// Geometry pass layout: set 0 frame transforms, set 1 pushed per object
    pub geometry_layout: vk::PipelineLayout,
    /// Descriptor set holding the frame transform block
    pub frame_set: vk::DescriptorSet,
    /// Post-process pipeline
    pub post_process: vk::Pipeline,
    /// Post-process layout with a fragment push constant range
    pub post_process_layout: vk::PipelineLayout,
    /// Descriptor set with the post-process inputs
    pub post_process_set: vk::DescriptorSet,
    /// Linear clamp sampler
    pub linear_sampler: vk::Sampler,
}

/// Immediate-mode UI drawn over the final image
pub trait UiOverlay {
    /// Lay out widgets for this frame; widgets may edit `settings`
    fn build(&mut self, settings: &mut RenderSettings, stats: &FrameStats);

    /// Record draw commands inside the UI pass
    fn record(&mut self, encoder: &mut dyn CommandEncoder, extent: vk::Extent2D);
}

/// Overlay that draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUi;

impl UiOverlay for NoUi {
    fn build(&mut self, _settings: &mut RenderSettings, _stats: &FrameStats) {}

    fn record(&mut self, _encoder: &mut dyn CommandEncoder, _extent: vk::Extent2D) {}
}
