//! Device and command-recording seams
//!
//! The renderer talks to the GPU exclusively through two traits:
//!
//! - [`GpuDevice`] is the explicit, immutable device context. It is created
//!   by the application at startup, borrowed by every component and resource
//!   constructor, and outlives everything it creates.
//! - [`CommandEncoder`] records the per-frame command vocabulary into a
//!   command buffer handed out by the presentation service.
//!
//! [`crate::render::vulkan::VulkanContext`] implements both over `ash`.
//! Handles are plain `ash::vk` values so barrier and layout bookkeeping stays
//! in Vulkan terms regardless of the implementation behind the traits.

use ash::vk;

use crate::assets::ImageData;
use crate::render::descriptors::DescriptorResource;
use crate::render::error::RenderResult;
use crate::render::sync::ImageTransition;

/// Parameters for a device-local image with a single mip level and layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Usage flags the image is created with
    pub usage: vk::ImageUsageFlags,
    /// Aspect used for the default view and barriers
    pub aspect: vk::ImageAspectFlags,
    /// Debug name
    pub name: &'static str,
}

/// Owned image, its memory and default view
///
/// `destroy` is idempotent: it releases the handles once and leaves the
/// wrapper empty, so destroying an already-destroyed image is a no-op.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GpuImage {
    /// Image handle
    pub image: vk::Image,
    /// Default 2D view
    pub view: vk::ImageView,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Aspect of the default view
    pub aspect: vk::ImageAspectFlags,
}

impl GpuImage {
    /// Whether the wrapper holds no image
    pub fn is_null(&self) -> bool {
        self.image == vk::Image::null()
    }

    /// Release the image through `device`, leaving the wrapper empty
    pub fn destroy(&mut self, device: &dyn GpuDevice) {
        if self.is_null() {
            return;
        }
        device.destroy_image(self);
        *self = Self::default();
    }
}

/// Owned host-visible buffer and its memory
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GpuBuffer {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// Size in bytes
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    /// Whether the wrapper holds no buffer
    pub fn is_null(&self) -> bool {
        self.buffer == vk::Buffer::null()
    }

    /// Release the buffer through `device`, leaving the wrapper empty
    pub fn destroy(&mut self, device: &dyn GpuDevice) {
        if self.is_null() {
            return;
        }
        device.destroy_buffer(self);
        *self = Self::default();
    }
}

/// What happens to an attachment's contents when rendering begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction {
    /// Clear to a color
    ClearColor([f32; 4]),
    /// Clear to a depth value
    ClearDepth(f32),
    /// Preserve existing contents
    Load,
    /// Contents are fully overwritten
    DontCare,
}

/// One attachment of a dynamic rendering scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    /// View rendered into
    pub view: vk::ImageView,
    /// Layout the image is in while rendering
    pub layout: vk::ImageLayout,
    /// Load behaviour
    pub load: LoadAction,
}

impl Attachment {
    /// Color attachment in `COLOR_ATTACHMENT_OPTIMAL`
    pub fn color(view: vk::ImageView, load: LoadAction) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load,
        }
    }

    /// Depth attachment in `DEPTH_ATTACHMENT_OPTIMAL`
    pub fn depth(view: vk::ImageView, load: LoadAction) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load,
        }
    }
}

/// Targets of a dynamic rendering scope; every attachment is stored
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo<'a> {
    /// Render area, starting at the origin
    pub extent: vk::Extent2D,
    /// Color attachments in shader output order
    pub color: &'a [Attachment],
    /// Optional depth attachment
    pub depth: Option<Attachment>,
}

/// Per-frame command vocabulary
///
/// Implementations record into a command buffer; nothing executes until the
/// presentation service submits it.
pub trait CommandEncoder {
    /// Record an image memory barrier for the whole image
    fn image_barrier(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        transition: &ImageTransition,
    );

    /// Copy the full color extent of `src` (transfer-source) into `dst` (transfer-destination)
    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D);

    /// Begin a dynamic rendering scope
    fn begin_rendering(&mut self, info: &RenderingInfo<'_>);

    /// End the current rendering scope
    fn end_rendering(&mut self);

    /// Set a full-extent viewport and scissor
    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D);

    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);

    /// Bind a descriptor set to a graphics pipeline layout
    fn bind_descriptor_set(
        &mut self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    );

    /// Push descriptors into `set_index` without a descriptor set object
    fn push_descriptor_set(
        &mut self,
        layout: vk::PipelineLayout,
        set_index: u32,
        bindings: &[(u32, DescriptorResource)],
    );

    /// Update push constants
    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]);

    /// Bind a vertex buffer at binding 0, offset 0
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);

    /// Bind a 32-bit index buffer at offset 0
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);

    /// Issue an indexed draw of one instance
    fn draw_indexed(&mut self, index_count: u32);
}

/// Explicit device context shared by reference across the renderer
pub trait GpuDevice {
    /// Create a device-local image with a default view, left in `UNDEFINED` layout
    fn create_image(&self, desc: &ImageDesc) -> RenderResult<GpuImage>;

    /// Create a sampled RGBA8 sRGB texture from decoded pixels, left in `SHADER_READ_ONLY_OPTIMAL`
    fn create_texture(&self, data: &ImageData, name: &str) -> RenderResult<GpuImage>;

    /// Destroy an image, its view and memory
    fn destroy_image(&self, image: &GpuImage);

    /// Create a host-visible, host-coherent buffer
    fn create_buffer(&self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> RenderResult<GpuBuffer>;

    /// Write bytes into a host-visible buffer
    fn write_buffer(&self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> RenderResult<()>;

    /// Destroy a buffer and its memory
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    /// Overwrite bindings of a descriptor set
    fn write_descriptor_set(&self, set: vk::DescriptorSet, bindings: &[(u32, DescriptorResource)]);

    /// Minimum offset alignment for uniform buffer bindings
    fn min_uniform_alignment(&self) -> vk::DeviceSize;

    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> RenderResult<()>;

    /// Record commands into a one-shot command buffer, submit and wait for completion
    fn submit_immediate(&self, record: &mut dyn FnMut(&mut dyn CommandEncoder)) -> RenderResult<()>;

    /// Wrap a command buffer in the recording state
    fn encoder(&self, command_buffer: vk::CommandBuffer) -> Box<dyn CommandEncoder + '_>;

    /// Create a buffer and fill it with `data`
    fn create_buffer_with_data(&self, usage: vk::BufferUsageFlags, data: &[u8]) -> RenderResult<GpuBuffer> {
        let buffer = self.create_buffer(data.len() as vk::DeviceSize, usage)?;
        if let Err(e) = self.write_buffer(&buffer, 0, data) {
            self.destroy_buffer(&buffer);
            return Err(e);
        }
        Ok(buffer)
    }
}

/// Round `size` up to a multiple of `alignment` (a power of two, or zero)
pub fn align_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        size
    } else {
        (size + alignment - 1) & !(alignment - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(130, 0), 130);
    }

    #[test]
    fn test_default_wrappers_are_null() {
        assert!(GpuImage::default().is_null());
        assert!(GpuBuffer::default().is_null());
    }
}
