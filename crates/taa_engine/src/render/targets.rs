//! Resolution-dependent render targets
//!
//! Depth, post-process, history and motion-vector images share the output
//! resolution and are created and destroyed as one unit. Whenever they are
//! recreated the post-process descriptor set is repointed at the new views in
//! the same operation.

use ash::vk;

use crate::render::descriptors::{DescriptorResource, DescriptorTable};
use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::{CommandEncoder, GpuDevice, GpuImage, ImageDesc};
use crate::render::sync::{ImageTransition, LayoutTracker};

/// Depth buffer format
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
/// Motion vector format: screen-space delta in two half floats
pub const MOTION_VECTOR_FORMAT: vk::Format = vk::Format::R16G16_SFLOAT;

/// Post-process binding of the current frame's color
pub const POST_PROCESS_COLOR_BINDING: u32 = 0;
/// Post-process binding of the previous frame's color
pub const POST_PROCESS_HISTORY_BINDING: u32 = 1;
/// Post-process binding of the motion vectors
pub const POST_PROCESS_MOTION_BINDING: u32 = 2;

/// The four images tied to the output resolution
#[derive(Debug)]
pub struct ResolutionTargets {
    depth: GpuImage,
    post_process: GpuImage,
    history: GpuImage,
    motion: GpuImage,
    extent: vk::Extent2D,
}

impl Default for ResolutionTargets {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionTargets {
    /// Create in the released state
    pub fn new() -> Self {
        Self {
            depth: GpuImage::default(),
            post_process: GpuImage::default(),
            history: GpuImage::default(),
            motion: GpuImage::default(),
            extent: vk::Extent2D::default(),
        }
    }

    /// Whether all four images exist
    pub fn is_ready(&self) -> bool {
        !self.depth.is_null() && !self.post_process.is_null() && !self.history.is_null() && !self.motion.is_null()
    }

    /// Resolution the images were created at
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Depth attachment
    pub fn depth(&self) -> &GpuImage {
        &self.depth
    }

    /// Copy of the geometry output sampled by the post-process pass
    pub fn post_process(&self) -> &GpuImage {
        &self.post_process
    }

    /// Previous frame's final color
    pub fn history(&self) -> &GpuImage {
        &self.history
    }

    /// Motion vector attachment
    pub fn motion(&self) -> &GpuImage {
        &self.motion
    }

    /// Create all four images at `extent`, move them to their initial layouts
    /// and rewrite the post-process bindings
    ///
    /// On failure everything created so far is destroyed again, so the set is
    /// never left partially populated.
    pub fn restore(
        &mut self,
        device: &dyn GpuDevice,
        tracker: &mut LayoutTracker,
        descriptors: &mut DescriptorTable,
        sampler: vk::Sampler,
        extent: vk::Extent2D,
        color_format: vk::Format,
    ) -> RenderResult<()> {
        if self.is_ready() {
            return Err(RenderError::InvalidOperation {
                reason: "resolution targets restored without release".to_string(),
            });
        }
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::InvalidOperation {
                reason: format!("cannot create render targets at {}x{}", extent.width, extent.height),
            });
        }

        log::info!("Creating render targets at {}x{}", extent.width, extent.height);
        if let Err(e) = self.create_images(device, extent, color_format) {
            self.release(device, tracker);
            return Err(e);
        }
        if let Err(e) = self.initialize_layouts(device, tracker) {
            self.release(device, tracker);
            return Err(e);
        }
        self.extent = extent;

        descriptors.bind(
            POST_PROCESS_COLOR_BINDING,
            DescriptorResource::shader_read(self.post_process.view, sampler),
        );
        descriptors.bind(
            POST_PROCESS_HISTORY_BINDING,
            DescriptorResource::shader_read(self.history.view, sampler),
        );
        descriptors.bind(
            POST_PROCESS_MOTION_BINDING,
            DescriptorResource::shader_read(self.motion.view, sampler),
        );
        descriptors.flush(device);
        Ok(())
    }

    /// Destroy all four images; a no-op for images already released
    ///
    /// The caller must have waited for the device to go idle.
    pub fn release(&mut self, device: &dyn GpuDevice, tracker: &mut LayoutTracker) {
        if self.is_ready() {
            log::info!("Releasing render targets ({}x{})", self.extent.width, self.extent.height);
        }
        for image in [&mut self.depth, &mut self.post_process, &mut self.history, &mut self.motion] {
            tracker.forget(image.image);
            image.destroy(device);
        }
        self.extent = vk::Extent2D::default();
    }

    fn create_images(&mut self, device: &dyn GpuDevice, extent: vk::Extent2D, color_format: vk::Format) -> RenderResult<()> {
        self.depth = device.create_image(&ImageDesc {
            extent,
            format: DEPTH_FORMAT,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            name: "depth",
        })?;
        self.post_process = device.create_image(&ImageDesc {
            extent,
            format: color_format,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "post-process",
        })?;
        self.history = device.create_image(&ImageDesc {
            extent,
            format: color_format,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "history",
        })?;
        self.motion = device.create_image(&ImageDesc {
            extent,
            format: MOTION_VECTOR_FORMAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "motion-vectors",
        })?;
        Ok(())
    }

    fn initialize_layouts(&self, device: &dyn GpuDevice, tracker: &mut LayoutTracker) -> RenderResult<()> {
        let initial = [
            (&self.depth, ImageTransition::INITIAL_DEPTH),
            (&self.history, ImageTransition::INITIAL_SHADER_READ),
            (&self.motion, ImageTransition::INITIAL_COLOR_ATTACHMENT),
        ];
        for (image, transition) in &initial {
            tracker.check(image.image, transition)?;
        }

        device.submit_immediate(&mut |encoder: &mut dyn CommandEncoder| {
            for (image, transition) in &initial {
                encoder.image_barrier(image.image, image.aspect, transition);
            }
        })?;

        for (image, transition) in &initial {
            tracker.assume(image.image, transition.new_layout);
        }
        Ok(())
    }
}
