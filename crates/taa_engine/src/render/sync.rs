//! Image barrier policy and layout tracking
//!
//! Every image transition the frame orchestrator records is one of the named
//! [`ImageTransition`] constants below. Each constant fixes the source and
//! destination pipeline stages, access masks and layouts, so a pass never
//! assembles a barrier ad hoc.
//!
//! [`LayoutTracker`] keeps the last recorded layout of each image and refuses
//! to record a transition whose source layout does not match. A transition
//! from `UNDEFINED` is accepted from any state since it discards contents.
//!
//! ## Frame sequence
//!
//! ```text
//! swapchain:  attachment -> COPY_SOURCE -> COLOR_ATTACHMENT_READY -> ... -> PRESENT_READY
//! postproc:   COPY_DESTINATION -> SHADER_READ_AFTER_COPY
//! history:    COPY_DESTINATION -> SHADER_READ_AFTER_COPY
//! motion:     ATTACHMENT_TO_SHADER_READ -> SHADER_READ_TO_ATTACHMENT
//! ```

use std::collections::HashMap;

use ash::vk;

use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::CommandEncoder;

const fn stages(a: vk::PipelineStageFlags, b: vk::PipelineStageFlags) -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::from_raw(a.as_raw() | b.as_raw())
}

const fn access(a: vk::AccessFlags, b: vk::AccessFlags) -> vk::AccessFlags {
    vk::AccessFlags::from_raw(a.as_raw() | b.as_raw())
}

/// A fully specified image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    /// Name used in logs and errors
    pub name: &'static str,
    /// Stages that must complete before the transition
    pub src_stage: vk::PipelineStageFlags,
    /// Writes made available by the transition
    pub src_access: vk::AccessFlags,
    /// Layout the image is expected to be in
    pub old_layout: vk::ImageLayout,
    /// Stages that wait on the transition
    pub dst_stage: vk::PipelineStageFlags,
    /// Accesses the transition makes the image visible to
    pub dst_access: vk::AccessFlags,
    /// Layout after the transition
    pub new_layout: vk::ImageLayout,
}

impl ImageTransition {
    /// Rendered color image about to be read by a copy
    pub const COPY_SOURCE: Self = Self {
        name: "copy-source",
        src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
        dst_access: vk::AccessFlags::TRANSFER_READ,
        new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    };

    /// Sampled image about to be overwritten by a copy; prior contents are discarded
    pub const COPY_DESTINATION: Self = Self {
        name: "copy-destination",
        src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        src_access: vk::AccessFlags::empty(),
        old_layout: vk::ImageLayout::UNDEFINED,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    };

    /// Copy destination made readable by fragment shaders
    pub const SHADER_READ_AFTER_COPY: Self = Self {
        name: "shader-read-after-copy",
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        dst_access: vk::AccessFlags::SHADER_READ,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };

    /// Copy source returned to color attachment use
    pub const COLOR_ATTACHMENT_READY: Self = Self {
        name: "color-attachment-ready",
        src_stage: vk::PipelineStageFlags::TRANSFER,
        src_access: vk::AccessFlags::empty(),
        old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access: access(
            vk::AccessFlags::COLOR_ATTACHMENT_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };

    /// Final color image handed to presentation
    pub const PRESENT_READY: Self = Self {
        name: "present-ready",
        src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        dst_access: vk::AccessFlags::empty(),
        new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
    };

    /// Color attachment written by one pass and sampled by the next
    pub const ATTACHMENT_TO_SHADER_READ: Self = Self {
        name: "attachment-to-shader-read",
        src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        dst_access: vk::AccessFlags::SHADER_READ,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };

    /// Sampled image returned to color attachment use
    pub const SHADER_READ_TO_ATTACHMENT: Self = Self {
        name: "shader-read-to-attachment",
        src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        src_access: vk::AccessFlags::empty(),
        old_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };

    /// Depth attachment handed from one rendering scope to the next
    ///
    /// Orders the previous scope's depth writes before the next scope's
    /// load, clear or test.
    pub const DEPTH_ATTACHMENT_REUSE: Self = Self {
        name: "depth-attachment-reuse",
        src_stage: vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        src_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        old_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        dst_stage: stages(
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        dst_access: access(
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        new_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    };

    /// Freshly created depth image made usable as a depth attachment
    pub const INITIAL_DEPTH: Self = Self {
        name: "initial-depth",
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        src_access: vk::AccessFlags::empty(),
        old_layout: vk::ImageLayout::UNDEFINED,
        dst_stage: stages(
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        dst_access: access(
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        new_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    };

    /// Freshly created history image made sampleable
    pub const INITIAL_SHADER_READ: Self = Self {
        name: "initial-shader-read",
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        src_access: vk::AccessFlags::empty(),
        old_layout: vk::ImageLayout::UNDEFINED,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        dst_access: vk::AccessFlags::SHADER_READ,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };

    /// Freshly created motion-vector image made usable as a color attachment
    pub const INITIAL_COLOR_ATTACHMENT: Self = Self {
        name: "initial-color-attachment",
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        src_access: vk::AccessFlags::empty(),
        old_layout: vk::ImageLayout::UNDEFINED,
        dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };

    /// Build the Vulkan barrier for `image` covering its single mip and layer
    pub fn to_barrier(&self, image: vk::Image, aspect: vk::ImageAspectFlags) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build()
    }
}

/// Last recorded layout per image
///
/// Layouts are tracked in recording order, which matches execution order on
/// the single graphics queue the renderer submits to.
#[derive(Debug, Default)]
pub struct LayoutTracker {
    layouts: HashMap<vk::Image, vk::ImageLayout>,
}

impl LayoutTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `image` is known to be in `layout` without emitting a barrier
    pub fn assume(&mut self, image: vk::Image, layout: vk::ImageLayout) {
        self.layouts.insert(image, layout);
    }

    /// Stop tracking `image`
    pub fn forget(&mut self, image: vk::Image) {
        self.layouts.remove(&image);
    }

    /// Number of images currently tracked
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Whether no image is tracked
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Last recorded layout of `image`, `UNDEFINED` if untracked
    pub fn layout(&self, image: vk::Image) -> vk::ImageLayout {
        self.layouts
            .get(&image)
            .copied()
            .unwrap_or(vk::ImageLayout::UNDEFINED)
    }

    /// Validate that `transition` may be applied to `image`
    pub fn check(&self, image: vk::Image, transition: &ImageTransition) -> RenderResult<()> {
        let actual = self.layout(image);
        if transition.old_layout == vk::ImageLayout::UNDEFINED || transition.old_layout == actual {
            Ok(())
        } else {
            Err(RenderError::LayoutMismatch {
                image,
                expected: transition.old_layout,
                actual,
            })
        }
    }

    /// Validate, record the barrier into `encoder` and update the tracked layout
    pub fn transition(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        transition: &ImageTransition,
    ) -> RenderResult<()> {
        self.check(image, transition)?;
        log::trace!("Image {:?}: {}", image, transition.name);
        encoder.image_barrier(image, aspect, transition);
        self.layouts.insert(image, transition.new_layout);
        Ok(())
    }
}
