//! Command recording over `ash`

use ash::extensions::khr::PushDescriptor;
use ash::{vk, Device};

use crate::render::descriptors::DescriptorResource;
use crate::render::error::RenderResult;
use crate::render::gpu::{Attachment, CommandEncoder, LoadAction, RenderingInfo};
use crate::render::sync::ImageTransition;
use crate::render::vulkan::sync::Fence;

/// Pool, command buffer and fence for blocking one-shot submissions
pub struct ImmediateCommands {
    device: Device,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: Fence,
}

impl ImmediateCommands {
    /// Create on the given queue family
    pub fn new(device: Device, queue_family_index: u32) -> RenderResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let allocated = unsafe { device.allocate_command_buffers(&alloc_info) }.and_then(|buffers| {
            buffers
                .first()
                .copied()
                .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
        });
        let command_buffer = match allocated {
            Ok(cb) => cb,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(e.into());
            }
        };

        let fence = match Fence::new(device.clone(), false) {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            pool,
            command_buffer,
            fence,
        })
    }

    /// Record with `record`, submit to `queue` and wait for completion
    pub fn run(&self, queue: vk::Queue, record: impl FnOnce(vk::CommandBuffer)) -> RenderResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
            self.device.begin_command_buffer(self.command_buffer, &begin_info)?;
        }

        record(self.command_buffer);

        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe {
            self.device.end_command_buffer(self.command_buffer)?;
            self.device
                .queue_submit(queue, &[submit_info], self.fence.handle())?;
        }
        self.fence.wait(u64::MAX)?;
        self.fence.reset()
    }
}

impl Drop for ImmediateCommands {
    fn drop(&mut self) {
        unsafe {
            teardown_step("Device wait before destroying immediate command pool", self.device.device_wait_idle());
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Log a failed step of a teardown that has to continue regardless
///
/// Returns whether the step succeeded.
fn teardown_step(step: &str, result: Result<(), vk::Result>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{} failed: {}", step, e);
            false
        }
    }
}

/// Descriptor payloads kept alive while writes referencing them are in use
pub(crate) enum DescriptorInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
}

pub(crate) fn descriptor_infos(bindings: &[(u32, DescriptorResource)]) -> Vec<DescriptorInfo> {
    bindings
        .iter()
        .map(|(_, resource)| match *resource {
            DescriptorResource::SampledImage { view, layout, sampler } => DescriptorInfo::Image(vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            }),
            DescriptorResource::UniformBuffer { buffer, offset, range } => {
                DescriptorInfo::Buffer(vk::DescriptorBufferInfo { buffer, offset, range })
            }
            DescriptorResource::UniformBufferDynamic { buffer, range } => {
                DescriptorInfo::Buffer(vk::DescriptorBufferInfo { buffer, offset: 0, range })
            }
        })
        .collect()
}

/// Build writes for `bindings`; the result borrows from `infos`
pub(crate) fn descriptor_writes(
    set: vk::DescriptorSet,
    bindings: &[(u32, DescriptorResource)],
    infos: &[DescriptorInfo],
) -> Vec<vk::WriteDescriptorSet> {
    bindings
        .iter()
        .zip(infos)
        .map(|((binding, resource), info)| {
            let write = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(resource.descriptor_type());
            match info {
                DescriptorInfo::Image(image) => write.image_info(std::slice::from_ref(image)).build(),
                DescriptorInfo::Buffer(buffer) => write.buffer_info(std::slice::from_ref(buffer)).build(),
            }
        })
        .collect()
}

fn attachment_info(attachment: &Attachment) -> vk::RenderingAttachmentInfo {
    let (load_op, clear_value) = match attachment.load {
        LoadAction::ClearColor(color) => (
            vk::AttachmentLoadOp::CLEAR,
            vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
        ),
        LoadAction::ClearDepth(depth) => (
            vk::AttachmentLoadOp::CLEAR,
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
        ),
        LoadAction::Load => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
        LoadAction::DontCare => (vk::AttachmentLoadOp::DONT_CARE, vk::ClearValue::default()),
    };
    vk::RenderingAttachmentInfo::builder()
        .image_view(attachment.view)
        .image_layout(attachment.layout)
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(clear_value)
        .build()
}

/// [`CommandEncoder`] recording into a Vulkan command buffer
pub struct VulkanEncoder<'a> {
    device: &'a Device,
    push_descriptor: &'a PushDescriptor,
    command_buffer: vk::CommandBuffer,
}

impl<'a> VulkanEncoder<'a> {
    /// Wrap a command buffer that is already recording
    pub fn new(device: &'a Device, push_descriptor: &'a PushDescriptor, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            push_descriptor,
            command_buffer,
        }
    }
}

impl CommandEncoder for VulkanEncoder<'_> {
    fn image_barrier(&mut self, image: vk::Image, aspect: vk::ImageAspectFlags, transition: &ImageTransition) {
        let barrier = transition.to_barrier(image, aspect);
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D) {
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        unsafe {
            self.device.cmd_copy_image(
                self.command_buffer,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) {
        let color: Vec<vk::RenderingAttachmentInfo> = info.color.iter().map(attachment_info).collect();
        let depth = info.depth.as_ref().map(attachment_info);
        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: info.extent,
            })
            .layer_count(1)
            .color_attachments(&color);
        if let Some(depth) = depth.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        unsafe {
            self.device.cmd_begin_rendering(self.command_buffer, &rendering_info);
        }
    }

    fn end_rendering(&mut self) {
        unsafe {
            self.device.cmd_end_rendering(self.command_buffer);
        }
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn bind_descriptor_set(
        &mut self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                dynamic_offsets,
            );
        }
    }

    fn push_descriptor_set(
        &mut self,
        layout: vk::PipelineLayout,
        set_index: u32,
        bindings: &[(u32, DescriptorResource)],
    ) {
        let infos = descriptor_infos(bindings);
        let writes = descriptor_writes(vk::DescriptorSet::null(), bindings, &infos);
        unsafe {
            self.push_descriptor.cmd_push_descriptor_set(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &writes,
            );
        }
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]) {
        unsafe {
            self.device
                .cmd_push_constants(self.command_buffer, layout, stages, 0, data);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.command_buffer, index_count, 1, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_teardown_step_reports_device_loss() {
        assert!(teardown_step("wait", Ok(())));
        assert!(!teardown_step("wait", Err(vk::Result::ERROR_DEVICE_LOST)));
    }

    #[test]
    fn test_descriptor_writes_point_at_infos() {
        let bindings = [
            (0, DescriptorResource::shader_read(vk::ImageView::from_raw(1), vk::Sampler::from_raw(2))),
            (
                3,
                DescriptorResource::UniformBufferDynamic {
                    buffer: vk::Buffer::from_raw(4),
                    range: 128,
                },
            ),
        ];
        let infos = descriptor_infos(&bindings);
        let writes = descriptor_writes(vk::DescriptorSet::from_raw(9), &bindings, &infos);

        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].dst_binding, 0);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(writes[0].descriptor_count, 1);
        assert_eq!(writes[1].dst_binding, 3);
        assert_eq!(writes[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
        let buffer_info = unsafe { &*writes[1].p_buffer_info };
        assert_eq!(buffer_info.range, 128);
        assert_eq!(buffer_info.offset, 0);
    }

    #[test]
    fn test_clear_attachment_uses_clear_op() {
        let info = attachment_info(&Attachment::depth(vk::ImageView::from_raw(5), LoadAction::ClearDepth(1.0)));
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(unsafe { info.clear_value.depth_stencil.depth }, 1.0);

        let info = attachment_info(&Attachment::color(vk::ImageView::from_raw(6), LoadAction::Load));
        assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
    }
}
