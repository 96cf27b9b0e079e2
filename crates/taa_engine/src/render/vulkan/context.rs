//! Vulkan device context

use std::sync::Mutex;

use ash::extensions::khr::PushDescriptor;
use ash::{vk, Device, Instance};

use crate::assets::ImageData;
use crate::render::descriptors::DescriptorResource;
use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::{CommandEncoder, GpuBuffer, GpuDevice, GpuImage, ImageDesc};
use crate::render::sync::ImageTransition;
use crate::render::vulkan::commands::{descriptor_infos, descriptor_writes, ImmediateCommands, VulkanEncoder};
use crate::render::vulkan::memory;

/// Texel format of sampled textures
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// [`GpuDevice`] over a logical device created by the application
///
/// The context borrows the device: it never destroys the `ash::Device`, only
/// the objects it created itself. The device must support Vulkan 1.3 dynamic
/// rendering and `VK_KHR_push_descriptor`.
pub struct VulkanContext {
    device: Device,
    push_descriptor: PushDescriptor,
    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    immediate: Mutex<ImmediateCommands>,
}

impl VulkanContext {
    /// Wrap an existing device and its graphics queue family
    pub fn new(
        instance: &Instance,
        device: Device,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> RenderResult<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            return Err(RenderError::InitializationFailed(
                "device does not support Vulkan 1.3 dynamic rendering".to_string(),
            ));
        }

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        let push_descriptor = PushDescriptor::new(instance, &device);
        let immediate = ImmediateCommands::new(device.clone(), queue_family_index)?;

        let name = unsafe { std::ffi::CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Vulkan context on {:?} (API {}.{}.{})",
            name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        Ok(Self {
            device,
            push_descriptor,
            queue,
            memory_properties,
            limits: properties.limits,
            immediate: Mutex::new(immediate),
        })
    }

    /// Underlying logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Graphics queue used for one-shot submissions
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    fn run_immediate(&self, record: impl FnOnce(vk::CommandBuffer)) -> RenderResult<()> {
        let immediate = self.immediate.lock().map_err(|_| RenderError::InvalidOperation {
            reason: "immediate command state poisoned".to_string(),
        })?;
        immediate.run(self.queue, record)
    }
}

impl GpuDevice for VulkanContext {
    fn create_image(&self, desc: &ImageDesc) -> RenderResult<GpuImage> {
        memory::create_device_image(&self.device, &self.memory_properties, desc)
    }

    fn create_texture(&self, data: &ImageData, name: &str) -> RenderResult<GpuImage> {
        if !data.is_valid() {
            return Err(RenderError::InvalidOperation {
                reason: format!("texture '{}' has inconsistent dimensions", name),
            });
        }

        let extent = vk::Extent2D {
            width: data.width,
            height: data.height,
        };
        let staging = self.create_buffer_with_data(vk::BufferUsageFlags::TRANSFER_SRC, &data.data)?;
        let image = memory::create_device_image(
            &self.device,
            &self.memory_properties,
            &ImageDesc {
                extent,
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
                name: "texture",
            },
        );
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                memory::destroy_host_buffer(&self.device, &staging);
                return Err(e);
            }
        };

        let uploaded = self.run_immediate(|cb| {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            let mut encoder = VulkanEncoder::new(&self.device, &self.push_descriptor, cb);
            encoder.image_barrier(image.image, image.aspect, &ImageTransition::COPY_DESTINATION);
            unsafe {
                self.device.cmd_copy_buffer_to_image(
                    cb,
                    staging.buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            encoder.image_barrier(image.image, image.aspect, &ImageTransition::SHADER_READ_AFTER_COPY);
        });
        memory::destroy_host_buffer(&self.device, &staging);
        if let Err(e) = uploaded {
            memory::destroy_device_image(&self.device, &image);
            return Err(e);
        }

        log::info!("Uploaded texture '{}' ({}x{})", name, data.width, data.height);
        Ok(image)
    }

    fn destroy_image(&self, image: &GpuImage) {
        memory::destroy_device_image(&self.device, image);
    }

    fn create_buffer(&self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> RenderResult<GpuBuffer> {
        memory::create_host_buffer(&self.device, &self.memory_properties, size, usage)
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: vk::DeviceSize, data: &[u8]) -> RenderResult<()> {
        memory::write_host_buffer(&self.device, buffer, offset, data)
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        memory::destroy_host_buffer(&self.device, buffer);
    }

    fn write_descriptor_set(&self, set: vk::DescriptorSet, bindings: &[(u32, DescriptorResource)]) {
        let infos = descriptor_infos(bindings);
        let writes = descriptor_writes(set, bindings, &infos);
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }

    fn min_uniform_alignment(&self) -> vk::DeviceSize {
        self.limits.min_uniform_buffer_offset_alignment
    }

    fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn submit_immediate(&self, record: &mut dyn FnMut(&mut dyn CommandEncoder)) -> RenderResult<()> {
        self.run_immediate(|cb| {
            let mut encoder = VulkanEncoder::new(&self.device, &self.push_descriptor, cb);
            record(&mut encoder);
        })
    }

    fn encoder(&self, command_buffer: vk::CommandBuffer) -> Box<dyn CommandEncoder + '_> {
        Box::new(VulkanEncoder::new(&self.device, &self.push_descriptor, command_buffer))
    }
}
