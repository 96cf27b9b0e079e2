//! Device memory allocation helpers

use ash::vk;

use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::{GpuBuffer, GpuImage, ImageDesc};

/// Find a memory type allowed by `type_filter` with all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(RenderError::NoSuitableMemoryType)
}

/// Create a host-visible, host-coherent buffer with its own allocation
pub fn create_host_buffer(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
) -> RenderResult<GpuBuffer> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size.max(1))
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { device.create_buffer(&buffer_info, None)? };

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let memory = find_memory_type(
        memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )
    .and_then(|memory_type_index| {
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        Ok(unsafe { device.allocate_memory(&alloc_info, None)? })
    });
    let memory = match memory {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
        unsafe {
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
        }
        return Err(e.into());
    }

    Ok(GpuBuffer { buffer, memory, size })
}

/// Copy `data` into a host-visible buffer at `offset`
pub fn write_host_buffer(
    device: &ash::Device,
    buffer: &GpuBuffer,
    offset: vk::DeviceSize,
    data: &[u8],
) -> RenderResult<()> {
    let len = data.len() as vk::DeviceSize;
    if offset + len > buffer.size {
        return Err(RenderError::InvalidOperation {
            reason: format!(
                "write of {} bytes at offset {} overflows buffer of {} bytes",
                len, offset, buffer.size
            ),
        });
    }
    if data.is_empty() {
        return Ok(());
    }

    unsafe {
        let ptr = device.map_memory(buffer.memory, offset, len, vk::MemoryMapFlags::empty())?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
        device.unmap_memory(buffer.memory);
    }
    Ok(())
}

/// Create a device-local 2D image with a default view
pub fn create_device_image(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    desc: &ImageDesc,
) -> RenderResult<GpuImage> {
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width: desc.extent.width,
            height: desc.extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(desc.format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(desc.usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1);
    let image = unsafe { device.create_image(&image_info, None)? };

    let mut result = GpuImage {
        image,
        extent: desc.extent,
        format: desc.format,
        aspect: desc.aspect,
        ..GpuImage::default()
    };
    if let Err(e) = allocate_and_view(device, memory_properties, desc, &mut result) {
        destroy_device_image(device, &result);
        return Err(e);
    }

    log::debug!(
        "Created image '{}' {}x{} {:?}",
        desc.name,
        desc.extent.width,
        desc.extent.height,
        desc.format
    );
    Ok(result)
}

fn allocate_and_view(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    desc: &ImageDesc,
    image: &mut GpuImage,
) -> RenderResult<()> {
    let requirements = unsafe { device.get_image_memory_requirements(image.image) };
    let memory_type_index = find_memory_type(
        memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    image.memory = unsafe { device.allocate_memory(&alloc_info, None)? };
    unsafe { device.bind_image_memory(image.image, image.memory, 0)? };

    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image.image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(desc.format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: desc.aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    image.view = unsafe { device.create_image_view(&view_info, None)? };
    Ok(())
}

/// Destroy whichever of the view, image and memory exist
pub fn destroy_device_image(device: &ash::Device, image: &GpuImage) {
    unsafe {
        if image.view != vk::ImageView::null() {
            device.destroy_image_view(image.view, None);
        }
        if image.image != vk::Image::null() {
            device.destroy_image(image.image, None);
        }
        if image.memory != vk::DeviceMemory::null() {
            device.free_memory(image.memory, None);
        }
    }
}

/// Destroy a buffer and free its memory
pub fn destroy_host_buffer(device: &ash::Device, buffer: &GpuBuffer) {
    unsafe {
        if buffer.buffer != vk::Buffer::null() {
            device.destroy_buffer(buffer.buffer, None);
        }
        if buffer.memory != vk::DeviceMemory::null() {
            device.free_memory(buffer.memory, None);
        }
    }
}
