//! Descriptor bindings
//!
//! [`DescriptorResource`] names what a binding slot points at. A
//! [`DescriptorTable`] mirrors the contents of one long-lived descriptor set
//! so only slots that changed since the last flush are rewritten.

use std::collections::BTreeMap;

use ash::vk;

use crate::render::error::{RenderError, RenderResult};
use crate::render::gpu::GpuDevice;

/// Resource referenced by a descriptor binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// Combined image sampler
    SampledImage {
        /// View sampled by the shader
        view: vk::ImageView,
        /// Layout the image is in when sampled
        layout: vk::ImageLayout,
        /// Sampler used for the binding
        sampler: vk::Sampler,
    },
    /// Uniform buffer range at a fixed offset
    UniformBuffer {
        /// Source buffer
        buffer: vk::Buffer,
        /// Byte offset of the range
        offset: vk::DeviceSize,
        /// Byte size of the range
        range: vk::DeviceSize,
    },
    /// Uniform buffer range whose offset is supplied at bind time
    UniformBufferDynamic {
        /// Source buffer
        buffer: vk::Buffer,
        /// Byte size of the range
        range: vk::DeviceSize,
    },
}

impl DescriptorResource {
    /// Sampled image in `SHADER_READ_ONLY_OPTIMAL`
    pub fn shader_read(view: vk::ImageView, sampler: vk::Sampler) -> Self {
        Self::SampledImage {
            view,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            sampler,
        }
    }

    /// Vulkan descriptor type of the binding
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::SampledImage { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            Self::UniformBufferDynamic { .. } => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        }
    }
}

/// Cached contents of one descriptor set
#[derive(Debug)]
pub struct DescriptorTable {
    set: vk::DescriptorSet,
    slots: BTreeMap<u32, DescriptorResource>,
    dirty: BTreeMap<u32, DescriptorResource>,
}

impl DescriptorTable {
    /// Wrap an allocated descriptor set
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            slots: BTreeMap::new(),
            dirty: BTreeMap::new(),
        }
    }

    /// Underlying descriptor set
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Resource currently bound at `slot`
    pub fn get(&self, slot: u32) -> Option<&DescriptorResource> {
        self.slots.get(&slot)
    }

    /// Point `slot` at `resource`; takes effect on the next flush
    pub fn bind(&mut self, slot: u32, resource: DescriptorResource) {
        if self.slots.get(&slot) == Some(&resource) {
            return;
        }
        self.slots.insert(slot, resource);
        self.dirty.insert(slot, resource);
    }

    /// Whether any slot changed since the last flush
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Fail if a bound resource has not been written to the device yet
    pub fn ensure_flushed(&self) -> RenderResult<()> {
        if self.is_dirty() {
            return Err(RenderError::InvalidOperation {
                reason: format!("descriptor set {:?} has unwritten bindings", self.set),
            });
        }
        Ok(())
    }

    /// Write changed slots to the device
    ///
    /// Must not be called while a command buffer referencing the set may
    /// still execute.
    pub fn flush(&mut self, device: &dyn GpuDevice) {
        if self.dirty.is_empty() {
            return;
        }
        let writes: Vec<(u32, DescriptorResource)> =
            std::mem::take(&mut self.dirty).into_iter().collect();
        log::debug!("Updating {} binding(s) of descriptor set {:?}", writes.len(), self.set);
        device.write_descriptor_set(self.set, &writes);
    }
}
