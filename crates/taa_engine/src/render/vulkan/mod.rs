//! Vulkan implementation of the device and encoder seams

pub mod commands;
pub mod context;
pub mod memory;
pub mod sync;

pub use commands::{ImmediateCommands, VulkanEncoder};
pub use context::{VulkanContext, TEXTURE_FORMAT};
pub use sync::Fence;
