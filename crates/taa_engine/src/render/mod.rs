//! Rendering core
//!
//! GPU seams ([`GpuDevice`], [`CommandEncoder`]), the barrier policy,
//! resolution-dependent targets and the per-frame pass sequence. The Vulkan
//! implementation of the seams lives in [`vulkan`].

pub mod descriptors;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod mesh;
pub mod presenter;
pub mod sync;
pub mod targets;
pub mod vulkan;

#[cfg(test)]
mod tests;

pub use descriptors::{DescriptorResource, DescriptorTable};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameOrchestrator, FrameReport, FrameStats, FrameTransformBlock, PostProcessConstants};
pub use gpu::{align_up, Attachment, CommandEncoder, GpuBuffer, GpuDevice, GpuImage, ImageDesc, LoadAction, RenderingInfo};
pub use mesh::{GpuMesh, Mesh, Vertex};
pub use presenter::{FramePresenter, FrameTarget, NoUi, PipelineHandles, UiOverlay};
pub use sync::{ImageTransition, LayoutTracker};
pub use targets::ResolutionTargets;
