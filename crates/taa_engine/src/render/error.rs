//! Error types for GPU-facing operations

use ash::vk;
use thiserror::Error;

use crate::assets::AssetError;

/// Renderer errors
///
/// Every variant is fatal to the frame loop: a failed submission, resize or
/// scene-setup check propagates to the driver, which must stop rendering.
#[derive(Error, Debug)]
pub enum RenderError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The logical device was lost
    #[error("Device lost")]
    DeviceLost,

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Renderer or resource initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A barrier was recorded against an image in a different layout
    #[error("Image {image:?} is in layout {actual:?} but the transition expects {expected:?}")]
    LayoutMismatch {
        /// Image the transition targeted
        image: vk::Image,
        /// Source layout named by the transition
        expected: vk::ImageLayout,
        /// Layout the image is actually in
        actual: vk::ImageLayout,
    },

    /// A renderable with geometry was drawn without a texture
    #[error("Renderable '{name}' has no texture assigned")]
    MissingTexture {
        /// Debug name of the renderable
        name: String,
    },

    /// Resolution-dependent resources were used between release and restore
    #[error("Resolution-dependent resources are released")]
    ResourcesReleased,

    /// Asset loading failed during setup
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Api(other),
        }
    }
}

impl RenderError {
    /// Whether the error means the device state can no longer be trusted
    pub fn is_device_loss(&self) -> bool {
        matches!(
            self,
            Self::DeviceLost
                | Self::Api(
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                        | vk::Result::ERROR_OUT_OF_HOST_MEMORY
                        | vk::Result::ERROR_INITIALIZATION_FAILED
                )
        )
    }
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_maps_to_dedicated_variant() {
        let err = RenderError::from(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(err, RenderError::DeviceLost));
        assert!(err.is_device_loss());
    }

    #[test]
    fn test_classification() {
        assert!(RenderError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).is_device_loss());
        assert!(!RenderError::from(vk::Result::ERROR_FORMAT_NOT_SUPPORTED).is_device_loss());
        assert!(!RenderError::ResourcesReleased.is_device_loss());
    }
}
