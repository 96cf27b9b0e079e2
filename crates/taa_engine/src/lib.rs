//! # TAA Engine
//!
//! Real-time frame renderer with temporal and spatial antialiasing on Vulkan.
//!
//! ## Features
//!
//! - **Scene model**: objects owning a transform and a renderable, addressed
//!   through generation-checked handles
//! - **Frame orchestration**: geometry, post-process, history and UI passes
//!   with explicit, validated image transitions
//! - **Resolution-dependent targets**: depth, post-process, history and
//!   motion-vector images rebuilt as a unit on resize
//! - **Pluggable collaborators**: presentation, pipelines, assets and UI are
//!   supplied through traits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taa_engine::prelude::*;
//!
//! fn run(
//!     device: &dyn GpuDevice,
//!     presenter: Box<dyn FramePresenter>,
//!     pipelines: PipelineHandles,
//! ) -> Result<(), RenderError> {
//!     let config = RendererConfig::load_from_file("renderer.toml").unwrap_or_default();
//!     let assets = FileAssetLoader::new("assets");
//!     let mut renderer = Renderer::initialize(device, presenter, Box::new(NoUi), config, pipelines, &assets)?;
//!     for _ in 0..3 {
//!         renderer.run_frame()?;
//!     }
//!     renderer.shutdown()
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

mod renderer;

#[cfg(test)]
pub(crate) mod testing;

pub use renderer::{Renderer, SCROLL_SENSITIVITY};

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, AssetLoader, FileAssetLoader, ImageData},
        config::{AntialiasingMode, CameraConfig, Config, RenderSettings, RendererConfig, SceneObjectConfig},
        foundation::math::{Mat4, Vec3},
        render::{
            CommandEncoder, FramePresenter, FrameStats, FrameTarget, GpuDevice, Mesh, NoUi, PipelineHandles,
            RenderError, RenderResult, UiOverlay,
        },
        scene::{ObjectId, Scene, Transform},
        Renderer,
    };
}
