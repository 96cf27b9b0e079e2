//! Renderer configuration: UI-exposed settings, camera and startup scene

use serde::{Deserialize, Serialize};

use super::Config;
use crate::foundation::math::Vec3;

/// Lowest accepted spatial antialiasing edge threshold
pub const FXAA_THRESHOLD_MIN: f32 = 0.0;

/// Highest accepted spatial antialiasing edge threshold
pub const FXAA_THRESHOLD_MAX: f32 = 0.5;

const SCALE_MIN: f32 = 0.05;
const SCALE_MAX: f32 = 10.0;

/// Antialiasing technique applied by the post-process pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntialiasingMode {
    /// Pass-through
    None,
    /// Spatial edge antialiasing (FXAA)
    #[default]
    Spatial,
    /// Temporal antialiasing reprojecting the history image (TAA)
    Temporal,
}

impl AntialiasingMode {
    /// Value pushed to the post-process shader
    pub fn shader_value(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Spatial => 1,
            Self::Temporal => 2,
        }
    }

    /// Human-readable label for overlays and logs
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Spatial => "FXAA",
            Self::Temporal => "TAA",
        }
    }

    /// Whether the edge threshold affects this mode
    pub fn uses_threshold(self) -> bool {
        matches!(self, Self::Spatial)
    }
}

/// Values the UI overlay toggles and the frame orchestrator reads each frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Vertical sync requested from the presentation service
    pub vsync: bool,
    /// Advance simulation time and animate objects
    pub animate: bool,
    /// Post-process antialiasing technique
    pub antialiasing: AntialiasingMode,
    /// Edge threshold for spatial antialiasing
    pub fxaa_threshold: f32,
    /// Draw the UI overlay
    pub show_ui: bool,
    /// Global scale multiplier applied to tracked objects
    pub scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            animate: false,
            antialiasing: AntialiasingMode::Spatial,
            fxaa_threshold: 0.1,
            show_ui: true,
            scale: 0.3,
        }
    }
}

impl RenderSettings {
    /// Clamp values coming from files or UI widgets into their valid ranges
    pub fn sanitize(&mut self) {
        self.fxaa_threshold = if self.fxaa_threshold.is_finite() {
            self.fxaa_threshold.clamp(FXAA_THRESHOLD_MIN, FXAA_THRESHOLD_MAX)
        } else {
            Self::default().fxaa_threshold
        };
        self.scale = if self.scale.is_finite() {
            self.scale.clamp(SCALE_MIN, SCALE_MAX)
        } else {
            Self::default().scale
        };
    }

    /// Adjust the global scale by a scroll delta
    pub fn update_scale_by_delta(&mut self, delta: f32, sensitivity: f32) {
        self.scale = (self.scale + delta * sensitivity * 0.01 * self.scale).clamp(SCALE_MIN, SCALE_MAX);
    }
}

/// Camera placement and projection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Eye position in world space
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Near clip plane distance
    pub near: f32,
    /// Far clip plane distance
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.5, 3.0),
            target: Vec3::zeros(),
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// One object of the startup scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneObjectConfig {
    /// Mesh file handed to the asset loader
    pub mesh: String,
    /// Texture file handed to the asset loader
    pub texture: String,
    /// Initial position
    pub position: Vec3,
    /// Rotation about X in degrees
    pub pitch: f32,
    /// Rotation about Y in degrees
    pub yaw: f32,
    /// Rotation about Z in degrees
    pub roll: f32,
    /// Per-axis scale
    pub scale: Vec3,
    /// Yaw rate in degrees per second while animating
    pub spin_degrees_per_second: f32,
}

impl Default for SceneObjectConfig {
    fn default() -> Self {
        Self {
            mesh: String::new(),
            texture: String::new(),
            position: Vec3::zeros(),
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            scale: Vec3::new(1.0, 1.0, 1.0),
            spin_degrees_per_second: 30.0,
        }
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Runtime-toggleable settings
    pub settings: RenderSettings,
    /// Camera setup
    pub camera: CameraConfig,
    /// Linear clear color for the geometry pass
    pub clear_color: [f32; 4],
    /// Objects loaded at startup
    pub objects: Vec<SceneObjectConfig>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            settings: RenderSettings::default(),
            camera: CameraConfig::default(),
            clear_color: [0.32, 0.32, 0.4, 0.0],
            objects: Vec::new(),
        }
    }
}

impl Config for RendererConfig {}
