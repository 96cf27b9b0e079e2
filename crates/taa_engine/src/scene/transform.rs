//! Transform component and model matrix derivation

use crate::foundation::math::{radians, Mat4, Mat4Ext, Vec3};
use crate::render::GpuDevice;
use crate::scene::component::Component;

/// Position, Euler rotation in degrees and per-axis scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// World space position
    pub position: Vec3,
    /// Rotation about X in degrees
    pub pitch: f32,
    /// Rotation about Y in degrees
    pub yaw: f32,
    /// Rotation about Z in degrees
    pub roll: f32,
    /// Per-axis scale
    pub scale: Vec3,
    destroyed: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            scale: Vec3::new(1.0, 1.0, 1.0),
            destroyed: false,
        }
    }
}

impl Transform {
    /// Create from position, Euler angles in degrees and scale
    pub fn new(position: Vec3, pitch: f32, yaw: f32, roll: f32, scale: Vec3) -> Self {
        Self {
            position,
            pitch,
            yaw,
            roll,
            scale,
            destroyed: false,
        }
    }

    /// Set a uniform scale on all three axes
    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.scale = Vec3::new(scale, scale, scale);
    }

    /// Model matrix for this transform
    pub fn model_matrix(&self) -> Mat4 {
        produce_model_transform(self)
    }
}

impl Component for Transform {
    fn destroy(&mut self, _device: &dyn GpuDevice) {
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Build the model matrix `T · Rz · Ry · Rx · S`
///
/// Applied to a point, scale comes first, then rotation about X, Y and Z in
/// that order, then translation.
pub fn produce_model_transform(transform: &Transform) -> Mat4 {
    let mut model = Mat4::new_nonuniform_scaling(&transform.scale);
    model = Mat4::rotation_x(radians(transform.pitch)) * model;
    model = Mat4::rotation_y(radians(transform.yaw)) * model;
    model = Mat4::rotation_z(radians(transform.roll)) * model;
    model[(0, 3)] = transform.position.x;
    model[(1, 3)] = transform.position.y;
    model[(2, 3)] = transform.position.z;
    model
}
