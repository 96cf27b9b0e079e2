//! Component capability and the closed set of component kinds

use crate::render::GpuDevice;
use crate::scene::renderable::RenderableComponent;
use crate::scene::transform::Transform;

/// Capability shared by every component kind
pub trait Component {
    /// Release any resources held by the component
    ///
    /// Must be idempotent: a second call is a no-op.
    fn destroy(&mut self, device: &dyn GpuDevice);

    /// Whether `destroy` has run
    fn is_destroyed(&self) -> bool;
}

/// Component storage entry
#[derive(Debug)]
pub enum SceneComponent {
    /// Spatial transform
    Transform(Transform),
    /// Drawable geometry and texture
    Renderable(RenderableComponent),
}

impl SceneComponent {
    /// Short kind name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transform(_) => "transform",
            Self::Renderable(_) => "renderable",
        }
    }
}

impl Component for SceneComponent {
    fn destroy(&mut self, device: &dyn GpuDevice) {
        match self {
            Self::Transform(t) => t.destroy(device),
            Self::Renderable(r) => r.destroy(device),
        }
    }

    fn is_destroyed(&self) -> bool {
        match self {
            Self::Transform(t) => t.is_destroyed(),
            Self::Renderable(r) => r.is_destroyed(),
        }
    }
}
