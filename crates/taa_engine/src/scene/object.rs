//! Scene objects and their handles

use slotmap::new_key_type;

new_key_type! {
    /// Generation-checked handle to a scene object
    pub struct ObjectId;

    /// Generation-checked, non-owning handle to a component
    pub struct ComponentId;
}

/// An object owning an ordered list of components
///
/// Component order is insertion order, which is also destruction order.
#[derive(Debug, Default)]
pub struct SceneObject {
    pub(crate) components: Vec<ComponentId>,
    pub(crate) transform: Option<ComponentId>,
    pub(crate) renderable: Option<ComponentId>,
}

impl SceneObject {
    /// Components in insertion order
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Handle to the transform component, if attached
    pub fn transform(&self) -> Option<ComponentId> {
        self.transform
    }

    /// Handle to the renderable component, if attached
    pub fn renderable(&self) -> Option<ComponentId> {
        self.renderable
    }
}
