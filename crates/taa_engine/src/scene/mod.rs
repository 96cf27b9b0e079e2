//! Scene object model
//!
//! A [`Scene`] is an arena of objects and components. Each object owns its
//! components exclusively; everything else refers to them through
//! generation-checked [`ComponentId`]s that resolve to `None` once the owning
//! object has been destroyed, so a stale handle can never reach freed data.

pub mod component;
pub mod object;
pub mod renderable;
pub mod transform;

pub use component::{Component, SceneComponent};
pub use object::{ComponentId, ObjectId, SceneObject};
pub use renderable::{DrawContext, ObjectRenderInfo, RenderableComponent};
pub use transform::{produce_model_transform, Transform};

use slotmap::SlotMap;

use crate::render::GpuDevice;

/// Arena of scene objects and their components
#[derive(Debug, Default)]
pub struct Scene {
    objects: SlotMap<ObjectId, SceneObject>,
    components: SlotMap<ComponentId, SceneComponent>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object with a default transform and an empty renderable attached
    pub fn create_object(&mut self) -> ObjectId {
        let id = self.objects.insert(SceneObject::default());
        self.attach(id, SceneComponent::Transform(Transform::default()));
        self.attach(id, SceneComponent::Renderable(RenderableComponent::default()));
        log::trace!("Created object {:?}", id);
        id
    }

    /// Append a component to a live object
    ///
    /// Returns `None` if the object is gone. Attaching a second component of
    /// a kind already present keeps the first one as the object's accessor
    /// target; both are still destroyed with the object.
    pub fn attach(&mut self, object: ObjectId, component: SceneComponent) -> Option<ComponentId> {
        let obj = self.objects.get_mut(object)?;
        let is_transform = matches!(component, SceneComponent::Transform(_));
        let id = self.components.insert(component);
        obj.components.push(id);
        let slot = if is_transform {
            &mut obj.transform
        } else {
            &mut obj.renderable
        };
        slot.get_or_insert(id);
        Some(id)
    }

    /// Look up an object
    pub fn object(&self, object: ObjectId) -> Option<&SceneObject> {
        self.objects.get(object)
    }

    /// Whether the object has been destroyed (or never existed)
    pub fn is_destroyed(&self, object: ObjectId) -> bool {
        !self.objects.contains_key(object)
    }

    /// Live objects in arbitrary but stable order
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().collect()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scene has no live objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Transform of `object`, `None` if absent or destroyed
    pub fn get_transform(&self, object: ObjectId) -> Option<&Transform> {
        let id = self.objects.get(object)?.transform?;
        self.transform(id)
    }

    /// Mutable transform of `object`
    pub fn get_transform_mut(&mut self, object: ObjectId) -> Option<&mut Transform> {
        let id = self.objects.get(object)?.transform?;
        match self.components.get_mut(id)? {
            SceneComponent::Transform(t) => Some(t),
            SceneComponent::Renderable(_) => None,
        }
    }

    /// Renderable of `object`, `None` if absent or destroyed
    pub fn get_renderable(&self, object: ObjectId) -> Option<&RenderableComponent> {
        let id = self.objects.get(object)?.renderable?;
        self.renderable(id)
    }

    /// Mutable renderable of `object`
    pub fn get_renderable_mut(&mut self, object: ObjectId) -> Option<&mut RenderableComponent> {
        let id = self.objects.get(object)?.renderable?;
        match self.components.get_mut(id)? {
            SceneComponent::Renderable(r) => Some(r),
            SceneComponent::Transform(_) => None,
        }
    }

    /// Resolve a transform handle
    pub fn transform(&self, id: ComponentId) -> Option<&Transform> {
        match self.components.get(id)? {
            SceneComponent::Transform(t) => Some(t),
            SceneComponent::Renderable(_) => None,
        }
    }

    /// Resolve a renderable handle
    pub fn renderable(&self, id: ComponentId) -> Option<&RenderableComponent> {
        match self.components.get(id)? {
            SceneComponent::Renderable(r) => Some(r),
            SceneComponent::Transform(_) => None,
        }
    }

    /// Destroy `object` and all of its components
    ///
    /// Components are destroyed in insertion order while the object is still
    /// live, then the object is removed. Destroying a destroyed object is a
    /// no-op; returns whether anything was destroyed.
    pub fn destroy(&mut self, object: ObjectId, device: &dyn GpuDevice) -> bool {
        let component_ids = match self.objects.get(object) {
            Some(obj) => obj.components.clone(),
            None => return false,
        };

        for id in &component_ids {
            if let Some(component) = self.components.get_mut(*id) {
                log::trace!("Destroying {} component of {:?}", component.kind(), object);
                component.destroy(device);
            }
        }
        for id in component_ids {
            self.components.remove(id);
        }
        self.objects.remove(object);
        log::debug!("Destroyed object {:?}", object);
        true
    }

    /// Destroy every object
    pub fn destroy_all(&mut self, device: &dyn GpuDevice) {
        for id in self.object_ids() {
            self.destroy(id, device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImageData;
    use crate::render::{GpuMesh, Mesh};
    use crate::testing::{DeviceCall, RecordingDevice};

    fn populated(scene: &mut Scene, device: &RecordingDevice) -> ObjectId {
        let id = scene.create_object();
        let renderable = scene.get_renderable_mut(id).unwrap();
        renderable.set_mesh(device, GpuMesh::upload(device, &Mesh::fullscreen_quad()).unwrap());
        renderable.set_texture(
            device,
            device.create_texture(&ImageData::solid_color(2, 2, [0; 4]), "black").unwrap(),
        );
        id
    }

    fn destroy_calls(device: &RecordingDevice) -> usize {
        device
            .calls()
            .iter()
            .filter(|c| matches!(c, DeviceCall::DestroyBuffer(_) | DeviceCall::DestroyImage(_)))
            .count()
    }

    #[test]
    fn test_create_object_attaches_both_components() {
        let mut scene = Scene::new();
        let id = scene.create_object();
        assert!(scene.get_transform(id).is_some());
        assert!(scene.get_renderable(id).is_some());

        let obj = scene.object(id).unwrap();
        assert_eq!(obj.components().len(), 2);
        assert_eq!(obj.components()[0], obj.transform().unwrap());
        assert_eq!(obj.components()[1], obj.renderable().unwrap());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let device = RecordingDevice::new();
        let mut scene = Scene::new();
        let id = populated(&mut scene, &device);

        assert!(scene.destroy(id, &device));
        let after_first = destroy_calls(&device);
        assert_eq!(after_first, 3);

        assert!(!scene.destroy(id, &device));
        assert_eq!(destroy_calls(&device), after_first);
        assert!(scene.is_destroyed(id));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_accessors_on_destroyed_object_are_empty() {
        let device = RecordingDevice::new();
        let mut scene = Scene::new();
        let id = populated(&mut scene, &device);
        let handle = scene.object(id).unwrap().renderable().unwrap();

        scene.destroy(id, &device);

        assert!(scene.get_renderable(id).is_none());
        assert!(scene.get_transform(id).is_none());
        assert!(scene.get_renderable_mut(id).is_none());
        assert!(scene.renderable(handle).is_none());
    }

    #[test]
    fn test_stale_handle_does_not_alias_new_object() {
        let device = RecordingDevice::new();
        let mut scene = Scene::new();
        let old = scene.create_object();
        let old_renderable = scene.object(old).unwrap().renderable().unwrap();
        scene.destroy(old, &device);

        let new = scene.create_object();
        assert_ne!(old, new);
        assert!(scene.renderable(old_renderable).is_none());
        assert!(scene.get_renderable(new).is_some());
    }

    #[test]
    fn test_component_kinds_in_attach_order() {
        let mut scene = Scene::new();
        let id = scene.create_object();
        let kinds: Vec<&str> = scene
            .object(id)
            .unwrap()
            .components()
            .iter()
            .map(|c| scene.components[*c].kind())
            .collect();
        assert_eq!(kinds, vec!["transform", "renderable"]);
    }

    #[test]
    fn test_destroy_all() {
        let device = RecordingDevice::new();
        let mut scene = Scene::new();
        let a = scene.create_object();
        let b = scene.create_object();
        scene.destroy_all(&device);
        assert!(scene.is_destroyed(a) && scene.is_destroyed(b));
        assert_eq!(scene.len(), 0);
    }
}
