use std::collections::HashMap;

use overlay_protocol::{
    domain::{ControlId, SceneId},
    protocol::{ClientCall, ControlProps, ControlRef, InputEvent, SceneProps},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{
    error::StateError,
    observer::Subscription,
    registry::{ControlDescriptor, Registry, SceneDescriptor},
    resource::{read_field, read_field_or, DeleteReason, Resource},
    transport::{Outbox, OutboxClosed},
};

/// A scene and the controls it owns.
///
/// The stored props never carry `controls`. Every read ([`Scene::to_object`],
/// [`Scene::get`], [`Scene::field`]) and every `update` notification sees the
/// live control map flattened back in.
#[derive(Debug)]
pub struct Scene {
    resource: Resource<SceneProps>,
    controls: HashMap<ControlId, Control>,
}

impl Scene {
    pub(crate) fn new(mut props: SceneProps, registry: &Registry) -> Result<Self, StateError> {
        resolve_scene(registry, &props.scene_id)?;

        let mut controls = HashMap::with_capacity(props.controls.len());
        for control in std::mem::take(&mut props.controls) {
            let control = Control::new(props.scene_id.clone(), control, registry)?;
            controls.insert(control.id().clone(), control);
        }

        Ok(Self {
            resource: Resource::new(props),
            controls,
        })
    }

    pub fn id(&self) -> &SceneId {
        &self.resource.props().scene_id
    }

    pub fn controls(&self) -> &HashMap<ControlId, Control> {
        &self.controls
    }

    pub fn control(&self, control_id: &ControlId) -> Option<&Control> {
        self.controls.get(control_id)
    }

    /// Controls ordered by id.
    pub fn list_controls(&self) -> Vec<&Control> {
        let mut controls: Vec<&Control> = self.controls.values().collect();
        controls.sort_by(|a, b| a.id().cmp(b.id()));
        controls
    }

    /// Scene props with the live control snapshots flattened in.
    pub fn to_object(&self) -> SceneProps {
        let mut snapshot = self.resource.to_object();
        snapshot.controls = self
            .list_controls()
            .into_iter()
            .map(Control::to_object)
            .collect();
        snapshot
    }

    /// Raw field lookup by wire name on the flattened snapshot.
    pub fn field(&self, key: &str) -> Option<Value> {
        read_field(&self.to_object(), key)
    }

    /// Reads a field of the flattened snapshot, or `default` when it is
    /// absent, `null` or not a `V`.
    pub fn get<V: DeserializeOwned>(&self, key: &str, default: V) -> V {
        read_field_or(&self.to_object(), key, default)
    }

    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SceneProps) + Send + Sync + 'static,
    {
        self.resource.on_update(callback)
    }

    pub fn on_delete<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeleteReason) + Send + Sync + 'static,
    {
        self.resource.on_delete(callback)
    }

    pub fn descriptor<'r>(
        &self,
        registry: &'r Registry,
    ) -> Result<&'r SceneDescriptor, StateError> {
        resolve_scene(registry, self.id())
    }

    /// Replaces the scene's own fields. A `controls` list in `props` is
    /// ignored; control topology only changes through control events.
    pub(crate) fn update(
        &mut self,
        mut props: SceneProps,
        registry: &Registry,
    ) -> Result<(), StateError> {
        resolve_scene(registry, &props.scene_id)?;
        props.controls.clear();
        self.resource.replace(props);
        self.notify_update();
        Ok(())
    }

    pub(crate) fn create_controls(
        &mut self,
        controls: Vec<ControlProps>,
        registry: &Registry,
    ) -> Result<(), StateError> {
        let scene_id = self.id().clone();
        let created = controls
            .into_iter()
            .map(|props| Control::new(scene_id.clone(), props, registry))
            .collect::<Result<Vec<_>, _>>()?;
        for control in created {
            self.controls.insert(control.id().clone(), control);
        }
        self.notify_update();
        Ok(())
    }

    /// Updates existing controls and creates missing ones.
    pub(crate) fn update_controls(
        &mut self,
        controls: Vec<ControlProps>,
        registry: &Registry,
    ) -> Result<(), StateError> {
        let scene_id = self.id().clone();
        for props in controls {
            match self.controls.get_mut(&props.control_id) {
                Some(control) => control.update(props, registry)?,
                None => {
                    let control = Control::new(scene_id.clone(), props, registry)?;
                    self.controls.insert(control.id().clone(), control);
                }
            }
        }
        self.notify_update();
        Ok(())
    }

    /// Removes the listed controls, skipping ids the scene does not hold.
    /// Returns how many were removed.
    pub(crate) fn delete_controls(&mut self, controls: &[ControlRef]) -> usize {
        let mut removed = 0;
        for control_ref in controls {
            let Some(control) = self.controls.remove(&control_ref.control_id) else {
                continue;
            };
            control.resource.notify_delete(&DeleteReason::Control {
                scene_id: control.scene_id.clone(),
                control_id: control_ref.control_id.clone(),
            });
            removed += 1;
        }
        if removed > 0 {
            self.notify_update();
        }
        removed
    }

    /// Fires `delete` on the scene, then on each control it owns.
    pub(crate) fn notify_delete(&self, reason: &DeleteReason) {
        self.resource.notify_delete(reason);
        for control in self.list_controls() {
            control.resource.notify_delete(reason);
        }
    }

    fn notify_update(&self) {
        self.resource.notify_update(&self.to_object());
    }
}

/// A single interactive widget inside a scene.
#[derive(Debug)]
pub struct Control {
    scene_id: SceneId,
    resource: Resource<ControlProps>,
}

impl Control {
    fn new(
        scene_id: SceneId,
        props: ControlProps,
        registry: &Registry,
    ) -> Result<Self, StateError> {
        resolve_control(registry, &props)?;
        Ok(Self {
            scene_id,
            resource: Resource::new(props),
        })
    }

    pub fn id(&self) -> &ControlId {
        &self.resource.props().control_id
    }

    pub fn scene_id(&self) -> &SceneId {
        &self.scene_id
    }

    pub fn kind(&self) -> &str {
        &self.resource.props().kind
    }

    pub fn resource(&self) -> &Resource<ControlProps> {
        &self.resource
    }

    pub fn props(&self) -> &ControlProps {
        self.resource.props()
    }

    pub fn to_object(&self) -> ControlProps {
        self.resource.to_object()
    }

    pub fn descriptor<'r>(
        &self,
        registry: &'r Registry,
    ) -> Result<&'r ControlDescriptor, StateError> {
        resolve_control(registry, self.props())
    }

    /// Sends input on this control up to the remote channel. `fields` are
    /// the kind-specific parts of the input (coordinates, key state, ...).
    pub fn give_input(
        &self,
        outbox: &Outbox,
        event: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Result<(), OutboxClosed> {
        outbox.send(ClientCall::GiveInput(InputEvent {
            control_id: self.id().clone(),
            event: event.into(),
            meta: fields,
        }))
    }

    fn update(&mut self, props: ControlProps, registry: &Registry) -> Result<(), StateError> {
        resolve_control(registry, &props)?;
        self.resource.update(props);
        Ok(())
    }
}

fn resolve_scene<'r>(
    registry: &'r Registry,
    scene_id: &SceneId,
) -> Result<&'r SceneDescriptor, StateError> {
    registry
        .get_scene(scene_id)
        .map_err(|source| StateError::Configuration {
            entity: format!("scene \"{scene_id}\""),
            source,
        })
}

fn resolve_control<'r>(
    registry: &'r Registry,
    props: &ControlProps,
) -> Result<&'r ControlDescriptor, StateError> {
    registry
        .get_control(&props.kind)
        .map_err(|source| StateError::Configuration {
            entity: format!("control \"{}\"", props.control_id),
            source,
        })
}
