use std::collections::HashMap;

use overlay_protocol::{
    domain::{GroupId, SceneId},
    protocol::{GroupProps, ParticipantProps},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{precondition, StateError},
    observer::{Observers, Subscription},
    resource::{DeleteReason, Resource},
    scene::Scene,
    state::State,
};

/// A cohort of participants assigned to one scene.
#[derive(Debug)]
pub struct Group {
    resource: Resource<GroupProps>,
}

impl Group {
    pub(crate) fn new(props: GroupProps) -> Self {
        Self {
            resource: Resource::new(props),
        }
    }

    pub fn id(&self) -> &GroupId {
        &self.resource.props().group_id
    }

    pub fn scene_id(&self) -> &SceneId {
        &self.resource.props().scene_id
    }

    /// The assigned scene, or `None` once that scene has been deleted.
    pub fn scene<'s>(&self, state: &'s State) -> Option<&'s Scene> {
        state.scene(self.scene_id())
    }

    pub fn resource(&self) -> &Resource<GroupProps> {
        &self.resource
    }

    pub fn props(&self) -> &GroupProps {
        self.resource.props()
    }

    pub(crate) fn update(&mut self, props: GroupProps) {
        self.resource.update(props);
    }

    pub(crate) fn notify_delete(&self, reason: &DeleteReason) {
        self.resource.notify_delete(reason);
    }
}

/// The local viewer.
///
/// Props are empty until the first `onParticipantJoin`/`onParticipantUpdate`;
/// wait for the first `update` before reading them.
#[derive(Debug)]
pub struct Participant {
    resource: Resource<Option<ParticipantProps>>,
    group_updates: Observers<GroupProps>,
}

impl Default for Participant {
    fn default() -> Self {
        Self {
            resource: Resource::new(None),
            group_updates: Observers::new(),
        }
    }
}

impl Participant {
    pub fn props(&self) -> Option<&ParticipantProps> {
        self.resource.props().as_ref()
    }

    /// Id of the group this participant belongs to; `None` before the first
    /// update.
    pub fn group_id(&self) -> Option<&GroupId> {
        self.props().map(|props| &props.group_id)
    }

    pub fn to_object(&self) -> Option<ParticipantProps> {
        self.resource.to_object()
    }

    pub fn field(&self, key: &str) -> Option<Value> {
        self.resource.field(key)
    }

    pub fn get<V: DeserializeOwned>(&self, key: &str, default: V) -> V {
        self.resource.get(key, default)
    }

    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ParticipantProps) + Send + Sync + 'static,
    {
        self.resource.on_update(move |props: &Option<ParticipantProps>| {
            if let Some(props) = props {
                callback(props);
            }
        })
    }

    /// The channel has no participant removal event, so this never fires
    /// within a session.
    pub fn on_delete<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeleteReason) + Send + Sync + 'static,
    {
        self.resource.on_delete(callback)
    }

    /// Fires when the group this participant currently belongs to is updated.
    pub fn on_group_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&GroupProps) + Send + Sync + 'static,
    {
        self.group_updates.subscribe(callback)
    }

    pub(crate) fn update(
        &mut self,
        props: ParticipantProps,
        groups: &HashMap<GroupId, Group>,
    ) -> Result<(), StateError> {
        precondition!(
            groups.contains_key(&props.group_id),
            "Tried to move participant to group \"{}\", but it didn't exist",
            props.group_id
        );
        self.resource.update(Some(props));
        Ok(())
    }

    pub(crate) fn notify_group_update(&self, group: &GroupProps) {
        self.group_updates.notify(group);
    }
}
