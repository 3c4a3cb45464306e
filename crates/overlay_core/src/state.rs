//! Session root: the in-memory replica of scenes, groups and the local
//! participant.
//!
//! Every inbound [`ChannelEvent`] is applied by one handler. Handlers check
//! the whole event against the replica before mutating anything, so an event
//! that fails a precondition is logged and dropped without partial effects.
//! Configuration errors (an unregistered scene id or control kind) are not
//! recovered and propagate to the caller.
//!
//! Deleting a scene also deletes the controls it owns. Groups still assigned
//! to a deleted scene are left in place; [`Group::scene`] returns `None` for
//! them until the channel reassigns them with `onGroupUpdate`.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use overlay_protocol::{
    domain::{GroupId, SceneId},
    protocol::{
        ChannelEvent, ControlBatch, ControlDelete, GroupBatch, GroupDelete, GroupProps,
        ParticipantBatch, ParticipantProps, ReadyEvent, SceneBatch, SceneDelete, SceneProps,
    },
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::{
    error::{precondition, StateError},
    group::{Group, Participant},
    registry::Registry,
    resource::DeleteReason,
    scene::Scene,
};

const EVENT_CAPACITY: usize = 1024;

/// Domain events re-emitted to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    SceneCreated(SceneProps),
    SceneDeleted {
        scene: SceneProps,
        event: SceneDelete,
    },
    GroupCreated(GroupProps),
    GroupDeleted {
        group: GroupProps,
        event: GroupDelete,
    },
    Ready(bool),
}

/// Serializable snapshot of the whole replica.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDump {
    pub participant: Option<ParticipantProps>,
    pub scenes: Vec<SceneProps>,
    pub groups: Vec<GroupProps>,
    pub is_ready: bool,
}

pub struct State {
    registry: Arc<Registry>,
    scenes: HashMap<SceneId, Scene>,
    groups: HashMap<GroupId, Group>,
    participant: Participant,
    is_ready: bool,
    events: broadcast::Sender<StateEvent>,
}

impl State {
    pub fn new(registry: Arc<Registry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            scenes: HashMap::new(),
            groups: HashMap::new(),
            participant: Participant::default(),
            is_ready: false,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scenes(&self) -> &HashMap<SceneId, Scene> {
        &self.scenes
    }

    pub fn scene(&self, scene_id: &SceneId) -> Option<&Scene> {
        self.scenes.get(scene_id)
    }

    pub fn groups(&self) -> &HashMap<GroupId, Group> {
        &self.groups
    }

    pub fn group(&self, group_id: &GroupId) -> Option<&Group> {
        self.groups.get(group_id)
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// The participant's group, or `None` before the first participant
    /// update or after that group was deleted.
    pub fn participant_group(&self) -> Option<&Group> {
        self.participant
            .group_id()
            .and_then(|group_id| self.groups.get(group_id))
    }

    /// The scene the participant is currently looking at.
    pub fn participant_scene(&self) -> Option<&Scene> {
        self.participant_group()
            .and_then(|group| self.scenes.get(group.scene_id()))
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn dump(&self) -> StateDump {
        let mut scenes: Vec<SceneProps> = self.scenes.values().map(Scene::to_object).collect();
        scenes.sort_by(|a, b| a.scene_id.cmp(&b.scene_id));
        let mut groups: Vec<GroupProps> = self
            .groups
            .values()
            .map(|group| group.resource().to_object())
            .collect();
        groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        StateDump {
            participant: self.participant.to_object(),
            scenes,
            groups,
            is_ready: self.is_ready,
        }
    }

    /// Applies one inbound event.
    pub fn apply(&mut self, event: ChannelEvent) -> Result<(), StateError> {
        match event {
            ChannelEvent::SceneCreate(batch) => self.on_scene_create(batch),
            ChannelEvent::SceneUpdate(batch) => self.on_scene_update(batch),
            ChannelEvent::SceneDelete(event) => self.on_scene_delete(event),
            ChannelEvent::ControlCreate(batch) => self.on_control_create(batch),
            ChannelEvent::ControlUpdate(batch) => self.on_control_update(batch),
            ChannelEvent::ControlDelete(event) => self.on_control_delete(event),
            ChannelEvent::GroupCreate(batch) => self.on_group_create(batch),
            ChannelEvent::GroupUpdate(batch) => self.on_group_update(batch),
            ChannelEvent::GroupDelete(event) => self.on_group_delete(event),
            ChannelEvent::ParticipantUpdate(batch) => self.on_participant_update(batch),
            ChannelEvent::ParticipantJoin(batch) => self.on_participant_join(batch),
            ChannelEvent::Ready(event) => {
                self.on_ready(event);
                Ok(())
            }
        }
    }

    pub fn on_scene_create(&mut self, batch: SceneBatch) -> Result<(), StateError> {
        self.guarded("onSceneCreate", |state| state.create_scenes(batch))
    }

    pub fn on_scene_update(&mut self, batch: SceneBatch) -> Result<(), StateError> {
        self.guarded("onSceneUpdate", |state| state.update_scenes(batch))
    }

    pub fn on_scene_delete(&mut self, event: SceneDelete) -> Result<(), StateError> {
        self.guarded("onSceneDelete", |state| state.delete_scene(event))
    }

    pub fn on_control_create(&mut self, batch: ControlBatch) -> Result<(), StateError> {
        self.guarded("onControlCreate", |state| state.create_controls(batch))
    }

    pub fn on_control_update(&mut self, batch: ControlBatch) -> Result<(), StateError> {
        self.guarded("onControlUpdate", |state| state.update_controls(batch))
    }

    pub fn on_control_delete(&mut self, event: ControlDelete) -> Result<(), StateError> {
        self.guarded("onControlDelete", |state| state.delete_controls(event))
    }

    pub fn on_group_create(&mut self, batch: GroupBatch) -> Result<(), StateError> {
        self.guarded("onGroupCreate", |state| state.create_groups(batch))
    }

    pub fn on_group_update(&mut self, batch: GroupBatch) -> Result<(), StateError> {
        self.guarded("onGroupUpdate", |state| state.update_groups(batch))
    }

    pub fn on_group_delete(&mut self, event: GroupDelete) -> Result<(), StateError> {
        self.guarded("onGroupDelete", |state| state.delete_group(event))
    }

    pub fn on_participant_update(&mut self, batch: ParticipantBatch) -> Result<(), StateError> {
        self.guarded("onParticipantUpdate", |state| state.update_participant(batch))
    }

    pub fn on_participant_join(&mut self, batch: ParticipantBatch) -> Result<(), StateError> {
        self.guarded("onParticipantJoin", |state| state.update_participant(batch))
    }

    pub fn on_ready(&mut self, event: ReadyEvent) {
        self.is_ready = event.is_ready;
        debug!(is_ready = event.is_ready, "state: ready changed");
        let _ = self.events.send(StateEvent::Ready(event.is_ready));
    }

    /// Logs and swallows precondition violations raised by `handler`.
    fn guarded<F>(&mut self, method: &'static str, handler: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut Self) -> Result<(), StateError>,
    {
        match handler(self) {
            Err(StateError::Precondition(message)) => {
                error!(method, "state: dropped event: {message}");
                Ok(())
            }
            outcome => outcome,
        }
    }

    fn create_scenes(&mut self, batch: SceneBatch) -> Result<(), StateError> {
        let mut incoming = HashSet::new();
        for scene in &batch.scenes {
            precondition!(
                !self.scenes.contains_key(&scene.scene_id) && incoming.insert(&scene.scene_id),
                "Tried to create scene \"{}\", but it already exists",
                scene.scene_id
            );
            let mut control_ids = HashSet::new();
            for control in &scene.controls {
                precondition!(
                    control_ids.insert(&control.control_id),
                    "Tried to create scene \"{}\" with control \"{}\" listed twice",
                    scene.scene_id,
                    control.control_id
                );
            }
        }

        let created = batch
            .scenes
            .into_iter()
            .map(|props| Scene::new(props, &self.registry))
            .collect::<Result<Vec<_>, _>>()?;
        for scene in created {
            let snapshot = scene.to_object();
            debug!(
                scene_id = %snapshot.scene_id,
                controls = snapshot.controls.len(),
                "state: scene created"
            );
            self.scenes.insert(snapshot.scene_id.clone(), scene);
            let _ = self.events.send(StateEvent::SceneCreated(snapshot));
        }
        Ok(())
    }

    fn update_scenes(&mut self, batch: SceneBatch) -> Result<(), StateError> {
        for scene in &batch.scenes {
            precondition!(
                self.scenes.contains_key(&scene.scene_id),
                "Tried to update scene \"{}\", but it didn't exist",
                scene.scene_id
            );
        }

        for props in batch.scenes {
            if let Some(scene) = self.scenes.get_mut(&props.scene_id) {
                scene.update(props, &self.registry)?;
            }
        }
        Ok(())
    }

    fn delete_scene(&mut self, event: SceneDelete) -> Result<(), StateError> {
        precondition!(
            self.scenes.contains_key(&event.scene_id),
            "Tried to delete scene \"{}\", but it didn't exist",
            event.scene_id
        );

        let orphaned: Vec<&GroupId> = self
            .groups
            .values()
            .filter(|group| group.scene_id() == &event.scene_id)
            .map(Group::id)
            .collect();
        if !orphaned.is_empty() {
            warn!(
                scene_id = %event.scene_id,
                reassign_scene_id = ?event.reassign_scene_id,
                groups = ?orphaned,
                "state: deleted scene is still assigned to groups"
            );
        }

        if let Some(scene) = self.scenes.remove(&event.scene_id) {
            let _ = self.events.send(StateEvent::SceneDeleted {
                scene: scene.to_object(),
                event: event.clone(),
            });
            scene.notify_delete(&DeleteReason::Scene(event));
        }
        Ok(())
    }

    fn create_controls(&mut self, batch: ControlBatch) -> Result<(), StateError> {
        let Some(scene) = self.scenes.get_mut(&batch.scene_id) else {
            return Err(StateError::Precondition(format!(
                "Tried to create controls in \"{}\", but it didn't exist",
                batch.scene_id
            )));
        };

        let mut incoming = HashSet::new();
        for control in &batch.controls {
            precondition!(
                scene.control(&control.control_id).is_none()
                    && incoming.insert(&control.control_id),
                "Tried to create control \"{}\" in \"{}\", but it already exists",
                control.control_id,
                batch.scene_id
            );
        }

        scene.create_controls(batch.controls, &self.registry)
    }

    fn update_controls(&mut self, batch: ControlBatch) -> Result<(), StateError> {
        let Some(scene) = self.scenes.get_mut(&batch.scene_id) else {
            return Err(StateError::Precondition(format!(
                "Tried to update controls in \"{}\", but it didn't exist",
                batch.scene_id
            )));
        };
        scene.update_controls(batch.controls, &self.registry)
    }

    fn delete_controls(&mut self, event: ControlDelete) -> Result<(), StateError> {
        let Some(scene) = self.scenes.get_mut(&event.scene_id) else {
            return Err(StateError::Precondition(format!(
                "Tried to delete controls in \"{}\", but it didn't exist",
                event.scene_id
            )));
        };
        let removed = scene.delete_controls(&event.controls);
        debug!(
            scene_id = %event.scene_id,
            requested = event.controls.len(),
            removed,
            "state: controls deleted"
        );
        Ok(())
    }

    fn create_groups(&mut self, batch: GroupBatch) -> Result<(), StateError> {
        let mut incoming = HashSet::new();
        for group in &batch.groups {
            precondition!(
                !self.groups.contains_key(&group.group_id) && incoming.insert(&group.group_id),
                "Tried to create group \"{}\", but it already exists",
                group.group_id
            );
            precondition!(
                self.scenes.contains_key(&group.scene_id),
                "Tried to assign group \"{}\" to \"{}\", but it didn't exist",
                group.group_id,
                group.scene_id
            );
        }

        for props in batch.groups {
            debug!(
                group_id = %props.group_id,
                scene_id = %props.scene_id,
                "state: group created"
            );
            self.groups.insert(props.group_id.clone(), Group::new(props.clone()));
            let _ = self.events.send(StateEvent::GroupCreated(props));
        }
        Ok(())
    }

    fn update_groups(&mut self, batch: GroupBatch) -> Result<(), StateError> {
        for group in &batch.groups {
            precondition!(
                self.groups.contains_key(&group.group_id),
                "Tried to update group \"{}\", but it didn't exist",
                group.group_id
            );
            precondition!(
                self.scenes.contains_key(&group.scene_id),
                "Tried to assign group \"{}\" to \"{}\", but it didn't exist",
                group.group_id,
                group.scene_id
            );
        }

        for props in batch.groups {
            let is_own_group = self.participant.group_id() == Some(&props.group_id);
            if let Some(group) = self.groups.get_mut(&props.group_id) {
                group.update(props.clone());
            }
            if is_own_group {
                self.participant.notify_group_update(&props);
            }
        }
        Ok(())
    }

    fn delete_group(&mut self, event: GroupDelete) -> Result<(), StateError> {
        precondition!(
            self.groups.contains_key(&event.group_id),
            "Tried to delete group \"{}\", but it didn't exist",
            event.group_id
        );

        if self.participant.group_id() == Some(&event.group_id) {
            warn!(
                group_id = %event.group_id,
                reassign_group_id = ?event.reassign_group_id,
                "state: deleted the participant's group"
            );
        }

        if let Some(group) = self.groups.remove(&event.group_id) {
            let _ = self.events.send(StateEvent::GroupDeleted {
                group: group.resource().to_object(),
                event: event.clone(),
            });
            group.notify_delete(&DeleteReason::Group(event));
        }
        Ok(())
    }

    fn update_participant(&mut self, batch: ParticipantBatch) -> Result<(), StateError> {
        let mut participants = batch.participants.into_iter();
        let Some(props) = participants.next() else {
            return Err(StateError::Precondition(
                "Tried to update the participant, but the event listed none".to_string(),
            ));
        };
        if participants.next().is_some() {
            warn!("state: participant event listed more than one participant; using the first");
        }
        self.participant.update(props, &self.groups)
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
