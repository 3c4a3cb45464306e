use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ControlId, GroupId, SceneId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlProps {
    #[serde(rename = "controlID")]
    pub control_id: ControlId,
    pub kind: String,
    #[serde(default)]
    pub disabled: bool,
    /// Kind-specific configuration (position, text, cost, ...).
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl ControlProps {
    pub fn new(control_id: impl Into<ControlId>, kind: impl Into<String>) -> Self {
        Self {
            control_id: control_id.into(),
            kind: kind.into(),
            disabled: false,
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneProps {
    #[serde(rename = "sceneID")]
    pub scene_id: SceneId,
    #[serde(default)]
    pub controls: Vec<ControlProps>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl SceneProps {
    pub fn new(scene_id: impl Into<SceneId>) -> Self {
        Self {
            scene_id: scene_id.into(),
            controls: Vec::new(),
            meta: Map::new(),
        }
    }

    pub fn with_controls(mut self, controls: Vec<ControlProps>) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProps {
    #[serde(rename = "groupID")]
    pub group_id: GroupId,
    #[serde(rename = "sceneID")]
    pub scene_id: SceneId,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl GroupProps {
    pub fn new(group_id: impl Into<GroupId>, scene_id: impl Into<SceneId>) -> Self {
        Self {
            group_id: group_id.into(),
            scene_id: scene_id.into(),
            meta: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantProps {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "userID", default)]
    pub user_id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub level: u32,
    #[serde(rename = "groupID")]
    pub group_id: GroupId,
    #[serde(default)]
    pub disabled: bool,
    #[serde(
        rename = "connectedAt",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "lastInputAt",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_input_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl ParticipantProps {
    pub fn new(session_id: impl Into<String>, group_id: impl Into<GroupId>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: 0,
            username: String::new(),
            level: 0,
            group_id: group_id.into(),
            disabled: false,
            connected_at: None,
            last_input_at: None,
            meta: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneBatch {
    pub scenes: Vec<SceneProps>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDelete {
    #[serde(rename = "sceneID")]
    pub scene_id: SceneId,
    #[serde(
        rename = "reassignSceneID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reassign_scene_id: Option<SceneId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlBatch {
    #[serde(rename = "sceneID")]
    pub scene_id: SceneId,
    pub controls: Vec<ControlProps>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRef {
    #[serde(rename = "controlID")]
    pub control_id: ControlId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDelete {
    #[serde(rename = "sceneID")]
    pub scene_id: SceneId,
    pub controls: Vec<ControlRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBatch {
    pub groups: Vec<GroupProps>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDelete {
    #[serde(rename = "groupID")]
    pub group_id: GroupId,
    #[serde(
        rename = "reassignGroupID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reassign_group_id: Option<GroupId>,
}

/// Carries exactly one entry, the local client's own participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantBatch {
    pub participants: Vec<ParticipantProps>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyEvent {
    #[serde(rename = "isReady")]
    pub is_ready: bool,
}

/// Inbound events pushed by the remote channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ChannelEvent {
    #[serde(rename = "onSceneCreate")]
    SceneCreate(SceneBatch),
    #[serde(rename = "onSceneUpdate")]
    SceneUpdate(SceneBatch),
    #[serde(rename = "onSceneDelete")]
    SceneDelete(SceneDelete),
    #[serde(rename = "onControlCreate")]
    ControlCreate(ControlBatch),
    #[serde(rename = "onControlUpdate")]
    ControlUpdate(ControlBatch),
    #[serde(rename = "onControlDelete")]
    ControlDelete(ControlDelete),
    #[serde(rename = "onGroupCreate")]
    GroupCreate(GroupBatch),
    #[serde(rename = "onGroupUpdate")]
    GroupUpdate(GroupBatch),
    #[serde(rename = "onGroupDelete")]
    GroupDelete(GroupDelete),
    #[serde(rename = "onParticipantUpdate")]
    ParticipantUpdate(ParticipantBatch),
    #[serde(rename = "onParticipantJoin")]
    ParticipantJoin(ParticipantBatch),
    #[serde(rename = "onReady")]
    Ready(ReadyEvent),
}

impl ChannelEvent {
    /// Wire name of the event.
    pub fn method(&self) -> &'static str {
        match self {
            Self::SceneCreate(_) => "onSceneCreate",
            Self::SceneUpdate(_) => "onSceneUpdate",
            Self::SceneDelete(_) => "onSceneDelete",
            Self::ControlCreate(_) => "onControlCreate",
            Self::ControlUpdate(_) => "onControlUpdate",
            Self::ControlDelete(_) => "onControlDelete",
            Self::GroupCreate(_) => "onGroupCreate",
            Self::GroupUpdate(_) => "onGroupUpdate",
            Self::GroupDelete(_) => "onGroupDelete",
            Self::ParticipantUpdate(_) => "onParticipantUpdate",
            Self::ParticipantJoin(_) => "onParticipantJoin",
            Self::Ready(_) => "onReady",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(rename = "controlID")]
    pub control_id: ControlId,
    pub event: String,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

/// Outbound calls issued to the remote channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ClientCall {
    #[serde(rename = "giveInput")]
    GiveInput(InputEvent),
}

impl ClientCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::GiveInput(_) => "giveInput",
        }
    }
}
