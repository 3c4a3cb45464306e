use overlay_protocol::{
    domain::{ControlId, SceneId},
    protocol::{GroupDelete, SceneDelete},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::observer::{Observers, Subscription};

/// Payload of a resource's `delete` notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteReason {
    /// The scene itself, or the scene owning a control, was deleted.
    Scene(SceneDelete),
    Group(GroupDelete),
    Control {
        scene_id: SceneId,
        control_id: ControlId,
    },
}

/// A server-synchronized property bag with change notifications.
///
/// `props` is only ever replaced wholesale; there is no patch path.
#[derive(Debug)]
pub struct Resource<P> {
    props: P,
    updates: Observers<P>,
    deletes: Observers<DeleteReason>,
}

impl<P: Serialize + Clone + 'static> Resource<P> {
    pub(crate) fn new(props: P) -> Self {
        Self {
            props,
            updates: Observers::new(),
            deletes: Observers::new(),
        }
    }

    pub fn props(&self) -> &P {
        &self.props
    }

    /// Returns the current snapshot.
    pub fn to_object(&self) -> P {
        self.props.clone()
    }

    /// Raw field lookup by wire name.
    pub fn field(&self, key: &str) -> Option<Value> {
        read_field(&self.props, key)
    }

    /// Reads a field by wire name, or `default` when it is absent, `null`
    /// or not a `V`.
    pub fn get<V: DeserializeOwned>(&self, key: &str, default: V) -> V {
        read_field_or(&self.props, key, default)
    }

    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.updates.subscribe(callback)
    }

    pub fn on_delete<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeleteReason) + Send + Sync + 'static,
    {
        self.deletes.subscribe(callback)
    }

    pub(crate) fn update(&mut self, props: P) {
        self.props = props;
        self.updates.notify(&self.props);
    }

    /// Stores `props` without notifying. Callers follow up with
    /// [`Resource::notify_update`].
    pub(crate) fn replace(&mut self, props: P) {
        self.props = props;
    }

    pub(crate) fn notify_update(&self, snapshot: &P) {
        self.updates.notify(snapshot);
    }

    pub(crate) fn notify_delete(&self, reason: &DeleteReason) {
        self.deletes.notify(reason);
    }
}

pub(crate) fn read_field<P: Serialize>(props: &P, key: &str) -> Option<Value> {
    match serde_json::to_value(props) {
        Ok(Value::Object(mut fields)) => fields.remove(key).filter(|value| !value.is_null()),
        _ => None,
    }
}

pub(crate) fn read_field_or<P: Serialize, V: DeserializeOwned>(
    props: &P,
    key: &str,
    default: V,
) -> V {
    match read_field(props, key) {
        Some(value) => serde_json::from_value(value).unwrap_or(default),
        None => default,
    }
}
