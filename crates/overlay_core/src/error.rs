use overlay_protocol::domain::SceneId;
use thiserror::Error;

/// Configuration defects detected while registering or resolving components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(
        "duplicate scene IDs registered: both {existing} and {incoming} registered \
         themselves for scene ID \"{id}\""
    )]
    DuplicateSceneId {
        id: SceneId,
        existing: String,
        incoming: String,
    },
    #[error(
        "duplicate controls registered: both {existing} and {incoming} registered \
         themselves for control kind \"{kind}\""
    )]
    DuplicateControlKind {
        kind: String,
        existing: String,
        incoming: String,
    },
    #[error(
        "no scene registered for scene ID \"{scene_id}\"; register a default scene \
         or one specifically for this ID"
    )]
    MissingScene { scene_id: SceneId },
    #[error(
        "scene component {component} has neither a scene ID nor the default flag; \
         no scene could ever resolve to it"
    )]
    UnreachableScene { component: String },
    #[error("no control registered for kind \"{kind}\"; register a control for this kind")]
    MissingControl { kind: String },
    #[error(
        "tried to register input {property_name} for kind \"{kind}\", but no control \
         is registered for that kind"
    )]
    InputOnUnknownControl { kind: String, property_name: String },
}

#[derive(Debug, Error)]
pub enum StateError {
    /// An inbound event contradicted the replica. The event is dropped.
    #[error("{0}")]
    Precondition(String),
    #[error("{entity} has no registered component: {source}")]
    Configuration {
        entity: String,
        #[source]
        source: RegistryError,
    },
}

impl StateError {
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

/// Returns a [`StateError::Precondition`] from the enclosing function when
/// `cond` does not hold.
macro_rules! precondition {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::StateError::Precondition(format!($($arg)+)));
        }
    };
}

pub(crate) use precondition;
