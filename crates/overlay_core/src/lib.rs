//! Client-side replica of an interactive overlay session.
//!
//! [`State`] owns every scene, group and the local participant and applies
//! inbound channel events to them. [`Registry`] maps scene ids and control
//! kinds to the UI components that render them.

pub mod error;
mod group;
pub mod observer;
pub mod registry;
mod resource;
mod scene;
mod state;
pub mod transport;

pub use error::{RegistryError, StateError};
pub use group::{Group, Participant};
pub use observer::{Observers, Subscription};
pub use registry::{
    Component, ControlDescriptor, DimensionLock, InputDescriptor, Registration, Registry,
    SceneDescriptor,
};
pub use resource::{DeleteReason, Resource};
pub use scene::{Control, Scene};
pub use state::{State, StateDump, StateEvent};
pub use transport::{
    run_session, MissingRemoteChannel, Outbox, OutboxClosed, OutboxReceiver, RemoteChannel,
};
