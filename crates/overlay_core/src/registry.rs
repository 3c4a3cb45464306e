//! Descriptor store mapping scene ids and control kinds to UI components.
//!
//! Scenes resolve by exact id first and fall back to the single default
//! descriptor. Controls resolve by exact kind only. Registration happens once
//! at startup, before any protocol event is applied.

use std::{any::Any, fmt, sync::Arc};

use overlay_protocol::domain::SceneId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{error::RegistryError, scene::Control};

/// Type-erased component constructor supplied by the UI layer.
#[derive(Clone)]
pub struct Component {
    name: String,
    constructor: Arc<dyn Any + Send + Sync>,
}

impl Component {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, constructor: T) -> Self {
        Self {
            name: name.into(),
            constructor: Arc::new(constructor),
        }
    }

    /// A component known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, ())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn downcast<T: Any>(&self) -> Option<&T> {
        self.constructor.downcast_ref::<T>()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct SceneDescriptor {
    pub id: Option<SceneId>,
    pub default: bool,
    pub component: Component,
}

impl SceneDescriptor {
    /// Handles every scene without a more specific descriptor.
    pub fn default_scene(component: Component) -> Self {
        Self {
            id: None,
            default: true,
            component,
        }
    }

    pub fn for_id(id: impl Into<SceneId>, component: Component) -> Self {
        Self {
            id: Some(id.into()),
            default: false,
            component,
        }
    }
}

/// Bounds the studio editor enforces on a control's dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "property", rename_all = "camelCase")]
pub enum DimensionLock {
    AspectRatio {
        minimum: f64,
        maximum: f64,
    },
    Width {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Height {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
}

/// A remotely configurable property declared by a control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub property_name: String,
    /// Wire name of the property; defaults to `property_name`.
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lock: Vec<DimensionLock>,
}

impl InputDescriptor {
    pub fn new(property_name: impl Into<String>) -> Self {
        let property_name = property_name.into();
        Self {
            alias: property_name.clone(),
            property_name,
            default_value: None,
            lock: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_lock(mut self, lock: DimensionLock) -> Self {
        self.lock.push(lock);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ControlDescriptor {
    pub kind: String,
    pub component: Component,
    pub inputs: Vec<InputDescriptor>,
}

impl ControlDescriptor {
    pub fn new(kind: impl Into<String>, component: Component) -> Self {
        Self {
            kind: kind.into(),
            component,
            inputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: InputDescriptor) -> Self {
        self.inputs.push(input);
        self
    }
}

#[derive(Debug, Clone)]
pub enum Registration {
    Scene(SceneDescriptor),
    Control(ControlDescriptor),
}

impl From<SceneDescriptor> for Registration {
    fn from(value: SceneDescriptor) -> Self {
        Self::Scene(value)
    }
}

impl From<ControlDescriptor> for Registration {
    fn from(value: ControlDescriptor) -> Self {
        Self::Control(value)
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    scenes: Vec<SceneDescriptor>,
    controls: Vec<ControlDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers descriptors in order. Fails on the first conflicting one;
    /// descriptors before it stay registered.
    pub fn register<I>(&mut self, registrations: I) -> Result<&mut Self, RegistryError>
    where
        I: IntoIterator,
        I::Item: Into<Registration>,
    {
        for registration in registrations {
            match registration.into() {
                Registration::Scene(descriptor) => self.register_scene(descriptor)?,
                Registration::Control(descriptor) => self.register_control(descriptor)?,
            }
        }
        Ok(self)
    }

    fn register_scene(&mut self, descriptor: SceneDescriptor) -> Result<(), RegistryError> {
        if descriptor.id.is_none() && !descriptor.default {
            return Err(RegistryError::UnreachableScene {
                component: descriptor.component.name().to_string(),
            });
        }

        if let Some(id) = &descriptor.id {
            if let Some(existing) = self.scenes.iter().find(|s| s.id.as_ref() == Some(id)) {
                return Err(RegistryError::DuplicateSceneId {
                    id: id.clone(),
                    existing: existing.component.name().to_string(),
                    incoming: descriptor.component.name().to_string(),
                });
            }
        }

        if descriptor.default {
            if let Some(slot) = self.scenes.iter_mut().find(|s| s.default) {
                debug!(
                    replaced = slot.component.name(),
                    component = descriptor.component.name(),
                    "registry: replacing default scene"
                );
                *slot = descriptor;
                return Ok(());
            }
        }

        self.scenes.push(descriptor);
        Ok(())
    }

    fn register_control(&mut self, descriptor: ControlDescriptor) -> Result<(), RegistryError> {
        if let Some(existing) = self.controls.iter().find(|c| c.kind == descriptor.kind) {
            return Err(RegistryError::DuplicateControlKind {
                kind: descriptor.kind,
                existing: existing.component.name().to_string(),
                incoming: descriptor.component.name().to_string(),
            });
        }
        self.controls.push(descriptor);
        Ok(())
    }

    /// Declares an input on an already registered control kind.
    pub fn register_input(
        &mut self,
        kind: &str,
        input: InputDescriptor,
    ) -> Result<&mut Self, RegistryError> {
        let Some(control) = self.controls.iter_mut().find(|c| c.kind == kind) else {
            return Err(RegistryError::InputOnUnknownControl {
                kind: kind.to_string(),
                property_name: input.property_name,
            });
        };
        control.inputs.push(input);
        Ok(self)
    }

    pub fn get_scene(&self, scene_id: &SceneId) -> Result<&SceneDescriptor, RegistryError> {
        self.scenes
            .iter()
            .find(|s| s.id.as_ref() == Some(scene_id))
            .or_else(|| self.scenes.iter().find(|s| s.default))
            .ok_or_else(|| RegistryError::MissingScene {
                scene_id: scene_id.clone(),
            })
    }

    pub fn get_control(&self, kind: &str) -> Result<&ControlDescriptor, RegistryError> {
        self.controls
            .iter()
            .find(|c| c.kind == kind)
            .ok_or_else(|| RegistryError::MissingControl {
                kind: kind.to_string(),
            })
    }

    /// Declared inputs of the control's kind, in declaration order.
    pub fn get_inputs(&self, control: &Control) -> Result<&[InputDescriptor], RegistryError> {
        self.get_control(control.kind())
            .map(|descriptor| descriptor.inputs.as_slice())
    }

    /// Current value of each declared input, keyed by property name. Inputs
    /// are read by their wire alias and fall back to the declared default;
    /// inputs with neither are omitted.
    pub fn input_values(&self, control: &Control) -> Result<Map<String, Value>, RegistryError> {
        let mut values = Map::new();
        for input in self.get_inputs(control)? {
            let value = control
                .resource()
                .field(&input.alias)
                .or_else(|| input.default_value.clone());
            if let Some(value) = value {
                values.insert(input.property_name.clone(), value);
            }
        }
        Ok(values)
    }

    pub fn scenes(&self) -> &[SceneDescriptor] {
        &self.scenes
    }

    pub fn controls(&self) -> &[ControlDescriptor] {
        &self.controls
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
