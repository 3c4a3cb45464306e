use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use overlay_core::{
    Component, ControlDescriptor, InputDescriptor, Registration, Registry, RegistryError,
    SceneDescriptor,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_filter: String,
    pub events_path: Option<PathBuf>,
    /// Component handling every scene without a specific entry.
    pub default_scene: Option<String>,
    /// Scene id to component name.
    pub scenes: BTreeMap<String, String>,
    pub controls: Vec<ControlSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlSettings {
    pub kind: String,
    pub component: String,
    #[serde(default)]
    pub inputs: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            events_path: None,
            default_scene: Some("DefaultScene".into()),
            scenes: BTreeMap::new(),
            controls: vec![
                ControlSettings {
                    kind: "button".into(),
                    component: "Button".into(),
                    inputs: vec!["text".into(), "cost".into(), "keyCode".into()],
                },
                ControlSettings {
                    kind: "joystick".into(),
                    component: "Joystick".into(),
                    inputs: vec!["sampleRate".into()],
                },
            ],
        }
    }
}

impl Settings {
    pub fn registry(&self) -> Result<Registry, RegistryError> {
        let mut registrations: Vec<Registration> = Vec::new();
        if let Some(component) = &self.default_scene {
            let descriptor = SceneDescriptor::default_scene(Component::named(component));
            registrations.push(descriptor.into());
        }
        for (scene_id, component) in &self.scenes {
            let component = Component::named(component);
            registrations.push(SceneDescriptor::for_id(scene_id.as_str(), component).into());
        }
        for control in &self.controls {
            let descriptor = control.inputs.iter().fold(
                ControlDescriptor::new(&control.kind, Component::named(&control.component)),
                |descriptor, input| descriptor.with_input(InputDescriptor::new(input)),
            );
            registrations.push(descriptor.into());
        }

        let mut registry = Registry::new();
        registry.register(registrations)?;
        Ok(registry)
    }
}

/// Reads `path` if it exists, then applies environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()))
}

pub fn apply_env_overrides<F>(mut settings: Settings, lookup: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("REPLAY_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(v) = lookup("REPLAY_EVENTS") {
        settings.events_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("APP__EVENTS_PATH") {
        settings.events_path = Some(PathBuf::from(v));
    }

    if let Some(v) = lookup("APP__DEFAULT_SCENE") {
        settings.default_scene = if v.trim().is_empty() { None } else { Some(v) };
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
