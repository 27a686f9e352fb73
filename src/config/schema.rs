use crate::error::{DeckError, Result};
use crate::obs::ConnectionParams;
use serde::{Deserialize, Serialize};

/// Application settings document (`settings.json`).
///
/// Field names match the historical persisted shape, so a settings
/// document exported from the old UI loads unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Control server address, e.g. "ws://localhost:4455".
    #[serde(default)]
    pub obs_address: String,

    /// Control server password.
    #[serde(default)]
    pub obs_password: String,

    /// Milliseconds between reconnect attempts.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            obs_address: String::new(),
            obs_password: String::new(),
            retry_interval_ms: default_retry_interval(),
        }
    }
}

impl AppSettings {
    /// Whether both address and password are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.obs_address.is_empty() && !self.obs_password.is_empty()
    }

    /// Connection parameters for the connection manager.
    #[must_use]
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            address: self.obs_address.clone(),
            credential: self.obs_password.clone(),
        }
    }
}

/// Gradient and text colors for a button face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonStyle {
    #[serde(default = "default_color")]
    pub color_start: String,

    #[serde(default = "default_color")]
    pub color_end: String,

    #[serde(default = "default_text_color")]
    pub text_color: String,
}

impl Default for ButtonStyle {
    fn default() -> Self {
        Self {
            color_start: default_color(),
            color_end: default_color(),
            text_color: default_text_color(),
        }
    }
}

/// A single button definition.
///
/// `id` is assigned once at creation and never changes; the stored
/// image asset is keyed by it, so renaming a button cannot orphan the
/// asset. The style fields are flattened to keep the flat persisted
/// shape of the original documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonDefinition {
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Shell command to run on activation (empty = none).
    #[serde(default)]
    pub command: String,

    /// Scene to switch to on activation (empty = none).
    #[serde(default)]
    pub scene_name: String,

    #[serde(flatten)]
    pub style: ButtonStyle,

    /// File name of the stored image asset, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

impl ButtonDefinition {
    /// The actions this button fires on activation, in order.
    ///
    /// A button may carry both a command and a scene; both fire. A
    /// button with neither is inert and yields nothing.
    #[must_use]
    pub fn actions(&self) -> Vec<ButtonAction> {
        let mut actions = Vec::new();
        if !self.command.is_empty() {
            actions.push(ButtonAction::RunCommand {
                command: self.command.clone(),
            });
        }
        if !self.scene_name.is_empty() {
            actions.push(ButtonAction::SwitchScene {
                scene_name: self.scene_name.clone(),
            });
        }
        actions
    }

    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.command.is_empty() && self.scene_name.is_empty()
    }
}

/// One side-effecting action a button carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    RunCommand { command: String },
    SwitchScene { scene_name: String },
}

/// Mutable fields of a button, used for create and edit.
#[derive(Debug, Clone, Default)]
pub struct ButtonDraft {
    pub name: String,
    pub command: String,
    pub scene_name: String,
    pub style: ButtonStyle,
    pub image_name: Option<String>,
}

/// Ordered button collection (`buttons.json`). Order is display order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonRegistry {
    #[serde(default)]
    pub buttons: Vec<ButtonDefinition>,
}

impl ButtonRegistry {
    /// Create a button from a draft, assigning a fresh id.
    /// Returns the new id.
    pub fn add(&mut self, draft: ButtonDraft) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.buttons.push(ButtonDefinition {
            id: id.clone(),
            name: draft.name,
            command: draft.command,
            scene_name: draft.scene_name,
            style: draft.style,
            image_name: draft.image_name,
        });
        id
    }

    /// Replace every field of a button except its id.
    ///
    /// # Errors
    /// Returns `DeckError::ButtonNotFound` if no button has this id.
    pub fn edit(&mut self, id: &str, draft: ButtonDraft) -> Result<()> {
        let button = self
            .buttons
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| DeckError::ButtonNotFound(id.to_string()))?;
        button.name = draft.name;
        button.command = draft.command;
        button.scene_name = draft.scene_name;
        button.style = draft.style;
        button.image_name = draft.image_name;
        Ok(())
    }

    /// Remove a button, returning its definition.
    ///
    /// # Errors
    /// Returns `DeckError::ButtonNotFound` if no button has this id.
    pub fn remove(&mut self, id: &str) -> Result<ButtonDefinition> {
        let idx = self
            .buttons
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| DeckError::ButtonNotFound(id.to_string()))?;
        Ok(self.buttons.remove(idx))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ButtonDefinition> {
        self.buttons.iter().find(|b| b.id == id)
    }

    /// Look up a button by id first, then by display name.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<&ButtonDefinition> {
        self.get(key)
            .or_else(|| self.buttons.iter().find(|b| b.name == key))
    }

    /// Check the id-uniqueness invariant, e.g. after loading a
    /// hand-edited document.
    ///
    /// # Errors
    /// Returns `DeckError::DuplicateButtonId` naming the first duplicate.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for button in &self.buttons {
            if button.id.is_empty() {
                return Err(DeckError::Config(format!(
                    "button '{}' has an empty id",
                    button.name
                )));
            }
            if !seen.insert(button.id.as_str()) {
                return Err(DeckError::DuplicateButtonId(button.id.clone()));
            }
        }
        Ok(())
    }
}

// --- Defaults ---

fn default_retry_interval() -> u64 {
    crate::obs::DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_text_color() -> String {
    "#ff2600".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_historical_button_document() {
        let json = r##"{
            "buttons": [
                {
                    "id": "abc",
                    "name": "Stream",
                    "command": "",
                    "sceneName": "Scene A",
                    "colorStart": "#1a1a2e",
                    "colorEnd": "#16213e",
                    "textColor": "#e0e0e0",
                    "imageName": "abc.png"
                },
                {
                    "id": "def",
                    "name": "Lock",
                    "command": "loginctl lock-session",
                    "sceneName": ""
                }
            ]
        }"##;
        let registry: ButtonRegistry = serde_json::from_str(json).unwrap();
        registry.validate().unwrap();
        assert_eq!(registry.buttons.len(), 2);
        assert_eq!(registry.buttons[0].scene_name, "Scene A");
        assert_eq!(registry.buttons[0].image_name.as_deref(), Some("abc.png"));
        assert_eq!(registry.buttons[1].style, ButtonStyle::default());
    }

    #[test]
    fn settings_round_trip() {
        let json = r#"{ "obsAddress": "ws://localhost:4455", "obsPassword": "hunter2" }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert!(settings.is_configured());
        assert_eq!(settings.retry_interval_ms, 5000);

        let params = settings.connection_params();
        assert_eq!(params.address, "ws://localhost:4455");
        assert_eq!(params.credential, "hunter2");

        let out = serde_json::to_string(&settings).unwrap();
        assert!(out.contains("obsAddress"));
    }

    #[test]
    fn id_stable_across_edit() {
        let mut registry = ButtonRegistry::default();
        let id = registry.add(ButtonDraft {
            name: "Before".into(),
            scene_name: "Scene A".into(),
            ..Default::default()
        });

        registry
            .edit(
                &id,
                ButtonDraft {
                    name: "After".into(),
                    command: "notify-send hi".into(),
                    scene_name: "Scene B".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let button = registry.get(&id).unwrap();
        assert_eq!(button.id, id);
        assert_eq!(button.name, "After");
        assert_eq!(button.scene_name, "Scene B");
    }

    #[test]
    fn add_assigns_unique_ids() {
        let mut registry = ButtonRegistry::default();
        let a = registry.add(ButtonDraft::default());
        let b = registry.add(ButtonDraft::default());
        assert_ne!(a, b);
        registry.validate().unwrap();
    }

    #[test]
    fn duplicate_ids_rejected() {
        let json = r#"{
            "buttons": [
                { "id": "same", "name": "one" },
                { "id": "same", "name": "two" }
            ]
        }"#;
        let registry: ButtonRegistry = serde_json::from_str(json).unwrap();
        assert!(matches!(
            registry.validate(),
            Err(DeckError::DuplicateButtonId(id)) if id == "same"
        ));
    }

    #[test]
    fn both_actions_fire_neither_is_inert() {
        let both = ButtonDefinition {
            id: "x".into(),
            name: "Both".into(),
            command: "true".into(),
            scene_name: "Scene A".into(),
            style: ButtonStyle::default(),
            image_name: None,
        };
        assert_eq!(both.actions().len(), 2);
        assert!(matches!(
            both.actions()[0],
            ButtonAction::RunCommand { .. }
        ));

        let inert = ButtonDefinition {
            id: "y".into(),
            name: "Inert".into(),
            command: String::new(),
            scene_name: String::new(),
            style: ButtonStyle::default(),
            image_name: None,
        };
        assert!(inert.is_inert());
        assert!(inert.actions().is_empty());
    }
}
