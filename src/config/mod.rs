pub mod schema;
pub mod watcher;

use crate::error::{DeckError, Result};
use schema::{AppSettings, ButtonRegistry};
use std::path::Path;

pub const BUTTONS_FILE: &str = "buttons.json";
pub const SETTINGS_FILE: &str = "settings.json";

/// Both persisted documents. Either file may be absent; the defaults
/// match what the documents would contain on first run.
#[derive(Debug, Clone, Default)]
pub struct DeckConfig {
    pub settings: AppSettings,
    pub registry: ButtonRegistry,
}

/// Load both documents from a config directory.
///
/// # Errors
/// Returns `DeckError::Json` on syntax errors, `DeckError::Config` or
/// `DeckError::DuplicateButtonId` on validation failures,
/// `DeckError::Io` on read errors. Missing files are not errors.
pub fn load(dir: &Path) -> Result<DeckConfig> {
    let settings = match read_if_present(&dir.join(SETTINGS_FILE))? {
        Some(content) => serde_json::from_str(&expand_env_vars(&content))?,
        None => AppSettings::default(),
    };
    let registry = match read_if_present(&dir.join(BUTTONS_FILE))? {
        Some(content) => serde_json::from_str::<ButtonRegistry>(&content)?,
        None => ButtonRegistry::default(),
    };

    let config = DeckConfig { settings, registry };
    validate(&config)?;
    Ok(config)
}

/// Write the button document.
///
/// # Errors
/// Returns `DeckError::Io` on write failure.
pub fn save_registry(dir: &Path, registry: &ButtonRegistry) -> Result<()> {
    let content = serde_json::to_string_pretty(registry)?;
    std::fs::write(dir.join(BUTTONS_FILE), content)?;
    Ok(())
}

/// Write the settings document.
///
/// # Errors
/// Returns `DeckError::Io` on write failure.
pub fn save_settings(dir: &Path, settings: &AppSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(dir.join(SETTINGS_FILE), content)?;
    Ok(())
}

fn read_if_present(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}

/// Expand `${VAR}` and `$VAR` patterns, so a settings document can
/// reference the password via the environment instead of carrying it.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                if let Ok(val) = std::env::var(&var_name) {
                    result.push_str(&val);
                } else {
                    // Keep original if env var not found
                    use std::fmt::Write;
                    let _ = write!(result, "${{{var_name}}}");
                }
            } else {
                let var_name: String = chars
                    .by_ref()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if var_name.is_empty() {
                    result.push('$');
                } else if let Ok(val) = std::env::var(&var_name) {
                    result.push_str(&val);
                } else {
                    result.push('$');
                    result.push_str(&var_name);
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Validate config constraints.
fn validate(config: &DeckConfig) -> Result<()> {
    let address = &config.settings.obs_address;
    if !address.is_empty() && !address.starts_with("ws://") && !address.starts_with("wss://") {
        return Err(DeckError::Config(format!(
            "obsAddress must be a ws:// or wss:// URL, got '{address}'"
        )));
    }

    config.registry.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ButtonDraft;

    #[test]
    fn env_var_expansion() {
        std::env::set_var("OBSDECK_TEST_VAR", "hunter2");
        let result = expand_env_vars(r#""obsPassword": "${OBSDECK_TEST_VAR}""#);
        assert_eq!(result, r#""obsPassword": "hunter2""#);
        std::env::remove_var("OBSDECK_TEST_VAR");
    }

    #[test]
    fn env_var_missing_kept() {
        let result = expand_env_vars(r#""obsPassword": "${OBSDECK_NONEXISTENT}""#);
        assert_eq!(result, r#""obsPassword": "${OBSDECK_NONEXISTENT}""#);
    }

    #[test]
    fn empty_dir_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path()).unwrap();
        assert!(!config.settings.is_configured());
        assert!(config.registry.buttons.is_empty());
    }

    #[test]
    fn document_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut registry = ButtonRegistry::default();
        registry.add(ButtonDraft {
            name: "Stream".into(),
            scene_name: "Scene A".into(),
            ..Default::default()
        });
        let settings = AppSettings {
            obs_address: "ws://localhost:4455".into(),
            obs_password: "secret".into(),
            ..Default::default()
        };

        save_registry(dir.path(), &registry).unwrap();
        save_settings(dir.path(), &settings).unwrap();

        let config = load(dir.path()).unwrap();
        assert_eq!(config.settings, settings);
        assert_eq!(config.registry.buttons, registry.buttons);
    }

    #[test]
    fn bad_address_scheme_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "obsAddress": "localhost:4455", "obsPassword": "x" }"#,
        )
        .unwrap();
        assert!(matches!(load(dir.path()), Err(DeckError::Config(_))));
    }

    #[test]
    fn duplicate_ids_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(BUTTONS_FILE),
            r#"{ "buttons": [ { "id": "same" }, { "id": "same" } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(DeckError::DuplicateButtonId(_))
        ));
    }
}
