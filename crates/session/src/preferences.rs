use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const PREFERENCES_DIRECTORY_NAME: &str = "loqui";
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Session-wide presentation preferences.
///
/// The message-control layer only reads these; writes happen through the
/// settings surface that owns the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UiPreferences {
    /// When false, messages tagged `system` are hidden from the display
    /// sequence.
    #[serde(default)]
    pub show_system_messages: bool,
}

/// Disk-backed preferences holder with lock-free reads.
pub struct PreferencesStore {
    preferences: Arc<ArcSwap<UiPreferences>>,
    config_path: PathBuf,
}

impl PreferencesStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(PREFERENCES_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".loqui"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(PREFERENCES_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let preferences = Self::load_from_disk(&config_path);
        Self {
            preferences: Arc::new(ArcSwap::from_pointee(preferences)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn preferences(&self) -> UiPreferences {
        **self.preferences.load()
    }

    pub fn show_system_messages(&self) -> bool {
        self.preferences().show_system_messages
    }

    pub fn update(&self, preferences: UiPreferences) -> Result<(), PreferencesError> {
        self.persist(&preferences)?;
        self.preferences.store(Arc::new(preferences));
        Ok(())
    }

    pub fn set_show_system_messages(&self, show: bool) -> Result<(), PreferencesError> {
        let mut preferences = self.preferences();
        preferences.show_system_messages = show;
        self.update(preferences)
    }

    /// Re-reads the backing file, e.g. after an external edit.
    pub fn reload(&self) {
        let preferences = Self::load_from_disk(&self.config_path);
        self.preferences.store(Arc::new(preferences));
    }

    fn load_from_disk(path: &PathBuf) -> UiPreferences {
        if !path.exists() {
            tracing::info!("preferences file not found at {:?}, using defaults", path);
            return UiPreferences::default();
        }

        let figment =
            Figment::from(Serialized::defaults(UiPreferences::default())).merge(Json::file(path));

        match figment.extract::<UiPreferences>() {
            Ok(preferences) => preferences,
            Err(error) => {
                tracing::warn!(
                    "failed to parse preferences from {:?}: {}. using defaults",
                    path,
                    error
                );
                UiPreferences::default()
            }
        }
    }

    fn persist(&self, preferences: &UiPreferences) -> Result<(), PreferencesError> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreatePreferencesDirSnafu {
                stage: "create-preferences-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content =
            serde_json::to_string_pretty(preferences).context(SerializePreferencesSnafu {
                stage: "serialize-preferences-json",
            })?;

        // Write-then-rename keeps a crash from truncating the live file.
        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WritePreferencesFileSnafu {
            stage: "write-temporary-preferences-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(ReplacePreferencesFileSnafu {
            stage: "rename-temporary-preferences-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PreferencesError {
    #[snafu(display("failed to create preferences directory at {path:?} on `{stage}`: {source}"))]
    CreatePreferencesDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize preferences on `{stage}`: {source}"))]
    SerializePreferences {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write preferences file at {path:?} on `{stage}`: {source}"))]
    WritePreferencesFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace preferences file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    ReplacePreferencesFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use loqui_core::ConversationId;

    fn temp_config_path(label: &str) -> PathBuf {
        std::env::temp_dir()
            .join("loqui-preferences-tests")
            .join(format!("{label}-{}", ConversationId::mint()))
            .join(PREFERENCES_FILE_NAME)
    }

    fn cleanup(path: &PathBuf) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = temp_config_path("missing");
        let store = PreferencesStore::new(path.clone());

        assert!(!store.show_system_messages());
        cleanup(&path);
    }

    #[test]
    fn update_persists_and_survives_reload() {
        let path = temp_config_path("persist");
        let store = PreferencesStore::new(path.clone());

        store.set_show_system_messages(true).unwrap();
        assert!(store.show_system_messages());

        let reopened = PreferencesStore::new(path.clone());
        assert!(reopened.show_system_messages());
        cleanup(&path);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = temp_config_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = PreferencesStore::new(path.clone());
        assert_eq!(store.preferences(), UiPreferences::default());
        cleanup(&path);
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let path = temp_config_path("reload");
        let store = PreferencesStore::new(path.clone());
        assert!(!store.show_system_messages());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"show_system_messages\":true}").unwrap();
        store.reload();

        assert!(store.show_system_messages());
        cleanup(&path);
    }
}
