use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use ragchat_gateway::DEFAULT_API_BASE_URL;
use ragchat_live::DEFAULT_LIVE_BASE_URL;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "ragchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "RAGCHAT_";
pub const DEFAULT_PENDING_REPLY_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_live_base_url")]
    pub live_base_url: String,
    /// Seconds to wait for a reply before clearing the placeholder. `0` waits forever.
    #[serde(default = "default_pending_reply_timeout_secs")]
    pub pending_reply_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            live_base_url: default_live_base_url(),
            pending_reply_timeout_secs: DEFAULT_PENDING_REPLY_TIMEOUT_SECS,
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        self.api_base_url = normalize_url(&self.api_base_url, DEFAULT_API_BASE_URL);
        self.live_base_url = normalize_url(&self.live_base_url, DEFAULT_LIVE_BASE_URL);
        self
    }

    pub fn pending_reply_timeout(&self) -> Option<Duration> {
        (self.pending_reply_timeout_secs > 0)
            .then(|| Duration::from_secs(self.pending_reply_timeout_secs))
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
    /// Layers merged over the file when loading. Never persisted.
    overrides: Figment,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".ragchat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads defaults, then the JSON file, then `RAGCHAT_*` environment overrides.
    pub fn new(config_path: PathBuf) -> Self {
        Self::with_overrides(config_path, Figment::from(Env::prefixed(ENV_PREFIX)))
    }

    /// Same as [`SettingsStore::new`] without the environment layer.
    pub fn from_file(config_path: PathBuf) -> Self {
        Self::with_overrides(config_path, Figment::new())
    }

    fn with_overrides(config_path: PathBuf, overrides: Figment) -> Self {
        let settings = Self::extract(
            Self::layers(&config_path).merge(overrides.clone()),
            &config_path,
        );

        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
            overrides,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    /// Applies `edit` to the persisted settings and saves them.
    ///
    /// The edit starts from the file layers only, so override values are not written back. The
    /// in-memory snapshot is reloaded with overrides on top.
    pub fn update(&self, edit: impl FnOnce(&mut ClientSettings)) -> Result<(), SettingsError> {
        let mut persisted = Self::extract(Self::layers(&self.config_path), &self.config_path);
        edit(&mut persisted);
        let persisted = persisted.normalized();
        self.persist(&persisted)?;

        let effective = Self::extract(
            Self::layers(&self.config_path).merge(self.overrides.clone()),
            &self.config_path,
        );
        self.settings.store(Arc::new(effective));
        Ok(())
    }

    fn layers(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ClientSettings::default())).merge(Json::file(path))
    }

    fn extract(figment: Figment, config_path: &Path) -> ClientSettings {
        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to load settings from {:?}: {}. using defaults",
                    config_path,
                    error
                );
                ClientSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_live_base_url() -> String {
    DEFAULT_LIVE_BASE_URL.to_string()
}

fn default_pending_reply_timeout_secs() -> u64 {
    DEFAULT_PENDING_REPLY_TIMEOUT_SECS
}

fn normalize_url(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::from_file(dir.path().join(SETTINGS_FILE_NAME));

        assert_eq!(*store.settings(), ClientSettings::default());
        assert_eq!(
            store.settings().pending_reply_timeout(),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "api_base_url": "  https://chat.example.com/api ", "pending_reply_timeout_secs": 0 }"#,
        )
        .unwrap();

        let settings = SettingsStore::from_file(path).settings();

        assert_eq!(settings.api_base_url, "https://chat.example.com/api");
        assert_eq!(settings.live_base_url, DEFAULT_LIVE_BASE_URL);
        assert_eq!(settings.pending_reply_timeout(), None);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(
            *SettingsStore::from_file(path).settings(),
            ClientSettings::default()
        );
    }

    #[test]
    fn update_persists_normalized_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::from_file(path.clone());

        store
            .update(|settings| {
                settings.api_base_url = "   ".to_string();
                settings.live_base_url = "wss://chat.example.com/ws".to_string();
                settings.pending_reply_timeout_secs = 30;
            })
            .unwrap();

        assert_eq!(store.settings().api_base_url, DEFAULT_API_BASE_URL);
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = SettingsStore::from_file(path).settings();
        assert_eq!(reloaded.live_base_url, "wss://chat.example.com/ws");
        assert_eq!(reloaded.pending_reply_timeout_secs, 30);
    }

    #[test]
    fn update_does_not_persist_override_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{ "api_base_url": "https://file.example.com/api" }"#).unwrap();
        let overrides = Figment::from(Serialized::default(
            "live_base_url",
            "wss://override.example.com/ws",
        ));
        let store = SettingsStore::with_overrides(path.clone(), overrides);
        assert_eq!(store.settings().live_base_url, "wss://override.example.com/ws");

        store
            .update(|settings| settings.pending_reply_timeout_secs = 5)
            .unwrap();

        let effective = store.settings();
        assert_eq!(effective.live_base_url, "wss://override.example.com/ws");
        assert_eq!(effective.pending_reply_timeout_secs, 5);

        let persisted = SettingsStore::from_file(path).settings();
        assert_eq!(persisted.api_base_url, "https://file.example.com/api");
        assert_eq!(persisted.live_base_url, DEFAULT_LIVE_BASE_URL);
        assert_eq!(persisted.pending_reply_timeout_secs, 5);
    }
}
