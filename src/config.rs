//! Persistent application configuration model, defaults and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::admin_gate::AdminCredentials;
use crate::backends::firestore::RemoteSettings;
use crate::error::{PlayerError, Result};
use crate::playback_controller::PlaybackSettings;
use crate::protocol::RepeatMode;

const PLACEHOLDER_MARKERS: [&str; 4] = ["dummy", "your-", "changeme", "placeholder"];

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Remote document store connection.
    pub remote: RemoteConfig,
    #[serde(default)]
    /// Admin gate credentials.
    pub admin: AdminConfig,
    #[serde(default)]
    /// Audio URL generation and local cache location.
    pub storage: StorageConfig,
    #[serde(default)]
    /// Startup playback preferences.
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub backend_email: String,
    /// Prefer the OS keyring over storing this in the file.
    #[serde(default)]
    pub backend_password: String,
    #[serde(default = "default_true")]
    pub remember_session: bool,
    #[serde(default)]
    pub trust_remembered_session: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_public_audio_base_url")]
    pub public_audio_base_url: String,
    /// Overrides the default cache database location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default)]
    pub shuffle: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            backend_email: String::new(),
            backend_password: String::new(),
            remember_session: true,
            trust_remembered_session: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_audio_base_url: default_public_audio_base_url(),
            cache_path: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            repeat_mode: RepeatMode::All,
            shuffle: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_public_audio_base_url() -> String {
    "https://pub-0e706e4324b149e9a79e2be1ad1de135.r2.dev".to_string()
}

fn default_volume() -> u8 {
    70
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn looks_like_placeholder(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    PLACEHOLDER_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Clamps values that would make the runtime misbehave.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        remote: RemoteConfig {
            poll_interval_ms: config.remote.poll_interval_ms.max(1_000),
            request_timeout_ms: config.remote.request_timeout_ms.clamp(1_000, 60_000),
            ..config.remote
        },
        playback: PlaybackConfig {
            volume: config.playback.volume.min(100),
            ..config.playback
        },
        ..config
    }
}

/// Overlays `SYMUSIC_*` variables on top of the file values.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let overrides: [(&str, &mut String); 5] = [
        ("SYMUSIC_PROJECT_ID", &mut config.remote.project_id),
        ("SYMUSIC_API_KEY", &mut config.remote.api_key),
        ("SYMUSIC_ADMIN_PASSWORD", &mut config.admin.password),
        ("SYMUSIC_ADMIN_EMAIL", &mut config.admin.backend_email),
        (
            "SYMUSIC_ADMIN_BACKEND_PASSWORD",
            &mut config.admin.backend_password,
        ),
    ];
    for (key, field) in overrides {
        if let Some(value) = lookup(key).filter(|value| !value.trim().is_empty()) {
            *field = value;
        }
    }
    config
}

impl Config {
    /// Validated remote settings, or `Config` error when missing or placeholder.
    pub fn remote_settings(&self) -> Result<RemoteSettings> {
        let project_id = non_empty(&self.remote.project_id)
            .ok_or_else(|| PlayerError::Config("remote.project_id is not set".to_string()))?;
        let api_key = non_empty(&self.remote.api_key)
            .ok_or_else(|| PlayerError::Config("remote.api_key is not set".to_string()))?;
        if looks_like_placeholder(&project_id) || looks_like_placeholder(&api_key) {
            return Err(PlayerError::Config(
                "remote configuration contains placeholder values".to_string(),
            ));
        }
        Ok(RemoteSettings {
            project_id,
            api_key,
            request_timeout: Duration::from_millis(self.remote.request_timeout_ms),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.remote.poll_interval_ms)
    }

    /// Admin credentials. A blank backend password falls back to `keyring_lookup(email)`.
    ///
    /// Without a backend email no backend password is returned at all.
    pub fn admin_credentials<F>(&self, keyring_lookup: F) -> AdminCredentials
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_email = non_empty(&self.admin.backend_email);
        let backend_password = backend_email.as_deref().and_then(|email| {
            if self.admin.backend_password.is_empty() {
                keyring_lookup(email)
            } else {
                Some(self.admin.backend_password.clone())
            }
        });
        AdminCredentials {
            password: (!self.admin.password.is_empty()).then(|| self.admin.password.clone()),
            backend_email,
            backend_password,
            remember_session: self.admin.remember_session,
            trust_remembered_session: self.admin.trust_remembered_session,
        }
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            volume: self.playback.volume,
            repeat_mode: self.playback.repeat_mode,
            shuffle: self.playback.shuffle,
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.logging
            .level
            .trim()
            .parse()
            .unwrap_or(log::LevelFilter::Debug)
    }

    /// Cache database path: the configured override or `<data dir>/symusic/cache.db`.
    pub fn cache_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage.cache_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("symusic").join("cache.db"))
            .ok_or_else(|| PlayerError::Config("could not find data directory".to_string()))
    }
}

/// Reads `config.toml`, writing the defaults first when it does not exist.
///
/// A file that fails to parse is reported and replaced by defaults in memory only.
pub fn load_or_create(path: &Path) -> Config {
    if !path.exists() {
        let config = Config::default();
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Failed to create config directory {}: {}", parent.display(), err);
                return config;
            }
        }
        match toml::to_string_pretty(&config) {
            Ok(serialized) => match std::fs::write(path, serialized) {
                Ok(()) => info!("Wrote default config to {}", path.display()),
                Err(err) => warn!("Failed to write default config {}: {}", path.display(), err),
            },
            Err(err) => warn!("Failed to serialize default config: {}", err),
        }
        return config;
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<Config>(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!("Failed to parse config {}, using defaults: {}", path.display(), err);
                Config::default()
            }
        },
        Err(err) => {
            warn!("Failed to read config {}, using defaults: {}", path.display(), err);
            Config::default()
        }
    }
}
