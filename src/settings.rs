use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::project::{read_json, write_json, StoreError};

// ── Link settings ────────────────────────────────────────────────

/// Endpoint and timing for the instruction link between assistant and peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LinkSettings {
    pub host: String,
    pub port: u16,
    /// How often a pending connect attempt is polled.
    pub connect_poll_ms: u64,
    /// Upper bound for a connect attempt. None = bounded only by cancellation.
    pub connect_timeout_ms: Option<u64>,
    /// Scheduler tick driving the transport pump.
    pub tick_ms: u64,
    pub response_timeout_ms: u64,
    pub response_poll_ms: u64,
    /// Re-attempt a connect from the pump when a frame is pending.
    pub auto_reconnect: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7778,
            connect_poll_ms: 300,
            connect_timeout_ms: None,
            tick_ms: 16,
            response_timeout_ms: 10_000,
            response_poll_ms: 100,
            auto_reconnect: true,
        }
    }
}

impl LinkSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── LLM provider config ──────────────────────────────────────────

/// OpenAI-compatible completion endpoint used by the model translator.
///
/// The `api_key` field is never written to `settings.json`. It is stored in a
/// separate credentials file and loaded/saved via [`load_api_key`]/[`save_api_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LlmProviderConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Repair exchanges allowed after an unparseable reply.
    pub max_repair_attempts: u32,
    pub request_timeout_ms: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "local-model".to_string(),
            temperature: 0.0,
            max_repair_attempts: 1,
            request_timeout_ms: 60_000,
        }
    }
}

/// Redacted view of the LLM config (no raw API key).
#[derive(Debug, Clone, Serialize)]
pub struct LlmConfigInfo {
    pub has_api_key: bool,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_repair_attempts: u32,
}

impl LlmConfigInfo {
    #[must_use]
    pub fn from_config(config: &LlmProviderConfig) -> Self {
        Self {
            has_api_key: config.api_key.as_ref().is_some_and(|k| !k.is_empty()),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_repair_attempts: config.max_repair_attempts,
        }
    }
}

// ── App settings ─────────────────────────────────────────────────

/// Application-level settings stored in the config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AppSettings {
    pub version: u32,
    pub link: LinkSettings,
    pub llm: LlmProviderConfig,
    pub asset_search_url: String,
    pub asset_search_timeout_ms: u64,
    /// Sent to the peer in the settings frame after every connect.
    pub asset_library_root: Option<String>,
    pub editor_path: Option<PathBuf>,
    /// Local package registered into projects by `init_project`.
    pub plugin_path: Option<PathBuf>,
    pub journal_translations: bool,
}

const SETTINGS_VERSION: u32 = 1;

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            link: LinkSettings::default(),
            llm: LlmProviderConfig::default(),
            asset_search_url: "http://localhost:5000".to_string(),
            asset_search_timeout_ms: 10_000,
            asset_library_root: None,
            editor_path: None,
            plugin_path: None,
            journal_translations: true,
        }
    }
}

impl AppSettings {
    /// Set one field by dotted key (`link.port`, `llm.model`, ...).
    ///
    /// `raw` is parsed as JSON when possible so numbers and booleans keep their
    /// type, and falls back to a plain string. Unknown keys are rejected.
    pub fn set_field(&mut self, key: &str, raw: &str) -> Result<(), AppError> {
        let settings_err = |message: String| AppError::Settings { message };
        let mut tree = serde_json::to_value(&*self).map_err(|e| settings_err(e.to_string()))?;

        let mut slot = &mut tree;
        for part in key.split('.') {
            slot = slot
                .as_object_mut()
                .and_then(|map| map.get_mut(part))
                .ok_or_else(|| settings_err(format!("Unknown setting '{key}'")))?;
        }
        *slot = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let api_key = self.llm.api_key.take();
        let mut updated: AppSettings =
            serde_json::from_value(tree).map_err(|e| settings_err(format!("{key}: {e}")))?;
        updated.llm.api_key = api_key;
        *self = updated;
        Ok(())
    }
}

/// Load the API key from the separate credentials file.
pub fn load_api_key(config_dir: &Path) -> Option<String> {
    let path = crate::paths::credentials_path(config_dir);
    std::fs::read_to_string(path)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// Save the API key to the separate credentials file (atomic write).
pub fn save_api_key(config_dir: &Path, key: &str) -> Result<(), StoreError> {
    std::fs::create_dir_all(config_dir)?;
    let path = crate::paths::credentials_path(config_dir);
    if key.is_empty() {
        let _ = std::fs::remove_file(&path);
    } else {
        crate::project::atomic_write(&path, key.as_bytes())?;
    }
    Ok(())
}

/// Load settings from the config directory. Returns None if no settings file exists.
pub fn load_settings(config_dir: &Path) -> Option<AppSettings> {
    let path = crate::paths::settings_path(config_dir);
    if !path.exists() {
        return None;
    }
    let mut settings = read_json::<AppSettings>(&path).ok()?;
    if settings.llm.api_key.is_none() {
        settings.llm.api_key = load_api_key(config_dir);
    }
    Some(settings)
}

/// Load settings, falling back to defaults (plus any stored API key).
pub fn load_or_default(config_dir: &Path) -> AppSettings {
    load_settings(config_dir).unwrap_or_else(|| {
        let mut settings = AppSettings::default();
        settings.llm.api_key = load_api_key(config_dir);
        settings
    })
}

/// Save settings to the config directory.
pub fn save_settings(config_dir: &Path, settings: &AppSettings) -> Result<(), StoreError> {
    std::fs::create_dir_all(config_dir)?;
    write_json(&crate::paths::settings_path(config_dir), settings)
}
