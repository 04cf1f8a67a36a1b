use crate::error::{BridgeError, Result};
use crate::providers::{FamilyPreset, ProviderKind, DEFAULT_FAMILY_KEY_ENV, PROVIDER_ENV};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Provider selector; unset means auto-detect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Key of the default (native) family, used only to decide auto-detection.
    #[serde(default, skip_serializing)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub deepseek: FamilyConfig,
    #[serde(default)]
    pub openai_compatible: FamilyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            provider: None,
            gemini_api_key: None,
            timeout_secs: default_timeout_secs(),
            deepseek: FamilyConfig::default(),
            openai_compatible: FamilyConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file. An explicit path must exist;
    /// otherwise a missing file just yields the defaults.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Defaults overlaid with the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_vars(std::env::vars())
    }

    /// Overlay environment variables on top of this config. Set, non-empty
    /// variables win over values from the file.
    #[must_use]
    pub fn with_env_vars<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        if let Some(provider) = vars.get(PROVIDER_ENV) {
            self.provider = Some(provider.clone());
        }
        if let Some(key) = vars.get(DEFAULT_FAMILY_KEY_ENV) {
            self.gemini_api_key = Some(key.clone());
        }

        for preset in FamilyPreset::all() {
            let family = match preset.kind {
                ProviderKind::DeepSeek => &mut self.deepseek,
                ProviderKind::OpenAICompatible => &mut self.openai_compatible,
                _ => continue,
            };
            family.overlay(preset, &vars);
        }

        self
    }
}

impl FamilyConfig {
    fn overlay(&mut self, preset: &FamilyPreset, vars: &HashMap<String, String>) {
        if let Some(key) = vars.get(preset.api_key_env) {
            self.api_key = Some(key.clone());
        }
        if let Some(url) = vars.get(preset.base_url_env) {
            self.base_url = Some(url.clone());
        }
        if let Some(model) = vars.get(preset.model_env) {
            self.model = Some(model.clone());
        }
        if let Some(raw) = preset.temperature_env.and_then(|name| vars.get(name)) {
            self.temperature = raw.trim().parse::<f64>().ok().filter(|t| t.is_finite());
            if self.temperature.is_none() {
                tracing::warn!(value = %raw, "Ignoring invalid temperature override");
            }
        }
    }
}

/// Candidate config file locations, in priority order.
#[must_use]
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("compat-bridge.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("compat-bridge").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("compat-bridge").join("config.toml"));
        paths.push(home.join(".compat-bridge.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
