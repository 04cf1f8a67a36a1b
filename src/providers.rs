//! Provider selection and per-family presets.
//!
//! The active provider is resolved once from a [`BridgeConfig`] into an
//! immutable [`ResolvedProvider`]. Only the OpenAI-style chat-completions
//! families (DeepSeek and generic OpenAI-compatible endpoints) are served by
//! this crate; the native families are recognised so that selecting them
//! disables the bridge instead of failing.

use std::fmt;
use std::str::FromStr;

use crate::config::{BridgeConfig, FamilyConfig};
use crate::error::{BridgeError, Result};

/// Environment variable naming the active provider.
pub const PROVIDER_ENV: &str = "LLM_PROVIDER";

/// API key of the default (native) family. Only consulted for auto-detection.
pub const DEFAULT_FAMILY_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GeminiNative,
    ComputeAdc,
    DeepSeek,
    OpenAICompatible,
    VertexAI,
}

impl ProviderKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::GeminiNative => "gemini",
            ProviderKind::ComputeAdc => "compute-adc",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::OpenAICompatible => "openai-compatible",
            ProviderKind::VertexAI => "vertex-ai",
        }
    }

    /// Whether this provider speaks the chat-completions wire format.
    #[must_use]
    pub fn is_chat_completions(self) -> bool {
        self.preset().is_some()
    }

    #[must_use]
    pub fn preset(self) -> Option<&'static FamilyPreset> {
        PRESETS.iter().find(|p| p.kind == self)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "gemini" | "gemini-native" | "gemini-api-key" => Ok(ProviderKind::GeminiNative),
            "compute-adc" | "cloud-shell" => Ok(ProviderKind::ComputeAdc),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "openai-compatible" | "openai" | "compatible" => Ok(ProviderKind::OpenAICompatible),
            "vertex-ai" | "vertex" | "vertexai" => Ok(ProviderKind::VertexAI),
            _ => Err(BridgeError::config(format!(
                "Unknown provider '{s}'. Known providers: gemini, compute-adc, deepseek, \
                 openai-compatible, vertex-ai"
            ))),
        }
    }
}

/// Built-in settings for a chat-completions family. Each preset names the
/// environment variables its configuration is read from.
#[derive(Debug, Clone)]
pub struct FamilyPreset {
    pub kind: ProviderKind,
    pub base_url: &'static str,
    pub api_key_env: &'static str,
    pub base_url_env: &'static str,
    pub model_env: &'static str,
    /// Only the generic compatible variant honours a temperature override.
    pub temperature_env: Option<&'static str>,
    pub default_model: &'static str,
    /// Request models carrying this prefix are passed through unchanged.
    pub model_prefix: Option<&'static str>,
}

const PRESETS: &[FamilyPreset] = &[
    FamilyPreset {
        kind: ProviderKind::DeepSeek,
        base_url: "https://api.deepseek.com/v1",
        api_key_env: "DEEPSEEK_API_KEY",
        base_url_env: "DEEPSEEK_BASE_URL",
        model_env: "DEEPSEEK_MODEL",
        temperature_env: None,
        default_model: "deepseek-chat",
        model_prefix: Some("deepseek-"),
    },
    FamilyPreset {
        kind: ProviderKind::OpenAICompatible,
        base_url: "https://api.openai.com/v1",
        api_key_env: "OPENAI_COMPATIBLE_API_KEY",
        base_url_env: "OPENAI_COMPATIBLE_BASE_URL",
        model_env: "OPENAI_COMPATIBLE_MODEL",
        temperature_env: Some("OPENAI_COMPATIBLE_TEMPERATURE"),
        default_model: "gpt-4o-mini",
        model_prefix: None,
    },
];

impl FamilyPreset {
    #[must_use]
    pub fn all() -> &'static [FamilyPreset] {
        PRESETS
    }
}

/// Connection settings of an enabled chat-completions provider.
#[derive(Debug, Clone)]
pub struct Endpoint {
    preset: &'static FamilyPreset,
    base_url: String,
    api_key: Option<String>,
    model_override: Option<String>,
    temperature: Option<f64>,
}

/// The provider decision, made once and passed around explicitly.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    kind: ProviderKind,
    endpoint: Option<Endpoint>,
}

impl ResolvedProvider {
    /// Resolve the active provider.
    ///
    /// An explicit selector wins. Without one, a chat-completions family is
    /// chosen only when its key is present and the default family's key is
    /// absent; DeepSeek is preferred when both family keys are set.
    pub fn resolve(config: &BridgeConfig) -> Result<Self> {
        let kind = match config.provider.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(selector) => selector.parse()?,
            None => auto_detect(config),
        };

        let endpoint = kind.preset().map(|preset| {
            let family = config.family(kind);
            Endpoint {
                preset,
                base_url: family
                    .base_url
                    .clone()
                    .unwrap_or_else(|| preset.base_url.to_string()),
                api_key: family.api_key.clone(),
                model_override: family.model.clone(),
                temperature: preset
                    .temperature_env
                    .and(family.temperature)
                    .filter(|t| t.is_finite()),
            }
        });

        tracing::debug!(provider = %kind, enabled = endpoint.is_some(), "Resolved provider");

        Ok(Self { kind, endpoint })
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.base_url.as_str())
    }

    /// `<base_url>/chat/completions`, tolerating a trailing slash on the base.
    #[must_use]
    pub fn chat_completions_url(&self) -> Option<String> {
        self.base_url()
            .map(|base| format!("{}/chat/completions", base.trim_end_matches('/')))
    }

    pub fn api_key_or_fail(&self) -> Result<&str> {
        let endpoint = self.endpoint.as_ref().ok_or(BridgeError::ProviderInactive {
            provider: self.kind.name(),
        })?;
        endpoint
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(BridgeError::MissingCredential {
                provider: self.kind.name(),
                env_var: endpoint.preset.api_key_env,
            })
    }

    /// Model to send upstream: explicit override, then the request's own model
    /// when it already uses this family's naming, then the family default.
    #[must_use]
    pub fn model(&self, request_model: &str) -> String {
        let Some(endpoint) = &self.endpoint else {
            return request_model.to_string();
        };
        if let Some(model) = endpoint.model_override.as_deref().filter(|m| !m.is_empty()) {
            return model.to_string();
        }
        match endpoint.preset.model_prefix {
            Some(prefix) if request_model.starts_with(prefix) => request_model.to_string(),
            _ => endpoint.preset.default_model.to_string(),
        }
    }

    #[must_use]
    pub fn temperature_override(&self) -> Option<f64> {
        self.endpoint.as_ref().and_then(|e| e.temperature)
    }
}

fn auto_detect(config: &BridgeConfig) -> ProviderKind {
    if has_key(config.gemini_api_key.as_ref()) {
        return ProviderKind::GeminiNative;
    }
    PRESETS
        .iter()
        .find(|p| has_key(config.family(p.kind).api_key.as_ref()))
        .map_or(ProviderKind::GeminiNative, |p| p.kind)
}

fn has_key(key: Option<&String>) -> bool {
    key.is_some_and(|k| !k.is_empty())
}

impl BridgeConfig {
    /// Settings block for a chat-completions family. Native kinds map to an
    /// empty block.
    #[must_use]
    pub fn family(&self, kind: ProviderKind) -> &FamilyConfig {
        static EMPTY: FamilyConfig = FamilyConfig {
            api_key: None,
            base_url: None,
            model: None,
            temperature: None,
        };
        match kind {
            ProviderKind::DeepSeek => &self.deepseek,
            ProviderKind::OpenAICompatible => &self.openai_compatible,
            _ => &EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> BridgeConfig {
        BridgeConfig::default().with_env_vars(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        )
    }

    #[test]
    fn test_selector_parsing_is_lenient() {
        assert_eq!("DeepSeek".parse::<ProviderKind>().unwrap(), ProviderKind::DeepSeek);
        assert_eq!(
            "openai_compatible".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAICompatible
        );
        assert_eq!("vertex".parse::<ProviderKind>().unwrap(), ProviderKind::VertexAI);
        assert!("unknown_provider".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_explicit_selector_wins() {
        let resolved = ResolvedProvider::resolve(&config_from(&[
            ("LLM_PROVIDER", "deepseek"),
            ("GEMINI_API_KEY", "g"),
        ]))
        .unwrap();
        assert_eq!(resolved.kind(), ProviderKind::DeepSeek);
        assert!(resolved.is_enabled());

        let resolved = ResolvedProvider::resolve(&config_from(&[
            ("LLM_PROVIDER", "vertex-ai"),
            ("DEEPSEEK_API_KEY", "d"),
        ]))
        .unwrap();
        assert_eq!(resolved.kind(), ProviderKind::VertexAI);
        assert!(!resolved.is_enabled());
    }

    #[test]
    fn test_auto_detect_requires_default_key_absent() {
        let resolved =
            ResolvedProvider::resolve(&config_from(&[("DEEPSEEK_API_KEY", "d")])).unwrap();
        assert_eq!(resolved.kind(), ProviderKind::DeepSeek);

        let resolved = ResolvedProvider::resolve(&config_from(&[
            ("DEEPSEEK_API_KEY", "d"),
            ("GEMINI_API_KEY", "g"),
        ]))
        .unwrap();
        assert!(!resolved.is_enabled());

        let resolved = ResolvedProvider::resolve(&config_from(&[])).unwrap();
        assert_eq!(resolved.kind(), ProviderKind::GeminiNative);
        assert!(!resolved.is_enabled());
    }

    #[test]
    fn test_base_url_default_and_override() {
        let resolved =
            ResolvedProvider::resolve(&config_from(&[("DEEPSEEK_API_KEY", "d")])).unwrap();
        assert_eq!(resolved.base_url(), Some("https://api.deepseek.com/v1"));

        let resolved = ResolvedProvider::resolve(&config_from(&[
            ("LLM_PROVIDER", "openai-compatible"),
            ("OPENAI_COMPATIBLE_BASE_URL", "http://localhost:8000/v1/"),
        ]))
        .unwrap();
        assert_eq!(
            resolved.chat_completions_url().as_deref(),
            Some("http://localhost:8000/v1/chat/completions")
        );
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let resolved =
            ResolvedProvider::resolve(&config_from(&[("LLM_PROVIDER", "deepseek")])).unwrap();
        let err = resolved.api_key_or_fail().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::MissingCredential {
                env_var: "DEEPSEEK_API_KEY",
                ..
            }
        ));
    }

    #[test]
    fn test_model_resolution_order() {
        let resolved =
            ResolvedProvider::resolve(&config_from(&[("DEEPSEEK_API_KEY", "d")])).unwrap();
        assert_eq!(resolved.model("deepseek-reasoner"), "deepseek-reasoner");
        assert_eq!(resolved.model("gemini-2.5-pro"), "deepseek-chat");

        let resolved = ResolvedProvider::resolve(&config_from(&[
            ("DEEPSEEK_API_KEY", "d"),
            ("DEEPSEEK_MODEL", "deepseek-coder"),
        ]))
        .unwrap();
        assert_eq!(resolved.model("deepseek-reasoner"), "deepseek-coder");
    }

    #[test]
    fn test_temperature_only_for_compatible_variant() {
        let resolved = ResolvedProvider::resolve(&config_from(&[
            ("LLM_PROVIDER", "openai-compatible"),
            ("OPENAI_COMPATIBLE_TEMPERATURE", "0.25"),
        ]))
        .unwrap();
        assert_eq!(resolved.temperature_override(), Some(0.25));

        let resolved = ResolvedProvider::resolve(&config_from(&[
            ("LLM_PROVIDER", "openai-compatible"),
            ("OPENAI_COMPATIBLE_TEMPERATURE", "warm"),
        ]))
        .unwrap();
        assert_eq!(resolved.temperature_override(), None);

        let mut config = config_from(&[("LLM_PROVIDER", "deepseek")]);
        config.deepseek.temperature = Some(0.5);
        let resolved = ResolvedProvider::resolve(&config).unwrap();
        assert_eq!(resolved.temperature_override(), None);
    }
}
