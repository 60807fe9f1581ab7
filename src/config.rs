// src/config.rs

use crate::error::ConfigError;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default = "default_export_path")]
    pub export_path: String,
}

fn default_export_path() -> String {
    "laundry_orders_export.csv".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmSection::default(),
            export_path: default_export_path(),
        }
    }
}

/// Which inference service reads the photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Google Gemini `generateContent` with a response schema.
    #[default]
    Gemini,
    /// Local Ollama server, OpenAI-compatible API.
    Ollama,
    /// Any hosted OpenAI-compatible chat completions endpoint.
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default = "default_gemini")]
    pub gemini: EndpointConfig,
    #[serde(default = "default_ollama")]
    pub ollama: EndpointConfig,
    #[serde(default = "default_remote")]
    pub remote: EndpointConfig,
    /// Environment variable holding the API key for `gemini` and `remote`.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Unset means the request is never cut off by this client.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            gemini: default_gemini(),
            ollama: default_ollama(),
            remote: default_remote(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
}

fn default_gemini() -> EndpointConfig {
    EndpointConfig {
        base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        model: "gemini-2.5-flash".to_string(),
    }
}

fn default_ollama() -> EndpointConfig {
    EndpointConfig {
        base_url: "http://localhost:11434/v1".to_string(),
        model: "qwen2.5vl".to_string(),
    }
}

fn default_remote() -> EndpointConfig {
    EndpointConfig {
        base_url: "https://api.openai.com/v1".to_string(),
        model: "gpt-4o-mini".to_string(),
    }
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file means "use the defaults".
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Gemini);
        assert_eq!(cfg.llm.gemini.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.api_key_env, "LLM_API_KEY");
        assert_eq!(cfg.llm.request_timeout_secs, None);
        assert_eq!(cfg.export_path, "laundry_orders_export.csv");
    }

    #[test]
    fn test_backend_section_overrides() {
        let cfg: Config = toml::from_str(
            r#"
            export_path = "out/orders.csv"

            [llm]
            backend = "ollama"
            request_timeout_secs = 90

            [llm.ollama]
            base_url = "http://gpu-box:11434/v1"
            model = "llava"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Ollama);
        assert_eq!(cfg.llm.ollama.base_url, "http://gpu-box:11434/v1");
        assert_eq!(cfg.llm.ollama.model, "llava");
        assert_eq!(cfg.llm.request_timeout_secs, Some(90));
        assert_eq!(cfg.llm.remote.model, "gpt-4o-mini");
        assert_eq!(cfg.export_path, "out/orders.csv");
    }

    #[test]
    fn test_missing_file_falls_back() {
        let cfg = Config::load_or_default("does/not/exist.toml").unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Gemini);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[llm]\nbackend = \"carrier-pigeon\"");
        assert!(result.is_err());
    }
}
