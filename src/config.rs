//! Configuration management for agentic-eval
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! environment variables. The binary applies CLI flags on top.
//!
//! File lookup order when no `--config` is given:
//! `./agentic-eval.toml`, then `~/.config/agentic-eval/config.toml`.

use anyhow::Context;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCAL_CONFIG_FILE: &str = "agentic-eval.toml";
const KEYRING_SERVICE: &str = "agentic-eval";
const KEYRING_USERNAME: &str = "llm_api_key";
const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub tools: ToolSettings,
    /// Size of the per-file worker pool
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            tools: ToolSettings::default(),
            workers: DEFAULT_WORKERS,
        }
    }
}

/// OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/v1/chat/completions".to_string(),
            model: "gemma".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 2048,
            timeout_secs: 120,
            max_retries: 3,
            initial_backoff_ms: 2000,
            max_backoff_ms: 16_000,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// API key from settings/environment, falling back to the system keychain.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        if cfg!(test) {
            return None;
        }
        match read_keyring_key() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read API key from system keychain");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub enabled: bool,
    pub knowledge_base: PathBuf,
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            knowledge_base: PathBuf::from("knowledge_base"),
            top_k: 3,
            timeout_secs: 10,
        }
    }
}

impl RetrievalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Per-invocation wall-clock limit for external analyzers
    pub timeout_secs: u64,
    pub semgrep: bool,
    pub semgrep_config: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            semgrep: false,
            semgrep_config: "auto".to_string(),
        }
    }
}

impl ToolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn read_keyring_key() -> Result<Option<String>, keyring::Error> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

impl Config {
    /// Get the user-level config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("agentic-eval").join("config.toml"))
    }

    /// Load settings from `explicit` (must exist and parse) or from the
    /// implicit locations, then apply process environment overrides.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::load_implicit(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn load_implicit() -> Self {
        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE))
            .chain(Self::user_config_path());
        for path in candidates {
            if !path.is_file() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "loaded config file");
                    return config;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %format!("{:#}", err),
                        "config file is invalid; using defaults"
                    );
                    break;
                }
            }
        }
        Self::default()
    }

    /// Apply environment overrides. Unparsable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LLM_API_URL") {
            self.llm.api_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("KNOWLEDGE_BASE_PATH") {
            self.retrieval.knowledge_base = PathBuf::from(v);
        }
        override_parsed(&lookup, "LLM_TEMPERATURE", &mut self.llm.temperature);
        override_parsed(&lookup, "LLM_MAX_TOKENS", &mut self.llm.max_tokens);
        override_parsed(&lookup, "LLM_TIMEOUT", &mut self.llm.timeout_secs);
        override_parsed(&lookup, "LLM_MAX_RETRIES", &mut self.llm.max_retries);
        override_parsed(&lookup, "RAG_TOP_K", &mut self.retrieval.top_k);
        override_parsed(&lookup, "MAX_WORKERS", &mut self.workers);
    }

    pub fn validate(&mut self) -> anyhow::Result<()> {
        url::Url::parse(&self.llm.api_url)
            .with_context(|| format!("Invalid LLM API URL '{}'", self.llm.api_url))?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!(
                "LLM temperature must be within 0.0..=2.0 (got {})",
                self.llm.temperature
            );
        }
        self.workers = self.workers.max(1);
        self.retrieval.top_k = self.retrieval.top_k.max(1);
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}
