//! Configuration for repolens
//!
//! Layers, lowest priority first:
//! - Built-in defaults
//! - User config (`~/.config/repolens/config.toml`)
//! - Project config (`repolens.toml` in the working directory)
//! - Environment variables
//!
//! A file that cannot be read or parsed is skipped with a warning; it never
//! stops a run.

mod user_config;

pub use user_config::{init_user_config, project_config_path, user_config_path, PROJECT_CONFIG_FILE};

use crate::ai::{DisabledNarrative, LlmBackend, LlmClient, LlmConfig, NarrativeService, NarrativeServiceError};
use crate::pipeline::OrchestratorConfig;
use crate::scoring::ScoreWeights;
use crate::selector::SelectorLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Effective configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: SelectorLimits,
    pub timeouts: TimeoutConfig,
    pub scoring: ScoreWeights,
    pub llm: LlmSettings,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole run, fetch through narration
    pub overall_secs: u64,
    pub fetch_secs: u64,
    pub per_file_ms: u64,
    pub narrative_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            overall_secs: 600,
            fetch_secs: 120,
            per_file_ms: 5_000,
            narrative_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Set to false to always use the built-in summary
    pub enabled: bool,
    pub backend: LlmBackend,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Usually supplied through the environment instead
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let client = LlmConfig::default();
        Self {
            enabled: true,
            backend: client.backend,
            model: None,
            max_tokens: client.max_tokens,
            temperature: client.temperature,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where results are saved (default: `<data dir>/repolens/results`)
    pub data_dir: Option<PathBuf>,
    /// Parent of per-run work trees (default: system temp dir)
    pub work_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("repolens").join("results"))
                .unwrap_or_else(|| PathBuf::from(".repolens").join("results"))
        })
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("repolens-work"))
    }
}

/// Recursively overlay `overlay` onto `base`
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn read_layer(path: &Path) -> Option<toml::Value> {
    if !path.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| toml::from_str::<toml::Table>(&content).map_err(anyhow::Error::from));
    match parsed {
        Ok(table) => {
            debug!("Loaded config from {}", path.display());
            Some(toml::Value::Table(table))
        }
        Err(e) => {
            warn!("Failed to load {}: {}", path.display(), e);
            None
        }
    }
}

impl Config {
    /// Load every layer for the current user and directory
    pub fn load() -> Self {
        let user = user_config_path();
        let project = std::env::current_dir().ok().map(|d| project_config_path(&d));
        Self::load_from(user.as_deref(), project.as_deref(), |name| std::env::var(name).ok())
    }

    /// Load from explicit file layers and an environment lookup
    pub fn load_from(
        user: Option<&Path>,
        project: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut merged = toml::Value::Table(toml::Table::new());
        for layer in [user, project].into_iter().flatten().filter_map(read_layer) {
            merge_toml(&mut merged, layer);
        }

        let mut config = match merged.try_into::<Config>() {
            Ok(config) => config,
            Err(e) => {
                warn!("Invalid configuration, using defaults: {}", e);
                Config::default()
            }
        };
        config.apply_env(env);
        config.sanitize();
        config
    }

    /// Environment variables override every file
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = env("REPOLENS_WORK_DIR").filter(|v| !v.is_empty()) {
            self.storage.work_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = env("REPOLENS_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) => self.timeouts.overall_secs = secs,
                Err(_) => warn!("Ignoring REPOLENS_TIMEOUT_SECS={:?}: not a number", secs),
            }
        }
        if let Some(backend) = env("REPOLENS_LLM_BACKEND") {
            match backend.parse::<LlmBackend>() {
                Ok(backend) => self.llm.backend = backend,
                Err(e) => warn!("Ignoring REPOLENS_LLM_BACKEND: {}", e),
            }
        }
        if let Some(model) = env("REPOLENS_LLM_MODEL").filter(|v| !v.is_empty()) {
            self.llm.model = Some(model);
        }
        if self.llm.backend.requires_api_key() {
            if let Some(key) = env(self.llm.backend.env_key()).filter(|v| !v.trim().is_empty()) {
                self.llm.api_key = Some(key);
            }
        }
    }

    /// Replace values that would make runs impossible with their defaults
    fn sanitize(&mut self) {
        let invalid = self.scoring.invalid_fields();
        if !invalid.is_empty() {
            warn!("Invalid scoring weights {:?}; using default weights", invalid);
            self.scoring = ScoreWeights::default();
        }
        let defaults = TimeoutConfig::default();
        let t = &mut self.timeouts;
        for (name, value, default) in [
            ("overall_secs", &mut t.overall_secs, defaults.overall_secs),
            ("fetch_secs", &mut t.fetch_secs, defaults.fetch_secs),
            ("per_file_ms", &mut t.per_file_ms, defaults.per_file_ms),
            ("narrative_secs", &mut t.narrative_secs, defaults.narrative_secs),
        ] {
            if *value == 0 {
                warn!("timeouts.{} must be positive; using {}", name, default);
                *value = default;
            }
        }
        if self.limits.max_files == 0 {
            warn!("limits.max_files must be positive; using default");
            self.limits.max_files = SelectorLimits::default().max_files;
        }
    }

    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            work_root: self.storage.work_dir(),
            limits: self.limits,
            overall_timeout: Duration::from_secs(self.timeouts.overall_secs),
            fetch_timeout: Duration::from_secs(self.timeouts.fetch_secs),
            per_file_timeout: Duration::from_millis(self.timeouts.per_file_ms),
            narrative_timeout: Duration::from_secs(self.timeouts.narrative_secs),
            weights: self.scoring.clone(),
            ..Default::default()
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            backend: self.llm.backend,
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            timeout_secs: self.timeouts.narrative_secs,
        }
    }

    /// The narrative backend to use. Falls back to [`DisabledNarrative`]
    /// when narratives are off or no backend is configured.
    pub fn narrative_service(&self) -> Arc<dyn NarrativeService> {
        if !self.llm.enabled {
            return Arc::new(DisabledNarrative);
        }
        match LlmClient::from_key(self.llm_config(), self.llm.api_key.clone()) {
            Ok(client) => {
                debug!("Narratives via {} ({})", client.backend(), client.model());
                Arc::new(client)
            }
            Err(NarrativeServiceError::NotConfigured(reason)) => {
                debug!("LLM not configured ({}); narratives use the built-in summary", reason);
                Arc::new(DisabledNarrative)
            }
            Err(e) => {
                warn!("LLM client unavailable: {}", e);
                Arc::new(DisabledNarrative)
            }
        }
    }
}
