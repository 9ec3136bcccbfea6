//! Configuration management for ragloop.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.ragloop/config.yaml)
//!
//! The configuration is workspace-centric, with all state stored in `.ragloop/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragloop/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider (e.g., "ollama", "claude")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// API key for the generation provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Optional separate provider/model for routing and grading
    pub classifier: Option<ClassifierConfig>,

    /// Web search settings
    pub search: SearchConfig,

    /// Knowledge base retrieval settings
    pub knowledge: KnowledgeSettings,

    /// Control loop limits
    pub loop_config: LoopConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Claude {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        #[serde(rename = "apiVersion")]
        api_version: Option<String>,
        #[serde(rename = "thinkingBudget")]
        thinking_budget: Option<u32>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::Claude { model, .. } => model,
            Self::Ollama { model, .. } => model,
        }
    }

    /// Custom endpoint, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Claude { endpoint, .. } => endpoint.as_deref(),
            Self::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }

    /// Extended thinking budget (Claude only).
    pub fn thinking_budget(&self) -> Option<u32> {
        match self {
            Self::Claude {
                thinking_budget, ..
            } => *thinking_budget,
            Self::Ollama { .. } => None,
        }
    }
}

/// Provider and model used for routing and grading decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub provider: String,
    pub model: String,
}

/// Web search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search provider ("tavily", "duckduckgo")
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// Environment variable holding the provider API key
    #[serde(rename = "apiKeyEnv", default)]
    pub api_key_env: Option<String>,

    /// Number of results merged into one web evidence item
    #[serde(rename = "maxResults", default = "default_search_results")]
    pub max_results: u32,
}

fn default_search_provider() -> String {
    "duckduckgo".to_string()
}

fn default_search_results() -> u32 {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key_env: None,
            max_results: default_search_results(),
        }
    }
}

/// Knowledge base retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSettings {
    /// Knowledge base queried by the loop
    #[serde(default = "default_base")]
    pub base: String,

    /// Number of snippets retrieved per query
    #[serde(rename = "topK", default = "default_top_k")]
    pub top_k: u32,

    /// Topics the router should send to the knowledge base
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
}

fn default_base() -> String {
    "default".to_string()
}

fn default_top_k() -> u32 {
    15
}

fn default_topics() -> Vec<String> {
    vec![
        "agents".to_string(),
        "prompt engineering".to_string(),
        "adversarial attacks on LLMs".to_string(),
    ]
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            base: default_base(),
            top_k: default_top_k(),
            topics: default_topics(),
        }
    }
}

/// Iteration caps, timeouts and transport retry policy for the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum query rewrites per turn
    #[serde(rename = "maxRewrites", default = "default_max_rewrites")]
    pub max_rewrites: u32,

    /// Maximum regenerations for one evidence set
    #[serde(rename = "maxRegenerations", default = "default_max_regenerations")]
    pub max_regenerations: u32,

    /// Timeout applied to every port call (and to each streamed chunk)
    #[serde(rename = "callTimeoutSecs", default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Transport retries for transient provider failures
    #[serde(rename = "transportRetries", default = "default_transport_retries")]
    pub transport_retries: u32,

    /// Base delay for exponential backoff between retries
    #[serde(rename = "retryBaseDelayMs", default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_max_rewrites() -> u32 {
    3
}

fn default_max_regenerations() -> u32 {
    3
}

fn default_call_timeout() -> u64 {
    60
}

fn default_transport_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    500
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_rewrites: default_max_rewrites(),
            max_regenerations: default_max_regenerations(),
            call_timeout_secs: default_call_timeout(),
            transport_retries: default_transport_retries(),
            retry_base_delay_ms: default_retry_delay(),
        }
    }
}

impl LoopConfig {
    /// Per-call timeout as a `Duration`.
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.call_timeout_secs)
    }

    /// Reject caps that would make the loop unable to make progress.
    pub fn validate(&self) -> AppResult<()> {
        if self.max_rewrites == 0 {
            return Err(AppError::Config(
                "loop.maxRewrites must be at least 1".to_string(),
            ));
        }
        if self.max_regenerations == 0 {
            return Err(AppError::Config(
                "loop.maxRegenerations must be at least 1".to_string(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(AppError::Config(
                "loop.callTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    classifier: Option<ClassifierConfig>,
    search: Option<SearchConfig>,
    knowledge: Option<KnowledgeSettings>,
    #[serde(rename = "loop")]
    loop_config: Option<LoopConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            classifier: None,
            search: SearchConfig::default(),
            knowledge: KnowledgeSettings::default(),
            loop_config: LoopConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, the YAML config and defaults.
    ///
    /// Environment variables:
    /// - `RAGLOOP_WORKSPACE`: Override workspace path
    /// - `RAGLOOP_CONFIG`: Path to config file
    /// - `RAGLOOP_PROVIDER`: Generation provider
    /// - `RAGLOOP_MODEL`: Generation model
    /// - `RAGLOOP_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragloop_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Load configuration with explicit workspace and config file paths.
    ///
    /// The paths come from CLI flags and win over `RAGLOOP_WORKSPACE` and
    /// `RAGLOOP_CONFIG`. They have to be known before the YAML is read.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(ref workspace) = workspace {
            config.workspace = workspace.clone();
        } else if let Ok(workspace) = std::env::var("RAGLOOP_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        config.config_file =
            config_file.or_else(|| std::env::var("RAGLOOP_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.ragloop_dir().join("config.yaml"));

        if config_path.exists() {
            tracing::debug!("Loading config from {:?}", config_path);
            config = config.merge_yaml(&config_path)?;
        }

        // An explicit workspace flag beats `workspace.path` in the YAML
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("RAGLOOP_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGLOOP_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("RAGLOOP_API_KEY").ok();
        config.log_level = std::env::var("RUST_LOG").ok();

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            result.llm = Some(llm);
        }

        if let Some(classifier) = config_file.classifier {
            result.classifier = Some(classifier);
        }
        if let Some(search) = config_file.search {
            result.search = search;
        }
        if let Some(knowledge) = config_file.knowledge {
            result.knowledge = knowledge;
        }
        if let Some(loop_config) = config_file.loop_config {
            result.loop_config = loop_config;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .ragloop directory.
    pub fn ragloop_dir(&self) -> PathBuf {
        self.workspace.join(".ragloop")
    }

    /// Ensure the .ragloop directory exists.
    pub fn ensure_ragloop_dir(&self) -> AppResult<()> {
        let dir = self.ragloop_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ragloop directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Get the configuration of a provider, if present in config.yaml.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Provider and model used for routing and grading.
    ///
    /// Falls back to the generation provider when no classifier section exists.
    pub fn classifier_target(&self) -> (String, String) {
        match self.classifier {
            Some(ref c) => (c.provider.clone(), c.model.clone()),
            None => (self.provider.clone(), self.model.clone()),
        }
    }

    /// Resolve API key from environment variable.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::Claude { api_key_env, .. }) => std::env::var(&api_key_env).ok(),
            _ if is_claude(provider) => std::env::var("ANTHROPIC_API_KEY").ok(),
            _ => None,
        }
    }

    /// Resolve the web search API key.
    pub fn resolve_search_api_key(&self) -> Option<String> {
        let env_var = self.search.api_key_env.clone().or_else(|| {
            (self.search.provider.eq_ignore_ascii_case("tavily"))
                .then(|| "TAVILY_API_KEY".to_string())
        })?;
        std::env::var(env_var).ok()
    }

    /// Validate configuration for the active providers and loop limits.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama", "claude", "anthropic"];
        let (classifier_provider, _) = self.classifier_target();

        for provider in [self.provider.as_str(), classifier_provider.as_str()] {
            if !known_providers.contains(&provider) {
                return Err(AppError::Config(format!(
                    "Unknown provider: {}. Supported: {}",
                    provider,
                    known_providers.join(", ")
                )));
            }

            if is_claude(provider) && self.resolve_api_key(provider).is_none() {
                return Err(AppError::Config(format!(
                    "API key not found for provider '{}'. Set apiKeyEnv in config.yaml or RAGLOOP_API_KEY",
                    provider
                )));
            }
        }

        let known_search = ["tavily", "duckduckgo"];
        if !known_search.contains(&self.search.provider.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Unknown search provider: {}. Supported: {}",
                self.search.provider,
                known_search.join(", ")
            )));
        }

        if self.knowledge.top_k == 0 {
            return Err(AppError::Config(
                "knowledge.topK must be at least 1".to_string(),
            ));
        }

        self.loop_config.validate()
    }
}

fn is_claude(provider: &str) -> bool {
    matches!(provider, "claude" | "anthropic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.knowledge.top_k, 15);
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.loop_config.max_rewrites, 3);
        assert!(!config.verbose);
    }

    #[test]
    fn test_ragloop_dir() {
        let config = AppConfig::default();
        assert!(config.ragloop_dir().ends_with(".ragloop"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("claude".to_string()),
            Some("claude-3-7-sonnet-latest".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "claude");
        assert_eq!(overridden.model, "claude-3-7-sonnet-latest");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_load_with_reads_explicit_config_file() {
        let workspace = tempfile::tempdir().unwrap();
        let custom = workspace.path().join("custom.yaml");
        std::fs::write(&custom, "loop:\n  maxRewrites: 7\n").unwrap();

        let config = AppConfig::load_with(
            Some(workspace.path().to_path_buf()),
            Some(custom.clone()),
        )
        .unwrap();

        assert_eq!(config.config_file, Some(custom));
        assert_eq!(config.workspace, workspace.path());
        assert_eq!(config.loop_config.max_rewrites, 7);
    }

    #[test]
    fn test_load_with_reads_workspace_config() {
        let workspace = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(workspace.path().join(".ragloop")).unwrap();
        std::fs::write(
            workspace.path().join(".ragloop/config.yaml"),
            format!(
                "workspace:\n  path: {}\nknowledge:\n  topK: 4\n",
                other.path().display()
            ),
        )
        .unwrap();

        let config = AppConfig::load_with(Some(workspace.path().to_path_buf()), None).unwrap();

        assert_eq!(config.knowledge.top_k, 4);
        assert_eq!(config.workspace, workspace.path());
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:11434
      model: qwen2.5
classifier:
  provider: ollama
  model: llama3.2:1b
search:
  provider: tavily
  maxResults: 5
knowledge:
  base: ai-notes
  topK: 10
loop:
  maxRewrites: 2
  maxRegenerations: 4
logging:
  level: debug
  color: false
"#;
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();

        assert_eq!(merged.model, "qwen2.5");
        assert_eq!(
            merged.classifier_target(),
            ("ollama".to_string(), "llama3.2:1b".to_string())
        );
        assert_eq!(merged.search.provider, "tavily");
        assert_eq!(merged.search.max_results, 5);
        assert_eq!(merged.knowledge.base, "ai-notes");
        assert_eq!(merged.knowledge.top_k, 10);
        assert_eq!(merged.loop_config.max_rewrites, 2);
        assert_eq!(merged.loop_config.max_regenerations, 4);
        assert_eq!(merged.loop_config.call_timeout_secs, 60);
        assert_eq!(merged.log_level, Some("debug".to_string()));
        assert!(merged.no_color);
    }

    #[test]
    fn test_merge_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "search:\n  provider: tavily\n").unwrap();

        let merged = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(merged.search.provider, "tavily");
        assert_eq!(merged.search.max_results, 3);
        assert_eq!(merged.knowledge.top_k, 15);

        std::fs::write(&path, "loop: [not, a, map]\n").unwrap();
        assert!(matches!(
            AppConfig::default().merge_yaml(&path),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_classifier_falls_back_to_generator() {
        let config = AppConfig::default();
        assert_eq!(
            config.classifier_target(),
            ("ollama".to_string(), "llama3.2".to_string())
        );
    }

    #[test]
    fn test_validate_unknown_provider() {
        let config = AppConfig {
            provider: "unknown".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let mut config = AppConfig::default();
        config.loop_config.max_regenerations = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.knowledge.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_search_provider() {
        let mut config = AppConfig::default();
        config.search.provider = "altavista".to_string();
        assert!(config.validate().is_err());
    }
}
