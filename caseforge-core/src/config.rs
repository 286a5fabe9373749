//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/caseforge/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/caseforge/` (~/.config/caseforge/)
//! - State/Logs: `$XDG_STATE_HOME/caseforge/` (~/.local/state/caseforge/)

use crate::error::{Error, Result};
use crate::types::CandidatePage;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upper bound for every configured delay and duration (24h).
pub const MAX_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Dialogue pacing and intent triggers
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Simulated execution parameters
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Case synthesis settings
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Candidate page catalog offered on the first turn
    #[serde(default)]
    pub pages: Vec<PageConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dialogue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DialogueConfig {
    /// Phrases that, matched case-insensitively during review, start execution
    #[serde(default = "default_execute_triggers")]
    pub execute_triggers: Vec<String>,

    /// Completed user turns after which the next turn proceeds to synthesis
    #[serde(default = "default_sufficiency_rounds")]
    pub sufficiency_rounds: u32,

    /// Delay between acknowledging an execute request and starting the run
    #[serde(default = "default_ack_delay_ms")]
    pub ack_delay_ms: u64,

    /// Delay before a revision request replaces the case collection
    #[serde(default = "default_resynthesis_delay_ms")]
    pub resynthesis_delay_ms: u64,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            execute_triggers: default_execute_triggers(),
            sufficiency_rounds: default_sufficiency_rounds(),
            ack_delay_ms: default_ack_delay_ms(),
            resynthesis_delay_ms: default_resynthesis_delay_ms(),
        }
    }
}

fn default_execute_triggers() -> Vec<String> {
    [
        "execute",
        "run the tests",
        "run tests",
        "start execution",
        "开始执行",
        "执行测试",
        "运行测试",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sufficiency_rounds() -> u32 {
    3
}

fn default_ack_delay_ms() -> u64 {
    800
}

fn default_resynthesis_delay_ms() -> u64 {
    1500
}

/// Execution simulation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Minimum gap between consecutive case starts
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Lower bound of a case's running duration
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    /// Upper bound of a case's running duration
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,

    /// Probability that a case resolves to passed
    #[serde(default = "default_pass_probability")]
    pub pass_probability: f64,

    /// Cases running longer than this get a warning log entry
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,

    /// Fixed seed for the random source; unset means OS entropy
    pub seed: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stagger_ms: default_stagger_ms(),
            min_duration_ms: default_min_duration_ms(),
            max_duration_ms: default_max_duration_ms(),
            pass_probability: default_pass_probability(),
            slow_threshold_ms: default_slow_threshold_ms(),
            seed: None,
        }
    }
}

fn default_stagger_ms() -> u64 {
    600
}

fn default_min_duration_ms() -> u64 {
    1500
}

fn default_max_duration_ms() -> u64 {
    4000
}

fn default_pass_probability() -> f64 {
    0.8
}

fn default_slow_threshold_ms() -> u64 {
    3500
}

/// Case synthesis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// Prefix of minted case numbers (`TC` -> `TC001`)
    #[serde(default = "default_case_prefix")]
    pub case_prefix: String,

    /// Upper bound on cases produced by one synthesis
    #[serde(default = "default_max_cases")]
    pub max_cases: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            case_prefix: default_case_prefix(),
            max_cases: default_max_cases(),
        }
    }
}

fn default_case_prefix() -> String {
    "TC".to_string()
}

fn default_max_cases() -> usize {
    12
}

/// A candidate page entry
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl PageConfig {
    fn new(id: &str, label: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
        }
    }
}

/// Built-in page catalog used when the config lists none
pub fn default_pages() -> Vec<PageConfig> {
    vec![
        PageConfig::new(
            "login",
            "Login page",
            "Username/password form, remember-me and forgot-password links",
        ),
        PageConfig::new(
            "register",
            "Registration page",
            "Sign-up form with email verification",
        ),
        PageConfig::new(
            "home",
            "Home dashboard",
            "Landing view shown after a successful sign-in",
        ),
        PageConfig::new(
            "search",
            "Search results",
            "Keyword search with filters and pagination",
        ),
        PageConfig::new(
            "profile",
            "Profile settings",
            "Account details, password change and avatar upload",
        ),
    ]
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning an error describing the first problem
    pub fn validate(&self) -> Result<()> {
        let triggers = &self.dialogue.execute_triggers;
        if triggers.is_empty() || triggers.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::Config(
                "dialogue.execute_triggers must contain at least one non-blank phrase".to_string(),
            ));
        }
        if self.dialogue.sufficiency_rounds == 0 {
            return Err(Error::Config(
                "dialogue.sufficiency_rounds must be at least 1".to_string(),
            ));
        }
        if self.execution.min_duration_ms > self.execution.max_duration_ms {
            return Err(Error::Config(
                "execution.min_duration_ms must not exceed execution.max_duration_ms".to_string(),
            ));
        }
        let delays = [
            ("dialogue.ack_delay_ms", self.dialogue.ack_delay_ms),
            ("dialogue.resynthesis_delay_ms", self.dialogue.resynthesis_delay_ms),
            ("execution.stagger_ms", self.execution.stagger_ms),
            ("execution.max_duration_ms", self.execution.max_duration_ms),
            ("execution.slow_threshold_ms", self.execution.slow_threshold_ms),
        ];
        if let Some((name, _)) = delays.iter().find(|(_, ms)| *ms > MAX_DELAY_MS) {
            return Err(Error::Config(format!(
                "{} must not exceed {}ms",
                name, MAX_DELAY_MS
            )));
        }
        if !(0.0..=1.0).contains(&self.execution.pass_probability) {
            return Err(Error::Config(
                "execution.pass_probability must be between 0 and 1".to_string(),
            ));
        }
        if self.synthesis.case_prefix.trim().is_empty() {
            return Err(Error::Config(
                "synthesis.case_prefix must not be empty".to_string(),
            ));
        }
        if self.synthesis.max_cases == 0 {
            return Err(Error::Config(
                "synthesis.max_cases must be at least 1".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for page in &self.pages {
            if !seen.insert(page.id.as_str()) {
                return Err(Error::Config(format!("duplicate page id: {}", page.id)));
            }
        }
        Ok(())
    }

    /// Candidate pages offered during disambiguation, none marked primary
    pub fn candidate_pages(&self) -> Vec<CandidatePage> {
        let pages = if self.pages.is_empty() {
            default_pages()
        } else {
            self.pages.clone()
        };
        pages
            .into_iter()
            .map(|p| CandidatePage {
                id: p.id,
                label: p.label,
                description: p.description,
                is_primary: false,
            })
            .collect()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/caseforge/config.toml` (~/.config/caseforge/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("caseforge").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/caseforge/` (~/.local/state/caseforge/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("caseforge")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/caseforge/caseforge.log` (~/.local/state/caseforge/caseforge.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("caseforge.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
