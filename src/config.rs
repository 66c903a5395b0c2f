use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{RecastError, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OUTPUT_DIR: &str = "refactored_codebase";

/// Directory and file names skipped at any depth. Entries containing `*` are globs
/// matched against the file name.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Version control
    ".git", ".svn", ".hg",
    // Python
    "__pycache__", "*.pyc", "*.pyo", "*.pyd", ".Python",
    "venv", "env", ".venv", ".env", "ENV", "env.bak", "venv.bak",
    ".pytest_cache", ".coverage", "htmlcov", ".tox",
    // Node.js
    "node_modules", "npm-debug.log*", "yarn-debug.log*", "yarn-error.log*",
    ".npm", ".yarn-integrity",
    // IDEs
    ".idea", ".vscode", "*.swp", "*.swo", "*~",
    // Build outputs
    "dist", "build", "out", "target", "bin", "obj",
    // OS files
    ".DS_Store", "Thumbs.db", "desktop.ini",
    // Logs
    "*.log", "logs",
    // Temporary files
    "tmp", "temp", ".tmp", ".temp",
];

/// Values read from the optional config file and the environment. Keys match the
/// lowercased environment variable names, so `GEMINI_MODEL` and `gemini_model = "..."`
/// in the file set the same thing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSettings {
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_temperature: Option<f32>,
    pub gemini_max_retries: Option<u32>,
    pub gemini_request_timeout: Option<u64>,
    pub gemini_base_url: Option<String>,
    pub gemini_max_output_tokens: Option<u32>,
    pub max_file_size_for_analysis: Option<usize>,
    pub max_file_size_for_refactoring: Option<usize>,
    pub max_report_input_size: Option<usize>,
    pub git_clone_timeout: Option<u64>,
    pub request_delay: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub extra_ignore_patterns: Option<Vec<String>>,
}

impl FileSettings {
    /// Layer the config file (explicit, or the platform default when present) under
    /// the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::load_from(config_file, true)
    }

    pub fn load_from(config_file: Option<&Path>, include_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder();

        match config_file {
            Some(path) => {
                debug!("Loading configuration file {:?}", path);
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    debug!("Checking default configuration file {:?}", path);
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        if include_env {
            builder = builder.add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("extra_ignore_patterns"),
            );
        }

        let settings = builder.build()?.try_deserialize::<FileSettings>()?;
        Ok(settings)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "recast", "recast")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Settings that come from command-line flags and win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub delay_secs: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub skip_analysis: bool,
    pub skip_refactoring: bool,
}

/// Immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub call_delay: Duration,
    pub retry_base_delay: Duration,
    pub max_analysis_bytes: usize,
    pub max_refactor_bytes: usize,
    pub max_report_input_bytes: usize,
    pub clone_timeout: Duration,
    pub base_url: String,
    pub ignore_patterns: Vec<String>,
    pub skip_analysis: bool,
    pub skip_refactoring: bool,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_output_tokens: 8192,
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            call_delay: Duration::from_secs(2),
            retry_base_delay: Duration::from_secs(2),
            max_analysis_bytes: 12_000,
            max_refactor_bytes: 15_000,
            max_report_input_bytes: 20_000,
            clone_timeout: Duration::from_secs(60),
            base_url: DEFAULT_BASE_URL.to_string(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            skip_analysis: false,
            skip_refactoring: false,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl RunConfig {
    /// Defaults, then file/environment settings, then command-line flags.
    pub fn resolve(settings: FileSettings, overrides: &CliOverrides) -> Result<Self> {
        let config = Self::merge(settings, overrides);
        config.validate()?;
        Ok(config)
    }

    /// Layering without validation, for `--show-config`.
    pub fn merge(settings: FileSettings, overrides: &CliOverrides) -> Self {
        let mut config = RunConfig::default();

        if let Some(key) = settings.gemini_api_key {
            config.api_key = key.trim().to_string();
        }
        if let Some(model) = settings.gemini_model {
            config.model = model;
        }
        if let Some(temperature) = settings.gemini_temperature {
            config.temperature = temperature;
        }
        if let Some(retries) = settings.gemini_max_retries {
            config.max_retries = retries;
        }
        if let Some(secs) = settings.gemini_request_timeout {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = settings.gemini_base_url {
            config.base_url = url;
        }
        if let Some(tokens) = settings.gemini_max_output_tokens {
            config.max_output_tokens = tokens;
        }
        if let Some(bytes) = settings.max_file_size_for_analysis {
            config.max_analysis_bytes = bytes;
        }
        if let Some(bytes) = settings.max_file_size_for_refactoring {
            config.max_refactor_bytes = bytes;
        }
        if let Some(bytes) = settings.max_report_input_size {
            config.max_report_input_bytes = bytes;
        }
        if let Some(secs) = settings.git_clone_timeout {
            config.clone_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = settings.request_delay {
            config.call_delay = Duration::from_secs(secs);
        }
        if let Some(ms) = settings.retry_base_delay_ms {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(extra) = settings.extra_ignore_patterns {
            config
                .ignore_patterns
                .extend(extra.into_iter().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()));
        }

        if let Some(model) = &overrides.model {
            config.model = model.clone();
        }
        if let Some(secs) = overrides.delay_secs {
            config.call_delay = Duration::from_secs(secs);
        }
        if let Some(dir) = &overrides.output_dir {
            config.output_dir = dir.clone();
        }
        config.skip_analysis = overrides.skip_analysis;
        config.skip_refactoring = overrides.skip_refactoring;
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(RecastError::FatalConfig(
                "GEMINI_API_KEY not found. Set it in the environment or the config file \
                 (get a key from https://aistudio.google.com/app/apikey)"
                    .to_string(),
            ));
        }
        if self.skip_analysis && self.skip_refactoring {
            return Err(RecastError::FatalConfig(
                "Cannot skip both analysis and refactoring".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(RecastError::FatalConfig("Model name must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RecastError::FatalConfig(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_analysis_bytes == 0 || self.max_refactor_bytes == 0 || self.max_report_input_bytes == 0 {
            return Err(RecastError::FatalConfig(
                "File size limits must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(RecastError::FatalConfig(
                "Request timeout must be greater than zero".to_string(),
            ));
        }
        for pattern in &self.ignore_patterns {
            globset::Glob::new(pattern).map_err(|e| {
                RecastError::FatalConfig(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }

    pub fn effective_view(&self) -> EffectiveConfig {
        EffectiveConfig {
            api_key: if self.api_key.is_empty() { "<missing>" } else { "<redacted>" }.to_string(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            max_retries: self.max_retries,
            request_timeout_secs: self.request_timeout.as_secs(),
            request_delay_secs: self.call_delay.as_secs(),
            retry_base_delay_ms: self.retry_base_delay.as_millis() as u64,
            max_file_size_for_analysis: self.max_analysis_bytes,
            max_file_size_for_refactoring: self.max_refactor_bytes,
            max_report_input_size: self.max_report_input_bytes,
            git_clone_timeout_secs: self.clone_timeout.as_secs(),
            base_url: self.base_url.clone(),
            skip_analysis: self.skip_analysis,
            skip_refactoring: self.skip_refactoring,
            output_dir: self.output_dir.display().to_string(),
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }
}

/// Printable form of [`RunConfig`] with the key redacted.
#[derive(Debug, Serialize)]
pub struct EffectiveConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub request_delay_secs: u64,
    pub retry_base_delay_ms: u64,
    pub max_file_size_for_analysis: usize,
    pub max_file_size_for_refactoring: usize,
    pub max_report_input_size: usize,
    pub git_clone_timeout_secs: u64,
    pub base_url: String,
    pub skip_analysis: bool,
    pub skip_refactoring: bool,
    pub output_dir: String,
    pub ignore_patterns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Serializes tests that mutate the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn settings_with_key() -> FileSettings {
        FileSettings {
            gemini_api_key: Some("test-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RunConfig::resolve(settings_with_key(), &CliOverrides::default()).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.call_delay, Duration::from_secs(2));
        assert_eq!(config.max_analysis_bytes, 12_000);
        assert_eq!(config.max_refactor_bytes, 15_000);
        assert_eq!(config.output_dir, PathBuf::from("refactored_codebase"));
        assert!(config.ignore_patterns.iter().any(|p| p == "node_modules"));
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = RunConfig::resolve(FileSettings::default(), &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, RecastError::FatalConfig(msg) if msg.contains("GEMINI_API_KEY")));
    }

    #[test]
    fn test_blank_api_key_is_fatal() {
        let settings = FileSettings {
            gemini_api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(RunConfig::resolve(settings, &CliOverrides::default()).is_err());
    }

    #[test]
    fn test_skipping_both_phases_is_fatal() {
        let overrides = CliOverrides {
            skip_analysis: true,
            skip_refactoring: true,
            ..Default::default()
        };
        let err = RunConfig::resolve(settings_with_key(), &overrides).unwrap_err();
        assert!(matches!(err, RecastError::FatalConfig(_)));
    }

    #[test]
    fn test_cli_overrides_win_over_settings() {
        let settings = FileSettings {
            gemini_model: Some("gemini-from-env".to_string()),
            request_delay: Some(7),
            ..settings_with_key()
        };
        let overrides = CliOverrides {
            model: Some("gemini-from-cli".to_string()),
            delay_secs: Some(0),
            output_dir: Some(PathBuf::from("out-dir")),
            ..Default::default()
        };

        let config = RunConfig::resolve(settings, &overrides).unwrap();
        assert_eq!(config.model, "gemini-from-cli");
        assert_eq!(config.call_delay, Duration::ZERO);
        assert_eq!(config.output_dir, PathBuf::from("out-dir"));
    }

    #[test]
    fn test_settings_override_defaults() {
        let settings = FileSettings {
            gemini_temperature: Some(0.7),
            gemini_max_retries: Some(5),
            max_file_size_for_analysis: Some(100),
            max_file_size_for_refactoring: Some(200),
            retry_base_delay_ms: Some(250),
            extra_ignore_patterns: Some(vec!["vendor".to_string(), " ".to_string()]),
            ..settings_with_key()
        };

        let config = RunConfig::resolve(settings, &CliOverrides::default()).unwrap();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_analysis_bytes, 100);
        assert_eq!(config.max_refactor_bytes, 200);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.ignore_patterns.last().map(String::as_str), Some("vendor"));
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let settings = FileSettings {
            gemini_temperature: Some(3.5),
            ..settings_with_key()
        };
        assert!(RunConfig::resolve(settings, &CliOverrides::default()).is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recast.toml");
        fs::write(
            &path,
            r#"
gemini_api_key = "file-key"
gemini_model = "gemini-1.5-flash-8b"
max_file_size_for_refactoring = 4096
extra_ignore_patterns = ["vendor", "*.min.js"]
"#,
        )
        .unwrap();

        let settings = FileSettings::load_from(Some(&path), false).unwrap();
        assert_eq!(settings.gemini_api_key.as_deref(), Some("file-key"));
        assert_eq!(settings.gemini_model.as_deref(), Some("gemini-1.5-flash-8b"));
        assert_eq!(settings.max_file_size_for_refactoring, Some(4096));
        assert_eq!(settings.extra_ignore_patterns.unwrap().len(), 2);
    }

    #[test]
    fn test_environment_wins_over_config_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recast.toml");
        fs::write(
            &path,
            r#"
gemini_max_retries = 1
request_delay = 9
gemini_model = "gemini-from-file"
extra_ignore_patterns = ["fixtures"]
"#,
        )
        .unwrap();

        std::env::set_var("GEMINI_MAX_RETRIES", "5");
        std::env::set_var("REQUEST_DELAY", "0");
        std::env::set_var("EXTRA_IGNORE_PATTERNS", "vendor,gen");
        let loaded = FileSettings::load_from(Some(&path), true);
        std::env::remove_var("GEMINI_MAX_RETRIES");
        std::env::remove_var("REQUEST_DELAY");
        std::env::remove_var("EXTRA_IGNORE_PATTERNS");

        let settings = loaded.unwrap();
        assert_eq!(settings.gemini_max_retries, Some(5));
        assert_eq!(settings.request_delay, Some(0));
        assert_eq!(
            settings.extra_ignore_patterns,
            Some(vec!["vendor".to_string(), "gen".to_string()])
        );
        assert_eq!(settings.gemini_model.as_deref(), Some("gemini-from-file"));
    }

    #[test]
    fn test_invalid_ignore_pattern_rejected_before_run() {
        let settings = FileSettings {
            extra_ignore_patterns: Some(vec!["src/[".to_string()]),
            ..settings_with_key()
        };
        let err = RunConfig::resolve(settings, &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, RecastError::FatalConfig(msg) if msg.contains("src/[")));
    }

    #[test]
    fn test_missing_explicit_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = FileSettings::load_from(Some(&dir.path().join("nope.toml")), false);
        assert!(matches!(result, Err(RecastError::Config(_))));
    }

    #[test]
    fn test_effective_view_redacts_key() {
        let config = RunConfig::resolve(settings_with_key(), &CliOverrides::default()).unwrap();
        let rendered = toml::to_string_pretty(&config.effective_view()).unwrap();
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("test-key"));
    }
}
