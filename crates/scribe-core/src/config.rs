//! Audit pipeline configuration.
//!
//! Configuration is plain serde data loaded from YAML, with environment
//! variables layered on top so deployments can retarget the pipeline
//! without editing files. Every field has a default; an empty document is
//! a valid configuration that logs compact JSON lines to stdout.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variables recognized by [`AuditConfig::apply_env`].
pub const ENV_SINK: &str = "SCRIBE_AUDIT_SINK";
pub const ENV_FILE_PATH: &str = "SCRIBE_AUDIT_FILE";
pub const ENV_MAX_SIZE_MB: &str = "SCRIBE_AUDIT_MAX_SIZE_MB";
pub const ENV_PRETTY: &str = "SCRIBE_AUDIT_PRETTY";
pub const ENV_RETENTION: &str = "SCRIBE_AUDIT_RETENTION";
pub const ENV_MAX_FILES: &str = "SCRIBE_AUDIT_MAX_FILES";
pub const ENV_LOG_PROMPTS: &str = "SCRIBE_LOG_PROMPTS";
pub const ENV_LOG_RESPONSES: &str = "SCRIBE_LOG_RESPONSES";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Where audit entries are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Compact JSON lines on standard output.
    #[default]
    Stdout,
    /// Size-rotated JSON Lines file.
    File,
    /// Discard everything.
    Null,
}

impl FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(SinkKind::Stdout),
            "file" => Ok(SinkKind::File),
            "null" => Ok(SinkKind::Null),
            other => Err(ConfigError::Config(format!(
                "unknown sink kind '{other}', expected stdout, file, or null"
            ))),
        }
    }
}

/// What happens to a log file once rotation retires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Retired files stay on disk under their sequence names.
    #[default]
    Keep,
    /// Retired files are removed, except for the `max_files` most recent.
    Delete,
}

impl FromStr for RetentionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(RetentionPolicy::Keep),
            "delete" => Ok(RetentionPolicy::Delete),
            other => Err(ConfigError::Config(format!(
                "unknown retention policy '{other}', expected keep or delete"
            ))),
        }
    }
}

/// Audit pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Sink the process-wide default routes to
    #[serde(default)]
    pub sink: SinkKind,

    /// Active log file path for the file sink
    #[serde(default = "default_file_path")]
    pub file_path: PathBuf,

    /// Rotation threshold for the file sink, in megabytes
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Indented JSON on stdout instead of compact lines
    #[serde(default)]
    pub pretty: bool,

    /// What to do with rotated files
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// How many rotated files [`RetentionPolicy::Delete`] preserves besides
    /// the active one; unset means none. Ignored under `Keep`.
    #[serde(default)]
    pub max_files: Option<usize>,

    /// Whether emitters may attach raw prompt text. The pipeline never
    /// inspects payloads; this flag is the contract emitters consult.
    #[serde(default)]
    pub log_prompts: bool,

    /// Whether emitters may attach raw response text.
    #[serde(default)]
    pub log_responses: bool,
}

fn default_file_path() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

fn default_max_file_size_mb() -> u64 {
    64
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            file_path: default_file_path(),
            max_file_size_mb: default_max_file_size_mb(),
            pretty: false,
            retention: RetentionPolicy::default(),
            max_files: None,
            log_prompts: false,
            log_responses: false,
        }
    }
}

impl AuditConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `SCRIBE_*` environment variables onto this configuration.
    /// Unset variables leave the corresponding field untouched.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(ENV_SINK) {
            self.sink = value.parse()?;
        }
        if let Ok(value) = std::env::var(ENV_FILE_PATH) {
            self.file_path = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var(ENV_MAX_SIZE_MB) {
            self.max_file_size_mb = parse_u64(ENV_MAX_SIZE_MB, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_PRETTY) {
            self.pretty = parse_bool(ENV_PRETTY, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_RETENTION) {
            self.retention = value.parse()?;
        }
        if let Ok(value) = std::env::var(ENV_MAX_FILES) {
            self.max_files = Some(parse_u64(ENV_MAX_FILES, &value)? as usize);
        }
        if let Ok(value) = std::env::var(ENV_LOG_PROMPTS) {
            self.log_prompts = parse_bool(ENV_LOG_PROMPTS, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_LOG_RESPONSES) {
            self.log_responses = parse_bool(ENV_LOG_RESPONSES, &value)?;
        }
        Ok(())
    }

    /// Rotation threshold in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Config(format!(
            "{var}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_u64(var: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Config(format!("{var}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert_eq!(config.sink, SinkKind::Stdout);
        assert_eq!(config.file_path, PathBuf::from("audit.jsonl"));
        assert_eq!(config.max_file_size_mb, 64);
        assert!(!config.pretty);
        assert_eq!(config.retention, RetentionPolicy::Keep);
        assert_eq!(config.max_files, None);
        assert!(!config.log_prompts);
        assert!(!config.log_responses);
    }

    #[test]
    fn test_empty_yaml_is_all_defaults() {
        let config = AuditConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AuditConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
sink: file
file_path: /var/log/scribe/audit.jsonl
max_file_size_mb: 8
"#;
        let config = AuditConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.sink, SinkKind::File);
        assert_eq!(config.file_path, PathBuf::from("/var/log/scribe/audit.jsonl"));
        assert_eq!(config.max_file_size_mb, 8);
        assert_eq!(config.retention, RetentionPolicy::Keep);
        assert!(!config.pretty);
    }

    #[test]
    fn test_retention_yaml() {
        let yaml = r#"
sink: file
retention: delete
max_files: 3
"#;
        let config = AuditConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retention, RetentionPolicy::Delete);
        assert_eq!(config.max_files, Some(3));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(AuditConfig::from_yaml("sink: [not, a, scalar]").is_err());
        assert!(AuditConfig::from_yaml("sink: database").is_err());
    }

    #[test]
    fn test_sink_kind_from_str() {
        assert_eq!("stdout".parse::<SinkKind>().unwrap(), SinkKind::Stdout);
        assert_eq!("FILE".parse::<SinkKind>().unwrap(), SinkKind::File);
        assert_eq!(" null ".parse::<SinkKind>().unwrap(), SinkKind::Null);
        assert!("syslog".parse::<SinkKind>().is_err());
    }

    #[test]
    fn test_retention_from_str() {
        assert_eq!("keep".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Keep);
        assert_eq!("Delete".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Delete);
        assert!("archive".parse::<RetentionPolicy>().is_err());
    }

    #[test]
    fn test_parse_bool_accepts_common_spellings() {
        for value in ["1", "true", "YES", "on"] {
            assert!(parse_bool("VAR", value).unwrap());
        }
        for value in ["0", "false", "No", "off"] {
            assert!(!parse_bool("VAR", value).unwrap());
        }
        assert!(parse_bool("VAR", "maybe").is_err());
    }

    #[test]
    fn test_max_file_size_bytes() {
        let mut config = AuditConfig::default();
        config.max_file_size_mb = 2;
        assert_eq!(config.max_file_size_bytes(), 2 * 1024 * 1024);

        // Absurd sizes saturate instead of overflowing.
        config.max_file_size_mb = u64::MAX;
        assert_eq!(config.max_file_size_bytes(), u64::MAX);
    }

    #[test]
    fn test_env_overrides() {
        // SAFETY: tests in this binary that touch the environment are
        // confined to this function, and the variables are removed before
        // it returns.
        unsafe {
            std::env::set_var(ENV_SINK, "file");
            std::env::set_var(ENV_FILE_PATH, "/tmp/scribe/audit.jsonl");
            std::env::set_var(ENV_MAX_SIZE_MB, "16");
            std::env::set_var(ENV_PRETTY, "true");
            std::env::set_var(ENV_RETENTION, "delete");
            std::env::set_var(ENV_MAX_FILES, "5");
            std::env::set_var(ENV_LOG_PROMPTS, "yes");
        }

        let config = AuditConfig::from_env().unwrap();

        // SAFETY: see above.
        unsafe {
            std::env::remove_var(ENV_SINK);
            std::env::remove_var(ENV_FILE_PATH);
            std::env::remove_var(ENV_MAX_SIZE_MB);
            std::env::remove_var(ENV_PRETTY);
            std::env::remove_var(ENV_RETENTION);
            std::env::remove_var(ENV_MAX_FILES);
            std::env::remove_var(ENV_LOG_PROMPTS);
        }

        assert_eq!(config.sink, SinkKind::File);
        assert_eq!(config.file_path, PathBuf::from("/tmp/scribe/audit.jsonl"));
        assert_eq!(config.max_file_size_mb, 16);
        assert!(config.pretty);
        assert_eq!(config.retention, RetentionPolicy::Delete);
        assert_eq!(config.max_files, Some(5));
        assert!(config.log_prompts);
        assert!(!config.log_responses);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let var = "SCRIBE_TEST_BOOL";
        assert!(parse_bool(var, "maybe").is_err());
        assert!(parse_u64(var, "ten").is_err());
    }
}
