//! Environment Configuration Loader
//!
//! Loads environment variables from the canonical location: `/etc/chainlog/environment`
//! and builds a [`LoggerConfig`] from `CHAINLOG_*` variables.
//!
//! ## Usage
//!
//! Call `load_environment()` early in main() before accessing any config:
//!
//! ```rust
//! use chainlog_core::config::{load_environment, LoggerConfig};
//!
//! load_environment();
//! let config = LoggerConfig::from_env();
//! assert!(!config.input_keyword.is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/chainlog/environment", ".env"];

/// Key fragments whose values never reach the logs
const SECRET_KEY_MARKERS: &[&str] = &["KEY", "TOKEN", "SECRET", "PASSWORD", "CREDENTIAL"];

/// Load environment variables from the canonical configuration file.
///
/// This function:
/// 1. Checks `CHAINLOG_ENV_FILE` if set
/// 2. Checks `/etc/chainlog/environment` (system-wide)
/// 3. Falls back to `.env` in current directory (development)
/// 4. Does NOT override existing environment variables
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("CHAINLOG_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Try to load an environment file from the given path.
fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for line in content.lines() {
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                        debug!("Loaded: {}={}", key, display_value(&key, &value));
                    } else {
                        skipped_count += 1;
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Value as it may appear in logs: `***` for credential-like keys.
fn display_value<'a>(key: &str, value: &'a str) -> &'a str {
    let key = key.to_uppercase();
    if SECRET_KEY_MARKERS.iter().any(|marker| key.contains(marker)) {
        "***"
    } else {
        value
    }
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // Handle: KEY=VALUE, KEY="VALUE", KEY='VALUE'
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Get an integer configuration value.
pub fn get_config_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Settings for a chain logger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Write records to the CSV store
    pub output_csv: bool,
    /// Ask the operator for a rating of every primary response
    pub request_rating: bool,
    /// Ask the operator for comments on every primary response
    pub request_comments: bool,
    /// User name used in the store file names
    pub user_name: String,
    /// Experiment name used in the store file names
    pub experiment_name: String,
    /// Directory holding the store files
    pub path: PathBuf,
    /// Input variable that holds the user-facing input
    pub input_keyword: String,
    /// Combine child runs into the primary run's record
    pub combine_runs: bool,
    /// Deepest child level merged into the primary record (None = all)
    pub merge_depth: Option<usize>,
    /// Records kept in the in-memory history
    pub history_size: usize,
    /// Logger faults kept for inspection
    pub max_faults: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            output_csv: true,
            request_rating: false,
            request_comments: false,
            user_name: "user".to_string(),
            experiment_name: "default".to_string(),
            path: PathBuf::from("."),
            input_keyword: "question".to_string(),
            combine_runs: true,
            merge_depth: None,
            history_size: 100,
            max_faults: 100,
        }
    }
}

impl LoggerConfig {
    /// Build a config from `CHAINLOG_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| get_config_opt(key))
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| lookup(key).map(|v| parse_bool(&v)).unwrap_or(default);
        let count = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            output_csv: flag("CHAINLOG_OUTPUT_CSV", defaults.output_csv),
            request_rating: flag("CHAINLOG_REQUEST_RATING", defaults.request_rating),
            request_comments: flag("CHAINLOG_REQUEST_COMMENTS", defaults.request_comments),
            user_name: lookup("CHAINLOG_USER_NAME").unwrap_or(defaults.user_name),
            experiment_name: lookup("CHAINLOG_EXPERIMENT").unwrap_or(defaults.experiment_name),
            path: lookup("CHAINLOG_PATH").map(PathBuf::from).unwrap_or(defaults.path),
            input_keyword: lookup("CHAINLOG_INPUT_KEYWORD").unwrap_or(defaults.input_keyword),
            combine_runs: flag("CHAINLOG_COMBINE_RUNS", defaults.combine_runs),
            merge_depth: lookup("CHAINLOG_MERGE_DEPTH").and_then(|v| v.parse().ok()),
            history_size: count("CHAINLOG_HISTORY_SIZE", defaults.history_size),
            max_faults: count("CHAINLOG_MAX_FAULTS", defaults.max_faults),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    pub fn with_experiment_name(mut self, experiment_name: impl Into<String>) -> Self {
        self.experiment_name = experiment_name.into();
        self
    }

    pub fn with_input_keyword(mut self, input_keyword: impl Into<String>) -> Self {
        self.input_keyword = input_keyword.into();
        self
    }

    pub fn with_combine_runs(mut self, combine_runs: bool) -> Self {
        self.combine_runs = combine_runs;
        self
    }

    pub fn with_merge_depth(mut self, merge_depth: Option<usize>) -> Self {
        self.merge_depth = merge_depth;
        self
    }

    pub fn with_feedback(mut self, request_rating: bool, request_comments: bool) -> Self {
        self.request_rating = request_rating;
        self.request_comments = request_comments;
        self
    }

    pub fn with_output_csv(mut self, output_csv: bool) -> Self {
        self.output_csv = output_csv;
        self
    }

    /// Whether any operator feedback is requested.
    pub fn wants_feedback(&self) -> bool {
        self.request_rating || self.request_comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_display_value_masks_credentials() {
        assert_eq!(display_value("AWS_SECRET_ACCESS_KEY", "abc"), "***");
        assert_eq!(display_value("OPENAI_API_KEY", "sk-123"), "***");
        assert_eq!(display_value("hf_token", "t"), "***");
        assert_eq!(display_value("DB_PASSWORD", "p"), "***");
        assert_eq!(display_value("CHAINLOG_EXPERIMENT", "exp1"), "exp1");
        assert_eq!(display_value("AWS_REGION", "us-east-1"), "us-east-1");
    }

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("FOO=\"bar baz\"").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar baz");
    }

    #[test]
    fn test_parse_env_line_keeps_equals_in_value() {
        let (k, v) = parse_env_line("CHAINLOG_PATH=/tmp/a=b").unwrap();
        assert_eq!(k, "CHAINLOG_PATH");
        assert_eq!(v, "/tmp/a=b");
    }

    #[test]
    fn test_parse_env_line_empty() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
    }

    #[test]
    fn test_defaults() {
        let config = LoggerConfig::default();
        assert!(config.output_csv);
        assert!(config.combine_runs);
        assert!(!config.wants_feedback());
        assert_eq!(config.input_keyword, "question");
        assert_eq!(config.merge_depth, None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CHAINLOG_USER_NAME", "jane doe"),
            ("CHAINLOG_EXPERIMENT", "exp1"),
            ("CHAINLOG_COMBINE_RUNS", "no"),
            ("CHAINLOG_REQUEST_RATING", "yes"),
            ("CHAINLOG_MERGE_DEPTH", "2"),
            ("CHAINLOG_HISTORY_SIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = LoggerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.user_name, "jane doe");
        assert_eq!(config.experiment_name, "exp1");
        assert!(!config.combine_runs);
        assert!(config.request_rating);
        assert!(config.wants_feedback());
        assert_eq!(config.merge_depth, Some(2));
        assert_eq!(config.history_size, 100);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LoggerConfig =
            serde_json::from_str(r#"{"experiment_name": "rag", "combine_runs": false}"#).unwrap();
        assert_eq!(config.experiment_name, "rag");
        assert!(!config.combine_runs);
        assert_eq!(config.user_name, "user");
    }
}
