//! Plain-text configuration files.
//!
//! One `key = value` pair per line; `#` starts a comment; surrounding
//! whitespace is trimmed. Unknown keys are kept but ignored. Values are
//! parsed on access with a per-key default.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line} has no '=': {text:?}")]
    MissingEquals { line: usize, text: String },

    #[error("invalid value {value:?} for key {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Parsed key/value configuration.
#[derive(Debug, Default, Clone)]
pub struct Config {
    entries: HashMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = HashMap::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::MissingEquals {
                line: index + 1,
                text: line.to_string(),
            })?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { entries })
    }

    /// Typed lookup with a default for missing keys.
    pub fn get<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.entries.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_pairs_with_comments_and_whitespace() {
        let cfg = Config::parse(
            "# a comment\n\
             seed = 42\n\
             \n\
             network_kind=barabasi   # trailing comment\n\
             \t block_num =  10  \n",
        )
        .unwrap();
        assert_eq!(cfg.get("seed", 0u64).unwrap(), 42);
        assert_eq!(cfg.raw("network_kind"), Some("barabasi"));
        assert_eq!(cfg.get("block_num", 0u64).unwrap(), 10);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let cfg = Config::parse("seed = 1\n").unwrap();
        assert_eq!(cfg.get("nthreads", -1i32).unwrap(), -1);
        assert_eq!(cfg.get("block_reward", 1.0f64).unwrap(), 1.0);
    }

    #[test]
    fn test_line_without_equals_is_an_error() {
        let err = Config::parse("seed 42\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEquals { line: 1, .. }));
    }

    #[test]
    fn test_unparseable_value_is_an_error() {
        let cfg = Config::parse("seed = banana\n").unwrap();
        let err = cfg.get("seed", 0u64).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_comment_only_value_is_missing_equals() {
        // The comment strips first, leaving a bare key.
        let err = Config::parse("seed # = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEquals { .. }));
    }
}
