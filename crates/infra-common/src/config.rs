//! TOML configuration loading
//!
//! Component configs are plain serde structs; this module turns a TOML
//! document into one of them and offers the `duration_ms` field adapter so
//! timeouts can be written as integer milliseconds.

use crate::errors::context::{ErrorContext, ErrorExt};
use crate::errors::types::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Parse a configuration value from TOML text
pub fn load_toml<T: DeserializeOwned>(text: &str) -> Result<T> {
    toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
}

/// Read and parse a TOML configuration file
pub fn load_toml_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(Error::from)
        .context(ErrorContext::new("config", "read").with_details(path.display().to_string()))?;
    load_toml(&text)
        .context(ErrorContext::new("config", "parse").with_details(path.display().to_string()))
}

/// Serialize a `Duration` as integer milliseconds.
///
/// Use with `#[serde(with = "rphone_infra_common::config::duration_ms")]`.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::io::Write;
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(with = "duration_ms")]
        timeout_ms: Duration,
    }

    #[test]
    fn parses_durations_in_millis() {
        let sample: Sample = load_toml("name = \"a\"\ntimeout_ms = 1500\n").unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "a".into(),
                timeout_ms: Duration::from_millis(1500)
            }
        );
    }

    #[test]
    fn reports_parse_errors_as_config_errors() {
        let err = load_toml::<Sample>("name = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"file\"\ntimeout_ms = 20").unwrap();

        let sample: Sample = load_toml_file(file.path()).unwrap();
        assert_eq!(sample.timeout_ms, Duration::from_millis(20));
    }

    #[test]
    fn missing_file_mentions_path() {
        let err = load_toml_file::<Sample>("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
