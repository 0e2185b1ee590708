//! Per-connection options negotiated from the upgrade query string.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("invalid version {0:?}: expected a non-negative integer")]
    Version(String),
    #[error("invalid {name} {value:?}: expected a boolean")]
    Flag { name: &'static str, value: String },
}

/// What a client asked to receive on its live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub version: u32,
    /// Split the stops snapshot into bounded messages.
    pub chunkify: bool,
    /// Send stops, routes and route shapes before the first vehicles.
    pub send_static: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            version: 0,
            chunkify: true,
            send_static: true,
        }
    }
}

impl SessionOptions {
    /// Reads `version`, `chunkify` and `static` from query parameters.
    ///
    /// Absent or empty parameters keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns the first parameter that is present but malformed.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, OptionsError> {
        let mut options = Self::default();

        if let Some(v) = non_empty(params, "version") {
            options.version = v
                .parse()
                .map_err(|_| OptionsError::Version(v.to_string()))?;
        }
        if let Some(v) = non_empty(params, "chunkify") {
            options.chunkify = parse_flag("chunkify", v)?;
        }
        if let Some(v) = non_empty(params, "static") {
            options.send_static = parse_flag("static", v)?;
        }

        Ok(options)
    }
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Accepts the spellings existing map clients already send.
fn parse_flag(name: &'static str, value: &str) -> Result<bool, OptionsError> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(OptionsError::Flag {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_absent() {
        let options = SessionOptions::from_query(&HashMap::new()).unwrap();
        assert_eq!(options, SessionOptions::default());
        assert!(options.chunkify);
        assert!(options.send_static);
    }

    #[test]
    fn test_all_options_parsed() {
        let options = SessionOptions::from_query(&query(&[
            ("version", "2"),
            ("chunkify", "f"),
            ("static", "FALSE"),
        ]))
        .unwrap();
        assert_eq!(options.version, 2);
        assert!(!options.chunkify);
        assert!(!options.send_static);
    }

    #[test]
    fn test_empty_value_keeps_default() {
        let options =
            SessionOptions::from_query(&query(&[("version", ""), ("static", "")])).unwrap();
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn test_malformed_version_rejected() {
        let err = SessionOptions::from_query(&query(&[("version", "abc")])).unwrap_err();
        assert_eq!(err, OptionsError::Version("abc".to_string()));

        assert!(SessionOptions::from_query(&query(&[("version", "-1")])).is_err());
        assert!(SessionOptions::from_query(&query(&[("version", "1.5")])).is_err());
    }

    #[test]
    fn test_large_version_accepted() {
        let options = SessionOptions::from_query(&query(&[("version", "256")])).unwrap();
        assert_eq!(options.version, 256);
    }

    #[test]
    fn test_malformed_flag_rejected() {
        let err = SessionOptions::from_query(&query(&[("chunkify", "yes")])).unwrap_err();
        assert_eq!(
            err,
            OptionsError::Flag {
                name: "chunkify",
                value: "yes".to_string()
            }
        );
        assert!(err.to_string().contains("chunkify"));
    }
}
