use crate::error::LifeResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tracker behavior knobs, read from JSON
///
/// Every key is optional:
///
/// ```json
/// { "check_aliasing": true, "record_events": true, "max_depth": 64 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Reject operations that leave two live slots owning one resource
    pub check_aliasing: bool,
    /// Keep destruction events on the tracker for later inspection
    pub record_events: bool,
    /// Maximum field nesting depth accepted at registration
    pub max_depth: usize,
    /// Allow reading an initialized field of a slot still under construction
    pub allow_partial_field_reads: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            check_aliasing: true,
            record_events: true,
            max_depth: 64,
            allow_partial_field_reads: true,
        }
    }
}

impl TrackerConfig {
    pub fn from_file(path: &Path) -> LifeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(code: &str) -> LifeResult<Self> {
        Ok(serde_json::from_str(code)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TrackerConfig::from_json(r#"{ "max_depth": 3 }"#).unwrap();
        assert_eq!(config.max_depth, 3);
        assert!(config.check_aliasing);
        assert!(config.record_events);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "check_aliasing": false }}"#).unwrap();
        let config = TrackerConfig::from_file(file.path()).unwrap();
        assert!(!config.check_aliasing);
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn test_bad_json() {
        assert!(TrackerConfig::from_json("{ max_depth: }").is_err());
    }
}
