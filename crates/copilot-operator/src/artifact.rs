//! Per-resource error artifacts.
//!
//! A failed external call during a reconcile pass leaves `<name>.json` in the
//! artifact directory. This is a fire-and-forget diagnostic side channel, not
//! a retry queue; a failed write is only logged by the caller.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct ErrorArtifact {
    pub name: String,
    pub category: String,
    pub error: String,
    pub timestamp: String,
}

impl ErrorArtifact {
    pub fn new(name: impl Into<String>, category: &str, error: impl Into<String>) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            name: name.into(),
            category: category.to_string(),
            error: error.into(),
            timestamp,
        }
    }

    /// Write the artifact as `<name>.json` under `dir`, returning the path.
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(format!("{}.json", self.name));
        let body = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        fs::write(&path, body)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_named_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ErrorArtifact::new("r1", "provider", "Provider returned HTTP 500: boom");

        let path = artifact.write_to(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "r1.json");

        let body: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(body["name"], "r1");
        assert_eq!(body["category"], "provider");
        assert_eq!(body["error"], "Provider returned HTTP 500: boom");
        assert!(body["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let artifact = ErrorArtifact::new("r1", "persist", "boom");
        assert!(artifact
            .write_to(Path::new("/nonexistent/artifact/dir"))
            .is_err());
    }
}
