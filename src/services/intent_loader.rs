//! Fleet intent files
//!
//! Every `*.yaml` / `*.yml` file in the intent directory holds one
//! [`FleetIntent`], and a fleet may be declared by only one file. Files are
//! re-read on each scan; a file is handed out for a rebuild until the caller
//! marks its current content as applied.

use crate::domain::FleetIntent;
use crate::errors::{Error, Result};
use crate::utils::hashing::sha256_hex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An intent file whose content has not been applied yet
#[derive(Debug, Clone)]
pub struct PendingIntent {
    pub path: PathBuf,
    pub intent: FleetIntent,
    hash: String,
}

#[derive(Debug)]
struct AppliedFile {
    hash: String,
    fleet: String,
}

#[derive(Debug)]
pub struct IntentLoader {
    directory: PathBuf,
    applied: HashMap<PathBuf, AppliedFile>,
}

fn is_intent_file(path: &Path) -> bool {
    path.is_file()
        && matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
}

impl IntentLoader {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into(), applied: HashMap::new() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Intent files in name order
    fn intent_files(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            Error::config(format!("Failed to read intent directory {}: {}", self.directory.display(), e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if is_intent_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Intents whose file content has not been applied yet.
    ///
    /// Files that are already applied keep their fleet. A changed file that
    /// declares a fleet owned by another file is rejected, as are files that
    /// fail to parse; both are logged and retried on the next scan.
    pub fn scan(&mut self) -> Result<Vec<PendingIntent>> {
        let files = self.intent_files()?;
        self.applied.retain(|path, _| files.contains(path));

        let mut owners: HashMap<String, PathBuf> = HashMap::new();
        let mut changed = Vec::new();

        for path in files {
            let document = std::fs::read_to_string(&path)?;
            let hash = sha256_hex(&document);
            match self.applied.get(&path) {
                Some(applied) if applied.hash == hash => {
                    owners.insert(applied.fleet.clone(), path);
                }
                _ => changed.push((path, document, hash)),
            }
        }

        let mut pending = Vec::new();
        for (path, document, hash) in changed {
            let intent = match FleetIntent::from_yaml(&document) {
                Ok(intent) => intent,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unparsable intent file");
                    continue;
                }
            };

            let fleet = intent.fleet.to_string();
            if let Some(owner) = owners.get(&fleet).filter(|owner| **owner != path) {
                let err = Error::structural(format!(
                    "fleet {} is already defined by {}",
                    fleet,
                    owner.display()
                ));
                warn!(path = %path.display(), error = %err, "Skipping intent file");
                continue;
            }

            debug!(path = %path.display(), fleet = %fleet, "Intent file changed");
            owners.insert(fleet, path.clone());
            pending.push(PendingIntent { path, intent, hash });
        }

        Ok(pending)
    }

    /// Remember the pending content as applied so later scans skip it
    pub fn mark_applied(&mut self, pending: &PendingIntent) {
        self.applied.insert(
            pending.path.clone(),
            AppliedFile { hash: pending.hash.clone(), fleet: pending.intent.fleet.to_string() },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DEFAULT_FLEET: &str = "fleet:\n  name: default\n";

    fn fleets(pending: &[PendingIntent]) -> Vec<String> {
        pending.iter().map(|p| p.intent.fleet.to_string()).collect()
    }

    #[test]
    fn applied_content_is_not_handed_out_again() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.yaml"), DEFAULT_FLEET).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut loader = IntentLoader::new(dir.path());
        let first = loader.scan().unwrap();
        assert_eq!(fleets(&first), vec!["default.default"]);
        loader.mark_applied(&first[0]);

        assert!(loader.scan().unwrap().is_empty());

        fs::write(dir.path().join("default.yaml"), "fleet:\n  name: default\n  namespace: edge\n").unwrap();
        assert_eq!(fleets(&loader.scan().unwrap()), vec!["default.edge"]);
    }

    #[test]
    fn unapplied_content_is_retried() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.yaml"), DEFAULT_FLEET).unwrap();

        let mut loader = IntentLoader::new(dir.path());
        assert_eq!(loader.scan().unwrap().len(), 1);
        assert_eq!(loader.scan().unwrap().len(), 1);
    }

    #[test]
    fn invalid_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yml"), "fleet: [").unwrap();
        fs::write(dir.path().join("b.yml"), DEFAULT_FLEET).unwrap();

        let mut loader = IntentLoader::new(dir.path());
        let pending = loader.scan().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].path.ends_with("b.yml"));
    }

    #[test]
    fn second_file_for_a_fleet_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), DEFAULT_FLEET).unwrap();
        fs::write(dir.path().join("b.yaml"), DEFAULT_FLEET).unwrap();

        let mut loader = IntentLoader::new(dir.path());
        let pending = loader.scan().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].path.ends_with("a.yaml"));
    }

    #[test]
    fn applied_owner_keeps_its_fleet() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.yaml"), DEFAULT_FLEET).unwrap();

        let mut loader = IntentLoader::new(dir.path());
        let pending = loader.scan().unwrap();
        loader.mark_applied(&pending[0]);

        fs::write(dir.path().join("a.yaml"), DEFAULT_FLEET).unwrap();
        assert!(loader.scan().unwrap().is_empty());

        fs::remove_file(dir.path().join("b.yaml")).unwrap();
        let pending = loader.scan().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].path.ends_with("a.yaml"));
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let err = IntentLoader::new("/nonexistent/intents").scan().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
