//! Video catalog: logical clip ids mapped to media files on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("Idle video not found: {0}")]
  IdleMissing(PathBuf),
}

/// Immutable mapping from small integer ids to resolved media file paths,
/// plus the distinguished idle entry. Built once at startup.
#[derive(Debug, Clone)]
pub struct VideoCatalog {
  idle: PathBuf,
  actions: BTreeMap<u32, PathBuf>,
}

impl VideoCatalog {
  /// Build the catalog, validating every entry against the filesystem.
  ///
  /// The idle clip must exist. Action entries pointing at missing files
  /// are dropped with a warning so requests for them become no-ops.
  pub fn new(idle: PathBuf, actions: BTreeMap<u32, PathBuf>) -> Result<Self, CatalogError> {
    if !idle.is_file() {
      return Err(CatalogError::IdleMissing(idle));
    }

    let mut resolved = BTreeMap::new();
    for (id, path) in actions {
      if path.is_file() {
        resolved.insert(id, path);
      } else {
        log::warn!("Dropping video {}: file not found at {}", id, path.display());
      }
    }

    if resolved.is_empty() {
      log::warn!("Video catalog has no action entries; only /close and /pause will do anything");
    }

    Ok(Self {
      idle,
      actions: resolved,
    })
  }

  /// The idle clip path.
  pub fn idle(&self) -> &Path {
    &self.idle
  }

  /// Resolve an action id to its clip path, `None` for unknown ids.
  pub fn resolve(&self, id: u32) -> Option<&Path> {
    self.actions.get(&id).map(PathBuf::as_path)
  }

  /// Number of usable action entries.
  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs::File;
  use tempfile::TempDir;

  fn touch(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    File::create(&path).unwrap();
    path
  }

  #[test]
  fn test_missing_idle_is_fatal() {
    let dir = TempDir::new().unwrap();
    let result = VideoCatalog::new(dir.path().join("nope.mp4"), BTreeMap::new());
    assert!(matches!(result, Err(CatalogError::IdleMissing(_))));
  }

  #[test]
  fn test_missing_action_entries_are_dropped() {
    let dir = TempDir::new().unwrap();
    let idle = touch(&dir, "idle.mp4");
    let one = touch(&dir, "one.mp4");

    let mut actions = BTreeMap::new();
    actions.insert(1, one.clone());
    actions.insert(2, dir.path().join("missing.mp4"));

    let catalog = VideoCatalog::new(idle, actions).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.resolve(1), Some(one.as_path()));
    assert_eq!(catalog.resolve(2), None);
  }

  #[test]
  fn test_unknown_id_resolves_to_none() {
    let dir = TempDir::new().unwrap();
    let idle = touch(&dir, "idle.mp4");
    let catalog = VideoCatalog::new(idle, BTreeMap::new()).unwrap();
    assert_eq!(catalog.resolve(99), None);
    assert!(catalog.is_empty());
  }
}
