// relaycore-server/src/artifact_store.rs
// ============================================================================
// Module: File Artifact Store
// Description: Filesystem-backed artifact sink/reader for run bundles.
// Purpose: Back the Submission API's "fetch artifact" endpoint with a
// durable, path-validated store of per-run artifact bytes.
// Dependencies: relaycore-core
// ============================================================================

//! ## Overview
//! Each run gets its own directory under the store root; artifact paths are
//! relative to that directory and are never allowed to escape it. Sealing a
//! run writes a marker file so seal state survives a restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use relaycore_core::ArtifactError;
use relaycore_core::ArtifactReader;
use relaycore_core::ArtifactSink;
use relaycore_core::RunId;

// ============================================================================
// SECTION: Constants
// ============================================================================

const MAX_PATH_COMPONENT_LENGTH: usize = 255;
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
const SEALED_MARKER_NAME: &str = ".sealed";

// ============================================================================
// SECTION: File Artifact Store
// ============================================================================

/// File-backed [`ArtifactSink`]/[`ArtifactReader`] rooted at one directory.
///
/// # Invariants
/// - Writes after a run is sealed fail with [`ArtifactError::Sealed`].
pub struct FileArtifactStore {
    root: PathBuf,
    sealed: Mutex<BTreeSet<RunId>>,
}

impl FileArtifactStore {
    /// Creates a store rooted at `root`, creating the directory if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] when the root cannot be created or
    /// validated.
    pub fn new(root: PathBuf) -> Result<Self, ArtifactError> {
        validate_path(&root)?;
        fs::create_dir_all(&root).map_err(|err| ArtifactError::Io(err.to_string()))?;
        Ok(Self { root, sealed: Mutex::new(BTreeSet::new()) })
    }

    fn run_dir(&self, run_id: &RunId) -> Result<PathBuf, ArtifactError> {
        let candidate = PathBuf::from(run_id.as_str());
        ensure_relative_path(&candidate)?;
        Ok(self.root.join(candidate))
    }

    fn is_sealed(&self, run_id: &RunId) -> Result<bool, ArtifactError> {
        if self.sealed.lock().unwrap_or_else(std::sync::PoisonError::into_inner).contains(run_id) {
            return Ok(true);
        }
        let marker = self.run_dir(run_id)?.join(SEALED_MARKER_NAME);
        Ok(marker.exists())
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactStore {
    async fn write(&self, run_id: &RunId, path: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        if self.is_sealed(run_id)? {
            return Err(ArtifactError::Sealed(run_id.clone()));
        }
        let resolved = resolve_path(&self.run_dir(run_id)?, path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|err| ArtifactError::Io(err.to_string()))?;
        }
        fs::write(&resolved, bytes).map_err(|err| ArtifactError::Io(err.to_string()))
    }

    async fn seal(&self, run_id: &RunId) -> Result<(), ArtifactError> {
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&dir).map_err(|err| ArtifactError::Io(err.to_string()))?;
        fs::write(dir.join(SEALED_MARKER_NAME), b"")
            .map_err(|err| ArtifactError::Io(err.to_string()))?;
        self.sealed.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(run_id.clone());
        Ok(())
    }
}

#[async_trait]
impl ArtifactReader for FileArtifactStore {
    async fn read(&self, run_id: &RunId, path: &str) -> Result<Vec<u8>, ArtifactError> {
        let resolved = resolve_path(&self.run_dir(run_id)?, path)?;
        fs::read(&resolved).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(path.to_string())
            } else {
                ArtifactError::Io(err.to_string())
            }
        })
    }

    async fn list(&self, run_id: &RunId) -> Result<Vec<String>, ArtifactError> {
        let dir = self.run_dir(run_id)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        collect_paths(&dir, &dir, &mut paths).map_err(|err| ArtifactError::Io(err.to_string()))?;
        paths.retain(|path| path != SEALED_MARKER_NAME);
        paths.sort();
        Ok(paths)
    }
}

fn collect_paths(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_paths(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

fn resolve_path(run_dir: &Path, relative: &str) -> Result<PathBuf, ArtifactError> {
    let candidate = PathBuf::from(relative);
    ensure_relative_path(&candidate)?;
    Ok(run_dir.join(candidate))
}

fn validate_path(path: &Path) -> Result<(), ArtifactError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ArtifactError::Io("artifact root path exceeds limit".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ArtifactError::Io("artifact root path component too long".to_string()));
        }
    }
    Ok(())
}

fn ensure_relative_path(candidate: &Path) -> Result<(), ArtifactError> {
    if candidate.is_absolute() {
        return Err(ArtifactError::Io("absolute artifact path not allowed".to_string()));
    }
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                return Err(ArtifactError::Io("artifact path escapes its root".to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(ArtifactError::Io("absolute artifact path not allowed".to_string()));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
