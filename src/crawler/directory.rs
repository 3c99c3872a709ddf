use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::crawler::ArtifactSource;
use crate::errors::{CrawlError, Result};
use crate::types::{ArtifactSummary, TriggerArtifact};

/// Artifact source backed by a directory of `.trigger` files.
///
/// Stands in for the platform API: every file is treated as an active,
/// unmanaged artifact, the file stem is the fully qualified name, and the
/// identifier is derived from the relative path so re-crawls address the
/// same graph nodes.
///
/// The directory is walked once per source instance; every list and fetch
/// works against that snapshot, so one crawl sees a consistent set of files.
pub struct DirectoryArtifactSource {
    root: PathBuf,
    organization_id: String,
    index: Mutex<Option<Vec<(PathBuf, ArtifactSummary)>>>,
}

impl DirectoryArtifactSource {
    pub fn new(root: &Path, organization_id: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            organization_id: organization_id.to_string(),
            index: Mutex::new(None),
        }
    }

    /// Generates a deterministic artifact ID from the relative file path.
    fn artifact_id(relative_path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(relative_path.as_bytes());
        let hash = hasher.finalize();
        format!("trig:{}", &hex::encode(hash)[..24])
    }

    /// Scans the root for trigger files, returning (relative path, summary)
    /// pairs sorted by name.
    fn scan(&self) -> Result<Vec<(PathBuf, ArtifactSummary)>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("trigger") {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| rel_str.clone());
            entries.push((
                relative.to_path_buf(),
                ArtifactSummary {
                    id: Self::artifact_id(&rel_str),
                    name,
                },
            ));
        }

        entries.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        Ok(entries)
    }

    /// Runs `f` over the cached scan, walking the directory on first use.
    fn with_index<T>(&self, f: impl FnOnce(&[(PathBuf, ArtifactSummary)]) -> T) -> Result<T> {
        let mut cached = self.index.lock().map_err(|_| CrawlError::Source {
            message: "scan cache mutex poisoned".to_string(),
            operation: "scan".to_string(),
        })?;
        if cached.is_none() {
            *cached = Some(self.scan()?);
        }
        Ok(f(cached.as_deref().unwrap_or(&[])))
    }
}

#[async_trait]
impl ArtifactSource for DirectoryArtifactSource {
    fn organization_id(&self) -> &str {
        &self.organization_id
    }

    async fn list_artifacts(
        &self,
        _kind: &str,
        _order_by: &str,
        _filter: &str,
    ) -> Result<Vec<ArtifactSummary>> {
        // Files on disk carry no manageable state; everything is eligible.
        self.with_index(|entries| entries.iter().map(|(_, s)| s.clone()).collect())
    }

    async fn fetch_artifact(&self, kind: &str, id: &str) -> Result<TriggerArtifact> {
        let (relative, summary) = self
            .with_index(|entries| {
                entries
                    .iter()
                    .find(|(_, s)| s.id == id)
                    .map(|(path, s)| (path.clone(), s.clone()))
            })?
            .ok_or_else(|| CrawlError::Source {
                message: format!("no {kind} artifact with id '{id}'"),
                operation: "fetch_artifact".to_string(),
            })?;

        let body = std::fs::read_to_string(self.root.join(&relative))?;

        let mut extra = Map::new();
        extra.insert(
            "SourceFile".to_string(),
            Value::String(relative.to_string_lossy().to_string()),
        );

        Ok(TriggerArtifact {
            id: summary.id,
            full_name: summary.name,
            body,
            extra,
        })
    }
}
