//! Persistence of completed analyses
//!
//! Only completed runs are ever saved. Two backends: an in-memory map for
//! tests and embedding, and a directory of pretty-printed JSON files.

use crate::models::AnalysisResult;
use dashmap::DashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Analysis '{0}' not found")]
    NotFound(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to (de)serialize analysis: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage for analysis results
pub trait ResultStore: Send + Sync {
    /// Persist a result, returning its id
    fn save(&self, result: &AnalysisResult) -> Result<String, StoreError>;

    fn get(&self, id: &str) -> Result<AnalysisResult, StoreError>;

    /// Newest first. `owner` filters on the owner segment of `repo_name`.
    fn list(
        &self,
        owner: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AnalysisResult>, StoreError>;

    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

fn page(
    mut results: Vec<AnalysisResult>,
    owner: Option<&str>,
    limit: usize,
    offset: usize,
) -> Vec<AnalysisResult> {
    if let Some(owner) = owner {
        results.retain(|r| r.owner() == owner);
    }
    results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    results.into_iter().skip(offset).take(limit).collect()
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    results: DashMap<String, AnalysisResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl ResultStore for MemoryStore {
    fn save(&self, result: &AnalysisResult) -> Result<String, StoreError> {
        self.results.insert(result.id.clone(), result.clone());
        Ok(result.id.clone())
    }

    fn get(&self, id: &str) -> Result<AnalysisResult, StoreError> {
        self.results
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(
        &self,
        owner: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AnalysisResult>, StoreError> {
        let all = self.results.iter().map(|r| r.value().clone()).collect();
        Ok(page(all, owner, limit, offset))
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.results
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// One `<id>.json` file per result under a data directory
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids are uuids; anything with path syntax is rejected
    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl ResultStore for JsonDirStore {
    fn save(&self, result: &AnalysisResult) -> Result<String, StoreError> {
        let path = self.path_for(&result.id)?;
        let json = serde_json::to_string_pretty(result)?;
        // write-then-rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved analysis {} to {}", result.id, path.display());
        Ok(result.id.clone())
    }

    fn get(&self, id: &str) -> Result<AnalysisResult, StoreError> {
        let path = self.path_for(id)?;
        let json = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    fn list(
        &self,
        owner: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AnalysisResult>, StoreError> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|s| serde_json::from_str::<AnalysisResult>(&s).map_err(StoreError::from));
            match parsed {
                Ok(result) => all.push(result),
                Err(e) => warn!("Skipping unreadable result {}: {}", path.display(), e),
            }
        }
        Ok(page(all, owner, limit, offset))
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisMetrics;
    use crate::scoring::ScoreSet;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn result(id: &str, repo: &str, age_minutes: i64) -> AnalysisResult {
        AnalysisResult {
            id: id.to_string(),
            repo_name: repo.to_string(),
            repo_url: format!("https://github.com/{}", repo),
            branch: "main".into(),
            metrics: AnalysisMetrics::default(),
            scores: ScoreSet::neutral(),
            llm_explanation: "ok".into(),
            files_analyzed: 0,
            total_lines: 0,
            analysis_duration_seconds: 0.1,
            warnings: Vec::new(),
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn exercise(store: &dyn ResultStore) {
        store.save(&result("a1", "acme/one", 30)).unwrap();
        store.save(&result("a2", "acme/two", 10)).unwrap();
        store.save(&result("b1", "other/three", 20)).unwrap();

        let all = store.list(None, 10, 0).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "b1", "a1"]);

        let acme = store.list(Some("acme"), 10, 0).unwrap();
        assert_eq!(acme.len(), 2);
        let paged = store.list(Some("acme"), 1, 1).unwrap();
        assert_eq!(paged[0].id, "a1");

        assert_eq!(store.get("b1").unwrap().repo_name, "other/three");
        store.delete("b1").unwrap();
        assert!(matches!(store.get("b1"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("b1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_json_dir_store() {
        let dir = tempdir().unwrap();
        let store = JsonDirStore::open(dir.path().join("results")).unwrap();
        exercise(&store);
        // survives reopening
        let reopened = JsonDirStore::open(dir.path().join("results")).unwrap();
        assert_eq!(reopened.list(None, 10, 0).unwrap().len(), 2);
    }

    #[test]
    fn test_json_dir_rejects_path_ids() {
        let dir = tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        assert!(matches!(store.get("../etc/passwd"), Err(StoreError::NotFound(_))));
    }
}
