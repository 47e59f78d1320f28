//! Append-only run history.
//!
//! Each run is one pretty-printed JSON file under `runs/`, named by its
//! UTC timestamp (`YYYYMMDD-HHMMSS`, `-NN` appended on collision). The
//! directory is capped: after every save the oldest files beyond the cap
//! are deleted. Ids are sanitized before touching the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{HISTORY_DIR, HISTORY_MAX_RUNS};
use crate::models::Results;

/// Minimal metadata projection of one stored run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub when: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub target: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub classification: String,
}

#[derive(Deserialize)]
struct StoredMeta {
    #[serde(default)]
    when: DateTime<Utc>,
    #[serde(default)]
    target_host: String,
    #[serde(default)]
    classification: String,
}

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
    max: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(HISTORY_DIR, HISTORY_MAX_RUNS)
    }
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, max: usize) -> Self {
        let dir: PathBuf = dir.into();
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(HISTORY_DIR)
        } else {
            dir
        };
        let max = if max == 0 { HISTORY_MAX_RUNS } else { max };
        Self { dir, max }
    }

    /// Persist a run and return its id. Ids derive from the run's UTC
    /// timestamp; collisions get a numeric suffix. The cap is enforced
    /// after the write.
    pub fn save(&self, res: &Results) -> Result<String> {
        let mut res = res.clone();
        if res.when == DateTime::<Utc>::default() {
            res.when = Utc::now();
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create history dir {}", self.dir.display()))?;

        let base_id = res.when.format("%Y%m%d-%H%M%S").to_string();
        let mut run_id = base_id.clone();
        let mut suffix = 1u32;
        while self.path_for(&run_id).exists() {
            run_id = format!("{base_id}-{suffix:02}");
            suffix += 1;
        }

        let data = serde_json::to_vec_pretty(&res).context("encode run")?;
        fs::write(self.path_for(&run_id), data)
            .with_context(|| format!("write run {run_id}"))?;
        self.prune()?;
        Ok(run_id)
    }

    /// Overwrite the run stored at `id` verbatim.
    pub fn update(&self, id: &str, res: &Results) -> Result<()> {
        let clean_id = sanitize_id(id)?;
        let mut res = res.clone();
        if res.when == DateTime::<Utc>::default() {
            res.when = Utc::now();
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create history dir {}", self.dir.display()))?;
        let data = serde_json::to_vec_pretty(&res).context("encode run")?;
        fs::write(self.path_for(&clean_id), data)
            .with_context(|| format!("update run {clean_id}"))
    }

    /// Stored runs, newest first, capped at the store limit.
    pub fn list(&self) -> Result<Vec<Entry>> {
        let names = match self.sorted_run_files() {
            Ok(names) => names,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for name in names.into_iter().take(self.max) {
            let id = name.trim_end_matches(".json").to_string();
            match self.read_meta(&id) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::debug!("skipping undecodable run file {name}: {e}");
                }
            }
        }
        Ok(entries)
    }

    /// Load one stored run in full.
    pub fn load(&self, id: &str) -> Result<Results> {
        let clean_id = sanitize_id(id)?;
        let data = fs::read(self.path_for(&clean_id))
            .with_context(|| format!("read run {clean_id}"))?;
        serde_json::from_slice(&data).with_context(|| format!("decode run {clean_id}"))
    }

    /// True when a load failure simply means the run does not exist.
    pub fn is_missing(err: &anyhow::Error) -> bool {
        err.downcast_ref::<std::io::Error>()
            .map(|io| io.kind() == std::io::ErrorKind::NotFound)
            .unwrap_or(false)
            || err.is::<InvalidId>()
    }

    fn prune(&self) -> Result<()> {
        let names = match self.sorted_run_files() {
            Ok(names) => names,
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e),
        };
        for name in names.iter().skip(self.max) {
            let _ = fs::remove_file(self.dir.join(name));
        }
        Ok(())
    }

    /// `.json` filenames in the store, sorted descending so the newest
    /// timestamp id comes first.
    fn sorted_run_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .with_context(|| format!("read history dir {}", self.dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".json"))
            .collect();
        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    fn read_meta(&self, id: &str) -> Result<Entry> {
        let clean_id = sanitize_id(id)?;
        let data = fs::read(self.path_for(&clean_id))
            .with_context(|| format!("read run {clean_id}"))?;
        let meta: StoredMeta =
            serde_json::from_slice(&data).with_context(|| format!("decode run {clean_id}"))?;
        Ok(Entry {
            id: clean_id,
            when: meta.when,
            target: meta.target_host.trim().to_string(),
            classification: meta.classification.trim().to_string(),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Directory the store writes to; used by callers that surface paths.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[derive(Debug)]
pub struct InvalidId;

impl std::fmt::Display for InvalidId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid run id")
    }
}

impl std::error::Error for InvalidId {}

/// Reject ids that could escape the store directory.
fn sanitize_id(id: &str) -> Result<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed.contains("..") || trimmed.contains(['/', '\\']) {
        bail!(InvalidId);
    }
    Ok(trimmed.to_string())
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_with_path_separators_are_rejected() {
        assert!(sanitize_id("20240101-000000").is_ok());
        assert!(sanitize_id("../escape").is_err());
        assert!(sanitize_id("a/b").is_err());
        assert!(sanitize_id("a\\b").is_err());
        assert!(sanitize_id("  ").is_err());
    }
}
