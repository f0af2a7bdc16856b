use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::paths;

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Convert a name to a safe filename slug.
pub(crate) fn slugify(name: &str) -> String {
    let mut result = String::new();
    let mut last_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            result.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash && !result.is_empty() {
            result.push('-');
            last_dash = true;
        }
    }
    while result.ends_with('-') {
        result.pop();
    }
    if result.is_empty() {
        "untitled".to_string()
    } else {
        result
    }
}

/// Per-file mutex map to serialize concurrent writes to the same path.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Atomically write bytes to a file using write-to-temp-then-rename.
///
/// Writes go to a `.tmp` sibling which is fsynced, the previous file is kept
/// as `.bak` (best-effort), then the temp file is renamed over the target.
/// Writers to the same path are serialized by a per-file lock.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let lock = FILE_LOCKS
        .lock()
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path.file_name().unwrap_or_default();

    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut bak_name = OsString::from(file_name);
    bak_name.push(".bak");
    let bak_path = path.with_file_name(&bak_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if path.exists() {
        let _ = fs::rename(path, &bak_path);
    }

    fs::rename(&tmp_path, path)?;

    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

// ── Project book ────────────────────────────────────────────────────

/// An editor project the assistant has created or opened before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub project_name: String,
    pub project_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl ProjectRecord {
    pub fn new(project_name: impl Into<String>, project_path: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            project_path: project_path.into(),
            genre: None,
            engine: None,
        }
    }

    /// Full path of the project root (`<path>/<name>`).
    pub fn root(&self) -> PathBuf {
        Path::new(&self.project_path).join(&self.project_name)
    }
}

/// Remembered projects, one JSON file per project under `<config>/projects/`.
#[derive(Debug, Clone)]
pub struct ProjectBook {
    config_dir: PathBuf,
}

impl ProjectBook {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn remember(&self, record: &ProjectRecord) -> Result<(), StoreError> {
        let path = paths::project_file(&self.config_dir, &slugify(&record.project_name));
        write_json(&path, record)
    }

    /// Look a project up by name (case-insensitive).
    pub fn find(&self, name: &str) -> Option<ProjectRecord> {
        let path = paths::project_file(&self.config_dir, &slugify(name));
        read_json::<ProjectRecord>(&path)
            .ok()
            .filter(|record| record.project_name.eq_ignore_ascii_case(name))
    }

    /// All remembered projects, sorted by name. Unreadable files are skipped.
    pub fn list(&self) -> Vec<ProjectRecord> {
        let Ok(entries) = fs::read_dir(paths::projects_dir(&self.config_dir)) else {
            return Vec::new();
        };
        let mut records: Vec<ProjectRecord> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| read_json(&path).ok())
            .collect();
        records.sort_by(|a, b| a.project_name.cmp(&b.project_name));
        records
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("My  Shooter!"), "my-shooter");
        assert_eq!(slugify("--"), "untitled");
        assert_eq!(slugify("space_game 2"), "space_game-2");
    }

    #[test]
    fn atomic_write_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert_eq!(
            fs::read_to_string(dir.path().join("nested").join("data.json.bak")).unwrap(),
            "one"
        );
    }

    #[test]
    fn book_remembers_and_finds_projects() {
        let dir = tempfile::tempdir().unwrap();
        let book = ProjectBook::new(dir.path());
        assert!(book.find("Shooter").is_none());

        book.remember(&ProjectRecord::new("Shooter", "C:\\Games"))
            .unwrap();
        book.remember(&ProjectRecord::new("Arena", "/srv/games"))
            .unwrap();

        let found = book.find("shooter").unwrap();
        assert_eq!(found.project_path, "C:\\Games");
        let names: Vec<_> = book.list().into_iter().map(|r| r.project_name).collect();
        assert_eq!(names, vec!["Arena", "Shooter"]);
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(ProjectRecord::new("A", "/p")).unwrap();
        assert_eq!(json["projectName"], "A");
        assert!(json.get("genre").is_none());
    }
}
