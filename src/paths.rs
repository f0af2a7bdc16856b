//! Centralized path definitions for all data files and directories.
//!
//! This module is the single source of truth for leaf filenames and directory
//! names. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "intent-relay";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const CREDENTIALS_FILE: &str = ".credentials";
pub const PACKAGE_MANIFEST_FILE: &str = "manifest.json";

// ── Directory names ──────────────────────────────────────────────

pub const PROJECTS_DIR: &str = "projects";
pub const TRANSLATION_LOGS_DIR: &str = "translation-logs";
pub const PACKAGES_DIR: &str = "Packages";

// ── Config-dir functions (take config_dir) ───────────────────────

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

pub fn credentials_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CREDENTIALS_FILE)
}

pub fn projects_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(PROJECTS_DIR)
}

pub fn project_file(config_dir: &Path, slug: &str) -> PathBuf {
    projects_dir(config_dir).join(format!("{slug}.json"))
}

pub fn translation_logs_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(TRANSLATION_LOGS_DIR)
}

pub fn translation_log_file(config_dir: &Path, date: &str) -> PathBuf {
    translation_logs_dir(config_dir).join(format!("translation_log_{date}.jsonl"))
}

// ── Editor project functions (take the project root) ─────────────

pub fn package_manifest_path(project_root: &Path) -> PathBuf {
    project_root.join(PACKAGES_DIR).join(PACKAGE_MANIFEST_FILE)
}

/// Platform config directory for the app: `$XDG_CONFIG_HOME`, `%APPDATA%`,
/// or `~/Library/Application Support`, with `APP_ID` appended.
pub fn default_config_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join("Library").join("Application Support"))
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    };
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_and_log_files_live_under_config_dir() {
        let root = Path::new("/cfg");
        assert_eq!(
            project_file(root, "shooter"),
            PathBuf::from("/cfg/projects/shooter.json")
        );
        assert_eq!(
            translation_log_file(root, "20260101"),
            PathBuf::from("/cfg/translation-logs/translation_log_20260101.jsonl")
        );
    }

    #[test]
    fn manifest_is_under_packages() {
        assert_eq!(
            package_manifest_path(Path::new("/games/Shooter")),
            PathBuf::from("/games/Shooter/Packages/manifest.json")
        );
    }
}
