//! JSONL journal of translated requests.
//!
//! One line per translation in
//! `{config_dir}/translation-logs/translation_log_YYYYMMDD.jsonl` (UTC day).
//! Best-effort: write failures are logged and never reach the caller.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::instruction::{Instruction, InstructionList};
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub timestamp_utc: DateTime<Utc>,
    pub prompt: String,
    pub success: bool,
    pub instruction_list: InstructionList,
}

#[derive(Debug, Clone)]
pub struct Journal {
    config_dir: PathBuf,
}

fn day_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}

impl Journal {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn record(&self, prompt: &str, success: bool, instructions: &[Instruction]) {
        let now = Utc::now();
        let entry = JournalEntry {
            timestamp_utc: now,
            prompt: prompt.to_string(),
            success,
            instruction_list: InstructionList::new(instructions.to_vec()),
        };
        if let Err(e) = self.append(&entry, &day_stamp(now)) {
            tracing::warn!(error = %e, "failed to write translation journal");
        }
    }

    fn append(&self, entry: &JournalEntry, day: &str) -> Result<(), AppError> {
        fs::create_dir_all(paths::translation_logs_dir(&self.config_dir))?;
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(paths::translation_log_file(&self.config_dir, day))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Entries written so far today. Unreadable lines are skipped.
    pub fn read_today(&self) -> Result<Vec<JournalEntry>, AppError> {
        let path = paths::translation_log_file(&self.config_dir, &day_stamp(Utc::now()));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path)?;
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn day_stamp_is_compact() {
        let at = Utc.with_ymd_and_hms(2025, 2, 24, 23, 59, 59).unwrap();
        assert_eq!(day_stamp(at), "20250224");
    }

    #[test]
    fn entries_append_as_camel_case_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().to_path_buf());
        journal.record("connect", true, &[Instruction::local("connect")]);
        journal.record("gibberish", false, &[]);

        let path = paths::translation_log_file(dir.path(), &day_stamp(Utc::now()));
        let text = fs::read_to_string(path).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert!(first["timestampUtc"].is_string());
        assert_eq!(first["instructionList"]["type"], "InstructionList");
        assert_eq!(first["instructionList"]["instructions"][0]["action"], "connect");

        let entries = journal.read_today().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries[1].success);
        assert!(entries[1].instruction_list.instructions.is_empty());
    }

    #[test]
    fn unwritable_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        Journal::new(blocker).record("connect", true, &[]);
    }
}
