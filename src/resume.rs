use crate::error::ResumeError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct ResumeLedger {
    done: HashSet<String>,
    sources: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct LedgerLine {
    edit_path: String,
}

impl ResumeLedger {
    /// Reads every existing log in `paths`. Missing files are skipped; any
    /// unreadable file or malformed line fails the whole ledger.
    pub fn load(paths: &[PathBuf]) -> Result<Self, ResumeError> {
        let mut ledger = Self::default();
        for path in paths {
            if !path.exists() {
                continue;
            }
            ledger.read_log(path)?;
            ledger.sources.push(path.clone());
        }
        Ok(ledger)
    }

    fn read_log(&mut self, path: &Path) -> Result<(), ResumeError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ResumeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        for (i, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: LedgerLine =
                serde_json::from_str(line).map_err(|e| ResumeError::Parse {
                    path: path.to_path_buf(),
                    line: i + 1,
                    reason: e.to_string(),
                })?;
            self.done.insert(row.edit_path);
        }
        Ok(())
    }

    pub fn contains(&self, edit_path: &str) -> bool {
        self.done.contains(edit_path)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}
