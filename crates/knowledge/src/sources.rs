//! Ingestion bookkeeping in `sources.jsonl`, one record per ingested file.

use crate::config::get_sources_path;
use crate::types::SourceRecord;
use chrono::{DateTime, Utc};
use medrag_core::{AppError, AppResult};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only log of ingested sources for a knowledge base.
pub struct SourceLog {
    path: PathBuf,
}

impl SourceLog {
    pub fn new(workspace: &Path, base_name: &str) -> Self {
        Self {
            path: get_sources_path(workspace, base_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record.
    pub fn record(&self, source: &SourceRecord) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open sources.jsonl: {}", e)))?;

        let json_line = serde_json::to_string(source)?;
        writeln!(file, "{}", json_line).map_err(|e| {
            AppError::Knowledge(format!("Failed to write to sources.jsonl: {}", e))
        })?;

        tracing::debug!("Recorded source: {}", source.path);
        Ok(())
    }

    /// All records, oldest first.
    pub fn list(&self) -> AppResult<Vec<SourceRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open sources.jsonl: {}", e)))?;

        let mut sources = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                AppError::Knowledge(format!("Failed to read line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let source: SourceRecord = serde_json::from_str(&line).map_err(|e| {
                AppError::Knowledge(format!(
                    "Failed to parse line {} in sources.jsonl: {}",
                    line_num + 1,
                    e
                ))
            })?;
            sources.push(source);
        }

        Ok(sources)
    }

    /// Timestamp of the most recent record.
    pub fn last_indexed_at(&self) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.list()?.into_iter().map(|s| s.indexed_at).max())
    }

    /// Delete the log.
    pub fn clear(&self) -> AppResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                AppError::Knowledge(format!("Failed to delete sources.jsonl: {}", e))
            })?;
            tracing::debug!("Cleared sources.jsonl");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn record(id: &str, at: DateTime<Utc>) -> SourceRecord {
        SourceRecord {
            source_id: id.to_string(),
            path: format!("{}.txt", id),
            indexed_at: at,
            chunk_count: 4,
            byte_count: 2048,
        }
    }

    #[test]
    fn test_record_and_list_in_order() {
        let temp = TempDir::new().unwrap();
        let log = SourceLog::new(temp.path(), "who");
        let now = Utc::now();

        log.record(&record("malaria", now)).unwrap();
        log.record(&record("tb", now + Duration::seconds(5))).unwrap();

        let sources = log.list().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].path, "malaria.txt");
        assert_eq!(
            log.last_indexed_at().unwrap(),
            Some(now + Duration::seconds(5))
        );
    }

    #[test]
    fn test_empty_when_no_file() {
        let temp = TempDir::new().unwrap();
        let log = SourceLog::new(temp.path(), "who");
        assert!(log.list().unwrap().is_empty());
        assert_eq!(log.last_indexed_at().unwrap(), None);
    }

    #[test]
    fn test_clear_deletes_file() {
        let temp = TempDir::new().unwrap();
        let log = SourceLog::new(temp.path(), "who");
        log.record(&record("malaria", Utc::now())).unwrap();
        assert!(log.path().exists());

        log.clear().unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let temp = TempDir::new().unwrap();
        let log = SourceLog::new(temp.path(), "who");
        std::fs::create_dir_all(log.path().parent().unwrap()).unwrap();
        std::fs::write(log.path(), "{not json}\n").unwrap();

        let err = log.list().unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
