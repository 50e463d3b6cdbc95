//! CDR writer implementations.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::types::{Cdr, CdrAction};

/// CDR writer errors.
#[derive(Debug, Error)]
pub enum CdrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// CDR output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdrFormat {
    /// `timestamp, imsi, action` lines
    #[default]
    Csv,
    /// JSON lines (one JSON object per line)
    Json,
}

/// CDR writer trait.
#[async_trait]
pub trait CdrWriter: Send + Sync + std::fmt::Debug {
    /// Write a CDR record.
    async fn write(&self, cdr: &Cdr) -> Result<(), CdrError>;

    /// Flush pending writes.
    async fn flush(&self) -> Result<(), CdrError>;

    /// Writer name for logging.
    fn name(&self) -> &str;
}

// A panic while holding a writer lock leaves only a partially written line
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only file CDR writer.
#[derive(Debug)]
pub struct FileCdrWriter {
    name: String,
    path: PathBuf,
    format: CdrFormat,
    file: Mutex<OpenFile>,
}

#[derive(Debug)]
struct OpenFile {
    writer: BufWriter<File>,
    records: u64,
}

impl FileCdrWriter {
    /// Open (creating if needed) `path` for appending.
    pub fn open(name: &str, path: impl AsRef<Path>, format: CdrFormat) -> Result<Self, CdrError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(
            writer = %name,
            path = %path.display(),
            format = ?format,
            "CDR writer started"
        );

        Ok(Self {
            name: name.to_string(),
            path,
            format,
            file: Mutex::new(OpenFile {
                writer: BufWriter::new(file),
                records: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written since open.
    pub fn records(&self) -> u64 {
        lock(&self.file).records
    }

    fn format_cdr(&self, cdr: &Cdr) -> Result<String, CdrError> {
        match self.format {
            CdrFormat::Csv => Ok(cdr.to_csv_line()),
            CdrFormat::Json => {
                serde_json::to_string(cdr).map_err(|e| CdrError::Serialization(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl CdrWriter for FileCdrWriter {
    async fn write(&self, cdr: &Cdr) -> Result<(), CdrError> {
        let line = self.format_cdr(cdr)?;

        let mut file = lock(&self.file);
        writeln!(file.writer, "{}", line)?;
        // Each record must survive a crash right after it is acknowledged
        file.writer.flush()?;
        file.records += 1;

        debug!(
            writer = %self.name,
            imsi = %cdr.imsi,
            action = %cdr.action,
            "wrote CDR"
        );

        Ok(())
    }

    async fn flush(&self) -> Result<(), CdrError> {
        lock(&self.file).writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory CDR writer (for testing/debugging).
#[derive(Debug)]
pub struct MemoryCdrWriter {
    name: String,
    records: Mutex<VecDeque<Cdr>>,
    max_records: usize,
}

impl MemoryCdrWriter {
    pub fn new(name: &str, max_records: usize) -> Self {
        Self {
            name: name.to_string(),
            records: Mutex::new(VecDeque::with_capacity(max_records.min(1024))),
            max_records,
        }
    }

    /// All retained records, oldest first.
    pub fn all(&self) -> Vec<Cdr> {
        lock(&self.records).iter().cloned().collect()
    }

    /// Records for one IMSI, oldest first.
    pub fn by_imsi(&self, imsi: &str) -> Vec<Cdr> {
        lock(&self.records)
            .iter()
            .filter(|c| c.imsi == imsi)
            .cloned()
            .collect()
    }

    /// Number of retained records with `action`.
    pub fn count_action(&self, action: &CdrAction) -> usize {
        lock(&self.records)
            .iter()
            .filter(|c| &c.action == action)
            .count()
    }

    pub fn count(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn clear(&self) {
        lock(&self.records).clear();
    }
}

#[async_trait]
impl CdrWriter for MemoryCdrWriter {
    async fn write(&self, cdr: &Cdr) -> Result<(), CdrError> {
        let mut records = lock(&self.records);

        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(cdr.clone());

        Ok(())
    }

    async fn flush(&self) -> Result<(), CdrError> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_writer_csv_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdr.log");

        let writer = FileCdrWriter::open("file", &path, CdrFormat::Csv).unwrap();
        writer.write(&Cdr::created("250990000000003")).await.unwrap();
        writer.flush().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().unwrap();
        assert!(line.contains("250990000000003"));
        assert!(line.ends_with(", created"));
        assert_eq!(writer.records(), 1);
    }

    #[tokio::test]
    async fn test_file_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cdr.log");

        {
            let writer = FileCdrWriter::open("file", &path, CdrFormat::Csv).unwrap();
            writer.write(&Cdr::created("250990000000003")).await.unwrap();
        }
        {
            let writer = FileCdrWriter::open("file", &path, CdrFormat::Csv).unwrap();
            writer.write(&Cdr::timeout("250990000000003")).await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_file_writer_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdr.jsonl");

        let writer = FileCdrWriter::open("file", &path, CdrFormat::Json).unwrap();
        writer.write(&Cdr::removed("250990000000003", "manual")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let cdr: Cdr = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(cdr.action, CdrAction::Removed("manual".into()));
    }

    #[tokio::test]
    async fn test_memory_writer_max_records() {
        let writer = MemoryCdrWriter::new("test", 2);

        writer.write(&Cdr::created("250990000000001")).await.unwrap();
        writer.write(&Cdr::created("250990000000002")).await.unwrap();
        writer.write(&Cdr::created("250990000000003")).await.unwrap();

        assert_eq!(writer.count(), 2);
        let all = writer.all();
        assert_eq!(all[0].imsi, "250990000000002");
        assert_eq!(all[1].imsi, "250990000000003");
    }

    #[tokio::test]
    async fn test_memory_writer_queries() {
        let writer = MemoryCdrWriter::new("test", 100);

        writer.write(&Cdr::created("250990000000001")).await.unwrap();
        writer.write(&Cdr::timeout("250990000000001")).await.unwrap();
        writer.write(&Cdr::created("250990000000002")).await.unwrap();

        assert_eq!(writer.by_imsi("250990000000001").len(), 2);
        assert_eq!(writer.count_action(&CdrAction::Created), 2);

        writer.clear();
        assert_eq!(writer.count(), 0);
    }
}
