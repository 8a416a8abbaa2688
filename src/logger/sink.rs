//! Log destinations.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{LogLevel, LogRecord};

/// A destination for log records.
///
/// Each sink filters by its own threshold, so one logger can feed a quiet
/// console and a verbose file at the same time.
pub trait LogSink: Send {
    /// Whether a record at `level` should be written to this sink.
    fn accepts(&self, level: LogLevel) -> bool;

    fn write_record(&mut self, record: &LogRecord) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes formatted records to stdout.
#[derive(Debug)]
pub struct ConsoleSink {
    threshold: LogLevel,
}

impl ConsoleSink {
    pub fn new(threshold: LogLevel) -> Self {
        Self { threshold }
    }
}

impl LogSink for ConsoleSink {
    fn accepts(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }

    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", record.format())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Writes formatted records to a file, one line per record.
#[derive(Debug)]
pub struct FileSink {
    threshold: LogLevel,
    path: PathBuf,
    writer: LineWriter<File>,
}

impl FileSink {
    /// Open `path`, truncating it unless `append` is set.
    pub fn open(path: &Path, threshold: LogLevel, append: bool) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(path)?;
        Ok(Self {
            threshold,
            path: path.to_path_buf(),
            writer: LineWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn accepts(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }

    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        writeln!(self.writer, "{}", record.format())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Keeps records in memory for later inspection.
#[derive(Debug, Clone)]
pub struct MemorySink {
    threshold: LogLevel,
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new(threshold: LogLevel) -> Self {
        Self {
            threshold,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Messages written at exactly `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .map(|r| r.message)
            .collect()
    }

    /// Whether any record's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records().iter().any(|r| r.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn accepts(&self, level: LogLevel) -> bool {
        level >= self.threshold
    }

    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_truncates_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.log");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = FileSink::open(&path, LogLevel::Info, false).unwrap();
        sink.write_record(&LogRecord::new(LogLevel::Info, "fresh")).unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale"));
        assert!(contents.contains("fresh"));
    }

    #[test]
    fn test_file_sink_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let mut sink = FileSink::open(&path, LogLevel::Info, true).unwrap();
        sink.write_record(&LogRecord::new(LogLevel::Info, "later run")).unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier run\n"));
        assert!(contents.contains("later run"));
    }

    #[test]
    fn test_memory_sink_threshold() {
        let sink = MemorySink::new(LogLevel::Warning);
        assert!(!sink.accepts(LogLevel::Info));
        assert!(sink.accepts(LogLevel::Warning));
        assert!(sink.accepts(LogLevel::Fatal));
    }
}
