//! Destination of the usage log.

use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, VarmonError};

/// Append-only line writer shared by whoever needs to emit log lines.
///
/// Every line goes out with a single `write_all` followed by a flush, under
/// the lock, so a concurrent reader never sees a partial line linger.
#[derive(Clone)]
pub struct LogSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    path: Option<PathBuf>,
}

impl LogSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// Create `path` for writing. Refuses to touch a file that already exists.
    pub fn create_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(VarmonError::DestinationExists(path.to_path_buf()));
        }

        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => VarmonError::DestinationExists(path.to_path_buf()),
                _ => VarmonError::config(format!("cannot create {}: {}", path.display(), e)),
            })?;

        log::debug!("Writing usage log to {}", path.display());

        Ok(Self {
            writer: Arc::new(Mutex::new(Box::new(file))),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            path: None,
        }
    }

    /// File backing this sink, `None` for streams
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write one complete line (a trailing newline is added when missing)
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut buffer = String::with_capacity(line.len() + 1);
        buffer.push_str(line);
        if !buffer.ends_with('\n') {
            buffer.push('\n');
        }

        let mut writer = self.writer.lock();
        writer.write_all(buffer.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink").field("path", &self.path).finish()
    }
}

/// In-memory writer handy for inspecting what a sink received
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_line_appends_newline() {
        let buffer = SharedBuffer::new();
        let sink = LogSink::from_writer(buffer.clone());

        sink.write_line("timestamp,max_rss").unwrap();
        sink.write_line("2024-01-01T00:00:00.000000,1.0K\n").unwrap();

        assert_eq!(
            buffer.contents(),
            "timestamp,max_rss\n2024-01-01T00:00:00.000000,1.0K\n"
        );
    }

    #[test]
    fn test_clones_share_writer() {
        let buffer = SharedBuffer::new();
        let sink = LogSink::from_writer(buffer.clone());
        let other = sink.clone();

        sink.write_line("a").unwrap();
        other.write_line("b").unwrap();

        assert_eq!(buffer.contents(), "a\nb\n");
    }

    #[test]
    fn test_create_new_refuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("usage.log");
        std::fs::write(&path, "keep me").unwrap();

        let err = LogSink::create_new(&path).unwrap_err();
        assert!(matches!(err, VarmonError::DestinationExists(_)));
        assert!(err.is_configuration());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_create_new_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("usage.log");

        let sink = LogSink::create_new(&path).unwrap();
        sink.write_line("timestamp,max_rss").unwrap();

        assert_eq!(sink.path(), Some(path.as_path()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "timestamp,max_rss\n");
    }

    #[test]
    fn test_create_new_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("usage.log");

        assert!(LogSink::create_new(&path).unwrap_err().is_configuration());
    }
}
