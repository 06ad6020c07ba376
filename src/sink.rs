use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

pub(crate) const SOURCE_FILE: &str = file!();

/// Console sink. One exclusive lock per line; whoever writes (the queue
/// consumer, or the calling thread in direct mode) holds it for exactly
/// one record.
pub struct ConsoleSink {
    out: Mutex<io::Stdout>,
}

impl ConsoleSink {
    pub fn new() -> ConsoleSink {
        ConsoleSink {
            out: Mutex::new(io::stdout()),
        }
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(out, "{line}")?;
        out.flush()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        ConsoleSink::new()
    }
}

struct FileInner {
    writer: BufWriter<File>,
    pending: usize,
}

/// Append-only sink for the session's log file. The file handle lives
/// behind one exclusive lock; lines are buffered and flushed every
/// `flush_every` records (callers flush on idle and at shutdown).
pub struct FileSink {
    path: PathBuf,
    flush_every: usize,
    inner: Mutex<FileInner>,
}

impl FileSink {
    pub fn new(path: &Path, flush_every: usize) -> io::Result<FileSink> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileSink {
            path: path.to_path_buf(),
            flush_every: flush_every.max(1),
            inner: Mutex::new(FileInner {
                writer: BufWriter::new(file),
                pending: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut inner = self.inner.lock();
        writeln!(inner.writer, "{line}")?;
        inner.pending += 1;
        if inner.pending >= self.flush_every {
            inner.writer.flush()?;
            inner.pending = 0;
        }
        Ok(())
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.pending = 0;
        inner.writer.flush()
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.inner.lock().writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let sink = FileSink::new(&path, 100).unwrap();
        sink.write_line("first").unwrap();
        sink.write_line("second").unwrap();
        sink.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_flush_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let sink = FileSink::new(&path, 2).unwrap();
        sink.write_line("one").unwrap();
        // Below the cadence: nothing promised on disk yet. Second write
        // crosses it.
        sink.write_line("two").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "one\ntwo\n");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions/2024/run.log");
        let sink = FileSink::new(&path, 1).unwrap();
        sink.write_line("hello").unwrap();
        sink.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_append_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        {
            let sink = FileSink::new(&path, 1).unwrap();
            sink.write_line("from first open").unwrap();
        }
        {
            let sink = FileSink::new(&path, 1).unwrap();
            sink.write_line("from second open").unwrap();
        }
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "from first open\nfrom second open\n");
    }
}
