use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::info;

/// Size and identity of an append-only log at one moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSnapshot {
    /// Changes when the log is replaced by a new file (inode on unix)
    pub identity: Option<u64>,
    pub len: u64,
}

/// Anything that can be tailed by byte offset.
pub trait AppendOnlyLog: Send {
    /// Current size and identity, or `None` while the log does not exist
    fn snapshot(&mut self) -> io::Result<Option<LogSnapshot>>;

    /// Bytes in `[offset, end)`
    fn read_range(&mut self, offset: u64, end: u64) -> io::Result<Vec<u8>>;
}

/// Scan log on disk. Reopened on every read so a replaced file is picked up.
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn file_identity(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn file_identity(_metadata: &Metadata) -> Option<u64> {
    None
}

impl AppendOnlyLog for FileLog {
    fn snapshot(&mut self) -> io::Result<Option<LogSnapshot>> {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => Ok(Some(LogSnapshot {
                identity: file_identity(&metadata),
                len: metadata.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_range(&mut self, offset: u64, end: u64) -> io::Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(end.saturating_sub(offset) as usize);
        file.take(end.saturating_sub(offset)).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Offset-tracked reader over an append-only log.
///
/// The offset only ever moves past complete, newline-terminated lines; an
/// unterminated tail stays in the log and is read again on the next poll.
#[derive(Debug, Clone, Default)]
pub struct LogCursor {
    offset: u64,
    identity: Option<u64>,
}

impl LogCursor {
    /// Cursor at the start of the log
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor positioned at the current end of `log`, skipping what is already there
    pub fn at_end<L: AppendOnlyLog + ?Sized>(log: &mut L) -> io::Result<Self> {
        Ok(match log.snapshot()? {
            Some(snapshot) => Self {
                offset: snapshot.len,
                identity: snapshot.identity,
            },
            None => Self::new(),
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read every complete line appended since the last poll.
    pub fn poll<L: AppendOnlyLog + ?Sized>(&mut self, log: &mut L) -> io::Result<Vec<String>> {
        let Some(snapshot) = log.snapshot()? else {
            return Ok(Vec::new());
        };

        let replaced = self.identity.is_some() && snapshot.identity != self.identity;
        if replaced || snapshot.len < self.offset {
            info!(
                previous_offset = self.offset,
                len = snapshot.len,
                replaced,
                "scan log replaced or truncated, reading from the start"
            );
            self.offset = 0;
        }
        self.identity = snapshot.identity;

        if snapshot.len == self.offset {
            return Ok(Vec::new());
        }

        let bytes = log.read_range(self.offset, snapshot.len)?;
        Ok(self.consume(&bytes))
    }

    /// Split `bytes` (read from the current offset) into complete lines and
    /// advance past them.
    fn consume(&mut self, bytes: &[u8]) -> Vec<String> {
        let Some(last_newline) = bytes.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete = &bytes[..=last_newline];
        self.offset += complete.len() as u64;

        complete
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// In-memory log for driving the cursor and watcher without a filesystem
#[derive(Debug, Clone)]
pub struct MemoryLog {
    data: Vec<u8>,
    generation: u64,
    present: bool,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            generation: 1,
            present: true,
        }
    }

    pub fn append(&mut self, text: &str) {
        self.present = true;
        self.data.extend_from_slice(text.as_bytes());
    }

    pub fn truncate(&mut self) {
        self.data.clear();
    }

    /// Swap in a fresh log with the given contents, as log rotation would
    pub fn replace(&mut self, text: &str) {
        self.generation += 1;
        self.present = true;
        self.data = text.as_bytes().to_vec();
    }

    pub fn remove(&mut self) {
        self.present = false;
        self.data.clear();
    }
}

impl AppendOnlyLog for MemoryLog {
    fn snapshot(&mut self) -> io::Result<Option<LogSnapshot>> {
        if !self.present {
            return Ok(None);
        }
        Ok(Some(LogSnapshot {
            identity: Some(self.generation),
            len: self.data.len() as u64,
        }))
    }

    fn read_range(&mut self, offset: u64, end: u64) -> io::Result<Vec<u8>> {
        let start = (offset as usize).min(self.data.len());
        let end = (end as usize).min(self.data.len());
        Ok(self.data[start..end.max(start)].to_vec())
    }
}
