//! Where rolls come from.
//!
//! A [`RollSource`] opens sessions; a [`RollSession`] is polled once per
//! tick. The bundled [`FeedSource`] tails a JSON-lines file that an
//! external page extractor appends snapshots to, one per line:
//!
//! ```json
//! {"rolls": [{"index": 101, "coin": "ct"}, {"index": 102, "coin": "t"}], "index": 102}
//! ```

use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};

use super::error::{Result, WatchError};
use super::model::RawSnapshot;

#[async_trait]
pub trait RollSource: Send + Sync {
    /// Open a fresh session. Errors here put the loop into its error state.
    async fn connect(&mut self) -> Result<Box<dyn RollSession>>;
}

#[async_trait]
pub trait RollSession: Send {
    /// Latest snapshot, or `None` when the source has nothing ready yet.
    ///
    /// [`WatchError::SourceUnavailable`] means the session is gone and must
    /// be reopened; any other error only spoils this poll.
    async fn poll(&mut self) -> Result<Option<RawSnapshot>>;

    async fn close(&mut self) {}
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &Metadata, _b: &Metadata) -> bool {
    true
}

/// Reads complete lines appended to a file since the last call.
struct FeedTailer {
    file: File,
    position: u64,
    path: PathBuf,
}

impl FeedTailer {
    fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            position: 0,
            path: path.to_path_buf(),
        })
    }

    /// Complete lines since the last call. Lines that are not UTF-8 are
    /// skipped, but the read position still moves past them.
    fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let on_disk = fs::metadata(&self.path)?;
        let replaced = !same_file(&on_disk, &self.file.metadata()?);
        if replaced || on_disk.len() < self.position {
            debug!("Feed {:?} was replaced or truncated, rereading from start", self.path);
            self.file = File::open(&self.path)?;
            self.position = 0;
        }

        let mut lines = Vec::new();
        self.file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(&self.file);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let bytes_read = reader.read_until(b'\n', &mut buffer)?;
            // A line without its newline is still being written
            if bytes_read == 0 || buffer.last() != Some(&b'\n') {
                break;
            }
            self.position += bytes_read as u64;

            let Ok(text) = std::str::from_utf8(&buffer) else {
                warn!(
                    "Skipping non UTF-8 line in feed {:?} ending at byte {}",
                    self.path, self.position
                );
                continue;
            };
            let line = text.trim_end_matches(&['\r', '\n'][..]);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }

        Ok(lines)
    }
}

/// Source backed by a JSON-lines snapshot file.
pub struct FeedSource {
    path: PathBuf,
}

impl FeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RollSource for FeedSource {
    async fn connect(&mut self) -> Result<Box<dyn RollSession>> {
        let tailer = FeedTailer::open(&self.path).map_err(|e| {
            WatchError::SourceUnavailable(format!("cannot open feed {:?}: {}", self.path, e))
        })?;
        info!("Connected to feed {:?}", self.path);
        Ok(Box::new(FeedSession { tailer }))
    }
}

struct FeedSession {
    tailer: FeedTailer,
}

#[async_trait]
impl RollSession for FeedSession {
    async fn poll(&mut self) -> Result<Option<RawSnapshot>> {
        let lines = self.tailer.read_new_lines().map_err(|e| {
            WatchError::SourceUnavailable(format!("feed {:?} unreadable: {}", self.tailer.path, e))
        })?;

        // Only the newest snapshot matters; it contains the recent history
        match lines.last() {
            Some(line) => Ok(Some(serde_json::from_str(line)?)),
            None => Ok(None),
        }
    }
}
