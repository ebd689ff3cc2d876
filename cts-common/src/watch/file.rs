//! Log source that tails a file on disk.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use super::{LogPosition, LogSource};
use crate::errors::{CtsError, CtsResult};

/// Default interval between polls for growth.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tails a text file by byte offset.
///
/// Only newline-terminated lines are returned; a partially written last line
/// is picked up once its newline lands. If the file shrinks below the
/// cursor (truncation or rotation) reading restarts at the beginning. A
/// missing file reads as empty.
#[derive(Debug, Clone)]
pub struct FileLogSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn len(&self) -> CtsResult<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
            Err(source) => Err(self.source_error(source)),
        }
    }

    fn source_error(&self, source: std::io::Error) -> CtsError {
        CtsError::LogSource {
            path: self.path.clone(),
            source,
        }
    }
}

impl LogSource for FileLogSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn end(&self) -> CtsResult<LogPosition> {
        self.len()
    }

    fn read_from(&self, from: LogPosition) -> CtsResult<(Vec<String>, LogPosition)> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(source) => return Err(self.source_error(source)),
        };
        let len = file
            .metadata()
            .map_err(|source| self.source_error(source))?
            .len();

        let start = if len < from {
            warn!(path = %self.path.display(), from, len, "Log file shrank, rereading from start");
            0
        } else {
            from
        };
        if len == start {
            return Ok((Vec::new(), start));
        }

        file.seek(SeekFrom::Start(start))
            .map_err(|source| self.source_error(source))?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.take(len - start)
            .read_to_end(&mut buf)
            .map_err(|source| self.source_error(source))?;

        let complete = match buf.iter().rposition(|&b| b == b'\n') {
            Some(idx) => idx + 1,
            None => return Ok((Vec::new(), start)),
        };
        let lines = String::from_utf8_lossy(&buf[..complete])
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        Ok((lines, start + complete as LogPosition))
    }

    fn wait_for_growth(&self, _from: LogPosition, max: Duration) {
        std::thread::sleep(self.poll_interval.min(max));
    }
}
