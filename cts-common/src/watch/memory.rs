//! In-memory log source.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{LogPosition, LogSource};
use crate::errors::CtsResult;

#[derive(Debug, Default)]
struct Shared {
    lines: Mutex<Vec<String>>,
    grew: Condvar,
}

/// Shared append-only log kept in memory.
///
/// Clones share the same buffer. Waiters are woken on every append, so a
/// watcher sees a new line as soon as it is written.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    name: String,
    shared: Arc<Shared>,
}

impl MemoryLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn append(&self, line: impl Into<String>) {
        let mut lines = self.lock();
        lines.push(line.into());
        drop(lines);
        self.shared.grew.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every line written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // A panicking writer cannot leave the Vec half-updated.
        self.shared
            .lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSource for MemoryLog {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn end(&self) -> CtsResult<LogPosition> {
        Ok(self.len() as LogPosition)
    }

    fn read_from(&self, from: LogPosition) -> CtsResult<(Vec<String>, LogPosition)> {
        let lines = self.lock();
        let start = (from as usize).min(lines.len());
        Ok((lines[start..].to_vec(), lines.len() as LogPosition))
    }

    fn wait_for_growth(&self, from: LogPosition, max: Duration) {
        let deadline = Instant::now() + max;
        let mut lines = self.lock();
        while lines.len() as LogPosition <= from {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            lines = match self.shared.grew.wait_timeout(lines, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_read_from_returns_tail_and_new_end() {
        let log = MemoryLog::new("t");
        log.append("a");
        log.append("b");
        log.append("c");

        let (lines, end) = log.read_from(1).unwrap();
        assert_eq!(lines, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(end, 3);

        let (lines, end) = log.read_from(3).unwrap();
        assert!(lines.is_empty());
        assert_eq!(end, 3);
    }

    #[test]
    fn test_clones_share_buffer() {
        let log = MemoryLog::new("t");
        let other = log.clone();
        other.append("shared");
        assert_eq!(log.lines(), vec!["shared".to_string()]);
        assert_eq!(log.describe(), "memory:t");
    }

    #[test]
    fn test_wait_for_growth_wakes_on_append() {
        let log = MemoryLog::new("t");
        let writer = {
            let log = log.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                log.append("late");
            })
        };

        let start = Instant::now();
        log.wait_for_growth(0, Duration::from_secs(5));
        writer.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_wait_for_growth_gives_up_at_max() {
        let log = MemoryLog::new("t");
        let start = Instant::now();
        log.wait_for_growth(0, Duration::from_millis(40));
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(log.is_empty());
    }
}
