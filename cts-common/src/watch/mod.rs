//! Log-event synchronization.
//!
//! A [`LogWatcher`] is armed against a [`LogSource`] before the action that is
//! expected to produce evidence, then waited on. Arming fixes a cursor at the
//! current end of the log, so evidence logged between arming and waiting is
//! never lost and anything logged before arming is never matched.
//!
//! Every call to [`LogWatcher::wait`] gets a fresh window of the full timeout.
//! Fan-in waits over `n` pending patterns can therefore take up to
//! `n × timeout` in total.

mod file;
mod memory;

pub use file::FileLogSource;
pub use memory::MemoryLog;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::errors::{CtsError, CtsResult};

/// Opaque position inside a log source (line index or byte offset).
pub type LogPosition = u64;

/// A line-oriented, append-only event log.
pub trait LogSource: Send + Sync + fmt::Debug {
    /// Human-readable name for diagnostics.
    fn describe(&self) -> String;

    /// Position just past the last complete line.
    fn end(&self) -> CtsResult<LogPosition>;

    /// Complete lines after `from`, plus the position following them.
    fn read_from(&self, from: LogPosition) -> CtsResult<(Vec<String>, LogPosition)>;

    /// Block until the log may have grown past `from`, or `max` elapses.
    ///
    /// Spurious early returns are fine; callers re-read and re-check.
    fn wait_for_growth(&self, from: LogPosition, max: Duration);
}

/// A compiled evidence pattern.
#[derive(Debug, Clone)]
pub struct WatchPattern {
    name: String,
    regex: Regex,
}

impl WatchPattern {
    /// Compile a pattern, using the regex text as its name.
    pub fn new(text: impl Into<String>) -> CtsResult<Self> {
        let text = text.into();
        Self::named(text.clone(), text)
    }

    /// Compile a pattern with a symbolic name for error reports.
    pub fn named(name: impl Into<String>, text: impl Into<String>) -> CtsResult<Self> {
        let name = name.into();
        let text = text.into();
        let regex = Regex::new(&text).map_err(|source| CtsError::InvalidPattern {
            name: name.clone(),
            source,
        })?;
        Ok(Self { name, regex })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The regex source text.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Captured groups (excluding the whole match) if `line` matches.
    ///
    /// Groups that did not participate in the match come back empty.
    pub fn captures(&self, line: &str) -> Option<Vec<String>> {
        self.regex.captures(line).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
    }
}

impl fmt::Display for WatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.regex.as_str())
    }
}

/// The line that satisfied a wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchMatch {
    /// Index into the watcher's pattern list.
    pub index: usize,
    pub pattern: String,
    pub line: String,
    pub captures: Vec<String>,
}

impl WatchMatch {
    /// The first captured group.
    ///
    /// Patterns built by [`crate::profile::PatternProfile::pattern`] wrap each
    /// `%s` in a group, so this is the node id only when the template has no
    /// group of its own ahead of `%s`. Use `index` to tell patterns apart.
    pub fn node(&self) -> Option<&str> {
        self.captures.first().map(String::as_str)
    }
}

/// Waits for any of a set of patterns to appear in a log source.
#[derive(Debug)]
pub struct LogWatcher {
    source: Arc<dyn LogSource>,
    patterns: Vec<WatchPattern>,
    timeout: Duration,
    cursor: Option<LogPosition>,
    /// Lines already read from the source but not yet examined.
    backlog: VecDeque<String>,
}

impl LogWatcher {
    pub fn new(source: Arc<dyn LogSource>, patterns: Vec<WatchPattern>, timeout: Duration) -> Self {
        Self {
            source,
            patterns,
            timeout,
            cursor: None,
            backlog: VecDeque::new(),
        }
    }

    /// Build and arm in one step.
    pub fn armed(
        source: Arc<dyn LogSource>,
        patterns: Vec<WatchPattern>,
        timeout: Duration,
    ) -> CtsResult<Self> {
        let mut watcher = Self::new(source, patterns, timeout);
        watcher.arm()?;
        Ok(watcher)
    }

    /// Fix the cursor at the current end of the log.
    pub fn arm(&mut self) -> CtsResult<()> {
        let end = self.source.end()?;
        debug!(
            source = %self.source.describe(),
            position = end,
            patterns = self.patterns.len(),
            "Armed log watcher"
        );
        self.cursor = Some(end);
        self.backlog.clear();
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn patterns(&self) -> &[WatchPattern] {
        &self.patterns
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until a new line matches one of the patterns, or the timeout
    /// (counted from this call) elapses.
    ///
    /// Returns `Ok(None)` on timeout. Every line examined is consumed, so a
    /// later wait never sees it again.
    pub fn wait(&mut self) -> CtsResult<Option<WatchMatch>> {
        let mut cursor = self.cursor.ok_or(CtsError::WatcherNotArmed)?;
        let deadline = Instant::now() + self.timeout;

        loop {
            let (lines, next) = self.source.read_from(cursor)?;
            cursor = next;
            self.cursor = Some(next);
            let grew = !lines.is_empty();
            self.backlog.extend(lines);

            while let Some(line) = self.backlog.pop_front() {
                if let Some(found) = self.match_line(line) {
                    debug!(pattern = %found.pattern, line = %found.line, "Log watcher matched");
                    return Ok(Some(found));
                }
            }

            // Checked on every pass so a log that never stops growing still
            // times out.
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    source = %self.source.describe(),
                    timeout = ?self.timeout,
                    "Log watcher timed out"
                );
                return Ok(None);
            }
            if !grew {
                self.source.wait_for_growth(cursor, deadline - now);
            }
        }
    }

    /// Successive matches, each with its own full timeout window.
    ///
    /// The stream ends at the first wait that times out.
    pub fn wait_only_matching(&mut self) -> MatchStream<'_> {
        MatchStream {
            watcher: self,
            finished: false,
        }
    }

    fn match_line(&self, line: String) -> Option<WatchMatch> {
        self.patterns.iter().enumerate().find_map(|(index, pattern)| {
            pattern.captures(&line).map(|captures| WatchMatch {
                index,
                pattern: pattern.as_str().to_string(),
                line: line.clone(),
                captures,
            })
        })
    }
}

/// Iterator returned by [`LogWatcher::wait_only_matching`].
pub struct MatchStream<'a> {
    watcher: &'a mut LogWatcher,
    finished: bool,
}

impl Iterator for MatchStream<'_> {
    type Item = CtsResult<WatchMatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.watcher.wait() {
            Ok(Some(found)) => Some(Ok(found)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
