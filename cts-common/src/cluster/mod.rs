//! Cluster state model.
//!
//! [`ClusterManager`] holds what the harness believes about every node and
//! exposes the triggers scenarios use to change it. Expected status is the
//! harness's own bookkeeping: it changes when a transition is issued, never
//! because of something seen in a log.

mod control;
mod exec;

pub use control::{NodeControl, SshControl, SshOptions};
pub use exec::{CommandResult, TIMEOUT_EXIT_CODE, exec_with_timeout};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{CtsError, CtsResult};
use crate::profile::{Event, PatternProfile};
use crate::watch::{LogSource, LogWatcher, WatchPattern};

/// Default fencing attempt budget.
pub const DEFAULT_FENCE_ATTEMPTS: u32 = 5;

/// What the harness believes a node is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Up,
    Down,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Time budgets used by the scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Timings {
    /// How long the stack takes to declare a silent peer dead.
    #[serde(with = "crate::util::humantime_serde")]
    pub dead_time: Duration,
    /// How long the stack takes to finish starting on a node.
    #[serde(with = "crate::util::humantime_serde")]
    pub start_time: Duration,
    /// Added to `dead_time`/`start_time` when waiting for evidence.
    #[serde(with = "crate::util::humantime_serde")]
    pub grace: Duration,
    /// Added to `dead_time` when letting the cluster notice a stop.
    #[serde(with = "crate::util::humantime_serde")]
    pub settle: Duration,
    #[serde(with = "crate::util::humantime_serde")]
    pub stonith_timeout: Duration,
    #[serde(with = "crate::util::humantime_serde")]
    pub stonith_settle: Duration,
    #[serde(with = "crate::util::humantime_serde")]
    pub standby_backoff: Duration,
    /// Poll interval for file-backed log sources.
    #[serde(with = "crate::util::humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            dead_time: Duration::from_secs(30),
            start_time: Duration::from_secs(90),
            grace: Duration::from_secs(10),
            settle: Duration::from_secs(2),
            stonith_timeout: Duration::from_secs(600),
            stonith_settle: Duration::from_secs(10),
            standby_backoff: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl Timings {
    /// Window for stop evidence.
    pub fn stop_timeout(&self) -> Duration {
        self.dead_time + self.grace
    }

    /// Window for start evidence.
    pub fn start_timeout(&self) -> Duration {
        self.start_time + self.grace
    }

    /// Pause after a stop so the rest of the cluster notices.
    pub fn settle_delay(&self) -> Duration {
        self.dead_time + self.settle
    }
}

/// Static facts about the cluster under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEnv {
    pub nodes: Vec<String>,
    /// Where the harness itself runs; usually not a member.
    pub our_node: String,
    pub do_fencing: bool,
    pub do_standby: bool,
    pub fence_attempts: u32,
}

impl ClusterEnv {
    pub fn new(nodes: impl IntoIterator<Item = impl Into<String>>, our_node: impl Into<String>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            our_node: our_node.into(),
            do_fencing: true,
            do_standby: true,
            fence_attempts: DEFAULT_FENCE_ATTEMPTS,
        }
    }
}

/// The harness's view of the cluster plus the means to act on it.
pub struct ClusterManager {
    env: ClusterEnv,
    profile: Arc<PatternProfile>,
    timings: Timings,
    log: Arc<dyn LogSource>,
    control: Box<dyn NodeControl>,
    expected: BTreeMap<String, NodeStatus>,
    rng: StdRng,
}

impl fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterManager")
            .field("env", &self.env)
            .field("profile", &self.profile.name)
            .field("log", &self.log.describe())
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

impl ClusterManager {
    pub fn new(
        env: ClusterEnv,
        profile: Arc<PatternProfile>,
        timings: Timings,
        log: Arc<dyn LogSource>,
        control: Box<dyn NodeControl>,
    ) -> CtsResult<Self> {
        if env.nodes.is_empty() {
            return Err(CtsError::Config("cluster has no nodes".to_string()));
        }
        if env.fence_attempts == 0 {
            return Err(CtsError::Config("fence attempts must be at least 1".to_string()));
        }
        Ok(Self {
            env,
            profile,
            timings,
            log,
            control,
            expected: BTreeMap::new(),
            rng: StdRng::seed_from_u64(rand::random()),
        })
    }

    /// Make node and scenario selection reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn env(&self) -> &ClusterEnv {
        &self.env
    }

    pub fn profile(&self) -> &PatternProfile {
        &self.profile
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn nodes(&self) -> &[String] {
        &self.env.nodes
    }

    pub fn our_node(&self) -> &str {
        &self.env.our_node
    }

    pub fn is_our_node(&self, node: &str) -> bool {
        self.env.our_node == node
    }

    pub fn is_member(&self, node: &str) -> bool {
        self.env.nodes.iter().any(|n| n == node)
    }

    /// `None` until the harness has set a status for `node`.
    pub fn expected_status(&self, node: &str) -> Option<NodeStatus> {
        self.expected.get(node).copied()
    }

    pub fn set_expected_status(&mut self, node: &str, status: NodeStatus) {
        debug!(node, %status, "Expected status updated");
        self.expected.insert(node.to_string(), status);
    }

    /// Set every member to `status`.
    pub fn set_all_expected(&mut self, status: NodeStatus) {
        for node in self.env.nodes.clone() {
            self.set_expected_status(&node, status);
        }
    }

    /// Number of members currently expected up.
    pub fn up_count(&self) -> usize {
        self.env
            .nodes
            .iter()
            .filter(|node| self.expected_status(node) == Some(NodeStatus::Up))
            .count()
    }

    /// Compile the profile pattern for `event` about `node`.
    pub fn pattern(&self, event: Event, node: &str) -> CtsResult<WatchPattern> {
        self.profile.pattern(event, node)
    }

    /// A watcher on the cluster log, armed now.
    pub fn arm_watcher(&self, patterns: Vec<WatchPattern>, timeout: Duration) -> CtsResult<LogWatcher> {
        LogWatcher::armed(Arc::clone(&self.log), patterns, timeout)
    }

    pub fn log_source(&self) -> Arc<dyn LogSource> {
        Arc::clone(&self.log)
    }

    fn require_member(&self, node: &str) -> CtsResult<()> {
        if self.is_member(node) {
            Ok(())
        } else {
            Err(CtsError::UnknownNode(node.to_string()))
        }
    }

    /// Issue a start; on success the node is expected up.
    pub fn start_node(&mut self, node: &str) -> CtsResult<()> {
        self.require_member(node)?;
        info!(node, "Starting cluster stack");
        self.control.start(node)?;
        self.set_expected_status(node, NodeStatus::Up);
        Ok(())
    }

    /// Issue a stop; on success the node is expected down.
    pub fn stop_node(&mut self, node: &str) -> CtsResult<()> {
        self.require_member(node)?;
        info!(node, "Stopping cluster stack");
        self.control.stop(node)?;
        self.set_expected_status(node, NodeStatus::Down);
        Ok(())
    }

    /// Fence `node`, retrying up to the configured attempt budget.
    ///
    /// Returns false only once every attempt failed. Expected status is left
    /// to the caller.
    pub fn fence(&mut self, node: &str) -> bool {
        let attempts = self.env.fence_attempts;
        for attempt in 1..=attempts {
            match self.control.reset(node) {
                Ok(()) => {
                    info!(node, attempt, "Node fenced");
                    return true;
                }
                Err(err) => warn!(node, attempt, attempts, error = %err, "Fencing attempt failed"),
            }
        }
        false
    }

    pub fn run_remote(&mut self, node: &str, command: &str) -> CtsResult<CommandResult> {
        debug!(node, command, "Running remote command");
        self.control.run_remote(node, command)
    }

    /// A member chosen uniformly at random.
    pub fn random_node(&mut self) -> Option<String> {
        self.env.nodes.choose(&mut self.rng).cloned()
    }

    /// One item chosen uniformly at random.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Block for a fixed settle period.
    pub fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        debug!(duration = %crate::util::format_duration(duration), "Settling");
        std::thread::sleep(duration);
    }
}
