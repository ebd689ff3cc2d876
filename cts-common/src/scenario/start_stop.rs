//! Single-node start and stop.

use tracing::debug;

use super::{Outcome, Scenario, TestCore};
use crate::cluster::{ClusterManager, NodeStatus};
use crate::errors::CtsResult;
use crate::profile::Event;
use crate::watch::WatchMatch;

/// Stop the cluster stack on one node and wait for the stop evidence.
#[derive(Debug, Clone)]
pub struct StopTest {
    core: TestCore,
    last_match: Option<WatchMatch>,
}

impl StopTest {
    pub fn new(cm: &ClusterManager) -> Self {
        Self {
            core: TestCore::new("Stop").with_timeout(cm.timings().stop_timeout()),
            last_match: None,
        }
    }

    /// Evidence line that satisfied the most recent invocation.
    pub fn last_match(&self) -> Option<&WatchMatch> {
        self.last_match.as_ref()
    }
}

impl Scenario for StopTest {
    fn core(&self) -> &TestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TestCore {
        &mut self.core
    }

    fn is_applicable(&self, _cm: &ClusterManager) -> bool {
        true
    }

    fn run(&mut self, cm: &mut ClusterManager, node: &str) -> CtsResult<Outcome> {
        self.last_match = None;
        if cm.expected_status(node) != Some(NodeStatus::Up) {
            return Ok(self.core.skipped());
        }

        let event = if cm.is_our_node(node) {
            self.core.incr("us");
            Event::SelfStopped
        } else if cm.up_count() <= 1 {
            self.core.incr("all");
            Event::AllStopped
        } else {
            self.core.incr("them");
            Event::PeerStopped
        };
        let pattern = cm.pattern(event, node)?;
        debug!(node, %event, pattern = %pattern, "Waiting for stop evidence");

        let mut watcher = cm.arm_watcher(vec![pattern.clone()], self.core.timeout())?;
        if let Err(err) = cm.stop_node(node) {
            return Ok(self.core.failure(format!("could not stop {node}: {err}")));
        }

        match watcher.wait()? {
            Some(found) => {
                self.last_match = Some(found);
                Ok(self.core.success())
            }
            None => Ok(self.core.failure(format!("no match against {pattern}"))),
        }
    }
}

/// Start the cluster stack on one node and wait for the start evidence.
#[derive(Debug, Clone)]
pub struct StartTest {
    core: TestCore,
    last_match: Option<WatchMatch>,
}

impl StartTest {
    pub fn new(cm: &ClusterManager) -> Self {
        Self {
            core: TestCore::new("Start").with_timeout(cm.timings().start_timeout()),
            last_match: None,
        }
    }

    pub fn last_match(&self) -> Option<&WatchMatch> {
        self.last_match.as_ref()
    }
}

impl Scenario for StartTest {
    fn core(&self) -> &TestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TestCore {
        &mut self.core
    }

    fn is_applicable(&self, _cm: &ClusterManager) -> bool {
        true
    }

    fn run(&mut self, cm: &mut ClusterManager, node: &str) -> CtsResult<Outcome> {
        self.last_match = None;
        if cm.expected_status(node) != Some(NodeStatus::Down) {
            return Ok(self.core.skipped());
        }

        let event = if cm.is_our_node(node) || cm.up_count() == 0 {
            self.core.incr("us");
            Event::SelfStarted
        } else {
            self.core.incr("them");
            Event::PeerStarted
        };
        let pattern = cm.pattern(event, node)?;
        debug!(node, %event, pattern = %pattern, "Waiting for start evidence");

        let mut watcher = cm.arm_watcher(vec![pattern.clone()], self.core.timeout())?;
        if let Err(err) = cm.start_node(node) {
            return Ok(self.core.failure(format!("could not start {node}: {err}")));
        }

        match watcher.wait()? {
            Some(found) => {
                self.last_match = Some(found);
                Ok(self.core.success())
            }
            None => Ok(self.core.failure(format!("did not find pattern {pattern}"))),
        }
    }
}
