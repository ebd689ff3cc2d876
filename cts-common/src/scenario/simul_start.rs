use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{Outcome, Scenario, StopTest, TestCore};
use crate::cluster::{ClusterManager, NodeStatus};
use crate::errors::CtsResult;
use crate::profile::Event;

/// Stop everything, then start every node at about the same time.
///
/// The target passed by the driver is ignored and no target is recorded.
#[derive(Debug, Clone)]
pub struct SimulStart {
    core: TestCore,
    stop: StopTest,
}

impl SimulStart {
    pub fn new(cm: &ClusterManager) -> Self {
        Self {
            core: TestCore::new("SimulStart").with_timeout(cm.timings().stop_timeout()),
            stop: StopTest::new(cm),
        }
    }
}

impl Scenario for SimulStart {
    fn core(&self) -> &TestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TestCore {
        &mut self.core
    }

    fn is_applicable(&self, _cm: &ClusterManager) -> bool {
        true
    }

    fn run(&mut self, cm: &mut ClusterManager, _target: &str) -> CtsResult<Outcome> {
        self.core.set_target(None);
        let nodes = cm.nodes().to_vec();

        for node in &nodes {
            if cm.expected_status(node) != Some(NodeStatus::Down) {
                self.core.incr("stops");
                let outcome = self.stop.invoke(cm, node);
                if outcome.is_failure() {
                    warn!(node = %node, %outcome, "Stop before simultaneous start did not complete");
                }
            }
        }

        let patterns = nodes
            .iter()
            .map(|node| cm.pattern(Event::PeerStarted, node))
            .collect::<CtsResult<Vec<_>>>()?;
        let mut watcher = cm.arm_watcher(patterns, self.core.timeout())?;

        for node in &nodes {
            if let Err(err) = cm.start_node(node) {
                return Ok(self.core.failure(format!("could not start {node}: {err}")));
            }
        }

        // Patterns were armed in membership order, so the index names the node.
        let mut pending: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();
        for found in watcher.wait_only_matching() {
            let found = found?;
            let node = nodes[found.index].as_str();
            if pending.remove(node) {
                debug!(node, remaining = pending.len(), "Start evidence seen");
            }
            if pending.is_empty() {
                return Ok(self.core.success());
            }
        }

        debug!(?pending, "Nodes without start evidence");
        Ok(self.core.failure("did not find start message"))
    }
}
