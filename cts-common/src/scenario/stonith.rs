use tracing::debug;

use super::{Outcome, Scenario, TestCore};
use crate::cluster::{ClusterManager, NodeStatus};
use crate::errors::CtsResult;
use crate::profile::Event;

/// Fence a node and wait for it to leave and rejoin.
#[derive(Debug, Clone)]
pub struct StonithTest {
    core: TestCore,
}

impl StonithTest {
    pub fn new(cm: &ClusterManager) -> Self {
        Self {
            core: TestCore::new("Stonith").with_timeout(cm.timings().stonith_timeout),
        }
    }
}

impl Scenario for StonithTest {
    fn core(&self) -> &TestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TestCore {
        &mut self.core
    }

    fn is_applicable(&self, cm: &ClusterManager) -> bool {
        cm.env().do_fencing
    }

    fn run(&mut self, cm: &mut ClusterManager, node: &str) -> CtsResult<Outcome> {
        let up_count = cm.up_count();

        // Both watchers are armed before the fence so neither transition can
        // be logged ahead of its cursor.
        let mut down = if cm.expected_status(node) == Some(NodeStatus::Up) && up_count > 1 {
            let pattern = cm.pattern(Event::PeerStopped, node)?;
            Some(cm.arm_watcher(vec![pattern], cm.timings().stop_timeout())?)
        } else {
            None
        };
        let up_event = if up_count <= 1 {
            Event::SelfStarted
        } else {
            Event::PeerStarted
        };
        let up_pattern = cm.pattern(up_event, node)?;
        let mut up = cm.arm_watcher(vec![up_pattern.clone()], self.core.timeout())?;
        debug!(node, %up_event, watching_down = down.is_some(), "Watchers armed for fencing");

        if !cm.fence(node) {
            return Ok(self.core.failure("Stonith failure"));
        }

        let mut reason = None;
        if let Some(watcher) = down.as_mut() {
            if watcher.wait()?.is_none() {
                let pattern = &watcher.patterns()[0];
                reason = Some(format!("did not find {pattern}"));
            }
        }
        if up.wait()?.is_none() {
            reason = Some(format!("did not find {up_pattern}"));
        }

        cm.set_expected_status(node, NodeStatus::Up);
        cm.sleep(cm.timings().stonith_settle);

        match reason {
            None => Ok(self.core.success()),
            Some(reason) => Ok(self.core.failure(reason)),
        }
    }
}
