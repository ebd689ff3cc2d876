use super::{Outcome, Scenario, StartTest, StopTest, TestCore};
use crate::cluster::{ClusterManager, NodeStatus};
use crate::errors::{CtsError, CtsResult};

/// Stop and start a randomly chosen node.
///
/// The target passed by the driver is ignored; the node is picked here and
/// recorded as the invocation's target.
#[derive(Debug, Clone)]
pub struct RestartTest {
    core: TestCore,
    start: StartTest,
    stop: StopTest,
}

impl RestartTest {
    pub fn new(cm: &ClusterManager) -> Self {
        Self {
            core: TestCore::new("Restart"),
            start: StartTest::new(cm),
            stop: StopTest::new(cm),
        }
    }
}

impl Scenario for RestartTest {
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
        let node = cm
            .random_node()
            .ok_or_else(|| CtsError::Config("cluster has no nodes".to_string()))?;
        self.core.set_target(Some(&node));
        self.core.incr(&format!("node:{node}"));

        if cm.expected_status(&node) == Some(NodeStatus::Down) {
            self.core.incr("WasStopped");
            self.start.invoke(cm, &node);
        }

        let stopped = self.stop.invoke(cm, &node);
        cm.sleep(cm.timings().settle_delay());
        let started = self.start.invoke(cm, &node);

        if stopped.is_failure() {
            return Ok(self.core.failure("stop failure"));
        }
        if started.is_failure() {
            return Ok(self.core.failure("start failure"));
        }
        Ok(self.core.success())
    }
}
