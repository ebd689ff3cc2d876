use super::{Outcome, Scenario, StartTest, StopTest, TestCore};
use crate::cluster::{ClusterManager, NodeStatus};
use crate::errors::CtsResult;

/// Invert a node's state: stop it if up, start it if down.
#[derive(Debug, Clone)]
pub struct FlipTest {
    core: TestCore,
    start: StartTest,
    stop: StopTest,
}

impl FlipTest {
    pub fn new(cm: &ClusterManager) -> Self {
        Self {
            core: TestCore::new("Flip"),
            start: StartTest::new(cm),
            stop: StopTest::new(cm),
        }
    }

    pub fn start_test(&self) -> &StartTest {
        &self.start
    }

    pub fn stop_test(&self) -> &StopTest {
        &self.stop
    }
}

impl Scenario for FlipTest {
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
        let (kind, outcome) = match cm.expected_status(node) {
            Some(NodeStatus::Up) => {
                self.core.incr("stopped");
                let outcome = self.stop.invoke(cm, node);
                cm.sleep(cm.timings().settle_delay());
                ("up->down", outcome)
            }
            Some(NodeStatus::Down) => {
                self.core.incr("started");
                ("down->up", self.start.invoke(cm, node))
            }
            None => return Ok(self.core.skipped()),
        };

        self.core.incr(kind);
        if outcome.is_success() {
            Ok(self.core.success())
        } else {
            Ok(self.core.failure(format!("{kind} failure")))
        }
    }
}
