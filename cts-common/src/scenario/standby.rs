use tracing::{debug, warn};

use super::{Outcome, Scenario, TestCore};
use crate::cluster::{ClusterManager, NodeStatus};
use crate::errors::CtsResult;
use crate::profile::{Action, Event};

/// Most standby requests issued per invocation.
pub const MAX_STANDBY_ATTEMPTS: u32 = 10;

/// Put a node into standby, retrying while the cluster reports a transient
/// refusal.
#[derive(Debug, Clone)]
pub struct StandbyTest {
    core: TestCore,
}

impl StandbyTest {
    pub fn new(cm: &ClusterManager) -> Self {
        Self {
            core: TestCore::new("standby").with_timeout(cm.timings().stop_timeout()),
        }
    }
}

impl Scenario for StandbyTest {
    fn core(&self) -> &TestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TestCore {
        &mut self.core
    }

    fn is_applicable(&self, cm: &ClusterManager) -> bool {
        cm.env().do_standby && cm.profile().has_command(Action::Standby)
    }

    fn run(&mut self, cm: &mut ClusterManager, node: &str) -> CtsResult<Outcome> {
        if cm.expected_status(node) == Some(NodeStatus::Down) {
            return Ok(self.core.skipped());
        }

        let terminal = if cm.up_count() < 2 {
            self.core.incr("nostandby");
            cm.pattern(Event::StandbyNone, node)?
        } else {
            self.core.incr("standby");
            cm.pattern(Event::StandbyOk, node)?
        };
        let transient = cm.pattern(Event::StandbyTransient, node)?;
        let uuid = cm.profile().node_uuid(node);
        let command = cm.profile().render_command(Action::Standby, &uuid)?;

        for attempt in 1..=MAX_STANDBY_ATTEMPTS {
            let mut watcher =
                cm.arm_watcher(vec![terminal.clone(), transient.clone()], self.core.timeout())?;

            let result = match cm.run_remote(node, &command) {
                Ok(result) => result,
                Err(err) => return Ok(self.core.failure(format!("standby request failed: {err}"))),
            };
            if !result.success() {
                warn!(node, attempt, exit_code = result.exit_code, "Standby command exited non-zero");
            }

            let Some(found) = watcher.wait()? else {
                break;
            };
            if transient.is_match(&found.line) {
                debug!(node, attempt, line = %found.line, "Standby deferred");
                self.core.incr("retries");
                cm.sleep(cm.timings().standby_backoff);
                continue;
            }
            return Ok(self.core.success());
        }

        Ok(self.core.failure(format!("did not find pattern {terminal}")))
    }
}
