//! Shared helpers for scenario tests: a simulated cluster with
//! millisecond-scale timings.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cts_common::{
    ClusterEnv, ClusterManager, MemoryLog, NodeStatus, PatternProfile, SimFaults,
    SimulatedCluster, Timings,
};

pub const OUR_NODE: &str = "exerciser";

/// Timings small enough that a timed-out wait costs a fraction of a second.
pub fn fast_timings() -> Timings {
    Timings {
        dead_time: Duration::from_millis(150),
        start_time: Duration::from_millis(150),
        grace: Duration::from_millis(50),
        settle: Duration::ZERO,
        stonith_timeout: Duration::from_millis(300),
        stonith_settle: Duration::ZERO,
        standby_backoff: Duration::from_millis(5),
        poll_interval: Duration::from_millis(10),
    }
}

pub struct SimHarness {
    pub cm: ClusterManager,
    pub sim: SimulatedCluster,
    pub log: MemoryLog,
}

pub struct HarnessBuilder {
    nodes: Vec<String>,
    our_node: String,
    faults: SimFaults,
    profile: PatternProfile,
    do_fencing: bool,
    do_standby: bool,
    seed: u64,
}

impl HarnessBuilder {
    pub fn new(nodes: &[&str]) -> Self {
        Self {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            our_node: OUR_NODE.to_string(),
            faults: SimFaults::default(),
            profile: PatternProfile::simulated(),
            do_fencing: true,
            do_standby: true,
            seed: 42,
        }
    }

    pub fn our_node(mut self, node: &str) -> Self {
        self.our_node = node.to_string();
        self
    }

    pub fn faults(mut self, faults: SimFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn profile(mut self, profile: PatternProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn fencing(mut self, enabled: bool) -> Self {
        self.do_fencing = enabled;
        self
    }

    pub fn standby(mut self, enabled: bool) -> Self {
        self.do_standby = enabled;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> SimHarness {
        let log = MemoryLog::new("sim");
        let sim = SimulatedCluster::with_faults(log.clone(), self.faults);
        let mut env = ClusterEnv::new(self.nodes, self.our_node);
        env.do_fencing = self.do_fencing;
        env.do_standby = self.do_standby;

        let mut cm = ClusterManager::new(
            env,
            Arc::new(self.profile),
            fast_timings(),
            Arc::new(log.clone()),
            Box::new(sim.clone()),
        )
        .expect("cluster manager")
        .with_seed(self.seed);
        cm.set_all_expected(NodeStatus::Down);

        SimHarness { cm, sim, log }
    }
}

pub fn harness(nodes: &[&str]) -> SimHarness {
    HarnessBuilder::new(nodes).build()
}

impl SimHarness {
    /// Bring every node up without going through a scenario.
    pub fn boot(&mut self) {
        for node in self.cm.nodes().to_vec() {
            self.cm.start_node(&node).expect("simulated start");
        }
    }

    pub fn statuses(&self) -> Vec<Option<NodeStatus>> {
        self.cm
            .nodes()
            .iter()
            .map(|node| self.cm.expected_status(node))
            .collect()
    }
}
