//! Run loop: boot the cluster, then invoke randomly chosen scenarios.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cluster::{ClusterManager, NodeStatus};
use crate::scenario::{Outcome, Scenario, StartTest, Stats};

/// How a run is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub iterations: u32,
    /// What every node is believed to be doing before boot.
    pub initial_status: NodeStatus,
    /// Start every node expected down before the first iteration.
    pub boot: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iterations: 1,
            initial_status: NodeStatus::Down,
            boot: true,
        }
    }
}

/// One scenario invocation as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationRecord {
    pub iteration: u32,
    pub scenario: String,
    /// Node the scenario acted on; `None` for whole-cluster scenarios.
    pub target: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub duration_ms: u64,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub iterations: u32,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Set when booting the cluster failed and no iteration ran.
    pub boot_failure: Option<String>,
    pub scenarios: BTreeMap<String, Stats>,
    pub history: Vec<InvocationRecord>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            duration_ms: 0,
            iterations: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            boot_failure: None,
            scenarios: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// True when the cluster booted and no invocation failed.
    pub fn success(&self) -> bool {
        self.boot_failure.is_none() && self.failed == 0
    }

    fn record(&mut self, record: InvocationRecord) {
        match &record.outcome {
            Outcome::Success => self.passed += 1,
            Outcome::Failure(_) => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
        self.history.push(record);
    }
}

/// Start every node currently expected down.
///
/// Returns the first failure reason, if any.
pub fn boot(cm: &mut ClusterManager) -> Option<String> {
    let mut start = StartTest::new(cm);
    for node in cm.nodes().to_vec() {
        if cm.expected_status(&node) != Some(NodeStatus::Down) {
            continue;
        }
        if let Outcome::Failure(reason) = start.invoke(cm, &node) {
            return Some(format!("could not start {node}: {reason}"));
        }
    }
    None
}

/// Run `options.iterations` randomly chosen scenarios against `cm`.
pub fn run(
    cm: &mut ClusterManager,
    mut scenarios: Vec<Box<dyn Scenario>>,
    options: RunOptions,
) -> RunReport {
    let started = Instant::now();
    let mut report = RunReport::new();

    cm.set_all_expected(options.initial_status);
    if options.boot {
        info!(nodes = ?cm.nodes(), "Booting cluster");
        if let Some(reason) = boot(cm) {
            error!(reason = %reason, "Cluster boot failed, not running scenarios");
            report.boot_failure = Some(reason);
            report.duration_ms = started.elapsed().as_millis() as u64;
            return report;
        }
    }

    if scenarios.is_empty() {
        warn!("No applicable scenarios");
    }

    for iteration in 1..=options.iterations {
        if scenarios.is_empty() {
            break;
        }
        let view: &ClusterManager = cm;
        let runnable: Vec<usize> = (0..scenarios.len())
            .filter(|&idx| scenarios[idx].can_run_now(view))
            .collect();
        let Some(&idx) = cm.pick(&runnable) else {
            warn!(iteration, "No scenario can run in the current cluster state");
            continue;
        };
        let Some(target) = cm.random_node() else {
            break;
        };

        let scenario = &mut scenarios[idx];
        info!(iteration, scenario = %scenario.name(), target = %target, "Iteration");
        let invoked = Instant::now();
        let outcome = scenario.invoke(cm, &target);
        report.iterations = iteration;
        report.record(InvocationRecord {
            iteration,
            scenario: scenario.name().to_string(),
            target: scenario.core().target().map(str::to_string),
            outcome,
            duration_ms: invoked.elapsed().as_millis() as u64,
        });
    }

    for scenario in &scenarios {
        report
            .scenarios
            .insert(scenario.name().to_string(), scenario.stats().clone());
    }
    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        passed = report.passed,
        failed = report.failed,
        skipped = report.skipped,
        duration_ms = report.duration_ms,
        "Run complete"
    );
    report
}
