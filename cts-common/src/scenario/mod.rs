//! Fault-injection scenarios.
//!
//! Every scenario shares the same bookkeeping through [`TestCore`]: `calls` is
//! counted on entry, then exactly one of `success`, `failure` or `skipped`
//! records how the invocation ended. Failures are logged and counted here and
//! never leave the scenario as errors.

mod flip;
mod restart;
mod simul_start;
mod standby;
mod start_stop;
mod stonith;

pub use flip::FlipTest;
pub use restart::RestartTest;
pub use simul_start::SimulStart;
pub use standby::{MAX_STANDBY_ATTEMPTS, StandbyTest};
pub use start_stop::{StartTest, StopTest};
pub use stonith::StonithTest;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cluster::ClusterManager;
use crate::errors::CtsResult;

/// Default per-scenario timeout budget.
pub const DEFAULT_SCENARIO_TIMEOUT: Duration = Duration::from_secs(120);

/// Counters every scenario starts with.
pub const STANDARD_COUNTERS: [&str; 5] = ["calls", "success", "failure", "skipped", "auditfail"];

/// How one invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure(String),
    Skipped,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(reason) => write!(f, "failure ({reason})"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Named counters; unknown names read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats(BTreeMap<String, u64>);

impl Default for Stats {
    fn default() -> Self {
        Self(
            STANDARD_COUNTERS
                .iter()
                .map(|name| (name.to_string(), 0))
                .collect(),
        )
    }
}

impl Stats {
    pub fn incr(&mut self, name: &str) {
        *self.0.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Fold another table into this one.
    pub fn merge(&mut self, other: &Stats) {
        for (name, count) in other.iter() {
            *self.0.entry(name.to_string()).or_insert(0) += count;
        }
    }
}

/// Name, counters and timeout shared by every scenario.
#[derive(Debug, Clone)]
pub struct TestCore {
    name: String,
    stats: Stats,
    timeout: Duration,
    target: Option<String>,
}

impl TestCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: Stats::default(),
            timeout: DEFAULT_SCENARIO_TIMEOUT,
            target: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The node the last invocation acted on; `None` when it acted on the
    /// whole cluster.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn set_target(&mut self, node: Option<&str>) {
        self.target = node.map(str::to_string);
    }

    /// Entry bookkeeping; always the first thing an invocation does.
    pub fn begin(&mut self) {
        self.stats.incr("calls");
    }

    pub fn incr(&mut self, name: &str) {
        self.stats.incr(name);
    }

    pub fn success(&mut self) -> Outcome {
        self.stats.incr("success");
        info!(test = %self.name, "Test passed");
        Outcome::Success
    }

    pub fn failure(&mut self, reason: impl Into<String>) -> Outcome {
        let reason = reason.into();
        self.stats.incr("failure");
        warn!(test = %self.name, reason = %reason, "Test {} failed [reason:{}]", self.name, reason);
        Outcome::Failure(reason)
    }

    pub fn skipped(&mut self) -> Outcome {
        self.stats.incr("skipped");
        info!(test = %self.name, "Test skipped");
        Outcome::Skipped
    }
}

/// A fault-injection scenario the driver can invoke.
pub trait Scenario {
    fn core(&self) -> &TestCore;

    fn core_mut(&mut self) -> &mut TestCore;

    /// Whether this scenario belongs in the run at all.
    fn is_applicable(&self, cm: &ClusterManager) -> bool;

    /// Whether the current cluster state allows an invocation right now.
    fn can_run_now(&self, _cm: &ClusterManager) -> bool {
        true
    }

    /// The scenario body. Errors surface as failures through [`Scenario::invoke`].
    fn run(&mut self, cm: &mut ClusterManager, target: &str) -> CtsResult<Outcome>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn stats(&self) -> &Stats {
        self.core().stats()
    }

    fn timeout(&self) -> Duration {
        self.core().timeout()
    }

    /// Run one invocation against `target` and record how it ended.
    ///
    /// Scenarios that choose their own node replace the recorded target.
    fn invoke(&mut self, cm: &mut ClusterManager, target: &str) -> Outcome {
        self.core_mut().begin();
        self.core_mut().set_target(Some(target));
        info!(test = %self.name(), target, "Running test");
        match self.run(cm, target) {
            Ok(outcome) => outcome,
            Err(err) => self.core_mut().failure(err.to_string()),
        }
    }

    /// Bookkeeping for an external audit that flagged this invocation.
    fn record_audit_failure(&mut self) {
        self.core_mut().incr("auditfail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stats_start_with_standard_counters() {
        let stats = Stats::default();
        let names: Vec<_> = stats.iter().map(|(name, _)| name).collect();
        for counter in STANDARD_COUNTERS {
            assert!(names.contains(&counter));
        }
        assert_eq!(stats.get("retries"), 0);
    }

    #[test]
    fn test_failure_records_reason() {
        let mut core = TestCore::new("Stop");
        core.begin();
        let outcome = core.failure("no match against x");
        assert_eq!(outcome, Outcome::Failure("no match against x".to_string()));
        assert_eq!(core.stats().get("failure"), 1);
        assert_eq!(core.stats().get("success"), 0);
    }

    #[test]
    fn test_skipped_leaves_verdict_counters() {
        let mut core = TestCore::new("Start");
        core.begin();
        assert!(core.skipped().is_skipped());
        assert_eq!(core.stats().get("skipped"), 1);
        assert_eq!(core.stats().get("success") + core.stats().get("failure"), 0);
    }

    #[test]
    fn test_stats_merge() {
        let mut a = Stats::default();
        a.incr("calls");
        a.incr("retries");
        let mut b = Stats::default();
        b.incr("calls");
        a.merge(&b);
        assert_eq!(a.get("calls"), 2);
        assert_eq!(a.get("retries"), 1);
    }

    #[test]
    fn test_outcome_serializes_with_reason() {
        let json = serde_json::to_string(&Outcome::Failure("Stonith failure".to_string())).unwrap();
        assert_eq!(json, r#"{"outcome":"failure","reason":"Stonith failure"}"#);
        let json = serde_json::to_string(&Outcome::Skipped).unwrap();
        assert_eq!(json, r#"{"outcome":"skipped"}"#);
    }

    proptest! {
        #[test]
        fn prop_calls_cover_every_verdict(verdicts in proptest::collection::vec(0u8..4, 0..64)) {
            let mut core = TestCore::new("prop");
            for verdict in &verdicts {
                core.begin();
                match verdict {
                    0 => { core.success(); }
                    1 => { core.failure("x"); }
                    2 => { core.skipped(); }
                    // Bail out before any verdict, as an interrupted run would.
                    _ => {}
                }
            }
            let stats = core.stats();
            prop_assert_eq!(stats.get("calls"), verdicts.len() as u64);
            prop_assert!(
                stats.get("calls") >= stats.get("success") + stats.get("failure") + stats.get("skipped")
            );
        }
    }
}
