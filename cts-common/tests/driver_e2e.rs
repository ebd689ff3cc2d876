//! End-to-end runs of the driver over the simulator.

mod common;

use std::collections::BTreeSet;

use common::HarnessBuilder;
use cts_common::driver::{self, RunOptions};
use cts_common::{NodeStatus, Outcome, ScenarioRegistry, SimFaults};

#[ctor::ctor]
fn setup() {
    cts_common::testing::init_global_test_logging();
}

#[test]
fn healthy_cluster_passes_every_iteration() {
    let mut h = HarnessBuilder::new(&["node1", "node2", "node3"]).seed(7).build();
    let scenarios = ScenarioRegistry::standard().applicable(&h.cm);
    let options = RunOptions {
        iterations: 8,
        ..RunOptions::default()
    };

    let report = driver::run(&mut h.cm, scenarios, options);

    assert!(report.success(), "failures: {:?}", report.history);
    assert_eq!(report.history.len(), 8);
    assert_eq!(report.iterations, 8);
    assert_eq!(report.passed + report.skipped, 8);
    let calls: u64 = report.scenarios.values().map(|s| s.get("calls")).sum();
    assert_eq!(calls, 8);
    for record in &report.history {
        match record.scenario.as_str() {
            "SimulStart" => assert_eq!(record.target, None),
            _ => assert!(h.cm.is_member(record.target.as_deref().unwrap())),
        }
    }
}

#[test]
fn restart_records_the_node_it_restarted() {
    let mut h = HarnessBuilder::new(&["node1", "node2", "node3"]).seed(11).build();
    let restart = ScenarioRegistry::standard().build("Restart", &h.cm).unwrap();
    let options = RunOptions {
        iterations: 4,
        ..RunOptions::default()
    };

    let report = driver::run(&mut h.cm, vec![restart], options);

    assert!(report.success(), "failures: {:?}", report.history);
    let stats = &report.scenarios["Restart"];
    for node in ["node1", "node2", "node3"] {
        let recorded = report
            .history
            .iter()
            .filter(|r| r.target.as_deref() == Some(node))
            .count() as u64;
        assert_eq!(recorded, stats.get(&format!("node:{node}")), "{node}");
    }
}

#[test]
fn simul_start_records_no_target() {
    let mut h = HarnessBuilder::new(&["node1", "node2"]).seed(5).build();
    let simul = ScenarioRegistry::standard().build("SimulStart", &h.cm).unwrap();
    let options = RunOptions {
        iterations: 1,
        ..RunOptions::default()
    };

    let report = driver::run(&mut h.cm, vec![simul], options);

    assert!(report.success(), "failures: {:?}", report.history);
    assert_eq!(report.history[0].target, None);
    let json = serde_json::to_value(&report).unwrap();
    assert!(json["history"][0]["target"].is_null());
}

#[test]
fn boot_failure_aborts_the_run() {
    let faults = SimFaults {
        failing_starts: ["node2".to_string()].into_iter().collect::<BTreeSet<_>>(),
        ..SimFaults::default()
    };
    let mut h = HarnessBuilder::new(&["node1", "node2"]).faults(faults).build();
    let scenarios = ScenarioRegistry::standard().applicable(&h.cm);

    let report = driver::run(&mut h.cm, scenarios, RunOptions::default());

    assert!(!report.success());
    let reason = report.boot_failure.as_deref().expect("boot failure");
    assert!(reason.contains("node2"));
    assert!(report.history.is_empty());
    assert_eq!(h.cm.expected_status("node1"), Some(NodeStatus::Up));
}

#[test]
fn failing_scenario_marks_run_failed() {
    let faults = SimFaults {
        failing_resets: u32::MAX,
        ..SimFaults::default()
    };
    let mut h = HarnessBuilder::new(&["node1", "node2"]).faults(faults).build();
    let stonith = ScenarioRegistry::standard().build("Stonith", &h.cm).unwrap();
    let options = RunOptions {
        iterations: 3,
        ..RunOptions::default()
    };

    let report = driver::run(&mut h.cm, vec![stonith], options);

    assert!(!report.success());
    assert_eq!(report.failed, 3);
    assert!(
        report
            .history
            .iter()
            .all(|r| r.outcome == Outcome::Failure("Stonith failure".to_string()))
    );
    assert_eq!(report.scenarios["Stonith"].get("failure"), 3);
}

#[test]
fn run_without_boot_keeps_initial_status() {
    let mut h = HarnessBuilder::new(&["node1", "node2"]).build();
    let options = RunOptions {
        iterations: 1,
        initial_status: NodeStatus::Up,
        boot: false,
    };

    let report = driver::run(&mut h.cm, Vec::new(), options);

    assert!(report.success());
    assert!(report.history.is_empty());
    assert_eq!(h.cm.up_count(), 2);
}

#[test]
fn report_serializes_to_json() {
    let mut h = HarnessBuilder::new(&["node1"]).seed(3).build();
    let flip = ScenarioRegistry::standard().build("Flip", &h.cm).unwrap();
    let options = RunOptions {
        iterations: 2,
        ..RunOptions::default()
    };

    let report = driver::run(&mut h.cm, vec![flip], options);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["passed"], 2);
    assert_eq!(json["history"][0]["scenario"], "Flip");
    assert_eq!(json["history"][0]["target"], "node1");
    assert_eq!(json["history"][0]["outcome"], "success");
    assert_eq!(json["scenarios"]["Flip"]["calls"], 2);
}
