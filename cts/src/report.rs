//! Human-readable run summary.

use std::fmt::Write as _;
use std::time::Duration;

use cts_common::RunReport;
use cts_common::util::format_duration;

/// Render a report for the terminal.
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "CTS run started {} ({} iterations, {})",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.iterations,
        format_duration(Duration::from_millis(report.duration_ms)),
    );

    if let Some(reason) = &report.boot_failure {
        let _ = writeln!(out, "Boot failed: {reason}");
        return out;
    }

    for record in &report.history {
        let _ = writeln!(
            out,
            "  #{:<3} {:<10} {:<12} {}",
            record.iteration,
            record.scenario,
            record.target.as_deref().unwrap_or("*"),
            record.outcome
        );
    }

    if !report.scenarios.is_empty() {
        let _ = writeln!(out, "Per-scenario counters:");
        for (name, stats) in &report.scenarios {
            let counters: Vec<String> = stats
                .iter()
                .filter(|(_, count)| *count > 0)
                .map(|(counter, count)| format!("{counter}={count}"))
                .collect();
            let _ = writeln!(out, "  {name}: {}", counters.join(" "));
        }
    }

    let verdict = if report.success() { "PASS" } else { "FAIL" };
    let _ = writeln!(
        out,
        "{verdict}: {} passed, {} failed, {} skipped",
        report.passed, report.failed, report.skipped
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cts_common::driver::{self, RunOptions};
    use cts_common::{
        ClusterEnv, ClusterManager, MemoryLog, PatternProfile, ScenarioRegistry, SimulatedCluster,
        Timings,
    };
    use std::sync::Arc;

    fn quick_report(iterations: u32) -> RunReport {
        let log = MemoryLog::new("report");
        let timings = Timings {
            dead_time: Duration::from_millis(100),
            start_time: Duration::from_millis(100),
            grace: Duration::from_millis(50),
            settle: Duration::ZERO,
            ..Timings::default()
        };
        let mut cm = ClusterManager::new(
            ClusterEnv::new(["node1"], "exerciser"),
            Arc::new(PatternProfile::simulated()),
            timings,
            Arc::new(log.clone()),
            Box::new(SimulatedCluster::new(log)),
        )
        .unwrap()
        .with_seed(1);
        let flip = ScenarioRegistry::standard().build("Flip", &cm).unwrap();
        driver::run(
            &mut cm,
            vec![flip],
            RunOptions {
                iterations,
                ..RunOptions::default()
            },
        )
    }

    #[test]
    fn test_render_lists_history_and_verdict() {
        let text = render(&quick_report(2));
        assert!(text.contains("#1"));
        assert!(text.contains("Flip"));
        assert!(text.contains("Flip: calls=2"));
        assert!(text.ends_with("PASS: 2 passed, 0 failed, 0 skipped\n"));
    }
}
