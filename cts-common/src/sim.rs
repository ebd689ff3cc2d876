//! In-process cluster simulator.
//!
//! [`SimulatedCluster`] implements [`NodeControl`] by writing the lines the
//! `simulated` pattern profile expects into a [`MemoryLog`], the way a real
//! stack would log them. Fault knobs make it misbehave on demand.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cluster::{CommandResult, NodeControl};
use crate::errors::{CtsError, CtsResult};
use crate::watch::MemoryLog;

/// Ways the simulator can misbehave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Resets that fail before one succeeds.
    pub failing_resets: u32,
    /// Nodes that start but never log start evidence.
    pub silent_nodes: BTreeSet<String>,
    /// Standby requests answered with the transient refusal first.
    pub transient_standby_rounds: u32,
    /// Delay before emitted lines reach the log.
    pub emit_delay: Option<Duration>,
    /// Nodes whose start command fails outright.
    pub failing_starts: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct SimState {
    up: BTreeSet<String>,
    reset_attempts: u32,
    standby_requests: u32,
}

/// A cluster that only exists as lines in a [`MemoryLog`].
///
/// Clones share state, so a test can keep a handle after boxing one into a
/// `ClusterManager`.
#[derive(Debug, Clone)]
pub struct SimulatedCluster {
    log: MemoryLog,
    faults: Arc<SimFaults>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedCluster {
    pub fn new(log: MemoryLog) -> Self {
        Self::with_faults(log, SimFaults::default())
    }

    pub fn with_faults(log: MemoryLog, faults: SimFaults) -> Self {
        Self {
            log,
            faults: Arc::new(faults),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    /// Nodes the simulator is currently running.
    pub fn up_nodes(&self) -> BTreeSet<String> {
        self.state().up.clone()
    }

    pub fn is_up(&self, node: &str) -> bool {
        self.state().up.contains(node)
    }

    pub fn reset_attempts(&self) -> u32 {
        self.state().reset_attempts
    }

    pub fn standby_requests(&self) -> u32 {
        self.state().standby_requests
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        match self.faults.emit_delay {
            Some(delay) => {
                let log = self.log.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    for line in lines {
                        log.append(line);
                    }
                });
            }
            None => {
                for line in lines {
                    self.log.append(line);
                }
            }
        }
    }

    fn is_silent(&self, node: &str) -> bool {
        self.faults.silent_nodes.contains(node)
    }

    /// Lines logged when `node` joins a cluster whose other members are `peers`.
    fn join_lines(&self, node: &str, peers: &BTreeSet<String>) -> Vec<String> {
        if self.is_silent(node) {
            return Vec::new();
        }
        let mut lines = vec![format!("{node} cts-sim: local startup complete")];
        for peer in peers.iter().filter(|peer| !self.is_silent(peer)) {
            lines.push(format!("{peer} cts-sim: peer {node} joined the membership"));
            lines.push(format!("{node} cts-sim: peer {peer} joined the membership"));
        }
        lines
    }

    fn standby(&mut self, node: &str) -> CommandResult {
        let started = Instant::now();
        let line = {
            let mut state = self.state();
            if !state.up.contains(node) {
                return finished(1, String::new(), format!("{node}: cluster stack not running"), started);
            }
            state.standby_requests += 1;
            if state.standby_requests <= self.faults.transient_standby_rounds {
                format!("{node} cts-sim: standby deferred, resources in transition")
            } else if state.up.len() < 2 {
                format!("{node} cts-sim: standby refused, no peer available")
            } else {
                format!("{node} cts-sim: standby request complete")
            }
        };
        self.emit(vec![line]);
        finished(0, String::new(), String::new(), started)
    }
}

fn finished(exit_code: i32, stdout: String, stderr: String, started: Instant) -> CommandResult {
    CommandResult {
        exit_code,
        stdout,
        stderr,
        duration: started.elapsed(),
    }
}

impl NodeControl for SimulatedCluster {
    fn start(&mut self, node: &str) -> CtsResult<()> {
        if self.faults.failing_starts.contains(node) {
            return Err(CtsError::RemoteCommand {
                node: node.to_string(),
                command: format!("cts-sim start {node}"),
                exit_code: 1,
                stderr: "simulated start failure".to_string(),
            });
        }
        let lines = {
            let mut state = self.state();
            if !state.up.insert(node.to_string()) {
                debug!(node, "Simulated node already running");
                return Ok(());
            }
            let peers = state.up.iter().filter(|n| *n != node).cloned().collect();
            self.join_lines(node, &peers)
        };
        debug!(node, "Simulated node started");
        self.emit(lines);
        Ok(())
    }

    fn stop(&mut self, node: &str) -> CtsResult<()> {
        let lines = {
            let mut state = self.state();
            if !state.up.remove(node) {
                return Ok(());
            }
            let mut lines = vec![format!("{node} cts-sim: local shutdown complete")];
            if state.up.is_empty() {
                lines.push(format!("{node} cts-sim: shutdown complete, membership empty"));
            }
            for peer in &state.up {
                lines.push(format!("{peer} cts-sim: peer {node} left the membership"));
            }
            lines
        };
        debug!(node, "Simulated node stopped");
        self.emit(lines);
        Ok(())
    }

    fn reset(&mut self, node: &str) -> CtsResult<()> {
        let lines = {
            let mut state = self.state();
            state.reset_attempts += 1;
            if state.reset_attempts <= self.faults.failing_resets {
                return Err(CtsError::RemoteCommand {
                    node: node.to_string(),
                    command: format!("reset {node}"),
                    exit_code: 1,
                    stderr: "simulated fencing device did not respond".to_string(),
                });
            }

            let mut lines = Vec::new();
            if state.up.remove(node) {
                for peer in &state.up {
                    lines.push(format!("{peer} cts-sim: peer {node} is now lost"));
                    lines.push(format!("{peer} cts-sim: peer {node} left the membership"));
                }
            }
            // The node reboots straight back into the cluster.
            let peers = state.up.clone();
            state.up.insert(node.to_string());
            lines.extend(self.join_lines(node, &peers));
            lines
        };
        debug!(node, "Simulated node reset");
        self.emit(lines);
        Ok(())
    }

    fn run_remote(&mut self, node: &str, command: &str) -> CtsResult<CommandResult> {
        let started = Instant::now();
        let words: Vec<&str> = command.split_whitespace().collect();
        let result = match words.as_slice() {
            ["cts-sim", "start", target] => {
                self.start(target)?;
                finished(0, String::new(), String::new(), started)
            }
            ["cts-sim", "stop", target] => {
                self.stop(target)?;
                finished(0, String::new(), String::new(), started)
            }
            ["cts-sim", "standby", target] => self.standby(target),
            ["cts-sim", "uuid"] => finished(0, format!("{node}\n"), String::new(), started),
            ["cts-sim", "quorum"] => {
                let up = self.state().up.len();
                finished(0, format!("{}\n", u8::from(up > 0)), String::new(), started)
            }
            _ => finished(
                127,
                String::new(),
                format!("cts-sim: unknown command '{command}'"),
                started,
            ),
        };
        debug!(node, command, exit_code = result.exit_code, "Simulated remote command");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> SimulatedCluster {
        SimulatedCluster::new(MemoryLog::new("sim"))
    }

    #[test]
    fn test_first_start_logs_only_local_line() {
        let mut sim = sim();
        sim.start("n1").unwrap();
        assert_eq!(sim.log().lines(), vec!["n1 cts-sim: local startup complete".to_string()]);
        assert!(sim.is_up("n1"));
    }

    #[test]
    fn test_join_is_announced_both_ways() {
        let mut sim = sim();
        sim.start("n1").unwrap();
        sim.start("n2").unwrap();
        let lines = sim.log().lines();
        assert!(lines.contains(&"n1 cts-sim: peer n2 joined the membership".to_string()));
        assert!(lines.contains(&"n2 cts-sim: peer n1 joined the membership".to_string()));
    }

    #[test]
    fn test_last_stop_reports_empty_membership() {
        let mut sim = sim();
        sim.start("n1").unwrap();
        sim.stop("n1").unwrap();
        assert!(
            sim.log()
                .lines()
                .contains(&"n1 cts-sim: shutdown complete, membership empty".to_string())
        );
        assert!(sim.up_nodes().is_empty());
    }

    #[test]
    fn test_reset_fails_configured_number_of_times() {
        let faults = SimFaults {
            failing_resets: 2,
            ..SimFaults::default()
        };
        let mut sim = SimulatedCluster::with_faults(MemoryLog::new("sim"), faults);
        assert!(sim.reset("n1").is_err());
        assert!(sim.reset("n1").is_err());
        assert!(sim.reset("n1").is_ok());
        assert_eq!(sim.reset_attempts(), 3);
        assert!(sim.is_up("n1"));
    }

    #[test]
    fn test_silent_node_logs_nothing_on_start() {
        let faults = SimFaults {
            silent_nodes: ["n2".to_string()].into_iter().collect(),
            ..SimFaults::default()
        };
        let mut sim = SimulatedCluster::with_faults(MemoryLog::new("sim"), faults);
        sim.start("n1").unwrap();
        sim.start("n2").unwrap();
        assert!(sim.log().lines().iter().all(|line| !line.contains("n2")));
    }

    #[test]
    fn test_standby_rounds() {
        let faults = SimFaults {
            transient_standby_rounds: 1,
            ..SimFaults::default()
        };
        let mut sim = SimulatedCluster::with_faults(MemoryLog::new("sim"), faults);
        sim.start("n1").unwrap();
        sim.start("n2").unwrap();

        assert!(sim.run_remote("n1", "cts-sim standby n1").unwrap().success());
        assert!(sim.run_remote("n1", "cts-sim standby n1").unwrap().success());
        let lines = sim.log().lines();
        assert!(lines.contains(&"n1 cts-sim: standby deferred, resources in transition".to_string()));
        assert!(lines.contains(&"n1 cts-sim: standby request complete".to_string()));
        assert_eq!(sim.standby_requests(), 2);
    }

    #[test]
    fn test_standby_on_stopped_node_exits_non_zero() {
        let mut sim = sim();
        let result = sim.run_remote("n1", "cts-sim standby n1").unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_unknown_command() {
        let mut sim = sim();
        assert_eq!(sim.run_remote("n1", "uptime").unwrap().exit_code, 127);
    }

    #[test]
    fn test_delayed_emission() {
        let faults = SimFaults {
            emit_delay: Some(Duration::from_millis(30)),
            ..SimFaults::default()
        };
        let mut sim = SimulatedCluster::with_faults(MemoryLog::new("sim"), faults);
        sim.start("n1").unwrap();
        assert!(sim.log().is_empty());
        thread::sleep(Duration::from_millis(200));
        assert_eq!(sim.log().len(), 1);
    }
}
