//! Turning configuration into a ready `ClusterManager`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cts_common::cluster::NodeControl;
use cts_common::{
    ClusterManager, CtsConfig, FileLogSource, LogSource, MemoryLog, SimulatedCluster, SshControl,
    Timings,
};
use tracing::{debug, info};

/// Members of the simulated cluster when the config names none.
const SIMULATED_NODES: [&str; 3] = ["node1", "node2", "node3"];

/// Timings for simulated runs; the simulator logs instantly.
fn simulated_timings() -> Timings {
    Timings {
        dead_time: Duration::from_secs(1),
        start_time: Duration::from_secs(1),
        grace: Duration::from_secs(1),
        settle: Duration::ZERO,
        stonith_timeout: Duration::from_secs(5),
        stonith_settle: Duration::ZERO,
        standby_backoff: Duration::from_millis(100),
        poll_interval: Duration::from_millis(100),
    }
}

/// Load the config file (explicit, or the default path if present), apply
/// the environment and validate.
pub fn load_config(path: Option<&Path>, simulate: bool) -> Result<CtsConfig> {
    let mut config = match path {
        Some(path) => CtsConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match CtsConfig::default_path().filter(|p| p.exists()) {
            Some(path) => {
                debug!(path = %path.display(), "Using default config file");
                CtsConfig::load(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            }
            None => CtsConfig::default(),
        },
    };

    if simulate {
        apply_simulation(&mut config);
    }

    config.apply_env().context("Invalid CTS_* environment")?;
    config.validate()?;
    Ok(config)
}

/// Point the config at the simulator, keeping any explicit nodes and timings.
fn apply_simulation(config: &mut CtsConfig) {
    config.cluster.stack = "simulated".to_string();
    config.cluster.profile_file = None;
    if config.cluster.nodes.is_empty() {
        config.cluster.nodes = SIMULATED_NODES.iter().map(|n| n.to_string()).collect();
    }
    if config.timings == Timings::default() {
        config.timings = simulated_timings();
    }
}

/// Build the manager: SSH and the cluster log file for real runs, the
/// in-process simulator otherwise.
pub fn build_manager(config: &CtsConfig, simulate: bool) -> Result<ClusterManager> {
    let profile = Arc::new(config.profile().context("Failed to load pattern profile")?);

    let log: Arc<dyn LogSource>;
    let control: Box<dyn NodeControl>;
    if simulate {
        let memory = MemoryLog::new("simulated");
        control = Box::new(SimulatedCluster::new(memory.clone()));
        log = Arc::new(memory);
    } else {
        let mut ssh = SshControl::new(Arc::clone(&profile), config.ssh.clone());
        if let Some(command) = &config.cluster.reset_command {
            ssh = ssh.with_reset_command(command.clone());
        }
        control = Box::new(ssh);
        log = Arc::new(
            FileLogSource::new(&config.cluster.log_file)
                .with_poll_interval(config.timings.poll_interval),
        );
    }
    info!(
        profile = %profile.name,
        log = %log.describe(),
        nodes = ?config.cluster.nodes,
        "Cluster configured"
    );

    let mut cm = ClusterManager::new(
        config.cluster_env(),
        profile,
        config.timings.clone(),
        log,
        control,
    )?;
    if let Some(seed) = config.run.seed {
        cm = cm.with_seed(seed);
    }
    cm.set_all_expected(config.cluster.initial_status);
    Ok(cm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_fills_in_nodes_and_timings() {
        let mut config = CtsConfig::default();
        apply_simulation(&mut config);
        assert_eq!(config.cluster.stack, "simulated");
        assert_eq!(config.cluster.nodes, SIMULATED_NODES);
        assert_eq!(config.timings, simulated_timings());

        let mut config = CtsConfig::default();
        config.cluster.nodes = vec!["solo".to_string()];
        config.timings.dead_time = Duration::from_secs(3);
        apply_simulation(&mut config);
        assert_eq!(config.cluster.nodes, vec!["solo"]);
        assert_eq!(config.timings.dead_time, Duration::from_secs(3));
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let path = std::env::temp_dir().join("cts-setup-test-missing.toml");
        assert!(load_config(Some(&path), true).is_err());
    }

    #[test]
    fn test_build_simulated_manager() {
        let mut config = CtsConfig::default();
        config.cluster.stack = "simulated".to_string();
        config.cluster.nodes = vec!["a".to_string(), "b".to_string()];
        config.timings = simulated_timings();

        let cm = build_manager(&config, true).unwrap();
        assert_eq!(cm.nodes().to_vec(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cm.up_count(), 0);
        assert_eq!(cm.profile().name, "simulated");
    }

    #[test]
    fn test_build_real_manager_uses_file_log() {
        let mut config = CtsConfig::default();
        config.cluster.nodes = vec!["node1".to_string()];
        let cm = build_manager(&config, false).unwrap();
        assert_eq!(cm.log_source().describe(), "file:/var/log/messages");
    }
}
