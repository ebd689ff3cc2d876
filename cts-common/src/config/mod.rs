//! Configuration system for CTS.
//!
//! A run is described by a TOML file with `[cluster]`, `[timings]`, `[ssh]`
//! and `[run]` sections. Every field has a default, and a handful can be
//! overridden through `CTS_*` environment variables.

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::Sourced;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::{ClusterEnv, DEFAULT_FENCE_ATTEMPTS, NodeStatus, SshOptions, Timings};
use crate::errors::{CtsError, CtsResult};
use crate::profile::PatternProfile;

/// Log the cluster writes to when nothing else is configured.
pub const DEFAULT_CLUSTER_LOG: &str = "/var/log/messages";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CtsConfig {
    pub cluster: ClusterSection,
    pub timings: Timings,
    pub ssh: SshOptions,
    pub run: RunSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClusterSection {
    pub nodes: Vec<String>,
    /// Host the harness runs on; defaults to `localhost`.
    pub our_node: Option<String>,
    /// Aggregated cluster log the watchers tail.
    pub log_file: PathBuf,
    /// Built-in profile name, used unless `profile_file` is set.
    pub stack: String,
    pub profile_file: Option<PathBuf>,
    pub do_fencing: bool,
    pub do_standby: bool,
    /// Local command that power-cycles a node; `%s` is the node id.
    pub reset_command: Option<String>,
    pub fence_attempts: u32,
    /// What every node is believed to be doing when the run begins.
    pub initial_status: NodeStatus,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            our_node: None,
            log_file: PathBuf::from(DEFAULT_CLUSTER_LOG),
            stack: "crm-ais".to_string(),
            profile_file: None,
            do_fencing: true,
            do_standby: true,
            reset_command: None,
            fence_attempts: DEFAULT_FENCE_ATTEMPTS,
            initial_status: NodeStatus::Down,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunSection {
    pub iterations: u32,
    pub seed: Option<u64>,
    /// Start every node before the first iteration.
    pub boot: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            iterations: 10,
            seed: None,
            boot: true,
        }
    }
}

impl CtsConfig {
    pub fn from_toml_str(text: &str) -> CtsResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> CtsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            CtsError::Config(format!("cannot read config {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&text)
    }

    /// `~/.config/cts/config.toml` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cts").join("config.toml"))
    }

    /// Overlay `CTS_*` environment variables; all bad values are reported
    /// together.
    pub fn apply_env(&mut self) -> CtsResult<()> {
        let mut parser = EnvParser::new();

        let nodes = parser.get_string_list("NODES", self.cluster.nodes.clone());
        if nodes.is_from_env() {
            self.cluster.nodes = nodes.value;
        }
        if let Some(our_node) = parser.get_optional_string("OUR_NODE").value {
            self.cluster.our_node = Some(our_node);
        }
        if let Some(log) = parser.get_optional_string("CLUSTER_LOG").value {
            self.cluster.log_file = PathBuf::from(log);
        }
        if let Some(stack) = parser.get_optional_string("STACK").value {
            self.cluster.stack = stack;
        }
        self.cluster.do_fencing = parser.get_bool("DO_FENCING", self.cluster.do_fencing).value;
        self.cluster.do_standby = parser.get_bool("DO_STANDBY", self.cluster.do_standby).value;
        self.run.iterations = parser
            .get_u32_range("ITERATIONS", self.run.iterations, 1, u32::MAX)
            .value;
        if let Some(seed) = parser.get_optional_u64("SEED").value {
            self.run.seed = Some(seed);
        }
        self.timings.dead_time = parser.get_duration("DEAD_TIME", self.timings.dead_time).value;
        self.timings.start_time = parser.get_duration("START_TIME", self.timings.start_time).value;

        let errors = parser.take_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            Err(CtsError::Config(joined.join("; ")))
        }
    }

    pub fn validate(&self) -> CtsResult<()> {
        if self.cluster.nodes.is_empty() {
            return Err(CtsError::Config("[cluster] nodes must not be empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        for node in &self.cluster.nodes {
            if node.trim().is_empty() {
                return Err(CtsError::Config("[cluster] nodes contains an empty name".to_string()));
            }
            if !seen.insert(node.as_str()) {
                return Err(CtsError::Config(format!("[cluster] node '{node}' listed twice")));
            }
        }
        if self.cluster.fence_attempts == 0 {
            return Err(CtsError::Config("[cluster] fence-attempts must be at least 1".to_string()));
        }
        if self.run.iterations == 0 {
            return Err(CtsError::Config("[run] iterations must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The pattern profile this config selects, validated.
    pub fn profile(&self) -> CtsResult<PatternProfile> {
        let profile = match &self.cluster.profile_file {
            Some(path) => PatternProfile::load(path)?,
            None => PatternProfile::builtin(&self.cluster.stack)?,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn cluster_env(&self) -> ClusterEnv {
        let mut env = ClusterEnv::new(
            self.cluster.nodes.iter().cloned(),
            self.cluster.our_node.as_deref().unwrap_or("localhost"),
        );
        env.do_fencing = self.cluster.do_fencing;
        env.do_standby = self.cluster.do_standby;
        env.fence_attempts = self.cluster.fence_attempts;
        env
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
