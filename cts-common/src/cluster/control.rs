//! Node action surface and its SSH implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::exec::{CommandResult, exec_with_timeout};
use crate::errors::{CtsError, CtsResult};
use crate::profile::{Action, PatternProfile, render_command};

/// Side-effecting triggers for node transitions.
///
/// None of these wait for the transition to be observed; evidence is
/// gathered by a log watcher armed beforehand.
pub trait NodeControl: Send {
    /// Start the cluster stack on `node`.
    fn start(&mut self, node: &str) -> CtsResult<()>;

    /// Stop the cluster stack on `node`.
    fn stop(&mut self, node: &str) -> CtsResult<()>;

    /// One fencing attempt (power-cycle/reset) against `node`.
    fn reset(&mut self, node: &str) -> CtsResult<()>;

    /// Run an arbitrary command on `node`.
    fn run_remote(&mut self, node: &str, command: &str) -> CtsResult<CommandResult>;
}

/// How to reach cluster nodes over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SshOptions {
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    #[serde(with = "crate::util::humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "crate::util::humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: None,
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(120),
        }
    }
}

impl SshOptions {
    /// Arguments for `ssh` running `command` on `node`.
    pub fn args(&self, node: &str, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        if let Some(user) = &self.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        args.push(node.to_string());
        args.push(command.to_string());
        args
    }
}

/// Drives real nodes: profile commands over `ssh`, fencing via a local
/// reset command.
#[derive(Debug, Clone)]
pub struct SshControl {
    profile: Arc<PatternProfile>,
    ssh: SshOptions,
    reset_command: Option<String>,
}

impl SshControl {
    pub fn new(profile: Arc<PatternProfile>, ssh: SshOptions) -> Self {
        Self {
            profile,
            ssh,
            reset_command: None,
        }
    }

    /// Local command used to fence a node; `%s` is replaced by the node id.
    pub fn with_reset_command(mut self, command: impl Into<String>) -> Self {
        self.reset_command = Some(command.into());
        self
    }

    fn run_required(&mut self, node: &str, action: Action) -> CtsResult<()> {
        let command = self.profile.render_command(action, node)?;
        let result = self.run_remote(node, &command)?;
        if result.timed_out() {
            return Err(CtsError::CommandTimeout {
                command,
                after: self.ssh.command_timeout,
            });
        }
        if !result.success() {
            return Err(CtsError::RemoteCommand {
                node: node.to_string(),
                command,
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok(())
    }
}

impl NodeControl for SshControl {
    fn start(&mut self, node: &str) -> CtsResult<()> {
        self.run_required(node, Action::Start)
    }

    fn stop(&mut self, node: &str) -> CtsResult<()> {
        self.run_required(node, Action::Stop)
    }

    fn reset(&mut self, node: &str) -> CtsResult<()> {
        let template = self
            .reset_command
            .as_deref()
            .ok_or_else(|| CtsError::Config("no reset command configured".to_string()))?;
        let command = render_command(template, node);
        info!(node, command = %command, "Resetting node");
        let result = exec_with_timeout("sh", ["-c", command.as_str()], self.ssh.command_timeout)?;
        if result.success() {
            Ok(())
        } else {
            Err(CtsError::RemoteCommand {
                node: node.to_string(),
                command,
                exit_code: result.exit_code,
                stderr: result.stderr,
            })
        }
    }

    fn run_remote(&mut self, node: &str, command: &str) -> CtsResult<CommandResult> {
        exec_with_timeout("ssh", self.ssh.args(node, command), self.ssh.command_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_args_minimal() {
        let args = SshOptions::default().args("node1", "crm_node -q");
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "node1",
                "crm_node -q"
            ]
        );
    }

    #[test]
    fn test_ssh_args_with_user_and_identity() {
        let options = SshOptions {
            user: Some("root".to_string()),
            identity_file: Some(PathBuf::from("/root/.ssh/cts")),
            ..SshOptions::default()
        };
        let args = options.args("node2", "true");
        let joined = args.join(" ");
        assert!(joined.contains("-i /root/.ssh/cts"));
        assert!(joined.contains("-l root"));
        assert!(joined.ends_with("node2 true"));
    }

    #[test]
    fn test_reset_without_command_is_config_error() {
        let mut control = SshControl::new(
            Arc::new(PatternProfile::crm_ais()),
            SshOptions::default(),
        );
        assert!(matches!(control.reset("node1"), Err(CtsError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_reset_runs_local_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("fenced");
        let mut control = SshControl::new(
            Arc::new(PatternProfile::crm_ais()),
            SshOptions::default(),
        )
        .with_reset_command(format!("echo %s > {}", marker.display()));

        control.reset("node3").unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "node3");
    }

    #[cfg(unix)]
    #[test]
    fn test_reset_failure_is_reported() {
        let mut control = SshControl::new(
            Arc::new(PatternProfile::crm_ais()),
            SshOptions::default(),
        )
        .with_reset_command("exit 1");
        assert!(matches!(
            control.reset("node1"),
            Err(CtsError::RemoteCommand { exit_code: 1, .. })
        ));
    }
}
