//! Error type for the CTS engine.
//!
//! Scenario outcomes are never errors: a failed scenario is reported through
//! [`crate::scenario::Outcome`]. `CtsError` covers the plumbing underneath
//! (log sources, remote transport, configuration, profile compilation).

use std::path::PathBuf;
use std::time::Duration;

use crate::profile::{Action, Event};

/// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum CtsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid regex for {name}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Profile {profile} has no pattern for event {event}")]
    MissingPattern { profile: String, event: Event },

    #[error("Profile {profile} has no command for action {action}")]
    MissingCommand { profile: String, action: Action },

    #[error("Unknown pattern profile: {0}")]
    UnknownProfile(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Command on {node} exited with status {exit_code}: {command}")]
    RemoteCommand {
        node: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Command timed out after {after:?}: {command}")]
    CommandTimeout { command: String, after: Duration },

    #[error("Log watcher waited before it was armed")]
    WatcherNotArmed,

    #[error("Log source {path} is unreadable: {source}")]
    LogSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for engine operations
pub type CtsResult<T> = Result<T, CtsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_command_display_names_node_and_status() {
        let err = CtsError::RemoteCommand {
            node: "node2".to_string(),
            command: "/etc/init.d/openais start".to_string(),
            exit_code: 3,
            stderr: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("node2"));
        assert!(msg.contains("status 3"));
    }

    #[test]
    fn test_missing_command_display() {
        let err = CtsError::MissingCommand {
            profile: "crm-ais".to_string(),
            action: Action::Standby,
        };
        assert_eq!(
            err.to_string(),
            "Profile crm-ais has no command for action standby"
        );
    }
}
