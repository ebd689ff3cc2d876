//! Pattern profiles.
//!
//! A profile parameterizes the engine for one cluster stack: the regex
//! templates that count as evidence for each transition, the commands that
//! trigger transitions, and the noisy/bad regex lists handed to the audit
//! layer. Templates use `%s` for the node id.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CtsError, CtsResult};
use crate::watch::WatchPattern;

/// Symbolic log events a scenario can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Event {
    SelfStopped,
    PeerStopped,
    AllStopped,
    PeerDead,
    SelfStarted,
    PeerStarted,
    StandbyOk,
    StandbyNone,
    StandbyTransient,
}

impl Event {
    pub const ALL: [Event; 9] = [
        Event::SelfStopped,
        Event::PeerStopped,
        Event::AllStopped,
        Event::PeerDead,
        Event::SelfStarted,
        Event::PeerStarted,
        Event::StandbyOk,
        Event::StandbyNone,
        Event::StandbyTransient,
    ];
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SelfStopped => "self-stopped",
            Self::PeerStopped => "peer-stopped",
            Self::AllStopped => "all-stopped",
            Self::PeerDead => "peer-dead",
            Self::SelfStarted => "self-started",
            Self::PeerStarted => "peer-started",
            Self::StandbyOk => "standby-ok",
            Self::StandbyNone => "standby-none",
            Self::StandbyTransient => "standby-transient",
        };
        write!(f, "{label}")
    }
}

/// Symbolic commands a profile can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Start,
    Stop,
    Standby,
    QueryUuid,
    QueryQuorum,
    QueryEpoch,
    QueryPartition,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Standby => "standby",
            Self::QueryUuid => "query-uuid",
            Self::QueryQuorum => "query-quorum",
            Self::QueryEpoch => "query-epoch",
            Self::QueryPartition => "query-partition",
        };
        write!(f, "{label}")
    }
}

/// Regex templates keyed by event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PatternSet {
    pub self_stopped: Option<String>,
    pub peer_stopped: Option<String>,
    pub all_stopped: Option<String>,
    pub peer_dead: Option<String>,
    pub self_started: Option<String>,
    pub peer_started: Option<String>,
    pub standby_ok: Option<String>,
    pub standby_none: Option<String>,
    pub standby_transient: Option<String>,
}

impl PatternSet {
    pub fn get(&self, event: Event) -> Option<&str> {
        let slot = match event {
            Event::SelfStopped => &self.self_stopped,
            Event::PeerStopped => &self.peer_stopped,
            Event::AllStopped => &self.all_stopped,
            Event::PeerDead => &self.peer_dead,
            Event::SelfStarted => &self.self_started,
            Event::PeerStarted => &self.peer_started,
            Event::StandbyOk => &self.standby_ok,
            Event::StandbyNone => &self.standby_none,
            Event::StandbyTransient => &self.standby_transient,
        };
        slot.as_deref()
    }
}

/// Command lines keyed by action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandSet {
    pub start: Option<String>,
    pub stop: Option<String>,
    pub standby: Option<String>,
    pub query_uuid: Option<String>,
    pub query_quorum: Option<String>,
    pub query_epoch: Option<String>,
    pub query_partition: Option<String>,
}

impl CommandSet {
    pub fn get(&self, action: Action) -> Option<&str> {
        let slot = match action {
            Action::Start => &self.start,
            Action::Stop => &self.stop,
            Action::Standby => &self.standby,
            Action::QueryUuid => &self.query_uuid,
            Action::QueryQuorum => &self.query_quorum,
            Action::QueryEpoch => &self.query_epoch,
            Action::QueryPartition => &self.query_partition,
        };
        slot.as_deref()
    }
}

/// Everything the engine needs to know about one cluster stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PatternProfile {
    pub name: String,
    #[serde(default)]
    pub patterns: PatternSet,
    #[serde(default)]
    pub commands: CommandSet,
    /// Known noisy lines the audit layer should ignore.
    #[serde(default)]
    pub ignore_regexes: Vec<String>,
    /// Lines that must never occur during a run.
    #[serde(default)]
    pub bad_regexes: Vec<String>,
}

/// Names accepted by [`PatternProfile::builtin`].
pub const BUILTIN_PROFILES: [&str; 2] = ["crm-ais", "simulated"];

const INIT_DIR: &str = "/etc/init.d";

impl PatternProfile {
    /// Look up a built-in profile by name.
    pub fn builtin(name: &str) -> CtsResult<Self> {
        match name {
            "crm-ais" => Ok(Self::crm_ais()),
            "simulated" => Ok(Self::simulated()),
            other => Err(CtsError::UnknownProfile(other.to_string())),
        }
    }

    /// The CRM running on top of openais.
    pub fn crm_ais() -> Self {
        let s = |v: &str| Some(v.to_string());
        Self {
            name: "crm-ais".to_string(),
            patterns: PatternSet {
                self_stopped: s("%s.*openais.*pcmk_shutdown: Shutdown complete"),
                peer_stopped: s("crmd:.*Node %s: .* state=lost .new"),
                all_stopped: s("%s.*openais.*pcmk_shutdown: Shutdown complete"),
                peer_dead: s("openais:.*Node %s is now: lost"),
                self_started: s("%s crmd:.* State transition .* -> S_IDLE"),
                peer_started: s("%s crmd:.* State transition .* -> S_NOT_DC"),
                standby_ok: s("Standby resource acquisition done"),
                standby_none: s("No reply to standby request\\.  Standby request cancelled\\."),
                standby_transient: s("standby message ignored\\..*transient state"),
            },
            commands: CommandSet {
                start: Some(format!("{INIT_DIR}/openais start > /dev/null 2>&1")),
                stop: Some(format!("{INIT_DIR}/openais stop > /dev/null 2>&1")),
                standby: s("crm_standby -U %s -v on"),
                query_uuid: s("crmadmin -N"),
                query_quorum: s("crm_node -q"),
                query_epoch: s("crm_node -e"),
                query_partition: s("crm_node -p"),
            },
            ignore_regexes: [
                "crm_mon:",
                "crmadmin:",
                "async_notify: strange, client not found",
                "ERROR: Message hist queue is filling up",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            bad_regexes: [
                r"ERROR:",
                r"CRIT:",
                r"Shutting down\.",
                r"Forcing shutdown\.",
                r"Timer I_TERMINATE just popped",
                r"input=I_ERROR",
                r"input=I_FAIL",
                r"input=I_INTEGRATED cause=C_TIMER_POPPED",
                r"input=I_FINALIZED cause=C_TIMER_POPPED",
                r", exiting\.",
                r"WARN.*Ignoring HA message.*vote.*not in our membership list",
                r"pengine.*Attempting recovery of resource",
                r"is taking more than 2x its timeout",
                r"Confirm not received from",
                r"Welcome reply not received from",
                r"Attempting to schedule .* after a stop",
                r"Resource .* was active at shutdown",
                r"duplicate entries for call_id",
                r"Search terminated:",
                r"No need to invoke the TE",
                r":global_timer_callback",
                r"Faking parameter digest creation",
                r"Parameters to .* action changed:",
                r"Parameters to .* changed",
                r"Child process .* terminated with signal 11",
                r"Executing .* fencing operation",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    /// Matches the lines written by [`crate::sim::SimulatedCluster`].
    pub fn simulated() -> Self {
        let s = |v: &str| Some(v.to_string());
        Self {
            name: "simulated".to_string(),
            patterns: PatternSet {
                self_stopped: s("^%s cts-sim: local shutdown complete$"),
                peer_stopped: s("cts-sim: peer %s left the membership$"),
                all_stopped: s("^%s cts-sim: shutdown complete, membership empty$"),
                peer_dead: s("cts-sim: peer %s is now lost$"),
                self_started: s("^%s cts-sim: local startup complete$"),
                peer_started: s("cts-sim: peer %s joined the membership$"),
                standby_ok: s("^%s cts-sim: standby request complete$"),
                standby_none: s("^%s cts-sim: standby refused, no peer available$"),
                standby_transient: s("^%s cts-sim: standby deferred, resources in transition$"),
            },
            commands: CommandSet {
                start: s("cts-sim start %s"),
                stop: s("cts-sim stop %s"),
                standby: s("cts-sim standby %s"),
                query_uuid: s("cts-sim uuid"),
                query_quorum: s("cts-sim quorum"),
                query_epoch: None,
                query_partition: None,
            },
            ignore_regexes: Vec::new(),
            bad_regexes: vec![r"cts-sim: .*split brain".to_string()],
        }
    }

    /// Parse a profile from TOML text.
    pub fn from_toml_str(text: &str) -> CtsResult<Self> {
        let profile: Self = toml::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> CtsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The raw template for `event`.
    pub fn template(&self, event: Event) -> CtsResult<&str> {
        self.patterns
            .get(event)
            .ok_or_else(|| CtsError::MissingPattern {
                profile: self.name.clone(),
                event,
            })
    }

    /// Compile the pattern for `event` about `node`.
    ///
    /// Each `%s` becomes a capture group holding the escaped node id, so the
    /// match reports which node it was about.
    pub fn pattern(&self, event: Event, node: &str) -> CtsResult<WatchPattern> {
        let text = render_pattern(self.template(event)?, node);
        WatchPattern::named(event.to_string(), text)
    }

    pub fn has_command(&self, action: Action) -> bool {
        self.commands.get(action).is_some()
    }

    pub fn command(&self, action: Action) -> CtsResult<&str> {
        self.commands
            .get(action)
            .ok_or_else(|| CtsError::MissingCommand {
                profile: self.name.clone(),
                action,
            })
    }

    /// Command line for `action` with `%s` replaced by the shell-escaped node.
    pub fn render_command(&self, action: Action, node: &str) -> CtsResult<String> {
        Ok(render_command(self.command(action)?, node))
    }

    /// The id cluster tools expect for `node`. The AIS stack names nodes by
    /// uname.
    pub fn node_uuid(&self, node: &str) -> String {
        node.to_string()
    }

    /// Check that every template and regex list compiles.
    pub fn validate(&self) -> CtsResult<()> {
        for event in Event::ALL {
            if self.patterns.get(event).is_some() {
                self.pattern(event, "node")?;
            }
        }
        for (idx, text) in self.ignore_regexes.iter().enumerate() {
            WatchPattern::named(format!("ignore[{idx}]"), text.clone())?;
        }
        for (idx, text) in self.bad_regexes.iter().enumerate() {
            WatchPattern::named(format!("bad[{idx}]"), text.clone())?;
        }
        Ok(())
    }
}

/// Substitute `node` into a regex template, one capture group per `%s`.
pub fn render_pattern(template: &str, node: &str) -> String {
    template.replace("%s", &format!("({})", regex::escape(node)))
}

/// Substitute `node` into a command template, shell-escaped.
pub fn render_command(template: &str, node: &str) -> String {
    let escaped = shell_escape::escape(node.into());
    template.replace("%s", &escaped)
}
