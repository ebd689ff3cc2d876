//! Cluster Test Suite engine.
//!
//! Drives a cluster through start, stop, fence and standby transitions and
//! checks each one against evidence in the cluster log:
//!
//! - [`profile`]: stack-specific evidence patterns and commands
//! - [`watch`]: arm-then-wait log watchers over file or in-memory sources
//! - [`cluster`]: expected node status and the node action surface
//! - [`scenario`]: the fault-injection scenarios themselves
//! - [`registry`] and [`driver`]: scenario selection and the run loop
//! - [`sim`]: an in-process cluster for dry runs and tests

pub mod cluster;
pub mod config;
pub mod driver;
pub mod errors;
pub mod logging;
pub mod profile;
pub mod registry;
pub mod scenario;
pub mod sim;
pub mod testing;
pub mod util;
pub mod watch;

pub use cluster::{ClusterEnv, ClusterManager, NodeControl, NodeStatus, SshControl, SshOptions, Timings};
pub use config::CtsConfig;
pub use driver::{RunOptions, RunReport};
pub use errors::{CtsError, CtsResult};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use profile::{Action, Event, PatternProfile};
pub use registry::{ScenarioFactory, ScenarioRegistry};
pub use scenario::{Outcome, Scenario, Stats};
pub use sim::{SimFaults, SimulatedCluster};
pub use watch::{FileLogSource, LogSource, LogWatcher, MemoryLog, WatchMatch, WatchPattern};
