//! Cluster Test Suite
//!
//! Drives a high-availability cluster through start, stop, fence and standby
//! transitions and checks the cluster log for the evidence each one should
//! leave behind.

#![forbid(unsafe_code)]

mod report;
mod setup;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cts_common::driver::{self, RunOptions};
use cts_common::profile::BUILTIN_PROFILES;
use cts_common::{
    FileLogSource, LogConfig, LogWatcher, PatternProfile, ScenarioRegistry, WatchPattern,
    init_logging,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "cts")]
#[command(author, version, about = "Cluster Test Suite - fault injection for HA clusters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run randomly chosen scenarios against the cluster
    Run {
        /// Config file (default: ~/.config/cts/config.toml if present)
        #[arg(short, long, env = "CTS_CONFIG")]
        config: Option<PathBuf>,

        /// Number of scenario invocations
        #[arg(short, long)]
        iterations: Option<u32>,

        /// Seed for node and scenario selection
        #[arg(long)]
        seed: Option<u64>,

        /// Run against the in-process simulator instead of real nodes
        #[arg(long)]
        simulate: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the scenarios applicable to the configured cluster
    List {
        #[arg(short, long, env = "CTS_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long)]
        simulate: bool,
    },

    /// Show a built-in pattern profile
    Profile {
        /// Profile name
        #[arg(default_value = "crm-ais")]
        name: String,

        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Wait for a line matching any pattern to be appended to a log file
    Watch {
        /// Log file to tail
        #[arg(short, long)]
        log: PathBuf,

        /// Regex to wait for (repeatable)
        #[arg(short, long = "pattern", required = true)]
        patterns: Vec<String>,

        /// How long to wait
        #[arg(short, long, default_value = "60s")]
        timeout: humantime::Duration,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    match cli.command {
        Commands::Run {
            config,
            iterations,
            seed,
            simulate,
            json,
        } => {
            let mut config = setup::load_config(config.as_deref(), simulate)?;
            if let Some(iterations) = iterations {
                if iterations == 0 {
                    bail!("--iterations must be at least 1");
                }
                config.run.iterations = iterations;
            }
            if seed.is_some() {
                config.run.seed = seed;
            }

            let mut cm = setup::build_manager(&config, simulate)?;
            let scenarios = ScenarioRegistry::standard().applicable(&cm);
            info!(
                scenarios = ?scenarios.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
                iterations = config.run.iterations,
                "Starting run"
            );
            let report = driver::run(
                &mut cm,
                scenarios,
                RunOptions {
                    iterations: config.run.iterations,
                    initial_status: config.cluster.initial_status,
                    boot: config.run.boot,
                },
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report::render(&report));
            }
            Ok(exit_code(report.success()))
        }

        Commands::List { config, simulate } => {
            let config = setup::load_config(config.as_deref(), simulate)?;
            let cm = setup::build_manager(&config, simulate)?;
            for scenario in ScenarioRegistry::standard().applicable(&cm) {
                println!("{}", scenario.name());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Profile { name, json } => {
            let profile = PatternProfile::builtin(&name).with_context(|| {
                format!("Known profiles: {}", BUILTIN_PROFILES.join(", "))
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                print!("{}", toml::to_string_pretty(&profile)?);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Watch {
            log,
            patterns,
            timeout,
        } => {
            let patterns = patterns
                .into_iter()
                .map(WatchPattern::new)
                .collect::<Result<Vec<_>, _>>()?;
            let source = Arc::new(FileLogSource::new(&log));
            let mut watcher = LogWatcher::armed(source, patterns, *timeout)
                .with_context(|| format!("Failed to watch {}", log.display()))?;
            info!(log = %log.display(), timeout = %timeout, "Waiting for a matching line");

            match watcher.wait()? {
                Some(found) => {
                    println!("{}", found.line);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("No matching line within {timeout}");
                    Ok(exit_code(false))
                }
            }
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
