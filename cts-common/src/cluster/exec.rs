//! Command execution with output capture and a hard timeout.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::errors::CtsResult;

/// Exit code reported for a command killed after its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Result of a command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if the command succeeded (exit code 0)
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Run `program` with `args`, killing it once `timeout` elapses.
///
/// A killed command reports exit code 124 and a note on stderr. Spawn
/// failures are returned as errors; non-zero exits are not.
pub fn exec_with_timeout<I, S>(program: &str, args: I, timeout: Duration) -> CtsResult<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().collect();
    let args_display: Vec<_> = args.iter().map(|s| s.as_ref().to_string_lossy()).collect();
    debug!("Executing: {} {}", program, args_display.join(" "));

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout_handle = child
        .stdout
        .take()
        .map(|mut stdout| thread::spawn(move || read_to_string(&mut stdout)));
    let stderr_handle = child
        .stderr
        .take()
        .map(|mut stderr| thread::spawn(move || read_to_string(&mut stderr)));

    let mut timed_out = false;
    let exit_status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }

        if start.elapsed() >= timeout {
            timed_out = true;
            let _ = child.kill();
            break child.wait().ok();
        }

        thread::sleep(Duration::from_millis(10));
    };

    let duration = start.elapsed();
    let stdout = join_output(stdout_handle);
    let mut stderr = join_output(stderr_handle);
    if timed_out {
        if !stderr.is_empty() {
            stderr.push('\n');
        }
        stderr.push_str(&format!("Process timed out after {:?}.", timeout));
        warn!(program, ?timeout, "Command killed after timeout");
    }

    let exit_code = exit_status
        .and_then(|status| status.code())
        .unwrap_or(if timed_out { TIMEOUT_EXIT_CODE } else { -1 });

    for line in stdout.lines() {
        trace!(target: "cts::exec", program, "{line}");
    }
    for line in stderr.lines() {
        trace!(target: "cts::exec", program, stream = "stderr", "{line}");
    }
    debug!(
        program,
        exit_code,
        duration_ms = duration.as_millis() as u64,
        timed_out,
        "Command completed"
    );

    Ok(CommandResult {
        exit_code,
        stdout,
        stderr,
        duration,
    })
}

fn read_to_string<R: Read>(reader: &mut R) -> String {
    let mut buffer = Vec::new();
    if reader.read_to_end(&mut buffer).is_ok() {
        String::from_utf8_lossy(&buffer).to_string()
    } else {
        String::new()
    }
}

fn join_output(handle: Option<thread::JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.join().unwrap_or_default(),
        None => String::new(),
    }
}
