//! Narrow seam around external command-line programs.
//!
//! [`SystemTool`] runs a real binary with a bounded execution time; tests
//! substitute their own [`ExternalTool`] implementations.

use std::ffi::OsString;
use std::io::{self, ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ProcessingError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stderr followed by stdout, lossily decoded, for diagnostics.
    pub fn diagnostics(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stdout = std::str::from_utf8(&self.stdout).unwrap_or("");
        [stderr.trim(), stdout.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn describe_status(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "was terminated by a signal".to_string(),
        }
    }
}

pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &str;

    /// Presence probe, run once at startup.
    fn is_available(&self) -> bool;

    /// Run with already-validated arguments. The program is never given a
    /// shell, so arguments are passed verbatim.
    fn run(&self, args: &[OsString]) -> Result<ToolOutput, ProcessingError>;
}

pub struct SystemTool {
    program: String,
    timeout: Duration,
}

impl SystemTool {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl ExternalTool for SystemTool {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn run(&self, args: &[OsString]) -> Result<ToolOutput, ProcessingError> {
        log::debug!("Running {} with {} argument(s)", self.program, args.len());

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ProcessingError::ToolMissing {
                    tool: self.program.clone(),
                },
                _ => ProcessingError::ToolExecutionFailed {
                    tool: self.program.clone(),
                    reason: "could not be started".to_string(),
                    output: e.to_string(),
                },
            })?;

        // Drain both pipes concurrently so a chatty tool cannot block on a full pipe
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.timeout);

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        let status = status?;

        match status {
            Some(exit_code) => Ok(ToolOutput {
                stdout,
                stderr,
                exit_code,
            }),
            None => Err(ProcessingError::ToolExecutionFailed {
                tool: self.program.clone(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
                output: String::from_utf8_lossy(&stderr).trim().to_string(),
            }),
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                log::debug!("Failed to read tool output: {e}");
            }
        }
        buf
    })
}

/// What the deadline loop needs from a running process.
trait Reapable {
    /// `Some(exit code)` once exited; the code is `None` after a signal.
    fn poll_exit(&mut self) -> io::Result<Option<Option<i32>>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<()>;
}

impl Reapable for Child {
    fn poll_exit(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(self.try_wait()?.map(|status| status.code()))
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<()> {
        Child::wait(self).map(|_| ())
    }
}

/// `Ok(Some(code))` when the child exited, `Ok(None)` when it was killed
/// for exceeding `timeout`. The child is reaped on every non-exit path.
fn wait_with_deadline<P: Reapable>(
    child: &mut P,
    timeout: Duration,
) -> Result<Option<Option<i32>>, ProcessingError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.poll_exit() {
            Ok(Some(code)) => return Ok(Some(code)),
            Ok(None) => {}
            Err(e) => {
                reap(child);
                return Err(e.into());
            }
        }
        if Instant::now() >= deadline {
            log::warn!("External tool exceeded {}s, killing it", timeout.as_secs());
            reap(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn reap<P: Reapable>(child: &mut P) {
    if let Err(e) = child.kill() {
        log::debug!("Failed to kill external tool: {e}");
    }
    if let Err(e) = child.wait() {
        log::warn!("Failed to reap external tool: {e}");
    }
}
