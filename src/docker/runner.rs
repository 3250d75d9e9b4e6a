//! External command execution.
//!
//! Everything the crate knows about Docker it learns by running `docker`,
//! `docker-compose` or `wsl` and looking at the exit code and captured output.
//! The [`CommandRunner`] trait is the seam that lets tests answer those
//! invocations from a script instead of spawning real processes.
//!
//! No timeout is applied: a hung child hangs the awaiting operation.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::debug;

// ---------------------------------------------------------------------------
// Command description
// ---------------------------------------------------------------------------

/// A single external command: program, arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command from `dir` instead of the process's current directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output and errors
// ---------------------------------------------------------------------------

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Turn a non-zero exit into [`CommandError::NonZeroExit`].
    pub fn check(self, command: &CommandLine) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::NonZeroExit {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr_text().trim().to_string(),
            })
        }
    }
}

/// Why an external command did not produce a usable result.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The executable could not be started (missing from PATH, permissions, ...).
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but reported failure.
    #[error("`{command}` exited with {}: {stderr}", describe_code(.code))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Anything else that went wrong while running the command.
    #[error("unexpected failure running `{command}`: {message}")]
    Unexpected { command: String, message: String },
}

impl CommandError {
    /// `true` when the executable could not be started at all.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, CommandError::Launch { .. })
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Runner trait
// ---------------------------------------------------------------------------

/// Runs external commands to completion and captures their output.
pub trait CommandRunner: Send + Sync + 'static {
    /// Run `command`, wait for it to exit and return what it printed.
    ///
    /// A non-zero exit is NOT an error at this level; callers decide what a
    /// failure means for them (see [`ProcessOutput::check`]).
    fn run(
        &self,
        command: &CommandLine,
    ) -> impl Future<Output = Result<ProcessOutput, CommandError>> + Send;
}

/// Spawns real processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<ProcessOutput, CommandError> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(command = %command, "running external command");

        let output = cmd.output().await.map_err(|source| CommandError::Launch {
            command: command.to_string(),
            source,
        })?;

        debug!(
            command = %command,
            exit_status = ?output.status,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "external command finished"
        );

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
