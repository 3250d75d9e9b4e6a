//! Shared test doubles.
//!
//! `ScriptedRunner` answers external commands from a table keyed by the
//! command line as displayed (`docker-compose ps -q macos`), records every
//! invocation, and can hold a command until the test releases it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use macdock::docker::runner::{CommandError, CommandLine, CommandRunner, ProcessOutput};

#[derive(Debug, Clone)]
pub enum Reply {
    Exit {
        code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    LaunchFailure,
    Unexpected(String),
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Exit {
            code: 0,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    pub fn ok_bytes(stdout: Vec<u8>) -> Self {
        Reply::Exit {
            code: 0,
            stdout,
            stderr: Vec::new(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Reply::Exit {
            code,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn into_result(self, command: &str) -> Result<ProcessOutput, CommandError> {
        match self {
            Reply::Exit {
                code,
                stdout,
                stderr,
            } => Ok(ProcessOutput {
                code: Some(code),
                stdout,
                stderr,
            }),
            Reply::LaunchFailure => Err(CommandError::Launch {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            Reply::Unexpected(message) => Err(CommandError::Unexpected {
                command: command.to_string(),
                message,
            }),
        }
    }
}

#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<CommandLine>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `reply`. Unscripted commands exit 0 silently.
    pub fn on(self, command: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), reply);
        self
    }

    /// Make `command` wait until the returned `Notify` is signalled.
    pub fn hold(&self, command: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(command.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn call_lines(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.calls().iter().any(|c| c == command)
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine) -> Result<ProcessOutput, CommandError> {
        let key = command.to_string();
        self.calls.lock().unwrap().push(command.clone());

        let gate = self.gates.lock().unwrap().get(&key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Reply::ok(""));
        reply.into_result(&key)
    }
}

/// `Arc` wrapper so a test can keep inspecting the runner after handing it
/// to a controller.
#[derive(Clone)]
pub struct SharedRunner(pub Arc<ScriptedRunner>);

impl CommandRunner for SharedRunner {
    async fn run(&self, command: &CommandLine) -> Result<ProcessOutput, CommandError> {
        self.0.run(command).await
    }
}
