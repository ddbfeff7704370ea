//! Command runner abstraction for executing shell commands.
//!
//! `CommandRunner` is what `LocalHost` uses to reach package managers,
//! `update-alternatives` and guard predicates. `ShellRunner` spawns `sh -c`;
//! `MockRunner` records calls and returns preset responses.

use std::cell::RefCell;
use std::process::Command;

use log::debug;

use crate::error::CommandError;

/// Trait for executing shell command strings.
pub trait CommandRunner {
    /// Run `cmd`, returning stdout on a zero exit status.
    fn run(&self, cmd: &str) -> Result<String, CommandError>;
}

/// Production runner that spawns `sh -c <cmd>`.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, cmd: &str) -> Result<String, CommandError> {
        debug!("exec: {}", cmd);
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .map_err(|e| CommandError::Spawn {
                command: cmd.to_string(),
                source: e,
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(CommandError::Failed {
                command: cmd.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

/// Test-double runner that records commands and returns pre-configured
/// responses in order. `Err(stderr)` responses become exit status 1.
pub struct MockRunner {
    responses: RefCell<Vec<Result<String, String>>>,
    commands: RefCell<Vec<String>>,
}

impl MockRunner {
    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        MockRunner {
            responses: RefCell::new(reversed),
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn new() -> Self {
        MockRunner {
            responses: RefCell::new(Vec::new()),
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &str) -> Result<String, CommandError> {
        self.commands.borrow_mut().push(cmd.to_string());
        match self.responses.borrow_mut().pop() {
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err(stderr)) => Err(CommandError::Failed {
                command: cmd.to_string(),
                status: Some(1),
                stderr,
            }),
            None => Ok(String::new()),
        }
    }
}
