//! External command execution
//!
//! Packet-filter changes go through `iptables`. The [`CommandRunner`] seam
//! lets the installer run against a simulated rule table in tests.

use std::process::Command;
use log::debug;

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status 0
    pub success: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a successful command with empty streams
    pub fn ok() -> Self {
        Self { success: true, stdout: String::new(), stderr: String::new() }
    }

    /// Output of a failed command
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.into() }
    }
}

/// Runs external programs
pub trait CommandRunner {
    /// Run `program` with `args`, waiting for it to finish
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Runner that spawns real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        debug!("Running: {}", display_command(program, args));

        let output = Command::new(program).args(args).output()?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Render a command line for logs and error messages
pub fn display_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
