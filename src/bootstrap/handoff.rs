//! Application handoff
//!
//! On Unix the application replaces the bootstrap process, so it inherits the
//! PID the container runtime supervises.

use std::process::Command;

use log::info;

use crate::common::{BootstrapError, Result};

/// Application command line given after `--`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AppCommand {
    /// Build from a raw argument vector; an empty vector means no application
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self { program: program.clone(), args: args.to_vec() })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// Start the application in place of this process
///
/// Returns `Ok(())` only when there is no application to start. A successful
/// exec never returns.
pub fn hand_off(app: Option<&AppCommand>) -> Result<()> {
    let Some(app) = app else {
        info!("No application command given; bootstrap complete");
        return Ok(());
    };

    info!("Handing off to application: {}", app.program);
    exec(app)
}

#[cfg(unix)]
fn exec(app: &AppCommand) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let err = app.command().exec();
    Err(BootstrapError::Handoff(format!("failed to exec {}: {}", app.program, err)))
}

#[cfg(not(unix))]
fn exec(app: &AppCommand) -> Result<()> {
    let status = app
        .command()
        .status()
        .map_err(|e| BootstrapError::Handoff(format!("failed to start {}: {}", app.program, e)))?;
    std::process::exit(status.code().unwrap_or(1));
}
