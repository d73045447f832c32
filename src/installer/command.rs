// Author: Dustin Pilgrim
// License: MIT

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

/// Set by the SIGINT handler; blocking reads poll it so an operator
/// Ctrl-C turns into a clean cancellation instead of a kill.
static INTERRUPTED: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(false)));

pub fn install_interrupt_handler() -> Result<(), ctrlc::Error> {
    let flag = Arc::clone(&INTERRUPTED);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
}

/// Shared handle to the interrupt flag, for anything that blocks.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    Arc::clone(&INTERRUPTED)
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

#[cfg(test)]
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Outcome of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    pub success: bool,
    /// Signal that terminated the command, if any.
    pub signal: Option<i32>,
}

impl CommandStatus {
    /// Whether the command died from the cancellation signal. Must be
    /// told apart from an ordinary nonzero exit: an interrupt cancels
    /// the whole run, a failure is handled by the current step.
    pub fn interrupted(&self) -> bool {
        self.signal == Some(libc::SIGINT)
    }
}

/// External command execution, synchronous and blocking. A trait so the
/// workflow tests can script outcomes without spawning anything.
pub trait Exec {
    fn run(&self, command: &str, env: &[(String, String)]) -> io::Result<CommandStatus>;
}

/// Runs commands through `sh -c`, inheriting the installer's stdio so
/// the operator sees the tool output directly.
pub struct ShellExec;

impl Exec for ShellExec {
    fn run(&self, command: &str, env: &[(String, String)]) -> io::Result<CommandStatus> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .status()?;

        Ok(CommandStatus {
            success: status.success(),
            signal: status.signal(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigint_is_classified_as_interrupt() {
        let killed = CommandStatus {
            success: false,
            signal: Some(libc::SIGINT),
        };
        assert!(killed.interrupted());

        let failed = CommandStatus {
            success: false,
            signal: None,
        };
        assert!(!failed.interrupted());

        let terminated = CommandStatus {
            success: false,
            signal: Some(libc::SIGTERM),
        };
        assert!(!terminated.interrupted());
    }
}
