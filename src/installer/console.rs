// Author: Dustin Pilgrim
// License: MIT

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use super::Halt;
use super::command;

/// How often blocking reads wake up to honor a pending Ctrl-C.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const RED: &str = "\x1b[1;31m";
pub const GREEN: &str = "\x1b[1;32m";
pub const YELLOW: &str = "\x1b[1;33m";
pub const BANNER: &str = "\x1b[1;33;44m";

/// Outcome of a prompt validator.
pub enum Validation {
    Accept,
    Reject(String),
}

/// Operator-facing terminal: output with optional colors, a stderr
/// redirection scope, and blocking prompts with a retry contract.
///
/// Input lines arrive through a reader thread so a wait can be given a
/// bounded timeout without losing the stream.
pub struct Console {
    lines: Receiver<io::Result<Option<String>>>,
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    to_stderr: bool,
    interactive: bool,
    colors: bool,
    interrupt: Arc<AtomicBool>,
}

impl Console {
    pub fn new(
        input: Box<dyn BufRead + Send>,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
        interactive: bool,
        colors: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut input = input;
            loop {
                let mut line = String::new();
                match input.read_line(&mut line) {
                    Ok(0) => {
                        let _ = tx.send(Ok(None));
                        break;
                    }
                    Ok(_) => {
                        if tx.send(Ok(Some(line))).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Self {
            lines: rx,
            out,
            err,
            to_stderr: false,
            interactive,
            colors,
            interrupt: command::interrupt_flag(),
        }
    }

    #[cfg(test)]
    fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn stdio(interactive: bool) -> Self {
        Self::new(
            Box::new(io::BufReader::new(io::stdin())),
            Box::new(io::stdout()),
            Box::new(io::stderr()),
            interactive,
            atty::is(atty::Stream::Stdout),
        )
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    /// Route `puts`/`print` to stderr for the duration of the block,
    /// restoring stdout afterwards whichever way the block exits.
    pub fn use_stderr<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.to_stderr = true;
        let result = f(self);
        self.to_stderr = false;
        result
    }

    pub fn style(&self, code: &str, text: &str) -> String {
        if self.colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub fn print(&mut self, text: &str) {
        let target: &mut dyn Write = if self.to_stderr { &mut self.err } else { &mut self.out };
        let _ = target.write_all(text.as_bytes());
        let _ = target.flush();
    }

    pub fn puts(&mut self, text: &str) {
        let target: &mut dyn Write = if self.to_stderr { &mut self.err } else { &mut self.out };
        let _ = writeln!(target, "{text}");
        let _ = target.flush();
    }

    pub fn puts_error(&mut self, text: &str) {
        let styled = self.style(RED, text);
        let _ = writeln!(self.err, "{styled}");
        let _ = self.err.flush();
    }

    pub fn puts_bold(&mut self, text: &str) {
        let styled = self.style(BOLD, text);
        self.puts(&styled);
    }

    pub fn puts_red(&mut self, text: &str) {
        let styled = self.style(RED, text);
        self.puts(&styled);
    }

    pub fn puts_green(&mut self, text: &str) {
        let styled = self.style(GREEN, text);
        self.puts(&styled);
    }

    pub fn puts_yellow(&mut self, text: &str) {
        let styled = self.style(YELLOW, text);
        self.puts(&styled);
    }

    pub fn banner(&mut self, text: &str) {
        let styled = self.style(BANNER, text);
        self.puts(&styled);
    }

    pub fn new_screen(&mut self) {
        self.puts("");
        self.line();
        self.puts("");
    }

    pub fn line(&mut self) {
        self.puts("--------------------------------------------");
    }

    /// Reset terminal presentation. Runs unconditionally on the way out
    /// of the workflow.
    pub fn reset_colors(&mut self) {
        if self.colors {
            let _ = self.out.write_all(RESET.as_bytes());
            let _ = self.out.flush();
        }
    }

    /// Blocking line read that polls the interrupt flag, so a Ctrl-C
    /// cancels the read without waiting for the operator to also press
    /// Enter.
    fn read_line(&mut self) -> Result<String, Halt> {
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(Halt::Interrupt);
            }
            match self.lines.recv_timeout(INTERRUPT_POLL) {
                Ok(Ok(Some(line))) => {
                    if self.interrupt.load(Ordering::SeqCst) {
                        return Err(Halt::Interrupt);
                    }
                    return Ok(line.trim().to_string());
                }
                Err(RecvTimeoutError::Timeout) => continue,
                // Closed stdin during a prompt has its own exit code.
                Ok(Ok(None)) | Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(Halt::Eof);
                }
            }
        }
    }

    /// Prompt until the validator accepts. An empty answer takes the
    /// default when there is one, otherwise re-prompts. Non-interactive
    /// mode echoes and returns the default without reading.
    pub fn prompt(
        &mut self,
        message: &str,
        default: Option<&str>,
        mut validate: impl FnMut(&str) -> Validation,
    ) -> Result<String, Halt> {
        loop {
            self.print(&format!("{message}: "));

            if !self.interactive {
                if let Some(value) = default {
                    self.puts(value);
                    return Ok(value.to_string());
                }
            }

            let answer = self.read_line()?;
            if answer.is_empty() {
                match default {
                    Some(value) => return Ok(value.to_string()),
                    None => continue,
                }
            }

            match validate(&answer) {
                Validation::Accept => return Ok(answer),
                Validation::Reject(message) => self.puts_error(&message),
            }
        }
    }

    /// Repeated y/n prompt.
    pub fn confirm(&mut self, message: &str) -> Result<bool, Halt> {
        let answer = self.prompt(&format!("{message} [y/n]"), None, |value| {
            let value = value.to_lowercase();
            if value == "y" || value == "n" {
                Validation::Accept
            } else {
                Validation::Reject(format!(
                    "Invalid input '{value}'; please enter either 'y' or 'n'."
                ))
            }
        })?;
        Ok(answer.eq_ignore_ascii_case("y"))
    }

    /// Block until the operator presses Enter. An interrupt here aborts
    /// the wait, not the process.
    pub fn wait(&mut self) -> Result<(), Halt> {
        if !self.interactive {
            return Ok(());
        }
        match self.read_line() {
            Ok(_) => Ok(()),
            Err(Halt::Interrupt) => Err(Halt::Abort),
            Err(e) => Err(e),
        }
    }

    /// Like `wait`, but expiry counts as "nothing entered" rather than
    /// a failure.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<(), Halt> {
        if !self.interactive {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(Halt::Abort);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            match self.lines.recv_timeout(INTERRUPT_POLL.min(deadline - now)) {
                Ok(Ok(Some(_))) => {
                    return if self.interrupt.load(Ordering::SeqCst) {
                        Err(Halt::Abort)
                    } else {
                        Ok(())
                    };
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(Ok(None)) | Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(Halt::Eof);
                }
            }
        }
    }
}
