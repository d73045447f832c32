// Author: Dustin Pilgrim
// License: MIT

pub mod command;
pub mod console;
pub mod deps;
pub mod gems;
pub mod ruby;

mod steps;

#[cfg(test)]
mod workflow_tests;

use std::env;
use std::sync::Arc;

use eyre::{Result, bail};

use crate::core::error::LocateError;
use crate::core::locator::Locator;
use crate::core::users::UserDatabase;
use crate::{qerror, qinfo, qwarn};

use command::Exec;
use console::Console;
use deps::Dependency;
use ruby::RuntimeCommands;

/// Terminal conditions of the workflow. There is no cross-step recovery:
/// the first of these to surface ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// A step cannot proceed. Remediation has already been printed.
    Abort,

    /// A required external command failed. Steps that can say something
    /// more useful intercept this before it degrades into Abort.
    Command,

    /// The operator cancelled the run. Reported without an error message.
    Interrupt,

    /// Stdin closed during a prompt.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Aborted,
    Interrupted,
    EndOfInput,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Aborted | Outcome::Interrupted => 1,
            Outcome::EndOfInput => 2,
        }
    }
}

/// Interactivity itself lives on the Console (`--auto` builds a
/// non-interactive one).
pub struct InstallOptions {
    pub username: Option<String>,
    pub dev_mode: bool,
}

/// Drives the install: six strictly ordered steps with fail-fast abort,
/// framed by a before-hook (deployment environment normalization) and an
/// unconditional after-hook (terminal reset).
pub struct Installer {
    locator: Locator,
    users: Arc<dyn UserDatabase>,
    console: Console,
    exec: Box<dyn Exec>,
    dependencies: Vec<Box<dyn Dependency>>,
    runtime: RuntimeCommands,
    desired_username: Option<String>,
    current_username: String,
    dev_mode: bool,
    env_overrides: Vec<(String, String)>,
}

impl Installer {
    pub fn new(
        locator: Locator,
        users: Arc<dyn UserDatabase>,
        console: Console,
        exec: Box<dyn Exec>,
        dependencies: Vec<Box<dyn Dependency>>,
        runtime: RuntimeCommands,
        options: InstallOptions,
    ) -> Result<Self> {
        let Some(current_username) = users.effective_username() else {
            bail!("cannot determine the current user");
        };

        Ok(Self {
            locator,
            users,
            console,
            exec,
            dependencies,
            runtime,
            desired_username: options.username,
            current_username,
            dev_mode: options.dev_mode,
            env_overrides: Vec::new(),
        })
    }

    /// Run the whole workflow. Every exit path goes through the
    /// after-hook.
    pub fn run(&mut self) -> Outcome {
        self.before_install();
        self.show_welcome_message();

        let outcome = match self.run_steps() {
            Ok(()) => {
                self.show_completion_message();
                Outcome::Success
            }
            Err(Halt::Interrupt) => {
                self.console.puts("");
                qinfo!("installer", "interrupted by operator");
                Outcome::Interrupted
            }
            Err(Halt::Eof) => Outcome::EndOfInput,
            Err(Halt::Abort) | Err(Halt::Command) => Outcome::Aborted,
        };

        self.after_install();
        outcome
    }

    fn run_steps(&mut self) -> Result<(), Halt> {
        self.check_dependencies()?;
        self.choose_runtime_user(false)?;
        self.ensure_config_files()?;
        self.install_gems()?;
        self.migrate_database()?;
        self.restart_web_app()?;
        Ok(())
    }

    /// Pin down the deployment environment for the rest of the run, both
    /// for path resolution and for every child command.
    fn before_install(&mut self) {
        let deploy_env = if self.dev_mode {
            "development".to_string()
        } else {
            env::var("RACK_ENV")
                .or_else(|_| env::var("RAILS_ENV"))
                .unwrap_or_else(|_| "production".to_string())
        };
        qinfo!("installer", "deployment environment: {deploy_env}");
        self.locator.set_deployment_env(&deploy_env);
        self.env_overrides = vec![
            ("RACK_ENV".to_string(), deploy_env.clone()),
            ("RAILS_ENV".to_string(), deploy_env),
        ];
    }

    fn after_install(&mut self) {
        self.console.reset_colors();
    }

    pub(crate) fn interactive(&self) -> bool {
        self.console.interactive()
    }

    fn show_welcome_message(&mut self) {
        let title = format!(
            "Welcome to the {} {} installer",
            self.locator.app().app_name,
            self.locator.app().app_version
        );
        self.console.new_screen();
        self.console.banner(&title);
    }

    fn show_completion_message(&mut self) {
        let app_name = self.locator.app().app_name.clone();
        let source_root = self.locator.app().source_root.clone();
        let username = self
            .desired_username
            .clone()
            .unwrap_or_else(|| self.current_username.clone());
        let restart_dir = self
            .locator
            .restart_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_default();

        self.console.new_screen();
        self.console
            .puts_green(&format!("{app_name} has been installed or upgraded!"));
        self.console.puts("");
        self.console.puts(
            "To (re-)deploy on Phusion Passenger, use one of the following configuration",
        );
        self.console.puts(&format!(
            "snippets. Be sure to remove any old configuration snippets for\n{app_name} that you already had."
        ));
        self.console.puts("");
        self.console.puts_yellow("Phusion Passenger for Apache");
        self.console.puts(&format!(
            "   <VirtualHost *:80>\n       ServerName www.example.com\n       DocumentRoot {0}/public\n       PassengerUser {1}\n       PassengerRestartDir {2}\n       RailsEnv production\n   </VirtualHost>",
            source_root.display(),
            username,
            restart_dir
        ));
        self.console.puts("");
        self.console.puts_yellow("Phusion Passenger for Nginx");
        self.console.puts(&format!(
            "   server {{\n       listen 80;\n       server_name www.example.com;\n       root {0}/public;\n       passenger_enabled on;\n       passenger_user {1};\n       rails_env production;\n   }}",
            source_root.display(),
            username
        ));
        self.console.puts("");
        self.console.puts("Enjoy! :-)");
    }

    /// Run a command, echoing it first. Ordinary failure is the caller's
    /// problem; a SIGINT-killed command cancels the whole run.
    pub(crate) fn sh(&mut self, command: &str) -> Result<bool, Halt> {
        self.console.puts(&format!("# {command}"));
        qinfo!("exec", "{command}");

        match self.exec.run(command, &self.env_overrides) {
            Ok(status) => {
                if status.success {
                    Ok(true)
                } else if status.interrupted() {
                    Err(Halt::Interrupt)
                } else {
                    Ok(false)
                }
            }
            Err(e) => {
                qwarn!("exec", "cannot execute '{command}': {e}");
                Ok(false)
            }
        }
    }

    /// Like `sh`, but failure is fatal for the current step.
    pub(crate) fn sh_checked(&mut self, command: &str) -> Result<(), Halt> {
        if self.sh(command)? {
            Ok(())
        } else {
            self.console
                .puts_error(&format!("*** Command failed: {command}"));
            Err(Halt::Command)
        }
    }

    pub(crate) fn locate_fail(&mut self, e: LocateError) -> Halt {
        qerror!("locator", "{e}");
        self.console.puts_error(&e.to_string());
        Halt::Abort
    }

    pub(crate) fn group_for(&mut self, username: &str) -> Result<String, Halt> {
        let Some(entry) = self.users.lookup(username) else {
            self.console
                .puts_error(&format!("user '{username}' does not exist"));
            return Err(Halt::Abort);
        };
        match self.users.group_name(entry.gid) {
            Some(group) => Ok(group),
            None => {
                self.console.puts_error(&format!(
                    "cannot resolve the primary group of '{username}'"
                ));
                Err(Halt::Abort)
            }
        }
    }
}
