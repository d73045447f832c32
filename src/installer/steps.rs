// Author: Dustin Pilgrim
// License: MIT

use std::path::Path;
use std::sync::Arc;

use super::console::{BOLD, Validation, YELLOW};
use super::deps::DepStatus;
use super::{Halt, Installer, gems};
use crate::core::identity::USER_ENV_VAR;
use crate::qinfo;

impl Installer {
    /// Step 1: probe for required software. Any missing dependency is
    /// fatal; interactivity only decides whether the operator gets an
    /// Enter-gate before the instructions.
    pub(crate) fn check_dependencies(&mut self) -> Result<(), Halt> {
        if self.dependencies.is_empty() {
            return Ok(());
        }

        self.console.new_screen();
        self.console.banner("Checking for required software...");
        self.console.puts("");

        let mut missing: Vec<usize> = Vec::new();
        for i in 0..self.dependencies.len() {
            let name = self.dependencies[i].name().to_string();
            self.console.print(&format!(" * {name}... "));
            match self.dependencies[i].check() {
                DepStatus::Found(Some(detail)) => {
                    self.console.puts_green(&format!("found at {detail}"))
                }
                DepStatus::Found(None) => self.console.puts_green("found"),
                DepStatus::Missing(Some(reason)) => {
                    self.console.puts_red(&reason);
                    missing.push(i);
                }
                DepStatus::Missing(None) => {
                    self.console.puts_red("not found");
                    missing.push(i);
                }
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let instructions: Vec<(String, String)> = missing
            .iter()
            .map(|&i| {
                (
                    self.dependencies[i].name().to_string(),
                    self.dependencies[i].install_instructions(),
                )
            })
            .collect();
        let interactive = self.interactive();

        self.console.use_stderr(|c| {
            c.puts("");
            c.puts_red("Some required software is not installed.");
            c.puts("But don't worry, this installer will tell you how to install them.");
            if interactive {
                c.puts("");
                c.puts_bold("Press Enter to continue, or Ctrl-C to abort.");
                c.wait()?;
            }

            c.new_screen();
            c.banner("Installation instructions for required software");
            c.puts("");
            for (name, instructions) in &instructions {
                let styled = c.style(YELLOW, name);
                c.puts(&format!(" * To install {styled}:"));
                for line in instructions.lines() {
                    c.puts(&format!("   {line}"));
                }
                c.puts("");
            }
            Err(Halt::Abort)
        })
    }

    /// Step 2: settle which user the application will run as. The only
    /// step allowed to reassign the runtime identity, and it does so
    /// exactly once.
    pub(crate) fn choose_runtime_user(&mut self, root_allowed: bool) -> Result<(), Halt> {
        let app_name = self.locator.app().app_name.clone();
        self.console.new_screen();
        self.console
            .banner(&format!("Which user do you want {app_name} to run as?"));
        self.console.puts("");

        let username = if let Some(desired) = self.desired_username.clone() {
            self.console
                .puts_bold(&format!("'{desired}' specified via command line option."));
            if self.users.lookup(&desired).is_none() {
                self.console.puts_red("This user does not exist.");
                return Err(Halt::Abort);
            }
            if !root_allowed && desired == "root" {
                self.console.puts_red(
                    "However, installing as root is not allowed for security reasons. \
                     Please specify a different username instead.",
                );
                return Err(Halt::Abort);
            }
            desired
        } else if !self.interactive() {
            self.console
                .puts_error("Please specify a username with --username.");
            return Err(Halt::Abort);
        } else {
            let current = self.current_username.clone();
            let (message, default) = if root_allowed || current != "root" {
                (
                    format!("Please enter the desired username [{current}]"),
                    Some(current),
                )
            } else {
                ("Please enter the desired username".to_string(), None)
            };

            let users = Arc::clone(&self.users);
            self.console
                .prompt(&message, default.as_deref(), move |value| {
                    if users.lookup(value).is_none() {
                        Validation::Reject("This user does not exist.".to_string())
                    } else if !root_allowed && value == "root" {
                        Validation::Reject(
                            "Installing as root is not allowed for security reasons.".to_string(),
                        )
                    } else {
                        Validation::Accept
                    }
                })?
        };

        // Only root may install on behalf of somebody else.
        if self.current_username != "root" && self.current_username != username {
            self.console.puts("");
            let hint = if username == "root" {
                format!(
                    "In order to install {app_name} as 'root', please re-run this program as root."
                )
            } else {
                format!(
                    "In order to install {app_name} as '{username}', please re-run this\n\
                     installer as either '{username}' or as 'root'."
                )
            };
            let styled = self.console.style(YELLOW, &hint);
            self.console.puts(&styled);
            return Err(Halt::Abort);
        }

        qinfo!("installer", "installing as '{username}'");
        self.desired_username = Some(username.clone());
        self.locator.set_username(&username);
        Ok(())
    }

    /// Step 3: make sure every declared config file exists. Interactive
    /// runs create missing ones from their .example templates and gate
    /// on the operator confirming the edits; non-interactive runs treat
    /// any missing file as fatal.
    pub(crate) fn ensure_config_files(&mut self) -> Result<(), Halt> {
        self.console.new_screen();
        self.console
            .banner("Checking whether config files are available...");
        self.console.puts("");

        let declared: Vec<(String, String)> = self
            .locator
            .app()
            .config_files
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut missing: Vec<String> = Vec::new();
        for (identifier, basename) in &declared {
            self.console.print(&format!(" * {basename}..."));
            match self.locator.config_filename(identifier, false) {
                Ok(Some(path)) => {
                    self.console.puts_green(&format!(" {}", path.display()));
                }
                Ok(None) => {
                    self.console.puts_red(" not found");
                    missing.push(identifier.clone());
                }
                Err(e) => return Err(self.locate_fail(e)),
            }
        }

        if !self.interactive() {
            if missing.is_empty() {
                return Ok(());
            }
            let mut paths = Vec::new();
            for identifier in &missing {
                match self.locator.preferred_config_filename(identifier) {
                    Ok(path) => paths.push(path),
                    Err(e) => return Err(self.locate_fail(e)),
                }
            }
            self.console.use_stderr(|c| {
                c.puts("");
                if paths.len() > 1 {
                    c.puts_red("Please create the following config files first:");
                } else {
                    c.puts_red("Please create the following config file first:");
                }
                c.puts("");
                for path in &paths {
                    c.puts_red(&format!(" * {}", path.display()));
                }
            });
            return Err(Halt::Abort);
        }

        match self.create_missing_config_files(&missing) {
            Ok(()) => {}
            Err(Halt::Command) => return Err(self.report_config_creation_failure(&declared)),
            Err(other) => return Err(other),
        }

        self.confirm_config_edits(&missing)
    }

    fn create_missing_config_files(&mut self, missing: &[String]) -> Result<(), Halt> {
        if missing.is_empty() {
            return Ok(());
        }

        let username = self.chosen_username();
        let group = self.group_for(&username)?;
        let source_root = self.locator.app().source_root.clone();
        let dir = self
            .locator
            .preferred_config_dir()
            .map_err(|e| self.locate_fail(e))?;

        self.console.puts("");
        self.console
            .puts("Some config files do not exist. Creating example files...");
        self.console.puts("");
        self.sh_checked(&format!("mkdir -p {}", dir.display()))?;
        self.sh_checked(&format!("chown {username} {}", dir.display()))?;
        self.sh_checked(&format!("chgrp {group} {}", dir.display()))?;

        for identifier in missing {
            let basename = self
                .locator
                .app()
                .config_files
                .get(identifier)
                .cloned()
                .unwrap_or_default();
            let filename = self
                .locator
                .preferred_config_filename(identifier)
                .map_err(|e| self.locate_fail(e))?;
            self.sh_checked(&format!(
                "cp {}/config/{basename}.example {}",
                source_root.display(),
                filename.display()
            ))?;
            self.sh_checked(&format!("chown {username} {}", filename.display()))?;
            self.sh_checked(&format!("chgrp {group} {}", filename.display()))?;
        }
        Ok(())
    }

    fn report_config_creation_failure(&mut self, declared: &[(String, String)]) -> Halt {
        let source_root = self.locator.app().source_root.clone();
        let current_is_root = self.current_username == "root";

        let mut preferred = Vec::new();
        if current_is_root {
            for (identifier, _) in declared {
                if let Ok(path) = self.locator.preferred_config_filename(identifier) {
                    preferred.push(path);
                }
            }
        }
        let basenames: Vec<String> = declared.iter().map(|(_, b)| b.clone()).collect();

        self.console.use_stderr(|c| {
            c.new_screen();
            c.puts_red("Some example configuration files cannot be created.");
            c.puts("");
            if current_is_root {
                c.puts("You need to create the following configuration files:");
                c.puts("");
                for path in &preferred {
                    c.puts(&format!(" * {}", path.display()));
                }
                c.puts("");
                c.puts("Please use these files as examples:");
                c.puts("");
                for basename in &basenames {
                    c.puts(&format!(
                        " * {}/config/{basename}.example",
                        source_root.display()
                    ));
                }
                c.puts("");
                c.puts_yellow(
                    "Once you've created the aforementioned configuration files, please re-run this\nprogram.",
                );
            } else {
                c.puts("This is probably because you're not running this program as root.");
                c.puts("Please re-run this program as root, e.g. with sudo.");
            }
        });
        Halt::Abort
    }

    fn confirm_config_edits(&mut self, created: &[String]) -> Result<(), Halt> {
        if created.is_empty() {
            return Ok(());
        }

        let app_name = self.locator.app().app_name.clone();
        self.console.new_screen();
        self.console
            .banner(&format!("You need to edit some {app_name} configuration files"));
        self.console.puts("");
        if created.len() > 1 {
            self.console
                .puts("The following example configuration files have been created.");
        } else {
            self.console
                .puts("The following example configuration file has been created.");
        }
        self.console.puts("");

        let mut files = Vec::new();
        for identifier in created {
            let filename = self
                .locator
                .preferred_config_filename(identifier)
                .map_err(|e| self.locate_fail(e))?;
            let styled = self.console.style(BOLD, &filename.display().to_string());
            self.console.puts(&format!(" * {styled}"));
            files.push((identifier.clone(), filename));
        }
        self.console.puts("");
        if created.len() > 1 {
            self.console
                .puts("Please edit the aforementioned configuration files.");
        } else {
            self.console.puts("Please edit this configuration file.");
        }
        self.console
            .puts("Once you're done press Enter to continue, or press Ctrl-C to cancel.");
        self.console.wait()?;

        for (identifier, filename) in &files {
            let basename = self
                .locator
                .app()
                .config_files
                .get(identifier)
                .cloned()
                .unwrap_or_default();
            self.console.line();
            self.console.puts("");
            // The gate cannot be skipped: the workflow does not advance
            // until the operator answers "y".
            while !self
                .console
                .confirm(&format!("Are you done editing {basename}?"))?
            {
                self.console.puts(&format!(
                    "Please edit {} and press Enter when you're done.",
                    filename.display()
                ));
                self.console.wait()?;
            }
            self.console.puts("");
        }
        Ok(())
    }

    /// Step 4: install the gem bundle, either in place (development) or
    /// into the per-user versioned bundle path through a proxy Gemfile.
    pub(crate) fn install_gems(&mut self) -> Result<(), Halt> {
        if !self.locator.app().source_root.join("Gemfile").exists() {
            return Ok(());
        }

        let app_name = self.locator.app().app_name.clone();
        self.console.new_screen();
        self.console
            .banner(&format!("Installing {app_name} dependency gems..."));
        self.console.puts("");

        let Some(bundle) = self.runtime.bundle.clone() else {
            self.console.puts_error("Cannot find Bundler.");
            return Err(Halt::Abort);
        };

        if self.locator.deployment_env() == "development" {
            self.install_gems_into_app_dir(&bundle)
        } else {
            self.install_gems_into_home(&bundle, &app_name)
        }
    }

    fn install_gems_into_app_dir(&mut self, bundle: &Path) -> Result<(), Halt> {
        self.sh_checked(&format!("{} update", bundle.display()))
    }

    fn install_gems_into_home(&mut self, bundle: &Path, app_name: &str) -> Result<(), Halt> {
        let source_root = self.locator.app().source_root.clone();
        let bundle_path = self
            .locator
            .gem_bundle_path()
            .map_err(|e| self.locate_fail(e))?;
        let bundle_path_root = self
            .locator
            .gem_bundle_path_root()
            .map_err(|e| self.locate_fail(e))?;
        let config_path = self
            .locator
            .gem_bundle_config_path()
            .map_err(|e| self.locate_fail(e))?;
        let username = self.chosen_username();
        let group = self.group_for(&username)?;

        let result = self.run_home_install(
            bundle,
            &source_root,
            &bundle_path,
            &bundle_path_root,
            &config_path,
            &username,
            &group,
        );
        match result {
            Err(Halt::Command) => {
                let current = self.current_username.clone();
                let bundle_path_text = bundle_path.display().to_string();
                let message = format!("Cannot install {app_name} dependency gems.");
                self.console.use_stderr(|c| {
                    c.new_screen();
                    c.puts_red(&message);
                    c.puts("");
                    c.puts("Possible causes are:");
                    c.puts("");
                    c.puts(" * Your Internet connection is down. Please try again after your Internet");
                    c.puts("   connection has been restored.");
                    c.puts(&format!(
                        " * Permission problems. Please ensure that the {current} user can write to"
                    ));
                    c.puts(&format!("   the directory {bundle_path_text}."));
                    c.puts("");
                    c.puts("Please check any error messages above for details.");
                });
                Err(Halt::Abort)
            }
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_home_install(
        &mut self,
        bundle: &Path,
        source_root: &Path,
        bundle_path: &Path,
        bundle_path_root: &Path,
        config_path: &Path,
        username: &str,
        group: &str,
    ) -> Result<(), Halt> {
        // Layout created here:
        //
        //   ~/.app                               bundle path root
        //   ~/.app/bundle/ruby-3.2               bundle path
        //   ~/.app/bundle/ruby-3.2/config-1.0.0  proxy Gemfile, lockfile, .bundle
        self.sh_checked(&format!("mkdir -p {}", config_path.display()))?;

        self.console.puts(&format!(
            "# Creating proxy Gemfile: {}/Gemfile",
            config_path.display()
        ));
        if let Err(e) = gems::write_proxy_gemfile(config_path) {
            self.console.puts_error(&format!(
                "*** Cannot create {}/Gemfile: {e}",
                config_path.display()
            ));
            return Err(Halt::Command);
        }

        gems::remove_lockfile(config_path);
        self.sh_checked(&format!(
            "env SOURCE_ROOT={} {} install --path {} --gemfile={}/Gemfile",
            source_root.display(),
            bundle.display(),
            bundle_path.display(),
            config_path.display()
        ))?;
        gems::remove_lockfile(config_path);

        // Bundler may have run as root while targeting another user's
        // home directory, so ownership has to be reasserted.
        self.sh_checked(&format!("chown -R {username} {}", bundle_path_root.display()))?;
        self.sh_checked(&format!("chgrp -R {group} {}", bundle_path_root.display()))?;
        Ok(())
    }

    /// Step 5: run the schema migration when the source tree is a Rails
    /// application.
    pub(crate) fn migrate_database(&mut self) -> Result<(), Halt> {
        if !self.rails_app() {
            return Ok(());
        }

        self.console.new_screen();
        self.console
            .banner("Creating or migrating database schema...");
        self.console.puts("");

        let Some(rake) = self.runtime.rake.clone() else {
            self.console.puts_error("Cannot find Rake.");
            return Err(Halt::Abort);
        };
        let username = self.chosen_username();
        let log_var = self.locator.env_var_name("log_file");
        self.sh_checked(&format!(
            "{} {USER_ENV_VAR}={username} {log_var}=/dev/null db:migrate SCHEMA=/dev/null --trace",
            rake.display()
        ))
    }

    /// Step 6: drop the restart sentinel. Best effort; a failure here is
    /// visible in the command echo but never fails the install.
    pub(crate) fn restart_web_app(&mut self) -> Result<(), Halt> {
        let app_name = self.locator.app().app_name.clone();
        self.console.new_screen();
        self.console.banner(&format!("Restarting {app_name}..."));
        self.console.puts("");

        let dir = self.locator.restart_dir().map_err(|e| self.locate_fail(e))?;
        let username = self.chosen_username();
        let group = self.group_for(&username)?;

        self.sh(&format!("mkdir -p {}", dir.display()))?;
        self.sh(&format!("touch {}/restart.txt", dir.display()))?;
        self.sh(&format!("chown {username} {}", dir.display()))?;
        self.sh(&format!("chown {username} {}/restart.txt", dir.display()))?;
        self.sh(&format!("chgrp {group} {}", dir.display()))?;
        self.sh(&format!("chgrp {group} {}/restart.txt", dir.display()))?;
        Ok(())
    }

    fn chosen_username(&self) -> String {
        self.desired_username
            .clone()
            .unwrap_or_else(|| self.current_username.clone())
    }

    fn rails_app(&self) -> bool {
        let marker = self.locator.app().source_root.join("config/environment.rb");
        match std::fs::read_to_string(&marker) {
            Ok(contents) => contents.to_lowercase().contains("rails"),
            Err(_) => false,
        }
    }
}
