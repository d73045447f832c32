// Author: Dustin Pilgrim
// License: MIT

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::core::identity::{AppIdentity, InstallerSpec, RuntimeIdentity};
use crate::core::locator::Locator;
use crate::core::users::UserDatabase;
use crate::core::users::fake::FakeUsers;

use super::command::{self, CommandStatus, Exec};
use super::console::Console;
use super::deps::{DepStatus, Dependency};
use super::ruby::RuntimeCommands;
use super::{InstallOptions, Installer, Outcome};

/// Records every command instead of running it. A command whose text
/// contains one of the failure patterns reports that scripted status.
struct FakeExec {
    commands: Arc<Mutex<Vec<String>>>,
    failures: Vec<(String, CommandStatus)>,
}

impl Exec for FakeExec {
    fn run(&self, command: &str, _env: &[(String, String)]) -> io::Result<CommandStatus> {
        self.commands.lock().unwrap().push(command.to_string());
        for (pattern, status) in &self.failures {
            if command.contains(pattern) {
                return Ok(status.clone());
            }
        }
        Ok(CommandStatus {
            success: true,
            signal: None,
        })
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Options {
    current_user: &'static str,
    username: Option<String>,
    interactive: bool,
    input: String,
    failures: Vec<(String, CommandStatus)>,
    bundle: Option<PathBuf>,
    config: Vec<(&'static str, &'static str)>,
    gemfile: bool,
    dev_mode: bool,
    dependencies: Vec<Box<dyn Dependency>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            current_user: "alice",
            username: Some("alice".to_string()),
            interactive: false,
            input: String::new(),
            failures: Vec::new(),
            bundle: None,
            config: vec![("database", "database.yml")],
            gemfile: false,
            dev_mode: true,
            dependencies: Vec::new(),
        }
    }
}

struct Bed {
    root: TempDir,
    home: TempDir,
    commands: Arc<Mutex<Vec<String>>>,
    out: SharedBuf,
    err: SharedBuf,
    installer: Installer,
}

impl Bed {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

fn bed(options: Options) -> Bed {
    command::reset_interrupted();

    let root = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    if options.gemfile {
        fs::write(root.path().join("Gemfile"), "source 'https://rubygems.org'\n").unwrap();
    }

    let mut config_files = BTreeMap::new();
    for (id, basename) in &options.config {
        config_files.insert(id.to_string(), basename.to_string());
    }
    let app = AppIdentity::new(
        "depot",
        "Depot",
        "2.1.0",
        root.path(),
        config_files,
        InstallerSpec::None,
    )
    .unwrap();

    let mut users = FakeUsers::with_user("alice", 1000, 1000, home.path());
    users.add_user("bob", 1001, 1001, home.path());
    users.add_user("root", 0, 0, Path::new("/root"));
    users.current = options.current_user.to_string();
    let users: Arc<dyn UserDatabase> = Arc::new(users);

    let locator = Locator::new(
        app,
        RuntimeIdentity::new(options.current_user),
        Arc::clone(&users),
        "ruby-3.2",
    );

    let out = SharedBuf::default();
    let err = SharedBuf::default();
    let console = Console::new(
        Box::new(Cursor::new(options.input.into_bytes())),
        Box::new(out.clone()),
        Box::new(err.clone()),
        options.interactive,
        false,
    );

    let commands = Arc::new(Mutex::new(Vec::new()));
    let exec = FakeExec {
        commands: Arc::clone(&commands),
        failures: options.failures,
    };

    let installer = Installer::new(
        locator,
        users,
        console,
        Box::new(exec),
        options.dependencies,
        RuntimeCommands {
            bundle: options.bundle,
            rake: None,
        },
        InstallOptions {
            username: options.username,
            dev_mode: options.dev_mode,
        },
    )
    .unwrap();

    Bed {
        root,
        home,
        commands,
        out,
        err,
        installer,
    }
}

fn present_config(bed: &Bed) {
    let config_dir = bed.root.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("database.yml"), "").unwrap();
}

#[test]
fn a_clean_run_only_touches_the_restart_dir() {
    let mut b = bed(Options::default());
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Success);

    let commands = b.commands();
    let restart_dir = b.home.path().join(".depot/tmp");
    assert_eq!(commands.len(), 6);
    assert_eq!(commands[0], format!("mkdir -p {}", restart_dir.display()));
    assert_eq!(
        commands[1],
        format!("touch {}/restart.txt", restart_dir.display())
    );
    assert!(!commands.iter().any(|c| c.starts_with("cp ")));

    let out = b.out.contents();
    assert!(out.contains("Welcome to the Depot 2.1.0 installer"));
    assert!(out.contains("Depot has been installed or upgraded!"));
}

#[test]
fn non_interactive_missing_config_aborts_before_any_command() {
    let mut b = bed(Options::default());

    assert_eq!(b.installer.run(), Outcome::Aborted);
    assert!(b.commands().is_empty());

    let err = b.err.contents();
    assert!(err.contains("Please create the following config file first:"));
    assert!(err.contains(
        &b.home.path().join(".depot/database.yml").display().to_string()
    ));
}

#[test]
fn installing_for_another_user_requires_root() {
    let mut b = bed(Options {
        current_user: "bob",
        username: Some("alice".to_string()),
        ..Options::default()
    });

    assert_eq!(b.installer.run(), Outcome::Aborted);
    assert!(b.commands().is_empty());
    assert!(
        b.out
            .contents()
            .contains("as either 'alice' or as 'root'")
    );
}

#[test]
fn the_root_user_is_rejected_as_runtime_user() {
    let mut b = bed(Options {
        current_user: "root",
        username: Some("root".to_string()),
        ..Options::default()
    });

    assert_eq!(b.installer.run(), Outcome::Aborted);
    assert!(
        b.out
            .contents()
            .contains("installing as root is not allowed for security reasons")
    );
}

#[test]
fn non_interactive_runs_need_an_explicit_username() {
    let mut b = bed(Options {
        username: None,
        ..Options::default()
    });

    assert_eq!(b.installer.run(), Outcome::Aborted);
    assert!(
        b.err
            .contents()
            .contains("Please specify a username with --username.")
    );
}

#[test]
fn the_username_prompt_retries_until_a_valid_answer() {
    // First answer names an unknown user, the empty second one takes the
    // default (the current user).
    let mut b = bed(Options {
        username: None,
        interactive: true,
        input: "charlie\n\n".to_string(),
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Success);
    assert!(
        b.out
            .contents()
            .contains("Please enter the desired username [alice]")
    );
    assert!(b.err.contents().contains("This user does not exist."));
}

#[test]
fn missing_config_files_are_created_and_gated_on_confirmation() {
    // Input script: Enter past the edit notice, then "x" (invalid),
    // "n" (not done, wait again), Enter, "y" (done).
    let mut b = bed(Options {
        interactive: true,
        input: "\nx\nn\n\ny\n".to_string(),
        ..Options::default()
    });

    assert_eq!(b.installer.run(), Outcome::Success);

    let commands = b.commands();
    let preferred = b.home.path().join(".depot/database.yml");
    assert!(commands.contains(&format!(
        "cp {}/config/database.yml.example {}",
        b.root.path().display(),
        preferred.display()
    )));
    assert!(commands.contains(&format!("chown alice {}", preferred.display())));
    assert!(commands.contains(&format!("chgrp alicegrp {}", preferred.display())));

    let out = b.out.contents();
    assert!(out.contains("Are you done editing database.yml?"));
    assert!(out.contains("Please edit"));
    assert!(b.err.contents().contains("Invalid input 'x'"));
}

#[test]
fn failed_config_creation_points_non_root_users_at_sudo() {
    let mut b = bed(Options {
        interactive: true,
        failures: vec![(
            "mkdir".to_string(),
            CommandStatus {
                success: false,
                signal: None,
            },
        )],
        ..Options::default()
    });

    assert_eq!(b.installer.run(), Outcome::Aborted);

    let err = b.err.contents();
    assert!(err.contains("*** Command failed:"));
    assert!(err.contains("Some example configuration files cannot be created."));
    assert!(err.contains("Please re-run this program as root, e.g. with sudo."));
}

#[test]
fn failed_config_creation_tells_root_which_files_to_create() {
    let mut b = bed(Options {
        current_user: "root",
        username: Some("alice".to_string()),
        interactive: true,
        failures: vec![(
            "cp ".to_string(),
            CommandStatus {
                success: false,
                signal: None,
            },
        )],
        ..Options::default()
    });

    assert_eq!(b.installer.run(), Outcome::Aborted);

    let err = b.err.contents();
    assert!(err.contains("You need to create the following configuration files:"));
    assert!(err.contains("Please use these files as examples:"));
    assert!(err.contains("config/database.yml.example"));
}

#[test]
fn an_interrupted_gem_install_cancels_the_run() {
    let mut b = bed(Options {
        gemfile: true,
        dev_mode: false,
        bundle: Some(PathBuf::from("/usr/bin/bundle")),
        failures: vec![(
            " install ".to_string(),
            CommandStatus {
                success: false,
                signal: Some(libc::SIGINT),
            },
        )],
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Interrupted);

    let commands = b.commands();
    assert!(commands.iter().any(|c| c.contains("bundle install --path")));
    // Ownership is never reasserted after a cancelled install.
    assert!(!commands.iter().any(|c| c.starts_with("chown -R")));
}

#[test]
fn gem_install_uses_the_proxy_gemfile_under_the_bundle_path() {
    let mut b = bed(Options {
        gemfile: true,
        dev_mode: false,
        bundle: Some(PathBuf::from("/usr/bin/bundle")),
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Success);

    let config_path = b
        .home
        .path()
        .join(".depot/bundle/ruby-3.2/config-2.1.0");
    assert!(config_path.join("Gemfile").exists());
    assert!(
        fs::read_to_string(config_path.join("Gemfile"))
            .unwrap()
            .contains("SOURCE_ROOT")
    );

    let commands = b.commands();
    let install = commands
        .iter()
        .find(|c| c.contains("bundle install"))
        .unwrap();
    assert!(install.starts_with(&format!("env SOURCE_ROOT={}", b.root.path().display())));
    assert!(install.contains(&format!(
        "--path {}",
        b.home.path().join(".depot/bundle/ruby-3.2").display()
    )));
    assert!(install.contains(&format!("--gemfile={}/Gemfile", config_path.display())));
    assert!(
        commands
            .iter()
            .any(|c| c.starts_with(&format!("chown -R alice {}", b.home.path().join(".depot").display())))
    );
}

#[test]
fn a_development_install_updates_in_place() {
    let mut b = bed(Options {
        gemfile: true,
        dev_mode: true,
        bundle: Some(PathBuf::from("/usr/bin/bundle")),
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Success);
    assert!(b.commands().contains(&"/usr/bin/bundle update".to_string()));
    assert!(!b.commands().iter().any(|c| c.contains("bundle install")));
}

#[test]
fn a_missing_bundler_fails_the_gem_step() {
    let mut b = bed(Options {
        gemfile: true,
        bundle: None,
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Aborted);
    assert!(b.err.contents().contains("Cannot find Bundler."));
}

#[test]
fn a_failed_gem_install_prints_remediation() {
    let mut b = bed(Options {
        gemfile: true,
        dev_mode: false,
        bundle: Some(PathBuf::from("/usr/bin/bundle")),
        failures: vec![(
            " install ".to_string(),
            CommandStatus {
                success: false,
                signal: None,
            },
        )],
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Aborted);

    let err = b.err.contents();
    assert!(err.contains("Cannot install Depot dependency gems."));
    assert!(err.contains("Your Internet connection is down."));
    assert!(err.contains("Permission problems."));
}

#[test]
fn restart_failures_are_nonfatal() {
    let mut b = bed(Options {
        failures: vec![(
            "chown".to_string(),
            CommandStatus {
                success: false,
                signal: None,
            },
        )],
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Success);
    assert!(!b.err.contents().contains("*** Command failed"));
}

#[test]
fn missing_dependencies_abort_with_instructions() {
    struct MissingDep;

    impl Dependency for MissingDep {
        fn name(&self) -> &str {
            "Frobnicator"
        }

        fn check(&self) -> DepStatus {
            DepStatus::Missing(None)
        }

        fn install_instructions(&self) -> String {
            "apt-get install frobnicator\nfrobnicator --init".to_string()
        }
    }

    let mut b = bed(Options {
        dependencies: vec![Box::new(MissingDep)],
        ..Options::default()
    });
    present_config(&b);

    assert_eq!(b.installer.run(), Outcome::Aborted);
    assert!(b.commands().is_empty());

    let err = b.err.contents();
    assert!(err.contains("Some required software is not installed."));
    assert!(err.contains(" * To install Frobnicator:"));
    assert!(err.contains("   apt-get install frobnicator"));
    assert!(err.contains("   frobnicator --init"));
    assert!(b.out.contents().contains(" * Frobnicator... "));
}

#[test]
fn closed_stdin_during_a_prompt_has_its_own_outcome() {
    // Interactive run whose input ends before the username prompt can be
    // answered.
    let mut b = bed(Options {
        username: None,
        interactive: true,
        input: String::new(),
        ..Options::default()
    });

    let outcome = b.installer.run();
    assert_eq!(outcome, Outcome::EndOfInput);
    assert_eq!(outcome.exit_code(), 2);
}
