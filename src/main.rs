// Author: Dustin Pilgrim
// License: MIT

use std::collections::BTreeMap;
use std::process;
use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr, bail};

use quay::cli::Args;
use quay::core::identity::{AppIdentity, InstallerSpec, RuntimeIdentity};
use quay::core::locator::Locator;
use quay::core::users::{SystemUsers, UserDatabase};
use quay::installer::command::{self, ShellExec};
use quay::installer::console::Console;
use quay::installer::ruby::{self, RuntimeCommands};
use quay::installer::{InstallOptions, Installer, deps};
use quay::{log, qerror};

fn main() {
    let args = Args::parse();
    log::set_verbose(args.verbose);

    match run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            qerror!("main", "{e:#}");
            eprintln!("quay: {e:#}");
            process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let config_files = parse_config_pairs(&args.config)?;
    let source_root = args
        .source_root
        .canonicalize()
        .wrap_err_with(|| format!("cannot resolve {}", args.source_root.display()))?;

    let installer_spec = match args.installer {
        Some(cmd) => InstallerSpec::Command(cmd),
        None => InstallerSpec::None,
    };
    let app = AppIdentity::new(
        args.app_id,
        args.app_name,
        args.app_version,
        source_root.clone(),
        config_files,
        installer_spec,
    )?;

    let users: Arc<dyn UserDatabase> = Arc::new(SystemUsers);
    let user = RuntimeIdentity::from_env(users.as_ref())?;
    let runtime_tag = ruby::runtime_tag().unwrap_or_else(|| "ruby-unknown".to_string());
    let locator = Locator::new(app, user, Arc::clone(&users), runtime_tag);

    command::install_interrupt_handler().wrap_err("cannot install the interrupt handler")?;

    let console = Console::stdio(!args.auto);
    let dependencies = deps::default_dependencies(&source_root);
    let runtime = RuntimeCommands::detect();

    let mut installer = Installer::new(
        locator,
        users,
        console,
        Box::new(ShellExec),
        dependencies,
        runtime,
        InstallOptions {
            username: args.username,
            dev_mode: args.dev,
        },
    )?;
    Ok(installer.run().exit_code())
}

fn parse_config_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let Some((id, basename)) = pair.split_once('=') else {
            bail!("invalid --config value '{pair}', expected ID=BASENAME");
        };
        if id.is_empty() || basename.is_empty() {
            bail!("invalid --config value '{pair}', expected ID=BASENAME");
        }
        map.insert(id.to_string(), basename.to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::parse_config_pairs;

    #[test]
    fn config_pairs_are_split_on_the_first_equals() {
        let map = parse_config_pairs(&[
            "database=database.yml".to_string(),
            "general=config=odd.yml".to_string(),
        ])
        .unwrap();
        assert_eq!(map["database"], "database.yml");
        assert_eq!(map["general"], "config=odd.yml");
    }

    #[test]
    fn malformed_config_pairs_are_rejected() {
        assert!(parse_config_pairs(&["no-separator".to_string()]).is_err());
        assert!(parse_config_pairs(&["=missing-id".to_string()]).is_err());
        assert!(parse_config_pairs(&["missing-basename=".to_string()]).is_err());
    }
}
