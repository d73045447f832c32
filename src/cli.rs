// Author: Dustin Pilgrim
// License: MIT

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "quay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Quay packaged web application installer"
)]
pub struct Args {
    /// Slug used in paths and environment variable prefixes.
    #[arg(long, value_name = "ID")]
    pub app_id: String,

    /// Display name of the application.
    #[arg(long, value_name = "NAME")]
    pub app_name: String,

    #[arg(long, value_name = "VERSION")]
    pub app_version: String,

    /// Root of the application's source tree.
    #[arg(long, value_name = "DIR")]
    pub source_root: PathBuf,

    /// Declared config file, e.g. `database=database.yml`. Repeatable.
    #[arg(long = "config", value_name = "ID=BASENAME")]
    pub config: Vec<String>,

    /// Installer command embedded in remediation hints. A bare name is
    /// resolved against `{source_root}/bin/`.
    #[arg(long, value_name = "COMMAND")]
    pub installer: Option<String>,

    #[arg(short = 'a', long, action, help = "Run installer non-interactively.")]
    pub auto: bool,

    #[arg(
        short = 'u',
        long,
        value_name = "NAME",
        help = "Install this web application as the given user instead of prompting for a username."
    )]
    pub username: Option<String>,

    #[arg(
        long,
        action,
        help = "Set to development mode. (Users, don't use; for developers of this app only.)"
    )]
    pub dev: bool,

    #[arg(short, long, action)]
    pub verbose: bool,
}
