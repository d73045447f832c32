// Author: Dustin Pilgrim
// License: MIT

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Entire content of the generated proxy Gemfile. It forwards to the
/// real Gemfile through SOURCE_ROOT so Bundler writes its metadata next
/// to the proxy instead of into the application's source tree.
const PROXY_GEMFILE: &str = "\
gemfile = ENV['SOURCE_ROOT'] + '/Gemfile'
eval(File.read(gemfile), binding, gemfile)
";

/// Write the proxy Gemfile, replacing whatever a previous run left
/// behind. Returns the path of the written file.
pub fn write_proxy_gemfile(config_path: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(config_path)?;
    let gemfile = config_path.join("Gemfile");
    fs::write(&gemfile, PROXY_GEMFILE)?;
    Ok(gemfile)
}

/// Delete the lockfile next to the proxy Gemfile, both before and after
/// an install run. A locked bundle would force a reinstall whenever the
/// application's adapter configuration changes.
pub fn remove_lockfile(config_path: &Path) {
    let _ = fs::remove_file(config_path.join("Gemfile.lock"));
}
