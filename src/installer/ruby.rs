// Author: Dustin Pilgrim
// License: MIT

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::qdebug;

/// Commands of the managed runtime, resolved once at startup. A `None`
/// means the command could not be tied to the interpreter and the
/// corresponding step must fail rather than run something mismatched.
pub struct RuntimeCommands {
    pub bundle: Option<PathBuf>,
    pub rake: Option<PathBuf>,
}

impl RuntimeCommands {
    pub fn detect() -> Self {
        match find_ruby() {
            Some(ruby) => {
                qdebug!("ruby", "interpreter at {}", ruby.display());
                Self {
                    bundle: locate_runtime_command(&ruby, "bundle"),
                    rake: locate_runtime_command(&ruby, "rake"),
                }
            }
            None => Self {
                bundle: None,
                rake: None,
            },
        }
    }
}

/// The managed Ruby interpreter, from PATH.
pub fn find_ruby() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join("ruby");
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Locate a command belonging to the given interpreter: its bindir
/// first, then PATH but only when the shebang points back at that
/// interpreter. A command installed for a different Ruby must be ruled
/// out, not picked up because it happens to be on PATH.
pub fn locate_runtime_command(ruby: &Path, name: &str) -> Option<PathBuf> {
    if let Some(bindir) = ruby.parent() {
        let candidate = bindir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }

    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(name);
        if !is_executable(&candidate) {
            continue;
        }
        if let Some(shebang) = first_line(&candidate) {
            if shebang.trim() == format!("#!{}", ruby.display()) {
                qdebug!("ruby", "{name} at {} (shebang match)", candidate.display());
                return Some(candidate);
            }
        }
    }
    None
}

/// Platform tag namespacing the gem bundle, e.g. "ruby-3.2".
pub fn runtime_tag() -> Option<String> {
    let ruby = find_ruby()?;
    let output = Command::new(&ruby)
        .arg("-e")
        .arg("print RUBY_ENGINE, '-', RUBY_VERSION.split('.')[0, 2].join('.')")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let tag = String::from_utf8(output.stdout).ok()?;
    let tag = tag.trim().to_string();
    if tag.is_empty() { None } else { Some(tag) }
}

fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

fn first_line(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn executable(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn prefers_the_interpreter_bindir() {
        let dir = tempfile::tempdir().unwrap();
        let ruby = executable(dir.path(), "ruby", "");
        let bundle = executable(dir.path(), "bundle", "");

        assert_eq!(locate_runtime_command(&ruby, "bundle"), Some(bundle));
    }

    #[test]
    fn rejects_commands_of_other_interpreters() {
        // No bundle next to this interpreter, and nothing on PATH can
        // carry a shebang pointing into the temp dir, so the PATH scan
        // must come up empty instead of picking a mismatched command.
        let ruby_dir = tempfile::tempdir().unwrap();
        let ruby = executable(ruby_dir.path(), "ruby", "");

        assert_eq!(locate_runtime_command(&ruby, "bundle"), None);
    }
}
