// Author: Dustin Pilgrim
// License: MIT

use std::path::Path;

use super::ruby;

/// Result of probing for one piece of required software. The detail is
/// shown to the operator (a path when found, a reason when not).
pub enum DepStatus {
    Found(Option<String>),
    Missing(Option<String>),
}

/// A required external dependency, checked before anything is installed.
pub trait Dependency {
    fn name(&self) -> &str;

    fn check(&self) -> DepStatus;

    /// Shown when the dependency is missing, one command per line.
    fn install_instructions(&self) -> String;
}

/// Bundler, tied to the managed Ruby interpreter.
pub struct BundlerDep;

impl Dependency for BundlerDep {
    fn name(&self) -> &str {
        "Bundler (>= 1.0.10)"
    }

    fn check(&self) -> DepStatus {
        let Some(ruby) = ruby::find_ruby() else {
            return DepStatus::Missing(Some("no Ruby interpreter found".to_string()));
        };
        match ruby::locate_runtime_command(&ruby, "bundle") {
            Some(path) => DepStatus::Found(Some(path.display().to_string())),
            None => DepStatus::Missing(None),
        }
    }

    fn install_instructions(&self) -> String {
        "gem install bundler".to_string()
    }
}

/// Dependencies declared by the application layout. A Gemfile implies
/// the gem-install step and therefore Bundler.
pub fn default_dependencies(source_root: &Path) -> Vec<Box<dyn Dependency>> {
    if source_root.join("Gemfile").exists() {
        vec![Box::new(BundlerDep)]
    } else {
        Vec::new()
    }
}
