// Author: Dustin Pilgrim
// License: MIT

use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::error::LocateError;
use crate::core::identity::{AppIdentity, InstallerSpec, RuntimeIdentity};
use crate::core::users::{self, UserDatabase};
use crate::qdebug;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \-.]+").unwrap());
static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"__+").unwrap());

/// Resolves every on-disk location the packaged application cares about:
/// config files, the log file, gem bundle directories and the restart
/// directory. One instance is built at startup and handed to the
/// installer; nothing else holds path knowledge.
pub struct Locator {
    app: AppIdentity,
    user: RuntimeIdentity,
    users: Arc<dyn UserDatabase>,

    /// Platform tag of the managed runtime, e.g. "ruby-3.2". Resolved
    /// once at startup; bundle paths are namespaced under it.
    runtime_tag: String,

    /// Deployment environment. Defaults from RACK_ENV/RAILS_ENV at
    /// construction; the installer's before-hook overwrites it once.
    deployment_env: String,
}

impl Locator {
    pub fn new(
        app: AppIdentity,
        user: RuntimeIdentity,
        users: Arc<dyn UserDatabase>,
        runtime_tag: impl Into<String>,
    ) -> Self {
        let deployment_env = env::var("RACK_ENV")
            .or_else(|_| env::var("RAILS_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        Self {
            app,
            user,
            users,
            runtime_tag: runtime_tag.into(),
            deployment_env,
        }
    }

    pub fn app(&self) -> &AppIdentity {
        &self.app
    }

    pub fn username(&self) -> &str {
        self.user.username()
    }

    /// Reassign the target user. Cached uid/gid/home are dropped.
    pub fn set_username(&mut self, username: &str) {
        self.user.set_username(username);
    }

    pub fn deployment_env(&self) -> &str {
        &self.deployment_env
    }

    pub fn set_deployment_env(&mut self, env: &str) {
        self.deployment_env = env.to_string();
    }

    pub fn uid(&mut self) -> Result<u32, LocateError> {
        self.user.uid(self.users.as_ref())
    }

    pub fn gid(&mut self) -> Result<u32, LocateError> {
        self.user.gid(self.users.as_ref())
    }

    pub fn home_dir(&mut self) -> Result<PathBuf, LocateError> {
        self.user.home_dir(self.users.as_ref())
    }

    fn is_root(&self) -> bool {
        self.user.is_root()
    }

    /// Environment variable name for a config identifier:
    /// `{APP_ID}_{IDENTIFIER}`, uppercased, with runs of space/hyphen/dot
    /// collapsed to one underscore and runs of underscores collapsed too.
    pub fn env_var_name(&self, identifier: &str) -> String {
        let raw = format!("{}_{}", self.app.app_id, identifier).to_uppercase();
        let collapsed = SEPARATORS.replace_all(&raw, "_");
        UNDERSCORE_RUNS.replace_all(&collapsed, "_").into_owned()
    }

    /// Resolve a config file through the fallback chain: env var override,
    /// source tree, per-user dir, system dir. First existing file wins.
    ///
    /// With `required`, a fully missed chain is an error carrying
    /// remediation text. Without it, Ok(None) lets callers probe
    /// existence.
    ///
    /// Panics when the identifier is not declared in the config map; that
    /// is a programming error, not a runtime condition.
    pub fn config_filename(
        &mut self,
        identifier: &str,
        required: bool,
    ) -> Result<Option<PathBuf>, LocateError> {
        let basename = self.basename_for(identifier).to_string();

        let mut candidates: Vec<PathBuf> = Vec::with_capacity(4);
        if let Ok(value) = env::var(self.env_var_name(identifier)) {
            candidates.push(PathBuf::from(value));
        }
        candidates.push(self.app.source_root.join("config").join(&basename));
        candidates.push(self.home_dir()?.join(format!(".{}", self.app.app_id)).join(&basename));
        candidates.push(PathBuf::from(format!("/etc/{}/{basename}", self.app.app_id)));

        for candidate in candidates {
            if candidate.exists() {
                qdebug!("locator", "{identifier} -> {}", candidate.display());
                return Ok(Some(candidate));
            }
        }

        if required {
            Err(LocateError::ConfigNotFound {
                basename,
                hint: self.missing_config_hint(),
            })
        } else {
            Ok(None)
        }
    }

    fn missing_config_hint(&self) -> String {
        match &self.app.installer {
            InstallerSpec::None => "Please create it.".to_string(),
            _ => {
                let mut hint =
                    format!("{} is probably not installed properly. ", self.app.app_name);
                match self.app.installer_command(self.user.username()) {
                    Some(cmd) => hint.push_str(&format!("Please (re)run the installer: {cmd}")),
                    None => hint.push_str("Please (re)run the installer."),
                }
                hint
            }
        }
    }

    /// Where a missing config file should be *created*. Single canonical
    /// candidate, never used for reading.
    pub fn preferred_config_dir(&mut self) -> Result<PathBuf, LocateError> {
        if self.is_root() {
            Ok(PathBuf::from(format!("/etc/{}", self.app.app_id)))
        } else {
            Ok(self.home_dir()?.join(format!(".{}", self.app.app_id)))
        }
    }

    pub fn preferred_config_filename(
        &mut self,
        identifier: &str,
    ) -> Result<PathBuf, LocateError> {
        let basename = self.basename_for(identifier).to_string();
        Ok(self.preferred_config_dir()?.join(basename))
    }

    /// Resolve the log file, preferring the source tree when it is
    /// writable and falling back to a per-user or system location.
    ///
    /// The source tree's log directory is auto-created (and chowned)
    /// only in development. Anywhere else its mere existence is the
    /// deployer's explicit opt-in to logging into the source tree, so it
    /// is never created on their behalf.
    ///
    /// Writability is probed by opening the candidate for append instead
    /// of inspecting permission bits, which lie under ACLs. Only a
    /// permission-denied probe selects the fallback; any other I/O error
    /// propagates.
    pub fn log_filename(&mut self) -> Result<PathBuf, LocateError> {
        let env_name = self.env_var_name("log_file");
        if let Ok(value) = env::var(&env_name) {
            return Ok(PathBuf::from(value));
        }

        let deploy_env = self.deployment_env.clone();
        let log_dir = self.app.source_root.join("log");
        let candidate = log_dir.join(format!("{deploy_env}.log"));

        if deploy_env == "development" && !log_dir.exists() {
            fs::create_dir(&log_dir)?;
            let (uid, gid) = (self.uid()?, self.gid()?);
            users::chown(&log_dir, uid, gid)?;
        }

        let writable = match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => false,
            Err(e) => return Err(e.into()),
        };
        if writable {
            return Ok(candidate);
        }

        let fallback = if self.is_root() {
            PathBuf::from(format!("/var/log/{}/{deploy_env}.log", self.app.app_id))
        } else {
            self.home_dir()?
                .join(format!(".{}", self.app.app_id))
                .join(format!("{deploy_env}.log"))
        };
        if let Some(dir) = fallback.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                let (uid, gid) = (self.uid()?, self.gid()?);
                users::chown(dir, uid, gid)?;
            }
        }
        qdebug!("locator", "log file falls back to {}", fallback.display());
        Ok(fallback)
    }

    /// Install target for the gem bundle. A write target the installer
    /// creates, not a location that is searched.
    pub fn gem_bundle_path(&mut self) -> Result<PathBuf, LocateError> {
        if self.is_root() {
            Ok(PathBuf::from(format!(
                "/usr/lib/{}/bundle/{}",
                self.app.app_id, self.runtime_tag
            )))
        } else {
            Ok(self
                .home_dir()?
                .join(format!(".{}", self.app.app_id))
                .join("bundle")
                .join(&self.runtime_tag))
        }
    }

    pub fn gem_bundle_path_root(&mut self) -> Result<PathBuf, LocateError> {
        if self.is_root() {
            Ok(PathBuf::from(format!("/usr/lib/{}", self.app.app_id)))
        } else {
            Ok(self.home_dir()?.join(format!(".{}", self.app.app_id)))
        }
    }

    pub fn gem_bundle_config_path(&mut self) -> Result<PathBuf, LocateError> {
        Ok(self
            .gem_bundle_path()?
            .join(format!("config-{}", self.app.app_version)))
    }

    /// The Gemfile the application should load, if any: a source tree
    /// with a `.bundle` dir pins the source Gemfile; otherwise the
    /// installed proxy wins over a bare source Gemfile.
    pub fn gemfile_path(&mut self) -> Result<Option<PathBuf>, LocateError> {
        let source_gemfile = self.app.source_root.join("Gemfile");
        if self.app.source_root.join(".bundle").exists() {
            return Ok(Some(source_gemfile));
        }

        let proxy = self.gem_bundle_config_path()?.join("Gemfile");
        if proxy.exists() {
            Ok(Some(proxy))
        } else if source_gemfile.exists() {
            Ok(Some(source_gemfile))
        } else {
            Ok(None)
        }
    }

    /// Directory the web server watches for the restart sentinel.
    pub fn restart_dir(&mut self) -> Result<PathBuf, LocateError> {
        if self.is_root() {
            Ok(PathBuf::from(format!("/tmp/{}", self.app.app_id)))
        } else {
            Ok(self.home_dir()?.join(format!(".{}", self.app.app_id)).join("tmp"))
        }
    }

    fn basename_for(&self, identifier: &str) -> &str {
        self.app
            .config_files
            .get(identifier)
            .unwrap_or_else(|| panic!("unknown configuration file identifier '{identifier}'"))
    }
}
