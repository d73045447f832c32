// Author: Dustin Pilgrim
// License: MIT

use std::collections::BTreeMap;
use std::path::PathBuf;

use eyre::{Result, bail};

use crate::core::error::LocateError;
use crate::core::users::UserDatabase;

/// Environment variable that overrides which user the tool pretends to
/// run as.
pub const USER_ENV_VAR: &str = "QUAY_USER";

/// Whether the packaged application ships an installer, and if so how to
/// invoke it. Drives the remediation hint printed when a required config
/// file is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerSpec {
    /// No installer; the operator has to create files by hand.
    None,

    /// An installer exists but its command is not known here.
    Present,

    /// Installer command, either a bare name under `{source_root}/bin/`
    /// or a path containing a slash, used verbatim.
    Command(String),
}

/// Identity of the packaged web application. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct AppIdentity {
    pub app_id: String,
    pub app_name: String,
    pub app_version: String,
    pub source_root: PathBuf,
    pub config_files: BTreeMap<String, String>,
    pub installer: InstallerSpec,
}

impl AppIdentity {
    pub fn new(
        app_id: impl Into<String>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        source_root: impl Into<PathBuf>,
        config_files: BTreeMap<String, String>,
        installer: InstallerSpec,
    ) -> Result<Self> {
        let app_id = app_id.into();
        let app_name = app_name.into();
        let app_version = app_version.into();
        let source_root = source_root.into();

        if app_id.is_empty() {
            bail!("the app id is required");
        }
        if app_name.is_empty() {
            bail!("the app name is required");
        }
        if app_version.is_empty() {
            bail!("the app version is required");
        }
        if source_root.as_os_str().is_empty() {
            bail!("the source root is required");
        }
        if !source_root.is_absolute() {
            bail!("the source root must be an absolute path");
        }

        Ok(Self {
            app_id,
            app_name,
            app_version,
            source_root,
            config_files,
            installer,
        })
    }

    /// Full installer invocation for remediation messages, with the target
    /// username appended. None when no concrete command is configured.
    pub fn installer_command(&self, username: &str) -> Option<String> {
        match &self.installer {
            InstallerSpec::Command(cmd) => {
                let mut result = if cmd.contains('/') {
                    cmd.clone()
                } else {
                    format!("{}/bin/{}", self.source_root.display(), cmd)
                };
                result.push_str(&format!(" -u {username}"));
                Some(result)
            }
            _ => None,
        }
    }
}

/// The user the tool acts on behalf of. uid/gid/home are resolved lazily
/// against the user database and cached; reassigning the username drops
/// the cache so derived fields can never go stale.
#[derive(Debug, Clone)]
pub struct RuntimeIdentity {
    username: String,
    uid: Option<u32>,
    gid: Option<u32>,
    home: Option<PathBuf>,
}

impl RuntimeIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            uid: None,
            gid: None,
            home: None,
        }
    }

    /// Default identity: QUAY_USER if set, else the effective user of
    /// this process.
    pub fn from_env(db: &dyn UserDatabase) -> Result<Self> {
        if let Ok(name) = std::env::var(USER_ENV_VAR) {
            return Ok(Self::new(name));
        }
        match db.effective_username() {
            Some(name) => Ok(Self::new(name)),
            None => bail!("cannot determine the current user"),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Reassign the identity. Invalidates every derived field.
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
        self.uid = None;
        self.gid = None;
        self.home = None;
    }

    pub fn is_root(&self) -> bool {
        self.username == "root"
    }

    pub fn uid(&mut self, db: &dyn UserDatabase) -> Result<u32, LocateError> {
        if let Some(uid) = self.uid {
            return Ok(uid);
        }
        let entry = self.resolve(db)?;
        Ok(entry.uid)
    }

    pub fn gid(&mut self, db: &dyn UserDatabase) -> Result<u32, LocateError> {
        if let Some(gid) = self.gid {
            return Ok(gid);
        }
        let entry = self.resolve(db)?;
        Ok(entry.gid)
    }

    pub fn home_dir(&mut self, db: &dyn UserDatabase) -> Result<PathBuf, LocateError> {
        if let Some(home) = &self.home {
            return Ok(home.clone());
        }
        let entry = self.resolve(db)?;
        Ok(entry.home)
    }

    fn resolve(&mut self, db: &dyn UserDatabase) -> Result<crate::core::users::UserEntry, LocateError> {
        let entry = db
            .lookup(&self.username)
            .ok_or_else(|| LocateError::UnknownUser(self.username.clone()))?;
        self.uid = Some(entry.uid);
        self.gid = Some(entry.gid);
        self.home = Some(entry.home.clone());
        Ok(entry)
    }
}
