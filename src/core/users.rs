// Author: Dustin Pilgrim
// License: MIT

use std::ffi::{CStr, CString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// A resolved passwd entry. Only the fields the locator and installer
/// actually consume.
#[derive(Debug, Clone)]
pub struct UserEntry {
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// The OS user database, consumed as a capability so tests can inject
/// a fake instead of touching the real passwd/group files.
pub trait UserDatabase: Send + Sync {
    fn lookup(&self, username: &str) -> Option<UserEntry>;

    fn group_name(&self, gid: u32) -> Option<String>;

    /// Name of the process's effective user.
    fn effective_username(&self) -> Option<String>;
}

/// Real implementation backed by getpwnam_r/getgrgid_r.
pub struct SystemUsers;

impl UserDatabase for SystemUsers {
    fn lookup(&self, username: &str) -> Option<UserEntry> {
        let name = CString::new(username).ok()?;
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf = vec![0_i8; 4096];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwnam_r(
                name.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc != 0 || result.is_null() {
            return None;
        }

        Some(entry_from(&pwd))
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut buf = vec![0_i8; 4096];
        let mut result: *mut libc::group = std::ptr::null_mut();

        let rc = unsafe {
            libc::getgrgid_r(
                gid as libc::gid_t,
                &mut grp,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc != 0 || result.is_null() {
            return None;
        }

        Some(unsafe { CStr::from_ptr(grp.gr_name) }.to_string_lossy().into_owned())
    }

    fn effective_username(&self) -> Option<String> {
        let euid = unsafe { libc::geteuid() };
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf = vec![0_i8; 4096];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwuid_r(
                euid,
                &mut pwd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc != 0 || result.is_null() {
            return None;
        }

        Some(unsafe { CStr::from_ptr(pwd.pw_name) }.to_string_lossy().into_owned())
    }
}

fn entry_from(pwd: &libc::passwd) -> UserEntry {
    let home = unsafe { CStr::from_ptr(pwd.pw_dir) }.to_string_lossy().into_owned();
    UserEntry {
        uid: pwd.pw_uid as u32,
        gid: pwd.pw_gid as u32,
        home: PathBuf::from(home),
    }
}

/// Assign ownership of a path. Used for directories the locator creates
/// on behalf of the target user.
pub fn chown(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), uid as libc::uid_t, gid as libc::gid_t) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
