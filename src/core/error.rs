// Author: Dustin Pilgrim
// License: MIT

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum LocateError {
    /// A required configuration file is absent from every candidate
    /// location. The message carries remediation text for the operator.
    ConfigNotFound { basename: String, hint: String },

    /// A username could not be resolved against the user database.
    UnknownUser(String),

    /// Filesystem errors other than the permission-denied case that the
    /// log writability probe handles itself.
    Io(io::Error),
}

impl fmt::Display for LocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateError::ConfigNotFound { basename, hint } => {
                write!(
                    f,
                    "The configuration file '{basename}' cannot be found. {hint}"
                )
            }
            LocateError::UnknownUser(name) =>
                write!(f, "user '{name}' does not exist"),
            LocateError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl From<io::Error> for LocateError {
    fn from(e: io::Error) -> Self {
        LocateError::Io(e)
    }
}

impl std::error::Error for LocateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LocateError::Io(e) => Some(e),
            _ => None,
        }
    }
}
