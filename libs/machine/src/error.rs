//! Error types for backend resolution and machine directories.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{Backend, HostPlatform};

/// Errors raised while resolving backends, names, and directories.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The backend name is not one this host understands.
    #[error("unknown provider `{name}`. Valid providers are: {}", .valid.join(", "))]
    UnknownBackend { name: String, valid: Vec<String> },

    /// The backend exists but cannot run on this host.
    #[error("{backend} is not supported on {host}{}", .hint.map(|h| format!(". {h}")).unwrap_or_default())]
    BackendUnavailable {
        backend: Backend,
        host: HostPlatform,
        hint: Option<&'static str>,
    },

    /// The machine name fails validation.
    #[error("invalid machine name {name:?}: {reason}")]
    InvalidMachineName { name: String, reason: String },

    /// No home directory could be determined for the current user.
    #[error("could not determine the user data directory")]
    NoDataHome,

    /// Creating the backend data directory failed.
    #[error("failed to create data directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MachineError {
    /// Returns true if the error concerns the backend selection.
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            MachineError::UnknownBackend { .. } | MachineError::BackendUnavailable { .. }
        )
    }
}
