//! Preflight errors.

use std::path::PathBuf;

use thiserror::Error;
use vmprep_machine::Backend;

/// Errors from preflight checks.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("{backend} VM provider is unsupported, only wsl and hyperv on Windows, applehv on macOS and qemu on Linux are supported")]
    UnsupportedBackend { backend: Backend },

    #[error("could not find helper binary {name:?}{}", searched_suffix(.searched))]
    HelperBinaryNotFound { name: String, searched: Vec<PathBuf> },

    #[error("{} does not have support for the {required_flag} argument, please update to {name} {minimum_version} or newer", .binary.display())]
    MissingCapability {
        binary: PathBuf,
        name: String,
        required_flag: String,
        minimum_version: String,
    },
}

impl PreflightError {
    /// The helper binary involved, if any.
    pub fn helper_name(&self) -> Option<&str> {
        match self {
            PreflightError::HelperBinaryNotFound { name, .. }
            | PreflightError::MissingCapability { name, .. } => Some(name),
            PreflightError::UnsupportedBackend { .. } => None,
        }
    }
}

fn searched_suffix(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return String::new();
    }
    let dirs: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
    format!(" in {}", dirs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_capability_message() {
        let err = PreflightError::MissingCapability {
            binary: PathBuf::from("/usr/libexec/vmprep/gvproxy"),
            name: "gvproxy".into(),
            required_flag: "-services".into(),
            minimum_version: "v0.8.3".into(),
        };
        assert_eq!(
            err.to_string(),
            "/usr/libexec/vmprep/gvproxy does not have support for the -services argument, please update to gvproxy v0.8.3 or newer"
        );
        assert_eq!(err.helper_name(), Some("gvproxy"));
    }

    #[test]
    fn test_not_found_lists_searched() {
        let err = PreflightError::HelperBinaryNotFound {
            name: "vfkit".into(),
            searched: vec![PathBuf::from("/opt/a"), PathBuf::from("/opt/b")],
        };
        assert_eq!(
            err.to_string(),
            "could not find helper binary \"vfkit\" in /opt/a, /opt/b"
        );

        let bare = PreflightError::HelperBinaryNotFound {
            name: "vfkit".into(),
            searched: Vec::new(),
        };
        assert_eq!(bare.to_string(), "could not find helper binary \"vfkit\"");
    }
}
