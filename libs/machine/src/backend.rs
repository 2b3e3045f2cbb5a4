//! Virtualization backends and their static image policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MachineError;

/// A virtualization backend a machine image is provisioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// QEMU on Linux.
    Qemu,
    /// Apple Virtualization.framework driven through vfkit.
    AppleHv,
    /// libkrun on Apple silicon.
    LibKrun,
    /// Hyper-V on Windows.
    HyperV,
    /// Windows Subsystem for Linux.
    Wsl,
}

/// Format of the file written into the machine data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationFormat {
    /// Always a flat raw image; qcow2 sources are converted.
    Raw,
    /// Whatever the source was; the extension is carried over.
    SameAsSource,
}

/// Static image policy of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePolicy {
    /// Accepted source extensions, lowercase, with the leading dot.
    pub accepted_extensions: &'static [&'static str],
    /// Destination format.
    pub destination: DestinationFormat,
    /// Whether the accepted formats carry a sniffable signature.
    pub content_sniffable: bool,
}

impl ImagePolicy {
    /// True when the destination must be converted to raw.
    pub fn converts_to_raw(&self) -> bool {
        self.destination == DestinationFormat::Raw
    }

    /// True when `extension` (lowercase, leading dot) is accepted.
    pub fn accepts(&self, extension: &str) -> bool {
        self.accepted_extensions.contains(&extension)
    }

    /// Accepted extensions joined for error messages.
    pub fn allowed_list(&self) -> String {
        self.accepted_extensions.join(" and ")
    }
}

const DISK_EXTENSIONS: &[&str] = &[".qcow2", ".raw"];
const HYPERV_EXTENSIONS: &[&str] = &[".vhdx", ".vhd"];
const WSL_EXTENSIONS: &[&str] = &[".wsl", ".tar.gz"];

impl Backend {
    /// Every backend, in declaration order.
    pub const ALL: [Backend; 5] = [
        Backend::Qemu,
        Backend::AppleHv,
        Backend::LibKrun,
        Backend::HyperV,
        Backend::Wsl,
    ];

    /// Canonical lowercase name, used in file names and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Qemu => "qemu",
            Backend::AppleHv => "applehv",
            Backend::LibKrun => "libkrun",
            Backend::HyperV => "hyperv",
            Backend::Wsl => "wsl",
        }
    }

    /// The image policy for this backend.
    pub fn image_policy(&self) -> ImagePolicy {
        match self {
            Backend::Qemu => ImagePolicy {
                accepted_extensions: DISK_EXTENSIONS,
                destination: DestinationFormat::SameAsSource,
                content_sniffable: true,
            },
            Backend::AppleHv | Backend::LibKrun => ImagePolicy {
                accepted_extensions: DISK_EXTENSIONS,
                destination: DestinationFormat::Raw,
                content_sniffable: true,
            },
            Backend::HyperV => ImagePolicy {
                accepted_extensions: HYPERV_EXTENSIONS,
                destination: DestinationFormat::SameAsSource,
                content_sniffable: false,
            },
            Backend::Wsl => ImagePolicy {
                accepted_extensions: WSL_EXTENSIONS,
                destination: DestinationFormat::SameAsSource,
                content_sniffable: false,
            },
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = MachineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Backend::ALL
            .into_iter()
            .find(|b| b.as_str() == lower)
            .ok_or_else(|| MachineError::UnknownBackend {
                name: s.to_string(),
                valid: Backend::ALL.iter().map(|b| b.to_string()).collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_roundtrip() {
        for backend in Backend::ALL {
            let parsed: Backend = backend.as_str().parse().unwrap();
            assert_eq!(parsed, backend);
        }
    }

    #[test]
    fn test_backend_parse_case_insensitive() {
        assert_eq!("AppleHV".parse::<Backend>().unwrap(), Backend::AppleHv);
        assert_eq!(" qemu ".parse::<Backend>().unwrap(), Backend::Qemu);
    }

    #[test]
    fn test_backend_parse_unknown() {
        let err = "virtualbox".parse::<Backend>().unwrap_err();
        assert!(err.is_backend_error());
        assert!(err.to_string().contains("virtualbox"));
    }

    #[test]
    fn test_raw_destination_backends() {
        assert!(Backend::AppleHv.image_policy().converts_to_raw());
        assert!(Backend::LibKrun.image_policy().converts_to_raw());
        assert!(!Backend::Qemu.image_policy().converts_to_raw());
        assert!(!Backend::HyperV.image_policy().converts_to_raw());
        assert!(!Backend::Wsl.image_policy().converts_to_raw());
    }

    #[test]
    fn test_allowed_list() {
        assert_eq!(
            Backend::HyperV.image_policy().allowed_list(),
            ".vhdx and .vhd"
        );
    }
}
