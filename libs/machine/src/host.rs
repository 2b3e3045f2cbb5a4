//! Host platform detection and per-host backend availability.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Backend, MachineError};

/// Operating system family of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

/// CPU architecture of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostArch {
    X86_64,
    Aarch64,
    Other,
}

/// The host a machine image is provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPlatform {
    pub os: HostOs,
    pub arch: HostArch,
}

impl HostOs {
    /// The OS this binary was built for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => HostOs::Linux,
            "macos" => HostOs::MacOs,
            "windows" => HostOs::Windows,
            _ => HostOs::Other,
        }
    }
}

impl HostArch {
    /// The architecture this binary was built for.
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86_64" => HostArch::X86_64,
            "aarch64" => HostArch::Aarch64,
            _ => HostArch::Other,
        }
    }
}

impl HostPlatform {
    pub fn new(os: HostOs, arch: HostArch) -> Self {
        Self { os, arch }
    }

    /// The platform this binary runs on.
    pub fn current() -> Self {
        Self::new(HostOs::current(), HostArch::current())
    }

    /// Backends usable on this host, default first.
    pub fn supported_backends(&self) -> Vec<Backend> {
        match self.os {
            HostOs::Linux => vec![Backend::Qemu],
            HostOs::MacOs => {
                let mut backends = vec![Backend::AppleHv];
                if self.arch == HostArch::Aarch64 {
                    backends.push(Backend::LibKrun);
                }
                backends
            }
            HostOs::Windows => vec![Backend::Wsl, Backend::HyperV],
            HostOs::Other => Vec::new(),
        }
    }

    /// True when `backend` can run on this host.
    pub fn supports(&self, backend: Backend) -> bool {
        self.supported_backends().contains(&backend)
    }

    /// The backend used when none is requested.
    pub fn default_backend(&self) -> Option<Backend> {
        self.supported_backends().first().copied()
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostOs::Linux => "linux",
            HostOs::MacOs => "macos",
            HostOs::Windows => "windows",
            HostOs::Other => "unknown-os",
        })
    }
}

impl fmt::Display for HostArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostArch::X86_64 => "x86_64",
            HostArch::Aarch64 => "aarch64",
            HostArch::Other => "unknown-arch",
        })
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Resolve a backend name for `host`, falling back to the host default when
/// `name` is empty.
pub fn resolve_backend(name: Option<&str>, host: HostPlatform) -> Result<Backend, MachineError> {
    let valid = || {
        host.supported_backends()
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
    };

    let backend = match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => host.default_backend().ok_or_else(|| MachineError::UnknownBackend {
            name: String::new(),
            valid: valid(),
        })?,
        Some(name) => name
            .parse::<Backend>()
            .map_err(|_| MachineError::UnknownBackend {
                name: name.to_string(),
                valid: valid(),
            })?,
    };

    if backend == Backend::LibKrun && host.os == HostOs::MacOs && host.arch != HostArch::Aarch64 {
        return Err(MachineError::BackendUnavailable {
            backend,
            host,
            hint: Some("Please revert to the applehv provider"),
        });
    }

    if !host.supports(backend) {
        return Err(MachineError::UnknownBackend {
            name: backend.to_string(),
            valid: valid(),
        });
    }

    debug!(backend = %backend, host = %host, "Using virtualization provider");
    Ok(backend)
}
