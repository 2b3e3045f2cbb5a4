//! Capability requirements per backend.

use serde::Serialize;
use vmprep_machine::Backend;

/// Argument used to make helpers print their supported flags.
pub const PROBE_ARG: &str = "--help";

/// A helper binary that must advertise a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityRequirement {
    /// Logical helper name, resolved through the helper locator.
    pub binary: &'static str,
    /// Substring expected in the probe output.
    pub required_flag: &'static str,
    /// First release with the flag, for error hints.
    pub minimum_version: &'static str,
}

/// Network forwarder; `-services` exposes the API socket.
const GVPROXY: CapabilityRequirement = CapabilityRequirement {
    binary: "gvproxy",
    required_flag: "-services",
    minimum_version: "v0.8.3",
};

/// `--cloud-init` injects ssh keys into cloud images.
const VFKIT: CapabilityRequirement = CapabilityRequirement {
    binary: "vfkit",
    required_flag: "--cloud-init",
    minimum_version: "v0.6.1",
};

/// Requirements to check for `backend`, in order.
pub fn requirements_for(backend: Backend) -> Vec<CapabilityRequirement> {
    let mut requirements = Vec::new();
    if backend != Backend::Wsl {
        requirements.push(GVPROXY);
    }
    if matches!(backend, Backend::AppleHv | Backend::LibKrun) {
        requirements.push(VFKIT);
    }
    requirements
}
