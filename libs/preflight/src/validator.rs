//! Runs capability probes against helper binaries.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, error, info};
use vmprep_machine::{Backend, HelperBinaries, HelperBinaryLocator, HostPlatform, MachineConfig};

use crate::{requirements_for, CapabilityRequirement, PreflightError, PROBE_ARG};

/// Validates helper binaries for a backend.
pub struct PreflightValidator {
    host: HostPlatform,
    locator: Arc<dyn HelperBinaryLocator>,
}

impl PreflightValidator {
    pub fn new(config: &MachineConfig) -> Self {
        Self::with_locator(config.host, Arc::new(HelperBinaries::new(config)))
    }

    pub fn with_locator(host: HostPlatform, locator: Arc<dyn HelperBinaryLocator>) -> Self {
        Self { host, locator }
    }

    /// Backends preflights accept on this host.
    ///
    /// libkrun resolves as a backend on arm64 macOS but is not supported
    /// for machine creation.
    pub fn supported_backends(&self) -> Vec<Backend> {
        self.host
            .supported_backends()
            .into_iter()
            .filter(|backend| *backend != Backend::LibKrun)
            .collect()
    }

    /// Check every requirement for `backend`. Stops at the first failure.
    pub fn run(&self, backend: Backend) -> Result<(), PreflightError> {
        if !self.supported_backends().contains(&backend) {
            return Err(PreflightError::UnsupportedBackend { backend });
        }

        for requirement in requirements_for(backend) {
            self.check(&requirement)?;
        }

        info!(backend = %backend, "Preflight checks passed");
        Ok(())
    }

    /// Check a single requirement.
    pub fn check(&self, requirement: &CapabilityRequirement) -> Result<(), PreflightError> {
        let binary = self.locator.find(requirement.binary).ok_or_else(|| {
            PreflightError::HelperBinaryNotFound {
                name: requirement.binary.to_string(),
                searched: self.locator.searched(),
            }
        })?;

        let output = probe(&binary);
        if !output.contains(requirement.required_flag) {
            return Err(PreflightError::MissingCapability {
                binary,
                name: requirement.binary.to_string(),
                required_flag: requirement.required_flag.to_string(),
                minimum_version: requirement.minimum_version.to_string(),
            });
        }

        debug!(
            binary = %binary.display(),
            flag = %requirement.required_flag,
            "Helper binary supports required flag"
        );
        Ok(())
    }
}

/// Run `binary --help` and return stdout and stderr together.
///
/// A failed run yields whatever was captured, possibly nothing.
fn probe(binary: &Path) -> String {
    let output = match Command::new(binary)
        .arg(PROBE_ARG)
        .stdin(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            error!(path = %binary.display(), error = %e, "Failed to run helper binary");
            return String::new();
        }
    };

    if !output.status.success() {
        error!(
            path = %binary.display(),
            status = %output.status,
            "Helper binary exited with failure"
        );
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

/// Run preflights for `backend` with helpers located per `config`.
pub fn run_preflights(backend: Backend, config: &MachineConfig) -> Result<(), PreflightError> {
    PreflightValidator::new(config).run(backend)
}
