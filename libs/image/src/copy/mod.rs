//! Copy strategies.
//!
//! Which strategy runs is a pure function of the host OS and the backend:
//!
//! | host    | backend                   | strategy    |
//! |---------|---------------------------|-------------|
//! | any     | raw destination backends  | Converting  |
//! | Windows | wsl, hyperv               | Accelerated |
//! | any     | everything else           | Generic     |

mod accelerated;
mod generic;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vmprep_machine::{Backend, HelperBinaries, HelperBinaryLocator, HostOs, MachineConfig};

use crate::convert::FormatConverter;
use crate::{ImageError, ImageSource};

pub use accelerated::{interpret_exit_code, AcceleratedCopy, SUCCESS_EXIT_CODE_LIMIT};
pub use generic::GenericCopy;

/// How an image reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyOutcome {
    /// Bytes copied unchanged.
    Copied,
    /// Source converted to raw.
    Converted,
    /// The accelerated utility was missing; bytes copied generically.
    FallbackUsed,
}

impl CopyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyOutcome::Copied => "copied",
            CopyOutcome::Converted => "converted",
            CopyOutcome::FallbackUsed => "fallback-used",
        }
    }
}

impl std::fmt::Display for CopyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Generic,
    Accelerated,
    Converting,
}

/// Pick the strategy for `backend` on `host_os`.
pub fn select_strategy(host_os: HostOs, backend: Backend) -> StrategyKind {
    if backend.image_policy().converts_to_raw() {
        return StrategyKind::Converting;
    }
    match (host_os, backend) {
        (HostOs::Windows, Backend::Wsl | Backend::HyperV) => StrategyKind::Accelerated,
        _ => StrategyKind::Generic,
    }
}

/// True when both paths exist and resolve to the same location.
pub(crate) fn same_location(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Moves a validated source to its destination.
pub trait CopyStrategy {
    fn kind(&self) -> StrategyKind;

    fn copy(&self, source: &ImageSource, destination: &Path) -> Result<CopyOutcome, ImageError>;
}

/// Converts to raw regardless of host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertingCopy {
    converter: FormatConverter,
}

impl CopyStrategy for ConvertingCopy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Converting
    }

    fn copy(&self, source: &ImageSource, destination: &Path) -> Result<CopyOutcome, ImageError> {
        self.converter.materialize(source, destination)
    }
}

/// Dispatches to the strategy for the configured host.
pub struct PlatformCopyStrategy {
    host_os: HostOs,
    generic: GenericCopy,
    accelerated: AcceleratedCopy,
    converting: ConvertingCopy,
}

impl PlatformCopyStrategy {
    pub fn new(config: &MachineConfig) -> Self {
        let locator = Arc::new(HelperBinaries::search_path_only(config.search_path.clone()));
        Self::with_locator(config, locator)
    }

    /// Use `locator` to find the accelerated copy utility.
    pub fn with_locator(config: &MachineConfig, locator: Arc<dyn HelperBinaryLocator>) -> Self {
        Self {
            host_os: config.host.os,
            generic: GenericCopy,
            accelerated: AcceleratedCopy::new(&config.accelerated_copy_tool, locator),
            converting: ConvertingCopy::default(),
        }
    }

    /// The strategy that would run for `backend`.
    pub fn strategy_for(&self, backend: Backend) -> &dyn CopyStrategy {
        match select_strategy(self.host_os, backend) {
            StrategyKind::Generic => &self.generic,
            StrategyKind::Accelerated => &self.accelerated,
            StrategyKind::Converting => &self.converting,
        }
    }

    pub fn copy(
        &self,
        source: &ImageSource,
        destination: &Path,
        backend: Backend,
    ) -> Result<CopyOutcome, ImageError> {
        let strategy = self.strategy_for(backend);
        debug!(
            backend = %backend,
            strategy = ?strategy.kind(),
            source = %source.path().display(),
            destination = %destination.display(),
            "Copying image"
        );
        strategy.copy(source, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use vmprep_machine::{HostArch, HostPlatform};

    #[rstest]
    #[case(HostOs::Linux, Backend::Qemu, StrategyKind::Generic)]
    #[case(HostOs::MacOs, Backend::AppleHv, StrategyKind::Converting)]
    #[case(HostOs::MacOs, Backend::LibKrun, StrategyKind::Converting)]
    #[case(HostOs::Linux, Backend::AppleHv, StrategyKind::Converting)]
    #[case(HostOs::Windows, Backend::Wsl, StrategyKind::Accelerated)]
    #[case(HostOs::Windows, Backend::HyperV, StrategyKind::Accelerated)]
    #[case(HostOs::Windows, Backend::Qemu, StrategyKind::Generic)]
    #[case(HostOs::Linux, Backend::Wsl, StrategyKind::Generic)]
    #[case(HostOs::Other, Backend::HyperV, StrategyKind::Generic)]
    fn test_strategy_table(#[case] os: HostOs, #[case] backend: Backend, #[case] expected: StrategyKind) {
        assert_eq!(select_strategy(os, backend), expected);
    }

    #[test]
    fn test_platform_dispatch_matches_table() {
        let config = MachineConfig::default()
            .with_host(HostPlatform::new(HostOs::Windows, HostArch::X86_64));
        let strategy = PlatformCopyStrategy::new(&config);
        for backend in Backend::ALL {
            assert_eq!(
                strategy.strategy_for(backend).kind(),
                select_strategy(HostOs::Windows, backend)
            );
        }
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&CopyOutcome::FallbackUsed).unwrap(),
            "\"fallback-used\""
        );
        assert_eq!(CopyOutcome::Converted.to_string(), "converted");
    }
}
