//! Machine image puller.
//!
//! Ties validation, destination path computation, and copying together:
//! set a source, then `download()` validates it for the backend and places
//! it in the machine's data directory in the form the backend boots from.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};
use vmprep_machine::{
    validate_machine_name, Backend, DirectoryResolver, HelperBinaryLocator, MachineConfig,
    MachineDirs,
};

use crate::copy::{CopyOutcome, PlatformCopyStrategy};
use crate::path::{LocalImageHandle, PathComputer};
use crate::resolver::SourceResolver;
use crate::{ImageError, ImageSource};

/// Result of a successful pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullResult {
    /// Where the image now lives.
    pub local_path: PathBuf,

    /// Size of the destination file in bytes.
    pub size_bytes: u64,

    /// How the bytes got there.
    pub outcome: CopyOutcome,

    /// Time taken to copy or convert.
    pub duration_ms: u64,
}

/// Places a local source image where a machine's backend expects it.
pub struct ImagePuller {
    backend: Backend,
    source: Option<ImageSource>,
    resolver: SourceResolver,
    paths: PathComputer,
    copier: PlatformCopyStrategy,
}

impl ImagePuller {
    /// Create a puller that stores images under the configured data home.
    pub fn new(machine_name: &str, backend: Backend, config: &MachineConfig) -> Result<Self, ImageError> {
        let dirs = MachineDirs::new(config);
        Self::with_resolver(machine_name, backend, config, Arc::new(dirs))
    }

    /// Create a puller with a custom data directory resolver.
    pub fn with_resolver(
        machine_name: &str,
        backend: Backend,
        config: &MachineConfig,
        dirs: Arc<dyn DirectoryResolver>,
    ) -> Result<Self, ImageError> {
        validate_machine_name(machine_name)?;

        Ok(Self {
            backend,
            source: None,
            resolver: SourceResolver::new(config.host),
            paths: PathComputer::new(machine_name, backend, dirs),
            copier: PlatformCopyStrategy::new(config),
        })
    }

    /// Use `locator` to find the accelerated copy utility.
    pub fn with_copy_tool_locator(
        mut self,
        config: &MachineConfig,
        locator: Arc<dyn HelperBinaryLocator>,
    ) -> Self {
        self.copier = PlatformCopyStrategy::with_locator(config, locator);
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn source(&self) -> Option<&ImageSource> {
        self.source.as_ref()
    }

    /// Set the local source image.
    pub fn set_source_uri(&mut self, path: impl Into<PathBuf>) {
        let source = ImageSource::new(path);
        debug!(
            source = %source.path().display(),
            extension = %source.declared_extension(),
            "Source image set"
        );
        self.source = Some(source);
    }

    /// Destination path for the current source.
    ///
    /// The first successful call fixes the answer for this puller.
    pub fn local_path(&mut self) -> Result<PathBuf, ImageError> {
        Ok(self.local_handle()?.path.clone())
    }

    /// Destination handle for the current source.
    pub fn local_handle(&mut self) -> Result<&LocalImageHandle, ImageError> {
        let backend = self.backend;
        let source = self.source.as_ref();
        self.paths.local_path_with(|| {
            let source = source.ok_or(ImageError::SourceNotSet)?;
            Ok(SourceResolver::destination_for(backend, source.declared_extension())?.extension)
        })
    }

    /// Validate the source and copy or convert it into place.
    pub fn download(&mut self) -> Result<PullResult, ImageError> {
        let source = self.source.as_ref().ok_or(ImageError::SourceNotSet)?;
        let spec = self.resolver.validate(source, self.backend)?;
        let local_path = self.paths.local_path(&spec.extension)?.path.clone();

        info!(
            backend = %self.backend,
            source = %source.path().display(),
            destination = %local_path.display(),
            "Pulling machine image"
        );

        let start = Instant::now();
        let outcome = self.copier.copy(source, &local_path, self.backend)?;
        let duration_ms = start.elapsed().as_millis() as u64;
        let size_bytes = std::fs::metadata(&local_path).map(|m| m.len()).unwrap_or(0);

        info!(
            backend = %self.backend,
            destination = %local_path.display(),
            outcome = %outcome,
            size_bytes,
            duration_ms,
            "Machine image ready"
        );

        Ok(PullResult {
            local_path,
            size_bytes,
            outcome,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vmprep_machine::{HostArch, HostOs, HostPlatform, MachineError};

    fn linux_config(home: &std::path::Path) -> MachineConfig {
        MachineConfig::default()
            .with_host(HostPlatform::new(HostOs::Linux, HostArch::X86_64))
            .with_data_home(home)
    }

    #[test]
    fn test_rejects_invalid_machine_name() {
        let temp = TempDir::new().unwrap();
        let err = ImagePuller::new("-bad", Backend::Qemu, &linux_config(temp.path()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ImageError::Machine(MachineError::InvalidMachineName { .. })
        ));
    }

    #[test]
    fn test_download_without_source() {
        let temp = TempDir::new().unwrap();
        let mut puller = ImagePuller::new("dev", Backend::Qemu, &linux_config(temp.path())).unwrap();
        assert!(matches!(puller.download(), Err(ImageError::SourceNotSet)));
        assert!(matches!(puller.local_path(), Err(ImageError::SourceNotSet)));
    }

    #[test]
    fn test_local_path_uses_destination_extension() {
        let temp = TempDir::new().unwrap();
        let config = linux_config(temp.path());
        let mut puller = ImagePuller::new("dev", Backend::Qemu, &config).unwrap();
        puller.set_source_uri("/images/fedora.qcow2");

        let path = puller.local_path().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("containers/vmprep/machine/qemu/dev-qemu.qcow2"));

        // fixed after the first call
        puller.set_source_uri("/images/fedora.raw");
        assert_eq!(puller.local_path().unwrap(), path);
    }

    #[test]
    fn test_custom_copy_tool_locator() {
        struct NoTools;
        impl HelperBinaryLocator for NoTools {
            fn find(&self, _name: &str) -> Option<PathBuf> {
                None
            }
        }

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("disk.vhdx");
        std::fs::write(&src, b"vhdx bytes").unwrap();

        let config = MachineConfig::default()
            .with_host(HostPlatform::new(HostOs::Windows, HostArch::X86_64))
            .with_data_home(temp.path());
        let mut puller = ImagePuller::new("dev", Backend::HyperV, &config)
            .unwrap()
            .with_copy_tool_locator(&config, Arc::new(NoTools));
        puller.set_source_uri(&src);

        let result = puller.download().unwrap();
        assert_eq!(result.outcome, CopyOutcome::FallbackUsed);
        assert!(result.local_path.ends_with("hyperv/dev-hyperv.vhdx"));
    }

    #[test]
    fn test_download_qemu_copies_unchanged() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("disk.raw");
        std::fs::write(&src, b"raw bytes").unwrap();

        let mut puller = ImagePuller::new("dev", Backend::Qemu, &linux_config(temp.path())).unwrap();
        puller.set_source_uri(&src);
        let result = puller.download().unwrap();

        assert_eq!(result.outcome, CopyOutcome::Copied);
        assert_eq!(result.size_bytes, 9);
        assert_eq!(std::fs::read(&result.local_path).unwrap(), b"raw bytes");
    }
}
