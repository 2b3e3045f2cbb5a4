//! Per-backend machine directories.

use std::fs;
use std::path::PathBuf;

use directories::BaseDirs;
use tracing::debug;

use crate::{Backend, MachineConfig, MachineError};

/// Resolves the directory that holds a backend's machine images.
pub trait DirectoryResolver: Send + Sync {
    /// Data directory for `backend`. Implementations may create it.
    fn data_dir(&self, backend: Backend) -> Result<PathBuf, MachineError>;
}

/// Default resolver: `<data home>/<suffix>/<backend>`.
///
/// The data home is the platform user data directory
/// (`~/.local/share` on Linux, `~/Library/Application Support` on macOS,
/// `%APPDATA%` on Windows) unless overridden in [`MachineConfig`].
#[derive(Debug, Clone)]
pub struct MachineDirs {
    data_home: Option<PathBuf>,
    data_dir_suffix: PathBuf,
}

impl MachineDirs {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            data_home: config.data_home.clone(),
            data_dir_suffix: config.data_dir_suffix.clone(),
        }
    }

    fn data_home(&self) -> Result<PathBuf, MachineError> {
        if let Some(home) = &self.data_home {
            return Ok(home.clone());
        }
        BaseDirs::new()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(MachineError::NoDataHome)
    }
}

impl DirectoryResolver for MachineDirs {
    fn data_dir(&self, backend: Backend) -> Result<PathBuf, MachineError> {
        let dir = self
            .data_home()?
            .join(&self.data_dir_suffix)
            .join(backend.as_str());

        fs::create_dir_all(&dir).map_err(|source| MachineError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        debug!(backend = %backend, dir = %dir.display(), "Resolved machine data directory");
        Ok(dir)
    }
}
