//! Destination path computation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use vmprep_machine::{Backend, DirectoryResolver};

use crate::ImageError;

/// Where a machine's image lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalImageHandle {
    pub machine_name: String,
    pub backend: Backend,
    pub path: PathBuf,
}

impl LocalImageHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<machine>-<backend><ext>`.
pub fn image_file_name(machine_name: &str, backend: Backend, extension: &str) -> String {
    format!("{machine_name}-{backend}{extension}")
}

/// Computes a machine's destination path once and remembers it.
///
/// Later calls return the first answer even if the resolver would now
/// answer differently.
pub struct PathComputer {
    machine_name: String,
    backend: Backend,
    resolver: Arc<dyn DirectoryResolver>,
    cached: Option<LocalImageHandle>,
}

impl PathComputer {
    pub fn new(machine_name: &str, backend: Backend, resolver: Arc<dyn DirectoryResolver>) -> Self {
        Self {
            machine_name: machine_name.to_string(),
            backend,
            resolver,
            cached: None,
        }
    }

    /// The destination handle, computing it on first use with `extension`.
    pub fn local_path(&mut self, extension: &str) -> Result<&LocalImageHandle, ImageError> {
        self.local_path_with(|| Ok(extension.to_string()))
    }

    /// Like [`local_path`](Self::local_path), but only asks for the
    /// extension when nothing is cached yet.
    pub fn local_path_with<F>(&mut self, extension: F) -> Result<&LocalImageHandle, ImageError>
    where
        F: FnOnce() -> Result<String, ImageError>,
    {
        let handle = match self.cached.take() {
            Some(handle) => handle,
            None => {
                let extension = extension()?;
                let dir = self.resolver.data_dir(self.backend)?;
                let file_name = image_file_name(&self.machine_name, self.backend, &extension);
                LocalImageHandle {
                    machine_name: self.machine_name.clone(),
                    backend: self.backend,
                    path: absolute(dir.join(file_name)),
                }
            }
        };
        Ok(self.cached.insert(handle))
    }

    /// The cached handle, if computed.
    pub fn cached(&self) -> Option<&LocalImageHandle> {
        self.cached.as_ref()
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}
