//! Helper binary lookup.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::MachineConfig;

/// Resolves helper executables (gvproxy, vfkit, robocopy, ...) by name.
pub trait HelperBinaryLocator: Send + Sync {
    /// Absolute path of `name`, or `None` when it cannot be found.
    fn find(&self, name: &str) -> Option<PathBuf>;

    /// Locations consulted, for error messages.
    fn searched(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Searches configured helper directories first, then the executable
/// search path.
#[derive(Debug, Clone)]
pub struct HelperBinaries {
    dirs: Vec<PathBuf>,
    search_path: Option<OsString>,
}

impl HelperBinaries {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            dirs: config.helper_binary_dirs.clone(),
            search_path: config.search_path.clone(),
        }
    }

    /// Only look on the search path.
    pub fn search_path_only(search_path: Option<OsString>) -> Self {
        Self {
            dirs: Vec::new(),
            search_path,
        }
    }

    fn find_in_dirs(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{name}{}", std::env::consts::EXE_SUFFIX);
        self.dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| is_executable(candidate))
    }

    fn find_on_search_path(&self, name: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(name, Some(search_path), cwd).ok()
    }
}

impl HelperBinaryLocator for HelperBinaries {
    fn find(&self, name: &str) -> Option<PathBuf> {
        let found = self
            .find_in_dirs(name)
            .or_else(|| self.find_on_search_path(name));

        match &found {
            Some(path) => debug!(binary = %name, path = %path.display(), "Found helper binary"),
            None => debug!(binary = %name, "Helper binary not found"),
        }
        found
    }

    fn searched(&self) -> Vec<PathBuf> {
        let mut searched = self.dirs.clone();
        if let Some(path) = &self.search_path {
            searched.extend(std::env::split_paths(path));
        }
        searched
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
