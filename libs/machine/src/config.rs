//! Configuration for the image layer.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::{HostOs, HostPlatform};

/// Default tool prefix; names the data directory and helper directories.
const DEFAULT_TOOL_PREFIX: &str = "vmprep";

/// Accelerated copy utility looked up on Windows hosts.
const DEFAULT_ACCELERATED_COPY_TOOL: &str = "robocopy";

/// Explicit configuration shared by the puller and the preflight checks.
///
/// Built once at process start with [`MachineConfig::from_env`] and passed
/// into each component. Tests construct it directly.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Prefix used for directory names.
    pub tool_prefix: String,

    /// Overrides the platform user data directory.
    pub data_home: Option<PathBuf>,

    /// Path below the data home holding per-backend directories.
    pub data_dir_suffix: PathBuf,

    /// Directories searched for helper binaries before the search path.
    pub helper_binary_dirs: Vec<PathBuf>,

    /// Executable search path (`PATH` syntax). `None` searches nothing.
    pub search_path: Option<OsString>,

    /// Name of the accelerated bulk-copy utility.
    pub accelerated_copy_tool: String,

    /// Host the images are provisioned on.
    pub host: HostPlatform,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::for_prefix(DEFAULT_TOOL_PREFIX)
    }
}

impl MachineConfig {
    /// Configuration for the running host with default directories.
    pub fn for_prefix(prefix: &str) -> Self {
        let host = HostPlatform::current();
        Self {
            tool_prefix: prefix.to_string(),
            data_home: None,
            data_dir_suffix: default_data_dir_suffix(prefix),
            helper_binary_dirs: default_helper_dirs(prefix, host.os),
            search_path: None,
            accelerated_copy_tool: DEFAULT_ACCELERATED_COPY_TOOL.to_string(),
            host,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Recognised variables:
    /// - `VMPREP_DATA_HOME`: replaces the platform data directory
    /// - `VMPREP_DATA_DIR`: replaces the data directory suffix
    /// - `VMPREP_HELPER_BINARIES_DIR`: helper directories, `PATH` syntax,
    ///   searched before the defaults
    /// - `PATH`: executable search path
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = Self::default();

        if let Some(home) = lookup("VMPREP_DATA_HOME").filter(|v| !v.is_empty()) {
            config.data_home = Some(PathBuf::from(home));
        }

        if let Some(suffix) = lookup("VMPREP_DATA_DIR").filter(|v| !v.is_empty()) {
            config.data_dir_suffix = PathBuf::from(suffix);
        }

        if let Some(dirs) = lookup("VMPREP_HELPER_BINARIES_DIR").filter(|v| !v.is_empty()) {
            let mut helper_dirs: Vec<PathBuf> = std::env::split_paths(&dirs).collect();
            helper_dirs.append(&mut config.helper_binary_dirs);
            config.helper_binary_dirs = helper_dirs;
        }

        config.search_path = lookup("PATH");
        config
    }

    /// Set the host platform.
    ///
    /// Default helper directories follow the new host; directories added
    /// ahead of them are kept.
    pub fn with_host(mut self, host: HostPlatform) -> Self {
        let old_defaults = default_helper_dirs(&self.tool_prefix, self.host.os);
        if self.helper_binary_dirs.ends_with(&old_defaults) {
            let keep = self.helper_binary_dirs.len() - old_defaults.len();
            self.helper_binary_dirs.truncate(keep);
            self.helper_binary_dirs
                .extend(default_helper_dirs(&self.tool_prefix, host.os));
        }
        self.host = host;
        self
    }

    /// Set the data home.
    pub fn with_data_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.data_home = Some(home.into());
        self
    }

    /// Replace the executable search path.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Replace the helper binary directories.
    pub fn with_helper_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.helper_binary_dirs = dirs;
        self
    }
}

fn default_data_dir_suffix(prefix: &str) -> PathBuf {
    PathBuf::from("containers").join(prefix).join("machine")
}

fn default_helper_dirs(prefix: &str, os: HostOs) -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from(format!("/usr/local/libexec/{prefix}")),
        PathBuf::from(format!("/usr/local/lib/{prefix}")),
        PathBuf::from(format!("/usr/libexec/{prefix}")),
        PathBuf::from(format!("/usr/lib/{prefix}")),
    ];
    if os == HostOs::MacOs {
        dirs.push(PathBuf::from("/opt/homebrew/bin"));
        dirs.push(PathBuf::from("/opt/podman/bin"));
    }
    dirs
}
