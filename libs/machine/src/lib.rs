//! # vmprep-machine
//!
//! Shared vocabulary for the vmprep image layer: virtualization backends and
//! their static image policies, the host platform they run on, and the
//! collaborators that resolve directories and helper binaries.
//!
//! ## Design Principles
//!
//! - Backends form a closed set; every policy question is a `match` on it
//! - Host platform is a value, not a `cfg!`, so callers can inject a fake one
//! - Configuration is captured once ([`MachineConfig::from_env`]) and passed
//!   down explicitly; nothing below this crate reads process environment
//!
//! ## Collaborators
//!
//! - [`DirectoryResolver`]: per-backend data directory
//! - [`HelperBinaryLocator`]: resolves helper executables by logical name

mod backend;
mod config;
mod dirs;
mod error;
mod helpers;
mod host;
mod name;

pub use backend::{Backend, DestinationFormat, ImagePolicy};
pub use config::MachineConfig;
pub use dirs::{DirectoryResolver, MachineDirs};
pub use error::MachineError;
pub use helpers::{HelperBinaries, HelperBinaryLocator};
pub use host::{resolve_backend, HostArch, HostOs, HostPlatform};
pub use name::{validate_machine_name, MAX_MACHINE_NAME_LEN};
