//! # vmprep-preflight
//!
//! Checks that the helper binaries a backend relies on are installed and
//! new enough, before any command changes machine state.
//!
//! A helper is "new enough" when its `--help` output mentions the flag
//! vmprep depends on. There is no version parsing.

mod error;
mod requirement;
mod validator;

pub use error::PreflightError;
pub use requirement::{requirements_for, CapabilityRequirement, PROBE_ARG};
pub use validator::{run_preflights, PreflightValidator};
