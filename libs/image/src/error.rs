//! Error types for image acquisition.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vmprep_machine::{Backend, HostPlatform, MachineError};

use crate::format::ContainerFormat;

/// Errors from validating, converting, or copying an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The source extension is outside the backend's accepted set.
    #[error("unsupported {backend} image extension {extension:?}; supported formats are {allowed}")]
    UnsupportedFormat {
        backend: Backend,
        extension: String,
        allowed: String,
    },

    /// The sniffed container format cannot be handled.
    #[error("{detected} format not supported for conversion to raw")]
    UnsupportedContainerFormat { detected: ContainerFormat },

    /// The backend cannot be used on this host.
    #[error("{backend} images cannot be provisioned on {host}")]
    BackendUnavailable {
        backend: Backend,
        host: HostPlatform,
    },

    /// No source was set before the operation.
    #[error("no source image set")]
    SourceNotSet,

    /// The source cannot be opened for reading.
    #[error("failed to open source image {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// Errors from reading a source container or writing the raw output.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to read source image at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to write destination image at offset {offset}: {source}")]
    Write {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to create destination image {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The container reports itself unreadable or corrupt.
    #[error("source image is not readable: {reason}")]
    Unreadable { reason: String },
}

impl ConversionError {
    pub(crate) fn unreadable(reason: impl Into<String>) -> Self {
        Self::Unreadable {
            reason: reason.into(),
        }
    }
}

/// Errors from the copy strategies.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("failed to read {} at offset {offset}: {source}", .path.display())]
    Read {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {} at offset {offset}: {source}", .path.display())]
    Write {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run {}: {source}", .tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run {}: exit status {code}", .tool.display())]
    ExitCode { tool: PathBuf, code: i32 },

    #[error("failed to run {}: terminated by signal", .tool.display())]
    Terminated { tool: PathBuf },

    #[error("failed to remove existing destination file {}: {source}", .path.display())]
    RemoveExisting {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} has no {what}", .path.display())]
    InvalidPath { path: PathBuf, what: &'static str },
}

impl ImageError {
    /// Returns true for the format rejections that a different source file
    /// would fix.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ImageError::UnsupportedFormat { .. } | ImageError::UnsupportedContainerFormat { .. }
        )
    }
}

impl CopyError {
    /// Exit code of the external copy utility, if that is what failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CopyError::ExitCode { code, .. } => Some(*code),
            _ => None,
        }
    }
}
