//! # vmprep-image
//!
//! Acquires a local source image for a machine and normalizes it into the
//! form the machine's backend boots from.
//!
//! This crate handles:
//! - Validating a source's extension and content against the backend policy
//! - Computing the machine's destination path once
//! - Converting qcow2 to raw for backends that need raw disks
//! - Copying with the fastest strategy the host offers
//!
//! ## Flow
//!
//! ```text
//! ImagePuller::download
//!   -> SourceResolver::validate      extension + content sniffing
//!   -> PathComputer::local_path      <data dir>/<machine>-<backend><ext>
//!   -> PlatformCopyStrategy::copy    Generic | Accelerated | Converting
//! ```
//!
//! Sources are only ever opened read-only.

mod convert;
mod copy;
mod error;
mod format;
mod path;
mod puller;
mod qcow2;
mod resolver;
mod source;

pub use convert::{FormatConverter, COPY_CHUNK_SIZE};
pub use copy::{
    interpret_exit_code, select_strategy, AcceleratedCopy, ConvertingCopy, CopyOutcome,
    CopyStrategy, GenericCopy, PlatformCopyStrategy, StrategyKind, SUCCESS_EXIT_CODE_LIMIT,
};
pub use error::{ConversionError, CopyError, ImageError};
pub use format::{detect_from_header, sniff, ContainerFormat};
pub use path::{image_file_name, LocalImageHandle, PathComputer};
pub use puller::{ImagePuller, PullResult};
pub use qcow2::{DiskImage, Qcow2Header, Qcow2Image, RawImage, MAX_BACKING_DEPTH};
pub use resolver::{DestinationSpec, SourceResolver};
pub use source::ImageSource;
