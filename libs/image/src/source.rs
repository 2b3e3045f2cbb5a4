//! Source images supplied by the user.

use std::cell::OnceCell;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::format::{self, ContainerFormat};
use crate::ImageError;

/// Two-part suffixes recognised as one extension.
const COMPOUND_EXTENSIONS: &[&str] = &[".tar.gz"];

/// A local source image. The file is only ever opened read-only.
#[derive(Debug)]
pub struct ImageSource {
    path: PathBuf,
    declared_extension: String,
    sniffed: OnceCell<ContainerFormat>,
}

impl ImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let declared_extension = declared_extension(&path);
        Self {
            path,
            declared_extension,
            sniffed: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase extension with its leading dot, or empty.
    pub fn declared_extension(&self) -> &str {
        &self.declared_extension
    }

    /// Open the source read-only.
    pub fn open(&self) -> Result<File, ImageError> {
        File::open(&self.path).map_err(|source| ImageError::SourceUnavailable {
            path: self.path.clone(),
            source,
        })
    }

    /// Fail unless the source is an existing regular file.
    pub fn ensure_readable(&self) -> Result<(), ImageError> {
        let file = self.open()?;
        let metadata = file.metadata().map_err(|source| ImageError::SourceUnavailable {
            path: self.path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(ImageError::SourceUnavailable {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }
        Ok(())
    }

    /// Container format sniffed from the file contents, computed once.
    pub fn sniffed_format(&self) -> Result<ContainerFormat, ImageError> {
        if let Some(format) = self.sniffed.get() {
            return Ok(*format);
        }
        let mut file = self.open()?;
        let detected = format::sniff(&mut file).map_err(|source| ImageError::SourceUnavailable {
            path: self.path.clone(),
            source,
        })?;
        Ok(*self.sniffed.get_or_init(|| detected))
    }
}

fn declared_extension(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if let Some(compound) = COMPOUND_EXTENSIONS.iter().find(|ext| name.ends_with(**ext)) {
        return compound.to_string();
    }

    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}
