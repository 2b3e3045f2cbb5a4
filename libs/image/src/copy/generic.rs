//! Buffered streaming copy.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tracing::debug;

use super::{same_location, CopyOutcome, CopyStrategy, StrategyKind};
use crate::convert::{stream_copy, StreamFailure, COPY_CHUNK_SIZE};
use crate::{CopyError, ImageError, ImageSource};

/// Copies bytes unchanged, in 1 MiB chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericCopy;

impl GenericCopy {
    /// Copy and return the number of bytes written.
    ///
    /// A source that already is the destination is left untouched.
    pub fn copy_bytes(&self, source: &ImageSource, destination: &Path) -> Result<u64, ImageError> {
        let mut reader = source.open()?;
        if same_location(source.path(), destination) {
            debug!(path = %destination.display(), "Source is already the destination");
            return reader
                .metadata()
                .map(|m| m.len())
                .map_err(|e| {
                    CopyError::Read {
                        path: source.path().to_path_buf(),
                        offset: 0,
                        source: e,
                    }
                    .into()
                });
        }

        let file = File::create(destination).map_err(|e| CopyError::Create {
            path: destination.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::with_capacity(COPY_CHUNK_SIZE, file);

        let copied = stream_copy(&mut reader, &mut writer).map_err(|failure| match failure {
            StreamFailure::Read { offset, source: e } => CopyError::Read {
                path: source.path().to_path_buf(),
                offset,
                source: e,
            },
            StreamFailure::Write { offset, source: e } => CopyError::Write {
                path: destination.to_path_buf(),
                offset,
                source: e,
            },
        })?;

        debug!(
            destination = %destination.display(),
            bytes = copied,
            "Copied image"
        );
        Ok(copied)
    }
}

impl CopyStrategy for GenericCopy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Generic
    }

    fn copy(&self, source: &ImageSource, destination: &Path) -> Result<CopyOutcome, ImageError> {
        self.copy_bytes(source, destination)?;
        Ok(CopyOutcome::Copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vmprep_testing::{sha256_file, write_pseudo_random_file};

    #[test]
    fn test_copy_identical() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("disk.qcow2");
        write_pseudo_random_file(&src, 3 * 1024 * 1024 + 5, 42).unwrap();

        let dest = temp.path().join("out.qcow2");
        let outcome = GenericCopy.copy(&ImageSource::new(&src), &dest).unwrap();

        assert_eq!(outcome, CopyOutcome::Copied);
        assert_eq!(sha256_file(&src).unwrap(), sha256_file(&dest).unwrap());
    }

    #[test]
    fn test_copy_empty_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("empty.raw");
        std::fs::write(&src, b"").unwrap();

        let dest = temp.path().join("out.raw");
        assert_eq!(GenericCopy.copy_bytes(&ImageSource::new(&src), &dest).unwrap(), 0);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    }

    #[test]
    fn test_copy_onto_itself_keeps_content() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("disk.raw");
        std::fs::write(&src, b"keep me").unwrap();

        let copied = GenericCopy.copy_bytes(&ImageSource::new(&src), &src).unwrap();
        assert_eq!(copied, 7);
        assert_eq!(std::fs::read(&src).unwrap(), b"keep me");
    }

    #[test]
    fn test_copy_missing_destination_dir() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("disk.raw");
        std::fs::write(&src, b"data").unwrap();

        let dest = temp.path().join("missing").join("out.raw");
        let err = GenericCopy.copy(&ImageSource::new(&src), &dest).unwrap_err();
        assert!(matches!(err, ImageError::Copy(CopyError::Create { .. })));
    }
}
