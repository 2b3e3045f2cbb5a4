//! Materializing sources as raw images.
//!
//! The source format is taken from its content, never its name. Raw sources
//! are streamed unchanged; qcow2 sources are flattened to their declared
//! virtual size.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::copy::CopyOutcome;
use crate::format::ContainerFormat;
use crate::qcow2::Qcow2Image;
use crate::{ConversionError, ImageError, ImageSource};

/// Chunk size for streaming copies and conversion writes.
pub const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Where a streaming copy failed.
#[derive(Debug)]
pub(crate) enum StreamFailure {
    Read { offset: u64, source: io::Error },
    Write { offset: u64, source: io::Error },
}

/// Copy `reader` to `writer` in fixed-size chunks. Returns bytes copied.
pub(crate) fn stream_copy<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<u64, StreamFailure> {
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut offset = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(StreamFailure::Read { offset, source }),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|source| StreamFailure::Write { offset, source })?;
        offset += n as u64;
    }

    writer
        .flush()
        .map_err(|source| StreamFailure::Write { offset, source })?;
    Ok(offset)
}

/// Turns a raw or qcow2 source into a raw file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatConverter;

impl FormatConverter {
    pub fn new() -> Self {
        Self
    }

    /// Write `source` to `destination` as a raw image.
    ///
    /// A partially written destination is removed on failure.
    pub fn materialize(&self, source: &ImageSource, destination: &Path) -> Result<CopyOutcome, ImageError> {
        let detected = source.sniffed_format()?;
        debug!(
            source = %source.path().display(),
            destination = %destination.display(),
            format = %detected,
            "Materializing raw image"
        );

        let started = Instant::now();
        let result = match detected {
            ContainerFormat::Raw => self.copy_raw(source, destination).map(|_| CopyOutcome::Copied),
            ContainerFormat::Qcow2 => self
                .convert_qcow2(source, destination)
                .map(|_| CopyOutcome::Converted),
            other => return Err(ImageError::UnsupportedContainerFormat { detected: other }),
        };

        match result {
            Ok(outcome) => {
                info!(
                    destination = %destination.display(),
                    format = %detected,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Raw image ready"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(destination) {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        debug!(
                            path = %destination.display(),
                            error = %remove_err,
                            "Failed to remove partial destination"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn copy_raw(&self, source: &ImageSource, destination: &Path) -> Result<u64, ImageError> {
        let mut reader = source.open()?;
        let file = create_destination(destination)?;
        let mut writer = BufWriter::with_capacity(COPY_CHUNK_SIZE, file);

        let copied = stream_copy(&mut reader, &mut writer).map_err(|failure| match failure {
            StreamFailure::Read { offset, source } => ConversionError::Read { offset, source },
            StreamFailure::Write { offset, source } => ConversionError::Write { offset, source },
        })?;
        debug!(bytes = copied, "Copied raw source");
        Ok(copied)
    }

    fn convert_qcow2(&self, source: &ImageSource, destination: &Path) -> Result<u64, ImageError> {
        let mut image = Qcow2Image::open(source.open()?, source.path())?;
        let virtual_size = image.virtual_size();
        let chunk = (image.cluster_size() as usize).max(COPY_CHUNK_SIZE);

        debug!(
            virtual_size,
            cluster_size = image.cluster_size(),
            backing = image.has_backing_file(),
            "Converting qcow2 to raw"
        );

        let mut file = create_destination(destination)?;
        let mut buf = vec![0u8; chunk];
        let mut offset = 0u64;
        let mut written = 0u64;

        while offset < virtual_size {
            let len = (virtual_size - offset).min(chunk as u64) as usize;
            let window = &mut buf[..len];

            // zero ranges are left as holes
            if image.read_at(offset, window)? && window.iter().any(|&b| b != 0) {
                file.seek(SeekFrom::Start(offset))
                    .and_then(|_| file.write_all(window))
                    .map_err(|source| ConversionError::Write { offset, source })?;
                written += len as u64;
            }
            offset += len as u64;
        }

        file.set_len(virtual_size)
            .and_then(|_| file.sync_all())
            .map_err(|source| ConversionError::Write {
                offset: virtual_size,
                source,
            })?;

        debug!(virtual_size, data_bytes = written, "Converted qcow2 image");
        Ok(virtual_size)
    }
}

fn create_destination(path: &Path) -> Result<File, ConversionError> {
    File::create(path).map_err(|source| ConversionError::Create {
        path: path.to_path_buf(),
        source,
    })
}
