//! Source validation against a backend's image policy.

use tracing::{debug, warn};
use vmprep_machine::{Backend, DestinationFormat, HostPlatform};

use crate::format::ContainerFormat;
use crate::{ImageError, ImageSource};

/// Where and in what form a source lands for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSpec {
    /// Extension of the destination file, with its leading dot.
    pub extension: String,
    /// Whether the source must be materialized as raw.
    pub format: DestinationFormat,
}

impl DestinationSpec {
    pub fn requires_raw(&self) -> bool {
        self.format == DestinationFormat::Raw
    }
}

/// Checks sources against backend policies.
#[derive(Debug, Clone, Copy)]
pub struct SourceResolver {
    host: HostPlatform,
}

impl SourceResolver {
    pub fn new(host: HostPlatform) -> Self {
        Self { host }
    }

    /// Destination for a declared source extension. Pure: no file access.
    pub fn destination_for(backend: Backend, extension: &str) -> Result<DestinationSpec, ImageError> {
        let policy = backend.image_policy();
        let extension = extension.to_ascii_lowercase();

        if !policy.accepts(&extension) {
            return Err(ImageError::UnsupportedFormat {
                backend,
                extension,
                allowed: policy.allowed_list(),
            });
        }

        let extension = match policy.destination {
            DestinationFormat::Raw => ".raw".to_string(),
            DestinationFormat::SameAsSource => extension,
        };

        Ok(DestinationSpec {
            extension,
            format: policy.destination,
        })
    }

    /// Validate `source` for `backend` on this host.
    ///
    /// The extension is checked for every backend. Where the accepted
    /// formats carry signatures the content is sniffed too, and foreign
    /// containers are rejected regardless of their name.
    pub fn validate(&self, source: &ImageSource, backend: Backend) -> Result<DestinationSpec, ImageError> {
        if !self.host.supports(backend) {
            return Err(ImageError::BackendUnavailable {
                backend,
                host: self.host,
            });
        }

        source.ensure_readable()?;
        let spec = Self::destination_for(backend, source.declared_extension())?;

        if backend.image_policy().content_sniffable {
            let detected = source.sniffed_format()?;
            if !detected.is_convertible() {
                return Err(ImageError::UnsupportedContainerFormat { detected });
            }
            if !spec.requires_raw() && !extension_matches(source.declared_extension(), detected) {
                warn!(
                    path = %source.path().display(),
                    extension = %source.declared_extension(),
                    detected = %detected,
                    "Image extension does not match its contents"
                );
            }
            debug!(backend = %backend, detected = %detected, "Source format confirmed");
        }

        Ok(spec)
    }
}

fn extension_matches(extension: &str, detected: ContainerFormat) -> bool {
    extension.trim_start_matches('.') == detected.as_str()
}
