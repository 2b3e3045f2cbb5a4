//! Error display for the CLI.

use colored::Colorize;
use vmprep_image::ImageError;
use vmprep_machine::MachineError;
use vmprep_preflight::PreflightError;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint_for(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

/// A suggestion for the user, when the failure has an obvious fix.
pub fn hint_for(err: &anyhow::Error) -> Option<String> {
    if let Some(preflight) = err.downcast_ref::<PreflightError>() {
        return match preflight {
            PreflightError::HelperBinaryNotFound { name, .. } => Some(format!(
                "Install {name} or point VMPREP_HELPER_BINARIES_DIR at the directory containing it."
            )),
            PreflightError::MissingCapability { .. } => {
                Some("Update the helper binary, or rerun with --skip-preflight.".to_string())
            }
            PreflightError::UnsupportedBackend { .. } => {
                Some("Run `vmprep providers` to list the providers for this host.".to_string())
            }
        };
    }

    if let Some(image) = err.downcast_ref::<ImageError>() {
        return match image {
            ImageError::UnsupportedFormat { allowed, .. } => {
                Some(format!("Supply an image ending in {allowed}."))
            }
            ImageError::UnsupportedContainerFormat { .. } => Some(
                "Convert the image to qcow2 or raw first, e.g. with `qemu-img convert`.".to_string(),
            ),
            ImageError::Machine(machine) => machine_hint(machine),
            _ => None,
        };
    }

    err.downcast_ref::<MachineError>().and_then(machine_hint)
}

fn machine_hint(err: &MachineError) -> Option<String> {
    match err {
        MachineError::UnknownBackend { .. } | MachineError::BackendUnavailable { .. } => {
            Some("Run `vmprep providers` to list the providers for this host.".to_string())
        }
        MachineError::NoDataHome => {
            Some("Set VMPREP_DATA_HOME to choose where machine images are stored.".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmprep_machine::Backend;

    #[test]
    fn test_hint_through_context() {
        let err = anyhow::Error::new(PreflightError::HelperBinaryNotFound {
            name: "gvproxy".into(),
            searched: Vec::new(),
        })
        .context("preflight checks failed");

        let hint = hint_for(&err).unwrap();
        assert!(hint.contains("gvproxy"));
    }

    #[test]
    fn test_format_hint_lists_allowed() {
        let err = anyhow::Error::new(ImageError::UnsupportedFormat {
            backend: Backend::Wsl,
            extension: ".iso".into(),
            allowed: ".wsl and .tar.gz".into(),
        });
        assert_eq!(hint_for(&err).unwrap(), "Supply an image ending in .wsl and .tar.gz.");
    }

    #[test]
    fn test_no_hint_for_plain_errors() {
        assert!(hint_for(&anyhow::anyhow!("boom")).is_none());
    }
}
