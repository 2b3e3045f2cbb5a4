//! Copy through the host's bulk copy utility (robocopy).
//!
//! robocopy copies a named file between directories and reports through a
//! bitmask exit code where values below 8 mean success. The file lands
//! under its source name and is then renamed onto the destination, so a
//! source that already lives in the destination directory is copied
//! generically instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use tracing::{debug, Level};
use vmprep_machine::HelperBinaryLocator;

use super::{same_location, CopyOutcome, CopyStrategy, GenericCopy, StrategyKind};
use crate::{CopyError, ImageError, ImageSource};

/// Exit codes at or above this value are failures.
pub const SUCCESS_EXIT_CODE_LIMIT: i32 = 8;

/// Map the utility's exit status to a result.
pub fn interpret_exit_code(tool: &Path, status: ExitStatus) -> Result<i32, CopyError> {
    match status.code() {
        Some(code) if code < SUCCESS_EXIT_CODE_LIMIT => Ok(code),
        Some(code) => Err(CopyError::ExitCode {
            tool: tool.to_path_buf(),
            code,
        }),
        None => Err(CopyError::Terminated {
            tool: tool.to_path_buf(),
        }),
    }
}

/// Copies with the accelerated utility, falling back to [`GenericCopy`]
/// when the utility is not installed.
pub struct AcceleratedCopy {
    tool: String,
    locator: Arc<dyn HelperBinaryLocator>,
    fallback: GenericCopy,
}

impl AcceleratedCopy {
    pub fn new(tool: &str, locator: Arc<dyn HelperBinaryLocator>) -> Self {
        Self {
            tool: tool.to_string(),
            locator,
            fallback: GenericCopy,
        }
    }

    fn run_tool(&self, tool: &Path, source: &ImageSource, destination: &Path) -> Result<(), CopyError> {
        let src_path = source.path();
        let src_file = src_path.file_name().ok_or_else(|| CopyError::InvalidPath {
            path: src_path.to_path_buf(),
            what: "file name",
        })?;
        let src_dir = parent_dir(src_path);
        let dest_dir = destination
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| CopyError::InvalidPath {
                path: destination.to_path_buf(),
                what: "parent directory",
            })?;

        let (stdout, stderr) = if tracing::enabled!(Level::DEBUG) {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        debug!(
            tool = %tool.display(),
            src_dir = %src_dir.display(),
            dest_dir = %dest_dir.display(),
            file = %src_file.to_string_lossy(),
            "Running accelerated copy"
        );

        let status = Command::new(tool)
            .args(["/J", "/MT", "/R:0", "/IS"])
            .arg(&src_dir)
            .arg(dest_dir)
            .arg(src_file)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| CopyError::Spawn {
                tool: tool.to_path_buf(),
                source,
            })?;

        let code = interpret_exit_code(tool, status)?;
        debug!(exit_code = code, "Accelerated copy finished");

        let intermediate = dest_dir.join(src_file);
        if intermediate.as_path() != destination {
            replace_destination(&intermediate, destination)?;
        }
        Ok(())
    }
}

impl CopyStrategy for AcceleratedCopy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Accelerated
    }

    fn copy(&self, source: &ImageSource, destination: &Path) -> Result<CopyOutcome, ImageError> {
        // the rename would move the user's file away
        if shares_directory(source.path(), destination) {
            debug!(
                source = %source.path().display(),
                destination = %destination.display(),
                "Source is in the destination directory, using generic copy"
            );
            self.fallback.copy_bytes(source, destination)?;
            return Ok(CopyOutcome::Copied);
        }

        match self.locator.find(&self.tool) {
            Some(tool) => {
                self.run_tool(&tool, source, destination)?;
                Ok(CopyOutcome::Copied)
            }
            None => {
                debug!(tool = %self.tool, "Accelerated copy utility not found, using generic copy");
                self.fallback.copy_bytes(source, destination)?;
                Ok(CopyOutcome::FallbackUsed)
            }
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn shares_directory(source: &Path, destination: &Path) -> bool {
    destination
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .is_some_and(|dest_dir| same_location(&parent_dir(source), dest_dir))
}

/// Remove whatever sits at `destination`, then move `intermediate` there.
fn replace_destination(intermediate: &Path, destination: &Path) -> Result<(), CopyError> {
    match fs::remove_file(destination) {
        Ok(()) => debug!(path = %destination.display(), "Removed existing destination"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(CopyError::RemoveExisting {
                path: destination.to_path_buf(),
                source,
            })
        }
    }

    fs::rename(intermediate, destination).map_err(|source| CopyError::Rename {
        from: intermediate.to_path_buf(),
        to: destination.to_path_buf(),
        source,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_exit_code_bitmask() {
        let tool = Path::new("robocopy");
        for code in 0..8 {
            let status = ExitStatus::from_raw(code << 8);
            assert_eq!(interpret_exit_code(tool, status).unwrap(), code);
        }
        for code in [8, 9, 16] {
            let status = ExitStatus::from_raw(code << 8);
            let err = interpret_exit_code(tool, status).unwrap_err();
            assert_eq!(err.exit_code(), Some(code));
        }
    }

    #[test]
    fn test_signal_is_failure() {
        // raw wait status 9: killed by SIGKILL
        let err = interpret_exit_code(Path::new("robocopy"), ExitStatus::from_raw(9)).unwrap_err();
        assert!(matches!(err, CopyError::Terminated { .. }));
    }

    #[test]
    fn test_replace_destination_over_existing() {
        let temp = tempfile::TempDir::new().unwrap();
        let intermediate = temp.path().join("disk.vhdx");
        let destination = temp.path().join("dev-hyperv.vhdx");
        fs::write(&intermediate, b"new").unwrap();
        fs::write(&destination, b"old").unwrap();

        replace_destination(&intermediate, &destination).unwrap();
        assert_eq!(fs::read(&destination).unwrap(), b"new");
        assert!(!intermediate.exists());
    }

    #[test]
    fn test_shares_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let other = temp.path().join("other");
        fs::create_dir(&other).unwrap();

        let dest = temp.path().join("dev-hyperv.vhdx");
        assert!(shares_directory(&temp.path().join("user.vhdx"), &dest));
        assert!(shares_directory(&other.join("../user.vhdx"), &dest));
        assert!(!shares_directory(&other.join("user.vhdx"), &dest));
        assert!(!shares_directory(&temp.path().join("missing/user.vhdx"), &dest));
    }

    #[test]
    fn test_replace_destination_missing_intermediate() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = replace_destination(&temp.path().join("nope"), &temp.path().join("dest")).unwrap_err();
        assert!(matches!(err, CopyError::Rename { .. }));
    }
}
