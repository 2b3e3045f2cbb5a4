//! Pull command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use vmprep_image::{CopyOutcome, ImagePuller, PullResult};
use vmprep_machine::Backend;
use vmprep_preflight::run_preflights;

use crate::output::{print_info, print_output, OutputFormat};

use super::CommandContext;

/// Default machine name.
pub const DEFAULT_MACHINE_NAME: &str = "vmprep-machine-default";

/// Validate a local image and place it in the machine's data directory.
#[derive(Debug, Args)]
pub struct PullCommand {
    /// Local disk image to use.
    image: PathBuf,

    /// Machine name.
    #[arg(long, default_value = DEFAULT_MACHINE_NAME)]
    name: String,

    /// Skip helper binary checks.
    #[arg(long)]
    skip_preflight: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct PullView {
    #[tabled(rename = "Machine")]
    machine: String,

    #[tabled(rename = "Provider")]
    provider: Backend,

    #[tabled(rename = "Path", display = "display_path")]
    path: PathBuf,

    #[tabled(rename = "Size")]
    size_bytes: u64,

    #[tabled(rename = "Outcome")]
    outcome: CopyOutcome,

    #[tabled(rename = "Duration (ms)")]
    duration_ms: u64,
}

impl PullView {
    fn new(machine: &str, provider: Backend, result: PullResult) -> Self {
        Self {
            machine: machine.to_string(),
            provider,
            path: result.local_path,
            size_bytes: result.size_bytes,
            outcome: result.outcome,
            duration_ms: result.duration_ms,
        }
    }
}

fn display_path(path: &PathBuf) -> String {
    path.display().to_string()
}

impl PullCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let backend = ctx.backend()?;

        if !self.skip_preflight {
            run_preflights(backend, &ctx.config)
                .with_context(|| format!("preflight checks failed for {backend}"))?;
        }

        let mut puller = ImagePuller::new(&self.name, backend, &ctx.config)?;
        puller.set_source_uri(&self.image);
        let result = puller
            .download()
            .with_context(|| format!("failed to pull {}", self.image.display()))?;

        if result.outcome == CopyOutcome::FallbackUsed && ctx.format == OutputFormat::Table {
            print_info("Accelerated copy utility not found, used a plain copy");
        }

        print_output(&[PullView::new(&self.name, backend, result)], ctx.format);
        Ok(())
    }
}
