//! Preflight command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use vmprep_preflight::run_preflights;

use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

/// Check helper binaries for a provider.
#[derive(Debug, Args)]
pub struct PreflightCommand {}

#[derive(Debug, Serialize)]
struct PreflightView {
    provider: String,
    passed: bool,
}

impl PreflightCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let backend = ctx.backend()?;
        run_preflights(backend, &ctx.config)
            .with_context(|| format!("preflight checks failed for {backend}"))?;

        match ctx.format {
            OutputFormat::Json => print_single(&PreflightView {
                provider: backend.to_string(),
                passed: true,
            }),
            OutputFormat::Table => {
                print_success(&format!("Preflight checks passed for {backend}"))
            }
        }
        Ok(())
    }
}
