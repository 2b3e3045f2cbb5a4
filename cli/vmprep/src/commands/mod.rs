//! CLI commands.

mod preflight;
mod providers;
mod pull;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use vmprep_machine::{resolve_backend, Backend, MachineConfig};

use crate::logging::LogFormat;
use crate::output::OutputFormat;

/// vmprep - Prepare disk images for virtual machines.
#[derive(Debug, Parser)]
#[command(name = "vmprep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Log level filter, overridden by RUST_LOG.
    #[arg(long, global = true, env = "VMPREP_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Log format (text or json).
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Virtualization provider; defaults to the host's default provider.
    #[arg(long, global = true, env = "VMPREP_PROVIDER")]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate and place a local image for a machine.
    Pull(pull::PullCommand),

    /// Check that helper binaries support the required flags.
    Preflight(preflight::PreflightCommand),

    /// List the providers available on this host.
    Providers,
}

impl Cli {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.log_format)
    }

    /// Run the CLI command.
    pub fn run(self) -> Result<()> {
        let ctx = CommandContext {
            config: MachineConfig::from_env(),
            format: OutputFormat::parse(&self.format),
            provider: self.provider,
        };
        debug!(
            host = %ctx.config.host,
            data_home = ?ctx.config.data_home,
            "Loaded configuration"
        );

        match self.command {
            Commands::Pull(cmd) => cmd.run(ctx),
            Commands::Preflight(cmd) => cmd.run(ctx),
            Commands::Providers => providers::run(ctx),
        }
    }
}

/// Shared state for commands.
pub struct CommandContext {
    pub config: MachineConfig,
    pub format: OutputFormat,
    pub provider: Option<String>,
}

impl CommandContext {
    /// The selected provider, or the host default.
    pub fn backend(&self) -> Result<Backend> {
        Ok(resolve_backend(self.provider.as_deref(), self.config.host)?)
    }
}
