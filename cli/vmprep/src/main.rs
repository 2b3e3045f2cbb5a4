//! vmprep - prepare virtual machine images
//!
//! Validates a local disk image for a virtualization provider, converts it
//! when the provider needs raw disks, and places it in the machine's data
//! directory.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod logging;
mod output;

use commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level(), cli.log_format());

    if let Err(e) = cli.run() {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
