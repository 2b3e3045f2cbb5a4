//! Providers command.

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::CommandContext;

#[derive(Debug, Serialize, Tabled)]
struct ProviderRow {
    #[tabled(rename = "Provider")]
    provider: String,

    #[tabled(rename = "Default")]
    default: bool,

    #[tabled(rename = "Image Formats")]
    formats: String,

    #[tabled(rename = "Converts To Raw")]
    converts_to_raw: bool,
}

pub fn run(ctx: CommandContext) -> Result<()> {
    let host = ctx.config.host;
    let default = host.default_backend();

    let rows: Vec<ProviderRow> = host
        .supported_backends()
        .into_iter()
        .map(|backend| {
            let policy = backend.image_policy();
            ProviderRow {
                provider: backend.to_string(),
                default: Some(backend) == default,
                formats: policy.accepted_extensions.join(", "),
                converts_to_raw: policy.converts_to_raw(),
            }
        })
        .collect();

    print_output(&rows, ctx.format);
    Ok(())
}
