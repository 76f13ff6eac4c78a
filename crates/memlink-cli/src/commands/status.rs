use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use memlink::{Config, MemoryClient};
use tracing::info;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, config: Config, format: OutputFormat) -> CliResult<()> {
        let host = config.client.host.clone();
        info!("Checking connection to {}", host);
        let client = MemoryClient::new(config).await?;
        let status = client.connection_status().await;
        client.close().await;

        let last_checked = status
            .last_checked_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string());

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "host": host,
                    "healthy": status.healthy,
                    "generation": status.generation,
                    "last_checked_at": status.last_checked_at.map(|t| t.to_rfc3339()),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["Host".to_string(), host]);
                table.add_row([
                    "Healthy".to_string(),
                    if status.healthy { "yes" } else { "no" }.to_string(),
                ]);
                table.add_row(["Transport generation".to_string(), status.generation.to_string()]);
                table.add_row(["Last checked".to_string(), last_checked]);

                println!("{table}");
            }
        }

        Ok(())
    }
}
