use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use memlink::{ApiVersion, Config, MemoryClient, RequestOptions, flatten_memories};
use serde_json::Value;
use tracing::{debug, info};

use super::DEFAULT_USER_ID;
use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "Store a memory from text")]
    Add(AddArgs),

    #[clap(about = "Search stored memories")]
    Search(SearchArgs),

    #[clap(about = "List stored memories")]
    List(ListArgs),
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Memory content text")]
    pub text: String,

    #[clap(long, default_value = DEFAULT_USER_ID, help = "User the memory belongs to")]
    pub user_id: String,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Search query")]
    pub query: String,

    #[clap(long, default_value = DEFAULT_USER_ID, help = "User whose memories to search")]
    pub user_id: String,

    #[clap(long, default_value = "v1", help = "API version (v1, v2)")]
    pub api_version: ApiVersion,
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(long, default_value = DEFAULT_USER_ID, help = "User whose memories to list")]
    pub user_id: String,

    #[clap(long, default_value = "1", help = "Page number")]
    pub page: u32,

    #[clap(long, default_value = "50", help = "Memories per page")]
    pub page_size: u32,

    #[clap(long, default_value = "v1", help = "API version (v1, v2)")]
    pub api_version: ApiVersion,
}

impl MemoryCommand {
    pub async fn execute(&self, config: Config, format: OutputFormat) -> CliResult<()> {
        let client = MemoryClient::new(config).await?;

        let result = match &self.command {
            MemorySubcommand::Add(args) => {
                info!("Adding memory for user {}", args.user_id);
                Self::add(&client, args, format).await
            }
            MemorySubcommand::Search(args) => {
                info!("Searching memories ({}) for user {}", args.api_version, args.user_id);
                Self::search(&client, args, format).await
            }
            MemorySubcommand::List(args) => {
                info!(
                    "Listing memories ({}) for user {}, page {}",
                    args.api_version, args.user_id, args.page
                );
                Self::list(&client, args, format).await
            }
        };

        client.close().await;
        debug!("Memory command finished, client closed");
        result
    }

    async fn add(client: &MemoryClient, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        let options = RequestOptions::new()
            .user_id(args.user_id.as_str())
            .with("output_format", "v1.1");
        let result = client.add(args.text.as_str(), &options).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Table => {
                let events = memory_entries(&result);
                if events.is_empty() {
                    println!("Memory submitted.");
                    return Ok(());
                }
                let mut table = new_table(["ID", "Event", "Memory"]);
                for entry in events {
                    table.add_row([
                        truncate_string(field(entry, "id"), 8),
                        field(entry, "event").to_string(),
                        truncate_string(field(entry, "memory"), 60),
                    ]);
                }
                println!("{table}");
            }
        }

        Ok(())
    }

    async fn search(
        client: &MemoryClient,
        args: &SearchArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let options = RequestOptions::new()
            .user_id(args.user_id.as_str())
            .with("output_format", "v1.1");
        let result = client
            .search(&args.query, args.api_version, &options)
            .await?;

        print_memories(&result, format)
    }

    async fn list(client: &MemoryClient, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let options = RequestOptions::new()
            .user_id(args.user_id.as_str())
            .with("page", args.page)
            .with("page_size", args.page_size);
        let result = client.list_all(args.api_version, &options).await?;

        print_memories(&result, format)
    }
}

fn print_memories(result: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&flatten_memories(result))?);
        }
        OutputFormat::Table => {
            let memories = flatten_memories(result);
            if memories.is_empty() {
                println!("No memories found.");
                return Ok(());
            }

            let mut table = new_table(["#", "Memory"]);
            for (i, memory) in memories.iter().enumerate() {
                table.add_row([(i + 1).to_string(), truncate_string(memory, 80)]);
            }

            println!("{table}");
            println!("\nTotal: {} memories", memories.len());
        }
    }

    Ok(())
}

fn new_table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Entries of a bare list or of a `{"results": [...]}` wrapper
fn memory_entries(result: &Value) -> Vec<&Value> {
    match result {
        Value::Array(entries) => entries.iter().collect(),
        Value::Object(map) => map
            .get("results")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn field<'a>(entry: &'a Value, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or("-")
}
