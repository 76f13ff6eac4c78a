use std::path::PathBuf;

use clap::{Parser, Subcommand};
use memlink::Config;
use memlink_cli::commands::{ConfigCommand, MemoryCommand, StatusCommand};
use memlink_cli::error::CliResult;
use memlink_cli::logging::init_logging;
use memlink_cli::output::OutputFormat;
use tracing::debug;

#[derive(Parser)]
#[command(name = "memlink-cli")]
#[command(about = "Memlink CLI - Store and query memories on a remote memory service")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Add, search and list memories")]
    Memory(MemoryCommand),

    #[clap(about = "Check the connection to the memory service")]
    Status(StatusCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let config = Config::resolve(cli.config.as_deref())?;
    init_logging(&config.logging)?;
    debug!(
        "Resolved configuration for {} (config file: {:?})",
        config.client.host, cli.config
    );

    match &cli.command {
        Command::Config(cmd) => cmd.execute(&config, format),
        Command::Memory(cmd) => cmd.execute(config, format).await,
        Command::Status(cmd) => cmd.execute(config, format).await,
    }
}
