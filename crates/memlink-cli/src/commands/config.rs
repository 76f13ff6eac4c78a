use clap::{Parser, Subcommand};
use memlink::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, mask_secret};

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Show the resolved configuration")]
    Show,

    #[clap(about = "List the config file locations that are searched")]
    Paths,
}

impl ConfigCommand {
    pub fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        match self.command {
            ConfigSubcommand::Show => Self::show(config, format),
            ConfigSubcommand::Paths => Self::paths(format),
        }
    }

    fn show(config: &Config, format: OutputFormat) -> CliResult<()> {
        let masked = masked(config);
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&masked)?),
            OutputFormat::Table => print!("{}", toml::to_string_pretty(&masked)?),
        }
        Ok(())
    }

    fn paths(format: OutputFormat) -> CliResult<()> {
        let paths: Vec<(String, bool)> = Config::default_paths()
            .into_iter()
            .map(|p| (p.display().to_string(), p.exists()))
            .collect();

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = paths
                    .iter()
                    .map(|(path, exists)| serde_json::json!({"path": path, "exists": exists}))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                for (path, exists) in paths {
                    let marker = if exists { "*" } else { " " };
                    println!("{marker} {path}");
                }
            }
        }
        Ok(())
    }
}

/// Copy of `config` safe to print
fn masked(config: &Config) -> Config {
    let mut masked = config.clone();
    masked.client.api_key = config.client.api_key.as_deref().map(mask_secret);
    masked
}
