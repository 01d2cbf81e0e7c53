use clap::{Args, Subcommand};

use super::OutputFormat;
use maktaba::config::{mask_key, Config};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("base_url: {}", config.base_url.value);
                        println!("  source: {}", config.base_url.source);
                        println!();

                        let key = config
                            .api_key
                            .value
                            .as_deref()
                            .map(mask_key)
                            .unwrap_or_else(|| "(not set)".to_string());
                        println!("api_key: {}", key);
                        println!("  source: {}", config.api_key.source);
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        println!("port: {}", config.port.value);
                        println!("  source: {}", config.port.source);
                    }
                }
                Ok(())
            }
        }
    }
}
