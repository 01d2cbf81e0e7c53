use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    AuthorsCommand, BookCommand, BooksCommand, CategoriesCommand, ConfigCommand, ContentCommand,
    SearchCommand, StatsCommand, SyncCommand,
};
use maktaba::config::Config;
use maktaba_core::Library;

#[derive(Parser)]
#[command(name = "maktaba")]
#[command(version)]
#[command(about = "Browse a local mirror of a remote library", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull patches from the remote library
    Sync(SyncCommand),

    /// List categories
    Categories(CategoriesCommand),

    /// List authors
    Authors(AuthorsCommand),

    /// List books
    Books(BooksCommand),

    /// Show a book's details
    Book(BookCommand),

    /// Read a book's pages and outline
    Content(ContentCommand),

    /// Search books and authors
    Search(SearchCommand),

    /// Show library statistics
    Stats(StatsCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn open_library(config: &Config) -> Library {
    Library::open(
        config.data_dir(),
        &config.base_url.value,
        config.api_key.value.as_deref().unwrap_or_default(),
    )
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Sync(cmd)) => {
            if cmd.needs_remote() {
                config.require_api_key()?;
            }
            cmd.run(&open_library(&config)).await?;
        }
        Some(Commands::Categories(cmd)) => cmd.run(&open_library(&config))?,
        Some(Commands::Authors(cmd)) => cmd.run(&open_library(&config))?,
        Some(Commands::Books(cmd)) => cmd.run(&open_library(&config))?,
        Some(Commands::Book(cmd)) => cmd.run(&open_library(&config))?,
        Some(Commands::Content(cmd)) => cmd.run(&open_library(&config)).await?,
        Some(Commands::Search(cmd)) => cmd.run(&open_library(&config))?,
        Some(Commands::Stats(cmd)) => cmd.run(&open_library(&config))?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
