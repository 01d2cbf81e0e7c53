mod catalog_cmd;
mod config_cmd;
mod sync_cmd;

use clap::ValueEnum;

pub use catalog_cmd::{
    AuthorsCommand, BookCommand, BooksCommand, CategoriesCommand, ContentCommand, SearchCommand,
    StatsCommand,
};
pub use config_cmd::ConfigCommand;
pub use sync_cmd::SyncCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
