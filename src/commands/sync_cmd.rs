//! Sync CLI commands for pulling patches from the remote library.

use clap::{Args, Subcommand};
use maktaba_core::{Library, SyncKey, SyncOutcome, SyncResult};

/// Sync with the remote library
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: SyncSubcommand,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Update the catalog of categories, authors and books
    Master,

    /// Download or update one book's pages and titles
    Book {
        /// Book ID
        id: i64,
    },

    /// Show the applied version of the catalog and of each local book
    Status,
}

impl SyncCommand {
    /// Whether running this subcommand talks to the remote.
    pub fn needs_remote(&self) -> bool {
        !matches!(self.command, SyncSubcommand::Status)
    }

    pub async fn run(&self, library: &Library) -> SyncResult<()> {
        match &self.command {
            SyncSubcommand::Master => {
                println!("Syncing catalog...");
                let outcome = library.sync_master().await?;
                report("master", &outcome);
            }
            SyncSubcommand::Book { id } => {
                println!("Syncing book {}...", id);
                let outcome = library.sync_book(*id).await?;
                report(&format!("book {}", id), &outcome);
                if library.local_book(*id)?.is_none() {
                    println!("  No content is available for this book.");
                }
            }
            SyncSubcommand::Status => self.status(library)?,
        }
        Ok(())
    }

    fn status(&self, library: &Library) -> SyncResult<()> {
        println!("Sync Status");
        println!("===========");
        println!();

        let mut keys = vec![SyncKey::Master];
        keys.extend(library.downloaded_books()?.into_iter().map(SyncKey::Book));

        println!("{:<16}  {:<10}", "KEY", "VERSION");
        println!("{}", "-".repeat(28));
        for key in keys {
            println!("{:<16}  {:<10}", key.to_string(), library.cursor(&key).to_string());
        }
        Ok(())
    }
}

fn report(name: &str, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::UpToDate { cursor } => {
            println!("  ✓ up to date {} ({})", name, cursor);
        }
        SyncOutcome::Updated { cursor, counts } => {
            println!("  ✓ updated {} to {}", name, cursor);
            for (table, count) in counts {
                println!("    {:<10} {} record{}", table, count, if *count == 1 { "" } else { "s" });
            }
        }
    }
}
