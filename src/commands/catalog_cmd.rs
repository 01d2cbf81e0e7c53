//! Read-only commands over the local catalog and downloaded books.

use clap::Args;
use maktaba_core::catalog::{
    self, AuthorQuery, BookQuery, ContentQuery, SearchKind, DEFAULT_SEARCH_LIMIT,
};
use maktaba_core::{Library, Value};
use std::collections::BTreeSet;

use super::OutputFormat;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn show(value: &Value) -> String {
    value.to_text().unwrap_or_else(|| "-".to_string())
}

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn print_page_footer<T>(page: &catalog::Page<T>, noun: &str) {
    println!(
        "\nShowing {} of {} {}(s) from offset {}",
        page.count, page.total, noun, page.offset
    );
}

/// List categories with their book counts
#[derive(Args)]
pub struct CategoriesCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl CategoriesCommand {
    pub fn run(&self, library: &Library) -> CommandResult {
        let master = library.get_master()?;
        let categories = catalog::categories(&master);

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&categories)?),
            OutputFormat::Text => {
                if categories.is_empty() {
                    println!("No categories found. Run `maktaba sync master` first.");
                    return Ok(());
                }
                println!("{:<6}  {:<40}  BOOKS", "ID", "NAME");
                println!("{}", "-".repeat(56));
                for category in &categories {
                    println!(
                        "{:<6}  {:<40}  {}",
                        category.id,
                        truncate(or_dash(&category.name), 40),
                        category.book_count
                    );
                }
                println!("\nTotal: {} category(ies)", categories.len());
            }
        }
        Ok(())
    }
}

/// List authors
#[derive(Args)]
pub struct AuthorsCommand {
    /// Filter by name
    #[arg(long, short)]
    search: Option<String>,

    /// Maximum number of authors to show
    #[arg(long)]
    limit: Option<usize>,

    /// Number of authors to skip
    #[arg(long)]
    offset: Option<usize>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl AuthorsCommand {
    pub fn run(&self, library: &Library) -> CommandResult {
        let master = library.get_master()?;
        let page = catalog::authors(
            &master,
            &AuthorQuery {
                search: self.search.clone(),
                offset: self.offset,
                limit: self.limit,
            },
        );

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
            OutputFormat::Text => {
                println!("{:<6}  {:<40}  {:<12}  BOOKS", "ID", "NAME", "DEATH");
                println!("{}", "-".repeat(70));
                for author in &page.data {
                    println!(
                        "{:<6}  {:<40}  {:<12}  {}",
                        author.id,
                        truncate(or_dash(&author.name), 40),
                        or_dash(&author.death_text),
                        author.book_count
                    );
                }
                print_page_footer(&page, "author");
            }
        }
        Ok(())
    }
}

/// List books
#[derive(Args)]
pub struct BooksCommand {
    /// Filter by name or bibliography
    #[arg(long, short)]
    search: Option<String>,

    /// Only books in this category
    #[arg(long)]
    category: Option<i64>,

    /// Only books by this author
    #[arg(long)]
    author: Option<i64>,

    /// Only books of this type
    #[arg(long = "type")]
    kind: Option<i64>,

    /// Maximum number of books to show
    #[arg(long)]
    limit: Option<usize>,

    /// Number of books to skip
    #[arg(long)]
    offset: Option<usize>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl BooksCommand {
    pub fn run(&self, library: &Library) -> CommandResult {
        let master = library.get_master()?;
        let downloaded: BTreeSet<i64> = library.downloaded_books()?.into_iter().collect();
        let query = BookQuery {
            search: self.search.clone(),
            category: self.category,
            author: self.author,
            kind: self.kind,
            offset: self.offset,
            limit: self.limit,
        };
        let page = catalog::books(&master, &query, |id| downloaded.contains(&id));

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
            OutputFormat::Text => {
                println!("{:<6}  {:<36}  {:<24}  {:<6}  LOCAL", "ID", "NAME", "AUTHOR", "DATE");
                println!("{}", "-".repeat(86));
                for book in &page.data {
                    println!(
                        "{:<6}  {:<36}  {:<24}  {:<6}  {}",
                        book.id,
                        truncate(or_dash(&book.name), 36),
                        truncate(or_dash(&book.author), 24),
                        show(&book.date),
                        if book.is_downloaded { "yes" } else { "" }
                    );
                }
                print_page_footer(&page, "book");
            }
        }
        Ok(())
    }
}

/// Show a book's details
#[derive(Args)]
pub struct BookCommand {
    /// Book ID
    id: i64,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl BookCommand {
    pub fn run(&self, library: &Library) -> CommandResult {
        let master = library.get_master()?;
        let local = library.local_book(self.id)?;
        let details = catalog::book_details(&master, self.id, local.as_ref())
            .ok_or_else(|| format!("Book {} not found", self.id))?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&details)?),
            OutputFormat::Text => {
                println!("{}", or_dash(&details.name));
                println!("{}", "=".repeat(40));
                println!("ID:        {}", details.id);
                let authors: Vec<&str> = details
                    .authors
                    .iter()
                    .map(|a| a.name.as_deref().unwrap_or("-"))
                    .collect();
                println!("Authors:   {}", if authors.is_empty() { "-".to_string() } else { authors.join(", ") });
                println!(
                    "Category:  {}",
                    details.category.as_ref().map_or("-", |c| or_dash(&c.name))
                );
                println!("Date:      {}", show(&details.date));
                println!("Printed:   {}", show(&details.printed));
                println!("Version:   {}", show(&details.version));
                if let Some(bibliography) = &details.bibliography {
                    println!("\n{}", bibliography);
                }
                println!();
                if details.has_content {
                    println!(
                        "Downloaded: {} page(s), {} title(s)",
                        details.page_count, details.title_count
                    );
                } else {
                    println!("Not downloaded. Run `maktaba content {}` to fetch it.", details.id);
                }
            }
        }
        Ok(())
    }
}

/// Show a book's pages and outline, downloading it if needed
#[derive(Args)]
pub struct ContentCommand {
    /// Book ID
    id: i64,

    /// Only the page with this number
    #[arg(long)]
    page: Option<i64>,

    /// Only pages of this part
    #[arg(long)]
    part: Option<String>,

    /// Print the outline only
    #[arg(long)]
    outline: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ContentCommand {
    pub async fn run(&self, library: &Library) -> CommandResult {
        let book = library
            .get_book_content(self.id)
            .await?
            .ok_or_else(|| format!("No content is available for book {}", self.id))?;
        let content = catalog::book_content(
            &book,
            &ContentQuery {
                page: self.page,
                part: self.part.clone(),
            },
        )?;

        match self.format {
            OutputFormat::Json if self.outline => {
                println!("{}", serde_json::to_string_pretty(&content.titles)?)
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&content)?),
            OutputFormat::Text => {
                if self.outline {
                    print_outline(&content.titles, 0);
                    return Ok(());
                }
                for page in &content.pages {
                    println!("--- page {} (part {}) ---", show(&page.page), show(&page.part));
                    println!("{}", page.content.as_deref().unwrap_or(""));
                    println!();
                }
                println!(
                    "{} of {} page(s), {} title(s)",
                    content.pages.len(),
                    content.total_pages,
                    content.total_titles
                );
            }
        }
        Ok(())
    }
}

fn print_outline(nodes: &[maktaba_core::TitleNode], depth: usize) {
    for node in nodes {
        let page = node.page_id.map(|p| format!(" [{}]", p)).unwrap_or_default();
        println!("{}{}{}", "  ".repeat(depth), node.content.as_deref().unwrap_or("-"), page);
        print_outline(&node.children, depth + 1);
    }
}

/// Search books and authors by name
#[derive(Args)]
pub struct SearchCommand {
    /// Text to look for
    query: String,

    /// What to search: all, books or authors
    #[arg(long = "type", short = 't', default_value = "all")]
    kind: SearchKind,

    /// Maximum hits per kind
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: usize,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl SearchCommand {
    pub fn run(&self, library: &Library) -> CommandResult {
        let query = self.query.trim();
        let master = library.get_master()?;
        let results = catalog::search(&master, query, self.kind, self.limit);

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            OutputFormat::Text => {
                if results.is_empty() {
                    println!("No results for '{}'", query);
                    return Ok(());
                }
                if !results.books.is_empty() {
                    println!("Books:");
                    for hit in &results.books {
                        println!("  {:<6}  {} ({})", hit.id, or_dash(&hit.name), or_dash(&hit.author));
                    }
                }
                if !results.authors.is_empty() {
                    println!("Authors:");
                    for hit in &results.authors {
                        println!("  {:<6}  {} ({})", hit.id, or_dash(&hit.name), or_dash(&hit.death_text));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Show catalog and download counts
#[derive(Args)]
pub struct StatsCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl StatsCommand {
    pub fn run(&self, library: &Library) -> CommandResult {
        let master = library.get_master()?;
        let stats = catalog::stats(&master, library.downloaded_books()?.len());

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            OutputFormat::Text => {
                println!("Categories:       {}", stats.categories);
                println!("Authors:          {}", stats.authors);
                println!("Books:            {}", stats.books);
                println!("Downloaded books: {}", stats.downloaded_books);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maktaba_core::{HttpPatchSource, MemorySnapshotStore, MemoryVersionStore, SqliteTableReader};
    use std::sync::Arc;

    fn library() -> Library {
        Library::new(
            Arc::new(HttpPatchSource::new("http://127.0.0.1:9/api", "key")),
            Arc::new(SqliteTableReader::new()),
            Arc::new(MemoryVersionStore::new()),
            Arc::new(MemorySnapshotStore::new()),
        )
    }

    #[test]
    fn test_short_search_query_is_not_an_error() {
        let cmd = SearchCommand {
            query: "s".to_string(),
            kind: SearchKind::All,
            limit: DEFAULT_SEARCH_LIMIT,
            format: OutputFormat::Json,
        };
        assert!(cmd.run(&library()).is_ok());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer name", 10), "a much ...");
        assert_eq!(truncate("صحيح البخاري", 8), "صحيح ...");
    }

    #[test]
    fn test_show_value() {
        assert_eq!(show(&Value::Null), "-");
        assert_eq!(show(&Value::Integer(256)), "256");
    }
}
