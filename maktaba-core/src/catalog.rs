//! Read-side queries over persisted snapshots.
//!
//! Everything here is a pure function of a dataset; none of it touches the
//! network or the stores. Foreign references that do not resolve render as
//! absent values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::outline::{self, OutlineError, TitleNode};
use crate::record::{tables, Dataset, Record, Value};

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MIN_SEARCH_LEN: usize = 2;

/// Sort key for records without a `death_number` / `date`.
const UNKNOWN_YEAR: i64 = 9999;

/// Separator between the names of co-authors.
const AUTHOR_JOINER: &str = " و ";

/// A window over a filtered, sorted listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: usize,
    pub count: usize,
    pub offset: usize,
    pub limit: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    fn slice(items: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = items.len();
        let data: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
        Page {
            total,
            count: data.len(),
            offset,
            limit,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: i64,
    pub name: Option<String>,
    pub order: Value,
    pub book_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorQuery {
    pub search: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: i64,
    pub name: Option<String>,
    pub biography: Option<String>,
    #[serde(rename = "death_text")]
    pub death_text: Option<String>,
    #[serde(rename = "death_number")]
    pub death_number: Value,
    pub book_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookQuery {
    pub search: Option<String>,
    pub category: Option<i64>,
    pub author: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<i64>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: i64,
    pub name: Option<String>,
    /// Author names joined, or `None` if no author resolves.
    pub author: Option<String>,
    pub author_ids: Value,
    pub category: Option<String>,
    pub category_id: Value,
    #[serde(rename = "type")]
    pub kind: Value,
    pub printed: Value,
    pub date: Value,
    pub bibliography: Option<String>,
    pub is_downloaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorRef {
    pub id: i64,
    pub name: Option<String>,
    pub death_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    pub id: i64,
    pub name: Option<String>,
    pub authors: Vec<AuthorRef>,
    pub category: Option<CategoryRef>,
    #[serde(rename = "type")]
    pub kind: Value,
    pub printed: Value,
    pub date: Value,
    pub bibliography: Option<String>,
    pub version: Value,
    pub pdf_links: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub has_content: bool,
    pub page_count: usize,
    pub title_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentQuery {
    pub page: Option<i64>,
    pub part: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub id: i64,
    pub part: Value,
    pub page: Value,
    pub content: Option<String>,
    pub services: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookContent {
    pub pages: Vec<PageView>,
    pub titles: Vec<TitleNode>,
    pub total_pages: usize,
    pub total_titles: usize,
}

/// What a search looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    All,
    Books,
    Authors,
}

impl SearchKind {
    fn books(self) -> bool {
        matches!(self, SearchKind::All | SearchKind::Books)
    }

    fn authors(self) -> bool {
        matches!(self, SearchKind::All | SearchKind::Authors)
    }
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(SearchKind::All),
            "books" => Ok(SearchKind::Books),
            "authors" => Ok(SearchKind::Authors),
            _ => Err(format!(
                "Invalid search kind '{}'. Valid options: all, books, authors",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookHit {
    pub id: i64,
    pub name: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorHit {
    pub id: i64,
    pub name: Option<String>,
    pub death_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub books: Vec<BookHit>,
    pub authors: Vec<AuthorHit>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.books.is_empty() && self.authors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub categories: usize,
    pub books: usize,
    pub authors: usize,
    pub downloaded_books: usize,
}

fn field(record: &Record, name: &str) -> Value {
    record.get(name).cloned().unwrap_or(Value::Null)
}

/// Ids listed in a book's `author` field, e.g. `"12, 40"`.
fn author_ids(book: &Record) -> Vec<i64> {
    match book.get("author") {
        Some(Value::Text(s)) => s.split(',').filter_map(|id| id.trim().parse().ok()).collect(),
        Some(value) => value.as_i64().into_iter().collect(),
        None => Vec::new(),
    }
}

fn contains_folded(haystack: Option<String>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

fn author_names(master: &Dataset, book: &Record) -> Option<String> {
    let authors = master.table(tables::AUTHOR);
    let names: Vec<String> = author_ids(book)
        .into_iter()
        .filter_map(|id| authors.get(id))
        .filter_map(|a| a.get_text("name"))
        .collect();
    (!names.is_empty()).then(|| names.join(AUTHOR_JOINER))
}

fn category_of<'a>(master: &'a Dataset, book: &Record) -> Option<&'a Record> {
    book.get_i64("category")
        .and_then(|id| master.table(tables::CATEGORY).get(id))
}

fn parse_json(record: &Record, name: &str) -> Option<serde_json::Value> {
    record
        .get(name)
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str(s).ok())
}

/// Categories by `order`, with their book counts.
pub fn categories(master: &Dataset) -> Vec<CategorySummary> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for book in master.table(tables::BOOK).iter() {
        if let Some(category) = book.get_i64("category") {
            *counts.entry(category).or_default() += 1;
        }
    }

    let mut categories: Vec<&Record> = master.table(tables::CATEGORY).iter().collect();
    categories.sort_by_key(|c| c.get_i64("order").unwrap_or(0));
    categories
        .into_iter()
        .map(|c| CategorySummary {
            id: c.id,
            name: c.get_text("name"),
            order: field(c, "order"),
            book_count: counts.get(&c.id).copied().unwrap_or(0),
        })
        .collect()
}

/// Authors by `death_number`, optionally filtered on name and biography.
pub fn authors(master: &Dataset, query: &AuthorQuery) -> Page<AuthorSummary> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for book in master.table(tables::BOOK).iter() {
        for id in author_ids(book).into_iter().collect::<BTreeSet<_>>() {
            *counts.entry(id).or_default() += 1;
        }
    }

    let needle = query.search.as_deref().map(str::to_lowercase);
    let mut matches: Vec<&Record> = master
        .table(tables::AUTHOR)
        .iter()
        .filter(|a| match &needle {
            Some(n) => contains_folded(a.get_text("name"), n) || contains_folded(a.get_text("biography"), n),
            None => true,
        })
        .collect();
    matches.sort_by_key(|a| a.get_i64("death_number").unwrap_or(UNKNOWN_YEAR));

    let summaries = matches
        .into_iter()
        .map(|a| AuthorSummary {
            id: a.id,
            name: a.get_text("name"),
            biography: a.get_text("biography"),
            death_text: a.get_text("death_text"),
            death_number: field(a, "death_number"),
            book_count: counts.get(&a.id).copied().unwrap_or(0),
        })
        .collect();
    Page::slice(
        summaries,
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    )
}

/// Books by `date`, filtered and enriched with author and category names.
pub fn books(
    master: &Dataset,
    query: &BookQuery,
    is_downloaded: impl Fn(i64) -> bool,
) -> Page<BookSummary> {
    let needle = query.search.as_deref().map(str::to_lowercase);
    let mut matches: Vec<&Record> = master
        .table(tables::BOOK)
        .iter()
        .filter(|b| match &needle {
            Some(n) => contains_folded(b.get_text("name"), n) || contains_folded(b.get_text("bibliography"), n),
            None => true,
        })
        .filter(|b| query.category.is_none() || b.get_i64("category") == query.category)
        .filter(|b| query.author.map_or(true, |id| author_ids(b).contains(&id)))
        .filter(|b| query.kind.is_none() || b.get_i64("type") == query.kind)
        .collect();
    matches.sort_by_key(|b| b.get_i64("date").unwrap_or(UNKNOWN_YEAR));

    let total = matches.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let data: Vec<BookSummary> = matches
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|b| BookSummary {
            id: b.id,
            name: b.get_text("name"),
            author: author_names(master, b),
            author_ids: field(b, "author"),
            category: category_of(master, b).and_then(|c| c.get_text("name")),
            category_id: field(b, "category"),
            kind: field(b, "type"),
            printed: field(b, "printed"),
            date: field(b, "date"),
            bibliography: b.get_text("bibliography"),
            is_downloaded: is_downloaded(b.id),
        })
        .collect();

    Page {
        total,
        count: data.len(),
        offset,
        limit,
        data,
    }
}

/// Full record of one book; `None` if the catalog does not list it.
pub fn book_details(master: &Dataset, book_id: i64, local: Option<&Dataset>) -> Option<BookDetails> {
    let book = master.table(tables::BOOK).get(book_id)?;
    let authors = master.table(tables::AUTHOR);

    Some(BookDetails {
        id: book.id,
        name: book.get_text("name"),
        authors: author_ids(book)
            .into_iter()
            .filter_map(|id| authors.get(id))
            .map(|a| AuthorRef {
                id: a.id,
                name: a.get_text("name"),
                death_text: a.get_text("death_text"),
            })
            .collect(),
        category: category_of(master, book).map(|c| CategoryRef {
            id: c.id,
            name: c.get_text("name"),
        }),
        kind: field(book, "type"),
        printed: field(book, "printed"),
        date: field(book, "date"),
        bibliography: book.get_text("bibliography"),
        version: field(book, "version"),
        pdf_links: parse_json(book, "pdf_links"),
        metadata: parse_json(book, "metadata"),
        has_content: local.is_some(),
        page_count: local.map_or(0, |d| d.table(tables::PAGE).len()),
        title_count: local.map_or(0, |d| d.table(tables::TITLE).len()),
    })
}

/// Pages of a book, optionally narrowed to one page number or part, plus
/// its outline.
pub fn book_content(book: &Dataset, query: &ContentQuery) -> Result<BookContent, OutlineError> {
    let pages = book.table(tables::PAGE);
    let titles = book.table(tables::TITLE);

    let views = pages
        .iter()
        .filter(|p| query.page.is_none() || p.get_i64("page") == query.page)
        .filter(|p| match &query.part {
            Some(part) => p.get_text("part").as_deref() == Some(part.as_str()),
            None => true,
        })
        .map(|p| PageView {
            id: p.id,
            part: field(p, "part"),
            page: field(p, "page"),
            content: p.get_text("content"),
            services: parse_json(p, "services"),
        })
        .collect();

    Ok(BookContent {
        pages: views,
        titles: outline::build(titles)?,
        total_pages: pages.len(),
        total_titles: titles.len(),
    })
}

/// Name search over books and authors.
pub fn search(master: &Dataset, query: &str, kind: SearchKind, limit: usize) -> SearchResults {
    let mut results = SearchResults::default();
    if query.chars().count() < MIN_SEARCH_LEN {
        return results;
    }
    let needle = query.to_lowercase();

    if kind.books() {
        results.books = master
            .table(tables::BOOK)
            .iter()
            .filter(|b| contains_folded(b.get_text("name"), &needle))
            .take(limit)
            .map(|b| BookHit {
                id: b.id,
                name: b.get_text("name"),
                author: author_names(master, b),
            })
            .collect();
    }
    if kind.authors() {
        results.authors = master
            .table(tables::AUTHOR)
            .iter()
            .filter(|a| contains_folded(a.get_text("name"), &needle))
            .take(limit)
            .map(|a| AuthorHit {
                id: a.id,
                name: a.get_text("name"),
                death_text: a.get_text("death_text"),
            })
            .collect();
    }
    results
}

pub fn stats(master: &Dataset, downloaded_books: usize) -> Stats {
    Stats {
        categories: master.table(tables::CATEGORY).len(),
        books: master.table(tables::BOOK).len(),
        authors: master.table(tables::AUTHOR).len(),
        downloaded_books,
    }
}
