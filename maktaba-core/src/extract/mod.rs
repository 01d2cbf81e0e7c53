//! Patch archives to normalized patch records.
//!
//! A patch archive is a zip file holding one `<table>.db` extract per
//! table. Reading the rows out of an extract is delegated to a
//! [`TableReader`]; this module owns the archive walk and the normalization
//! of raw cells:
//!
//! - the remote sentinel `"#"` becomes [`Cell::Unchanged`] (never null);
//! - `is_deleted` becomes the record's boolean deletion flag;
//! - `id` is coerced to an integer, from text if needed.

mod sqlite;

pub use sqlite::SqliteTableReader;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::sync::Arc;

use crate::record::{Cell, PatchRecord, Value, ID_FIELD};

/// Remote marker for "field unchanged since base".
pub const UNCHANGED_SENTINEL: &str = "#";
/// Column carrying the deletion flag.
pub const DELETED_FIELD: &str = "is_deleted";

const EXTRACT_SUFFIX: &str = ".db";

/// A cell as read from a table extract, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Column name and value pairs, in column order.
pub type RawRow = Vec<(String, RawValue)>;

/// Normalized patch records per table name.
pub type PatchTables = BTreeMap<String, Vec<PatchRecord>>;

/// Errors that can occur while extracting tables from an archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("archive cannot be opened: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("archive entry {entry} unreadable: {source}")]
    Entry {
        entry: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid table name {0:?}")]
    TableName(String),
    #[error("table {table} unreadable: {reason}")]
    Table { table: String, reason: String },
    #[error("table {table}, row {row}: {reason}")]
    Row {
        table: String,
        row: usize,
        reason: String,
    },
}

/// Row-level reader for one table extract.
#[async_trait]
pub trait TableReader: Send + Sync {
    /// Reads every row of `table` from the raw extract bytes.
    async fn read_table(&self, table: &str, extract: &[u8]) -> Result<Vec<RawRow>, ExtractionError>;
}

/// Outcome of extracting one archive.
///
/// Tables are all-or-nothing: a table that failed to read is absent from
/// `tables` and its error is in `failures`.
#[derive(Debug, Default)]
pub struct Extraction {
    pub tables: PatchTables,
    pub failures: Vec<ExtractionError>,
}

impl Extraction {
    /// The extracted tables, or the first table failure.
    pub fn into_tables(self) -> Result<PatchTables, ExtractionError> {
        let Extraction { tables, failures } = self;
        match failures.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(tables),
        }
    }
}

/// Extracts normalized patch records from patch archives.
#[derive(Clone)]
pub struct ArchiveTableExtractor {
    reader: Arc<dyn TableReader>,
}

impl ArchiveTableExtractor {
    pub fn new(reader: Arc<dyn TableReader>) -> Self {
        Self { reader }
    }

    /// Extracts every table of `archive`.
    ///
    /// Fails only if the archive itself cannot be opened; per-table problems
    /// are reported in [`Extraction::failures`].
    pub async fn extract(&self, archive: &[u8]) -> Result<Extraction, ExtractionError> {
        let entries = read_entries(archive)?;

        let mut extraction = Extraction::default();
        for (table, bytes) in entries {
            let result = match bytes {
                Ok(bytes) => self.extract_table(&table, &bytes).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(records) => {
                    tracing::debug!(table = %table, records = records.len(), "extracted table");
                    extraction.tables.insert(table, records);
                }
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "table extract rejected");
                    extraction.failures.push(e);
                }
            }
        }
        Ok(extraction)
    }

    async fn extract_table(
        &self,
        table: &str,
        bytes: &[u8],
    ) -> Result<Vec<PatchRecord>, ExtractionError> {
        validate_table_name(table)?;
        let rows = self.reader.read_table(table, bytes).await?;
        rows.into_iter()
            .enumerate()
            .map(|(index, row)| normalize_row(table, index, row))
            .collect()
    }
}

/// Reads the raw bytes of every `<table>.db` entry.
fn read_entries(
    archive: &[u8],
) -> Result<Vec<(String, Result<Vec<u8>, ExtractionError>)>, ExtractionError> {
    let mut zip = zip::ZipArchive::new(io::Cursor::new(archive))?;

    let mut entries = Vec::new();
    for index in 0..zip.len() {
        let mut file = match zip.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                entries.push((format!("#{}", index), Err(e.into())));
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let Some(table) = table_name(&name) else {
            tracing::debug!(entry = %name, "skipping non-table archive entry");
            continue;
        };

        let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
        let read = file
            .read_to_end(&mut bytes)
            .map(|_| bytes)
            .map_err(|source| ExtractionError::Entry {
                entry: name.clone(),
                source,
            });
        entries.push((table, read));
    }
    Ok(entries)
}

/// Largest buffer reserved up front for an entry; the declared size comes
/// from the archive and is not trusted.
const MAX_CAPACITY_HINT: u64 = 16 * 1024 * 1024;

fn capacity_hint(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_CAPACITY_HINT)).unwrap_or(0)
}

/// `dir/book.db` → `book`.
fn table_name(entry: &str) -> Option<String> {
    let file_name = entry.rsplit('/').next()?;
    let stem = file_name.strip_suffix(EXTRACT_SUFFIX)?;
    (!stem.is_empty()).then(|| stem.to_string())
}

fn validate_table_name(table: &str) -> Result<(), ExtractionError> {
    if !table.is_empty() && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ExtractionError::TableName(table.to_string()))
    }
}

/// Turns one raw row into a patch record.
pub fn normalize_row(table: &str, index: usize, row: RawRow) -> Result<PatchRecord, ExtractionError> {
    let row_error = |reason: String| ExtractionError::Row {
        table: table.to_string(),
        row: index,
        reason,
    };

    let mut id = None;
    let mut deleted = false;
    let mut fields = BTreeMap::new();
    for (name, raw) in row {
        if name == ID_FIELD {
            let parsed = parse_id(&raw).ok_or_else(|| row_error(format!("invalid id {:?}", raw)))?;
            id = Some(parsed);
        } else if name == DELETED_FIELD {
            deleted = is_truthy(&raw);
        } else {
            fields.insert(name, normalize_cell(raw));
        }
    }

    let id = id.ok_or_else(|| row_error("missing id column".to_string()))?;
    Ok(PatchRecord {
        id,
        deleted,
        fields,
    })
}

fn parse_id(raw: &RawValue) -> Option<i64> {
    match raw {
        RawValue::Integer(n) => Some(*n),
        RawValue::Real(f) if f.fract() == 0.0 => Some(*f as i64),
        RawValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(raw: &RawValue) -> bool {
    match raw {
        RawValue::Integer(n) => *n != 0,
        RawValue::Real(f) => *f != 0.0,
        RawValue::Text(s) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true")
        }
        RawValue::Null | RawValue::Blob(_) => false,
    }
}

fn normalize_cell(raw: RawValue) -> Cell {
    match raw {
        RawValue::Text(s) if s == UNCHANGED_SENTINEL => Cell::Unchanged,
        RawValue::Text(s) => Cell::Value(Value::Text(s)),
        RawValue::Null => Cell::null(),
        RawValue::Integer(n) => Cell::Value(Value::Integer(n)),
        RawValue::Real(f) => Cell::Value(Value::Real(f)),
        RawValue::Blob(bytes) => Cell::Value(Value::Text(STANDARD.encode(bytes))),
    }
}
