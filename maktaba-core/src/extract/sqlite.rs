//! Table extracts that are SQLite database files.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Connection, Row, SqliteConnection, TypeInfo, ValueRef};
use std::io::{self, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

use super::{ExtractionError, RawRow, RawValue, TableReader};

/// Reads `SELECT * FROM <table>` out of an extract.
///
/// SQLite needs a file to open, so each extract is spooled to a temporary
/// file that is removed once the rows are read.
#[derive(Debug, Clone, Default)]
pub struct SqliteTableReader {
    scratch_dir: Option<PathBuf>,
}

impl SqliteTableReader {
    /// Spools extracts to the system temp directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spools extracts to `dir` instead of the system temp directory.
    pub fn with_scratch_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: Some(dir.into()),
        }
    }

    fn spool(&self, extract: &[u8]) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("extract-").suffix(".db");
        let mut file = match &self.scratch_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        file.write_all(extract)?;
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl TableReader for SqliteTableReader {
    async fn read_table(&self, table: &str, extract: &[u8]) -> Result<Vec<RawRow>, ExtractionError> {
        let unreadable = |reason: String| ExtractionError::Table {
            table: table.to_string(),
            reason,
        };

        let file = self.spool(extract).map_err(|e| unreadable(e.to_string()))?;
        let options = SqliteConnectOptions::new()
            .filename(file.path())
            .read_only(true);
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| unreadable(e.to_string()))?;

        let sql = format!("SELECT * FROM \"{}\"", table);
        let rows = sqlx::query(&sql).fetch_all(&mut conn).await;
        if let Err(e) = conn.close().await {
            tracing::debug!(table, error = %e, "closing extract connection failed");
        }
        let rows = rows.map_err(|e| unreadable(e.to_string()))?;

        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| unreadable(e.to_string()))
    }
}

fn decode_row(row: &SqliteRow) -> Result<RawRow, sqlx::Error> {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_value(row, column.ordinal())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

/// Dispatches on the storage class of the value itself; SQLite columns are
/// dynamically typed, so the declared column type is not reliable.
fn decode_value(row: &SqliteRow, index: usize) -> Result<RawValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(RawValue::Null);
    }
    let kind = raw.type_info().name().to_ascii_uppercase();

    Ok(match kind.as_str() {
        "INTEGER" | "BOOLEAN" => RawValue::Integer(row.try_get_unchecked(index)?),
        "REAL" => RawValue::Real(row.try_get_unchecked(index)?),
        "BLOB" => RawValue::Blob(row.try_get_unchecked(index)?),
        _ => RawValue::Text(row.try_get_unchecked(index)?),
    })
}
