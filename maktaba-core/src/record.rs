//! Records, tables and datasets.
//!
//! A [`Record`] is what gets persisted: an integer `id` plus a map of scalar
//! fields. A [`PatchRecord`] is what comes out of a patch archive: the same
//! shape, but its cells may carry the [`Cell::Unchanged`] marker and it has an
//! explicit deletion flag. Keeping the two apart means the "unchanged" marker
//! can never reach a snapshot file.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Name of the `id` column every table carries.
pub const ID_FIELD: &str = "id";

/// A scalar field value as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value. Integer-valued text and reals count too,
    /// since the remote source is inconsistent about `1` vs `"1"`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering for display purposes; `None` for null.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(n) => Some(n.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

/// A cell of a patch record.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Value),
    /// The remote did not change this field since the base version.
    Unchanged,
}

impl Cell {
    pub fn null() -> Self {
        Cell::Value(Value::Null)
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        Cell::Value(value)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Value(s.into())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Value(s.into())
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Value(n.into())
    }
}

impl From<f64> for Cell {
    fn from(f: f64) -> Self {
        Cell::Value(f.into())
    }
}

/// A persisted row of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::to_text)
    }
}

/// A row extracted from a patch archive, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRecord {
    pub id: i64,
    pub deleted: bool,
    pub fields: BTreeMap<String, Cell>,
}

impl PatchRecord {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            deleted: false,
            fields: BTreeMap::new(),
        }
    }

    /// A tombstone for `id`.
    pub fn deletion(id: i64) -> Self {
        Self {
            id,
            deleted: true,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, cell: impl Into<Cell>) -> Self {
        self.fields.insert(name.to_string(), cell.into());
        self
    }

    pub fn unchanged(mut self, name: &str) -> Self {
        self.fields.insert(name.to_string(), Cell::Unchanged);
        self
    }

    /// Materializes the patch as a brand new record. There is no base value
    /// to keep, so unchanged cells become null.
    pub fn to_record(&self) -> Record {
        let fields = self
            .fields
            .iter()
            .map(|(name, cell)| {
                let value = match cell {
                    Cell::Value(v) => v.clone(),
                    Cell::Unchanged => Value::Null,
                };
                (name.clone(), value)
            })
            .collect();
        Record {
            id: self.id,
            fields,
        }
    }
}

/// A table of live records keyed by id.
///
/// Serialized as a JSON array; duplicate ids in the input keep the last one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Vec<Record>")]
pub struct Table {
    records: BTreeMap<i64, Record>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Record> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.records.contains_key(&id)
    }

    /// Inserts or replaces the record with the same id.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        self.records.insert(record.id, record)
    }

    pub fn remove(&mut self, id: i64) -> Option<Record> {
        self.records.remove(&id)
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }
}

impl From<Vec<Record>> for Table {
    fn from(records: Vec<Record>) -> Self {
        records.into_iter().collect()
    }
}

impl FromIterator<Record> for Table {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut table = Table::new();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.values())
    }
}

/// The two kinds of dataset the library keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Categories, authors and the book catalog.
    Master,
    /// Pages and outline of one book.
    Book,
}

impl DatasetKind {
    /// The tables this kind of dataset is made of.
    pub fn tables(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Master => &[tables::CATEGORY, tables::AUTHOR, tables::BOOK],
            DatasetKind::Book => &[tables::PAGE, tables::TITLE],
        }
    }

    pub fn knows(&self, table: &str) -> bool {
        self.tables().contains(&table)
    }
}

/// Known table names.
pub mod tables {
    pub const CATEGORY: &str = "category";
    pub const AUTHOR: &str = "author";
    pub const BOOK: &str = "book";
    pub const PAGE: &str = "page";
    pub const TITLE: &str = "title";
}

/// A named collection of tables, persisted as one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    tables: BTreeMap<String, Table>,
}

/// The single catalog dataset.
pub type MasterDataset = Dataset;
/// The content dataset of one book.
pub type BookDataset = Dataset;

impl Dataset {
    /// A dataset of `kind` with every known table present and empty.
    pub fn empty(kind: DatasetKind) -> Self {
        let mut dataset = Dataset::default();
        dataset.ensure_tables(kind);
        dataset
    }

    /// Adds any known table of `kind` that is missing.
    pub fn ensure_tables(&mut self, kind: DatasetKind) {
        for name in kind.tables() {
            self.tables.entry((*name).to_string()).or_default();
        }
    }

    /// Returns the table, or an empty one if it does not exist.
    pub fn table(&self, name: &str) -> &Table {
        static EMPTY: Table = Table {
            records: BTreeMap::new(),
        };
        self.tables.get(name).unwrap_or(&EMPTY)
    }

    /// Removes the table from the dataset, yielding it (empty if absent).
    pub fn take_table(&mut self, name: &str) -> Table {
        self.tables.remove(name).unwrap_or_default()
    }

    pub fn set_table(&mut self, name: impl Into<String>, table: Table) {
        self.tables.insert(name.into(), table);
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Live record count per table.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.tables
            .iter()
            .map(|(name, table)| (name.clone(), table.len()))
            .collect()
    }
}
