//! Delta merge of patch records onto persisted tables.
//!
//! Rules, applied per patch record in archive order:
//! - a deletion removes the record outright (no tombstone is kept);
//! - an update overwrites every patched field except those marked
//!   [`Cell::Unchanged`]; fields the patch does not mention are kept;
//! - an unknown id is inserted, with unchanged cells resolved to null.
//!
//! The merge is idempotent: applying the same patch twice gives the same
//! table as applying it once.

use std::collections::BTreeMap;

use crate::record::{Cell, Dataset, DatasetKind, PatchRecord, Table};

/// How a patch relates to the tables it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// Incremental delta merged on top of the existing table.
    Delta,
    /// Full release: each table in the patch is rebuilt from scratch.
    Replace,
}

/// Merges `patch` onto `base`, producing the next generation of the table.
pub fn merge(base: Table, patch: &[PatchRecord]) -> Table {
    let mut table = base;
    for record in patch {
        apply(&mut table, record);
    }
    table
}

fn apply(table: &mut Table, patch: &PatchRecord) {
    if patch.deleted {
        table.remove(patch.id);
        return;
    }

    match table.get_mut(patch.id) {
        Some(existing) => {
            for (name, cell) in &patch.fields {
                if let Cell::Value(value) = cell {
                    existing.fields.insert(name.clone(), value.clone());
                }
            }
        }
        None => {
            table.insert(patch.to_record());
        }
    }
}

/// Applies a multi-table patch to a dataset of `kind`.
///
/// Tables absent from the patch pass through untouched. Tables the dataset
/// kind does not know about are skipped.
pub fn apply_patch(
    mut dataset: Dataset,
    kind: DatasetKind,
    patch: &BTreeMap<String, Vec<PatchRecord>>,
    mode: PatchMode,
) -> Dataset {
    for (name, records) in patch {
        if !kind.knows(name) {
            tracing::warn!(table = %name, ?kind, "ignoring table not part of dataset");
            continue;
        }

        let base = match mode {
            PatchMode::Delta => dataset.take_table(name),
            PatchMode::Replace => Table::new(),
        };
        let merged = merge(base, records);
        tracing::debug!(
            table = %name,
            patch_records = records.len(),
            live_records = merged.len(),
            ?mode,
            "merged table"
        );
        dataset.set_table(name.clone(), merged);
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{tables, Record, Value};

    fn book_table() -> Table {
        vec![Record::new(10).with("name", "A").with("author", "1")].into()
    }

    #[test]
    fn test_update_keeps_unchanged_field() {
        let patch = vec![PatchRecord::new(10).unchanged("name").with("author", "2")];

        let result = merge(book_table(), &patch);

        let expected: Table = vec![Record::new(10).with("name", "A").with("author", "2")].into();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_deletion_after_update_empties_table() {
        let updated = merge(
            book_table(),
            &[PatchRecord::new(10).unchanged("name").with("author", "2")],
        );

        let result = merge(updated, &[PatchRecord::deletion(10)]);

        assert!(result.is_empty());
    }

    #[test]
    fn test_explicit_null_clears_but_unchanged_keeps() {
        let cleared = merge(book_table(), &[PatchRecord::new(10).with("name", Cell::null())]);
        let kept = merge(book_table(), &[PatchRecord::new(10).unchanged("name")]);

        assert_eq!(cleared.get(10).unwrap().get("name"), Some(&Value::Null));
        assert_eq!(kept.get(10).unwrap().get("name"), Some(&Value::from("A")));
        assert_ne!(cleared, kept);
    }

    #[test]
    fn test_fields_absent_from_patch_are_kept() {
        let result = merge(book_table(), &[PatchRecord::new(10).with("date", 300_i64)]);

        let record = result.get(10).unwrap();
        assert_eq!(record.get_text("name").as_deref(), Some("A"));
        assert_eq!(record.get_text("author").as_deref(), Some("1"));
        assert_eq!(record.get_i64("date"), Some(300));
    }

    #[test]
    fn test_insert_new_record_resolves_unchanged_to_null() {
        let patch = vec![PatchRecord::new(11).with("name", "B").unchanged("author")];

        let result = merge(book_table(), &patch);

        assert_eq!(result.len(), 2);
        let inserted = result.get(11).unwrap();
        assert_eq!(inserted.get("name"), Some(&Value::from("B")));
        assert_eq!(inserted.get("author"), Some(&Value::Null));
    }

    #[test]
    fn test_deleting_absent_id_is_noop() {
        let result = merge(book_table(), &[PatchRecord::deletion(99)]);
        assert_eq!(result, book_table());
    }

    #[test]
    fn test_later_duplicate_wins() {
        let patch = vec![
            PatchRecord::new(10).with("name", "first").with("author", "3"),
            PatchRecord::new(10).with("name", "second").unchanged("author"),
        ];

        let result = merge(book_table(), &patch);

        let record = result.get(10).unwrap();
        assert_eq!(record.get_text("name").as_deref(), Some("second"));
        assert_eq!(record.get_text("author").as_deref(), Some("3"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let patches: Vec<Vec<PatchRecord>> = vec![
            vec![PatchRecord::new(10).unchanged("name").with("author", "2")],
            vec![PatchRecord::deletion(10), PatchRecord::new(10).unchanged("name")],
            vec![
                PatchRecord::new(12).with("name", "C"),
                PatchRecord::deletion(12),
                PatchRecord::new(13).unchanged("name").with("x", 1.5),
            ],
            vec![
                PatchRecord::new(10).with("name", "x"),
                PatchRecord::new(10).unchanged("name").with("name2", Cell::null()),
            ],
        ];

        for patch in patches {
            let once = merge(book_table(), &patch);
            let twice = merge(once.clone(), &patch);
            assert_eq!(once, twice, "patch {:?} is not idempotent", patch);
        }
    }

    #[test]
    fn test_apply_patch_passes_through_untouched_tables() {
        let mut dataset = Dataset::empty(DatasetKind::Master);
        dataset.set_table(tables::BOOK, book_table());
        dataset.set_table(
            tables::AUTHOR,
            vec![Record::new(1).with("name", "Author")].into(),
        );

        let mut patch = BTreeMap::new();
        patch.insert(
            tables::BOOK.to_string(),
            vec![PatchRecord::new(10).with("name", "Renamed")],
        );

        let result = apply_patch(dataset.clone(), DatasetKind::Master, &patch, PatchMode::Delta);

        assert_eq!(result.table(tables::AUTHOR), dataset.table(tables::AUTHOR));
        assert_eq!(
            result.table(tables::BOOK).get(10).unwrap().get_text("name").as_deref(),
            Some("Renamed")
        );
    }

    #[test]
    fn test_apply_patch_replace_resets_only_patched_tables() {
        let mut dataset = Dataset::empty(DatasetKind::Book);
        dataset.set_table(
            tables::PAGE,
            vec![Record::new(1).with("content", "old"), Record::new(2)].into(),
        );
        dataset.set_table(tables::TITLE, vec![Record::new(5).with("parent", 0_i64)].into());

        let mut patch = BTreeMap::new();
        patch.insert(
            tables::PAGE.to_string(),
            vec![PatchRecord::new(3).with("content", "new")],
        );

        let result = apply_patch(dataset, DatasetKind::Book, &patch, PatchMode::Replace);

        let pages: Vec<i64> = result.table(tables::PAGE).iter().map(|r| r.id).collect();
        assert_eq!(pages, vec![3]);
        assert_eq!(result.table(tables::TITLE).len(), 1);
    }

    #[test]
    fn test_apply_patch_ignores_unknown_tables() {
        let mut patch = BTreeMap::new();
        patch.insert("page".to_string(), vec![PatchRecord::new(1)]);

        let result = apply_patch(
            Dataset::empty(DatasetKind::Master),
            DatasetKind::Master,
            &patch,
            PatchMode::Delta,
        );

        assert_eq!(result, Dataset::empty(DatasetKind::Master));
    }
}
