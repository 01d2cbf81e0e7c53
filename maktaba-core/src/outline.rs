//! Hierarchical outline built from the flat `title` table.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::record::{Record, Table};

/// Parent id of top-level entries.
pub const ROOT_PARENT: i64 = 0;

/// Deepest nesting accepted; deeper chains are reported as malformed.
pub const MAX_DEPTH: usize = 256;

/// One entry of a book outline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleNode {
    pub id: i64,
    pub content: Option<String>,
    pub page_id: Option<i64>,
    pub children: Vec<TitleNode>,
}

/// The title graph could not be turned into a tree.
#[derive(Debug, thiserror::Error)]
pub enum OutlineError {
    #[error("title {id} is reachable twice from the outline root")]
    Cycle { id: i64 },
    #[error("outline is deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Builds the outline rooted at `parent == 0`.
///
/// Siblings are ordered by ascending id. Entries whose parent chain never
/// reaches the root are left out.
pub fn build(titles: &Table) -> Result<Vec<TitleNode>, OutlineError> {
    let mut children: BTreeMap<i64, Vec<&Record>> = BTreeMap::new();
    // Table iteration is id-ascending, so every sibling list is already sorted.
    for record in titles.iter() {
        children.entry(parent_of(record)).or_default().push(record);
    }

    let mut builder = Builder {
        children: &children,
        visited: HashSet::new(),
        limit: MAX_DEPTH,
    };
    let roots = builder.level(ROOT_PARENT, 0)?;

    let orphans = titles.len() - builder.visited.len();
    if orphans > 0 {
        tracing::warn!(orphans, "title entries not reachable from the outline root");
    }
    Ok(roots)
}

/// Missing or null parents count as top level.
fn parent_of(record: &Record) -> i64 {
    record.get_i64("parent").unwrap_or(ROOT_PARENT)
}

struct Builder<'a> {
    children: &'a BTreeMap<i64, Vec<&'a Record>>,
    visited: HashSet<i64>,
    limit: usize,
}

impl Builder<'_> {
    fn level(&mut self, parent: i64, depth: usize) -> Result<Vec<TitleNode>, OutlineError> {
        let Some(records) = self.children.get(&parent) else {
            return Ok(Vec::new());
        };
        if depth >= self.limit {
            return Err(OutlineError::TooDeep { limit: self.limit });
        }

        let mut nodes = Vec::with_capacity(records.len());
        for record in records {
            if !self.visited.insert(record.id) {
                return Err(OutlineError::Cycle { id: record.id });
            }
            nodes.push(TitleNode {
                id: record.id,
                content: record.get_text("content"),
                page_id: record.get_i64("page"),
                children: self.level(record.id, depth + 1)?,
            });
        }
        Ok(nodes)
    }
}
