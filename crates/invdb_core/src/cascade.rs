//! Foreign key graph: who references whom, and what a delete takes with it.

use crate::error::StoreResult;
use crate::model::{DataModel, Definition};
use crate::row::Row;
use crate::store;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One incoming foreign key of a parent kind.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Referencing kind.
    pub child: Arc<Definition>,
    /// Link field on the child.
    pub field: String,
    /// Deleting the parent deletes the child.
    pub cascade: bool,
    /// The link is an enforced constraint.
    pub must: bool,
}

/// Relation graph built once from a data model.
#[derive(Debug, Clone)]
pub struct FkGraph {
    sorted: Vec<Arc<Definition>>,
    referencing: HashMap<String, Vec<Relation>>,
}

impl FkGraph {
    /// Builds the graph.
    #[must_use]
    pub fn new(model: &DataModel) -> Self {
        let mut referencing: HashMap<String, Vec<Relation>> = HashMap::new();
        for child in model.definitions() {
            for (field, fk) in child.foreign_keys() {
                referencing
                    .entry(fk.target.to_ascii_lowercase())
                    .or_default()
                    .push(Relation {
                        child: Arc::clone(child),
                        field: field.name.clone(),
                        cascade: fk.cascade,
                        must: fk.must,
                    });
            }
        }
        Self {
            sorted: model.definitions().to_vec(),
            referencing,
        }
    }

    /// Every foreign key pointing at `parent`.
    #[must_use]
    pub fn referencing(&self, parent: &Definition) -> &[Relation] {
        self.referencing
            .get(&parent.kind().to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Definitions with parents before children.
    #[must_use]
    pub fn sorted(&self) -> &[Arc<Definition>] {
        &self.sorted
    }

    /// Descendants of `root` reachable through `+cascade` links, leaves first.
    ///
    /// Expands breadth-first one level at a time, then reverses the levels.
    /// Rows are read at full detail.
    pub(crate) fn cascade_deleted(
        &self,
        conn: &Connection,
        def: &Arc<Definition>,
        root: &Row,
    ) -> StoreResult<Vec<(Arc<Definition>, Row)>> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        seen.insert((def.kind().to_string(), def.pk_value(root)?.key_string()));

        let mut levels: Vec<Vec<(Arc<Definition>, Row)>> = Vec::new();
        let mut current = vec![(Arc::clone(def), root.clone())];
        while !current.is_empty() {
            let mut next = Vec::new();
            for (parent, row) in &current {
                let pk = parent.pk_value(row)?;
                for rel in self.referencing(parent).iter().filter(|r| r.cascade) {
                    let Some(link) = rel.child.field(&rel.field) else {
                        continue;
                    };
                    for child in store::children(conn, &rel.child, link, &pk)? {
                        let key = rel.child.pk_value(&child)?.key_string();
                        if seen.insert((rel.child.kind().to_string(), key)) {
                            next.push((Arc::clone(&rel.child), child));
                        }
                    }
                }
            }
            if !next.is_empty() {
                levels.push(next.clone());
            }
            current = next;
        }

        Ok(levels.into_iter().rev().flatten().collect())
    }
}
