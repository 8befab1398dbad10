//! The set of definitions known to an engine.

use crate::error::{StoreError, StoreResult};
use crate::model::definition::{Definition, Schema};
use crate::model::Model;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// All definitions of an engine, ordered parents before children.
#[derive(Debug, Clone)]
pub struct DataModel {
    definitions: Vec<Arc<Definition>>,
    by_kind: HashMap<String, usize>,
}

impl DataModel {
    /// Starts building a data model.
    #[must_use]
    pub fn builder() -> DataModelBuilder {
        DataModelBuilder::default()
    }

    /// Looks up a definition by kind, case-insensitively.
    #[must_use]
    pub fn definition(&self, kind: &str) -> Option<&Arc<Definition>> {
        self.by_kind
            .get(&kind.to_ascii_lowercase())
            .map(|&i| &self.definitions[i])
    }

    /// Like [`DataModel::definition`] but fails with `UnknownKind`.
    pub fn require(&self, kind: &str) -> StoreResult<&Arc<Definition>> {
        self.definition(kind)
            .ok_or_else(|| StoreError::unknown_kind(kind))
    }

    /// Definitions in dependency order: every FK target precedes its referrers.
    #[must_use]
    pub fn definitions(&self) -> &[Arc<Definition>] {
        &self.definitions
    }

    /// Number of kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if the model has no kinds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub(crate) fn set_default_detail(&mut self, detail: u8) {
        for def in &mut self.definitions {
            Arc::make_mut(def).set_default_detail(detail);
        }
    }
}

/// Collects schemas and validates them into a [`DataModel`].
#[derive(Debug, Default)]
pub struct DataModelBuilder {
    schemas: Vec<Schema>,
}

impl DataModelBuilder {
    /// Adds the schema of a model type.
    #[must_use]
    pub fn with<M: Model>(mut self) -> Self {
        self.schemas.push(M::schema());
        self
    }

    /// Adds a schema directly.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Validates every schema, resolves foreign keys and orders the kinds.
    pub fn build(self) -> StoreResult<DataModel> {
        let mut defs = Vec::with_capacity(self.schemas.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for schema in &self.schemas {
            let def = Definition::new(schema, 0)?;
            let key = def.kind().to_ascii_lowercase();
            if index.insert(key, defs.len()).is_some() {
                return Err(StoreError::definition(format!(
                    "duplicate kind '{}'",
                    def.kind()
                )));
            }
            defs.push(def);
        }

        // Resolve every FK target to its declared spelling and check link types.
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); defs.len()];
        let mut resolved = Vec::new();
        for (child, def) in defs.iter().enumerate() {
            for (pos, field) in def.fields().iter().enumerate() {
                let Some(fk) = &field.fk else { continue };
                let Some(&parent) = index.get(&fk.target.to_ascii_lowercase()) else {
                    return Err(StoreError::unknown_kind(&fk.target));
                };
                let target = &defs[parent];
                if field.ty != target.pk().ty {
                    return Err(StoreError::MustBePointer {
                        kind: def.kind().to_string(),
                        field: field.name.clone(),
                    });
                }
                if parent != child && !edges[parent].contains(&child) {
                    edges[parent].push(child);
                }
                resolved.push((child, pos, target.kind().to_string()));
            }
        }
        for (child, pos, target) in resolved {
            defs[child].resolve_target(pos, target);
        }

        let order = topological_order(&edges).ok_or_else(|| {
            let kinds: Vec<&str> = defs.iter().map(Definition::kind).collect();
            StoreError::definition(format!(
                "foreign keys form a cycle among {}",
                kinds.join(", ")
            ))
        })?;

        let mut slots: Vec<Option<Definition>> = defs.into_iter().map(Some).collect();
        let mut definitions = Vec::with_capacity(order.len());
        let mut by_kind = HashMap::with_capacity(order.len());
        for i in order {
            if let Some(def) = slots[i].take() {
                by_kind.insert(def.kind().to_ascii_lowercase(), definitions.len());
                definitions.push(Arc::new(def));
            }
        }

        Ok(DataModel {
            definitions,
            by_kind,
        })
    }
}

/// Kahn's algorithm, stable with respect to declaration order.
fn topological_order(edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut indegree = vec![0usize; edges.len()];
    for children in edges {
        for &child in children {
            indegree[child] += 1;
        }
    }
    let mut ready: VecDeque<usize> = (0..edges.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(edges.len());
    while let Some(next) = ready.pop_front() {
        order.push(next);
        for &child in &edges[next] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.push_back(child);
            }
        }
    }
    (order.len() == edges.len()).then_some(order)
}
