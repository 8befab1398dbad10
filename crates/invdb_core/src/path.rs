//! Slash-separated paths built by walking parent links.

use crate::engine::Engine;
use crate::error::{StoreError, StoreResult};
use crate::model::{Definition, Model};
use crate::row::Row;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// How one kind contributes to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    /// Kind the rule applies to.
    pub kind: String,
    /// Field whose value is this kind's path segment.
    pub segment: String,
    /// Foreign key field naming the parent, if the kind has one.
    pub parent: Option<String>,
}

impl PathRule {
    /// A rule for a root kind.
    pub fn root(kind: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            segment: segment.into(),
            parent: None,
        }
    }

    /// A rule for a kind nested under the target of `parent`.
    pub fn nested(
        kind: impl Into<String>,
        segment: impl Into<String>,
        parent: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            segment: segment.into(),
            parent: Some(parent.into()),
        }
    }
}

/// Builds paths such as `project/vm-name`.
///
/// Parent rows are cached for the lifetime of the builder, so one builder
/// per listing keeps repeated parents to a single read. Missing parents end
/// the walk; the path then starts at the last row found.
#[derive(Debug)]
pub struct PathBuilder {
    engine: Engine,
    rules: HashMap<String, PathRule>,
    cache: HashMap<(String, String), Option<Row>>,
}

impl PathBuilder {
    /// Creates a builder without rules.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            rules: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Adds a rule, checking its fields against the data model.
    pub fn rule(mut self, rule: PathRule) -> StoreResult<Self> {
        let def = self.engine.model().require(&rule.kind)?;
        if def.field(&rule.segment).is_none() {
            return Err(StoreError::field_type(
                &rule.segment,
                format!("not a field of {}", def.kind()),
            ));
        }
        if let Some(parent) = &rule.parent {
            let linked = def.field(parent).is_some_and(|f| f.fk.is_some());
            if !linked {
                return Err(StoreError::MustBePointer {
                    kind: def.kind().to_string(),
                    field: parent.clone(),
                });
            }
        }
        self.rules.insert(rule.kind.to_ascii_lowercase(), rule);
        Ok(self)
    }

    /// Path of a typed row.
    pub fn path_of<M: Model>(&mut self, model: &M) -> StoreResult<String> {
        let mut row = Row::new();
        model.encode(&mut row)?;
        self.path(M::KIND, &row)
    }

    /// Path of `row` of `kind`.
    ///
    /// A kind without a rule contributes its primary key as the only segment.
    pub fn path(&mut self, kind: &str, row: &Row) -> StoreResult<String> {
        let mut def = Arc::clone(self.engine.model().require(kind)?);
        let mut row = row.clone();
        let mut segments = Vec::new();
        let mut visited = HashSet::new();

        loop {
            let Some(rule) = self.rules.get(&def.kind().to_ascii_lowercase()).cloned() else {
                segments.push(def.pk_value(&row)?.key_string());
                break;
            };
            segments.push(row.value(&rule.segment).map(Value::key_string).unwrap_or_default());
            if !visited.insert((def.kind().to_string(), def.pk_value(&row)?.key_string())) {
                debug!(kind = def.kind(), "path walk hit a cycle");
                break;
            }

            let Some((target, pk)) = parent_link(&def, &rule, &row) else {
                break;
            };
            let parent_def = Arc::clone(self.engine.model().require(&target)?);
            let Some(parent) = self.parent(&parent_def, &pk)? else {
                break;
            };
            def = parent_def;
            row = parent;
        }

        segments.reverse();
        Ok(segments.join("/"))
    }

    fn parent(&mut self, def: &Definition, pk: &Value) -> StoreResult<Option<Row>> {
        let key = (def.kind().to_string(), pk.key_string());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        let found = self.engine.record(def.kind(), pk)?;
        self.cache.insert(key, found.clone());
        Ok(found)
    }
}

/// Target kind and key of the row's parent, unless the link is unset.
fn parent_link(def: &Definition, rule: &PathRule, row: &Row) -> Option<(String, Value)> {
    let field = def.field(rule.parent.as_deref()?)?;
    let fk = field.fk.as_ref()?;
    let value = row.value(&field.name)?;
    let unset = match value {
        Value::Null => true,
        Value::Integer(n) => *n == 0,
        Value::Text(s) => s.is_empty(),
        _ => false,
    };
    if unset {
        None
    } else {
        Some((fk.target.clone(), value.clone()))
    }
}
