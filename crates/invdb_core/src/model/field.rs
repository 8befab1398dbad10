//! Field descriptors and role tag parsing.

use crate::error::{StoreError, StoreResult};
use crate::model::MAX_DETAIL;
use crate::value::Value;

/// Scalar type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Signed integer, stored as INTEGER.
    Integer,
    /// Boolean, stored as INTEGER 0/1.
    Bool,
    /// String, stored as TEXT.
    String,
    /// Structured value serialized to JSON text.
    Encoded,
}

impl FieldType {
    /// Column type used in DDL.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Bool => "INTEGER",
            Self::String | Self::Encoded => "TEXT",
        }
    }

    /// Whether `Gt`/`Lt` apply.
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Integer)
    }
}

/// Referential link declared with `fk(target +must +cascade)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Target kind. Resolved to the declared spelling when the data model is built.
    pub target: String,
    /// Enforced constraint: the target must exist.
    pub must: bool,
    /// Deleting the target deletes this row.
    pub cascade: bool,
}

/// One column of a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Scalar type.
    pub ty: FieldType,
    /// Primary key.
    pub pk: bool,
    /// Fields concatenated into a generated primary key.
    pub generator: Vec<String>,
    /// Natural key column.
    pub key: bool,
    /// Unique groups this field belongs to.
    pub unique: Vec<String>,
    /// Secondary index groups this field belongs to.
    pub index: Vec<String>,
    /// Foreign key, if any.
    pub fk: Option<ForeignKey>,
    /// Revision counter maintained by the engine.
    pub incremented: bool,
    /// Engine-provided column, never written.
    pub is_virtual: bool,
    /// Excluded from updates.
    pub constant: bool,
    /// Declared detail level; `None` for untagged fields.
    pub detail: Option<u8>,
}

impl Field {
    /// Creates a plain field with no roles.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            pk: false,
            generator: Vec::new(),
            key: false,
            unique: Vec::new(),
            index: Vec::new(),
            fk: None,
            incremented: false,
            is_virtual: false,
            constant: false,
            detail: None,
        }
    }

    /// Parses a role tag such as `pk`, `fk(Host +must),d2` or `unique(a),index(b)`.
    ///
    /// Returns `None` for the `-` tag, which keeps the field out of storage.
    pub fn parse(name: &str, ty: FieldType, tag: &str) -> StoreResult<Option<Self>> {
        let tag = tag.trim();
        if tag == "-" {
            return Ok(None);
        }
        let mut field = Self::new(name, ty);
        for role in split_roles(tag) {
            field.apply(role)?;
        }
        Ok(Some(field))
    }

    fn apply(&mut self, role: &str) -> StoreResult<()> {
        let (head, arg) = match role.find('(') {
            Some(open) => {
                let Some(inner) = role[open + 1..].strip_suffix(')') else {
                    return Err(StoreError::definition(format!(
                        "{}: unbalanced role '{role}'",
                        self.name
                    )));
                };
                (role[..open].trim(), Some(inner.trim()))
            }
            None => (role, None),
        };

        match (head, arg) {
            ("pk", None) => self.pk = true,
            ("pk", Some(list)) => {
                self.pk = true;
                self.generator = list
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ("key", None) => self.key = true,
            ("unique", Some(group)) if !group.is_empty() => self.unique.push(group.to_string()),
            ("index", Some(group)) if !group.is_empty() => self.index.push(group.to_string()),
            ("fk", Some(spec)) => self.fk = Some(parse_fk(&self.name, spec)?),
            ("incremented", None) => self.incremented = true,
            ("virtual", None) => self.is_virtual = true,
            ("const", None) => self.constant = true,
            (d, None) if d.len() > 1 && d.starts_with('d') => {
                let level: u32 = d[1..].parse().map_err(|_| {
                    StoreError::definition(format!("{}: unknown role '{role}'", self.name))
                })?;
                if level > u32::from(MAX_DETAIL) {
                    return Err(StoreError::DetailOutOfRange { detail: level });
                }
                self.detail = Some(level as u8);
            }
            _ => {
                return Err(StoreError::definition(format!(
                    "{}: unknown role '{role}'",
                    self.name
                )))
            }
        }
        Ok(())
    }

    /// Written by UPDATE (with `incremented` rendered as `col + 1`).
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        !(self.pk || self.key || self.constant || self.is_virtual)
    }

    /// Stored in the table's own column list.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        !self.is_virtual
    }

    /// Coerces a predicate value to this field's type.
    ///
    /// Booleans, integers and strings convert to one another; structured
    /// values are rejected.
    pub fn as_value(&self, value: &Value) -> StoreResult<Value> {
        let bad = |message: String| StoreError::predicate_value(&self.name, message);
        match (self.ty, value) {
            (_, Value::Json(_)) => Err(bad("structured values cannot be compared".into())),
            (_, Value::Null) => Err(bad("null cannot be compared".into())),
            (FieldType::Integer, Value::Integer(n)) => Ok(Value::Integer(*n)),
            (FieldType::Integer, Value::Bool(b)) => Ok(Value::Integer(i64::from(*b))),
            (FieldType::Integer, Value::Text(s)) => s
                .trim()
                .parse()
                .map(Value::Integer)
                .map_err(|_| bad(format!("'{s}' is not an integer"))),
            (FieldType::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldType::Bool, Value::Integer(n)) => Ok(Value::Bool(*n != 0)),
            (FieldType::Bool, Value::Text(s)) => s
                .trim()
                .parse()
                .map(Value::Bool)
                .map_err(|_| bad(format!("'{s}' is not a boolean"))),
            (FieldType::String, Value::Text(s)) => Ok(Value::Text(s.clone())),
            (FieldType::String, Value::Integer(n)) => Ok(Value::Text(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Ok(Value::Text(b.to_string())),
            (FieldType::Encoded, _) => Err(bad("encoded fields cannot be compared".into())),
        }
    }
}

fn split_roles(tag: &str) -> Vec<&str> {
    let mut roles = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in tag.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                roles.push(tag[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    roles.push(tag[start..].trim());
    roles.retain(|r| !r.is_empty());
    roles
}

fn parse_fk(field: &str, spec: &str) -> StoreResult<ForeignKey> {
    let mut parts = spec.split_whitespace();
    let Some(target) = parts.next() else {
        return Err(StoreError::definition(format!("{field}: fk without target")));
    };
    let mut fk = ForeignKey {
        target: target.to_string(),
        must: false,
        cascade: false,
    };
    for flag in parts {
        match flag {
            "+must" => fk.must = true,
            "+cascade" => fk.cascade = true,
            other => {
                return Err(StoreError::definition(format!(
                    "{field}: unknown fk flag '{other}'"
                )))
            }
        }
    }
    Ok(fk)
}
