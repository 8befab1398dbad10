//! Schemas and validated definitions.

use crate::error::{StoreError, StoreResult};
use crate::model::field::{Field, FieldType, ForeignKey};
use crate::row::Row;
use crate::value::Value;
use std::collections::BTreeMap;

/// Kind name reserved for the label side table.
pub(crate) const LABEL_KIND: &str = "Label";

/// Declarative description of a kind: field names, types and role tags.
#[derive(Debug, Clone)]
pub struct Schema {
    kind: String,
    fields: Vec<(String, FieldType, String)>,
}

impl Schema {
    /// Starts a schema for `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    /// Declares a field with its role tag (`""` for none).
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType, tag: impl Into<String>) -> Self {
        self.fields.push((name.into(), ty, tag.into()));
        self
    }

    /// Kind name.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// A validated kind: fields with resolved roles plus derived indices.
#[derive(Debug, Clone)]
pub struct Definition {
    kind: String,
    fields: Vec<Field>,
    pk: usize,
    incremented: Option<usize>,
    default_detail: u8,
    unique_groups: BTreeMap<String, Vec<usize>>,
    index_groups: BTreeMap<String, Vec<usize>>,
}

impl Definition {
    /// Parses and validates a schema.
    ///
    /// Untagged fields receive `default_detail`; key fields are always detail 0.
    pub fn new(schema: &Schema, default_detail: u8) -> StoreResult<Self> {
        let kind = schema.kind.trim();
        if kind.is_empty() {
            return Err(StoreError::MustBeObject {
                kind: schema.kind.clone(),
            });
        }
        check_identifier(kind)?;
        if kind.eq_ignore_ascii_case(LABEL_KIND) {
            return Err(StoreError::definition(format!(
                "kind name '{kind}' is reserved"
            )));
        }

        let mut fields: Vec<Field> = Vec::with_capacity(schema.fields.len());
        for (name, ty, tag) in &schema.fields {
            check_identifier(name)?;
            let Some(mut field) = Field::parse(name, *ty, tag)? else {
                continue;
            };
            if fields.iter().any(|f| f.name.eq_ignore_ascii_case(name)) {
                return Err(StoreError::definition(format!(
                    "{kind}: duplicate field '{name}'"
                )));
            }
            if field.pk || field.key {
                field.detail = Some(0);
            }
            fields.push(field);
        }
        if !fields.iter().any(Field::is_stored) {
            return Err(StoreError::MustBeObject {
                kind: kind.to_string(),
            });
        }

        let pks: Vec<usize> = positions(&fields, |f| f.pk);
        let &[pk] = pks.as_slice() else {
            return Err(StoreError::MustHavePk {
                kind: kind.to_string(),
            });
        };

        let pk_field = &fields[pk];
        if pk_field.is_virtual {
            return Err(StoreError::PkType {
                kind: kind.to_string(),
                field: pk_field.name.clone(),
            });
        }
        if pk_field.generator.is_empty() {
            if !matches!(pk_field.ty, FieldType::String | FieldType::Integer) {
                return Err(StoreError::PkType {
                    kind: kind.to_string(),
                    field: pk_field.name.clone(),
                });
            }
        } else {
            if pk_field.ty != FieldType::String {
                return Err(StoreError::GenPkType {
                    kind: kind.to_string(),
                    message: format!("'{}' must be a string", pk_field.name),
                });
            }
            for name in &pk_field.generator {
                match fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)) {
                    Some(f) if f.ty == FieldType::String && !f.pk => {}
                    Some(_) => {
                        return Err(StoreError::GenPkType {
                            kind: kind.to_string(),
                            message: format!("'{name}' is not a string field"),
                        })
                    }
                    None => {
                        return Err(StoreError::GenPkType {
                            kind: kind.to_string(),
                            message: format!("'{name}' does not exist"),
                        })
                    }
                }
            }
        }

        let incremented = positions(&fields, |f| f.incremented);
        if incremented.len() > 1 {
            return Err(StoreError::definition(format!(
                "{kind}: more than one incremented field"
            )));
        }
        for field in &fields {
            if field.incremented && (field.ty != FieldType::Integer || !field.is_mutable()) {
                return Err(StoreError::definition(format!(
                    "{kind}.{}: incremented field must be a mutable integer",
                    field.name
                )));
            }
            if field.is_virtual && field.ty != FieldType::Integer {
                return Err(StoreError::definition(format!(
                    "{kind}.{}: virtual field must be an integer",
                    field.name
                )));
            }
            if field.is_virtual && field.fk.is_some() {
                return Err(StoreError::MustBePointer {
                    kind: kind.to_string(),
                    field: field.name.clone(),
                });
            }
        }

        let mut unique_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut index_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, field) in fields.iter().enumerate() {
            if field.is_virtual && !(field.unique.is_empty() && field.index.is_empty()) {
                return Err(StoreError::definition(format!(
                    "{kind}.{}: virtual fields cannot be indexed",
                    field.name
                )));
            }
            for group in &field.unique {
                unique_groups.entry(group.clone()).or_default().push(i);
            }
            for group in &field.index {
                index_groups.entry(group.clone()).or_default().push(i);
            }
        }

        Ok(Self {
            kind: kind.to_string(),
            fields,
            pk,
            incremented: incremented.first().copied(),
            default_detail,
            unique_groups,
            index_groups,
        })
    }

    /// Kind name.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// All fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field case-insensitively.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// The primary key field.
    #[must_use]
    pub fn pk(&self) -> &Field {
        &self.fields[self.pk]
    }

    /// The revision counter, if declared.
    #[must_use]
    pub fn incremented(&self) -> Option<&Field> {
        self.incremented.map(|i| &self.fields[i])
    }

    /// Natural key fields.
    pub fn key_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.key)
    }

    /// Fields stored in the table.
    pub fn stored_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_stored())
    }

    /// Foreign keys with their declaring fields.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Field, &ForeignKey)> {
        self.fields
            .iter()
            .filter_map(|f| f.fk.as_ref().map(|fk| (f, fk)))
    }

    /// Unique constraint groups.
    pub fn unique_groups(&self) -> impl Iterator<Item = (&str, Vec<&Field>)> {
        self.groups(&self.unique_groups)
    }

    /// Secondary index groups.
    pub fn index_groups(&self) -> impl Iterator<Item = (&str, Vec<&Field>)> {
        self.groups(&self.index_groups)
    }

    /// Detail level of a field, falling back to the default for untagged fields.
    #[must_use]
    pub fn detail_of(&self, field: &Field) -> u8 {
        field.detail.unwrap_or(self.default_detail)
    }

    /// Fields projected at `detail`.
    #[must_use]
    pub fn projection(&self, detail: u8) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| self.detail_of(f) <= detail)
            .collect()
    }

    /// Reads the primary key from a row, computing it first for generated keys.
    pub fn pk_value(&self, row: &Row) -> StoreResult<Value> {
        let pk = self.pk();
        if !pk.generator.is_empty() {
            return Ok(Value::Text(self.generate_pk(row)?));
        }
        match row.value(&pk.name) {
            Some(Value::Null) | None => Err(StoreError::MustHavePk {
                kind: self.kind.clone(),
            }),
            Some(value) => pk.as_value(value).map_err(|_| StoreError::PkType {
                kind: self.kind.clone(),
                field: pk.name.clone(),
            }),
        }
    }

    /// Concatenates the generator fields' current values.
    fn generate_pk(&self, row: &Row) -> StoreResult<String> {
        let mut out = String::new();
        for name in &self.pk().generator {
            out.push_str(&row.get::<String>(name)?);
        }
        Ok(out)
    }

    /// Assigns the generated primary key on `row`, if the kind has one.
    pub(crate) fn assign_pk(&self, row: &mut Row) -> StoreResult<()> {
        if !self.pk().generator.is_empty() {
            let pk = self.generate_pk(row)?;
            row.set(&self.pk().name, pk);
        }
        Ok(())
    }

    pub(crate) fn set_default_detail(&mut self, detail: u8) {
        self.default_detail = detail;
    }

    pub(crate) fn resolve_target(&mut self, field: usize, target: String) {
        if let Some(fk) = self.fields[field].fk.as_mut() {
            fk.target = target;
        }
    }

    fn groups<'a>(
        &'a self,
        groups: &'a BTreeMap<String, Vec<usize>>,
    ) -> impl Iterator<Item = (&'a str, Vec<&'a Field>)> {
        groups
            .iter()
            .map(|(name, members)| (name.as_str(), members.iter().map(|&i| &self.fields[i]).collect()))
    }
}

fn positions(fields: &[Field], pred: impl Fn(&Field) -> bool) -> Vec<usize> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| pred(f))
        .map(|(i, _)| i)
        .collect()
}

/// Identifiers start with a letter; a leading `_` is kept for statement parameters.
fn check_identifier(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::definition(format!(
            "'{name}' is not a valid identifier"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Schema {
        Schema::new("VM")
            .field("id", FieldType::String, "pk")
            .field("name", FieldType::String, "key")
            .field("host", FieldType::String, "fk(Host +must +cascade)")
            .field("revision", FieldType::Integer, "incremented")
            .field("cpus", FieldType::Integer, "index(shape)")
            .field("memory", FieldType::Integer, "index(shape)")
            .field("disks", FieldType::Encoded, "d2")
            .field("notes", FieldType::String, "")
            .field("scratch", FieldType::String, "-")
    }

    #[test]
    fn derives_definition() {
        let def = Definition::new(&vm(), 0).unwrap();
        assert_eq!(def.kind(), "VM");
        assert_eq!(def.pk().name, "id");
        assert_eq!(def.incremented().map(|f| f.name.as_str()), Some("revision"));
        assert_eq!(def.key_fields().count(), 1);
        assert_eq!(def.foreign_keys().count(), 1);
        assert!(def.field("SCRATCH").is_none());

        let groups: Vec<_> = def.index_groups().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "shape");
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn projection_by_detail() {
        let def = Definition::new(&vm(), 1).unwrap();
        let names = |d| -> Vec<String> {
            def.projection(d).iter().map(|f| f.name.clone()).collect()
        };
        assert_eq!(names(0), vec!["id", "name"]);
        assert!(!names(1).contains(&"disks".to_string()));
        assert!(names(1).contains(&"notes".to_string()));
        assert!(names(2).contains(&"disks".to_string()));
    }

    #[test]
    fn pk_validation() {
        let none = Schema::new("A").field("x", FieldType::String, "");
        assert!(matches!(
            Definition::new(&none, 0),
            Err(StoreError::MustHavePk { .. })
        ));

        let two = Schema::new("A")
            .field("x", FieldType::String, "pk")
            .field("y", FieldType::String, "pk");
        assert!(matches!(
            Definition::new(&two, 0),
            Err(StoreError::MustHavePk { .. })
        ));

        let bool_pk = Schema::new("A").field("x", FieldType::Bool, "pk");
        assert!(matches!(
            Definition::new(&bool_pk, 0),
            Err(StoreError::PkType { .. })
        ));

        let bad_gen = Schema::new("A")
            .field("id", FieldType::String, "pk(name;size)")
            .field("name", FieldType::String, "")
            .field("size", FieldType::Integer, "");
        assert!(matches!(
            Definition::new(&bad_gen, 0),
            Err(StoreError::GenPkType { .. })
        ));

        let missing_gen = Schema::new("A").field("id", FieldType::String, "pk(nope)");
        assert!(matches!(
            Definition::new(&missing_gen, 0),
            Err(StoreError::GenPkType { .. })
        ));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(
            Definition::new(&Schema::new(""), 0),
            Err(StoreError::MustBeObject { .. })
        ));
        let only_virtual = Schema::new("A").field("row", FieldType::Integer, "virtual");
        assert!(matches!(
            Definition::new(&only_virtual, 0),
            Err(StoreError::MustBeObject { .. })
        ));
        let reserved = Schema::new("label").field("id", FieldType::String, "pk");
        assert!(Definition::new(&reserved, 0).is_err());
    }

    #[test]
    fn rejects_parameter_like_names() {
        for name in ["_pk", "_expected", "_parent", "_p0"] {
            let schema = Schema::new("A")
                .field("id", FieldType::Integer, "pk")
                .field(name, FieldType::String, "");
            assert!(
                matches!(Definition::new(&schema, 0), Err(StoreError::Definition { .. })),
                "{name}"
            );
        }
        let kind = Schema::new("_A").field("id", FieldType::Integer, "pk");
        assert!(Definition::new(&kind, 0).is_err());
        let inner = Schema::new("A")
            .field("id", FieldType::Integer, "pk")
            .field("host_name", FieldType::String, "");
        assert!(Definition::new(&inner, 0).is_ok());
    }

    #[test]
    fn generated_pk() {
        let schema = Schema::new("Disk")
            .field("id", FieldType::String, "pk(vm;file)")
            .field("vm", FieldType::String, "")
            .field("file", FieldType::String, "");
        let def = Definition::new(&schema, 0).unwrap();

        let mut row = Row::new().with("vm", "vm-1").with("file", "/a.vmdk");
        def.assign_pk(&mut row).unwrap();
        assert_eq!(row.get::<String>("id").unwrap(), "vm-1/a.vmdk");
        assert_eq!(def.pk_value(&row).unwrap(), Value::Text("vm-1/a.vmdk".into()));

        let empty = Row::new();
        assert_eq!(def.pk_value(&empty).unwrap(), Value::Text(String::new()));
    }
}
