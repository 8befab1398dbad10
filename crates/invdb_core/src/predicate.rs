//! Predicate trees and list options.
//!
//! Predicates are built against a [`Definition`] into a SQL expression plus
//! numbered parameters. Field names resolve case-insensitively.

use crate::error::{StoreError, StoreResult};
use crate::model::{Definition, FieldType, MAX_DETAIL};
use crate::row::Labels;
use crate::sql::{column, ident, LABEL_TABLE};
use crate::value::Value;

/// Reference to another column of the same kind, compared column to column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef(pub String);

impl FieldRef {
    /// Creates a field reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Single value.
    Value(Value),
    /// Set of values (`IN`).
    List(Vec<Value>),
    /// Another column.
    Field(FieldRef),
}

macro_rules! impl_operand_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Self::Value(Value::from(v))
                }
            }

            impl From<Vec<$t>> for Operand {
                fn from(v: Vec<$t>) -> Self {
                    Self::List(v.into_iter().map(Value::from).collect())
                }
            }
        )*
    };
}

impl_operand_from!(i8, i16, i32, i64, u8, u16, u32, bool, String, &str);

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<Vec<Value>> for Operand {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<FieldRef> for Operand {
    fn from(f: FieldRef) -> Self {
        Self::Field(f)
    }
}

/// A predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equal (or `IN` for a list).
    Eq(String, Operand),
    /// Not equal (or `NOT IN` for a list).
    Neq(String, Operand),
    /// Greater than.
    Gt(String, Operand),
    /// Less than.
    Lt(String, Operand),
    /// Row carries every label.
    Match(Labels),
    /// Every child holds.
    And(Vec<Predicate>),
    /// Any child holds.
    Or(Vec<Predicate>),
}

/// `field = value`.
pub fn eq(field: impl Into<String>, value: impl Into<Operand>) -> Predicate {
    Predicate::Eq(field.into(), value.into())
}

/// `field != value`.
pub fn neq(field: impl Into<String>, value: impl Into<Operand>) -> Predicate {
    Predicate::Neq(field.into(), value.into())
}

/// `field > value`.
pub fn gt(field: impl Into<String>, value: impl Into<Operand>) -> Predicate {
    Predicate::Gt(field.into(), value.into())
}

/// `field < value`.
pub fn lt(field: impl Into<String>, value: impl Into<Operand>) -> Predicate {
    Predicate::Lt(field.into(), value.into())
}

/// Rows carrying all of `labels`.
pub fn matches(labels: Labels) -> Predicate {
    Predicate::Match(labels)
}

/// Conjunction.
pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::And(predicates.into_iter().collect())
}

/// Disjunction.
pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Or(predicates.into_iter().collect())
}

/// Build context: the target definition and the statement's parameters.
pub struct Filter<'a> {
    def: &'a Definition,
    params: &'a mut Vec<(String, Value)>,
}

impl<'a> Filter<'a> {
    /// Binds predicates for `def`, appending parameters to `params`.
    pub fn new(def: &'a Definition, params: &'a mut Vec<(String, Value)>) -> Self {
        Self { def, params }
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!(":_p{}", self.params.len());
        self.params.push((name.clone(), value));
        name
    }
}

impl Predicate {
    /// Renders the predicate into a SQL expression.
    pub fn build(&self, filter: &mut Filter<'_>) -> StoreResult<String> {
        match self {
            Self::Eq(field, operand) => compare(filter, field, operand, Op::Eq),
            Self::Neq(field, operand) => compare(filter, field, operand, Op::Neq),
            Self::Gt(field, operand) => compare(filter, field, operand, Op::Gt),
            Self::Lt(field, operand) => compare(filter, field, operand, Op::Lt),
            Self::Match(labels) => label_match(filter, labels),
            Self::And(children) => join(filter, children, " AND ", "1"),
            Self::Or(children) => join(filter, children, " OR ", "0"),
        }
    }
}

#[derive(Clone, Copy)]
enum Op {
    Eq,
    Neq,
    Gt,
    Lt,
}

impl Op {
    const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }

    const fn ordered(self) -> bool {
        matches!(self, Self::Gt | Self::Lt)
    }
}

fn compare(filter: &mut Filter<'_>, name: &str, operand: &Operand, op: Op) -> StoreResult<String> {
    let def = filter.def;
    let field = def.field(name).ok_or_else(|| StoreError::PredicateRef {
        kind: def.kind().to_string(),
        field: name.to_string(),
    })?;
    if field.ty == FieldType::Encoded {
        return Err(StoreError::field_type(
            &field.name,
            "encoded fields cannot be compared",
        ));
    }
    if op.ordered() && !field.ty.is_ordered() {
        return Err(StoreError::PredicateType {
            field: field.name.clone(),
            operator: op.sql(),
        });
    }

    let lhs = column(field);
    match operand {
        Operand::Value(value) => {
            let value = field.as_value(value)?;
            let p = filter.bind(value);
            Ok(format!("{lhs} {} {p}", op.sql()))
        }
        Operand::List(values) => {
            let negate = match op {
                Op::Eq => false,
                Op::Neq => true,
                Op::Gt | Op::Lt => {
                    return Err(StoreError::predicate_value(
                        &field.name,
                        "a list cannot be ordered",
                    ))
                }
            };
            if values.is_empty() {
                return Ok(if negate { "1" } else { "0" }.to_string());
            }
            let mut names = Vec::with_capacity(values.len());
            for value in values {
                let value = field.as_value(value)?;
                names.push(filter.bind(value));
            }
            let not = if negate { "NOT " } else { "" };
            Ok(format!("{lhs} {not}IN ({})", names.join(", ")))
        }
        Operand::Field(FieldRef(other)) => {
            let rhs = def.field(other).ok_or_else(|| StoreError::PredicateRef {
                kind: def.kind().to_string(),
                field: other.clone(),
            })?;
            if op.ordered() && !rhs.ty.is_ordered() {
                return Err(StoreError::PredicateType {
                    field: rhs.name.clone(),
                    operator: op.sql(),
                });
            }
            Ok(format!("{lhs} {} {}", op.sql(), column(rhs)))
        }
    }
}

fn label_match(filter: &mut Filter<'_>, labels: &Labels) -> StoreResult<String> {
    if labels.is_empty() {
        return Ok("1".to_string());
    }
    let def = filter.def;
    let table = ident(LABEL_TABLE);
    let mut selects = Vec::with_capacity(labels.len());
    for (name, value) in labels {
        let kind = filter.bind(Value::from(def.kind()));
        let name = filter.bind(Value::from(name));
        let value = filter.bind(Value::from(value));
        selects.push(format!(
            "SELECT {table}.\"parent\" FROM {table} WHERE {table}.\"kind\" = {kind} \
             AND {table}.\"name\" = {name} AND {table}.\"value\" = {value}"
        ));
    }
    let pk = def.pk();
    let lhs = match pk.ty {
        FieldType::String => column(pk),
        _ => format!("CAST({} AS TEXT)", column(pk)),
    };
    Ok(format!("{lhs} IN ({})", selects.join(" INTERSECT ")))
}

fn join(
    filter: &mut Filter<'_>,
    children: &[Predicate],
    separator: &str,
    empty: &str,
) -> StoreResult<String> {
    if children.is_empty() {
        return Ok(empty.to_string());
    }
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        parts.push(format!("({})", child.build(filter)?));
    }
    Ok(parts.join(separator))
}

/// A page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows skipped.
    pub offset: usize,
    /// Maximum rows returned.
    pub limit: usize,
}

/// Options for `list`, `find` and `count`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Filter; `None` matches every row.
    pub predicate: Option<Predicate>,
    /// Projection detail; `None` projects detail 0.
    pub detail: Option<u8>,
    /// Zero-based indices into the projected columns.
    pub sort: Vec<usize>,
    /// Page; `None` returns all rows.
    pub page: Option<Page>,
}

impl ListOptions {
    /// Options matching every row at detail 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the predicate.
    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Sets the projection detail.
    #[must_use]
    pub fn detail(mut self, detail: u8) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Sets the sort ordinals.
    #[must_use]
    pub fn sort(mut self, sort: impl IntoIterator<Item = usize>) -> Self {
        self.sort = sort.into_iter().collect();
        self
    }

    /// Sets the page.
    #[must_use]
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.page = Some(Page { offset, limit });
        self
    }

    /// Detail level after validation.
    pub(crate) fn resolved_detail(&self) -> StoreResult<u8> {
        match self.detail {
            None => Ok(0),
            Some(d) if d <= MAX_DETAIL => Ok(d),
            Some(d) => Err(StoreError::DetailOutOfRange {
                detail: u32::from(d),
            }),
        }
    }
}
