//! # Document Store Vocabulary
//!
//! Collections, the filter language used by `find`/`count`/`update_many`,
//! and the single-document patch language applied atomically by adapters.
//!
//! Evaluation lives here (`Filter::matches`, `Patch::apply`, `compare_values`)
//! so every adapter agrees on the semantics: the in-memory store evaluates
//! directly, the Postgres store applies patches under a row lock.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Questions,
    Answers,
    Comments,
    Votes,
    Notifications,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Users,
        Collection::Questions,
        Collection::Answers,
        Collection::Comments,
        Collection::Votes,
        Collection::Notifications,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Questions => "questions",
            Self::Answers => "answers",
            Self::Comments => "comments",
            Self::Votes => "votes",
            Self::Notifications => "notifications",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed entity stored in one collection, keyed by its `id` field.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;
    /// Lowercase entity name used in `NotFound` errors.
    const ENTITY: &'static str;
    fn id(&self) -> Uuid;
}

/// One predicate over a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    /// The field is an array containing the value
    ArrayContains(String, Value),
    /// Case-insensitive substring match on a string field
    TextContains(String, String),
}

impl Condition {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::Eq(field, expected) => field_of(doc, field) == expected,
            Self::Ne(field, expected) => field_of(doc, field) != expected,
            Self::In(field, options) => options.contains(field_of(doc, field)),
            Self::ArrayContains(field, item) => field_of(doc, field)
                .as_array()
                .is_some_and(|items| items.contains(item)),
            Self::TextContains(field, needle) => field_of(doc, field)
                .as_str()
                .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
        }
    }
}

fn field_of<'a>(doc: &'a Value, field: &str) -> &'a Value {
    doc.get(field).unwrap_or(&Value::Null)
}

/// Conjunction of conditions. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.into(), value.into()));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne(field.into(), value.into()));
        self
    }

    pub fn one_of(mut self, field: &str, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In(field.into(), values));
        self
    }

    pub fn contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::ArrayContains(field.into(), value.into()));
        self
    }

    pub fn text(mut self, field: &str, needle: &str) -> Self {
        self.conditions
            .push(Condition::TextContains(field.into(), needle.into()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

/// Shorthand for `Value::String(id.to_string())`, the stored form of ids.
pub fn id_value(id: Uuid) -> Value {
    Value::String(id.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Pagination and ordering for `find`. Sort keys apply in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: usize,
    pub limit: Option<usize>,
    pub sort: Vec<Sort>,
}

impl FindOptions {
    pub fn sorted(sort: Sort) -> Self {
        Self {
            sort: vec![sort],
            ..Self::default()
        }
    }

    pub fn then(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }

    /// Orders two documents by the configured sort keys.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.sort {
            let ord = compare_values(field_of(a, &key.field), field_of(b, &key.field));
            let ord = match key.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Total order over JSON scalars: null < bool < number < string.
/// Strings that both parse as RFC 3339 timestamps compare chronologically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    Set(String, Value),
    /// Append to an array field unless already present
    AddToSet(String, Value),
    /// Remove every occurrence from an array field
    Pull(String, Value),
}

/// Field-level mutation applied to a single document as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp::Set(field.into(), value.into()));
        self
    }

    pub fn add_to_set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp::AddToSet(field.into(), value.into()));
        self
    }

    pub fn pull(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp::Pull(field.into(), value.into()));
        self
    }

    /// Stamps `updatedAt` with the given instant.
    pub fn touch(self, now: DateTime<Utc>) -> Self {
        self.set("updatedAt", now.to_rfc3339())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every op in order. Non-object documents are left untouched;
    /// array ops on a missing or non-array field start from an empty array.
    pub fn apply(&self, doc: &mut Value) {
        let Some(fields) = doc.as_object_mut() else {
            return;
        };
        for op in &self.ops {
            match op {
                PatchOp::Set(field, value) => {
                    fields.insert(field.clone(), value.clone());
                }
                PatchOp::AddToSet(field, value) => {
                    let items = array_field(fields, field);
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
                PatchOp::Pull(field, value) => {
                    array_field(fields, field).retain(|item| item != value);
                }
            }
        }
    }
}

fn array_field<'a>(fields: &'a mut Map<String, Value>, field: &str) -> &'a mut Vec<Value> {
    let slot = fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}

/// Keys at most one document of a collection may hold at a time: user email
/// and username (case-insensitive), and the accepted answer of a question.
/// Adapters reject an insert or patch that would give a second document one
/// of these keys with `AppError::Conflict`.
pub fn unique_keys(collection: Collection, doc: &Value) -> Vec<String> {
    let text = |field: &str| doc.get(field).and_then(Value::as_str);
    match collection {
        Collection::Users => ["email", "username"]
            .into_iter()
            .filter_map(|field| text(field).map(|v| format!("{field}:{}", v.to_lowercase())))
            .collect(),
        Collection::Answers if doc.get("isAccepted") == Some(&Value::Bool(true)) => text("questionId")
            .map(|question| vec![format!("accepted:{question}")])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
