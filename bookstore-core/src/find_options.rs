// src/find_options.rs
// Projection, sort, and pagination for find()

use crate::error::{BookstoreError, Result};
use crate::filter::compare_values;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Options applied after filtering: sort first, then skip/limit,
/// then projection.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Vec<(String, i32)>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

/// A projection is either an include list or an exclude list.
/// `_id` is included by default and may be suppressed in include mode.
#[derive(Debug, Clone)]
pub enum Projection {
    Include { fields: Vec<String>, id: bool },
    Exclude { fields: Vec<String> },
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a projection document like `{"title": 1, "author": 1, "_id": 0}`.
    pub fn projection(mut self, spec: &Value) -> Result<Self> {
        self.projection = Some(Projection::parse(spec)?);
        Ok(self)
    }

    /// Sort spec as ordered (field, direction) pairs; 1 ascending, -1 descending.
    pub fn sort(mut self, keys: &[(&str, i32)]) -> Self {
        self.sort = Some(
            keys.iter()
                .map(|(field, dir)| (field.to_string(), *dir))
                .collect(),
        );
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    /// Apply sort, pagination, and projection to a result set, in that order.
    pub fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some(keys) = &self.sort {
            sort_documents(&mut docs, keys);
        }

        let skip = self.skip.unwrap_or(0);
        let docs: Vec<Value> = if skip > 0 {
            docs.into_iter().skip(skip).collect()
        } else {
            docs
        };
        let docs: Vec<Value> = match self.limit {
            Some(n) => docs.into_iter().take(n).collect(),
            None => docs,
        };

        match &self.projection {
            Some(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
            None => docs,
        }
    }
}

impl Projection {
    pub fn parse(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| BookstoreError::InvalidQuery("projection must be an object".into()))?;

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut id = true;

        for (field, value) in obj {
            let on = match value {
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                Value::Bool(b) => *b,
                _ => {
                    return Err(BookstoreError::InvalidQuery(format!(
                        "Invalid projection value for '{}'",
                        field
                    )))
                }
            };

            if field == "_id" {
                id = on;
            } else if on {
                include.push(field.clone());
            } else {
                exclude.push(field.clone());
            }
        }

        // Mongo forbids mixing inclusion and exclusion outside _id
        if !include.is_empty() && !exclude.is_empty() {
            return Err(BookstoreError::InvalidQuery(
                "Cannot mix including and excluding fields in a projection".into(),
            ));
        }

        if include.is_empty() && !exclude.is_empty() {
            Ok(Projection::Exclude { fields: exclude })
        } else {
            Ok(Projection::Include {
                fields: include,
                id,
            })
        }
    }

    pub fn apply(&self, doc: &Value) -> Value {
        let Some(obj) = doc.as_object() else {
            return doc.clone();
        };

        match self {
            Projection::Include { fields, id } => {
                let mut out = Map::new();
                if *id {
                    if let Some(v) = obj.get("_id") {
                        out.insert("_id".to_string(), v.clone());
                    }
                }
                for field in fields {
                    if let Some(v) = obj.get(field) {
                        out.insert(field.clone(), v.clone());
                    }
                }
                Value::Object(out)
            }
            Projection::Exclude { fields } => {
                let mut out = obj.clone();
                for field in fields {
                    out.remove(field);
                }
                Value::Object(out)
            }
        }
    }
}

/// Stable multi-key sort. Missing values and cross-type pairs order
/// by type rank so the result is deterministic: null < number < string
/// < bool < object < array.
pub(crate) fn sort_documents(docs: &mut [Value], keys: &[(String, i32)]) {
    docs.sort_by(|a, b| {
        for (field, dir) in keys {
            let va = a.get(field.as_str());
            let vb = b.get(field.as_str());
            let ord = compare_for_sort(va, vb);
            if ord != Ordering::Equal {
                return if *dir < 0 { ord.reverse() } else { ord };
            }
        }
        Ordering::Equal
    });
}

fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(va), Some(vb)) => compare_values(va, vb).unwrap_or_else(|| {
            type_priority(va).cmp(&type_priority(vb))
        }),
    }
}

fn type_priority(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
    }
}
