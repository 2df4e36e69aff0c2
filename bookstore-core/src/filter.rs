// src/filter.rs
// MongoDB-style filter documents: parsing and matching

use crate::error::{BookstoreError, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// A parsed filter document. Matches against full JSON documents
/// (including `_id`), so it works on stored documents and on
/// intermediate aggregation results alike.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    /// `{ "field": <condition> }`
    Field { field: String, cond: Condition },
    /// `{ "$and": [...] }` and friends
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Not(Box<Condition>),
    /// Several operators on one field, e.g. `{"$gte": a, "$lt": b}`
    AllOf(Vec<Condition>),
}

impl Filter {
    /// Parse a filter from its JSON form. `{}` matches everything.
    pub fn parse(json: &Value) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| BookstoreError::InvalidQuery("filter must be an object".into()))?;

        let mut clauses = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            if key.starts_with('$') {
                clauses.push(Self::parse_logical(key, value)?);
            } else {
                clauses.push(Clause::Field {
                    field: key.clone(),
                    cond: Condition::parse(value)?,
                });
            }
        }

        Ok(Filter { clauses })
    }

    fn parse_logical(op: &str, value: &Value) -> Result<Clause> {
        let arr = value.as_array().ok_or_else(|| {
            BookstoreError::InvalidQuery(format!("{} requires an array of filters", op))
        })?;
        let filters = arr.iter().map(Filter::parse).collect::<Result<Vec<_>>>()?;

        match op {
            "$and" => Ok(Clause::And(filters)),
            "$or" => Ok(Clause::Or(filters)),
            "$nor" => Ok(Clause::Nor(filters)),
            _ => Err(BookstoreError::InvalidQuery(format!(
                "Unknown logical operator: {}",
                op
            ))),
        }
    }

    /// Does `doc` (a JSON object) satisfy every clause?
    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl Clause {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Clause::Field { field, cond } => cond.matches(doc.get(field.as_str())),
            Clause::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Clause::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Clause::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
        }
    }
}

impl Condition {
    fn parse(value: &Value) -> Result<Self> {
        let obj = match value {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
            // Bare value, including object literals without operators
            other => return Ok(Condition::Eq(other.clone())),
        };

        let mut conds = Vec::with_capacity(obj.len());
        for (op, val) in obj {
            conds.push(Self::parse_operator(op, val)?);
        }

        if conds.len() == 1 {
            Ok(conds.pop().unwrap())
        } else {
            Ok(Condition::AllOf(conds))
        }
    }

    fn parse_operator(op: &str, val: &Value) -> Result<Self> {
        match op {
            "$eq" => Ok(Condition::Eq(val.clone())),
            "$ne" => Ok(Condition::Ne(val.clone())),
            "$gt" => Ok(Condition::Gt(val.clone())),
            "$gte" => Ok(Condition::Gte(val.clone())),
            "$lt" => Ok(Condition::Lt(val.clone())),
            "$lte" => Ok(Condition::Lte(val.clone())),
            "$in" => match val {
                Value::Array(arr) => Ok(Condition::In(arr.clone())),
                _ => Err(BookstoreError::InvalidQuery("$in requires an array".into())),
            },
            "$nin" => match val {
                Value::Array(arr) => Ok(Condition::Nin(arr.clone())),
                _ => Err(BookstoreError::InvalidQuery("$nin requires an array".into())),
            },
            "$exists" => match val {
                Value::Bool(b) => Ok(Condition::Exists(*b)),
                _ => Err(BookstoreError::InvalidQuery("$exists requires a bool".into())),
            },
            "$not" => Ok(Condition::Not(Box::new(Self::parse(val)?))),
            _ => Err(BookstoreError::InvalidQuery(format!(
                "Unknown operator: {}",
                op
            ))),
        }
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Eq(target) => value.is_some_and(|v| v == target),
            Condition::Ne(target) => value.map_or(true, |v| v != target),
            Condition::Gt(target) => {
                value.is_some_and(|v| compare_values(v, target) == Some(Ordering::Greater))
            }
            Condition::Gte(target) => value.is_some_and(|v| {
                matches!(
                    compare_values(v, target),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            }),
            Condition::Lt(target) => {
                value.is_some_and(|v| compare_values(v, target) == Some(Ordering::Less))
            }
            Condition::Lte(target) => value.is_some_and(|v| {
                matches!(
                    compare_values(v, target),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }),
            Condition::In(targets) => value.is_some_and(|v| targets.contains(v)),
            Condition::Nin(targets) => value.map_or(true, |v| !targets.contains(v)),
            Condition::Exists(should_exist) => value.is_some() == *should_exist,
            Condition::Not(inner) => !inner.matches(value),
            Condition::AllOf(conds) => conds.iter().all(|c| c.matches(value)),
        }
    }
}

/// Same-type comparison; cross-type comparisons never order.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            let f1 = n1.as_f64()?;
            let f2 = n2.as_f64()?;
            f1.partial_cmp(&f2)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book(title: &str, genre: &str, year: i64, price: f64, in_stock: bool) -> Value {
        json!({
            "_id": 1,
            "title": title,
            "genre": genre,
            "published_year": year,
            "price": price,
            "in_stock": in_stock,
        })
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::parse(&json!({})).unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
    }

    #[test]
    fn test_implicit_equality() {
        let filter = Filter::parse(&json!({"genre": "Fiction"})).unwrap();
        assert!(filter.matches(&book("The Alchemist", "Fiction", 1988, 10.99, true)));
        assert!(!filter.matches(&book("The Hobbit", "Fantasy", 1937, 14.99, true)));
    }

    #[test]
    fn test_gt_on_year() {
        let filter = Filter::parse(&json!({"published_year": {"$gt": 2010}})).unwrap();
        assert!(filter.matches(&book("The Martian", "Science Fiction", 2014, 15.99, true)));
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
        // Boundary is exclusive
        assert!(!filter.matches(&book("On the edge", "Fiction", 2010, 9.99, true)));
    }

    #[test]
    fn test_range_with_two_operators() {
        let filter =
            Filter::parse(&json!({"price": {"$gte": 10.0, "$lt": 15.0}})).unwrap();
        assert!(filter.matches(&book("A", "Fiction", 2000, 10.0, true)));
        assert!(filter.matches(&book("B", "Fiction", 2000, 14.99, true)));
        assert!(!filter.matches(&book("C", "Fiction", 2000, 15.0, true)));
        assert!(!filter.matches(&book("D", "Fiction", 2000, 9.99, true)));
    }

    #[test]
    fn test_combined_fields_are_conjunctive() {
        let filter = Filter::parse(&json!({
            "in_stock": true,
            "published_year": {"$gt": 2010}
        }))
        .unwrap();

        assert!(filter.matches(&book("The Martian", "Science Fiction", 2014, 15.99, true)));
        assert!(!filter.matches(&book("The Martian", "Science Fiction", 2014, 15.99, false)));
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
    }

    #[test]
    fn test_in_and_nin() {
        let filter = Filter::parse(&json!({"genre": {"$in": ["Fiction", "Fantasy"]}})).unwrap();
        assert!(filter.matches(&book("The Hobbit", "Fantasy", 1937, 14.99, true)));
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));

        let filter = Filter::parse(&json!({"genre": {"$nin": ["Dystopian"]}})).unwrap();
        assert!(filter.matches(&book("The Hobbit", "Fantasy", 1937, 14.99, true)));
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
    }

    #[test]
    fn test_or_and_nor() {
        let filter = Filter::parse(&json!({
            "$or": [
                {"price": {"$lt": 10.0}},
                {"genre": "Fantasy"}
            ]
        }))
        .unwrap();
        assert!(filter.matches(&book("Moby Dick", "Fiction", 1851, 9.99, false)));
        assert!(filter.matches(&book("The Hobbit", "Fantasy", 1937, 14.99, true)));
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));

        let filter = Filter::parse(&json!({
            "$nor": [{"genre": "Fiction"}, {"genre": "Fantasy"}]
        }))
        .unwrap();
        assert!(filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
        assert!(!filter.matches(&book("The Hobbit", "Fantasy", 1937, 14.99, true)));
    }

    #[test]
    fn test_and_with_nested_or() {
        let filter = Filter::parse(&json!({
            "$and": [
                {"$or": [{"genre": "Fiction"}, {"genre": "Fantasy"}]},
                {"in_stock": true}
            ]
        }))
        .unwrap();
        assert!(filter.matches(&book("The Hobbit", "Fantasy", 1937, 14.99, true)));
        assert!(!filter.matches(&book("Moby Dick", "Fiction", 1851, 9.99, false)));
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
    }

    #[test]
    fn test_exists() {
        let filter = Filter::parse(&json!({"isbn": {"$exists": true}})).unwrap();
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));

        let filter = Filter::parse(&json!({"isbn": {"$exists": false}})).unwrap();
        assert!(filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
    }

    #[test]
    fn test_field_level_not() {
        let filter = Filter::parse(&json!({"price": {"$not": {"$gt": 12.0}}})).unwrap();
        assert!(filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
        assert!(!filter.matches(&book("The Hobbit", "Fantasy", 1937, 14.99, true)));
        // Missing field: $gt fails, so $not matches
        assert!(filter.matches(&json!({"_id": 1, "title": "No price"})));
    }

    #[test]
    fn test_missing_field_semantics() {
        let eq = Filter::parse(&json!({"genre": "Fiction"})).unwrap();
        assert!(!eq.matches(&json!({"_id": 1, "title": "No genre"})));

        let ne = Filter::parse(&json!({"genre": {"$ne": "Fiction"}})).unwrap();
        assert!(ne.matches(&json!({"_id": 1, "title": "No genre"})));
    }

    #[test]
    fn test_cross_type_comparison_never_matches() {
        let filter = Filter::parse(&json!({"price": {"$gt": "10"}})).unwrap();
        assert!(!filter.matches(&book("1984", "Dystopian", 1949, 10.99, true)));
    }

    #[test]
    fn test_string_ordering() {
        let filter = Filter::parse(&json!({"title": {"$gte": "M"}})).unwrap();
        assert!(filter.matches(&book("Moby Dick", "Fiction", 1851, 9.99, false)));
        assert!(!filter.matches(&book("Animal Farm", "Fiction", 1945, 8.50, false)));
    }

    #[test]
    fn test_invalid_operator_rejected() {
        assert!(Filter::parse(&json!({"price": {"$near": 1}})).is_err());
        assert!(Filter::parse(&json!({"$xor": []})).is_err());
        assert!(Filter::parse(&json!({"$and": "not-an-array"})).is_err());
        assert!(Filter::parse(&json!("not-an-object")).is_err());
    }
}
