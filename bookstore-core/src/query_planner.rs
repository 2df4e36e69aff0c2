// src/query_planner.rs
// Picks an index for a filter and renders explain() output

use crate::index::{IndexKey, IndexManager};
use serde_json::{json, Value};

/// How a query will be executed.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Walk every live document.
    CollScan,
    /// Exact lookup in one index.
    IxScan { index: String, key: IndexKey },
    /// Bounded walk of a single-field index.
    IxRangeScan {
        index: String,
        start: Option<IndexKey>,
        end: Option<IndexKey>,
        inclusive_start: bool,
        inclusive_end: bool,
    },
}

/// Per-query counters reported in executionStats.
#[derive(Debug, Clone, Default)]
pub struct ExecStats {
    pub n_returned: u64,
    pub total_keys_examined: u64,
    pub total_docs_examined: u64,
}

pub struct QueryPlanner;

impl QueryPlanner {
    /// Choose a plan for `filter` (the raw filter document) given the
    /// collection's indexes. Only top-level equality and single-field
    /// range predicates are index-eligible; everything else falls back
    /// to a collection scan. The residual filter still runs over the
    /// fetched documents, so a partial index match stays correct.
    pub fn plan(filter: &Value, indexes: &IndexManager) -> QueryPlan {
        let Some(obj) = filter.as_object() else {
            return QueryPlan::CollScan;
        };
        if obj.is_empty() || obj.keys().any(|k| k.starts_with('$')) {
            return QueryPlan::CollScan;
        }

        for index in indexes.iter() {
            let field = index.spec.first_field();
            let Some(predicate) = obj.get(field) else {
                continue;
            };

            match predicate {
                // Bare value or {$eq: v}: point lookup
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    if let Some(eq) = ops.get("$eq") {
                        if let Some(key) = scalar_key(eq) {
                            return QueryPlan::IxScan {
                                index: index.spec.name.clone(),
                                key: wrap_for(index.spec.keys.len(), key),
                            };
                        }
                    }
                    // Ranges only on single-field indexes
                    if index.spec.keys.len() == 1 {
                        if let Some(plan) = range_plan(&index.spec.name, ops) {
                            return plan;
                        }
                    }
                }
                value => {
                    if let Some(key) = scalar_key(value) {
                        return QueryPlan::IxScan {
                            index: index.spec.name.clone(),
                            key: wrap_for(index.spec.keys.len(), key),
                        };
                    }
                }
            }
        }

        QueryPlan::CollScan
    }

    /// Mongo-like explain document for a plan plus its run counters.
    pub fn explain(plan: &QueryPlan, indexes: &IndexManager, stats: &ExecStats) -> Value {
        let winning_plan = match plan {
            QueryPlan::CollScan => json!({"stage": "COLLSCAN"}),
            QueryPlan::IxScan { index, .. } | QueryPlan::IxRangeScan { index, .. } => {
                let key_pattern = indexes
                    .get(index)
                    .map(|ix| ix.spec.key_pattern())
                    .unwrap_or(Value::Null);
                json!({
                    "stage": "FETCH",
                    "inputStage": {
                        "stage": "IXSCAN",
                        "indexName": index,
                        "keyPattern": key_pattern,
                    }
                })
            }
        };

        json!({
            "queryPlanner": {
                "winningPlan": winning_plan,
            },
            "executionStats": {
                "nReturned": stats.n_returned,
                "totalKeysExamined": stats.total_keys_examined,
                "totalDocsExamined": stats.total_docs_examined,
            }
        })
    }
}

fn scalar_key(value: &Value) -> Option<IndexKey> {
    match value {
        Value::Object(_) | Value::Array(_) => None,
        other => Some(IndexKey::from_value(Some(other))),
    }
}

/// Compound indexes store Compound keys even for a one-field lookup
/// prefix; single-field indexes use the bare key.
fn wrap_for(key_count: usize, key: IndexKey) -> IndexKey {
    if key_count > 1 {
        IndexKey::Compound(vec![key])
    } else {
        key
    }
}

fn range_plan(index_name: &str, ops: &serde_json::Map<String, Value>) -> Option<QueryPlan> {
    let mut start = None;
    let mut end = None;
    let mut inclusive_start = false;
    let mut inclusive_end = false;

    for (op, value) in ops {
        let key = scalar_key(value)?;
        match op.as_str() {
            "$gt" => {
                start = Some(key);
                inclusive_start = false;
            }
            "$gte" => {
                start = Some(key);
                inclusive_start = true;
            }
            "$lt" => {
                end = Some(key);
                inclusive_end = false;
            }
            "$lte" => {
                end = Some(key);
                inclusive_end = true;
            }
            _ => return None,
        }
    }

    if start.is_none() && end.is_none() {
        return None;
    }

    Some(QueryPlan::IxRangeScan {
        index: index_name.to_string(),
        start,
        end,
        inclusive_start,
        inclusive_end,
    })
}
