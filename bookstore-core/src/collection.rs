// src/collection.rs
// Collection handles: CRUD, queries, aggregation, and index management

use crate::aggregation::Pipeline;
use crate::document::DocumentId;
use crate::error::{BookstoreError, Result};
use crate::filter::Filter;
use crate::find_options::FindOptions;
use crate::index::{IndexKey, IndexManager, IndexSpec};
use crate::query_planner::{ExecStats, QueryPlan, QueryPlanner};
use crate::storage::{StorageEngine, COLLECTION_FIELD, TOMBSTONE_FIELD};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of an update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Outcome of a delete operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

pub struct Collection {
    name: String,
    storage: Arc<RwLock<StorageEngine>>,
    indexes: Arc<RwLock<IndexManager>>,
}

impl Collection {
    /// Open a handle, rebuilding in-memory indexes from the persisted
    /// specs and the live document set.
    pub(crate) fn open(name: &str, storage: Arc<RwLock<StorageEngine>>) -> Result<Self> {
        let mut manager = IndexManager::new();
        {
            let mut engine = storage.write();
            let specs = engine.meta(name)?.indexes.clone();
            for spec in specs {
                manager.create(spec)?;
            }
            for doc in load_live(&mut engine, name)? {
                let id = doc_id(&doc)?;
                manager.insert_document(&id, &doc)?;
            }
        }

        Ok(Collection {
            name: name.to_string(),
            storage,
            indexes: Arc::new(RwLock::new(manager)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- writes ----

    /// Insert one document. Missing `_id` gets the next auto id.
    pub fn insert_one(&self, mut doc: Value) -> Result<DocumentId> {
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| BookstoreError::InvalidQuery("document must be an object".into()))?;
        if obj.contains_key(COLLECTION_FIELD) || obj.contains_key(TOMBSTONE_FIELD) {
            return Err(BookstoreError::InvalidQuery(
                "document uses a reserved field name".into(),
            ));
        }

        let mut engine = self.storage.write();
        let id = match obj.get("_id") {
            Some(id) => serde_json::from_value(id.clone())?,
            None => {
                let meta = engine.meta(&self.name)?;
                let id = DocumentId::new_auto(meta.last_id);
                obj.insert("_id".to_string(), json!(id));
                id
            }
        };

        let mut indexes = self.indexes.write();

        // Duplicate _id is checked up front. Letting the _id_ index
        // catch it would make the rollback below strip the existing
        // document's entry, since both inserts share the same id.
        if let Some(id_index) = indexes.get("_id_") {
            let key = IndexKey::from_value(doc.get("_id"));
            let (existing, _) = id_index.scan_eq(&key);
            if !existing.is_empty() {
                return Err(BookstoreError::IndexError(format!(
                    "Duplicate _id: {}",
                    doc["_id"]
                )));
            }
        }

        // Secondary index inserts happen before the append so unique
        // violations abort cleanly
        if let Err(e) = indexes.insert_document(&id, &doc) {
            indexes.remove_document(&id, &doc);
            return Err(e);
        }

        let mut record = doc.clone();
        record
            .as_object_mut()
            .unwrap()
            .insert(COLLECTION_FIELD.to_string(), json!(self.name));
        engine.append(&record)?;

        let meta = engine.meta_mut(&self.name)?;
        meta.document_count += 1;
        if let DocumentId::Int(n) = id {
            if n > 0 && n as u64 > meta.last_id {
                meta.last_id = n as u64;
            }
        }
        Ok(id)
    }

    pub fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<DocumentId>> {
        docs.into_iter().map(|doc| self.insert_one(doc)).collect()
    }

    /// Update the first document matching `filter` with `$set`/`$inc`/
    /// `$unset` operators.
    pub fn update_one(&self, filter: &Value, update: &Value) -> Result<UpdateResult> {
        self.update_documents(filter, update, true)
    }

    pub fn update_many(&self, filter: &Value, update: &Value) -> Result<UpdateResult> {
        self.update_documents(filter, update, false)
    }

    fn update_documents(&self, filter: &Value, update: &Value, single: bool) -> Result<UpdateResult> {
        let parsed = Filter::parse(filter)?;
        let mut engine = self.storage.write();
        let mut indexes = self.indexes.write();

        let mut matched = 0u64;
        let mut modified = 0u64;
        for doc in load_live(&mut engine, &self.name)? {
            if !parsed.matches(&doc) {
                continue;
            }
            matched += 1;

            let mut updated = doc.clone();
            if apply_update_operators(&mut updated, update)? {
                let id = doc_id(&doc)?;
                indexes.remove_document(&id, &doc);
                if let Err(e) = indexes.insert_document(&id, &updated) {
                    // Restore the old keys before surfacing the error
                    indexes.remove_document(&id, &updated);
                    indexes.insert_document(&id, &doc)?;
                    return Err(e);
                }

                let mut record = updated;
                record
                    .as_object_mut()
                    .unwrap()
                    .insert(COLLECTION_FIELD.to_string(), json!(self.name));
                engine.append(&record)?;
                modified += 1;
            }

            if single {
                break;
            }
        }

        Ok(UpdateResult {
            matched_count: matched,
            modified_count: modified,
        })
    }

    /// Delete the first document matching `filter`.
    pub fn delete_one(&self, filter: &Value) -> Result<DeleteResult> {
        self.delete_documents(filter, true)
    }

    pub fn delete_many(&self, filter: &Value) -> Result<DeleteResult> {
        self.delete_documents(filter, false)
    }

    fn delete_documents(&self, filter: &Value, single: bool) -> Result<DeleteResult> {
        let parsed = Filter::parse(filter)?;
        let mut engine = self.storage.write();
        let mut indexes = self.indexes.write();

        let mut deleted = 0u64;
        for doc in load_live(&mut engine, &self.name)? {
            if !parsed.matches(&doc) {
                continue;
            }

            let id = doc_id(&doc)?;
            indexes.remove_document(&id, &doc);
            engine.append(&json!({
                "_id": doc["_id"],
                COLLECTION_FIELD: self.name,
                TOMBSTONE_FIELD: true,
            }))?;
            deleted += 1;

            if single {
                break;
            }
        }

        let meta = engine.meta_mut(&self.name)?;
        meta.document_count = meta.document_count.saturating_sub(deleted);
        Ok(DeleteResult {
            deleted_count: deleted,
        })
    }

    // ---- reads ----

    pub fn find(&self, filter: &Value) -> Result<Vec<Value>> {
        self.find_with_options(filter, &FindOptions::new())
    }

    pub fn find_with_options(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        let (docs, _, _) = self.run_query(filter)?;
        Ok(options.apply(docs))
    }

    pub fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
        let docs = self.find_with_options(filter, &FindOptions::new().limit(1))?;
        Ok(docs.into_iter().next())
    }

    pub fn count_documents(&self, filter: &Value) -> Result<u64> {
        let (docs, _, _) = self.run_query(filter)?;
        Ok(docs.len() as u64)
    }

    /// Distinct values of `field` among matching documents, sorted by
    /// their JSON rendering.
    pub fn distinct(&self, field: &str, filter: &Value) -> Result<Vec<Value>> {
        let (docs, _, _) = self.run_query(filter)?;
        let mut values: Vec<Value> = Vec::new();
        for doc in &docs {
            if let Some(v) = doc.get(field) {
                if !values.contains(v) {
                    values.push(v.clone());
                }
            }
        }
        values.sort_by_key(|v| v.to_string());
        Ok(values)
    }

    pub fn aggregate(&self, stages: &[Value]) -> Result<Vec<Value>> {
        let pipeline = Pipeline::parse(stages)?;
        let docs = {
            let mut engine = self.storage.write();
            load_live(&mut engine, &self.name)?
        };
        pipeline.execute(docs)
    }

    /// Mongo-like explain("executionStats") for a find on `filter`:
    /// runs the query and reports the winning plan with its counters.
    pub fn explain(&self, filter: &Value) -> Result<Value> {
        let (_, plan, stats) = self.run_query(filter)?;
        Ok(QueryPlanner::explain(&plan, &self.indexes.read(), &stats))
    }

    /// Plan, fetch, and residually filter. The residual filter always
    /// runs, so an index that covers only part of the predicate still
    /// yields correct results.
    fn run_query(&self, filter: &Value) -> Result<(Vec<Value>, QueryPlan, ExecStats)> {
        let parsed = Filter::parse(filter)?;
        let mut engine = self.storage.write();
        let indexes = self.indexes.read();
        let plan = QueryPlanner::plan(filter, &indexes);

        let mut stats = ExecStats::default();
        let candidates = match &plan {
            QueryPlan::CollScan => {
                let docs = load_live(&mut engine, &self.name)?;
                stats.total_docs_examined = docs.len() as u64;
                docs
            }
            QueryPlan::IxScan { index, key } => {
                let ix = indexes
                    .get(index)
                    .ok_or_else(|| BookstoreError::IndexError(format!("Missing index {}", index)))?;
                let (ids, keys_examined) = if let IndexKey::Compound(prefix) = key {
                    ix.scan_prefix(prefix)
                } else {
                    ix.scan_eq(key)
                };
                stats.total_keys_examined = keys_examined;
                let docs = fetch_by_ids(&mut engine, &self.name, &ids)?;
                stats.total_docs_examined = docs.len() as u64;
                docs
            }
            QueryPlan::IxRangeScan {
                index,
                start,
                end,
                inclusive_start,
                inclusive_end,
            } => {
                let ix = indexes
                    .get(index)
                    .ok_or_else(|| BookstoreError::IndexError(format!("Missing index {}", index)))?;
                let (ids, keys_examined) =
                    ix.scan_range(start.as_ref(), end.as_ref(), *inclusive_start, *inclusive_end);
                stats.total_keys_examined = keys_examined;
                let docs = fetch_by_ids(&mut engine, &self.name, &ids)?;
                stats.total_docs_examined = docs.len() as u64;
                docs
            }
        };

        let results: Vec<Value> = candidates
            .into_iter()
            .filter(|doc| parsed.matches(doc))
            .collect();
        stats.n_returned = results.len() as u64;
        Ok((results, plan, stats))
    }

    // ---- indexes ----

    /// Create an index and backfill it from the live documents.
    /// Returns the index name. Recreating an identical index is a
    /// no-op, matching createIndex semantics.
    pub fn create_index(&self, keys: &[(&str, i32)], unique: bool) -> Result<String> {
        let spec = IndexSpec::new(keys, unique);
        let name = spec.name.clone();

        let mut engine = self.storage.write();
        let mut indexes = self.indexes.write();
        if indexes.contains(&name) {
            return Ok(name);
        }

        indexes.create(spec.clone())?;
        let backfill: Result<()> = (|| {
            for doc in load_live(&mut engine, &self.name)? {
                let id = doc_id(&doc)?;
                indexes.insert_document_into(&name, &id, &doc)?;
            }
            Ok(())
        })();
        if let Err(e) = backfill {
            // A failed backfill must not leave a half-built index live
            indexes.drop_index(&name)?;
            return Err(e);
        }

        engine.meta_mut(&self.name)?.indexes.push(spec);
        engine.flush_metadata()?;
        Ok(name)
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        let mut engine = self.storage.write();
        let mut indexes = self.indexes.write();
        indexes.drop_index(name)?;
        engine
            .meta_mut(&self.name)?
            .indexes
            .retain(|spec| spec.name != name);
        engine.flush_metadata()
    }

    /// getIndexes-style listing: `_id_` first, then by name.
    pub fn list_indexes(&self) -> Vec<Value> {
        self.indexes
            .read()
            .specs()
            .iter()
            .map(|spec| {
                let mut entry = Map::new();
                entry.insert("v".to_string(), json!(2));
                entry.insert("key".to_string(), spec.key_pattern());
                entry.insert("name".to_string(), json!(spec.name));
                if spec.unique && spec.name != "_id_" {
                    entry.insert("unique".to_string(), json!(true));
                }
                Value::Object(entry)
            })
            .collect()
    }
}

/// Replay the collection's records into its live document set:
/// last record per `_id` wins, tombstones drop the document, and the
/// original insertion order is kept.
fn load_live(engine: &mut StorageEngine, name: &str) -> Result<Vec<Value>> {
    let records = engine.scan_collection(name)?;
    let mut order: Vec<String> = Vec::new();
    let mut live: HashMap<String, Option<Value>> = HashMap::new();

    for mut record in records {
        let Some(obj) = record.as_object_mut() else {
            continue;
        };
        let key = match obj.get("_id") {
            Some(id) => id.to_string(),
            None => continue,
        };
        obj.remove(COLLECTION_FIELD);
        let tombstone = obj
            .get(TOMBSTONE_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if !live.contains_key(&key) {
            order.push(key.clone());
        }
        live.insert(key, if tombstone { None } else { Some(record) });
    }

    Ok(order
        .into_iter()
        .filter_map(|key| live.remove(&key).flatten())
        .collect())
}

fn fetch_by_ids(engine: &mut StorageEngine, name: &str, ids: &[DocumentId]) -> Result<Vec<Value>> {
    let live = load_live(engine, name)?;
    let mut by_id: HashMap<String, Value> = live
        .into_iter()
        .map(|doc| (doc["_id"].to_string(), doc))
        .collect();

    let mut docs = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(doc) = by_id.remove(&json!(id).to_string()) {
            docs.push(doc);
        }
    }
    Ok(docs)
}

fn doc_id(doc: &Value) -> Result<DocumentId> {
    let id = doc
        .get("_id")
        .ok_or_else(|| BookstoreError::Corruption("Stored document missing _id".into()))?;
    Ok(serde_json::from_value(id.clone())?)
}

/// Apply `$set`/`$inc`/`$unset` operators to `doc` in place.
/// Returns whether anything changed. `_id` is immutable.
fn apply_update_operators(doc: &mut Value, update: &Value) -> Result<bool> {
    let ops = update
        .as_object()
        .ok_or_else(|| BookstoreError::InvalidUpdate("update must be an object".into()))?;
    if ops.keys().any(|k| !k.starts_with('$')) {
        return Err(BookstoreError::InvalidUpdate(
            "Replacement documents are not supported; use update operators".into(),
        ));
    }

    let mut modified = false;
    for (op, fields) in ops {
        let fields = fields.as_object().ok_or_else(|| {
            BookstoreError::InvalidUpdate(format!("{} requires an object", op))
        })?;

        for (field, value) in fields {
            if field == "_id" {
                return Err(BookstoreError::InvalidUpdate("Cannot modify _id".into()));
            }
            let obj = doc.as_object_mut().unwrap();

            match op.as_str() {
                "$set" => {
                    if obj.get(field) != Some(value) {
                        obj.insert(field.clone(), value.clone());
                        modified = true;
                    }
                }
                "$inc" => {
                    let delta = value.as_f64().ok_or_else(|| {
                        BookstoreError::InvalidUpdate("$inc requires a number".into())
                    })?;
                    let current = obj.get(field).and_then(Value::as_f64).unwrap_or(0.0);
                    let next = current + delta;
                    let next = if next.fract() == 0.0
                        && obj.get(field).map_or(true, |v| v.as_i64().is_some())
                        && value.as_i64().is_some()
                    {
                        json!(next as i64)
                    } else {
                        json!(next)
                    };
                    obj.insert(field.clone(), next);
                    modified = true;
                }
                "$unset" => {
                    if obj.remove(field).is_some() {
                        modified = true;
                    }
                }
                other => {
                    return Err(BookstoreError::InvalidUpdate(format!(
                        "Unknown update operator: {}",
                        other
                    )))
                }
            }
        }
    }
    Ok(modified)
}
