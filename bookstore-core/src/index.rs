// src/index.rs
// In-memory secondary indexes with ordered keys

use crate::document::DocumentId;
use crate::error::{BookstoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Orderable index key extracted from a document field.
/// Compound sorts last so single-field ranges stay contiguous.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat),
    String(String),
    Compound(Vec<IndexKey>),
}

/// f64 wrapper with total ordering; NaN sorts after everything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedFloat(pub f64);

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.0.partial_cmp(&other.0) {
            Some(ord) => ord,
            None => {
                if self.0.is_nan() && other.0.is_nan() {
                    Ordering::Equal
                } else if self.0.is_nan() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
        }
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        use IndexKey::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.cmp(b),
            // Ints and floats interleave numerically
            (Int(a), Float(b)) => OrderedFloat(*a as f64).cmp(b),
            (Float(a), Int(b)) => a.cmp(&OrderedFloat(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            (Compound(a), Compound(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl IndexKey {
    fn type_rank(&self) -> u8 {
        match self {
            IndexKey::Null => 0,
            IndexKey::Bool(_) => 1,
            IndexKey::Int(_) => 2,
            IndexKey::Float(_) => 2,
            IndexKey::String(_) => 3,
            IndexKey::Compound(_) => 4,
        }
    }

    /// Key for one field value; missing fields index as Null.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => IndexKey::Null,
            Some(Value::Bool(b)) => IndexKey::Bool(*b),
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    IndexKey::Int(i)
                } else {
                    IndexKey::Float(OrderedFloat(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Some(Value::String(s)) => IndexKey::String(s.clone()),
            // Arrays and objects are not indexable; treat as Null
            Some(_) => IndexKey::Null,
        }
    }
}

/// Persisted description of an index. Entries are rebuilt on open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    /// Ordered (field, direction) pairs; 1 ascending, -1 descending.
    pub keys: Vec<(String, i32)>,
    pub unique: bool,
}

impl IndexSpec {
    /// Mongo-style name: `title_1`, `author_1_published_year_-1`.
    pub fn new(keys: &[(&str, i32)], unique: bool) -> Self {
        let name = keys
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, dir))
            .collect::<Vec<_>>()
            .join("_");
        IndexSpec {
            name,
            keys: keys.iter().map(|(f, d)| (f.to_string(), *d)).collect(),
            unique,
        }
    }

    pub fn id_index() -> Self {
        IndexSpec {
            name: "_id_".to_string(),
            keys: vec![("_id".to_string(), 1)],
            unique: true,
        }
    }

    pub fn first_field(&self) -> &str {
        &self.keys[0].0
    }

    /// The key pattern as a JSON object, for listIndexes and explain.
    pub fn key_pattern(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (field, dir) in &self.keys {
            map.insert(field.clone(), Value::from(*dir));
        }
        Value::Object(map)
    }
}

/// One live index: spec plus ordered entries.
#[derive(Debug)]
pub struct Index {
    pub spec: IndexSpec,
    entries: BTreeMap<IndexKey, Vec<DocumentId>>,
}

impl Index {
    pub fn new(spec: IndexSpec) -> Self {
        Index {
            spec,
            entries: BTreeMap::new(),
        }
    }

    /// Extract this index's key from a document value.
    /// Single-field indexes use the bare key; compound wrap in order.
    pub fn extract_key(&self, doc: &Value) -> IndexKey {
        if self.spec.keys.len() == 1 {
            IndexKey::from_value(doc.get(self.spec.first_field()))
        } else {
            IndexKey::Compound(
                self.spec
                    .keys
                    .iter()
                    .map(|(field, _)| IndexKey::from_value(doc.get(field.as_str())))
                    .collect(),
            )
        }
    }

    /// Insert an entry. A unique index rejects any insert into an
    /// occupied key, including a repeat of the same document id;
    /// callers that re-key a document remove the old entry first.
    pub fn insert(&mut self, key: IndexKey, id: DocumentId) -> Result<()> {
        let ids = self.entries.entry(key).or_default();
        if self.spec.unique && !ids.is_empty() {
            return Err(BookstoreError::IndexError(format!(
                "Duplicate key violates unique index '{}'",
                self.spec.name
            )));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &IndexKey, id: &DocumentId) {
        if let Some(ids) = self.entries.get_mut(key) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Exact-match lookup. Returns how many keys were examined too.
    pub fn scan_eq(&self, key: &IndexKey) -> (Vec<DocumentId>, u64) {
        match self.entries.get(key) {
            Some(ids) => (ids.clone(), 1),
            None => (Vec::new(), 0),
        }
    }

    /// Range scan over single-field keys. Bounds of `None` are open.
    pub fn scan_range(
        &self,
        start: Option<&IndexKey>,
        end: Option<&IndexKey>,
        inclusive_start: bool,
        inclusive_end: bool,
    ) -> (Vec<DocumentId>, u64) {
        use std::ops::Bound;

        let lower = match start {
            Some(k) if inclusive_start => Bound::Included(k),
            Some(k) => Bound::Excluded(k),
            None => Bound::Unbounded,
        };
        let upper = match end {
            Some(k) if inclusive_end => Bound::Included(k),
            Some(k) => Bound::Excluded(k),
            None => Bound::Unbounded,
        };

        let mut ids = Vec::new();
        let mut keys_examined = 0u64;
        for (_, entry_ids) in self.entries.range::<IndexKey, _>((lower, upper)) {
            keys_examined += 1;
            ids.extend(entry_ids.iter().cloned());
        }
        (ids, keys_examined)
    }

    /// Compound-index lookup on a prefix of the key fields.
    pub fn scan_prefix(&self, prefix: &[IndexKey]) -> (Vec<DocumentId>, u64) {
        let start = IndexKey::Compound(prefix.to_vec());
        let mut ids = Vec::new();
        let mut keys_examined = 0u64;
        for (key, entry_ids) in self.entries.range(start..) {
            let IndexKey::Compound(parts) = key else { break };
            if parts.len() < prefix.len() || &parts[..prefix.len()] != prefix {
                break;
            }
            keys_examined += 1;
            ids.extend(entry_ids.iter().cloned());
        }
        (ids, keys_examined)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All indexes of one collection, by name.
#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: HashMap<String, Index>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, spec: IndexSpec) -> Result<()> {
        if self.indexes.contains_key(&spec.name) {
            return Err(BookstoreError::IndexError(format!(
                "Index '{}' already exists",
                spec.name
            )));
        }
        self.indexes.insert(spec.name.clone(), Index::new(spec));
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        if name == "_id_" {
            return Err(BookstoreError::IndexError(
                "Cannot drop the _id index".into(),
            ));
        }
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BookstoreError::IndexError(format!("Index '{}' not found", name)))
    }

    pub fn get(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Insert `doc` into every index.
    pub fn insert_document(&mut self, id: &DocumentId, doc: &Value) -> Result<()> {
        for index in self.indexes.values_mut() {
            let key = index.extract_key(doc);
            index.insert(key, id.clone())?;
        }
        Ok(())
    }

    /// Insert `doc` into one index only, used when backfilling a
    /// freshly created index.
    pub fn insert_document_into(&mut self, name: &str, id: &DocumentId, doc: &Value) -> Result<()> {
        let index = self
            .indexes
            .get_mut(name)
            .ok_or_else(|| BookstoreError::IndexError(format!("Index '{}' not found", name)))?;
        let key = index.extract_key(doc);
        index.insert(key, id.clone())
    }

    /// Remove `doc` from every index.
    pub fn remove_document(&mut self, id: &DocumentId, doc: &Value) {
        for index in self.indexes.values_mut() {
            let key = index.extract_key(doc);
            index.remove(&key, id);
        }
    }

    /// Specs sorted with `_id_` first, the rest by name.
    pub fn specs(&self) -> Vec<&IndexSpec> {
        let mut specs: Vec<&IndexSpec> = self.indexes.values().map(|i| &i.spec).collect();
        specs.sort_by(|a, b| match (a.name.as_str(), b.name.as_str()) {
            ("_id_", _) => Ordering::Less,
            (_, "_id_") => Ordering::Greater,
            (x, y) => x.cmp(y),
        });
        specs
    }

    pub fn iter(&self) -> impl Iterator<Item = &Index> {
        self.indexes.values()
    }
}
