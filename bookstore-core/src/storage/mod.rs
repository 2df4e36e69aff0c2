// src/storage/mod.rs
// Single-file append-only storage engine. Layout:
//   [header | collection metadata | length-prefixed JSON records]
// Updates append a new version of the document; deletes append a
// tombstone. Readers keep only the last record per _id.

pub mod io;
pub mod metadata;

use crate::error::{BookstoreError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub use metadata::{CollectionMeta, Header, DATA_START_OFFSET};

/// Record field naming the owning collection.
pub const COLLECTION_FIELD: &str = "_collection";
/// Record field marking a deletion.
pub const TOMBSTONE_FIELD: &str = "_tombstone";

#[derive(Debug)]
pub struct StorageEngine {
    file: File,
    path: PathBuf,
    header: Header,
    collections: HashMap<String, CollectionMeta>,
    data_end: u64,
}

/// Counters reported by `stats()`.
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub path: PathBuf,
    pub database_id: String,
    pub file_size: u64,
    pub collection_count: usize,
    pub document_counts: Vec<(String, u64)>,
}

impl StorageEngine {
    /// Open a database file, creating and formatting it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        if exists && file.metadata()?.len() >= DATA_START_OFFSET {
            let header = metadata::read_header(&mut file)?;
            let metas = metadata::read_metadata(&mut file, header.collection_count)?;
            let collections = metas.into_iter().map(|m| (m.name.clone(), m)).collect();
            let data_end = file.metadata()?.len();
            Ok(StorageEngine {
                file,
                path,
                header,
                collections,
                data_end,
            })
        } else {
            let header = Header::new();
            file.set_len(DATA_START_OFFSET)?;
            metadata::write_header(&mut file, &header)?;
            Ok(StorageEngine {
                file,
                path,
                header,
                collections: HashMap::new(),
                data_end: DATA_START_OFFSET,
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create_collection(&mut self, name: &str) -> Result<()> {
        if self.collections.contains_key(name) {
            return Err(BookstoreError::CollectionExists(name.to_string()));
        }
        self.collections
            .insert(name.to_string(), CollectionMeta::new(name));
        self.header.collection_count = self.collections.len() as u32;
        self.flush_metadata()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn meta(&self, name: &str) -> Result<&CollectionMeta> {
        self.collections
            .get(name)
            .ok_or_else(|| BookstoreError::CollectionNotFound(name.to_string()))
    }

    pub fn meta_mut(&mut self, name: &str) -> Result<&mut CollectionMeta> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| BookstoreError::CollectionNotFound(name.to_string()))
    }

    /// Drop a collection's metadata. Callers tombstone its live
    /// documents first; stale records stay in the data region.
    pub fn drop_collection(&mut self, name: &str) -> Result<()> {
        self.collections
            .remove(name)
            .ok_or_else(|| BookstoreError::CollectionNotFound(name.to_string()))?;
        self.header.collection_count = self.collections.len() as u32;
        self.flush_metadata()
    }

    /// Append one record (document version or tombstone).
    pub fn append(&mut self, record: &Value) -> Result<()> {
        self.data_end = io::write_record(&mut self.file, self.data_end, record)?;
        Ok(())
    }

    /// All records of one collection, tombstones included, in write order.
    pub fn scan_collection(&mut self, name: &str) -> Result<Vec<Value>> {
        let records = io::scan_records(&mut self.file, DATA_START_OFFSET, self.data_end)?;
        Ok(records
            .into_iter()
            .filter(|r| r.get(COLLECTION_FIELD).and_then(Value::as_str) == Some(name))
            .collect())
    }

    /// Persist header and collection metadata.
    pub fn flush_metadata(&mut self) -> Result<()> {
        let mut metas: Vec<CollectionMeta> = self.collections.values().cloned().collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metadata::write_header(&mut self.file, &self.header)?;
        metadata::write_metadata(&mut self.file, &metas)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn stats(&self) -> StorageStats {
        let mut document_counts: Vec<(String, u64)> = self
            .collections
            .values()
            .map(|m| (m.name.clone(), m.document_count))
            .collect();
        document_counts.sort();
        StorageStats {
            path: self.path.clone(),
            database_id: self.header.database_id().to_string(),
            file_size: self.data_end,
            collection_count: self.collections.len(),
            document_counts,
        }
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        let _ = self.flush_metadata();
    }
}
