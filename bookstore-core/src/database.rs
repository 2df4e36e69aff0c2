// src/database.rs
// Top-level handle: one file, many collections

use crate::collection::Collection;
use crate::error::Result;
use crate::storage::{StorageEngine, StorageStats};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// An open database. Collection handles are cached so every caller
/// shares one set of in-memory indexes per collection.
pub struct Database {
    storage: Arc<RwLock<StorageEngine>>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let storage = StorageEngine::open(path)?;
        Ok(Database {
            storage: Arc::new(RwLock::new(storage)),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Get a collection handle, creating the collection on first use.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        if let Some(handle) = self.collections.read().get(name) {
            return Ok(Arc::clone(handle));
        }

        {
            let mut engine = self.storage.write();
            if !engine.has_collection(name) {
                engine.create_collection(name)?;
            }
        }

        let handle = Arc::new(Collection::open(name, Arc::clone(&self.storage))?);
        let mut cache = self.collections.write();
        // Another caller may have raced us here
        Ok(Arc::clone(
            cache.entry(name.to_string()).or_insert(handle),
        ))
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.storage.read().collection_names()
    }

    /// Drop a collection. Live documents are tombstoned first so a
    /// recreated collection of the same name starts empty.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let handle = self.collection(name)?;
        handle.delete_many(&serde_json::json!({}))?;
        self.collections.write().remove(name);
        self.storage.write().drop_collection(name)
    }

    /// Persist all metadata now instead of waiting for drop.
    pub fn flush(&self) -> Result<()> {
        self.storage.write().flush_metadata()
    }

    pub fn stats(&self) -> StorageStats {
        self.storage.read().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_collection_created_on_first_use() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("store.db")).unwrap();

        assert!(db.list_collections().is_empty());
        db.collection("books").unwrap();
        assert_eq!(db.list_collections(), vec!["books"]);
    }

    #[test]
    fn test_handles_are_shared() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("store.db")).unwrap();

        let a = db.collection("books").unwrap();
        let b = db.collection("books").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_drop_collection_removes_handle() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("store.db")).unwrap();

        let books = db.collection("books").unwrap();
        books.insert_one(json!({"title": "1984"})).unwrap();
        db.drop_collection("books").unwrap();
        assert!(db.list_collections().is_empty());

        // A fresh handle starts empty
        let books = db.collection("books").unwrap();
        assert_eq!(books.count_documents(&json!({})).unwrap(), 0);
    }

    #[test]
    fn test_reopen_preserves_documents_and_indexes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let db = Database::open(&path).unwrap();
            let books = db.collection("books").unwrap();
            books
                .insert_one(json!({"title": "1984", "author": "George Orwell"}))
                .unwrap();
            books.create_index(&[("title", 1)], false).unwrap();
            db.flush().unwrap();
        }

        let db = Database::open(&path).unwrap();
        let books = db.collection("books").unwrap();
        assert_eq!(books.count_documents(&json!({})).unwrap(), 1);

        let names: Vec<String> = books
            .list_indexes()
            .iter()
            .map(|ix| ix["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["_id_", "title_1"]);

        // The rebuilt index is live, not just listed
        let explain = books.explain(&json!({"title": "1984"})).unwrap();
        assert_eq!(
            explain["queryPlanner"]["winningPlan"]["inputStage"]["stage"],
            "IXSCAN"
        );
    }
}
