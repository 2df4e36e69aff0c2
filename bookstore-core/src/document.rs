// src/document.rs
use serde::{Deserialize, Serialize};

/// Supported `_id` shapes. Auto-assigned ids are integers; callers may
/// supply their own string ids (ISBNs, slugs).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    String(String),
}

impl DocumentId {
    /// Next auto-increment id after `last_id`.
    pub fn new_auto(last_id: u64) -> Self {
        DocumentId::Int((last_id + 1) as i64)
    }
}
