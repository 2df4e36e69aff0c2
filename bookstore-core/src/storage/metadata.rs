// src/storage/metadata.rs
// File header and per-collection metadata, persisted in a fixed
// reserved region at the front of the database file

use crate::error::{BookstoreError, Result};
use crate::index::IndexSpec;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use uuid::Uuid;

pub const MAGIC: [u8; 8] = *b"BOOKSTOR";
pub const VERSION: u32 = 1;

/// Bytes reserved for the header at offset 0.
pub const HEADER_RESERVED: u64 = 64;
/// Bytes reserved for collection metadata after the header.
pub const METADATA_RESERVED: u64 = 64 * 1024;
/// First byte of the append-only data region.
pub const DATA_START_OFFSET: u64 = HEADER_RESERVED + METADATA_RESERVED;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub magic: [u8; 8],
    pub version: u32,
    /// Random instance id assigned when the file is formatted.
    pub db_id: [u8; 16],
    pub collection_count: u32,
}

impl Header {
    pub fn new() -> Self {
        Header {
            magic: MAGIC,
            version: VERSION,
            db_id: *Uuid::new_v4().as_bytes(),
            collection_count: 0,
        }
    }

    pub fn database_id(&self) -> Uuid {
        Uuid::from_bytes(self.db_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(BookstoreError::Corruption(
                "Bad magic bytes; not a bookstore database file".into(),
            ));
        }
        if self.version != VERSION {
            return Err(BookstoreError::Corruption(format!(
                "Unsupported file version {}",
                self.version
            )));
        }
        Ok(())
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything we persist about one collection. Index entries are not
/// stored; they are rebuilt from these specs on open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    pub document_count: u64,
    pub last_id: u64,
    pub indexes: Vec<IndexSpec>,
}

impl CollectionMeta {
    pub fn new(name: &str) -> Self {
        CollectionMeta {
            name: name.to_string(),
            document_count: 0,
            last_id: 0,
            indexes: vec![IndexSpec::id_index()],
        }
    }
}

pub fn write_header(file: &mut File, header: &Header) -> Result<()> {
    let bytes =
        bincode::serialize(header).map_err(|e| BookstoreError::Serialization(e.to_string()))?;
    debug_assert!(bytes.len() as u64 <= HEADER_RESERVED);
    // Write the whole reserved region so readers can read_exact it
    let mut region = vec![0u8; HEADER_RESERVED as usize];
    region[..bytes.len()].copy_from_slice(&bytes);
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&region)?;
    Ok(())
}

pub fn read_header(file: &mut File) -> Result<Header> {
    let mut bytes = vec![0u8; HEADER_RESERVED as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut bytes)?;
    let header: Header = bincode::deserialize(&bytes)
        .map_err(|e| BookstoreError::Corruption(format!("Unreadable header: {}", e)))?;
    header.validate()?;
    Ok(header)
}

pub fn write_metadata(file: &mut File, collections: &[CollectionMeta]) -> Result<()> {
    let bytes = bincode::serialize(&collections.to_vec())
        .map_err(|e| BookstoreError::Serialization(e.to_string()))?;
    if bytes.len() as u64 > METADATA_RESERVED {
        return Err(BookstoreError::Serialization(
            "Collection metadata exceeds the reserved region".into(),
        ));
    }
    let mut region = vec![0u8; METADATA_RESERVED as usize];
    region[..bytes.len()].copy_from_slice(&bytes);
    file.seek(SeekFrom::Start(HEADER_RESERVED))?;
    file.write_all(&region)?;
    Ok(())
}

pub fn read_metadata(file: &mut File, count: u32) -> Result<Vec<CollectionMeta>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut bytes = vec![0u8; METADATA_RESERVED as usize];
    file.seek(SeekFrom::Start(HEADER_RESERVED))?;
    file.read_exact(&mut bytes)?;
    let collections: Vec<CollectionMeta> = bincode::deserialize(&bytes)
        .map_err(|e| BookstoreError::Corruption(format!("Unreadable metadata: {}", e)))?;
    if collections.len() != count as usize {
        return Err(BookstoreError::Corruption(format!(
            "Header claims {} collections, metadata has {}",
            count,
            collections.len()
        )));
    }
    Ok(collections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scratch_file() -> (tempfile::TempDir, File) {
        let dir = tempdir().unwrap();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.path().join("meta.db"))
            .unwrap();
        (dir, file)
    }

    #[test]
    fn test_header_roundtrip() {
        let (_dir, mut file) = scratch_file();
        let mut header = Header::new();
        header.collection_count = 3;

        write_header(&mut file, &header).unwrap();
        let restored = read_header(&mut file).unwrap();
        assert_eq!(restored.magic, MAGIC);
        assert_eq!(restored.version, VERSION);
        assert_eq!(restored.collection_count, 3);
        assert_eq!(restored.database_id(), header.database_id());
        assert!(!restored.database_id().is_nil());

        // Writes cover the full reserved region, so a fresh file is
        // already large enough to read back
        assert_eq!(file.metadata().unwrap().len(), HEADER_RESERVED);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let (_dir, mut file) = scratch_file();
        let mut header = Header::new();
        header.magic = *b"NOTADB!!";
        write_header(&mut file, &header).unwrap();
        assert!(read_header(&mut file).is_err());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let (_dir, mut file) = scratch_file();
        let mut meta = CollectionMeta::new("books");
        meta.document_count = 14;
        meta.last_id = 14;
        meta.indexes.push(IndexSpec::new(&[("title", 1)], false));

        write_metadata(&mut file, &[meta]).unwrap();
        let restored = read_metadata(&mut file, 1).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].name, "books");
        assert_eq!(restored[0].document_count, 14);
        let names: Vec<&str> = restored[0].indexes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["_id_", "title_1"]);
        assert_eq!(
            file.metadata().unwrap().len(),
            HEADER_RESERVED + METADATA_RESERVED
        );
    }

    #[test]
    fn test_new_collection_carries_id_index() {
        let meta = CollectionMeta::new("books");
        assert_eq!(meta.indexes.len(), 1);
        assert_eq!(meta.indexes[0].name, "_id_");
        assert!(meta.indexes[0].unique);
    }
}
