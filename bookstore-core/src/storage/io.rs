// src/storage/io.rs
// Length-prefixed JSON records in the append-only data region

use crate::error::{BookstoreError, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// Append one record at `offset`. Returns the offset just past it.
pub fn write_record(file: &mut File, offset: u64, value: &Value) -> Result<u64> {
    let bytes = serde_json::to_vec(value)?;
    let len = bytes.len() as u32;

    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&len.to_le_bytes())?;
    file.write_all(&bytes)?;
    Ok(offset + 4 + bytes.len() as u64)
}

/// Read the record at `offset`. Returns the value and the next offset.
pub fn read_record(file: &mut File, offset: u64) -> Result<(Value, u64)> {
    let mut len_bytes = [0u8; 4];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let mut bytes = vec![0u8; len];
    file.read_exact(&mut bytes)?;
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| BookstoreError::Corruption(format!("Bad record at {}: {}", offset, e)))?;
    Ok((value, offset + 4 + len as u64))
}

/// Walk every record in `[start, end)` in write order.
pub fn scan_records(file: &mut File, start: u64, end: u64) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    let mut offset = start;
    while offset < end {
        let (value, next) = read_record(file, offset)?;
        records.push(value);
        offset = next;
    }
    Ok(records)
}
