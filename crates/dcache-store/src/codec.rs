//! Binary layout of a serialized entry snapshot.
//!
//! ```text
//! [has_type: u8][type_id: bincode]?        present when has_type == 1
//! [version: bincode Timestamp]
//! [has_records: u8]
//! [descriptor: bincode]?                   present when has_records == 1
//! ([1u8][values: bincode Vec<FieldValue>])*
//! [0u8]                                    end of records
//! ```
//!
//! A snapshot with no records writes `has_records = 0` and nothing after it.
//! The record descriptor is captured from the first record; every later
//! record must carry an equal descriptor.

use std::io::{Read, Write};
use std::sync::Arc;

use bincode::Options;
use dcache_types::{EntryRecord, FieldValue, RecordDescriptor, Timestamp, TypeId};

use crate::error::{StoreError, StoreResult};

const PRESENT: u8 = 1;
const ABSENT: u8 = 0;

/// Upper bound on the encoded size of any one decoded value. A length prefix
/// claiming more is rejected before anything is allocated.
pub const MAX_FRAME_BYTES: u64 = 16 * 1024 * 1024;

/// Decoded header of a snapshot: type identity and data version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub type_id: Option<TypeId>,
    pub version: Timestamp,
}

/// Write the snapshot header.
pub fn write_header<W: Write>(
    mut writer: W,
    type_id: Option<&TypeId>,
    version: Timestamp,
) -> StoreResult<()> {
    match type_id {
        Some(type_id) => {
            writer.write_all(&[PRESENT])?;
            bincode::serialize_into(&mut writer, type_id)?;
        }
        None => writer.write_all(&[ABSENT])?,
    }
    bincode::serialize_into(&mut writer, &version)?;
    Ok(())
}

/// Read a snapshot header, leaving the reader positioned at the record section.
pub fn read_header<R: Read>(mut reader: R) -> StoreResult<SnapshotHeader> {
    let type_id = match read_flag(&mut reader)? {
        true => Some(decode::<TypeId, _>(&mut reader)?),
        false => None,
    };
    let version: Timestamp = decode(&mut reader)?;
    Ok(SnapshotHeader { type_id, version })
}

/// Stream `records` into `writer` in a single pass. Returns the number written.
pub fn write_records<W, I>(mut writer: W, records: I) -> StoreResult<u64>
where
    W: Write,
    I: IntoIterator<Item = StoreResult<EntryRecord>>,
{
    let mut descriptor: Option<Arc<RecordDescriptor>> = None;
    let mut count = 0u64;

    for record in records {
        let record = record?;
        match &descriptor {
            None => {
                writer.write_all(&[PRESENT])?;
                bincode::serialize_into(&mut writer, record.descriptor().as_ref())?;
                descriptor = Some(Arc::clone(record.descriptor()));
            }
            Some(first) => {
                if !Arc::ptr_eq(first, record.descriptor()) && first != record.descriptor() {
                    return Err(StoreError::InconsistentDescriptor { index: count });
                }
            }
        }
        writer.write_all(&[PRESENT])?;
        bincode::serialize_into(&mut writer, record.values())?;
        count += 1;
    }

    // Doubles as `has_records = 0` when nothing was written.
    writer.write_all(&[ABSENT])?;
    Ok(count)
}

/// Read the record section into memory.
pub fn read_records<R: Read>(mut reader: R) -> StoreResult<Vec<EntryRecord>> {
    if !read_flag(&mut reader)? {
        return Ok(Vec::new());
    }
    let descriptor: RecordDescriptor = decode(&mut reader)?;
    let descriptor = Arc::new(descriptor);

    let mut records = Vec::new();
    while read_flag(&mut reader)? {
        let values: Vec<FieldValue> = decode(&mut reader)?;
        let record = EntryRecord::new(Arc::clone(&descriptor), values)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

/// Decode one value with the same layout `bincode::serialize_into` writes,
/// bounded by [`MAX_FRAME_BYTES`].
fn decode<T, R>(reader: R) -> StoreResult<T>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    let value = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_FRAME_BYTES)
        .deserialize_from(reader)?;
    Ok(value)
}

fn read_flag<R: Read>(reader: &mut R) -> StoreResult<bool> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    match byte[0] {
        PRESENT => Ok(true),
        ABSENT => Ok(false),
        other => Err(StoreError::Corrupt(format!("invalid marker byte {other:#04x}"))),
    }
}
