use std::fmt;
use std::io::{Read, Write};

use dcache_types::{EntryRecord, Timestamp, TypeId, VersionStamp};

use crate::codec;
use crate::error::{StoreError, StoreResult};

/// Boxed, single-pass record sequence feeding a live snapshot.
pub type RecordStream = Box<dyn Iterator<Item = StoreResult<EntryRecord>> + Send>;

enum Records {
    /// Never given a source.
    Unset,
    /// Live sequence; `None` once it has been handed out.
    Live(Option<RecordStream>),
    /// Deserialized or caller-supplied records, replayable.
    Materialized(Vec<EntryRecord>),
}

/// The full record set of one entity type at one version.
///
/// A snapshot is either *live*, wrapping a record sequence that can be
/// enumerated exactly once, or *materialized*, holding its records in memory
/// so they can be enumerated any number of times. Snapshots read back from the
/// store are always materialized.
pub struct EntrySnapshot {
    type_id: Option<TypeId>,
    version: Timestamp,
    records: Records,
}

impl EntrySnapshot {
    /// A snapshot with no record source attached yet.
    pub fn new(type_id: Option<TypeId>, version: Timestamp) -> Self {
        Self {
            type_id,
            version,
            records: Records::Unset,
        }
    }

    /// A snapshot over a single-pass record sequence.
    pub fn live<I>(stamp: VersionStamp, records: I) -> Self
    where
        I: Iterator<Item = StoreResult<EntryRecord>> + Send + 'static,
    {
        Self {
            type_id: Some(stamp.type_id),
            version: stamp.version,
            records: Records::Live(Some(Box::new(records))),
        }
    }

    /// A replayable snapshot over records already in memory.
    pub fn materialized(type_id: Option<TypeId>, version: Timestamp, records: Vec<EntryRecord>) -> Self {
        Self {
            type_id,
            version,
            records: Records::Materialized(records),
        }
    }

    /// Attach a live record sequence, replacing any previous source.
    pub fn with_records<I>(mut self, records: I) -> Self
    where
        I: Iterator<Item = StoreResult<EntryRecord>> + Send + 'static,
    {
        self.records = Records::Live(Some(Box::new(records)));
        self
    }

    pub fn type_id(&self) -> Option<&TypeId> {
        self.type_id.as_ref()
    }

    pub fn version(&self) -> Timestamp {
        self.version
    }

    /// The (type, version) stamp, if the snapshot names its type.
    pub fn version_stamp(&self) -> Option<VersionStamp> {
        self.type_id
            .as_ref()
            .map(|t| VersionStamp::new(t.clone(), self.version))
    }

    pub fn is_replayable(&self) -> bool {
        matches!(self.records, Records::Materialized(_))
    }

    /// Enumerate the records.
    ///
    /// Fails with [`StoreError::InvalidState`] when the snapshot never had a
    /// source, or when its live sequence was already handed out.
    pub fn records(
        &mut self,
    ) -> StoreResult<Box<dyn Iterator<Item = StoreResult<EntryRecord>> + Send + '_>> {
        match &mut self.records {
            Records::Unset => Err(StoreError::InvalidState("snapshot has no record source")),
            Records::Live(stream) => match stream.take() {
                Some(stream) => Ok(stream),
                None => Err(StoreError::InvalidState("record sequence already consumed")),
            },
            Records::Materialized(records) => Ok(Box::new(records.iter().cloned().map(Ok))),
        }
    }

    /// Consume the snapshot into an owned record sequence.
    pub fn into_records(self) -> StoreResult<RecordStream> {
        match self.records {
            Records::Unset => Err(StoreError::InvalidState("snapshot has no record source")),
            Records::Live(Some(stream)) => Ok(stream),
            Records::Live(None) => Err(StoreError::InvalidState("record sequence already consumed")),
            Records::Materialized(records) => Ok(Box::new(records.into_iter().map(Ok))),
        }
    }

    /// Serialize the snapshot. A live snapshot makes exactly one pass over its
    /// records and cannot be serialized or enumerated again afterwards.
    pub fn write_to<W: Write>(&mut self, mut writer: W) -> StoreResult<u64> {
        codec::write_header(&mut writer, self.type_id.as_ref(), self.version)?;
        let records = self.records()?;
        let count = codec::write_records(&mut writer, records)?;
        writer.flush()?;
        Ok(count)
    }

    /// Deserialize a snapshot into a materialized one.
    pub fn read_from<R: Read>(mut reader: R) -> StoreResult<Self> {
        let header = codec::read_header(&mut reader)?;
        let records = codec::read_records(&mut reader)?;
        Ok(Self::materialized(header.type_id, header.version, records))
    }
}

impl fmt::Debug for EntrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records = match &self.records {
            Records::Unset => "unset".to_string(),
            Records::Live(Some(_)) => "live".to_string(),
            Records::Live(None) => "drained".to_string(),
            Records::Materialized(r) => format!("{} materialized", r.len()),
        };
        f.debug_struct("EntrySnapshot")
            .field("type_id", &self.type_id)
            .field("version", &self.version)
            .field("records", &records)
            .finish()
    }
}
