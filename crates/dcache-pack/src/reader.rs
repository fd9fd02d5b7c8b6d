use std::fmt;
use std::io::{self, BufReader, Cursor, Read};

use dcache_types::VersionStamp;
use tracing::debug;

use crate::error::{PackError, PackResult};
use crate::varint::read_varint;
use crate::writer::{END_MARKER, MAGIC, SECTION_MARKER, VERSION};

/// Largest section header accepted, as a guard against corrupt lengths.
const MAX_HEADER_LEN: u64 = 64 * 1024;

type Source = Box<dyn Read + Send>;

/// One archive section: its stamp and a stream over the decompressed payload.
///
/// The payload is decoded as it is read and is bounded by the section's
/// terminator. Whatever the caller leaves unread is skipped when the next
/// section is requested.
pub struct ArchiveSection<'a> {
    pub stamp: VersionStamp,
    payload: zstd::Decoder<'static, BufReader<ChunkReader<'a>>>,
}

impl Read for ArchiveSection<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.payload.read(buf)
    }
}

impl fmt::Debug for ArchiveSection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveSection")
            .field("stamp", &self.stamp)
            .finish_non_exhaustive()
    }
}

/// Read view over a serialized archive.
///
/// The archive is consumed once, in stream order, through [`entries`](Self::entries).
pub struct SnapshotArchive {
    source: Source,
}

impl SnapshotArchive {
    pub fn from_reader(source: impl Read + Send + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Single-pass cursor over the sections. The preamble is checked on the
    /// first step; any structural error is returned once and ends the
    /// enumeration.
    pub fn entries(self) -> ArchiveEntries {
        ArchiveEntries {
            source: self.source,
            chunks: ChunkState::default(),
            index: 0,
            started: false,
            open: false,
            done: false,
        }
    }
}

impl fmt::Debug for SnapshotArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotArchive").finish_non_exhaustive()
    }
}

/// Cursor over the sections of a [`SnapshotArchive`].
///
/// Each [`next_section`](Self::next_section) lends a reader over one
/// section's payload, so at most one section is open at a time and no
/// payload is buffered whole.
pub struct ArchiveEntries {
    source: Source,
    chunks: ChunkState,
    /// Number of sections opened so far.
    index: u64,
    started: bool,
    /// A section was lent out and its payload may be partly unread.
    open: bool,
    done: bool,
}

impl ArchiveEntries {
    /// The next section, or `None` after the end marker or an error.
    pub fn next_section(&mut self) -> Option<PackResult<ArchiveSection<'_>>> {
        if self.done {
            return None;
        }
        let stamp = match self.advance() {
            Ok(Some(stamp)) => stamp,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let index = self.index - 1;
        let chunks = ChunkReader {
            inner: &mut self.source,
            state: &mut self.chunks,
        };
        match zstd::Decoder::new(chunks) {
            Ok(payload) => Some(Ok(ArchiveSection { stamp, payload })),
            Err(e) => {
                self.done = true;
                Some(Err(PackError::CorruptSection {
                    index,
                    reason: format!("payload: {e}"),
                }))
            }
        }
    }

    /// Stamps of the remaining sections, skipping their payloads.
    pub fn stamps(mut self) -> PackResult<Vec<VersionStamp>> {
        let mut stamps = Vec::new();
        while let Some(section) = self.next_section() {
            stamps.push(section?.stamp);
        }
        Ok(stamps)
    }

    fn advance(&mut self) -> PackResult<Option<VersionStamp>> {
        if !self.started {
            self.started = true;
            self.read_preamble()?;
        }
        if self.open {
            self.open = false;
            self.skip_payload()?;
        }
        let stamp = self.read_header()?;
        if stamp.is_some() {
            self.open = true;
            self.chunks = ChunkState::default();
            self.index += 1;
        }
        Ok(stamp)
    }

    fn read_preamble(&mut self) -> PackResult<()> {
        let mut magic = [0u8; 4];
        self.source.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&magic).into(),
            });
        }
        let mut version = [0u8; 4];
        self.source.read_exact(&mut version)?;
        let version = u32::from_be_bytes(version);
        if version != VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        Ok(())
    }

    /// Step past whatever the caller left of the open section.
    fn skip_payload(&mut self) -> PackResult<()> {
        let index = self.index - 1;
        let mut rest = ChunkReader {
            inner: &mut self.source,
            state: &mut self.chunks,
        };
        let skipped = io::copy(&mut rest, &mut io::sink()).map_err(|e| PackError::CorruptSection {
            index,
            reason: format!("payload: {e}"),
        })?;
        if skipped > 0 {
            debug!(section = index, bytes = skipped, "skipped unread section payload");
        }
        Ok(())
    }

    /// Read the next section header, or `None` at the end marker.
    fn read_header(&mut self) -> PackResult<Option<VersionStamp>> {
        let index = self.index;
        let corrupt = |reason: String| PackError::CorruptSection { index, reason };

        let mut marker = [0u8; 1];
        self.source
            .read_exact(&mut marker)
            .map_err(|e| corrupt(format!("missing section marker: {e}")))?;
        match marker[0] {
            END_MARKER => return Ok(None),
            SECTION_MARKER => {}
            other => return Err(corrupt(format!("unknown marker {other:#04x}"))),
        }

        let header_len = read_varint(&mut self.source).map_err(|e| corrupt(e.to_string()))?;
        if header_len > MAX_HEADER_LEN {
            return Err(corrupt(format!("header length {header_len} too large")));
        }
        let mut header = vec![0u8; header_len as usize];
        self.source
            .read_exact(&mut header)
            .map_err(|e| corrupt(format!("truncated header: {e}")))?;
        let mut crc = [0u8; 4];
        self.source
            .read_exact(&mut crc)
            .map_err(|e| corrupt(format!("truncated header checksum: {e}")))?;
        if crc32fast::hash(&header) != u32::from_be_bytes(crc) {
            return Err(PackError::CrcMismatch { index });
        }
        let stamp: VersionStamp =
            bincode::deserialize(&header).map_err(|e| corrupt(e.to_string()))?;
        debug!(section = index, type_id = %stamp.type_id, version = %stamp.version, "read archive section header");
        Ok(Some(stamp))
    }
}

/// Position inside the chunk sequence of the open section.
#[derive(Default)]
struct ChunkState {
    remaining: usize,
    finished: bool,
}

/// Reads the payload of one section, ending at the zero-length chunk.
struct ChunkReader<'a> {
    inner: &'a mut Source,
    state: &'a mut ChunkState,
}

impl Read for ChunkReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state.finished || buf.is_empty() {
            return Ok(0);
        }
        if self.state.remaining == 0 {
            let mut len = [0u8; 4];
            self.inner.read_exact(&mut len)?;
            self.state.remaining = u32::from_be_bytes(len) as usize;
            if self.state.remaining == 0 {
                self.state.finished = true;
                return Ok(0);
            }
        }
        let want = self.state.remaining.min(buf.len());
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive chunk truncated",
            ));
        }
        self.state.remaining -= n;
        Ok(n)
    }
}
