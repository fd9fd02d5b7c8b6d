use std::io::{self, Read, Write};

use dcache_types::VersionStamp;
use tracing::debug;

use crate::config::ArchiveConfig;
use crate::error::{PackError, PackResult};
use crate::varint::encode_varint;

pub(crate) const MAGIC: &[u8; 4] = b"DCLA";
pub(crate) const VERSION: u32 = 1;
pub(crate) const SECTION_MARKER: u8 = 1;
pub(crate) const END_MARKER: u8 = 0;

/// Sequential archive writer.
///
/// Layout:
///
/// ```text
/// "DCLA" | version: u32 BE
/// section* : 0x01 | varint header_len | header (bincode VersionStamp) | crc32(header): u32 BE
///            | chunk* (u32 BE len | zstd bytes) | 0u32
/// 0x00
/// ```
///
/// Section payloads are compressed on the fly and emitted in chunks of at
/// most [`ArchiveConfig::chunk_size`] bytes, so no section is held in memory.
pub struct ArchiveWriter<W: Write> {
    inner: W,
    config: ArchiveConfig,
    sections: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Write the archive preamble and return a writer ready for sections.
    pub fn new(mut inner: W, config: ArchiveConfig) -> PackResult<Self> {
        inner.write_all(MAGIC)?;
        inner.write_all(&VERSION.to_be_bytes())?;
        Ok(Self {
            inner,
            config,
            sections: 0,
        })
    }

    /// Append one section holding the bytes read from `data`. Returns the
    /// number of compressed payload bytes written.
    pub fn add_section<R: Read>(&mut self, stamp: &VersionStamp, mut data: R) -> PackResult<u64> {
        let header = bincode::serialize(stamp)?;
        let mut prefix = vec![SECTION_MARKER];
        encode_varint(&mut prefix, header.len() as u64);
        self.inner.write_all(&prefix)?;
        self.inner.write_all(&header)?;
        self.inner
            .write_all(&crc32fast::hash(&header).to_be_bytes())?;

        let mut chunks = ChunkWriter::new(&mut self.inner, self.config.effective_chunk_size());
        zstd::stream::copy_encode(&mut data, &mut chunks, self.config.compression_level)
            .map_err(|e| PackError::CompressionFailed(e.to_string()))?;
        let written = chunks.finish()?;

        self.sections += 1;
        debug!(type_id = %stamp.type_id, version = %stamp.version, bytes = written, "wrote archive section");
        Ok(written)
    }

    /// Number of sections written so far.
    pub fn sections(&self) -> u64 {
        self.sections
    }

    /// Write the end marker and return the underlying writer.
    pub fn finish(mut self) -> PackResult<W> {
        self.inner.write_all(&[END_MARKER])?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Serialize `(stamp, stream)` pairs into `writer` as one archive. Returns the
/// number of sections written.
pub fn build_package<W, I, R>(writer: W, pairs: I, config: &ArchiveConfig) -> PackResult<u64>
where
    W: Write,
    I: IntoIterator<Item = (VersionStamp, R)>,
    R: Read,
{
    let mut archive = ArchiveWriter::new(writer, config.clone())?;
    for (stamp, data) in pairs {
        archive.add_section(&stamp, data)?;
    }
    let sections = archive.sections();
    archive.finish()?;
    Ok(sections)
}

/// Buffers writes into fixed-size, length-prefixed chunks.
struct ChunkWriter<'a, W: Write> {
    inner: &'a mut W,
    buf: Vec<u8>,
    chunk_size: usize,
    written: u64,
}

impl<'a, W: Write> ChunkWriter<'a, W> {
    fn new(inner: &'a mut W, chunk_size: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
            written: 0,
        }
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.inner.write_all(&(self.buf.len() as u32).to_be_bytes())?;
        self.inner.write_all(&self.buf)?;
        self.written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Emit the partial chunk and the zero-length terminator.
    fn finish(mut self) -> io::Result<u64> {
        self.emit()?;
        self.inner.write_all(&0u32.to_be_bytes())?;
        Ok(self.written)
    }
}

impl<W: Write> Write for ChunkWriter<'_, W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = self.chunk_size - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == self.chunk_size {
            self.emit()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
