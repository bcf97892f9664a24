//! Seekable byte sources over cached or direct content.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::store::ReadSeek;

/// A seekable, readable byte source returned by the repository.
///
/// Backed either by an in-memory snapshot (cache hit or fresh load) or by
/// a direct reader over the backing store (bypass or load-failure
/// fallback). A memory source reflects one consistent snapshot and does
/// not change mid-read even if the backing file is rewritten.
pub enum ByteSource {
    /// In-memory snapshot, positioned reads over shared content.
    Memory {
        /// Snapshot content.
        data: Arc<Vec<u8>>,
        /// Current read position.
        pos: u64,
    },
    /// Direct, uncached reader over the backing store.
    Direct(Box<dyn ReadSeek>),
}

impl ByteSource {
    /// Create a source over a cached snapshot, positioned at offset 0.
    pub fn from_snapshot(data: Arc<Vec<u8>>) -> Self {
        ByteSource::Memory { data, pos: 0 }
    }

    /// Whether this source serves from an in-memory snapshot.
    pub fn is_cached(&self) -> bool {
        matches!(self, ByteSource::Memory { .. })
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSource::Memory { data, pos } => f
                .debug_struct("Memory")
                .field("len", &data.len())
                .field("pos", pos)
                .finish(),
            ByteSource::Direct(_) => f.debug_struct("Direct").finish_non_exhaustive(),
        }
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::Memory { data, pos } => {
                let len: u64 = data.len() as u64;
                if *pos >= len {
                    return Ok(0);
                }
                let start: usize = *pos as usize;
                let n: usize = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                *pos += n as u64;
                Ok(n)
            }
            ByteSource::Direct(inner) => inner.read(buf),
        }
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, style: SeekFrom) -> io::Result<u64> {
        match self {
            ByteSource::Memory { data, pos } => {
                let new_pos: i64 = match style {
                    SeekFrom::Start(n) => n as i64,
                    SeekFrom::End(n) => data.len() as i64 + n,
                    SeekFrom::Current(n) => *pos as i64 + n,
                };
                if new_pos < 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "seek before start of byte source",
                    ));
                }
                *pos = new_pos as u64;
                Ok(*pos)
            }
            ByteSource::Direct(inner) => inner.seek(style),
        }
    }
}
