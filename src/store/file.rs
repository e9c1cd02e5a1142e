use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::format::RecordFormat;
use super::io::{FileIo, MemFileIo, StdFileIo};
use super::{RecordStore, Result, StoreError};

/// A record store backed by a [`FileIo`] image and a [`RecordFormat`].
///
/// The high-water id is fixed when the store is opened: it is the file length
/// divided by the record size. A trailing partial record is ignored.
pub struct RecordFile<F: RecordFormat> {
    io: Arc<dyn FileIo>,
    format: F,
    high_id: u64,
}

impl<F: RecordFormat> RecordFile<F> {
    /// Wraps an already opened file image.
    pub fn with_io(io: Arc<dyn FileIo>, format: F) -> Result<Self> {
        let size = format.record_size() as u64;
        if size == 0 {
            return Err(StoreError::Invalid("record size must be non-zero"));
        }
        let high_id = io.len()? / size;
        Ok(Self {
            io,
            format,
            high_id,
        })
    }

    /// Opens the store file at `path` read-only.
    pub fn open(path: impl AsRef<Path>, format: F) -> Result<Self> {
        let io = StdFileIo::open_read_only(path)?;
        Self::with_io(Arc::new(io), format)
    }

    /// Serves records from an in-memory byte image.
    pub fn in_memory(format: F, bytes: Vec<u8>) -> Result<Self> {
        Self::with_io(Arc::new(MemFileIo::new(bytes)), format)
    }

    /// Codec used by this store.
    pub fn format(&self) -> &F {
        &self.format
    }
}

impl<F: RecordFormat> RecordStore<F::Record> for RecordFile<F> {
    fn high_id(&self) -> u64 {
        self.high_id
    }

    fn record_size(&self) -> usize {
        self.format.record_size()
    }

    fn record(&self, id: u64) -> Result<F::Record> {
        if id >= self.high_id {
            return Ok(self.format.absent(id));
        }
        let size = self.format.record_size();
        let mut buf = vec![0u8; size];
        self.io.read_at(id * size as u64, &mut buf)?;
        self.format.decode(id, &buf)
    }
}

impl<F: RecordFormat> fmt::Debug for RecordFile<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordFile")
            .field("record_size", &self.format.record_size())
            .field("high_id", &self.high_id)
            .finish()
    }
}

/// Encodes `records` into one contiguous store image, record `i` at id `i`.
pub fn encode_records<F: RecordFormat>(format: &F, records: &[F::Record]) -> Result<Vec<u8>> {
    let size = format.record_size();
    let mut bytes = vec![0u8; size * records.len()];
    for (record, dst) in records.iter().zip(bytes.chunks_exact_mut(size)) {
        format.encode(record, dst)?;
    }
    Ok(bytes)
}
