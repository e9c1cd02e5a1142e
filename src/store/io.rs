use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use super::{Result, StoreError};

/// Positioned, read-only access to the bytes of one store file.
pub trait FileIo: Send + Sync + 'static {
    /// Reads exactly `dst.len()` bytes starting at `off`.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Returns the current length of the file in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Read-only handle on a store file, shared between tasks.
#[derive(Clone, Debug)]
pub struct StdFileIo {
    file: Arc<File>,
}

impl StdFileIo {
    /// Wraps an open file.
    pub fn new(file: File) -> Self {
        Self {
            file: Arc::new(file),
        }
    }

    /// Opens the store file at `path`; a missing file is reported by path.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::Missing(path.to_path_buf()));
        }
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self::new(file))
    }
}

#[cfg(unix)]
fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(dst, off)
}

#[cfg(windows)]
fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(dst, off)
}

// Fills `dst` from `off`; a file ending early is an I/O error.
fn read_exact_at(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
    while !dst.is_empty() {
        let read = read_some(file, dst, off)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "store file ended inside a record",
            ));
        }
        dst = &mut std::mem::take(&mut dst)[read..];
        off += read as u64;
    }
    Ok(())
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        Ok(read_exact_at(&self.file, off, dst)?)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// In-memory file image, used for embedded store sets and tests.
#[derive(Clone, Debug, Default)]
pub struct MemFileIo {
    bytes: Arc<[u8]>,
}

impl MemFileIo {
    /// Wraps an owned byte image.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl FileIo for MemFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let start = usize::try_from(off).map_err(|_| StoreError::Invalid("read offset overflow"))?;
        let end = start
            .checked_add(dst.len())
            .ok_or(StoreError::Invalid("read offset overflow"))?;
        let src = self.bytes.get(start..end).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of in-memory file",
            ))
        })?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.bytes.len() as u64)
    }
}
