use std::io::{self, Write};
use std::mem;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{DataOutput, grown_capacity};
use crate::access::Primitive;
use crate::error::{MemoryError, MemoryResult};
use crate::mapped::{MMapBuffer, MapMode};
use crate::memory::{DirectMemory, Memory};
use crate::order::ByteOrder;

/// Initial mapping size of a new writer
pub const INITIAL_MAPPING: usize = 4096;

/// Append-only writer over a file mapping that doubles on overflow
///
/// Growing re-maps the file read-write at twice the size and unmaps the
/// previous mapping right away. The file keeps the mapped size after close;
/// [`position`](Self::position) is the number of meaningful bytes.
#[derive(Debug)]
pub struct DynamicMMapWriter {
    buffer: MMapBuffer,
    path: PathBuf,
    position: usize,
}

impl DynamicMMapWriter {
    /// Start writing at the beginning of `path`, mapping one page.
    pub fn create(path: impl AsRef<Path>, order: ByteOrder) -> MemoryResult<Self> {
        let path = path.as_ref();
        let buffer = MMapBuffer::open_range(path, 0, INITIAL_MAPPING, MapMode::ReadWrite, order)?;
        Ok(Self {
            buffer,
            path: path.to_path_buf(),
            position: 0,
        })
    }

    /// Continue writing at `offset` of an existing file, mapping the larger
    /// of one page and the current file length.
    pub fn resume(path: impl AsRef<Path>, order: ByteOrder, offset: usize) -> MemoryResult<Self> {
        let path = path.as_ref();
        let file_len = std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| MemoryError::io(format!("stat {}", path.display()), e))?;
        let file_len = usize::try_from(file_len).map_err(|_| {
            MemoryError::invalid_argument(format!("{} is too large to map", path.display()))
        })?;
        let length = file_len.max(INITIAL_MAPPING);
        if offset > length {
            return Err(MemoryError::invalid_argument(format!(
                "resume offset {offset} beyond mapped length {length}"
            )));
        }
        let buffer = MMapBuffer::open_range(path, 0, length, MapMode::ReadWrite, order)?;
        Ok(Self {
            buffer,
            path: path.to_path_buf(),
            position: offset,
        })
    }

    /// Bytes written so far (including the resume offset)
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current mapping size
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The written prefix `[0, position)`
    pub fn memory(&self) -> MemoryResult<DirectMemory<'_>> {
        self.ensure_open()?;
        self.buffer.memory().slice(0, self.position)
    }

    /// Sync the written prefix to disk.
    pub fn flush(&self) -> MemoryResult<()> {
        self.buffer.flush(0, self.position)
    }

    /// Unmap. A second call does nothing.
    pub fn close(&mut self) -> MemoryResult<()> {
        self.buffer.close()
    }

    fn ensure_open(&self) -> MemoryResult<()> {
        if self.buffer.is_closed() {
            return Err(MemoryError::invalid_state(format!(
                "writer for {} is closed",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn reserve(&mut self, needed: usize) -> MemoryResult<usize> {
        self.ensure_open()?;
        let end = self
            .position
            .checked_add(needed)
            .ok_or_else(|| MemoryError::out_of_memory("grow", usize::MAX))?;
        if end > self.buffer.len() {
            let capacity = grown_capacity(self.buffer.len(), end)?;
            let grown = MMapBuffer::open_range(
                &self.path,
                0,
                capacity,
                MapMode::ReadWrite,
                self.buffer.order(),
            )?;
            let mut previous = mem::replace(&mut self.buffer, grown);
            previous.close()?;
            debug!(path = %self.path.display(), capacity, "grew file mapping");
        }
        Ok(self.position)
    }
}

impl DataOutput for DynamicMMapWriter {
    fn write_value<T: Primitive>(&mut self, value: T) -> MemoryResult<()> {
        let at = self.reserve(T::SIZE)?;
        value.store(&self.buffer.memory(), at)?;
        self.position += T::SIZE;
        Ok(())
    }

    fn write_slice(&mut self, bytes: &[u8]) -> MemoryResult<()> {
        let at = self.reserve(bytes.len())?;
        self.buffer.memory().put_bytes(at, bytes)?;
        self.position += bytes.len();
        Ok(())
    }
}

impl Write for DynamicMMapWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        DynamicMMapWriter::flush(self).map_err(io::Error::from)
    }
}
