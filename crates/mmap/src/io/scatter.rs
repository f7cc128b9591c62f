use std::io::{self, IoSliceMut, Read};

use bytes::BufMut;

use crate::error::{MemoryError, MemoryResult};
use crate::memory::Memory;

/// Reader that spreads a [`Memory`] over several destination buffers
///
/// Destinations are filled in order; a batch stops at the first destination
/// that could not be filled completely.
#[derive(Debug, Clone)]
pub struct MemoryScatteringReader<M> {
    memory: M,
    position: usize,
    closed: bool,
}

impl<M: Memory> MemoryScatteringReader<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            position: 0,
            closed: false,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn remaining(&self) -> usize {
        self.memory.length() - self.position
    }

    fn ensure_open(&self) -> MemoryResult<()> {
        if self.closed {
            return Err(MemoryError::invalid_state("scattering reader is closed"));
        }
        Ok(())
    }

    /// Fill as much of `dst` as possible; `None` at end of data.
    pub fn read_scatter(&mut self, dst: &mut [u8]) -> MemoryResult<Option<usize>> {
        self.ensure_open()?;
        if self.remaining() == 0 {
            return Ok(None);
        }
        let n = dst.len().min(self.remaining());
        self.memory.get_bytes(self.position, &mut dst[..n])?;
        self.position += n;
        Ok(Some(n))
    }

    /// Read into each destination in turn; `None` when nothing was left.
    pub fn read_scatter_all(&mut self, dsts: &mut [&mut [u8]]) -> MemoryResult<Option<usize>> {
        self.ensure_open()?;
        let mut total = 0;
        for dst in dsts.iter_mut() {
            match self.read_scatter(dst)? {
                None if total == 0 => return Ok(None),
                None => break,
                Some(n) => {
                    total += n;
                    if n < dst.len() {
                        break;
                    }
                }
            }
        }
        Ok(Some(total))
    }

    /// Append up to the buffer's remaining capacity; `None` at end of data.
    pub fn read_buf<B: BufMut>(&mut self, dst: &mut B) -> MemoryResult<Option<usize>> {
        self.ensure_open()?;
        if self.remaining() == 0 {
            return Ok(None);
        }
        let n = dst.remaining_mut().min(self.remaining());
        self.memory.get_buf(self.position, dst, n)?;
        self.position += n;
        Ok(Some(n))
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl<M: Memory> Read for MemoryScatteringReader<M> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_scatter(buf)?.unwrap_or(0))
    }

    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        let mut total = 0;
        for buf in bufs.iter_mut() {
            let n = self.read(buf)?;
            total += n;
            if n < buf.len() {
                break;
            }
        }
        Ok(total)
    }
}
