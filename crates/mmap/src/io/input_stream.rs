use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::Memory;

/// `std::io` byte stream over a [`Memory`]
///
/// `read` returns `Ok(0)` once the cursor reaches the end.
#[derive(Debug, Clone)]
pub struct MemoryInputStream<M> {
    memory: M,
    position: usize,
}

impl<M: Memory> MemoryInputStream<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn length(&self) -> usize {
        self.memory.length()
    }

    /// Move the cursor to `position`, which may equal the length.
    pub fn seek_to(&mut self, position: usize) -> MemoryResult<()> {
        if position > self.memory.length() {
            return Err(MemoryError::out_of_bounds(position, 0, self.memory.length()));
        }
        self.position = position;
        Ok(())
    }

    /// Skip up to `n` bytes; returns how many were skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let skipped = n.min(self.memory.length() - self.position);
        self.position += skipped;
        skipped
    }

    pub fn into_inner(self) -> M {
        self.memory
    }
}

impl<M: Memory> Read for MemoryInputStream<M> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.memory.length() - self.position);
        if n == 0 {
            return Ok(0);
        }
        self.memory.get_bytes(self.position, &mut buf[..n])?;
        self.position += n;
        Ok(n)
    }
}

impl<M: Memory> Seek for MemoryInputStream<M> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let length = self.memory.length() as u64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => length.checked_add_signed(delta),
            SeekFrom::Current(delta) => (self.position as u64).checked_add_signed(delta),
        };
        match target {
            Some(target) if target <= length => {
                self.position = target as usize;
                Ok(target)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek outside [0, {length}]"),
            )),
        }
    }
}
