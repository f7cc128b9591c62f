use super::DataInput;
use crate::access::Primitive;
use crate::error::{MemoryError, MemoryResult};
use crate::memory::Memory;

/// Sequential typed reader over a [`Memory`]
///
/// Reads past the end fail with [`MemoryError::EndOfStream`] and leave the
/// cursor where it was.
#[derive(Debug, Clone)]
pub struct MemoryDataInput<M> {
    memory: M,
    position: usize,
}

impl<M: Memory> MemoryDataInput<M> {
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

    pub fn remaining(&self) -> usize {
        self.memory.length() - self.position
    }

    /// Move the cursor; `position` may equal the length.
    pub fn seek(&mut self, position: usize) -> MemoryResult<()> {
        if position > self.memory.length() {
            return Err(MemoryError::out_of_bounds(position, 0, self.memory.length()));
        }
        self.position = position;
        Ok(())
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn into_inner(self) -> M {
        self.memory
    }

    fn claim(&self, needed: usize) -> MemoryResult<usize> {
        if needed > self.remaining() {
            return Err(MemoryError::end_of_stream(
                self.position,
                needed,
                self.memory.length(),
            ));
        }
        Ok(self.position)
    }
}

impl<M: Memory> DataInput for MemoryDataInput<M> {
    fn read_value<T: Primitive>(&mut self) -> MemoryResult<T> {
        let at = self.claim(T::SIZE)?;
        let value = T::load(&self.memory, at)?;
        self.position += T::SIZE;
        Ok(value)
    }

    fn read_fully(&mut self, dst: &mut [u8]) -> MemoryResult<()> {
        let at = self.claim(dst.len())?;
        self.memory.get_bytes(at, dst)?;
        self.position += dst.len();
        Ok(())
    }

    fn skip_bytes(&mut self, n: usize) -> MemoryResult<usize> {
        let skipped = n.min(self.remaining());
        self.position += skipped;
        Ok(skipped)
    }
}
