use std::collections::TryReserveError;
use std::io::{self, Read};

/// Reusable storage for one encoded frame.
///
/// Storage only ever grows: a frame smaller than a previous one reuses the
/// existing allocation, so steady-state playback does not reallocate.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    len: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes available without reallocating. Never decreases.
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Length of the frame currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Forget the current frame, keeping the allocation.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Grow storage to at least `needed` bytes.
    pub fn ensure_capacity(&mut self, needed: usize) -> Result<(), TryReserveError> {
        if needed > self.data.len() {
            self.data.try_reserve_exact(needed - self.data.len())?;
            self.data.resize(needed, 0);
        }
        Ok(())
    }

    /// Replace the contents with exactly `len` bytes from `reader`.
    ///
    /// On error the buffer holds no frame.
    pub fn read_from(&mut self, reader: &mut impl Read, len: usize) -> io::Result<()> {
        self.len = 0;
        self.ensure_capacity(len)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        reader.read_exact(&mut self.data[..len])?;
        self.len = len;
        Ok(())
    }

    /// Replace the contents with a copy of `bytes`.
    pub fn copy_from(&mut self, bytes: &[u8]) -> Result<(), TryReserveError> {
        self.len = 0;
        self.ensure_capacity(bytes.len())?;
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }
}
