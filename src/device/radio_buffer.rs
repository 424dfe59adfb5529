//! Scratch buffer in which outgoing frames are assembled.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error {
    BufferFull,
    OutOfBounds,
}

/// Fixed capacity frame buffer with little-endian writers.
#[derive(Clone)]
pub struct RadioBuffer<const N: usize> {
    packet: [u8; N],
    pos: usize,
}

impl<const N: usize> Default for RadioBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RadioBuffer<N> {
    /// Creation.
    pub const fn new() -> Self {
        Self { packet: [0; N], pos: 0 }
    }

    /// Mark as empty.
    pub fn clear(&mut self) {
        self.pos = 0;
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// Nothing written yet.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Append bytes as long as they fit.
    pub fn extend_from_slice(&mut self, buf: &[u8]) -> Result<(), Error> {
        let end = self.pos + buf.len();
        if end > N {
            return Err(Error::BufferFull);
        }
        self.packet[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.extend_from_slice(&[byte])
    }

    /// Append a little-endian `u16`.
    pub fn push_u16(&mut self, value: u16) -> Result<(), Error> {
        self.extend_from_slice(&value.to_le_bytes())
    }

    /// Append a little-endian `u32`.
    pub fn push_u32(&mut self, value: u32) -> Result<(), Error> {
        self.extend_from_slice(&value.to_le_bytes())
    }

    /// Append a little-endian `u64`.
    pub fn push_u64(&mut self, value: u64) -> Result<(), Error> {
        self.extend_from_slice(&value.to_le_bytes())
    }

    /// Overwrite an already written byte.
    pub fn set(&mut self, index: usize, byte: u8) -> Result<(), Error> {
        if index >= self.pos {
            return Err(Error::OutOfBounds);
        }
        self.packet[index] = byte;
        Ok(())
    }

    /// Read back an already written byte.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.as_ref().get(index).copied()
    }
}

impl<const N: usize> AsMut<[u8]> for RadioBuffer<N> {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.packet[..self.pos]
    }
}

impl<const N: usize> AsRef<[u8]> for RadioBuffer<N> {
    fn as_ref(&self) -> &[u8] {
        &self.packet[..self.pos]
    }
}
