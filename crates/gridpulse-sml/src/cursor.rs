use Error::BufferTooSmall;

use crate::error::Error;

/// A bounds-checked cursor over a received byte buffer.
///
/// All accessors either return the requested bytes or fail with
/// [`Error::BufferTooSmall`]; nothing here panics on truncated input. The
/// cursor keeps its absolute position so callers can checksum byte ranges
/// after parsing past them.
pub struct ParseCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ParseCursor<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The bytes between two absolute positions, for checksumming.
    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.data[start..end]
    }

    /// Get the next byte, advancing the cursor.
    #[inline]
    pub fn try_get_u8(&mut self) -> Result<u8, Error> {
        if !self.has_remaining() {
            return Err(BufferTooSmall(1, 0));
        }

        let value = self.data[self.position];
        self.position += 1;
        Ok(value)
    }

    /// Look at the next byte without advancing the cursor.
    #[inline]
    pub fn try_peek_u8(&self) -> Result<u8, Error> {
        if !self.has_remaining() {
            return Err(BufferTooSmall(1, 0));
        }

        Ok(self.data[self.position])
    }

    /// Get the next `len` bytes, advancing the cursor.
    #[inline]
    pub fn try_get_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(BufferTooSmall(len, self.remaining()));
        }

        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Advance the cursor by `len` bytes.
    #[inline]
    pub fn try_skip(&mut self, len: usize) -> Result<(), Error> {
        if self.remaining() < len {
            return Err(BufferTooSmall(len, self.remaining()));
        }

        self.position += len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_advance_and_bound() {
        let data = [0x01u8, 0x02, 0x03, 0x04];
        let mut cursor = ParseCursor::new(&data);

        assert_eq!(cursor.remaining(), 4);
        assert_eq!(cursor.try_peek_u8().unwrap(), 0x01);
        assert_eq!(cursor.position(), 0, "peek must not advance");

        assert_eq!(cursor.try_get_u8().unwrap(), 0x01);
        assert_eq!(cursor.try_get_slice(2).unwrap(), &[0x02, 0x03]);
        assert_eq!(cursor.position(), 3);

        assert!(cursor.try_get_slice(2).is_err());
        assert_eq!(cursor.try_get_u8().unwrap(), 0x04);
        assert!(!cursor.has_remaining());
        assert!(cursor.try_get_u8().is_err());
        assert!(cursor.try_peek_u8().is_err());
    }

    #[test]
    fn slice_returns_absolute_range() {
        let data = [0xaau8, 0xbb, 0xcc, 0xdd];
        let mut cursor = ParseCursor::new(&data);
        cursor.try_skip(3).unwrap();

        assert_eq!(cursor.slice(1, 3), &[0xbb, 0xcc]);
    }
}
