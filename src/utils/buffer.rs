/// Fixed-capacity byte buffer shared by every transfer session.
///
/// Socket reads land in the spare tail, decoders consume from the front,
/// and unread bytes are compacted back to the start. The capacity never
/// changes, so one allocation serves an arbitrarily large transfer.
#[derive(Debug)]
pub struct ChunkBuffer {
    buf: Vec<u8>,
    len: usize,
}

impl ChunkBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            len: 0,
        }
    }

    /// Unread bytes, oldest first.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Writable tail for the next socket or file read.
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Record `n` bytes written into `spare()`.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.buf.len());
        self.len += n;
    }

    /// Drop the first `n` bytes. Trailing unread bytes move to the front;
    /// consuming everything resets the buffer to empty.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        if n == self.len {
            self.len = 0;
        } else {
            self.buf.copy_within(n..self.len, 0);
            self.len -= n;
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(buf: &mut ChunkBuffer, data: &[u8]) {
        buf.spare()[..data.len()].copy_from_slice(data);
        buf.advance(data.len());
    }

    #[test]
    fn consume_compacts_trailing_bytes_to_front() {
        let mut buf = ChunkBuffer::new(16);
        fill(&mut buf, b"abcdef");
        buf.consume(4);
        assert_eq!(buf.filled(), b"ef");
        // the spare tail is writable again right after the survivors
        fill(&mut buf, b"gh");
        assert_eq!(buf.filled(), b"efgh");
    }

    #[test]
    fn consuming_everything_resets() {
        let mut buf = ChunkBuffer::new(8);
        fill(&mut buf, b"abc");
        buf.consume(3);
        assert!(buf.is_empty());
        assert_eq!(buf.spare().len(), 8);
    }

    #[test]
    fn capacity_is_fixed() {
        let mut buf = ChunkBuffer::new(4);
        fill(&mut buf, b"abcd");
        assert!(buf.is_full());
        assert!(buf.spare().is_empty());
        assert_eq!(buf.capacity(), 4);
    }
}
