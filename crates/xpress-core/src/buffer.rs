//! Fixed-capacity FIFO byte store for the read side of a session.
//!
//! Bulk-in data arrives in timeout-bound chunks of whatever length the
//! device produced; callers want "up to N bytes". The buffer absorbs the
//! chunks at the tail and serves callers from the front, strictly in
//! arrival order.

/// The session-owned receive buffer.
///
/// Length never exceeds the capacity fixed at construction; a fill that
/// would overflow is truncated to the remaining spare space.
#[derive(Debug)]
pub struct RxBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl RxBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered-but-unread bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// The unfilled tail region, for a transport fill to write into.
    ///
    /// Follow up with [`commit`](Self::commit) for however many bytes the
    /// transfer actually produced.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.data[len..]
    }

    /// Commit `n` bytes previously written into [`spare_mut`](Self::spare_mut).
    ///
    /// Clamped to the capacity, so an over-reported transfer cannot push the
    /// length past it.
    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(self.data.len());
    }

    /// Append bytes at the tail, truncating at capacity.
    ///
    /// Returns how many bytes were accepted.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.data.len() - self.len);
        self.data[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }

    /// Copy up to `dest.len()` bytes out of the front, preserving order.
    ///
    /// Remaining bytes shift forward; returns how many bytes were copied.
    pub fn drain_into(&mut self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.len);
        dest[..n].copy_from_slice(&self.data[..n]);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
        n
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
