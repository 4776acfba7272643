//! Fixed-capacity byte ring used for extracted output.

use zeroize::Zeroize;

/// Circular byte buffer. Bytes come out in the order they went in; each
/// byte is delivered at most once and wiped when it leaves.
pub struct OutputRing {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
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

    pub fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Append as much of `data` as fits. Returns bytes stored.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let cap = self.buf.len();
        let n = data.len().min(self.free());
        let tail = (self.head + self.len) % cap.max(1);
        let first = n.min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.len += n;
        n
    }

    /// Move up to `out.len()` bytes into `out`. Returns bytes copied.
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let cap = self.buf.len();
        let n = out.len().min(self.len);
        let first = n.min(cap - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        self.buf[self.head..self.head + first].zeroize();
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        self.buf[..n - first].zeroize();
        self.head = if n > 0 { (self.head + n) % cap } else { self.head };
        self.len -= n;
        n
    }
}

impl Drop for OutputRing {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}
