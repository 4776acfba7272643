//! Three-layer universal hash used by the MAC engine.
//!
//! 1. **NH** compresses each `L1_KEY_LEN`-byte block of the message into one
//!    64-bit word per stream with 32-bit multiply-accumulate.
//! 2. **Poly** folds the NH words of a long message together with Horner's
//!    rule modulo `2^64 - 59`.
//! 3. **Inner product** reduces the final 64-bit word per stream to 32 bits
//!    modulo `2^36 - 5` and whitens it with a translation word.
//!
//! Each stream's inner-product layer reads its own four key words, starting
//! at word `8 * s + 4` of the IP key stream; the windows of different
//! streams never overlap. Tags are therefore not byte-compatible with MAC
//! implementations that slide the window by one word per stream.
//!
//! Messages of at most one block skip the poly layer. All key material comes
//! from the KDF of the MAC root key, and every multi-byte key word is decoded
//! big-endian while message words are decoded little-endian, independent of
//! the host byte order.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::ExpandedKey;
use crate::kdf;

/// Independent hash streams; each contributes 4 bytes to the tag.
pub const STREAMS: usize = 2;

/// Bytes of message compressed by one NH block.
pub const L1_KEY_LEN: usize = 1024;

/// Bytes hashed per NH inner step.
const NH_CHUNK: usize = 32;

/// NH key words: one block plus a 16-byte window shift per extra stream.
const NH_KEY_WORDS: usize = (L1_KEY_LEN + 16 * (STREAMS - 1)) / 4;

/// Poly and IP key buffers are both this long.
const L2_KEY_BYTES: usize = (8 * STREAMS + 4) * 8;

const P36: u64 = 0x0000_000F_FFFF_FFFB;
const M36: u64 = 0x0000_000F_FFFF_FFFF;
const P64: u64 = 0xFFFF_FFFF_FFFF_FFC5;
const POLY_KEY_MASK: u64 = 0x01FF_FFFF_01FF_FFFF;

/// Hash output: four big-endian bytes per stream.
pub type HashOutput = [u8; 4 * STREAMS];

// ---------------------------------------------------------------------------
// NH
// ---------------------------------------------------------------------------

/// Streaming NH over at most one `L1_KEY_LEN` block.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Nh {
    key: Vec<u32>,
    state: [u64; STREAMS],
    pending: [u8; NH_CHUNK],
    pending_len: usize,
    bytes_hashed: usize,
}

impl Nh {
    pub fn new(root: &ExpandedKey) -> Self {
        let mut raw = kdf::expand(root, kdf::INDEX_NH, NH_KEY_WORDS * 4);
        let key = raw
            .chunks_exact(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        raw.zeroize();
        Self {
            key,
            state: [0; STREAMS],
            pending: [0; NH_CHUNK],
            pending_len: 0,
            bytes_hashed: 0,
        }
    }

    /// Absorb message bytes. The caller keeps the running total within one
    /// block.
    pub fn update(&mut self, mut data: &[u8]) {
        debug_assert!(self.bytes_hashed + self.pending_len + data.len() <= L1_KEY_LEN);

        if self.pending_len > 0 {
            let take = (NH_CHUNK - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len < NH_CHUNK {
                return;
            }
            let chunk = self.pending;
            self.compress(&chunk);
            self.bytes_hashed += NH_CHUNK;
            self.pending_len = 0;
        }

        let mut chunks = data.chunks_exact(NH_CHUNK);
        for chunk in &mut chunks {
            self.compress(chunk);
            self.bytes_hashed += NH_CHUNK;
        }
        let rest = chunks.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    /// Finish the block: zero-pad any partial chunk, add the bit length and
    /// reset for the next block.
    pub fn finalize(&mut self) -> [u64; STREAMS] {
        if self.pending_len > 0 {
            self.pending[self.pending_len..].fill(0);
            let chunk = self.pending;
            self.compress(&chunk);
            self.bytes_hashed += self.pending_len;
        }
        let bits = (self.bytes_hashed as u64) * 8;
        let mut out = self.state;
        for h in out.iter_mut() {
            *h = h.wrapping_add(bits);
        }
        self.reset();
        out
    }

    pub fn reset(&mut self) {
        self.state = [0; STREAMS];
        self.pending.zeroize();
        self.pending_len = 0;
        self.bytes_hashed = 0;
    }

    /// One 32-byte step at the key offset matching `bytes_hashed`.
    fn compress(&mut self, chunk: &[u8]) {
        let mut d = [0u32; 8];
        for (w, b) in d.iter_mut().zip(chunk.chunks_exact(4)) {
            *w = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        }
        let base = self.bytes_hashed / 4;
        for (s, h) in self.state.iter_mut().enumerate() {
            let k = &self.key[base + 4 * s..base + 4 * s + 8];
            let mut sum = 0u64;
            for i in 0..4 {
                let a = k[i].wrapping_add(d[i]) as u64;
                let b = k[i + 4].wrapping_add(d[i + 4]) as u64;
                sum = sum.wrapping_add(a.wrapping_mul(b));
            }
            *h = h.wrapping_add(sum);
        }
    }
}

// ---------------------------------------------------------------------------
// Poly
// ---------------------------------------------------------------------------

#[inline]
fn poly64(cur: u64, key: u64, data: u64) -> u64 {
    ((cur as u128 * key as u128 + data as u128) % P64 as u128) as u64
}

/// Polynomial hash over NH outputs, one accumulator per stream.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PolyHash {
    keys: [u64; STREAMS],
    accum: [u64; STREAMS],
}

impl PolyHash {
    pub fn new(root: &ExpandedKey) -> Self {
        let mut buf = kdf::expand(root, kdf::INDEX_POLY, L2_KEY_BYTES);
        let mut keys = [0u64; STREAMS];
        for (i, k) in keys.iter_mut().enumerate() {
            *k = be_u64(&buf[24 * i..]) & POLY_KEY_MASK;
        }
        buf.zeroize();
        Self {
            keys,
            accum: [1; STREAMS],
        }
    }

    /// Fold one NH output per stream into the accumulators.
    ///
    /// Words in the top `2^32` values of the field cannot be hashed
    /// directly; they are encoded as the marker `p64 - 1` followed by the
    /// word minus 59.
    pub fn absorb(&mut self, words: &[u64; STREAMS]) {
        for ((acc, &key), &w) in self.accum.iter_mut().zip(&self.keys).zip(words) {
            if (w >> 32) == 0xFFFF_FFFF {
                *acc = poly64(*acc, key, P64 - 1);
                *acc = poly64(*acc, key, w - 59);
            } else {
                *acc = poly64(*acc, key, w);
            }
        }
    }

    /// Accumulators reduced into `[0, p64)`.
    pub fn result(&self) -> [u64; STREAMS] {
        let mut out = self.accum;
        for a in out.iter_mut() {
            if *a >= P64 {
                *a -= P64;
            }
        }
        out
    }

    pub fn reset(&mut self) {
        self.accum = [1; STREAMS];
    }
}

// ---------------------------------------------------------------------------
// Inner product
// ---------------------------------------------------------------------------

/// Final inner-product layer with per-stream keys and translation words.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct InnerProduct {
    keys: [[u64; 4]; STREAMS],
    trans: [u32; STREAMS],
}

impl InnerProduct {
    pub fn new(root: &ExpandedKey) -> Self {
        let mut buf = kdf::expand(root, kdf::INDEX_IP, L2_KEY_BYTES);
        let mut keys = [[0u64; 4]; STREAMS];
        for (i, stream) in keys.iter_mut().enumerate() {
            let base = (8 * i + 4) * 8;
            for (j, k) in stream.iter_mut().enumerate() {
                *k = be_u64(&buf[base + 8 * j..]) % P36;
            }
        }
        buf.zeroize();

        let mut tbuf = kdf::expand(root, kdf::INDEX_IP_TRANS, 4 * STREAMS);
        let mut trans = [0u32; STREAMS];
        for (t, b) in trans.iter_mut().zip(tbuf.chunks_exact(4)) {
            *t = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        }
        tbuf.zeroize();

        Self { keys, trans }
    }

    /// Reduce one word per stream to the 32-bit-per-stream hash output.
    pub fn hash(&self, words: &[u64; STREAMS]) -> HashOutput {
        let mut out = [0u8; 4 * STREAMS];
        for (i, &w) in words.iter().enumerate() {
            let t = ip_aux(&self.keys[i], w);
            let v = ip_reduce_p36(t) ^ self.trans[i];
            out[4 * i..4 * i + 4].copy_from_slice(&v.to_be_bytes());
        }
        out
    }
}

/// Sum of the four keys times the 16-bit chunks of `data`, high chunk first.
#[inline]
fn ip_aux(keys: &[u64; 4], data: u64) -> u64 {
    keys.iter()
        .enumerate()
        .map(|(j, &k)| k * ((data >> (48 - 16 * j)) & 0xFFFF))
        .fold(0u64, u64::wrapping_add)
}

#[inline]
fn ip_reduce_p36(t: u64) -> u32 {
    let mut ret = (t & M36) + 5 * (t >> 36);
    if ret >= P36 {
        ret -= P36;
    }
    ret as u32
}

#[inline]
fn be_u64(b: &[u8]) -> u64 {
    let mut w = [0u8; 8];
    w.copy_from_slice(&b[..8]);
    u64::from_be_bytes(w)
}

// ---------------------------------------------------------------------------
// UHash
// ---------------------------------------------------------------------------

/// Streaming composition of the three layers.
#[derive(Clone)]
pub struct UHash {
    nh: Nh,
    poly: PolyHash,
    ip: InnerProduct,
    msg_len: u64,
    block_fill: usize,
}

impl UHash {
    pub fn new(root: &ExpandedKey) -> Self {
        Self {
            nh: Nh::new(root),
            poly: PolyHash::new(root),
            ip: InnerProduct::new(root),
            msg_len: 0,
            block_fill: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            // A full block is only folded into poly once more input shows the
            // message is long.
            if self.block_fill == L1_KEY_LEN {
                let words = self.nh.finalize();
                self.poly.absorb(&words);
                self.block_fill = 0;
            }
            let take = (L1_KEY_LEN - self.block_fill).min(data.len());
            self.nh.update(&data[..take]);
            self.block_fill += take;
            self.msg_len += take as u64;
            data = &data[take..];
        }
    }

    /// Produce the unmasked hash and reset.
    pub fn finalize(&mut self) -> HashOutput {
        let out = if self.msg_len > L1_KEY_LEN as u64 {
            if self.block_fill > 0 {
                let words = self.nh.finalize();
                self.poly.absorb(&words);
            }
            self.ip.hash(&self.poly.result())
        } else {
            let words = self.nh.finalize();
            self.ip.hash(&words)
        };
        self.reset();
        out
    }

    pub fn reset(&mut self) {
        self.nh.reset();
        self.poly.reset();
        self.msg_len = 0;
        self.block_fill = 0;
    }

    /// Bytes absorbed since the last reset.
    pub fn message_len(&self) -> u64 {
        self.msg_len
    }
}
