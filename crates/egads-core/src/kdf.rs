//! Key derivation stream: expands one cipher key into independent
//! pseudorandom byte streams, one per domain index.

use crate::cipher::{BLOCK_LEN, ExpandedKey};

/// Domain index for the NH key.
pub const INDEX_NH: u8 = 0;
/// Domain index for the polynomial-hash keys.
pub const INDEX_POLY: u8 = 1;
/// Domain index for the inner-product keys.
pub const INDEX_IP: u8 = 2;
/// Domain index for the inner-product translation words.
pub const INDEX_IP_TRANS: u8 = 3;
/// Domain index for the PDF cipher key.
pub const INDEX_PDF: u8 = 128;

/// Fill `out` with the stream for `index`.
///
/// The chaining block starts as zeros with `index` in its last byte; each
/// output block is the encryption of the previous one. The final block is
/// truncated to fit.
pub fn expand_into(key: &ExpandedKey, index: u8, out: &mut [u8]) {
    let mut chain = [0u8; BLOCK_LEN];
    chain[BLOCK_LEN - 1] = index;
    for chunk in out.chunks_mut(BLOCK_LEN) {
        key.encrypt_in_place(&mut chain);
        chunk.copy_from_slice(&chain[..chunk.len()]);
    }
}

/// Allocating form of [`expand_into`].
pub fn expand(key: &ExpandedKey, index: u8, out_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_len];
    expand_into(key, index, &mut out);
    out
}
