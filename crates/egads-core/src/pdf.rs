//! Pseudorandom tag mask.
//!
//! One cipher block covers two consecutive nonces: the low bit of the nonce
//! picks which half of the block is XORed onto the tag, the remaining bits
//! form the cipher input. The last block is cached together with the prefix
//! that produced it.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{BLOCK_LEN, ExpandedKey, key_schedule};
use crate::kdf;
use crate::uhash::HashOutput;

/// Nonce width in bytes.
pub const NONCE_LEN: usize = 8;

const TAG_LEN: usize = std::mem::size_of::<HashOutput>();
const SLOTS: u8 = (BLOCK_LEN / TAG_LEN) as u8;

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Pdf {
    key: ExpandedKey,
    cache: [u8; BLOCK_LEN],
    prefix: [u8; NONCE_LEN],
}

impl Pdf {
    pub fn new(root: &ExpandedKey) -> Self {
        let mut raw = [0u8; 16];
        kdf::expand_into(root, kdf::INDEX_PDF, &mut raw);
        let key = key_schedule(&raw);
        raw.zeroize();

        let mut cache = [0u8; BLOCK_LEN];
        key.encrypt_in_place(&mut cache);
        Self {
            key,
            cache,
            prefix: [0; NONCE_LEN],
        }
    }

    /// XOR the mask for `nonce` onto `tag`.
    pub fn mask_xor(&mut self, nonce: &[u8; NONCE_LEN], tag: &mut HashOutput) {
        let slot = nonce[NONCE_LEN - 1] % SLOTS;
        let mut prefix = *nonce;
        prefix[NONCE_LEN - 1] ^= slot;

        if prefix != self.prefix {
            let mut input = [0u8; BLOCK_LEN];
            input[..NONCE_LEN].copy_from_slice(&prefix);
            self.key.encrypt_in_place(&mut input);
            self.cache = input;
            self.prefix = prefix;
        }

        let off = slot as usize * TAG_LEN;
        for (t, m) in tag.iter_mut().zip(&self.cache[off..off + TAG_LEN]) {
            *t ^= m;
        }
    }
}
