//! AES block cipher: key expansion and single-block encryption.
//!
//! Only the forward direction is implemented. Every consumer in this crate
//! (KDF, PDF, counter-mode PRNG) uses the cipher as a keyed permutation and
//! never needs decryption.
//!
//! Key length selects the round count at compile time through [`AesKey`]:
//! 16 bytes → 10 rounds, 24 → 12, 32 → 14.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Cipher block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Largest round count (AES-256).
const MAX_ROUNDS: usize = 14;

const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1b, 0x36];

mod sealed {
    pub trait Sealed {}
    impl Sealed for [u8; 16] {}
    impl Sealed for [u8; 24] {}
    impl Sealed for [u8; 32] {}
}

/// A raw AES key of one of the three standard lengths.
pub trait AesKey: sealed::Sealed + AsRef<[u8]> {
    /// Number of cipher rounds for this key length.
    const ROUNDS: usize;
}

impl AesKey for [u8; 16] {
    const ROUNDS: usize = 10;
}

impl AesKey for [u8; 24] {
    const ROUNDS: usize = 12;
}

impl AesKey for [u8; 32] {
    const ROUNDS: usize = 14;
}

/// Round-key schedule produced by [`key_schedule`]. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExpandedKey {
    round_keys: [[u8; BLOCK_LEN]; MAX_ROUNDS + 1],
    rounds: usize,
}

impl std::fmt::Debug for ExpandedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpandedKey")
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

impl ExpandedKey {
    /// Number of rounds this schedule drives (10, 12 or 14).
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Encrypt one block in place.
    pub fn encrypt_in_place(&self, block: &mut [u8; BLOCK_LEN]) {
        add_round_key(block, &self.round_keys[0]);
        for round in 1..self.rounds {
            sub_bytes(block);
            shift_rows(block);
            mix_columns(block);
            add_round_key(block, &self.round_keys[round]);
        }
        sub_bytes(block);
        shift_rows(block);
        add_round_key(block, &self.round_keys[self.rounds]);
    }
}

/// Expand a raw key into its round-key schedule.
pub fn key_schedule<K: AesKey>(key: &K) -> ExpandedKey {
    let key = key.as_ref();
    let nk = key.len() / 4;
    let rounds = K::ROUNDS;
    let total_words = 4 * (rounds + 1);

    let mut words = [[0u8; 4]; 4 * (MAX_ROUNDS + 1)];
    for (i, chunk) in key.chunks_exact(4).enumerate() {
        words[i].copy_from_slice(chunk);
    }
    for i in nk..total_words {
        let mut temp = words[i - 1];
        if i % nk == 0 {
            temp.rotate_left(1);
            for b in temp.iter_mut() {
                *b = SBOX[*b as usize];
            }
            temp[0] ^= RCON[i / nk - 1];
        } else if nk > 6 && i % nk == 4 {
            for b in temp.iter_mut() {
                *b = SBOX[*b as usize];
            }
        }
        for j in 0..4 {
            words[i][j] = words[i - nk][j] ^ temp[j];
        }
    }

    let mut round_keys = [[0u8; BLOCK_LEN]; MAX_ROUNDS + 1];
    for (r, rk) in round_keys.iter_mut().take(rounds + 1).enumerate() {
        for c in 0..4 {
            rk[4 * c..4 * c + 4].copy_from_slice(&words[4 * r + c]);
        }
    }
    words.zeroize();

    ExpandedKey { round_keys, rounds }
}

/// Encrypt a single block under an expanded key.
pub fn encrypt_block(block: &[u8; BLOCK_LEN], key: &ExpandedKey) -> [u8; BLOCK_LEN] {
    let mut out = *block;
    key.encrypt_in_place(&mut out);
    out
}

// ---------------------------------------------------------------------------
// Round transformations
// ---------------------------------------------------------------------------

#[inline]
fn xtime(x: u8) -> u8 {
    (x << 1) ^ if x & 0x80 != 0 { 0x1b } else { 0 }
}

#[inline]
fn add_round_key(state: &mut [u8; BLOCK_LEN], rk: &[u8; BLOCK_LEN]) {
    for (s, k) in state.iter_mut().zip(rk) {
        *s ^= k;
    }
}

#[inline]
fn sub_bytes(state: &mut [u8; BLOCK_LEN]) {
    for b in state.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

/// State is column-major: byte `r + 4c` is row `r`, column `c`.
#[inline]
fn shift_rows(state: &mut [u8; BLOCK_LEN]) {
    let old = *state;
    for r in 1..4 {
        for c in 0..4 {
            state[r + 4 * c] = old[r + 4 * ((c + r) % 4)];
        }
    }
}

#[inline]
fn mix_columns(state: &mut [u8; BLOCK_LEN]) {
    for col in state.chunks_exact_mut(4) {
        let (a0, a1, a2, a3) = (col[0], col[1], col[2], col[3]);
        let all = a0 ^ a1 ^ a2 ^ a3;
        col[0] = a0 ^ all ^ xtime(a0 ^ a1);
        col[1] = a1 ^ all ^ xtime(a1 ^ a2);
        col[2] = a2 ^ all ^ xtime(a2 ^ a3);
        col[3] = a3 ^ all ^ xtime(a3 ^ a0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn block(s: &str) -> [u8; 16] {
        hex(s).try_into().unwrap()
    }

    #[test]
    fn test_zero_key_high_bit_plaintext() {
        let key = key_schedule(&[0u8; 16]);
        let ct = encrypt_block(&block("80000000000000000000000000000000"), &key);
        assert_eq!(ct, block("3ad78e726c1ec02b7ebfe92b23d9ec34"));
    }

    #[test]
    fn test_fips197_aes128() {
        let k: [u8; 16] = hex("000102030405060708090a0b0c0d0e0f").try_into().unwrap();
        let key = key_schedule(&k);
        assert_eq!(key.rounds(), 10);
        let ct = encrypt_block(&block("00112233445566778899aabbccddeeff"), &key);
        assert_eq!(ct, block("69c4e0d86a7b0430d8cdb78070b4c55a"));
    }

    #[test]
    fn test_fips197_aes192() {
        let k: [u8; 24] = hex("000102030405060708090a0b0c0d0e0f1011121314151617")
            .try_into()
            .unwrap();
        let key = key_schedule(&k);
        assert_eq!(key.rounds(), 12);
        let ct = encrypt_block(&block("00112233445566778899aabbccddeeff"), &key);
        assert_eq!(ct, block("dda97ca4864cdfe06eaf70a0ec0d7191"));
    }

    #[test]
    fn test_fips197_aes256() {
        let k: [u8; 32] =
            hex("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
                .try_into()
                .unwrap();
        let key = key_schedule(&k);
        assert_eq!(key.rounds(), 14);
        let ct = encrypt_block(&block("00112233445566778899aabbccddeeff"), &key);
        assert_eq!(ct, block("8ea2b7ca516745bfeafc49904b496089"));
    }

    #[test]
    fn test_encrypt_in_place_matches_encrypt_block() {
        let key = key_schedule(&[7u8; 16]);
        let pt = [0x42u8; 16];
        let mut b = pt;
        key.encrypt_in_place(&mut b);
        assert_eq!(b, encrypt_block(&pt, &key));
        assert_ne!(b, pt);
    }

    #[test]
    fn test_matches_rustcrypto_aes() {
        use aes::Aes128;
        use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
        use rand::{RngCore, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(0xae5);
        for _ in 0..64 {
            let mut k = [0u8; 16];
            let mut pt = [0u8; 16];
            rng.fill_bytes(&mut k);
            rng.fill_bytes(&mut pt);

            let reference = Aes128::new(GenericArray::from_slice(&k));
            let mut expected = GenericArray::clone_from_slice(&pt);
            reference.encrypt_block(&mut expected);

            let ours = encrypt_block(&pt, &key_schedule(&k));
            assert_eq!(&ours[..], expected.as_slice());
        }
    }

    #[test]
    fn test_debug_hides_round_keys() {
        let key = key_schedule(&[0xffu8; 16]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("rounds"));
        assert!(!dbg.contains("255"));
    }
}
