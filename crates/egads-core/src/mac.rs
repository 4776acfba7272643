//! Keyed, resettable message authentication code built from the universal
//! hash and the PDF mask. The pool also uses it as its entropy extractor.

use crate::cipher::key_schedule;
use crate::pdf::{NONCE_LEN, Pdf};
use crate::uhash::UHash;

/// Root key length (AES-128).
pub const KEY_LEN: usize = 16;

/// Tag length in bytes.
pub const TAG_LEN: usize = 8;

pub type Tag = [u8; TAG_LEN];
pub type Nonce = [u8; NONCE_LEN];

/// Incremental MAC context.
///
/// `finalize` always resets the context, so one engine produces a sequence
/// of independent tags. Callers must never reuse a nonce under one key.
#[derive(Clone)]
pub struct MacEngine {
    uhash: UHash,
    pdf: Pdf,
}

impl std::fmt::Debug for MacEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacEngine")
            .field("buffered", &self.uhash.message_len())
            .finish_non_exhaustive()
    }
}

impl MacEngine {
    /// Derive all hash and mask keys from one root key.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let root = key_schedule(key);
        Self {
            uhash: UHash::new(&root),
            pdf: Pdf::new(&root),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.uhash.update(data);
    }

    /// Produce the tag for everything updated since the last reset.
    pub fn finalize(&mut self, nonce: &Nonce) -> Tag {
        let mut tag = self.uhash.finalize();
        self.pdf.mask_xor(nonce, &mut tag);
        tag
    }

    /// Discard buffered message state without producing a tag.
    pub fn reset(&mut self) {
        self.uhash.reset();
    }

    /// Reset, absorb `msg` and finalize in one call.
    pub fn tag(&mut self, msg: &[u8], nonce: &Nonce) -> Tag {
        self.reset();
        self.update(msg);
        self.finalize(nonce)
    }

    /// Bytes absorbed since the last finalize or reset.
    pub fn buffered(&self) -> u64 {
        self.uhash.message_len()
    }
}

/// One-shot MAC under a fresh context.
pub fn mac(key: &[u8; KEY_LEN], msg: &[u8], nonce: &Nonce) -> Tag {
    MacEngine::new(key).tag(msg, nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; KEY_LEN] = b"abcdefghijklmnop";

    #[test]
    fn test_deterministic() {
        let nonce = *b"bcdefghi";
        let a = mac(KEY, b"hello world", &nonce);
        let b = mac(KEY, b"hello world", &nonce);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_message_tag() {
        let mut engine = MacEngine::new(KEY);
        let t1 = engine.finalize(&[0; 8]);
        let t2 = engine.finalize(&[0; 8]);
        assert_eq!(t1, t2);
        assert_ne!(t1, [0; TAG_LEN]);
    }

    #[test]
    fn test_finalize_resets() {
        let mut engine = MacEngine::new(KEY);
        engine.update(b"first message");
        let _ = engine.finalize(&[1; 8]);
        assert_eq!(engine.buffered(), 0);
        engine.update(b"second");
        assert_eq!(engine.finalize(&[2; 8]), mac(KEY, b"second", &[2; 8]));
    }

    #[test]
    fn test_reset_discards() {
        let mut engine = MacEngine::new(KEY);
        engine.update(b"junk");
        engine.reset();
        engine.update(b"data");
        assert_eq!(engine.finalize(&[3; 8]), mac(KEY, b"data", &[3; 8]));
    }

    #[test]
    fn test_nonce_and_key_matter() {
        let t = mac(KEY, b"msg", &[0; 8]);
        assert_ne!(t, mac(KEY, b"msg", &[0, 0, 0, 0, 0, 0, 0, 2]));
        assert_ne!(t, mac(b"ABCDEFGHIJKLMNOP", b"msg", &[0; 8]));
    }

    #[test]
    fn test_debug_shows_no_key() {
        let engine = MacEngine::new(KEY);
        let dbg = format!("{engine:?}");
        assert!(dbg.starts_with("MacEngine"));
        assert!(!dbg.contains("abcdefghijklmnop"));
    }
}
