//! Counter-mode deterministic generator.
//!
//! Output is `AES_k(ctr)` with `ctr += step` before every block, where the
//! 128-bit counter and the odd secret step are kept as big-endian limb
//! pairs. The generator reseeds itself from its own keystream every
//! [`GATE_SIZE`] bytes of a single request, every [`MAX_BLOCK_RESEED`]
//! keystream draws, and whenever the process id changes. At the poll
//! interval it pulls fresh seed material through an [`EntropyGatherer`].
//!
//! A `Prng` is not shared between threads; give each user its own.

use std::time::{Duration, Instant};

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{BLOCK_LEN, ExpandedKey, key_schedule};
use crate::error::PrngError;
use crate::mac::KEY_LEN;

/// Seed length: one key plus one step block.
pub const SEED_LEN: usize = KEY_LEN + BLOCK_LEN;

/// Largest span of one request produced under a single key.
pub const GATE_SIZE: usize = 4096;

/// Keystream draws between automatic self-reseeds.
pub const MAX_BLOCK_RESEED: u32 = 1024;

/// Default interval between seed polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Supplier of seed material, usually the entropy daemon.
pub trait EntropyGatherer: Send {
    /// Return `howmuch` bytes, or `None` if nothing could be gathered.
    fn gather(&mut self, howmuch: usize) -> Option<Vec<u8>>;

    /// Dispose of a buffer returned by [`gather`](Self::gather).
    fn release(&mut self, mut buf: Vec<u8>) {
        buf.zeroize();
    }
}

impl<F> EntropyGatherer for F
where
    F: FnMut(usize) -> Option<Vec<u8>> + Send,
{
    fn gather(&mut self, howmuch: usize) -> Option<Vec<u8>> {
        self(howmuch)
    }
}

/// 128-bit counter as two big-endian limbs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Zeroize)]
pub struct Counter128 {
    hi: u64,
    lo: u64,
}

impl Counter128 {
    pub const ZERO: Self = Self { hi: 0, lo: 0 };

    pub fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    pub fn from_be_bytes(b: [u8; 16]) -> Self {
        let mut hi = [0u8; 8];
        let mut lo = [0u8; 8];
        hi.copy_from_slice(&b[..8]);
        lo.copy_from_slice(&b[8..]);
        Self {
            hi: u64::from_be_bytes(hi),
            lo: u64::from_be_bytes(lo),
        }
    }

    pub fn to_be_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.hi.to_be_bytes());
        out[8..].copy_from_slice(&self.lo.to_be_bytes());
        out
    }

    /// Add with carry from the low limb; overflow of the high limb wraps.
    pub fn add(&mut self, step: Self) {
        let (lo, carry) = self.lo.overflowing_add(step.lo);
        self.lo = lo;
        self.hi = self.hi.wrapping_add(step.hi).wrapping_add(carry as u64);
    }

    fn force_odd(&mut self) {
        self.lo |= 1;
    }
}

pub struct Prng {
    key: ExpandedKey,
    ctr: Counter128,
    step: Counter128,
    leftover: [u8; BLOCK_LEN],
    leftover_len: usize,
    draws: u32,
    pid: u32,
    poll_interval: Duration,
    next_poll: Instant,
    gatherer: Option<Box<dyn EntropyGatherer>>,
    pub(crate) gauss_next: Option<f64>,
}

impl std::fmt::Debug for Prng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prng")
            .field("draws", &self.draws)
            .field("pid", &self.pid)
            .field("poll_interval", &self.poll_interval)
            .field("has_gatherer", &self.gatherer.is_some())
            .finish_non_exhaustive()
    }
}

impl Prng {
    /// Create a generator from a [`SEED_LEN`]-byte seed.
    pub fn new(seed: &[u8], poll_interval: Duration) -> Result<Self, PrngError> {
        check_seed(seed)?;
        let mut prng = Self {
            key: key_schedule(&[0u8; KEY_LEN]),
            ctr: Counter128::ZERO,
            step: Counter128::new(0, 1),
            leftover: [0; BLOCK_LEN],
            leftover_len: 0,
            draws: 0,
            pid: std::process::id(),
            poll_interval,
            next_poll: Instant::now() + poll_interval,
            gatherer: None,
            gauss_next: None,
        };
        prng.rekey(seed)?;
        Ok(prng)
    }

    /// Seed from `gatherer` and keep it for periodic polls.
    pub fn from_gatherer(
        mut gatherer: Box<dyn EntropyGatherer>,
        poll_interval: Duration,
    ) -> Result<Self, PrngError> {
        let seed = gatherer.gather(SEED_LEN).ok_or(PrngError::GatherFailed)?;
        let result = Self::new(&seed, poll_interval);
        gatherer.release(seed);
        let mut prng = result?;
        prng.gatherer = Some(gatherer);
        Ok(prng)
    }

    /// Install or replace the seed source used at poll time.
    pub fn set_gatherer(&mut self, gatherer: Box<dyn EntropyGatherer>) {
        self.gatherer = Some(gatherer);
    }

    /// Mix `seed` with fresh keystream to form a new key and step.
    pub fn rekey(&mut self, seed: &[u8]) -> Result<(), PrngError> {
        check_seed(seed)?;
        self.discard_leftover();

        let mut key = [0u8; KEY_LEN];
        self.fill_blocks(&mut key);
        xor_into(&mut key, &seed[..KEY_LEN]);
        self.key = key_schedule(&key);
        key.zeroize();

        let mut step = [0u8; BLOCK_LEN];
        self.fill_blocks(&mut step);
        xor_into(&mut step, &seed[KEY_LEN..]);
        self.set_step(step);
        step.zeroize();
        Ok(())
    }

    /// Fill `buf` with generator output.
    pub fn output(&mut self, buf: &mut [u8]) {
        let pid = std::process::id();
        if pid != self.pid {
            log::debug!("process id changed ({} -> {pid}), reseeding", self.pid);
            self.self_reseed();
            self.pid = pid;
        }

        let mut rest = buf;
        while rest.len() > GATE_SIZE {
            let (head, tail) = rest.split_at_mut(GATE_SIZE);
            self.keystream(head);
            self.self_reseed();
            rest = tail;
        }
        self.keystream(rest);
        self.poll();
    }

    /// Wipe all state. The generator is consumed.
    pub fn destroy(self) {
        drop(self);
    }

    /// Fetch raw bytes straight from the gatherer, bypassing the generator.
    pub fn entropy(&mut self, buf: &mut [u8]) -> Result<(), PrngError> {
        let gatherer = self.gatherer.as_mut().ok_or(PrngError::GatherFailed)?;
        let got = gatherer.gather(buf.len()).ok_or(PrngError::GatherFailed)?;
        let ok = got.len() >= buf.len();
        if ok {
            buf.copy_from_slice(&got[..buf.len()]);
        }
        gatherer.release(got);
        if ok { Ok(()) } else { Err(PrngError::GatherFailed) }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Keystream for callers; counts toward the self-reseed cadence.
    fn keystream(&mut self, out: &mut [u8]) {
        self.fill_blocks(out);
        self.draws += 1;
        if self.draws >= MAX_BLOCK_RESEED {
            self.self_reseed();
        }
    }

    /// Raw keystream: cached tail bytes first, then fresh blocks. The unused
    /// tail of the last block is cached.
    fn fill_blocks(&mut self, out: &mut [u8]) {
        let mut filled = 0;
        if self.leftover_len > 0 {
            let n = self.leftover_len.min(out.len());
            let start = BLOCK_LEN - self.leftover_len;
            out[..n].copy_from_slice(&self.leftover[start..start + n]);
            self.leftover[start..start + n].zeroize();
            self.leftover_len -= n;
            filled = n;
        }
        while filled < out.len() {
            self.ctr.add(self.step);
            let mut block = self.ctr.to_be_bytes();
            self.key.encrypt_in_place(&mut block);
            let n = BLOCK_LEN.min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&block[..n]);
            if n < BLOCK_LEN {
                self.leftover = block;
                self.leftover[..n].zeroize();
                self.leftover_len = BLOCK_LEN - n;
            }
            block.zeroize();
            filled += n;
        }
    }

    /// New key and step from the current keystream alone.
    fn self_reseed(&mut self) {
        self.discard_leftover();
        self.draws = 0;

        let mut key = [0u8; KEY_LEN];
        self.fill_blocks(&mut key);
        self.key = key_schedule(&key);
        key.zeroize();

        let mut step = [0u8; BLOCK_LEN];
        self.fill_blocks(&mut step);
        self.set_step(step);
        step.zeroize();
    }

    fn set_step(&mut self, step: [u8; BLOCK_LEN]) {
        self.step = Counter128::from_be_bytes(step);
        self.step.force_odd();
        self.ctr = Counter128::ZERO;
        self.draws = 0;
    }

    fn discard_leftover(&mut self) {
        self.leftover.zeroize();
        self.leftover_len = 0;
    }

    fn poll(&mut self) {
        let now = Instant::now();
        if now < self.next_poll {
            return;
        }
        self.next_poll = now + self.poll_interval;

        let Some(mut gatherer) = self.gatherer.take() else {
            return;
        };
        match gatherer.gather(SEED_LEN) {
            Some(seed) => {
                if let Err(e) = self.rekey(&seed) {
                    log::warn!("ignoring gathered seed: {e}");
                }
                gatherer.release(seed);
            }
            None => log::warn!("entropy gatherer returned nothing, keeping current key"),
        }
        self.gatherer = Some(gatherer);
    }
}

impl Drop for Prng {
    fn drop(&mut self) {
        self.ctr.zeroize();
        self.step.zeroize();
        self.leftover.zeroize();
        self.gauss_next = None;
    }
}

impl ZeroizeOnDrop for Prng {}

impl rand::RngCore for Prng {
    fn next_u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        self.output(&mut b);
        u32::from_be_bytes(b)
    }

    fn next_u64(&mut self) -> u64 {
        let mut b = [0u8; 8];
        self.output(&mut b);
        u64::from_be_bytes(b)
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.output(dst);
    }
}

impl rand::CryptoRng for Prng {}

fn check_seed(seed: &[u8]) -> Result<(), PrngError> {
    if seed.len() != SEED_LEN {
        return Err(PrngError::SeedLength {
            expected: SEED_LEN,
            actual: seed.len(),
        });
    }
    Ok(())
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
