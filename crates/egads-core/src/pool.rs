//! Thread-safe entropy accumulator and extractor.
//!
//! Architecture:
//! 1. Sources register once and receive a [`SourceId`]
//! 2. Before keying, submitted bytes only feed a SHA-1 startup hash
//! 3. [`EntropyPool::startup_done`] turns that hash into the first MAC key
//! 4. After keying, bytes are mixed into a running [`MacEngine`] and each
//!    source's bit estimate is credited (clamped per source)
//! 5. When the discounted credit total exceeds one tag, the MAC is
//!    finalized and the tag goes to the output ring or the rekey spool
//! 6. Readers drain the ring, optionally blocking on a condition variable
//!
//! All state lives behind one mutex: mixing order changes the tag, so
//! `add_entropy` calls are fully serialized.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha1::{Digest, Sha1};
use zeroize::Zeroize;

use crate::error::PoolError;
use crate::mac::{KEY_LEN, MacEngine, TAG_LEN};
use crate::ring::OutputRing;

/// Source table capacity.
#[cfg(not(windows))]
pub const NUM_SOURCES: usize = 7;
#[cfg(windows)]
pub const NUM_SOURCES: usize = 3;

/// Per-source credit ceiling in bits.
pub const MAX_CREDIT: u32 = 70;

/// How many of the largest credits are ignored when judging readiness.
pub const NUM_COMP_SRCS: usize = 1;

/// Output ring capacity in tags.
pub const RING_TAGS: usize = 31;

/// Out of every `EPOOL_OUTD` extractions, the last `EPOOL_OUTN` go to the
/// spool even when the ring has room.
pub const EPOOL_OUTD: u32 = 10;
pub const EPOOL_OUTN: u32 = 1;

pub const SPOOL_SIZE: usize = 32;
pub const SPOOL_THRESH_START: u32 = 8;
pub const SPOOL_THRESH_MAX: u32 = 1024;

const TAG_BITS: u32 = (TAG_LEN * 8) as u32;

/// Handle returned by [`EntropyPool::register_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(usize);

impl SourceId {
    /// Wrap a raw slot index. Validity is checked on use.
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an extracted tag was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Ring,
    Spool,
}

/// Sum of credits minus the `NUM_COMP_SRCS` largest ones.
pub fn discounted_credit(credits: &[u32]) -> u32 {
    let mut sorted = credits.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.iter().skip(NUM_COMP_SRCS).sum()
}

/// Point-in-time view of pool bookkeeping. Contains no key material.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub keyed: bool,
    pub registered: usize,
    pub credits: Vec<u32>,
    pub buffered: usize,
    pub ring_capacity: usize,
    pub extractions: u64,
    pub spool_deposits: u64,
    pub spool_rekeys: u64,
    pub spool_threshold: u32,
}

struct PoolState {
    credits: [u32; NUM_SOURCES],
    registered: usize,
    key: [u8; KEY_LEN],
    mac: MacEngine,
    msgid: u64,
    keyed: bool,
    startup: Sha1,
    ring: OutputRing,
    spool: [u8; SPOOL_SIZE],
    spool_pos: usize,
    slow_count: u32,
    slow_threshold: u32,
    out_counter: u32,
    extractions: u64,
    spool_deposits: u64,
    spool_rekeys: u64,
}

impl PoolState {
    fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            credits: [0; NUM_SOURCES],
            registered: 0,
            mac: MacEngine::new(&key),
            key,
            msgid: 0,
            keyed: false,
            startup: Sha1::new(),
            ring: OutputRing::new(RING_TAGS * TAG_LEN),
            spool: [0; SPOOL_SIZE],
            spool_pos: 0,
            slow_count: 0,
            slow_threshold: SPOOL_THRESH_START,
            out_counter: 0,
            extractions: 0,
            spool_deposits: 0,
            spool_rekeys: 0,
        }
    }

    fn check_source(&self, src: SourceId) -> Result<usize, PoolError> {
        if src.0 < self.registered {
            Ok(src.0)
        } else {
            Err(PoolError::InvalidSource(src.0))
        }
    }

    fn set_key(&mut self, key: [u8; KEY_LEN]) {
        self.key.zeroize();
        self.key = key;
        self.mac = MacEngine::new(&self.key);
    }

    fn extract(&mut self) -> Destination {
        let tag = self.mac.finalize(&self.msgid.to_be_bytes());
        self.msgid = self.msgid.wrapping_add(1);
        self.credits = [0; NUM_SOURCES];
        self.extractions += 1;
        self.out_counter = self.out_counter % EPOOL_OUTD + 1;

        let duty_slow = self.out_counter > EPOOL_OUTD - EPOOL_OUTN;
        let dest = if !self.keyed || self.ring.free() < TAG_LEN || duty_slow {
            self.deposit_spool(&tag);
            Destination::Spool
        } else {
            self.ring.push(&tag);
            Destination::Ring
        };
        log::debug!(
            "extraction {} -> {:?} (ring {}/{})",
            self.extractions,
            dest,
            self.ring.len(),
            self.ring.capacity()
        );
        dest
    }

    fn deposit_spool(&mut self, tag: &[u8]) {
        for &b in tag {
            self.spool[self.spool_pos] ^= b;
            self.spool_pos = (self.spool_pos + 1) % SPOOL_SIZE;
        }
        self.spool_deposits += 1;
        // Counted before the check: the threshold-th deposit itself rekeys.
        self.slow_count += 1;
        if self.slow_count >= self.slow_threshold {
            self.rekey_from_spool();
        }
    }

    fn rekey_from_spool(&mut self) {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&self.spool[..KEY_LEN]);
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.spool[KEY_LEN..KEY_LEN + 8]);
        self.set_key(key);
        key.zeroize();
        self.msgid = u64::from_be_bytes(id);
        self.spool_pos = 0;
        self.slow_count = 0;
        self.slow_threshold = (self.slow_threshold * 2).min(SPOOL_THRESH_MAX);
        self.spool_rekeys += 1;
        log::info!(
            "pool rekeyed from spool (next threshold {})",
            self.slow_threshold
        );
    }
}

impl Drop for PoolState {
    fn drop(&mut self) {
        self.key.zeroize();
        self.spool.zeroize();
        self.msgid = 0;
    }
}

/// Entropy pool shared by producer threads and output readers.
pub struct EntropyPool {
    state: Mutex<PoolState>,
    available: Condvar,
}

impl Default for EntropyPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntropyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EntropyPool").field(&self.stats()).finish()
    }
}

impl EntropyPool {
    /// Create an unkeyed pool with a throwaway key from the OS generator.
    pub fn new() -> Self {
        Self::with_initial_key(throwaway_key())
    }

    /// Create an unkeyed pool with a caller-chosen placeholder key.
    pub fn with_initial_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            state: Mutex::new(PoolState::new(key)),
            available: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the next source slot.
    pub fn register_source(&self) -> Result<SourceId, PoolError> {
        let mut st = self.state();
        if st.registered >= NUM_SOURCES {
            return Err(PoolError::SourceTableFull(NUM_SOURCES));
        }
        let id = SourceId(st.registered);
        st.registered += 1;
        Ok(id)
    }

    /// Submit a sample with an estimate of the entropy it carries, in bits.
    pub fn add_entropy(
        &self,
        src: SourceId,
        data: &[u8],
        estimated_bits: u32,
    ) -> Result<(), PoolError> {
        let mut st = self.state();
        let idx = st.check_source(src)?;

        if !st.keyed {
            st.startup.update(data);
            return Ok(());
        }

        st.credits[idx] = st.credits[idx].saturating_add(estimated_bits).min(MAX_CREDIT);
        st.mac.update(data);

        if discounted_credit(&st.credits) > TAG_BITS && st.extract() == Destination::Ring {
            self.available.notify_all();
        }
        Ok(())
    }

    /// Derive the real key from the startup hash and the placeholder key.
    pub fn startup_done(&self) -> Result<(), PoolError> {
        let mut st = self.state();
        if st.keyed {
            return Err(PoolError::AlreadyKeyed);
        }
        let mut hasher = std::mem::replace(&mut st.startup, Sha1::new());
        hasher.update(st.key);
        let mut digest: [u8; 20] = hasher.finalize().into();

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest[..KEY_LEN]);
        let mut id = [0u8; 4];
        id.copy_from_slice(&digest[KEY_LEN..KEY_LEN + 4]);
        digest.zeroize();

        st.set_key(key);
        key.zeroize();
        st.msgid = u32::from_be_bytes(id) as u64;
        st.keyed = true;
        log::info!("entropy pool keyed");
        Ok(())
    }

    /// Copy extracted bytes into `buf`.
    ///
    /// Non-blocking: returns whatever is buffered, possibly 0. Blocking:
    /// waits until all of `buf` is filled. An unkeyed pool with nothing
    /// buffered returns 0 immediately in both modes.
    pub fn output(&self, buf: &mut [u8], blocking: bool) -> usize {
        let mut st = self.state();
        if !st.keyed && st.ring.is_empty() {
            return 0;
        }
        if !blocking {
            return st.ring.pop_into(buf);
        }

        let mut done = 0;
        while done < buf.len() {
            while st.ring.is_empty() {
                st = self
                    .available
                    .wait(st)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            done += st.ring.pop_into(&mut buf[done..]);
        }
        done
    }

    /// Blocking output that gives up after `timeout`, returning the bytes
    /// delivered so far.
    pub fn output_timeout(&self, buf: &mut [u8], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut st = self.state();
        if !st.keyed && st.ring.is_empty() {
            return 0;
        }

        let mut done = 0;
        while done < buf.len() {
            while st.ring.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return done;
                }
                st = self
                    .available
                    .wait_timeout(st, remaining)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            done += st.ring.pop_into(&mut buf[done..]);
        }
        done
    }

    /// 1.0 when output is ready; otherwise discounted credit over tag bits.
    pub fn entropy_level(&self) -> f64 {
        let st = self.state();
        if st.keyed && !st.ring.is_empty() {
            1.0
        } else {
            discounted_credit(&st.credits) as f64 / TAG_BITS as f64
        }
    }

    pub fn is_keyed(&self) -> bool {
        self.state().keyed
    }

    /// Write the raw key bytes.
    pub fn save_state<W: Write>(&self, mut writer: W) -> Result<(), PoolError> {
        let st = self.state();
        writer.write_all(&st.key)?;
        writer.flush()?;
        Ok(())
    }

    /// Replace the key with bytes previously written by [`save_state`].
    ///
    /// Before keying, the restored key is folded into the first real key
    /// by [`startup_done`]. After keying, the MAC is rekeyed directly. On
    /// any failure the current key is kept.
    ///
    /// [`save_state`]: Self::save_state
    /// [`startup_done`]: Self::startup_done
    pub fn restore_state<R: Read>(&self, mut reader: R) -> Result<(), PoolError> {
        let mut key = [0u8; KEY_LEN];
        let mut got = 0;
        while got < KEY_LEN {
            match reader.read(&mut key[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    key.zeroize();
                    return Err(e.into());
                }
            }
        }
        if got < KEY_LEN {
            key.zeroize();
            return Err(PoolError::ShortState {
                expected: KEY_LEN,
                actual: got,
            });
        }

        let mut st = self.state();
        if st.keyed {
            st.set_key(key);
        } else {
            st.key.zeroize();
            st.key = key;
        }
        key.zeroize();
        log::info!("restored pool key material");
        Ok(())
    }

    /// [`save_state`](Self::save_state) to a file, created owner-only.
    pub fn save_to_path(&self, path: &Path) -> Result<(), PoolError> {
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let file = opts.open(path)?;
        self.save_state(file)?;
        log::info!("saved pool state to {}", path.display());
        Ok(())
    }

    /// [`restore_state`](Self::restore_state) from a file.
    pub fn restore_from_path(&self, path: &Path) -> Result<(), PoolError> {
        let file = std::fs::File::open(path)?;
        self.restore_state(file)
    }

    pub fn stats(&self) -> PoolStats {
        let st = self.state();
        PoolStats {
            keyed: st.keyed,
            registered: st.registered,
            credits: st.credits[..st.registered].to_vec(),
            buffered: st.ring.len(),
            ring_capacity: st.ring.capacity(),
            extractions: st.extractions,
            spool_deposits: st.spool_deposits,
            spool_rekeys: st.spool_rekeys,
            spool_threshold: st.slow_threshold,
        }
    }
}

/// Placeholder key for a fresh pool.
///
/// Falls back to hashing the clock and pid if the OS generator is
/// unavailable; the key only covers mixing before `startup_done`.
fn throwaway_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    if let Err(e) = getrandom::fill(&mut key) {
        log::warn!("OS random source unavailable ({e}), using clock-derived placeholder key");
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut h = Sha1::new();
        h.update(now.to_le_bytes());
        h.update(std::process::id().to_le_bytes());
        let digest: [u8; 20] = h.finalize().into();
        key.copy_from_slice(&digest[..KEY_LEN]);
    }
    key
}
