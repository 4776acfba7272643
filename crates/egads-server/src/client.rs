//! Client side of the socket protocols.
//!
//! [`Client`] is the async API used by the command-line tool.
//! [`SocketGatherer`] is the synchronous seed source a
//! [`Prng`](egads_core::Prng) polls; when the daemon cannot be reached it
//! falls back to reading a random device directly.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use egads_core::EntropyGatherer;

use crate::error::ProtocolError;
use crate::protocol::{EgadsRequest, EgdRequest};

pub const DEFAULT_FALLBACK: &str = "/dev/random";

/// How long [`SocketGatherer`] waits on the daemon before falling back.
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Async connection to a running daemon.
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(path: &Path) -> Result<Self, ProtocolError> {
        Ok(Self {
            stream: UnixStream::connect(path).await?,
        })
    }

    /// EGADS: read `n` bytes, blocking until the pool can supply them.
    pub async fn fetch(&mut self, n: u32) -> Result<Vec<u8>, ProtocolError> {
        self.stream
            .write_all(&EgadsRequest::Entropy(n).encode())
            .await?;
        let mut buf = vec![0u8; n as usize];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// EGADS: pool level in bits of one tag.
    pub async fn level(&mut self) -> Result<u32, ProtocolError> {
        self.stream.write_all(&EgadsRequest::Level.encode()).await?;
        Ok(self.stream.read_u32().await?)
    }

    /// EGD: pool level in bits.
    pub async fn egd_level(&mut self) -> Result<u32, ProtocolError> {
        self.stream.write_all(&EgdRequest::Level.encode()).await?;
        Ok(self.stream.read_u32().await?)
    }

    /// EGD: submit external entropy. Data beyond 255 bytes is sent in
    /// further requests; `bits` is credited to the first one only.
    pub async fn egd_add(&mut self, bits: u16, data: &[u8]) -> Result<(), ProtocolError> {
        let mut bits = bits;
        for chunk in data.chunks(u8::MAX as usize) {
            let req = EgdRequest::Add {
                bits,
                data: chunk.to_vec(),
            };
            self.stream.write_all(&req.encode()).await?;
            bits = 0;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// EGD: read whatever is buffered, up to `n` bytes.
    pub async fn egd_read_nonblocking(&mut self, n: u8) -> Result<Vec<u8>, ProtocolError> {
        self.stream
            .write_all(&EgdRequest::ReadNonBlocking(n).encode())
            .await?;
        let count = self.stream.read_u8().await? as usize;
        let mut buf = vec![0u8; count];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// EGD: the daemon's process id.
    pub async fn egd_pid(&mut self) -> Result<u32, ProtocolError> {
        self.stream.write_all(&EgdRequest::Pid.encode()).await?;
        let len = self.stream.read_u8().await? as usize;
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        String::from_utf8_lossy(&buf).trim().parse().map_err(|_| {
            ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "malformed pid reply",
            ))
        })
    }
}

/// Seed source for the generator: the daemon socket, else a random device.
#[derive(Debug, Clone)]
pub struct SocketGatherer {
    socket: PathBuf,
    fallback: PathBuf,
    timeout: Duration,
}

impl SocketGatherer {
    pub fn new<P: Into<PathBuf>>(socket: P) -> Self {
        Self {
            socket: socket.into(),
            fallback: PathBuf::from(DEFAULT_FALLBACK),
            timeout: DEFAULT_GATHER_TIMEOUT,
        }
    }

    /// Give up on the daemon after `timeout`, e.g. while its pool is still
    /// unkeyed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback<P: Into<PathBuf>>(mut self, fallback: P) -> Self {
        self.fallback = fallback.into();
        self
    }

    fn from_socket(&self, howmuch: usize) -> std::io::Result<Vec<u8>> {
        let n = u32::try_from(howmuch)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "request too large"))?;
        let mut stream = std::os::unix::net::UnixStream::connect(&self.socket)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.write_all(&EgadsRequest::Entropy(n).encode())?;
        let mut buf = vec![0u8; howmuch];
        stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn from_fallback(&self, howmuch: usize) -> std::io::Result<Vec<u8>> {
        let mut f = std::fs::File::open(&self.fallback)?;
        let mut buf = vec![0u8; howmuch];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl EntropyGatherer for SocketGatherer {
    fn gather(&mut self, howmuch: usize) -> Option<Vec<u8>> {
        match self.from_socket(howmuch) {
            Ok(buf) => return Some(buf),
            Err(e) => log::debug!("daemon at {} unavailable: {e}", self.socket.display()),
        }
        match self.from_fallback(howmuch) {
            Ok(buf) => {
                log::info!("seeded from fallback {}", self.fallback.display());
                Some(buf)
            }
            Err(e) => {
                log::warn!("fallback {} failed: {e}", self.fallback.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use egads_core::pool::MAX_CREDIT;
    use egads_core::{EntropyPool, Prng, SEED_LEN};

    use crate::protocol::ServerContext;
    use crate::server::{Dialect, EntropyServer};

    fn filled_pool(tags: usize) -> Arc<EntropyPool> {
        let pool = Arc::new(EntropyPool::new());
        let a = pool.register_source().unwrap();
        let b = pool.register_source().unwrap();
        pool.startup_done().unwrap();
        while pool.stats().buffered < tags * egads_core::TAG_LEN {
            pool.add_entropy(a, b"a", MAX_CREDIT).unwrap();
            pool.add_entropy(b, b"b", MAX_CREDIT).unwrap();
        }
        pool
    }

    #[test]
    fn test_gatherer_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("random");
        std::fs::write(&fallback, [9u8; 64]).unwrap();

        let mut g = SocketGatherer::new(dir.path().join("missing.sock")).with_fallback(&fallback);
        assert_eq!(g.gather(SEED_LEN), Some(vec![9u8; SEED_LEN]));
    }

    #[test]
    fn test_gatherer_fails_without_any_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = SocketGatherer::new(dir.path().join("missing.sock"))
            .with_fallback(dir.path().join("missing-device"));
        assert_eq!(g.gather(8), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_and_gatherer_against_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("egads.sock");
        let pool = filled_pool(10);
        let external = egads_core::SourceId::from_index(1);
        let ctx = Arc::new(ServerContext::new(Arc::clone(&pool), external));
        let server = EntropyServer::bind(&path, Dialect::Egads, ctx).unwrap();
        tokio::spawn(server.run());

        let mut client = Client::connect(&path).await.unwrap();
        assert_eq!(client.level().await.unwrap(), 64);
        assert_eq!(client.fetch(16).await.unwrap().len(), 16);

        let gather_path = path.clone();
        let prng = tokio::task::spawn_blocking(move || {
            let g = SocketGatherer::new(gather_path).with_fallback("/nonexistent");
            Prng::from_gatherer(Box::new(g), std::time::Duration::from_secs(60))
        })
        .await
        .unwrap();
        assert!(prng.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_gatherer_never_seeds_from_unkeyed_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("egads.sock");
        let fallback = dir.path().join("random");
        std::fs::write(&fallback, [9u8; 64]).unwrap();

        let pool = Arc::new(EntropyPool::new());
        pool.register_source().unwrap();
        let external = pool.register_source().unwrap();
        let ctx = Arc::new(ServerContext::new(pool, external));
        let server = EntropyServer::bind(&path, Dialect::Egads, ctx).unwrap();
        tokio::spawn(server.run());

        let seed = tokio::task::spawn_blocking(move || {
            SocketGatherer::new(path)
                .with_fallback(fallback)
                .with_timeout(Duration::from_millis(300))
                .gather(SEED_LEN)
        })
        .await
        .unwrap();
        assert_eq!(seed, Some(vec![9u8; SEED_LEN]));
    }

    #[tokio::test]
    async fn test_egd_client_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("egd.sock");
        let pool = filled_pool(1);
        let external = egads_core::SourceId::from_index(1);
        let ctx = Arc::new(ServerContext::new(Arc::clone(&pool), external));
        let server = EntropyServer::bind(&path, Dialect::Egd, ctx).unwrap();
        tokio::spawn(server.run());

        let mut client = Client::connect(&path).await.unwrap();
        assert_eq!(client.egd_pid().await.unwrap(), std::process::id());
        client.egd_add(12, &[1u8; 300]).await.unwrap();
        assert_eq!(client.egd_level().await.unwrap(), 64);
        let got = client.egd_read_nonblocking(255).await.unwrap();
        assert_eq!(got.len(), egads_core::TAG_LEN);
    }
}
