//! Request framing and per-connection handlers for the EGADS and EGD
//! socket protocols.
//!
//! EGADS (native):
//!
//! | command | request body        | reply                          |
//! |---------|---------------------|--------------------------------|
//! | `0x01`  | u32 BE byte count N | N bytes, blocking              |
//! | `0x02`  | none                | u32 BE entropy level in bits   |
//!
//! EGD (compatibility):
//!
//! | command | request body                  | reply                      |
//! |---------|-------------------------------|----------------------------|
//! | `0x00`  | none                          | u32 BE entropy level, bits |
//! | `0x01`  | u8 N                          | u8 count, then count bytes |
//! | `0x02`  | u8 N                          | N bytes, blocking          |
//! | `0x03`  | u16 BE bits, u8 len, len bytes | none                      |
//! | `0x04`  | none                          | u8 len, pid as ASCII       |
//!
//! Blocking reads stream bytes as the pool extracts them and send nothing
//! while it is unkeyed. A reader whose peer hangs up stops waiting within
//! one wait slice, and at most [`MAX_BLOCKED_READERS`] wait at once.

use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use zeroize::Zeroize;

use egads_core::{EntropyPool, SourceId, TAG_LEN};

use crate::error::ProtocolError;

/// Largest single EGADS request served.
pub const MAX_REQUEST: usize = 1 << 16;

/// Blocking reads allowed to wait on the pool at once.
pub const MAX_BLOCKED_READERS: usize = 64;

/// Longest a blocking read waits on the pool before checking the peer.
const WAIT_SLICE: Duration = Duration::from_millis(200);

pub mod egads {
    pub const REQ_ENTROPY: u8 = 0x01;
    pub const REQ_LEVEL: u8 = 0x02;
}

pub mod egd {
    pub const REQ_LEVEL: u8 = 0x00;
    pub const REQ_ENTROPY_NB: u8 = 0x01;
    pub const REQ_ENTROPY: u8 = 0x02;
    pub const ADD_ENTROPY: u8 = 0x03;
    pub const REQ_PID: u8 = 0x04;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgadsRequest {
    Entropy(u32),
    Level,
}

impl EgadsRequest {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Entropy(n) => {
                let mut v = vec![egads::REQ_ENTROPY];
                v.extend_from_slice(&n.to_be_bytes());
                v
            }
            Self::Level => vec![egads::REQ_LEVEL],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgdRequest {
    Level,
    ReadNonBlocking(u8),
    ReadBlocking(u8),
    Add { bits: u16, data: Vec<u8> },
    Pid,
}

impl EgdRequest {
    /// Wire form. `Add` payloads longer than 255 bytes are truncated.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Level => vec![egd::REQ_LEVEL],
            Self::ReadNonBlocking(n) => vec![egd::REQ_ENTROPY_NB, *n],
            Self::ReadBlocking(n) => vec![egd::REQ_ENTROPY, *n],
            Self::Add { bits, data } => {
                let len = data.len().min(u8::MAX as usize);
                let mut v = vec![egd::ADD_ENTROPY];
                v.extend_from_slice(&bits.to_be_bytes());
                v.push(len as u8);
                v.extend_from_slice(&data[..len]);
                v
            }
            Self::Pid => vec![egd::REQ_PID],
        }
    }
}

/// Pool level as whole bits of one tag (`level * 64`).
pub fn level_bits(pool: &EntropyPool) -> u32 {
    (pool.entropy_level() * (TAG_LEN * 8) as f64) as u32
}

/// Read the command byte. `None` on a clean end of stream.
async fn read_command<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<u8>, ProtocolError> {
    let mut cmd = [0u8; 1];
    match r.read_exact(&mut cmd).await {
        Ok(_) => Ok(Some(cmd[0])),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn read_egads_request<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Option<EgadsRequest>, ProtocolError> {
    let Some(cmd) = read_command(r).await? else {
        return Ok(None);
    };
    match cmd {
        egads::REQ_ENTROPY => Ok(Some(EgadsRequest::Entropy(r.read_u32().await?))),
        egads::REQ_LEVEL => Ok(Some(EgadsRequest::Level)),
        other => Err(ProtocolError::UnknownCommand(other)),
    }
}

pub async fn read_egd_request<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Option<EgdRequest>, ProtocolError> {
    let Some(cmd) = read_command(r).await? else {
        return Ok(None);
    };
    let req = match cmd {
        egd::REQ_LEVEL => EgdRequest::Level,
        egd::REQ_ENTROPY_NB => EgdRequest::ReadNonBlocking(r.read_u8().await?),
        egd::REQ_ENTROPY => EgdRequest::ReadBlocking(r.read_u8().await?),
        egd::ADD_ENTROPY => {
            let bits = r.read_u16().await?;
            let len = r.read_u8().await? as usize;
            let mut data = vec![0u8; len];
            r.read_exact(&mut data).await?;
            EgdRequest::Add { bits, data }
        }
        egd::REQ_PID => EgdRequest::Pid,
        other => return Err(ProtocolError::UnknownCommand(other)),
    };
    Ok(Some(req))
}

/// What a connection handler needs from the daemon.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub pool: Arc<EntropyPool>,
    /// Slot credited for `ADD_ENTROPY` submissions.
    pub external: SourceId,
    pub pid: u32,
    readers: Arc<Semaphore>,
}

impl ServerContext {
    pub fn new(pool: Arc<EntropyPool>, external: SourceId) -> Self {
        Self {
            pool,
            external,
            pid: std::process::id(),
            readers: Arc::new(Semaphore::new(MAX_BLOCKED_READERS)),
        }
    }
}

/// One bounded pool read on the blocking thread pool. A zero `wait` is a
/// non-blocking read.
async fn pool_output(
    pool: &Arc<EntropyPool>,
    len: usize,
    wait: Duration,
) -> Result<(Vec<u8>, usize), ProtocolError> {
    let pool = Arc::clone(pool);
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; len];
        let n = if wait.is_zero() {
            pool.output(&mut buf, false)
        } else {
            pool.output_timeout(&mut buf, wait)
        };
        (buf, n)
    })
    .await
    .map_err(|e| ProtocolError::Io(std::io::Error::other(e)))
}

/// True once the peer has hung up. Pipelined requests already buffered
/// count as a live peer and are left unread.
async fn peer_closed<R: AsyncBufRead + Unpin>(r: &mut R) -> bool {
    std::future::poll_fn(|cx| match Pin::new(&mut *r).poll_fill_buf(cx) {
        Poll::Ready(Ok(buf)) => Poll::Ready(buf.is_empty()),
        Poll::Ready(Err(_)) => Poll::Ready(true),
        Poll::Pending => Poll::Ready(false),
    })
    .await
}

/// Stream exactly `len` extracted bytes to the peer, waiting as long as it
/// takes. Nothing is sent while the pool is unkeyed, and the wait ends
/// with [`ProtocolError::Closed`] once the peer goes away.
async fn send_blocking<S>(
    stream: &mut BufReader<S>,
    ctx: &ServerContext,
    len: usize,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _permit = ctx
        .readers
        .acquire()
        .await
        .map_err(|_| ProtocolError::Closed)?;
    let mut sent = 0;
    while sent < len {
        if ctx.pool.is_keyed() {
            let (mut chunk, got) = pool_output(&ctx.pool, len - sent, WAIT_SLICE).await?;
            let result = if got > 0 {
                send(stream, &chunk[..got]).await
            } else {
                Ok(())
            };
            chunk.zeroize();
            result?;
            sent += got;
            if sent == len {
                break;
            }
        } else {
            tokio::time::sleep(WAIT_SLICE).await;
        }
        if peer_closed(stream).await {
            log::debug!("reader left after {sent} of {len} bytes");
            return Err(ProtocolError::Closed);
        }
    }
    Ok(())
}

async fn send<W: AsyncWrite + Unpin>(w: &mut W, data: &[u8]) -> Result<(), ProtocolError> {
    w.write_all(data).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
            ProtocolError::Closed
        }
        _ => ProtocolError::Io(e),
    })
}

/// Serve EGADS requests until the peer disconnects.
pub async fn serve_egads<S>(stream: S, ctx: Arc<ServerContext>) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    while let Some(req) = read_egads_request(&mut stream).await? {
        log::trace!("egads request {req:?}");
        match req {
            EgadsRequest::Entropy(n) => {
                let n = n as usize;
                if n > MAX_REQUEST {
                    return Err(ProtocolError::RequestTooLarge {
                        requested: n,
                        limit: MAX_REQUEST,
                    });
                }
                send_blocking(&mut stream, &ctx, n).await?;
            }
            EgadsRequest::Level => {
                send(&mut stream, &level_bits(&ctx.pool).to_be_bytes()).await?;
            }
        }
    }
    Ok(())
}

/// Serve EGD requests until the peer disconnects.
pub async fn serve_egd<S>(stream: S, ctx: Arc<ServerContext>) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    while let Some(req) = read_egd_request(&mut stream).await? {
        log::trace!("egd request {req:?}");
        match req {
            EgdRequest::Level => {
                send(&mut stream, &level_bits(&ctx.pool).to_be_bytes()).await?;
            }
            EgdRequest::ReadNonBlocking(n) => {
                let (mut buf, got) = pool_output(&ctx.pool, n as usize, Duration::ZERO).await?;
                let mut reply = Vec::with_capacity(got + 1);
                reply.push(got as u8);
                reply.extend_from_slice(&buf[..got]);
                let sent = send(&mut stream, &reply).await;
                buf.zeroize();
                reply.zeroize();
                sent?;
            }
            EgdRequest::ReadBlocking(n) => {
                send_blocking(&mut stream, &ctx, n as usize).await?;
            }
            EgdRequest::Add { bits, mut data } => {
                if let Err(e) = ctx.pool.add_entropy(ctx.external, &data, u32::from(bits)) {
                    log::warn!("rejected external entropy: {e}");
                }
                data.zeroize();
            }
            EgdRequest::Pid => {
                let pid = ctx.pid.to_string();
                let mut reply = vec![pid.len() as u8];
                reply.extend_from_slice(pid.as_bytes());
                send(&mut stream, &reply).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use egads_core::pool::MAX_CREDIT;
    use tokio::io::duplex;

    fn context() -> Arc<ServerContext> {
        let pool = Arc::new(EntropyPool::new());
        let a = pool.register_source().unwrap();
        let external = pool.register_source().unwrap();
        pool.startup_done().unwrap();
        // Leave one tag in the ring.
        pool.add_entropy(a, b"a", MAX_CREDIT).unwrap();
        pool.add_entropy(external, b"b", MAX_CREDIT).unwrap();
        Arc::new(ServerContext::new(pool, external))
    }

    /// Two registered sources, `startup_done` not yet called.
    fn unkeyed_context() -> Arc<ServerContext> {
        let pool = Arc::new(EntropyPool::new());
        pool.register_source().unwrap();
        let external = pool.register_source().unwrap();
        Arc::new(ServerContext::new(pool, external))
    }

    /// Key the pool if needed and push `tags` more tags into the ring. A
    /// concurrent reader may drain them, so count extractions, not bytes.
    fn fill(ctx: &ServerContext, tags: u64) {
        let pool = &ctx.pool;
        if !pool.is_keyed() {
            pool.startup_done().unwrap();
        }
        let ring_tags = || {
            let st = pool.stats();
            st.extractions - st.spool_deposits
        };
        let a = egads_core::SourceId::from_index(0);
        let target = ring_tags() + tags;
        while ring_tags() < target {
            pool.add_entropy(a, b"a", MAX_CREDIT).unwrap();
            pool.add_entropy(ctx.external, b"b", MAX_CREDIT).unwrap();
        }
    }

    const QUIET: std::time::Duration = std::time::Duration::from_millis(500);
    const PATIENCE: std::time::Duration = std::time::Duration::from_secs(5);

    // -----------------------------------------------------------------------
    // Framing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_parse_egads_requests() {
        let mut wire: &[u8] = &[0x01, 0, 0, 1, 0, 0x02];
        assert_eq!(
            read_egads_request(&mut wire).await.unwrap(),
            Some(EgadsRequest::Entropy(256))
        );
        assert_eq!(
            read_egads_request(&mut wire).await.unwrap(),
            Some(EgadsRequest::Level)
        );
        assert_eq!(read_egads_request(&mut wire).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_parse_egd_add() {
        let req = EgdRequest::Add {
            bits: 0x0102,
            data: b"xyz".to_vec(),
        };
        let bytes = req.encode();
        assert_eq!(bytes, vec![0x03, 0x01, 0x02, 3, b'x', b'y', b'z']);
        let mut wire = &bytes[..];
        assert_eq!(read_egd_request(&mut wire).await.unwrap(), Some(req));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let mut wire: &[u8] = &[0x7f];
        assert!(matches!(
            read_egads_request(&mut wire).await,
            Err(ProtocolError::UnknownCommand(0x7f))
        ));
    }

    #[tokio::test]
    async fn test_truncated_request_is_error() {
        let mut wire: &[u8] = &[0x01, 0, 0];
        assert!(matches!(
            read_egads_request(&mut wire).await,
            Err(ProtocolError::Io(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_egads_entropy_and_level() {
        let ctx = context();
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(serve_egads(server, Arc::clone(&ctx)));

        client.write_all(&EgadsRequest::Level.encode()).await.unwrap();
        assert_eq!(client.read_u32().await.unwrap(), 64);

        client
            .write_all(&EgadsRequest::Entropy(TAG_LEN as u32).encode())
            .await
            .unwrap();
        let mut buf = [0u8; TAG_LEN];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(ctx.pool.stats().buffered, 0);

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_egads_rejects_oversized_request() {
        let ctx = context();
        let (mut client, server) = duplex(64);
        let task = tokio::spawn(serve_egads(server, ctx));
        client
            .write_all(&EgadsRequest::Entropy(MAX_REQUEST as u32 + 1).encode())
            .await
            .unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(ProtocolError::RequestTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_egd_nonblocking_reports_count() {
        let ctx = context();
        let (mut client, server) = duplex(1024);
        tokio::spawn(serve_egd(server, ctx));

        client.write_all(&EgdRequest::ReadNonBlocking(20).encode()).await.unwrap();
        let count = client.read_u8().await.unwrap() as usize;
        assert_eq!(count, TAG_LEN);
        let mut buf = vec![0u8; count];
        client.read_exact(&mut buf).await.unwrap();

        client.write_all(&EgdRequest::ReadNonBlocking(20).encode()).await.unwrap();
        assert_eq!(client.read_u8().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_egd_add_credits_external_slot() {
        let ctx = context();
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(serve_egd(server, Arc::clone(&ctx)));

        let req = EgdRequest::Add {
            bits: 1000,
            data: b"client noise".to_vec(),
        };
        client.write_all(&req.encode()).await.unwrap();
        client.write_all(&EgdRequest::Pid.encode()).await.unwrap();
        let len = client.read_u8().await.unwrap() as usize;
        let mut pid = vec![0u8; len];
        client.read_exact(&mut pid).await.unwrap();
        assert_eq!(String::from_utf8(pid).unwrap(), std::process::id().to_string());

        assert_eq!(ctx.pool.stats().credits[ctx.external.index()], MAX_CREDIT);
        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_egd_level_and_blocking_read() {
        let ctx = context();
        let (mut client, server) = duplex(1024);
        tokio::spawn(serve_egd(server, ctx));

        client.write_all(&EgdRequest::Level.encode()).await.unwrap();
        assert_eq!(client.read_u32().await.unwrap(), 64);
        client.write_all(&EgdRequest::ReadBlocking(4).encode()).await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Unkeyed pool and abandoned reads
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_egads_unkeyed_pool_sends_nothing_until_keyed() {
        let ctx = unkeyed_context();
        let (mut client, server) = duplex(1024);
        tokio::spawn(serve_egads(server, Arc::clone(&ctx)));

        client.write_all(&EgadsRequest::Entropy(16).encode()).await.unwrap();
        let mut first = [0u8; 1];
        assert!(
            tokio::time::timeout(QUIET, client.read_exact(&mut first))
                .await
                .is_err(),
            "bytes sent from an unkeyed pool"
        );

        fill(&ctx, 2);
        let mut buf = [0u8; 16];
        tokio::time::timeout(PATIENCE, client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(buf, [0u8; 16]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_egd_blocking_read_waits_for_keying() {
        let ctx = unkeyed_context();
        let (mut client, server) = duplex(1024);
        tokio::spawn(serve_egd(server, Arc::clone(&ctx)));

        client.write_all(&EgdRequest::ReadBlocking(8).encode()).await.unwrap();
        let mut first = [0u8; 1];
        assert!(
            tokio::time::timeout(QUIET, client.read_exact(&mut first))
                .await
                .is_err(),
            "bytes sent from an unkeyed pool"
        );

        fill(&ctx, 1);
        let mut buf = [0u8; 8];
        tokio::time::timeout(PATIENCE, client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(buf, [0u8; 8]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_read_leaves_ring_alone() {
        let ctx = unkeyed_context();
        ctx.pool.startup_done().unwrap();
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(serve_egads(server, Arc::clone(&ctx)));

        client.write_all(&EgadsRequest::Entropy(8).encode()).await.unwrap();
        drop(client);
        let result = tokio::time::timeout(PATIENCE, task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ProtocolError::Closed)));

        fill(&ctx, 1);
        assert!(ctx.pool.stats().buffered >= TAG_LEN);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipelined_request_survives_wait() {
        let ctx = context();
        let (mut client, server) = duplex(1024);
        tokio::spawn(serve_egads(server, Arc::clone(&ctx)));

        // Drain the single buffered tag so the next read has to wait.
        let mut wire = EgadsRequest::Entropy(TAG_LEN as u32).encode();
        wire.extend(EgadsRequest::Entropy(TAG_LEN as u32).encode());
        wire.extend(EgadsRequest::Level.encode());
        client.write_all(&wire).await.unwrap();

        let mut tag = [0u8; TAG_LEN];
        client.read_exact(&mut tag).await.unwrap();
        tokio::time::sleep(QUIET).await;
        fill(&ctx, 1);
        tokio::time::timeout(PATIENCE, client.read_exact(&mut tag))
            .await
            .unwrap()
            .unwrap();
        assert!(client.read_u32().await.is_ok());
    }
}
