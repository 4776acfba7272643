//! Unix-domain socket listener. One task per accepted connection.

use std::future::Future;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixListener;

use crate::protocol::{ServerContext, serve_egads, serve_egd};

/// Which protocol a listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Egads,
    Egd,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Egads => write!(f, "egads"),
            Self::Egd => write!(f, "egd"),
        }
    }
}

/// Clear a leftover socket file. A socket that still accepts connections
/// belongs to a live daemon and is reported as in use.
pub fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !meta.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        ));
    }
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("{} is served by a running process", path.display()),
        ));
    }
    log::info!("removing stale socket {}", path.display());
    std::fs::remove_file(path)
}

pub struct EntropyServer {
    listener: UnixListener,
    path: PathBuf,
    dialect: Dialect,
    ctx: Arc<ServerContext>,
}

impl EntropyServer {
    /// Bind `path`, replacing a stale socket. Must run inside a tokio
    /// runtime. The socket is left world-accessible.
    pub fn bind(path: &Path, dialect: Dialect, ctx: Arc<ServerContext>) -> io::Result<Self> {
        remove_stale_socket(path)?;
        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
        log::info!("{dialect} server listening on {}", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            dialect,
            ctx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Accept connections forever.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("{} server on {} shutting down", self.dialect, self.path.display());
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            log::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    let ctx = Arc::clone(&self.ctx);
                    let dialect = self.dialect;
                    tokio::spawn(async move {
                        let result = match dialect {
                            Dialect::Egads => serve_egads(stream, ctx).await,
                            Dialect::Egd => serve_egd(stream, ctx).await,
                        };
                        if let Err(e) = result {
                            log::debug!("{dialect} client dropped: {e}");
                        }
                    });
                }
            }
        }
    }
}

impl Drop for EntropyServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EgadsRequest;
    use egads_core::EntropyPool;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    fn ctx() -> Arc<ServerContext> {
        let pool = Arc::new(EntropyPool::new());
        let id = pool.register_source().unwrap();
        Arc::new(ServerContext::new(pool, id))
    }

    #[test]
    fn test_remove_stale_socket_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_stale_socket(&dir.path().join("none.sock")).unwrap();
    }

    #[test]
    fn test_remove_stale_socket_refuses_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        std::fs::write(&path, b"x").unwrap();
        assert!(remove_stale_socket(&path).is_err());
        assert!(path.exists());
    }

    #[test]
    fn test_remove_stale_socket_clears_dead_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());
        remove_stale_socket(&path).unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_refuses_live_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.sock");
        let _first = EntropyServer::bind(&path, Dialect::Egads, ctx()).unwrap();
        let err = EntropyServer::bind(&path, Dialect::Egads, ctx()).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test]
    async fn test_serves_level_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("egads.sock");
        let server = EntropyServer::bind(&path, Dialect::Egads, ctx()).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        let mut client = UnixStream::connect(&path).await.unwrap();
        client.write_all(&EgadsRequest::Level.encode()).await.unwrap();
        assert_eq!(client.read_u32().await.unwrap(), 0);

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!path.exists());
    }
}
