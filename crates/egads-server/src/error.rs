use thiserror::Error;

/// Failures while speaking either socket protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown command byte 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("request for {requested} bytes exceeds limit of {limit}")]
    RequestTooLarge { requested: usize, limit: usize },

    #[error("peer closed the connection mid-reply")]
    Closed,
}
