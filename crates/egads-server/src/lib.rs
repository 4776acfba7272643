//! Socket front end for an egads-core entropy pool.
//!
//! Serves the native EGADS protocol and the EGD compatibility protocol over
//! Unix-domain stream sockets, and provides the matching clients.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{Client, SocketGatherer};
pub use error::ProtocolError;
pub use protocol::{EgadsRequest, EgdRequest, ServerContext};
pub use server::{Dialect, EntropyServer};

/// Socket file name inside the data directory.
pub const SOCKET_FILE: &str = "egads.sock";
