//! A source from which decoded traps are read. Traps are matched against
//! the configured pipeline and forwarded to the enabled sinks.
use thiserror::Error;

use crate::trap::Trap;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to bind UDP listener on {0}: {1}")]
    Bind(String, #[source] std::io::Error),
    #[error("Failed to read datagram from socket: {0}")]
    Recv(#[source] std::io::Error),
}

/// Yields decoded, authenticated traps in arrival order. Datagrams that
/// fail to decode or carry the wrong version or community never surface.
pub trait Source: Iterator<Item = Result<Trap, SourceError>> + Send {
    fn describe(&self) -> String;
}

mod udp;
pub use udp::UdpSource;
