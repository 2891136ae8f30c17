/*!
Errors raised by handshakes and client connections.
*/
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out waiting for the handshake")]
    HandshakeTimeout,

    /// The peer closed (or was told to close) before the handshake finished.
    #[error("connection closed during the handshake")]
    HandshakeClosed,

    #[error("could not connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
