//! Main Crate Error

use std::net::SocketAddr;

#[derive(thiserror::Error, Debug)]
/// Mojito crate error enum.
pub enum Error {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Failed to parse packet bytes: {0}")]
    BencodeError(#[from] serde_bencode::Error),

    /// A key was built from a slice of the wrong length.
    #[error("Invalid key size, expected 20 bytes, got {0}")]
    InvalidKeySize(usize),

    /// A key string was not 40 hex characters.
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// A compact socket address was neither 6 nor 18 bytes long.
    #[error("Invalid compact address length: {0}")]
    InvalidAddressLength(usize),

    /// The transaction id of a message is not 4 bytes.
    #[error("Invalid transaction_id: {0:?}")]
    InvalidTransactionId(Vec<u8>),

    /// A store status code other than succeeded or failed.
    #[error("Invalid store status code: {0}")]
    InvalidStatusCode(u16),

    /// The outbound channel of a transport is gone.
    #[error("Transport closed, could not send to {0}")]
    TransportClosed(SocketAddr),

    /// The request pool was shut down.
    #[error("Request pool is shut down")]
    PoolShutdown,
}

/// Alias for `Result<T, mojito_dht::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
