//! Security tokens binding store requests to the requester's address.

use crc::{Crc, CRC_32_ISCSI};
use rand::{thread_rng, Rng};
use std::{
    fmt::{self, Debug, Formatter},
    net::{IpAddr, SocketAddr},
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use tracing::trace;

use crate::common::Contact;

const SECRET_SIZE: usize = 20;
pub const TOKEN_SIZE: usize = 4;
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Default interval between secret rotations.
pub const TOKEN_ROTATE_INTERVAL: Duration = Duration::from_secs(60 * 5);

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Why a store request's token was refused.
pub enum TokenError {
    #[error("missing token")]
    Missing,
    #[error("invalid token")]
    Invalid,
}

/// Tokens generator.
///
/// A token is a CRC-32C over the requester's address and a secret that
/// rotates every [TOKEN_ROTATE_INTERVAL]; tokens of the previous secret stay
/// valid for one more interval.
pub struct Tokens {
    prev_secret: [u8; SECRET_SIZE],
    curr_secret: [u8; SECRET_SIZE],
    last_updated: Instant,
    rotate_interval: Duration,
}

impl Debug for Tokens {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Tokens (_)")
    }
}

impl Tokens {
    pub fn new(rotate_interval: Duration) -> Self {
        let mut rng = thread_rng();

        Tokens {
            prev_secret: rng.gen(),
            curr_secret: rng.gen(),
            last_updated: Instant::now(),
            rotate_interval,
        }
    }

    // === Public Methods ===

    pub fn should_update(&self) -> bool {
        self.last_updated.elapsed() > self.rotate_interval
    }

    /// Validate that the token was generated for `address` with the current
    /// or the previous secret.
    pub fn validate(&self, address: SocketAddr, token: &[u8]) -> bool {
        let prev = internal_generate_token(address, &self.prev_secret);
        let curr = internal_generate_token(address, &self.curr_secret);

        token == curr || token == prev
    }

    pub fn rotate(&mut self) {
        trace!("Rotating secrets");
        let mut rng = thread_rng();

        self.prev_secret = self.curr_secret;
        self.curr_secret = rng.gen();

        self.last_updated = Instant::now();
    }

    pub fn generate_token(&self, address: SocketAddr) -> [u8; TOKEN_SIZE] {
        internal_generate_token(address, &self.curr_secret)
    }
}

impl Default for Tokens {
    fn default() -> Self {
        Self::new(TOKEN_ROTATE_INTERVAL)
    }
}

fn internal_generate_token(address: SocketAddr, secret: &[u8; SECRET_SIZE]) -> [u8; TOKEN_SIZE] {
    let mut digest = CASTAGNOLI.digest();

    match address.ip() {
        IpAddr::V4(v4) => digest.update(&v4.octets()),
        IpAddr::V6(v6) => digest.update(&v6.octets()),
    };

    digest.update(&address.port().to_be_bytes());
    digest.update(secret);

    digest.finalize().to_be_bytes()
}

#[derive(Debug, Default)]
/// Shared token generator and validator used by the request handlers.
///
/// Secrets are rotated lazily, on the first use after the interval expired.
pub struct SecurityTokens {
    tokens: Mutex<Tokens>,
}

impl SecurityTokens {
    pub fn new(rotate_interval: Duration) -> Self {
        SecurityTokens {
            tokens: Mutex::new(Tokens::new(rotate_interval)),
        }
    }

    /// Token for `contact`, bound to the address we observed it at.
    pub fn generate(&self, contact: &Contact) -> [u8; TOKEN_SIZE] {
        self.with_tokens(|tokens| tokens.generate_token(contact.observed_address()))
    }

    /// Check the token a contact presented with a store request.
    pub fn validate(&self, contact: &Contact, token: Option<&[u8]>) -> Result<(), TokenError> {
        let token = token.ok_or(TokenError::Missing)?;

        if self.with_tokens(|tokens| tokens.validate(contact.observed_address(), token)) {
            Ok(())
        } else {
            Err(TokenError::Invalid)
        }
    }

    /// Force a rotation of the secrets.
    pub fn rotate(&self) {
        self.with_tokens(Tokens::rotate)
    }

    fn with_tokens<T>(&self, f: impl FnOnce(&mut Tokens) -> T) -> T {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);

        if tokens.should_update() {
            tokens.rotate()
        }

        f(&mut tokens)
    }
}
