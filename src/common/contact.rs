//! Remote (or local) node identity with its network address.
use std::{net::SocketAddr, time::Duration};

use crate::common::Key;

/// Set on contacts that cannot accept unsolicited traffic.
pub const FIREWALLED_FLAG: u8 = 0x01;
/// Set on contacts that are shutting down.
pub const SHUTDOWN_FLAG: u8 = 0x02;

/// Four character vendor code of this implementation.
pub const LOCAL_VENDOR: u32 = u32::from_be_bytes(*b"MOJR");
/// Protocol version spoken by this implementation.
pub const LOCAL_VERSION: u16 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A node's identity, address and protocol metadata.
pub struct Contact {
    pub key: Key,
    /// The address the node claims to be reachable at.
    pub contact_address: SocketAddr,
    /// The address we actually received the node's packet from.
    ///
    /// Only set by the transport on inbound messages, never encoded.
    pub source_address: Option<SocketAddr>,
    pub vendor: u32,
    pub version: u16,
    pub instance_id: u8,
    pub flags: u8,
    /// Last measured round trip time, if any.
    pub round_trip_time: Option<Duration>,
}

impl Contact {
    /// Creates a new contact with default metadata.
    pub fn new(key: Key, contact_address: SocketAddr) -> Contact {
        Contact {
            key,
            contact_address,
            source_address: None,
            vendor: LOCAL_VENDOR,
            version: LOCAL_VERSION,
            instance_id: 0,
            flags: 0,
            round_trip_time: None,
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_source_address(mut self, source_address: SocketAddr) -> Self {
        self.source_address = Some(source_address);
        self
    }

    pub fn with_round_trip_time(mut self, rtt: Duration) -> Self {
        self.round_trip_time = Some(rtt);
        self
    }

    // === Getters ===

    /// The address of this contact as seen by us.
    ///
    /// Security tokens are bound to this address, not to the declared one.
    pub fn observed_address(&self) -> SocketAddr {
        self.source_address.unwrap_or(self.contact_address)
    }

    pub fn is_firewalled(&self) -> bool {
        self.flags & FIREWALLED_FLAG != 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.flags & SHUTDOWN_FLAG != 0
    }

    /// Returns `true` if this contact is the sender of a collision test ping
    /// aimed at the node with `local_key`.
    pub fn is_collision_ping_sender(&self, local_key: &Key) -> bool {
        self.key == local_key.invert()
    }

    /// Timeout to use for requests to this contact.
    ///
    /// Four times the last round trip time, kept within a quarter of
    /// `default` and `default`.
    pub fn adaptive_timeout(&self, default: Duration) -> Duration {
        match self.round_trip_time {
            Some(rtt) => (rtt * 4).clamp(default / 4, default),
            None => default,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn observed_address_prefers_source() {
        let contact = Contact::new(Key::random(), "10.0.0.1:3000".parse().unwrap());
        assert_eq!(contact.observed_address(), contact.contact_address);

        let contact = contact.with_source_address("1.2.3.4:5000".parse().unwrap());
        assert_eq!(
            contact.observed_address(),
            "1.2.3.4:5000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn adaptive_timeout() {
        let default = Duration::from_secs(8);
        let contact = Contact::new(Key::random(), "10.0.0.1:3000".parse().unwrap());

        assert_eq!(contact.adaptive_timeout(default), default);

        let fast = contact.clone().with_round_trip_time(Duration::from_millis(100));
        assert_eq!(fast.adaptive_timeout(default), Duration::from_secs(2));

        let normal = contact.clone().with_round_trip_time(Duration::from_secs(1));
        assert_eq!(normal.adaptive_timeout(default), Duration::from_secs(4));

        let slow = contact.with_round_trip_time(Duration::from_secs(5));
        assert_eq!(slow.adaptive_timeout(default), default);
    }

    #[test]
    fn collision_ping_sender() {
        let local = Key::random();
        let sender = Contact::new(local.invert(), "10.0.0.1:3000".parse().unwrap());
        let other = Contact::new(Key::random(), "10.0.0.1:3000".parse().unwrap());

        assert!(sender.is_collision_ping_sender(&local));
        assert!(!other.is_collision_ping_sender(&local));
    }

    #[test]
    fn flags() {
        let contact = Contact::new(Key::random(), "10.0.0.1:3000".parse().unwrap())
            .with_flags(FIREWALLED_FLAG);

        assert!(contact.is_firewalled());
        assert!(!contact.is_shutdown());
    }
}
