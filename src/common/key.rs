//! Kademlia node key or value key.
use rand::Rng;
use sha1_smol::Sha1;
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::{Error, Result};

/// The size of keys in bytes.
pub const KEY_SIZE: usize = 20;
/// The size of keys in bits, also the maximum [Key::distance].
pub const MAX_DISTANCE: u8 = KEY_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// 160-bit identifier used both for node identity and for value identity.
pub struct Key(pub [u8; KEY_SIZE]);

impl Key {
    /// The all zero key.
    pub const MIN: Key = Key([0; KEY_SIZE]);
    /// The all ones key.
    pub const MAX: Key = Key([0xff; KEY_SIZE]);

    pub fn random() -> Key {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; KEY_SIZE] = rng.gen();

        Key(random_bytes)
    }

    /// Create a new Key from some bytes. Returns Err if `bytes` is not of length
    /// [KEY_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Key> {
        let bytes = bytes.as_ref();
        if bytes.len() != KEY_SIZE {
            return Err(Error::InvalidKeySize(bytes.len()));
        }

        let mut tmp: [u8; KEY_SIZE] = [0; KEY_SIZE];
        tmp.copy_from_slice(bytes);

        Ok(Key(tmp))
    }

    /// Derive a key from the SHA-1 hash of arbitrary bytes.
    pub fn from_sha1(data: &[u8]) -> Key {
        let mut hasher = Sha1::new();
        hasher.update(data);

        Key(hasher.digest().bytes())
    }

    /// Bitwise XOR of two keys, the Kademlia distance metric.
    pub fn xor(&self, other: &Key) -> Key {
        let mut result = [0_u8; KEY_SIZE];

        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            result[i] = a ^ b;
        }

        Key(result)
    }

    /// Simplified XOR distance between this key and another.
    ///
    /// The distance is the number of significant bits in the XOR result.
    ///
    /// Distance to self is 0
    /// Distance to the furthest key is 160
    /// Distance to a key with 5 leading matching bits is 155
    pub fn distance(&self, other: &Key) -> u8 {
        for i in 0..KEY_SIZE {
            let a = self.0[i];
            let b = other.0[i];

            if a != b {
                let leading_zeros = (i as u32 * 8 + (a ^ b).leading_zeros()) as u8;

                return MAX_DISTANCE - leading_zeros;
            }
        }

        0
    }

    /// Returns `true` if `self` is strictly closer to `target` than `other` is.
    pub fn is_closer_to(&self, target: &Key, other: &Key) -> bool {
        self.xor(target) < other.xor(target)
    }

    /// Flip every bit of this key.
    ///
    /// A joining node pings its own key's owner from the inverted key to
    /// detect key collisions.
    pub fn invert(&self) -> Key {
        let mut result = self.0;
        result.iter_mut().for_each(|b| *b = !*b);

        Key(result)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; KEY_SIZE]> for Key {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Key(bytes)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Key> {
        if s.len() != KEY_SIZE * 2 || !s.is_ascii() {
            return Err(Error::InvalidKeyEncoding(s.to_string()));
        }

        let mut bytes = [0_u8; KEY_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidKeyEncoding(s.to_string()))?;
        }

        Ok(Key(bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn distance_to_self() {
        let key = Key::random();
        assert_eq!(key.distance(&key), 0);
    }

    #[test]
    fn distance_to_inverted() {
        let key = Key::random();
        assert_eq!(key.distance(&key.invert()), MAX_DISTANCE);
        assert_eq!(key.xor(&key.invert()), Key::MAX);
    }

    #[test]
    fn distance_with_common_prefix() {
        let mut a = [0_u8; KEY_SIZE];
        let mut b = [0_u8; KEY_SIZE];
        a[0] = 0b0000_0100;
        b[0] = 0b0000_0000;
        b[19] = 1;

        assert_eq!(Key(a).distance(&Key(b)), 155);
    }

    #[test]
    fn closer_to() {
        let target = Key::MIN;
        let mut near = [0_u8; KEY_SIZE];
        near[19] = 1;

        assert!(Key(near).is_closer_to(&target, &Key::MAX));
        assert!(!Key::MAX.is_closer_to(&target, &Key(near)));
    }

    #[test]
    fn hex_encoding() {
        let key = Key::from_str("4238af8aff56cf6e0007d9d2003bf23d33eea7c3").unwrap();

        assert_eq!(key.to_string(), "4238af8aff56cf6e0007d9d2003bf23d33eea7c3");
        assert!(Key::from_str("4238af").is_err());
        assert!(Key::from_str("zz38af8aff56cf6e0007d9d2003bf23d33eea7c3").is_err());
    }

    #[test]
    fn from_sha1() {
        let key = Key::from_sha1(b"abc");

        assert_eq!(
            key,
            Key::from_str("a9993e364706816aba3e25717850c26c9cd0d89d").unwrap()
        );
    }

    #[test]
    fn from_bytes_wrong_size() {
        assert!(Key::from_bytes([0_u8; 19]).is_err());
        assert!(Key::from_bytes([0_u8; 20]).is_ok());
    }
}
