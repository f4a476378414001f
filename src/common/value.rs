//! Values stored in the DHT and their type tags.

use std::fmt::{self, Debug, Display, Formatter};

use bytes::Bytes;

use crate::common::{Contact, Key};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// Four character code tagging what a value means to the application.
///
/// Lookups filter by type so unrelated applications sharing a key do not
/// see each other's values.
pub struct ValueType(pub u32);

impl ValueType {
    /// Wildcard, matches every type. Never a valid type for a stored value.
    pub const ANY: ValueType = ValueType::from_code(b"****");
    pub const BINARY: ValueType = ValueType::from_code(b"BINA");
    pub const TEXT: ValueType = ValueType::from_code(b"TEXT");
    pub const TEST: ValueType = ValueType::from_code(b"TEST");
    pub const LIME: ValueType = ValueType::from_code(b"LIME");
    pub const ALT_LOC: ValueType = ValueType::from_code(b"ALOC");
    pub const PUSH_PROXY: ValueType = ValueType::from_code(b"PROX");

    pub const fn from_code(code: &[u8; 4]) -> ValueType {
        ValueType(u32::from_be_bytes(*code))
    }

    /// Returns `true` if a value of type `other` passes a filter on `self`.
    pub fn matches(&self, other: &ValueType) -> bool {
        *self == ValueType::ANY || self == other
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let code = self.0.to_be_bytes();

        if code.iter().all(|b| b.is_ascii_graphic()) {
            code.iter().try_for_each(|b| write!(f, "{}", *b as char))
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

impl Debug for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({self})")
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A value under a primary key, identified within it by its creator's key.
pub struct Value {
    /// The lookup key this value is stored under.
    pub primary_key: Key,
    /// The node that created the value; its key is the secondary key.
    pub creator: Contact,
    /// The node that sent the value to us. Differs from the creator for
    /// replicated values.
    pub sender: Contact,
    pub value_type: ValueType,
    pub version: u16,
    pub payload: Bytes,
    /// Created by this node.
    pub local: bool,
}

impl Value {
    /// A value created and published by `creator` itself.
    pub fn new(
        primary_key: Key,
        creator: Contact,
        value_type: ValueType,
        version: u16,
        payload: impl Into<Bytes>,
    ) -> Value {
        Value {
            primary_key,
            sender: creator.clone(),
            creator,
            value_type,
            version,
            payload: payload.into(),
            local: false,
        }
    }

    /// A value created by this node.
    pub fn local(
        primary_key: Key,
        local_contact: Contact,
        value_type: ValueType,
        version: u16,
        payload: impl Into<Bytes>,
    ) -> Value {
        Value {
            local: true,
            ..Value::new(primary_key, local_contact, value_type, version, payload)
        }
    }

    /// The same value as relayed by `sender`.
    pub fn relayed_by(mut self, sender: Contact) -> Value {
        self.sender = sender;
        self
    }

    // === Getters ===

    pub fn secondary_key(&self) -> Key {
        self.creator.key
    }

    /// Stored by its creator rather than replicated by a third node.
    pub fn is_direct(&self) -> bool {
        self.creator.key == self.sender.key
    }

    /// An empty payload asks for the value to be removed.
    pub fn is_removal(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn contact() -> Contact {
        Contact::new(Key::random(), "10.0.0.1:3000".parse().unwrap())
    }

    #[test]
    fn value_type_display() {
        assert_eq!(ValueType::ALT_LOC.to_string(), "ALOC");
        assert_eq!(ValueType(1).to_string(), "0x00000001");
    }

    #[test]
    fn any_matches_everything() {
        assert!(ValueType::ANY.matches(&ValueType::TEXT));
        assert!(ValueType::TEXT.matches(&ValueType::TEXT));
        assert!(!ValueType::TEXT.matches(&ValueType::BINARY));
    }

    #[test]
    fn direct_and_indirect() {
        let creator = contact();
        let value = Value::new(Key::random(), creator.clone(), ValueType::TEST, 0, "v");

        assert!(value.is_direct());
        assert_eq!(value.secondary_key(), creator.key);

        let relayed = value.relayed_by(contact());
        assert!(!relayed.is_direct());
        assert_eq!(relayed.secondary_key(), creator.key);
    }

    #[test]
    fn removal() {
        let value = Value::new(Key::random(), contact(), ValueType::TEST, 0, Bytes::new());
        assert!(value.is_removal());
    }
}
