//! Read access to the routing layer, and a simplified routing table.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{PoisonError, RwLock};

use crate::common::{Contact, Key};

/// K = the default maximum size of a k-bucket, and the replication factor.
pub const MAX_BUCKET_SIZE_K: usize = 20;

/// What request handlers need to know about the routing layer.
pub trait RoutingView: Debug + Send + Sync {
    /// The contact of this node.
    fn local_contact(&self) -> Contact;

    /// Up to `count` known contacts, closest to `target` first.
    fn closest(&self, target: &Key, count: usize) -> Vec<Contact>;

    /// Returns `true` if this node would be among the `k` closest known
    /// nodes to `target`.
    fn is_among_closest(&self, target: &Key, k: usize) -> bool {
        let local = self.local_contact().key;
        let closer = self
            .closest(target, k)
            .iter()
            .filter(|contact| contact.key != local)
            .filter(|contact| contact.key.is_closer_to(target, &local))
            .count();

        closer < k
    }
}

#[derive(Debug)]
/// Simplified Kademlia routing table
///
/// Buckets are keyed by [Key::distance] from the local key and hold at most
/// [MAX_BUCKET_SIZE_K] contacts; a full bucket rejects new contacts.
pub struct RoutingTable {
    local: Contact,
    buckets: RwLock<BTreeMap<u8, Vec<Contact>>>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] around the local contact.
    pub fn new(local: Contact) -> Self {
        RoutingTable {
            local,
            buckets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the [Key] of this node, where the distance is measured from.
    pub fn key(&self) -> &Key {
        &self.local.key
    }

    // === Public Methods ===

    /// Attempts to add a contact to this routing table, and return `true` if it did.
    ///
    /// A contact already in the table is updated in place.
    pub fn add(&self, contact: Contact) -> bool {
        let distance = self.local.key.distance(&contact.key);

        if distance == 0 {
            // Do not add self to the routing_table
            return false;
        }

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(distance).or_default();

        if let Some(existing) = bucket.iter_mut().find(|c| c.key == contact.key) {
            *existing = contact;
            return true;
        }

        if bucket.len() >= MAX_BUCKET_SIZE_K {
            return false;
        }

        bucket.push(contact);
        true
    }

    /// Remove a contact from this routing table.
    pub fn remove(&self, key: &Key) {
        let distance = self.local.key.distance(key);
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(bucket) = buckets.get_mut(&distance) {
            bucket.retain(|contact| &contact.key != key);
        }
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Return the number of contacts in this routing table.
    pub fn size(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl RoutingView for RoutingTable {
    fn local_contact(&self) -> Contact {
        self.local.clone()
    }

    fn closest(&self, target: &Key, count: usize) -> Vec<Contact> {
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);

        let mut closest: Vec<Contact> = buckets.values().flatten().cloned().collect();
        closest.sort_by_key(|contact| contact.key.xor(target));
        closest.truncate(count);

        closest
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn contact(key: Key) -> Contact {
        Contact::new(key, "10.0.0.1:3000".parse().unwrap())
    }

    #[test]
    fn table_is_empty() {
        let table = RoutingTable::new(contact(Key::random()));
        assert!(table.is_empty());

        table.add(contact(Key::random()));
        assert!(!table.is_empty());
    }

    #[test]
    fn should_not_add_self() {
        let local = contact(Key::random());
        let table = RoutingTable::new(local.clone());

        assert!(!table.add(local));
        assert!(table.is_empty());
    }

    #[test]
    fn should_not_duplicate() {
        let table = RoutingTable::new(contact(Key::random()));
        let other = contact(Key::random());

        assert!(table.add(other.clone()));
        assert!(table.add(other.clone()));
        assert_eq!(table.size(), 1);

        table.remove(&other.key);
        assert!(table.is_empty());
    }

    #[test]
    fn full_bucket() {
        let table = RoutingTable::new(contact(Key::MIN));

        // All of these share distance 160 from the all zero key.
        for i in 0..MAX_BUCKET_SIZE_K {
            let mut bytes = [0xff_u8; 20];
            bytes[19] = i as u8;
            assert!(table.add(contact(Key(bytes))));
        }

        let mut bytes = [0xff_u8; 20];
        bytes[19] = 0xaa;
        assert!(!table.add(contact(Key(bytes))));
    }

    #[test]
    fn closest_sorted_by_xor() {
        let table = RoutingTable::new(contact(Key::random()));

        for _ in 0..100 {
            table.add(contact(Key::random()));
        }

        let target = Key::random();
        let closest = table.closest(&target, MAX_BUCKET_SIZE_K);

        assert!(closest.len() <= MAX_BUCKET_SIZE_K);
        for pair in closest.windows(2) {
            assert!(pair[0].key.xor(&target) <= pair[1].key.xor(&target));
        }
    }

    #[test]
    fn among_closest() {
        let table = RoutingTable::new(contact(Key::MIN));
        let target = Key::MIN;

        assert!(table.is_among_closest(&target, 2));

        let mut near = [0_u8; 20];
        near[19] = 1;
        table.add(contact(Key(near)));
        near[19] = 2;
        table.add(contact(Key(near)));

        // The local key is the target itself.
        assert!(table.is_among_closest(&target, 2));
        assert!(!table.is_among_closest(&Key(near), 1));
    }
}
