//! In memory store of the values this node is responsible for.

use std::{
    collections::{BTreeMap, HashMap},
    net::IpAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use tracing::{debug, trace};

use crate::common::{Key, Value, ValueType};
use crate::server::host_filter::HostFilter;
use crate::server::load::{RequestLoad, RequestLoadPolicy, SmoothedRequestLoad};

/// Default maximum number of distinct primary keys.
pub const DEFAULT_MAX_KEYS: usize = 16_384;
/// Default maximum number of values under one primary key.
pub const DEFAULT_MAX_VALUES_PER_KEY: usize = 5;
/// Default maximum payload size in bytes.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 4096;
/// Default maximum number of remote values sent from one IP.
pub const DEFAULT_MAX_KEYS_PER_IP: usize = 5;
/// Default number of stored plus rejected values sent from one IP after which
/// that IP is banned.
pub const DEFAULT_MAX_KEYS_PER_IP_BAN_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Limits of a [ValueDatabase].
pub struct DatabaseSettings {
    pub max_keys: usize,
    pub max_values_per_key: usize,
    pub max_value_size: usize,
    pub max_keys_per_ip: usize,
    pub max_keys_per_ip_ban_limit: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            max_keys: DEFAULT_MAX_KEYS,
            max_values_per_key: DEFAULT_MAX_VALUES_PER_KEY,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            max_keys_per_ip: DEFAULT_MAX_KEYS_PER_IP,
            max_keys_per_ip_ban_limit: DEFAULT_MAX_KEYS_PER_IP_BAN_LIMIT,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Why a value was not stored.
pub enum StoreError {
    #[error("values of type ANY cannot be stored")]
    WildcardType,

    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(usize),

    #[error("local values can only be replaced by local values")]
    LocalValue,

    #[error("direct values cannot be replaced by indirect values")]
    DirectValue,

    #[error("only direct values can be removed remotely")]
    IndirectRemoval,

    #[error("no such value to remove")]
    NothingToRemove,

    #[error("database is full")]
    DatabaseFull,

    #[error("too many values under this key")]
    BagFull,

    #[error("too many values sent from {0}")]
    Flooding(IpAddr),
}

#[derive(Debug, Clone, PartialEq)]
/// Snapshot of the values stored under one primary key.
pub struct ValueBag {
    pub primary_key: Key,
    /// Values keyed by their secondary key.
    pub values: BTreeMap<Key, Value>,
    /// Request load estimate at the time of the snapshot.
    pub request_load: f32,
}

impl ValueBag {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, secondary_key: &Key) -> Option<&Value> {
        self.values.get(secondary_key)
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    /// Store order, oldest first.
    seq: u64,
}

#[derive(Debug, Default)]
struct Bag {
    entries: HashMap<Key, Entry>,
    load: RequestLoad,
}

impl Bag {
    fn snapshot(&self, primary_key: Key) -> ValueBag {
        ValueBag {
            primary_key,
            values: self
                .entries
                .iter()
                .map(|(key, entry)| (*key, entry.value.clone()))
                .collect(),
            request_load: self.load.load(),
        }
    }

    /// Oldest remote value created by a firewalled node.
    fn oldest_firewalled(&self) -> Option<Key> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.value.local && entry.value.creator.is_firewalled())
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| *key)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct IpUsage {
    stored: usize,
    rejected: usize,
}

#[derive(Debug, Default)]
struct Inner {
    bags: HashMap<Key, Bag>,
    per_ip: HashMap<IpAddr, IpUsage>,
    next_seq: u64,
}

impl Inner {
    fn claim(&mut self, ip: IpAddr) {
        self.per_ip.entry(ip).or_default().stored += 1;
    }

    fn release(&mut self, value: &Value) {
        if value.local {
            return;
        }

        let ip = sender_ip(value);

        if let Some(usage) = self.per_ip.get_mut(&ip) {
            usage.stored = usage.stored.saturating_sub(1);

            if usage.stored == 0 {
                self.per_ip.remove(&ip);
            }
        }
    }

    fn remove(&mut self, primary_key: &Key, secondary_key: &Key) -> Option<Value> {
        let bag = self.bags.get_mut(primary_key)?;
        let removed = bag.entries.remove(secondary_key)?.value;

        if bag.entries.is_empty() {
            self.bags.remove(primary_key);
        }

        self.release(&removed);

        Some(removed)
    }
}

/// Remote values count against the host that sent them, the only address
/// observed on the wire. A relayed value's creator address is whatever the
/// relay claims.
fn sender_ip(value: &Value) -> IpAddr {
    value.sender.observed_address().ip()
}

/// Thread safe map of primary keys to their [ValueBag]s.
///
/// Every operation takes the lock once, so a bag and its request load are
/// always read together.
#[derive(Debug)]
pub struct ValueDatabase {
    inner: Mutex<Inner>,
    settings: DatabaseSettings,
    load_policy: Arc<dyn RequestLoadPolicy>,
    host_filter: Option<Arc<dyn HostFilter>>,
}

impl ValueDatabase {
    pub fn new(settings: DatabaseSettings) -> Self {
        ValueDatabase {
            inner: Mutex::new(Inner::default()),
            settings,
            load_policy: Arc::new(SmoothedRequestLoad::default()),
            host_filter: None,
        }
    }

    /// Hosts flooding the database get banned through `host_filter`.
    pub fn with_host_filter(mut self, host_filter: Arc<dyn HostFilter>) -> Self {
        self.host_filter = Some(host_filter);
        self
    }

    pub fn with_request_load_policy(mut self, policy: Arc<dyn RequestLoadPolicy>) -> Self {
        self.load_policy = policy;
        self
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    // === Public Methods ===

    /// Snapshot of the values under `primary_key`.
    pub fn get(&self, primary_key: &Key) -> Option<ValueBag> {
        self.lock()
            .bags
            .get(primary_key)
            .map(|bag| bag.snapshot(*primary_key))
    }

    /// Snapshot of the values under `primary_key`, counting this call as a
    /// lookup in the request load if `record_lookup` is set.
    pub fn get_with_load(&self, primary_key: &Key, record_lookup: bool) -> Option<ValueBag> {
        let mut inner = self.lock();
        let bag = inner.bags.get_mut(primary_key)?;

        if record_lookup {
            bag.load.increment(self.load_policy.as_ref(), Instant::now());
        }

        Some(bag.snapshot(*primary_key))
    }

    /// Request load of `primary_key`, `0` for unknown keys.
    pub fn request_load(&self, primary_key: &Key, record_lookup: bool) -> f32 {
        let mut inner = self.lock();

        match inner.bags.get_mut(primary_key) {
            Some(bag) if record_lookup => {
                bag.load.increment(self.load_policy.as_ref(), Instant::now())
            }
            Some(bag) => bag.load.load(),
            None => 0.0,
        }
    }

    /// Store a value, returns `false` if it was rejected.
    ///
    /// See [ValueDatabase::try_store].
    pub fn store(&self, value: Value) -> bool {
        self.try_store(value).is_ok()
    }

    /// Store a value, replacing the one with the same primary and secondary
    /// keys, or remove that value if the payload is empty.
    pub fn try_store(&self, value: Value) -> Result<(), StoreError> {
        let primary_key = value.primary_key;
        let secondary_key = value.secondary_key();

        let result = self.validate(&value).and_then(|_| {
            let mut inner = self.lock();

            if value.is_removal() {
                self.remove_remote(&mut inner, &value)
            } else {
                self.add(&mut inner, value)
            }
        });

        match &result {
            Ok(_) => trace!(?primary_key, ?secondary_key, "Stored value"),
            Err(error) => debug!(?primary_key, ?secondary_key, ?error, "Rejected value"),
        };

        result
    }

    /// Remove a value regardless of where it came from.
    pub fn remove(&self, primary_key: &Key, secondary_key: &Key) -> Option<Value> {
        self.lock().remove(primary_key, secondary_key)
    }

    pub fn contains(&self, primary_key: &Key, secondary_key: &Key) -> bool {
        self.lock()
            .bags
            .get(primary_key)
            .is_some_and(|bag| bag.entries.contains_key(secondary_key))
    }

    /// Number of primary keys.
    pub fn key_count(&self) -> usize {
        self.lock().bags.len()
    }

    /// Number of values under all primary keys.
    pub fn value_count(&self) -> usize {
        self.lock().bags.values().map(|bag| bag.entries.len()).sum()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.lock().bags.keys().copied().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.lock()
            .bags
            .values()
            .flat_map(|bag| bag.entries.values())
            .map(|entry| entry.value.clone())
            .collect()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();

        inner.bags.clear();
        inner.per_ip.clear();
    }

    // === Private Methods ===

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(&self, value: &Value) -> Result<(), StoreError> {
        if value.value_type == ValueType::ANY {
            return Err(StoreError::WildcardType);
        }

        if value.payload.len() > self.settings.max_value_size {
            return Err(StoreError::PayloadTooLarge(value.payload.len()));
        }

        Ok(())
    }

    fn remove_remote(&self, inner: &mut Inner, value: &Value) -> Result<(), StoreError> {
        if !value.is_direct() && !value.local {
            return Err(StoreError::IndirectRemoval);
        }

        let current_is_local = inner
            .bags
            .get(&value.primary_key)
            .and_then(|bag| bag.entries.get(&value.secondary_key()))
            .map(|entry| entry.value.local)
            .ok_or(StoreError::NothingToRemove)?;

        if current_is_local && !value.local {
            return Err(StoreError::LocalValue);
        }

        inner.remove(&value.primary_key, &value.secondary_key());

        Ok(())
    }

    fn add(&self, inner: &mut Inner, value: Value) -> Result<(), StoreError> {
        let primary_key = value.primary_key;
        let secondary_key = value.secondary_key();
        let ip = sender_ip(&value);

        let bag = inner.bags.get(&primary_key);
        let current = bag
            .and_then(|bag| bag.entries.get(&secondary_key))
            .map(|entry| {
                (
                    entry.value.local,
                    entry.value.is_direct(),
                    sender_ip(&entry.value),
                )
            });

        if let Some((current_local, current_direct, _)) = current {
            if current_local && !value.local {
                return Err(StoreError::LocalValue);
            }

            if current_direct && !value.is_direct() {
                return Err(StoreError::DirectValue);
            }
        }

        let mut evict = None;

        if !value.local {
            match bag {
                None if inner.bags.len() >= self.settings.max_keys => {
                    return Err(StoreError::DatabaseFull);
                }
                Some(bag)
                    if bag.entries.len() >= self.settings.max_values_per_key
                        && !(current.is_some() && value.is_direct()) =>
                {
                    if value.creator.is_firewalled() {
                        return Err(StoreError::BagFull);
                    }

                    evict = Some(bag.oldest_firewalled().ok_or(StoreError::BagFull)?);
                }
                _ => {}
            }

            let adds_to_ip =
                current.map_or(true, |(local, _, current_ip)| local || current_ip != ip);

            if adds_to_ip {
                self.check_flooding(inner, &value, ip)?;
            }
        }

        if let Some(evicted) = evict {
            if let Some(evicted) = inner.remove(&primary_key, &evicted) {
                debug!(
                    ?primary_key,
                    secondary_key = ?evicted.secondary_key(),
                    "Evicted firewalled value"
                );
            }
        }

        if !value.local {
            inner.claim(ip);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let replaced = inner
            .bags
            .entry(primary_key)
            .or_default()
            .entries
            .insert(secondary_key, Entry { value, seq });

        if let Some(replaced) = replaced {
            inner.release(&replaced.value);
        }

        Ok(())
    }

    fn check_flooding(
        &self,
        inner: &mut Inner,
        value: &Value,
        ip: IpAddr,
    ) -> Result<(), StoreError> {
        let usage = inner.per_ip.entry(ip).or_default();

        if usage.stored < self.settings.max_keys_per_ip {
            return Ok(());
        }

        usage.rejected += 1;

        if usage.stored + usage.rejected > self.settings.max_keys_per_ip_ban_limit {
            if let Some(host_filter) = &self.host_filter {
                host_filter.ban(&value.sender.observed_address());

                // The ban list remembers the host from here on.
                usage.rejected = 0;
            }
        }

        Err(StoreError::Flooding(ip))
    }
}

impl Default for ValueDatabase {
    fn default() -> Self {
        Self::new(DatabaseSettings::default())
    }
}
