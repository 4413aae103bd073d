//! Token caches for the two injector tiers
//!
//! Uses DashMap for lock-free concurrent access. Each entry is a [`Slot`]:
//! a token being resolved is marked `Instantiating` so a re-entrant request
//! for it is reported as a cycle instead of recursing.

use crate::factory::Instance;
use ahash::RandomState;
use dashmap::DashMap;

/// Resolution state of one token.
#[derive(Clone)]
pub(crate) enum Slot {
    /// Resolution has started and not yet finished
    Instantiating,
    /// The resolved singleton
    Ready(Instance),
}

/// Token-keyed cache for one injector tier.
pub(crate) struct TokenCache {
    slots: DashMap<String, Slot, RandomState>,
}

impl TokenCache {
    /// Create new empty storage with optimized shard count.
    ///
    /// Default DashMap uses num_cpus * 4 shards which is overkill for
    /// a cache that is written once per token.
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Current state of `token`; the guard is released before returning.
    #[inline]
    pub fn lookup(&self, token: &str) -> Option<Slot> {
        self.slots.get(token).map(|slot| slot.value().clone())
    }

    /// Mark `token` as being resolved
    #[inline]
    pub fn begin(&self, token: &str) {
        self.slots.insert(token.to_string(), Slot::Instantiating);
    }

    /// Store the resolved value, replacing any marker
    #[inline]
    pub fn store(&self, token: &str, value: Instance) {
        self.slots.insert(token.to_string(), Slot::Ready(value));
    }

    /// Drop the `Instantiating` marker after a failed resolution.
    ///
    /// A value stored in the meantime is kept.
    #[inline]
    pub fn abandon(&self, token: &str) -> bool {
        self.slots
            .remove_if(token, |_, slot| matches!(slot, Slot::Instantiating))
            .is_some()
    }

    /// Check if the token has an entry in any state
    #[inline]
    pub fn contains(&self, token: &str) -> bool {
        self.slots.contains_key(token)
    }

    /// The resolved value, if ready
    #[cfg(test)]
    pub fn ready(&self, token: &str) -> Option<Instance> {
        match self.lookup(token)? {
            Slot::Ready(value) => Some(value),
            Slot::Instantiating => None,
        }
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("count", &self.len())
            .finish()
    }
}
