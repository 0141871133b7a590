//! Fixed-capacity dedup cache with wrap-around overwrite eviction.

use std::fmt;

/// Cache capacity in records.
pub const MAX_MESSAGE_DATA: usize = 100;

/// Per-message-id suppression flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    /// Message identity.
    pub id: u16,
    /// This node already re-flooded a RouteDirect/Broadcast with this id.
    pub was_broadcast: bool,
    /// This node already emitted a RouteInverse confirmation for this id.
    pub inverse_sent: bool,
    /// A UnicastFirst winner was already recorded for this id.
    pub unicast_won: bool,
}

impl MessageRecord {
    fn fresh(id: u16) -> Self {
        Self {
            id,
            was_broadcast: false,
            inverse_sent: false,
            unicast_won: false,
        }
    }
}

/// Which flag a [`DedupCache::set_flag`] call targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupFlag {
    /// Flood suppression.
    WasBroadcast,
    /// Duplicate confirmation suppression.
    InverseSent,
    /// Duplicate contest-winner suppression.
    UnicastWon,
}

impl fmt::Display for DedupFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DedupFlag::WasBroadcast => "was_broadcast",
            DedupFlag::InverseSent => "inverse_sent",
            DedupFlag::UnicastWon => "unicast_won",
        };
        write!(f, "{}", name)
    }
}

/// Fixed-capacity message recency cache.
///
/// Eviction is wrap-around overwrite, not LRU: the insertion cursor runs
/// forward through the slots and, once the cache is full, wraps to slot 0
/// and reuses slots in physical order regardless of how recently a record
/// was read. A record therefore survives exactly until the cursor cycles
/// back to its slot.
///
/// `lookup` has a deliberate side effect: a miss reserves a slot for the id
/// (all flags false) while still reporting "not found". Handler logic
/// depends on the second access finding the record, so this is a documented
/// contract, not an accident.
pub struct DedupCache {
    slots: Vec<MessageRecord>,
    /// Next slot to fill; wraps to 0 at capacity.
    cursor: usize,
    capacity: usize,
}

impl DedupCache {
    /// Create a cache with the standard capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_MESSAGE_DATA)
    }

    /// Create a cache with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            cursor: 0,
            capacity,
        }
    }

    /// Look up the record for `id`.
    ///
    /// On a miss, reserves a slot for `id` (evicting the record at the
    /// cursor if the cache is full) and returns `None`.
    pub fn lookup(&mut self, id: u16) -> Option<MessageRecord> {
        if let Some(record) = self.find(id) {
            return Some(record);
        }
        self.insert(MessageRecord::fresh(id));
        None
    }

    /// Check for a record without the allocation side effect.
    pub fn peek(&self, id: u16) -> Option<MessageRecord> {
        self.find(id)
    }

    /// Set one flag on the record for `id`, allocating the record if the id
    /// has never been seen.
    pub fn set_flag(&mut self, id: u16, flag: DedupFlag, value: bool) {
        if let Some(i) = self.position(id) {
            Self::apply(&mut self.slots[i], flag, value);
            return;
        }
        let mut record = MessageRecord::fresh(id);
        Self::apply(&mut record, flag, value);
        self.insert(record);
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no ids have been recorded.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }

    fn find(&self, id: u16) -> Option<MessageRecord> {
        self.position(id).map(|i| self.slots[i])
    }

    fn position(&self, id: u16) -> Option<usize> {
        self.slots.iter().position(|r| r.id == id)
    }

    fn insert(&mut self, record: MessageRecord) {
        if self.slots.len() < self.capacity {
            self.slots.push(record);
            self.cursor = self.slots.len() % self.capacity;
        } else {
            // Full: overwrite the slot under the cursor, oldest-inserted first
            self.slots[self.cursor] = record;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
    }

    fn apply(record: &mut MessageRecord, flag: DedupFlag, value: bool) {
        match flag {
            DedupFlag::WasBroadcast => record.was_broadcast = value,
            DedupFlag::InverseSent => record.inverse_sent = value,
            DedupFlag::UnicastWon => record.unicast_won = value,
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}
