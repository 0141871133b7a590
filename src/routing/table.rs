//! Per-node routing table: destination -> (next hop, metric).

use crate::Address;

/// Number of addressable table slots (address 255 is the sentinel).
pub const MAX_NODES: usize = 255;

/// One learned route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    /// Neighbor to forward through.
    pub next_hop: Address,
    /// Path cost; lower is better.
    pub metric: i8,
}

/// Fixed-size routing table indexed by destination address.
///
/// An absent entry means "must flood-discover", never "unreachable forever".
/// The table performs no metric comparison of its own; callers decide when
/// an overwrite is an improvement.
pub struct RoutingTable {
    entries: [Option<RouteEntry>; MAX_NODES],
}

impl RoutingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: [None; MAX_NODES],
        }
    }

    /// Next hop toward `dest`, if one is known.
    pub fn next_hop(&self, dest: Address) -> Option<Address> {
        self.get(dest).map(|entry| entry.next_hop)
    }

    /// Full entry for `dest`, if one is known.
    pub fn get(&self, dest: Address) -> Option<RouteEntry> {
        self.slot(dest).and_then(|i| self.entries[i])
    }

    /// Install or overwrite the route for `dest` unconditionally.
    ///
    /// A sentinel `dest` or `next_hop` is ignored: the table never stores a
    /// route to nowhere or through nowhere.
    pub fn set(&mut self, dest: Address, next_hop: Address, metric: i8) {
        if next_hop.is_none() {
            return;
        }
        if let Some(i) = self.slot(dest) {
            self.entries[i] = Some(RouteEntry { next_hop, metric });
        }
    }

    /// Forget the route for `dest` (used when a forwarding attempt through
    /// the recorded hop fails, signalling the path is stale).
    pub fn delete(&mut self, dest: Address) {
        if let Some(i) = self.slot(dest) {
            self.entries[i] = None;
        }
    }

    /// Number of known routes.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Check if no routes are known.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }

    /// Drop every learned route.
    pub fn clear(&mut self) {
        self.entries = [None; MAX_NODES];
    }

    fn slot(&self, dest: Address) -> Option<usize> {
        if dest.is_none() {
            None
        } else {
            Some(dest.as_u8() as usize)
        }
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}
