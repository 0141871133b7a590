//! Mesh node entity.
//!
//! Top-level structure representing a running relay node. The Node owns all
//! state the routing protocol needs: its address, the routing table, the
//! message dedup cache, the registered applications, the outbound link
//! pool, and the broadcast-suppression flag. All of it is explicit owned
//! state threaded through the handlers, never process-wide
//! statics.

mod handlers;
mod lifecycle;
mod links;
#[cfg(test)]
mod tests;

use crate::app::AppRegistry;
use crate::cache::DedupCache;
use crate::config::Config;
use crate::routing::RoutingTable;
use crate::transport::{FrameRx, FrameTx, Link, LinkPool, TransportError};
use crate::Address;
use std::fmt;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors related to node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node not started")]
    NotStarted,

    #[error("node already started")]
    AlreadyStarted,

    #[error("no reverse path toward {0} for route confirmation")]
    RouteInverseNoPath(Address),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Node operational state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created but not started.
    Created,
    /// Listener bound, dispatch loop may run.
    Running,
    /// Stopped.
    Stopped,
}

impl NodeState {
    /// Check if the node can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, NodeState::Created | NodeState::Stopped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of handling a Send request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Destination was this node; delivered to the app layer.
    Delivered,
    /// Forwarded to the recorded next hop.
    Forwarded(Address),
    /// No usable route; a discovery flood was started instead. Not a hard
    /// failure: the message travels with the flood.
    FloodStarted,
    /// Local delivery failed (reported to the server).
    Failed,
}

/// A running relay node.
pub struct Node {
    /// This node's mesh address.
    addr: Address,
    /// Loaded configuration.
    config: Config,
    /// Operational state.
    state: NodeState,
    /// Liveness toggle driven by KillNode/ReviveNode supervision.
    alive: bool,
    /// Once set, this node stops participating in floods until Reset.
    stop_broadcast: bool,
    /// Destination -> (next hop, metric).
    routing: RoutingTable,
    /// Recency cache suppressing duplicate flood work.
    dedup: DedupCache,
    /// Registered applications.
    apps: AppRegistry,
    /// Outbound links to neighbors.
    links: LinkPool,
    /// Link to the coordinating server, connected lazily.
    server_link: Option<Link>,
    /// Keeps the packet channel open while no connections exist.
    #[allow(dead_code)]
    frame_tx: Option<FrameTx>,
    /// Receiver side consumed by the dispatch loop.
    frame_rx: Option<FrameRx>,
    /// Accept-loop task handle.
    listener_task: Option<JoinHandle<()>>,
}

impl Node {
    /// Create a node from configuration.
    pub fn new(config: Config) -> Self {
        let addr = config.addr();
        let mut links = LinkPool::new(config.connect_timeout(), config.send_timeout());
        for peer in &config.peers {
            links.add_endpoint(Address::new(peer.addr), config.peer_endpoint(peer));
        }

        Self {
            addr,
            dedup: DedupCache::with_capacity(config.mesh.dedup_capacity),
            config,
            state: NodeState::Created,
            alive: true,
            stop_broadcast: false,
            routing: RoutingTable::new(),
            apps: AppRegistry::with_defaults(),
            links,
            server_link: None,
            frame_tx: None,
            frame_rx: None,
            listener_task: None,
        }
    }

    // === Identity ===

    /// This node's mesh address.
    pub fn addr(&self) -> Address {
        self.addr
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // === State ===

    /// Operational state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    /// Whether the node currently accepts traffic (KillNode clears this).
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    /// Whether flood participation is suppressed.
    pub fn stop_broadcast(&self) -> bool {
        self.stop_broadcast
    }

    /// Set or clear flood suppression (set after a lost contest, cleared by
    /// Reset).
    pub fn set_stop_broadcast(&mut self, value: bool) {
        self.stop_broadcast = value;
    }

    // === Routing state ===

    /// The routing table.
    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// Mutable routing table.
    pub fn routing_mut(&mut self) -> &mut RoutingTable {
        &mut self.routing
    }

    /// The dedup cache.
    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Mutable dedup cache.
    pub fn dedup_mut(&mut self) -> &mut DedupCache {
        &mut self.dedup
    }

    // === Applications ===

    /// Registered applications.
    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    /// Mutable application registry.
    pub fn apps_mut(&mut self) -> &mut AppRegistry {
        &mut self.apps
    }

    // === Links ===

    pub(crate) fn links(&self) -> &LinkPool {
        &self.links
    }

    pub(crate) fn links_mut(&mut self) -> &mut LinkPool {
        &mut self.links
    }

    /// Install a ready link to a neighbor (tests wire duplex halves here).
    pub fn install_link(&mut self, addr: Address, link: Link) {
        self.links.insert_link(addr, link);
    }

    /// Install a ready link to the server.
    pub fn install_server_link(&mut self, link: Link) {
        self.server_link = Some(link);
    }

    pub(crate) fn take_server_link(&mut self) -> Option<Link> {
        self.server_link.take()
    }

    pub(crate) fn put_server_link(&mut self, link: Link) {
        self.server_link = Some(link);
    }

    /// Hop budget this node starts floods with.
    pub fn ttl_max(&self) -> i8 {
        self.config.mesh.ttl
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("addr", &self.addr)
            .field("state", &self.state)
            .field("alive", &self.alive)
            .field("stop_broadcast", &self.stop_broadcast)
            .field("routes", &self.routing.len())
            .finish()
    }
}
