//! Mesh Relay: a multi-hop message-relay overlay.
//!
//! A set of node processes connected point-to-point over TCP, coordinated
//! by a server process, forming an ad-hoc mesh where messages traverse
//! intermediate nodes to reach destinations with no direct link. Routes
//! are discovered on demand: a TTL-bounded RouteDirect flood teaches every
//! node on the path a reverse route to the originator, and a RouteInverse
//! confirmation retraces that path installing forward routes. A
//! fixed-capacity recency cache keeps convergent flood copies from
//! multiplying work.

pub mod addr;
pub mod app;
pub mod cache;
pub mod config;
pub mod node;
pub mod protocol;
pub mod routing;
pub mod server;
pub mod transport;

// Re-export the address type
pub use addr::Address;

// Re-export config types
pub use config::{Config, ConfigError, MeshConfig, NodeConfig, PeerConfig};

// Re-export protocol types
pub use protocol::{
    AppMessage, AppRequest, BroadcastPayload, Command, ContestPayload, Frame, NotifyPayload,
    NotifyType, ProtocolError, Request, RequestResult, RoutePayload, Sender, SendPayload,
    UpdatePayload,
};

// Re-export routing and cache types
pub use cache::{DedupCache, DedupFlag, MessageRecord, MAX_MESSAGE_DATA};
pub use routing::{RouteEntry, RoutingTable, MAX_NODES};

// Re-export node and server entities
pub use node::{Node, NodeError, NodeState, SendOutcome};
pub use server::{NodeRecord, Server, ServerError};

// Re-export transport surface
pub use transport::{Endpoint, Link, LinkPool, TransportError, DEFAULT_MAX_FRAME_LEN};
