//! Application-layer collaborators.
//!
//! The routing core delivers [`AppMessage`]s through the narrow
//! [`AppRegistry::handle_request`] contract and otherwise treats them as
//! opaque cargo. A handler may rewrite `req_type` in place as a reply
//! signal; the dispatch layer inspects the rewrite (KeyExchange becoming
//! ExchangedKey) to decide whether a follow-up Send is chained.

use crate::protocol::{AppMessage, AppRequest};
use crate::Address;
use tracing::debug;

/// One application behind the dispatch seam.
pub trait AppHandler: Send {
    /// Whether this handler services the given request kind.
    fn accepts(&self, req: AppRequest) -> bool;

    /// Deliver a message. Returns false on a delivery failure the server
    /// should hear about. May rewrite `msg.req_type` as a reply signal.
    fn handle(&mut self, msg: &mut AppMessage, local_addr: Address) -> bool;
}

/// Stamp delivery metadata onto an app message before it is flooded or
/// forwarded on behalf of the server.
pub fn stamp_delivery(msg: &mut AppMessage, kind: AppRequest) {
    msg.req_type = kind;
}

// ============================================================================
// Registry
// ============================================================================

/// The set of applications registered on a node.
pub struct AppRegistry {
    handlers: Vec<Box<dyn AppHandler>>,
}

impl AppRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Registry with the stock key-exchange and delivery apps.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(KeyExchangeApp::new()));
        registry.register(Box::new(DeliveryApp::new()));
        registry
    }

    /// Add a handler.
    pub fn register(&mut self, handler: Box<dyn AppHandler>) {
        self.handlers.push(handler);
    }

    /// Deliver a message to the first handler accepting its request kind.
    ///
    /// Returns false when no handler accepts it or the accepting handler
    /// reports failure.
    pub fn handle_request(&mut self, msg: &mut AppMessage, local_addr: Address) -> bool {
        for handler in &mut self.handlers {
            if handler.accepts(msg.req_type) {
                return handler.handle(msg, local_addr);
            }
        }
        debug!(req_type = ?msg.req_type, node = %local_addr, "No app handler for request");
        false
    }
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Stock handlers
// ============================================================================

/// Minimal key-exchange app: stores the peer key material from the message
/// body and answers a KeyExchange by rewriting it to ExchangedKey.
pub struct KeyExchangeApp {
    peer_keys: Vec<(Address, Vec<u8>)>,
    local_key: Vec<u8>,
}

impl KeyExchangeApp {
    /// Create a key-exchange app with a random local key.
    pub fn new() -> Self {
        use rand::Rng;
        let local_key: [u8; 16] = rand::thread_rng().gen();
        Self {
            peer_keys: Vec::new(),
            local_key: local_key.to_vec(),
        }
    }

    /// Key material stored for a peer, if any.
    pub fn peer_key(&self, addr: Address) -> Option<&[u8]> {
        self.peer_keys
            .iter()
            .find(|(a, _)| *a == addr)
            .map(|(_, k)| k.as_slice())
    }

    fn store(&mut self, addr: Address, key: Vec<u8>) {
        if let Some(entry) = self.peer_keys.iter_mut().find(|(a, _)| *a == addr) {
            entry.1 = key;
        } else {
            self.peer_keys.push((addr, key));
        }
    }
}

impl Default for KeyExchangeApp {
    fn default() -> Self {
        Self::new()
    }
}

impl AppHandler for KeyExchangeApp {
    fn accepts(&self, req: AppRequest) -> bool {
        matches!(req, AppRequest::KeyExchange | AppRequest::ExchangedKey)
    }

    fn handle(&mut self, msg: &mut AppMessage, _local_addr: Address) -> bool {
        match msg.req_type {
            AppRequest::KeyExchange => {
                self.store(msg.addr_from, std::mem::take(&mut msg.body));
                // Reply signal: the dispatcher chains a Send carrying our key
                msg.req_type = AppRequest::ExchangedKey;
                msg.body = self.local_key.clone();
                true
            }
            AppRequest::ExchangedKey => {
                self.store(msg.addr_from, std::mem::take(&mut msg.body));
                true
            }
            _ => false,
        }
    }
}

/// Inbox app: accepts plain deliveries and flood/unicast cargo.
pub struct DeliveryApp {
    inbox: Vec<AppMessage>,
}

impl DeliveryApp {
    /// Create an empty inbox.
    pub fn new() -> Self {
        Self { inbox: Vec::new() }
    }

    /// Messages received so far.
    pub fn inbox(&self) -> &[AppMessage] {
        &self.inbox
    }
}

impl Default for DeliveryApp {
    fn default() -> Self {
        Self::new()
    }
}

impl AppHandler for DeliveryApp {
    fn accepts(&self, req: AppRequest) -> bool {
        matches!(
            req,
            AppRequest::Delivery | AppRequest::Broadcast | AppRequest::Unicast
        )
    }

    fn handle(&mut self, msg: &mut AppMessage, _local_addr: Address) -> bool {
        self.inbox.push(msg.clone());
        true
    }
}
