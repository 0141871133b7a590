//! Send handling: local delivery, table forwarding, flood fallback.

use crate::app::stamp_delivery;
use crate::node::{Node, SendOutcome};
use crate::protocol::{
    AppMessage, AppRequest, Frame, NotifyType, Request, RoutePayload, SendPayload, Sender,
};
use crate::cache::DedupFlag;
use tracing::{debug, info, warn};

impl Node {
    /// Handle a server-originated Send.
    pub(in crate::node) async fn handle_server_send(&mut self, mut payload: SendPayload) -> SendOutcome {
        stamp_delivery(&mut payload.app, AppRequest::Delivery);

        if payload.addr_to == self.addr() {
            debug!("Message for node itself");
            let id = payload.app.id;
            let mut app = payload.app;
            let ok = {
                let addr = self.addr();
                self.apps_mut().handle_request(&mut app, addr)
            };
            if ok {
                if !self.notify_server(NotifyType::GotMessage, id).await {
                    warn!("Failed to notify server");
                }
                return SendOutcome::Delivered;
            }
            warn!("Failed to handle app request");
            if !self.notify_server(NotifyType::Fail, id).await {
                warn!("Failed to notify fail");
            }
            return SendOutcome::Failed;
        }

        debug!(dest = %payload.addr_to, "Finding route");
        match self.routing().next_hop(payload.addr_to) {
            Some(next) => self.forward_send(payload, next).await,
            None => {
                debug!(dest = %payload.addr_to, "No route yet, starting discovery flood");
                self.start_route_discovery(&payload).await;
                SendOutcome::FloodStarted
            }
        }
    }

    /// Handle a node-originated Send (transit or final hop).
    pub(in crate::node) async fn handle_node_send(&mut self, payload: SendPayload) -> SendOutcome {
        if payload.addr_to == self.addr() {
            if self.handle_app_request_chain(payload.app).await {
                SendOutcome::Delivered
            } else {
                SendOutcome::Failed
            }
        } else {
            self.send_next(payload).await
        }
    }

    /// Forward a Send toward its destination via the routing table.
    ///
    /// A missing or stale hop is not fatal: the entry is dropped and a
    /// fresh discovery flood starts from this node.
    pub(in crate::node) async fn send_next(&mut self, payload: SendPayload) -> SendOutcome {
        let next = match self.routing().next_hop(payload.addr_to) {
            Some(next) => next,
            None => {
                // The path may have died after discovery; flood again
                warn!(dest = %payload.addr_to, "No path in table, starting discovery flood");
                self.start_route_discovery(&payload).await;
                return SendOutcome::FloodStarted;
            }
        };

        self.forward_send(payload, next).await
    }

    async fn forward_send(&mut self, payload: SendPayload, next: crate::Address) -> SendOutcome {
        let dest = payload.addr_to;
        let from = payload.addr_from;
        let body_len = payload.app.body.len();
        let frame = Frame::new(Sender::Node, Request::Send(payload.clone()));

        match self.link_send(next, &frame.encode()).await {
            Ok(()) => {
                info!(
                    body_len = body_len,
                    from = %from,
                    to = %dest,
                    next_hop = %next,
                    "Forwarded message"
                );
                SendOutcome::Forwarded(next)
            }
            Err(e) => {
                // Stale hop: forget it and rediscover from here
                warn!(next_hop = %next, dest = %dest, error = %e, "Stale next hop, rediscovering");
                self.routing_mut().delete(dest);
                self.start_route_discovery(&payload).await;
                SendOutcome::FloodStarted
            }
        }
    }

    /// Originate a route-discovery flood carrying a Send's app payload.
    pub(in crate::node) async fn start_route_discovery(&mut self, payload: &SendPayload) {
        let route = RoutePayload {
            sender_addr: payload.addr_from,
            receiver_addr: payload.addr_to,
            local_sender_addr: self.addr(),
            time_to_live: self.ttl_max(),
            id: payload.app.id,
            app: payload.app.clone(),
        };

        // Mark our own flood so an echoed copy is never re-flooded
        self.dedup_mut()
            .set_flag(route.id, DedupFlag::WasBroadcast, true);

        let suppressed = self.stop_broadcast();
        self.broadcast_route(None, route, suppressed).await;
    }

    /// Send an app message from this node, resolving the route or starting
    /// discovery. This is the node-side entry point the server's Send
    /// command also funnels into.
    pub async fn originate_send(&mut self, to: crate::Address, app: AppMessage) -> SendOutcome {
        let payload = SendPayload {
            addr_from: self.addr(),
            addr_to: to,
            app,
        };
        if payload.addr_to == self.addr() {
            return self.handle_node_send(payload).await;
        }
        self.send_next(payload).await
    }

    /// Deliver an app message locally, running the notify chain and any
    /// follow-up the app's reply signal asks for.
    pub(in crate::node) async fn handle_app_request_chain(&mut self, mut app: AppMessage) -> bool {
        let id = app.id;
        let requested = app.req_type;
        let is_unicast = requested == AppRequest::Unicast;

        // A handled unicast tells the server twice: delivery and contest
        // completion. Both are suppressed once this node lost the contest.
        if is_unicast {
            if self.stop_broadcast() {
                debug!(id = id, "Unicast notifications suppressed after lost contest");
            } else {
                if !self.notify_server(NotifyType::GotMessage, id).await {
                    warn!("Failed to notify server");
                }
                if !self.notify_server(NotifyType::UnicastHandled, id).await {
                    warn!("Failed to notify server");
                }
            }
        }

        let ok = {
            let addr = self.addr();
            self.apps_mut().handle_request(&mut app, addr)
        };

        if !ok {
            if !self.notify_server(NotifyType::Fail, id).await {
                warn!("Failed to notify fail");
            }
            return false;
        }

        if !is_unicast && !self.notify_server(NotifyType::GotMessage, id).await {
            warn!("Failed to notify server");
        }

        // Key exchange round-trip: the app rewrote the request into its
        // reply; chain a Send carrying it back to the app-level sender.
        if requested == AppRequest::KeyExchange && app.req_type == AppRequest::ExchangedKey {
            let reply_to = app.addr_from;
            let reply = AppMessage::new(app.id, app.req_type, self.addr(), reply_to, app.body);
            debug!(to = %reply_to, "Chaining exchanged-key reply");
            let payload = SendPayload {
                addr_from: self.addr(),
                addr_to: reply_to,
                app: reply,
            };
            self.send_next(payload).await;
        }

        true
    }
}
