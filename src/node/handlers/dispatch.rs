//! Top-level request dispatch.

use crate::node::Node;
use crate::protocol::{Frame, Request, RequestResult, Sender};
use crate::transport::ReplyTx;
use tracing::{debug, info, warn};

impl Node {
    /// Dispatch one decoded frame to the appropriate handler.
    ///
    /// Runs to completion before the next frame is taken off the packet
    /// channel, so every read-modify-write on the routing table and dedup
    /// cache is a single critical section.
    pub async fn dispatch(&mut self, frame: Frame, reply: Option<&ReplyTx>) {
        let command = frame.request.command();

        // A killed node answers supervision probes only
        if !self.is_alive()
            && !matches!(
                frame.request,
                Request::Ping(_) | Request::ReviveNode(_)
            )
        {
            debug!(command = %command, "Dropping request on killed node");
            return;
        }

        let sender = frame.sender;
        match frame.request {
            Request::Ping(_) => self.handle_ping(reply),
            Request::KillNode(addr) => {
                if addr.map_or(true, |a| a == self.addr()) {
                    info!("Node killed by supervision");
                    self.set_alive(false);
                }
            }
            Request::ReviveNode(addr) => {
                if addr.map_or(true, |a| a == self.addr()) {
                    info!("Node revived by supervision");
                    self.set_alive(true);
                }
            }
            Request::Reset => self.handle_reset(),
            Request::Send(payload) => {
                let outcome = match sender {
                    Sender::Server => self.handle_server_send(payload).await,
                    Sender::Node => self.handle_node_send(payload).await,
                };
                debug!(outcome = ?outcome, "Send handled");
            }
            Request::Broadcast(payload) => self.handle_broadcast(payload).await,
            Request::Unicast(payload) => self.handle_server_unicast(payload).await,
            Request::UnicastContest(payload) => self.handle_unicast_contest(payload).await,
            Request::UnicastFirst(payload) => self.handle_unicast_first(payload).await,
            Request::RouteDirect(payload) => self.handle_route_direct(payload).await,
            Request::RouteInverse(payload) => {
                if let Err(e) = self.handle_route_inverse(payload).await {
                    warn!(error = %e, "Route confirmation failed");
                }
            }
            // Server-bound status traffic has no business at a node
            Request::Update(_) | Request::Notify(_) => {
                debug!(command = %command, "Ignoring server-bound request");
            }
        }
    }

    /// Answer a liveness probe with a single status byte on the connection
    /// the probe arrived on.
    fn handle_ping(&self, reply: Option<&ReplyTx>) {
        match reply {
            Some(reply) => {
                if reply.send(vec![RequestResult::Ok.to_byte()]).is_err() {
                    warn!("Failed to respond to ping");
                }
            }
            None => warn!("Ping without a reply channel"),
        }
    }

    /// Clear broadcast suppression and drop pooled connections.
    fn handle_reset(&mut self) {
        info!("Reset: clearing broadcast suppression and pooled links");
        self.set_stop_broadcast(false);
        self.links_mut().reset();
    }
}
