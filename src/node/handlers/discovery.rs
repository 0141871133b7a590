//! Route discovery: direct flood handling, reverse confirmation, delivery.
//!
//! A node with no route to a destination floods a RouteDirect request with
//! a hop budget. Every node on the flood path opportunistically learns a
//! reverse path to the originator by comparing elapsed-hop metrics. The
//! destination answers with a RouteInverse unicast that retraces the
//! learned reverse path, installing forward routes as it goes. The dedup
//! cache keeps convergent flood copies from multiplying work: one re-flood
//! per id per node, one confirmation per id at the receiver.

use crate::cache::DedupFlag;
use crate::node::{Node, NodeError};
use crate::protocol::{Frame, NotifyType, Request, RoutePayload, Sender};
use tracing::{debug, warn};

impl Node {
    /// Handle a RouteDirect flood copy.
    ///
    /// Order matters: hop budget first (a dead flood spends no dedup slot),
    /// dedup second (one re-flood per id), then reverse-path learning,
    /// then either local delivery or propagation.
    pub(in crate::node) async fn handle_route_direct(&mut self, mut route: RoutePayload) {
        if route.time_to_live <= 0 {
            return;
        }

        // Our own flood echoed back through a cycle; nothing to learn
        if route.sender_addr == self.addr() {
            return;
        }

        let id = route.app.id;
        if let Some(record) = self.dedup_mut().lookup(id) {
            if record.was_broadcast {
                return;
            }
        }
        self.dedup_mut().set_flag(id, DedupFlag::WasBroadcast, true);

        // Reverse-path learning: this copy is new_metric hops from the
        // originator, reachable through the neighbor that handed it to us.
        let new_metric = self.ttl_max() - route.time_to_live + 1;
        if new_metric > 0 {
            match self.routing().get(route.sender_addr) {
                None => {
                    self.routing_mut()
                        .set(route.sender_addr, route.local_sender_addr, new_metric);
                }
                Some(old) if old.metric > new_metric => {
                    self.routing_mut()
                        .set(route.sender_addr, route.local_sender_addr, new_metric);
                    debug!(
                        old_metric = old.metric,
                        new_metric = new_metric,
                        "Replaced old path with better metric"
                    );
                }
                Some(_) => {}
            }
        }

        if route.receiver_addr == self.addr() {
            if let Err(e) = self.route_direct_delivered(route).await {
                warn!(error = %e, "Route delivery failed");
            }
            return;
        }

        // Propagate: spend a hop, stamp ourselves as the local sender, and
        // flood everywhere but the arrival hop
        let arrival = route.local_sender_addr;
        route.local_sender_addr = self.addr();
        route.time_to_live -= 1;

        let suppressed = self.stop_broadcast();
        self.broadcast_route(Some(arrival), route, suppressed).await;
    }

    /// The flood reached its destination: confirm the path, then deliver.
    ///
    /// Runs once per message id no matter how many flood copies converge
    /// here. The confirmation is sent before the app sees the payload; if
    /// the confirmation cannot leave this node, the stale reverse route is
    /// dropped and delivery is skipped, so the originator never gets a
    /// confirmed path the receiver couldn't answer on.
    async fn route_direct_delivered(&mut self, mut route: RoutePayload) -> Result<(), NodeError> {
        let id = route.app.id;

        debug!(receiver = %route.receiver_addr, "Reached the receiver addr");

        if let Some(record) = self.dedup_mut().lookup(id) {
            if record.inverse_sent {
                return Ok(());
            }
        }
        self.dedup_mut().set_flag(id, DedupFlag::InverseSent, true);

        route.time_to_live = self.ttl_max();
        route.local_sender_addr = self.addr();

        let back = self
            .routing()
            .next_hop(route.sender_addr)
            .ok_or(NodeError::RouteInverseNoPath(route.sender_addr))?;

        let origin = route.sender_addr;
        let app = route.app.clone();
        let frame = Frame::new(Sender::Node, Request::RouteInverse(route));
        if let Err(e) = self.link_send(back, &frame.encode()).await {
            self.routing_mut().delete(origin);
            return Err(e.into());
        }

        if !self.handle_app_request_chain(app).await {
            warn!("Failed to handle app request");
        }

        Ok(())
    }

    /// Handle a RouteInverse confirmation retracing the flood path.
    pub(in crate::node) async fn handle_route_inverse(
        &mut self,
        mut route: RoutePayload,
    ) -> Result<(), NodeError> {
        if route.time_to_live <= 0 {
            return Ok(());
        }

        debug!(receiver = %route.receiver_addr, sender = %route.sender_addr, "Route inverse");

        // Forward-route learning, one-shot: a confirmation never overwrites
        // an already-learned route to the receiver
        let new_metric = self.ttl_max() - route.time_to_live + 1;
        if new_metric > 0
            && route.receiver_addr != self.addr()
            && self.routing().next_hop(route.receiver_addr).is_none()
        {
            self.routing_mut()
                .set(route.receiver_addr, route.local_sender_addr, new_metric);
        }

        if route.sender_addr == self.addr() {
            debug!("Route inverse request came back");
            if !self.notify_server(NotifyType::InverseCompleted, route.app.id).await {
                warn!("Failed to notify server");
            }
            return Ok(());
        }

        let next = self
            .routing()
            .next_hop(route.sender_addr)
            .ok_or(NodeError::RouteInverseNoPath(route.sender_addr))?;

        let origin = route.sender_addr;
        route.local_sender_addr = self.addr();
        route.time_to_live -= 1;

        let frame = Frame::new(Sender::Node, Request::RouteInverse(route));
        if let Err(e) = self.link_send(next, &frame.encode()).await {
            warn!(next_hop = %next, error = %e, "Failed to travel back, dropping stale route");
            self.routing_mut().delete(origin);
            return Err(e.into());
        }

        Ok(())
    }
}
