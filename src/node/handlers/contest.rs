//! Broadcast flooding and the unicast contest protocol.

use crate::app::stamp_delivery;
use crate::cache::DedupFlag;
use crate::node::Node;
use crate::protocol::{
    AppRequest, BroadcastPayload, Command, ContestPayload, Frame, NotifyType, Request, SendPayload,
    Sender,
};
use tracing::{debug, warn};

impl Node {
    /// Handle a Broadcast: deliver locally once, then re-flood.
    ///
    /// TTL and the dedup cache jointly bound the flood: a dead hop budget
    /// drops the copy silently, and a second copy of a known id is ignored
    /// no matter how it arrived.
    pub(in crate::node) async fn handle_broadcast(&mut self, mut payload: BroadcastPayload) {
        if payload.time_to_live <= 0 {
            return;
        }

        let id = payload.app.id;
        if let Some(record) = self.dedup_mut().lookup(id) {
            if record.was_broadcast {
                return;
            }
        }
        self.dedup_mut().set_flag(id, DedupFlag::WasBroadcast, true);

        stamp_delivery(&mut payload.app, AppRequest::Broadcast);

        let mut app = payload.app.clone();
        let delivered = {
            let addr = self.addr();
            self.apps_mut().handle_request(&mut app, addr)
        };
        if delivered {
            if !self.notify_server(NotifyType::GotMessage, id).await {
                warn!("Failed to notify server");
            }
        } else {
            warn!(id = id, "Broadcast delivery failed");
            if !self.notify_server(NotifyType::Fail, id).await {
                warn!("Failed to notify fail");
            }
        }

        payload.time_to_live -= 1;
        if payload.time_to_live <= 0 {
            return;
        }

        let exclude = payload.addr_from;
        let suppressed = self.stop_broadcast();
        if suppressed {
            debug!(id = id, "Broadcast re-flood suppressed");
            return;
        }
        let frame = Frame::new(Sender::Node, Request::Broadcast(payload));
        self.broadcast_frame(Some(exclude), &frame).await;
    }

    /// Handle a server-originated Unicast: open a first-responder contest
    /// by flooding a contest announcement carrying this node's address.
    pub(in crate::node) async fn handle_server_unicast(&mut self, mut payload: BroadcastPayload) {
        stamp_delivery(&mut payload.app, AppRequest::Unicast);

        let contest = ContestPayload {
            req: Command::UnicastContest,
            node_addr: self.addr(),
            app: payload.app,
        };
        let frame = Frame::new(Sender::Node, Request::UnicastContest(contest));
        self.broadcast_frame(None, &frame).await;
    }

    /// Handle a contest announcement: volunteer by answering the initiator
    /// directly with a UnicastFirst.
    pub(in crate::node) async fn handle_unicast_contest(&mut self, payload: ContestPayload) {
        debug!(initiator = %payload.node_addr, "Unicast contest request");

        let response = ContestPayload {
            req: Command::UnicastFirst,
            node_addr: self.addr(),
            app: payload.app,
        };
        let initiator = payload.node_addr;
        let frame = Frame::new(Sender::Node, Request::UnicastFirst(response));
        if let Err(e) = self.link_send(initiator, &frame.encode()).await {
            warn!(initiator = %initiator, error = %e, "Failed to answer unicast contest");
        }
    }

    /// Handle a contest response at the initiator: the first responder per
    /// message id wins and receives the payload; later responses for the
    /// same id are silent no-ops.
    pub(in crate::node) async fn handle_unicast_first(&mut self, payload: ContestPayload) {
        let id = payload.app.id;

        if let Some(record) = self.dedup_mut().lookup(id) {
            if record.unicast_won {
                return;
            }
        }
        self.dedup_mut().set_flag(id, DedupFlag::UnicastWon, true);

        let winner = payload.node_addr;
        debug!(winner = %winner, id = id, "Node won unicast contest");

        let send = SendPayload {
            addr_from: self.addr(),
            addr_to: winner,
            app: payload.app,
        };
        let frame = Frame::new(Sender::Node, Request::Send(send));
        if let Err(e) = self.link_send(winner, &frame.encode()).await {
            warn!(winner = %winner, error = %e, "Failed to send response to unicast first");
        }
    }
}
