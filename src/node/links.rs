//! Outbound link helpers: peer sends, neighbor floods, server traffic.

use super::Node;
use crate::protocol::{
    Frame, NotifyPayload, NotifyType, Request, RoutePayload, Sender, UpdatePayload,
};
use crate::transport::{Endpoint, TransportError};
use crate::Address;
use tracing::{debug, warn};

impl Node {
    /// Acquire or reuse a connection to a peer and write one framed message.
    ///
    /// Peers without a configured endpoint fall back to the port
    /// convention (`mesh.base_port + addr` on loopback), matching how nodes
    /// are spawned by the server.
    pub(crate) async fn link_send(
        &mut self,
        addr: Address,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        if !self.links().has_link(addr) && !self.links().neighbor_addrs().contains(&addr) {
            let endpoint = Endpoint {
                host: "127.0.0.1".to_string(),
                port: self.config().port_for(addr.as_u8()),
            };
            self.links_mut().add_endpoint(addr, endpoint);
        }
        self.links_mut().send(addr, bytes).await
    }

    /// Flood a route-direct payload to every neighbor except the hop it
    /// arrived from. A suppressed flood (stop_broadcast) is a no-op.
    pub(in crate::node) async fn broadcast_route(
        &mut self,
        exclude: Option<Address>,
        payload: RoutePayload,
        suppressed: bool,
    ) {
        if suppressed {
            debug!(id = payload.id, "Route flood suppressed");
            return;
        }
        let frame = Frame::new(Sender::Node, Request::RouteDirect(payload));
        self.broadcast_frame(exclude, &frame).await;
    }

    /// Send an encoded frame to every neighbor except one.
    pub(in crate::node) async fn broadcast_frame(&mut self, exclude: Option<Address>, frame: &Frame) {
        let bytes = frame.encode();
        let neighbors = self.links().neighbor_addrs();

        for addr in neighbors {
            if Some(addr) == exclude || addr == self.addr() {
                continue;
            }
            if let Err(e) = self.link_send(addr, &bytes).await {
                debug!(neighbor = %addr, error = %e, "Broadcast send failed");
            }
        }
    }

    /// Inform the server of an outcome. Best effort: a failure is logged
    /// and reported as `false`, never bubbled into routing decisions.
    pub(crate) async fn notify_server(&mut self, notify_type: NotifyType, app_msg_id: u16) -> bool {
        let frame = Frame::new(
            Sender::Node,
            Request::Notify(NotifyPayload {
                notify_type,
                app_msg_id,
            }),
        );
        self.send_to_server(&frame.encode()).await
    }

    /// Send the periodic liveness heartbeat.
    pub(crate) async fn send_update(&mut self) -> bool {
        let frame = Frame::new(
            Sender::Node,
            Request::Update(UpdatePayload {
                port: self.config().listen_port(),
                addr: self.addr(),
                pid: std::process::id(),
            }),
        );
        self.send_to_server(&frame.encode()).await
    }

    async fn send_to_server(&mut self, bytes: &[u8]) -> bool {
        let mut link = match self.take_server_link() {
            Some(link) => link,
            None => match self.connect_server().await {
                Some(link) => link,
                None => return false,
            },
        };

        let timeout = self.config().send_timeout();
        match link.send(bytes, timeout).await {
            Ok(()) => {
                self.put_server_link(link);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to reach server; dropping server link");
                false
            }
        }
    }

    async fn connect_server(&mut self) -> Option<crate::transport::Link> {
        let host = self.config().node.server_host.clone();
        let port = self.config().node.server_port;
        let timeout = self.config().connect_timeout();

        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host.as_str(), port)))
            .await
        {
            Ok(Ok(stream)) => Some(crate::transport::Link::from_writer(Box::new(stream))),
            Ok(Err(e)) => {
                warn!(host = %host, port = port, error = %e, "Server connect failed");
                None
            }
            Err(_) => {
                warn!(host = %host, port = port, "Server connect timed out");
                None
            }
        }
    }
}
