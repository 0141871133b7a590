//! Coordinating server.
//!
//! The server tracks the node fleet through Update heartbeats, collects
//! outcome notifications, and issues the administrative commands (ping,
//! send, broadcast, unicast, kill, revive, reset) that drive the mesh.
//! It never routes; routing is entirely the nodes' business.

use crate::config::Config;
use crate::protocol::{
    AppMessage, BroadcastPayload, Command, Frame, NotifyPayload, Request, RequestResult,
    SendPayload, Sender,
};
use crate::transport::{frame_channel, serve_connection, write_frame, Endpoint, TransportError};
use crate::Address;
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Errors related to server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// What the server knows about one node.
#[derive(Clone, Debug)]
pub struct NodeRecord {
    /// The node's mesh address.
    pub addr: Address,
    /// Port the node listens on.
    pub port: u16,
    /// The node's OS process id.
    pub pid: u32,
    /// Liveness as last commanded/observed.
    pub alive: bool,
    /// Timestamp of the last heartbeat (ms since the epoch).
    pub last_seen_ms: u64,
}

/// The coordinating server.
pub struct Server {
    config: Config,
    fleet: HashMap<Address, NodeRecord>,
    notifications: Vec<NotifyPayload>,
}

impl Server {
    /// Create a server from configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fleet: HashMap::new(),
            notifications: Vec::new(),
        }
    }

    // === Fleet state ===

    /// Record for a node, if it has ever reported in.
    pub fn node(&self, addr: Address) -> Option<&NodeRecord> {
        self.fleet.get(&addr)
    }

    /// Number of nodes that have reported in.
    pub fn fleet_size(&self) -> usize {
        self.fleet.len()
    }

    /// Notifications received so far, oldest first.
    pub fn notifications(&self) -> &[NotifyPayload] {
        &self.notifications
    }

    /// Mark a node's liveness (mirrors a KillNode/ReviveNode command).
    pub fn mark_alive(&mut self, addr: Address, alive: bool) {
        if let Some(record) = self.fleet.get_mut(&addr) {
            record.alive = alive;
        }
    }

    // === Inbound handling ===

    /// Handle one frame from a node connection.
    pub fn handle_frame(&mut self, frame: Frame, now_ms: u64) {
        match frame.request {
            Request::Update(update) => {
                debug!(addr = %update.addr, port = update.port, pid = update.pid, "Node update");
                let record = self.fleet.entry(update.addr).or_insert(NodeRecord {
                    addr: update.addr,
                    port: update.port,
                    pid: update.pid,
                    alive: true,
                    last_seen_ms: now_ms,
                });
                record.port = update.port;
                record.pid = update.pid;
                record.last_seen_ms = now_ms;
            }
            Request::Notify(notify) => {
                info!(
                    notify_type = %notify.notify_type,
                    app_msg_id = notify.app_msg_id,
                    "Node notification"
                );
                self.notifications.push(notify);
            }
            other => {
                warn!(command = %other.command(), "Unexpected request at server");
            }
        }
    }

    // === Command builders ===

    /// Liveness probe for one node (or an unaddressed probe).
    pub fn ping_request(addr: Option<Address>) -> Frame {
        Frame::new(Sender::Server, Request::Ping(addr))
    }

    /// Kill a node.
    pub fn kill_request(addr: Address) -> Frame {
        Frame::new(
            Sender::Server,
            Request::KillNode(Some(addr)),
        )
    }

    /// Revive a node.
    pub fn revive_request(addr: Address) -> Frame {
        Frame::new(
            Sender::Server,
            Request::ReviveNode(Some(addr)),
        )
    }

    /// Clear suppression state fleet-wide.
    pub fn reset_request() -> Frame {
        Frame::new(Sender::Server, Request::Reset)
    }

    /// Deliver an app message from one node to another.
    pub fn send_request(from: Address, to: Address, app: AppMessage) -> Frame {
        Frame::new(
            Sender::Server,
            Request::Send(SendPayload {
                addr_from: from,
                addr_to: to,
                app,
            }),
        )
    }

    /// Flood an app message from a node.
    pub fn broadcast_request(from: Address, ttl: i8, app: AppMessage) -> Frame {
        Frame::new(
            Sender::Server,
            Request::Broadcast(BroadcastPayload {
                addr_from: from,
                time_to_live: ttl,
                app,
            }),
        )
    }

    /// Start a first-responder-wins delivery from a node.
    pub fn unicast_request(from: Address, ttl: i8, app: AppMessage) -> Frame {
        Frame::new(
            Sender::Server,
            Request::Unicast(BroadcastPayload {
                addr_from: from,
                time_to_live: ttl,
                app,
            }),
        )
    }

    // === Command delivery ===

    /// Where a node can be commanded: the port from its last heartbeat, or
    /// the port convention if it has never reported in.
    pub fn node_endpoint(&self, addr: Address) -> Endpoint {
        let port = self
            .fleet
            .get(&addr)
            .map(|record| record.port)
            .unwrap_or_else(|| self.config.port_for(addr.as_u8()));
        Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    /// Deliver one command frame to a node. A Ping reads back the node's
    /// single status byte; every other command expects no reply.
    pub async fn issue_command(
        &self,
        endpoint: &Endpoint,
        frame: &Frame,
    ) -> Result<Option<RequestResult>, ServerError> {
        let connect_timeout = self.config.connect_timeout();
        let reply_timeout = self.config.send_timeout();

        let target = (endpoint.host.as_str(), endpoint.port);
        let mut stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(target)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TransportError::Io(e).into()),
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    host: endpoint.host.clone(),
                    port: endpoint.port,
                }
                .into())
            }
        };

        write_frame(&mut stream, &frame.encode(), reply_timeout).await?;

        if frame.request.command() != Command::Ping {
            return Ok(None);
        }

        let mut status = [0u8; 1];
        match tokio::time::timeout(reply_timeout, stream.read_exact(&mut status)).await {
            Ok(Ok(_)) => Ok(RequestResult::from_byte(status[0])),
            Ok(Err(e)) => Err(TransportError::Io(e).into()),
            Err(_) => Err(TransportError::SendTimeout.into()),
        }
    }

    // === Run loop ===

    /// Bind the server port and consume node traffic until shutdown.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let (frame_tx, mut frame_rx) = frame_channel();

        let host = self.config.node.server_host.clone();
        let port = self.config.node.server_port;
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(TransportError::Io)?;

        info!(host = %host, port = port, "Server listening");

        let max_frame_len = self.config.mesh.max_frame_len;
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Node connected");
                        let tx = frame_tx.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, tx, max_frame_len).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                }
            }
        });

        while let Some(inbound) = frame_rx.recv().await {
            match Frame::decode(&inbound.data) {
                Ok(frame) => {
                    let now_ms = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0);
                    self.handle_frame(frame, now_ms);
                }
                Err(e) => warn!(error = %e, "Discarding malformed frame"),
            }
        }

        accept_task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AppRequest, NotifyType, Sender, UpdatePayload};

    fn make_update(addr: u8, port: u16, pid: u32) -> Frame {
        Frame::new(
            Sender::Node,
            Request::Update(UpdatePayload {
                port,
                addr: Address::new(addr),
                pid,
            }),
        )
    }

    #[test]
    fn test_update_registers_node() {
        let mut server = Server::new(Config::new());

        server.handle_frame(make_update(3, 42_103, 999), 1000);

        let record = server.node(Address::new(3)).unwrap();
        assert_eq!(record.port, 42_103);
        assert_eq!(record.pid, 999);
        assert!(record.alive);
        assert_eq!(record.last_seen_ms, 1000);
        assert_eq!(server.fleet_size(), 1);
    }

    #[test]
    fn test_update_refreshes_existing_record() {
        let mut server = Server::new(Config::new());

        server.handle_frame(make_update(3, 42_103, 999), 1000);
        server.handle_frame(make_update(3, 42_103, 1001), 2000);

        let record = server.node(Address::new(3)).unwrap();
        assert_eq!(record.pid, 1001);
        assert_eq!(record.last_seen_ms, 2000);
        assert_eq!(server.fleet_size(), 1);
    }

    #[test]
    fn test_notify_recorded() {
        let mut server = Server::new(Config::new());

        server.handle_frame(
            Frame::new(
                Sender::Node,
                Request::Notify(NotifyPayload {
                    notify_type: NotifyType::GotMessage,
                    app_msg_id: 77,
                }),
            ),
            0,
        );

        assert_eq!(server.notifications().len(), 1);
        assert_eq!(server.notifications()[0].app_msg_id, 77);
    }

    #[test]
    fn test_mark_alive() {
        let mut server = Server::new(Config::new());
        server.handle_frame(make_update(5, 42_105, 1), 0);

        server.mark_alive(Address::new(5), false);
        assert!(!server.node(Address::new(5)).unwrap().alive);

        server.mark_alive(Address::new(5), true);
        assert!(server.node(Address::new(5)).unwrap().alive);
    }

    #[test]
    fn test_node_endpoint_prefers_heartbeat_port() {
        let mut server = Server::new(Config::new());
        server.handle_frame(make_update(3, 50_000, 1), 0);

        assert_eq!(server.node_endpoint(Address::new(3)).port, 50_000);
        // Unknown node falls back to the port convention
        let convention = server.node_endpoint(Address::new(9)).port;
        assert_eq!(convention, Config::new().port_for(9));
    }

    #[tokio::test]
    async fn test_issue_ping_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let node_side = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let bytes = crate::transport::read_frame(&mut stream, 4096)
                .await
                .unwrap()
                .unwrap();
            let frame = Frame::decode(&bytes).unwrap();
            assert_eq!(frame.request.command(), Command::Ping);

            use tokio::io::AsyncWriteExt;
            stream
                .write_all(&[RequestResult::Ok.to_byte()])
                .await
                .unwrap();
        });

        let server = Server::new(Config::new());
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        };
        let status = server
            .issue_command(&endpoint, &Server::ping_request(None))
            .await
            .unwrap();

        assert_eq!(status, Some(RequestResult::Ok));
        node_side.await.unwrap();
    }

    #[tokio::test]
    async fn test_issue_command_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let node_side = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let bytes = crate::transport::read_frame(&mut stream, 4096)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                Frame::decode(&bytes).unwrap().request.command(),
                Command::Reset
            );
        });

        let server = Server::new(Config::new());
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        };
        let status = server
            .issue_command(&endpoint, &Server::reset_request())
            .await
            .unwrap();

        assert_eq!(status, None);
        node_side.await.unwrap();
    }

    #[test]
    fn test_command_builders_encode() {
        let app = AppMessage::new(
            1,
            AppRequest::Delivery,
            Address::new(1),
            Address::new(2),
            vec![1, 2, 3],
        );

        for frame in [
            Server::ping_request(Some(Address::new(1))),
            Server::kill_request(Address::new(1)),
            Server::revive_request(Address::new(1)),
            Server::reset_request(),
            Server::send_request(Address::new(1), Address::new(2), app.clone()),
            Server::broadcast_request(Address::new(1), 4, app.clone()),
            Server::unicast_request(Address::new(1), 4, app),
        ] {
            let encoded = frame.encode();
            assert_eq!(Frame::decode(&encoded).unwrap(), frame);
            assert_eq!(frame.sender, Sender::Server);
        }
    }
}
