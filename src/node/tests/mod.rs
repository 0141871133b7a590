use super::*;
use crate::app::{AppHandler, AppRegistry};
use crate::protocol::{AppMessage, AppRequest, Frame, RoutePayload};
use crate::transport::{read_frame, Link, DEFAULT_MAX_FRAME_LEN};
use crate::Address;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;

mod contest;
mod end_to_end;

pub(super) fn make_node(addr: u8) -> Node {
    let mut config = Config::new();
    config.node.addr = addr;
    Node::new(config)
}

/// Attach an in-memory link to a fake neighbor; returns the read half the
/// test drains to observe what the node sent.
pub(super) fn attach_neighbor(node: &mut Node, addr: u8) -> DuplexStream {
    let (writer, reader) = tokio::io::duplex(65_536);
    node.install_link(Address::new(addr), Link::from_writer(Box::new(writer)));
    reader
}

/// Attach a neighbor whose link is already dead: every send fails.
pub(super) fn attach_dead_neighbor(node: &mut Node, addr: u8) {
    let (writer, reader) = tokio::io::duplex(64);
    drop(reader);
    node.install_link(Address::new(addr), Link::from_writer(Box::new(writer)));
}

/// Attach an in-memory server link; returns the read half.
pub(super) fn attach_server(node: &mut Node) -> DuplexStream {
    let (writer, reader) = tokio::io::duplex(65_536);
    node.install_server_link(Link::from_writer(Box::new(writer)));
    reader
}

/// Read one frame off a capture, or None if nothing is pending.
pub(super) async fn recv_frame(stream: &mut DuplexStream) -> Option<Frame> {
    let read = tokio::time::timeout(
        Duration::from_millis(10),
        read_frame(stream, DEFAULT_MAX_FRAME_LEN),
    )
    .await;

    match read {
        Ok(Ok(Some(bytes))) => Some(Frame::decode(&bytes).expect("capture should hold valid frames")),
        _ => None,
    }
}

pub(super) fn make_app(id: u16, from: u8, to: u8) -> AppMessage {
    AppMessage::new(
        id,
        AppRequest::Delivery,
        Address::new(from),
        Address::new(to),
        b"payload".to_vec(),
    )
}

pub(super) fn make_route(sender: u8, receiver: u8, local_sender: u8, ttl: i8, id: u16) -> RoutePayload {
    RoutePayload {
        sender_addr: Address::new(sender),
        receiver_addr: Address::new(receiver),
        local_sender_addr: Address::new(local_sender),
        time_to_live: ttl,
        id,
        app: make_app(id, sender, receiver),
    }
}

/// App handler that records everything it is handed.
pub(super) struct RecorderApp {
    seen: Arc<Mutex<Vec<AppMessage>>>,
    succeed: bool,
}

impl AppHandler for RecorderApp {
    fn accepts(&self, _req: AppRequest) -> bool {
        true
    }

    fn handle(&mut self, msg: &mut AppMessage, _local_addr: Address) -> bool {
        self.seen.lock().unwrap().push(msg.clone());
        self.succeed
    }
}

/// Replace a node's registry with a lone recorder; returns the log.
pub(super) fn install_recorder(node: &mut Node) -> Arc<Mutex<Vec<AppMessage>>> {
    install_recorder_with(node, true)
}

/// Recorder variant whose deliveries fail.
pub(super) fn install_failing_recorder(node: &mut Node) -> Arc<Mutex<Vec<AppMessage>>> {
    install_recorder_with(node, false)
}

fn install_recorder_with(node: &mut Node, succeed: bool) -> Arc<Mutex<Vec<AppMessage>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = AppRegistry::new();
    registry.register(Box::new(RecorderApp {
        seen: seen.clone(),
        succeed,
    }));
    *node.apps_mut() = registry;
    seen
}
