//! Node lifecycle: listener startup, dispatch loop, shutdown.

use super::{Node, NodeError, NodeState};
use crate::protocol::Frame;
use crate::transport::{frame_channel, serve_connection};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

impl Node {
    /// Bind the listener and start accepting peer connections.
    ///
    /// Each accepted connection gets its own task that forwards complete
    /// frames into the packet channel consumed by [`Node::run`].
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if !self.state().can_start() {
            return Err(NodeError::AlreadyStarted);
        }

        let (frame_tx, frame_rx) = frame_channel();

        let host = self.config().node.listen_host.clone();
        let port = self.config().listen_port();
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(crate::transport::TransportError::Io)?;

        info!(addr = %self.addr(), host = %host, port = port, "Node listening");

        let max_frame_len = self.config().mesh.max_frame_len;
        let accept_tx = frame_tx.clone();
        let listener_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        let tx = accept_tx.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, tx, max_frame_len).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                    }
                }
            }
        });

        self.frame_tx = Some(frame_tx);
        self.frame_rx = Some(frame_rx);
        self.listener_task = Some(listener_task);
        self.set_state(NodeState::Running);
        Ok(())
    }

    /// Run the dispatch loop until the packet channel closes.
    ///
    /// One frame is handled to completion before the next is taken, and a
    /// periodic tick sends the liveness heartbeat to the server.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        let mut frame_rx = self.frame_rx.take().ok_or(NodeError::NotStarted)?;

        let mut tick = tokio::time::interval(self.config().update_interval());

        info!("Dispatch loop started");

        loop {
            tokio::select! {
                inbound = frame_rx.recv() => {
                    match inbound {
                        Some(inbound) => {
                            match Frame::decode(&inbound.data) {
                                Ok(frame) => {
                                    self.dispatch(frame, inbound.reply.as_ref()).await;
                                }
                                Err(e) => {
                                    // Framing errors cost one message, nothing else
                                    warn!(error = %e, "Discarding malformed frame");
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    if !self.send_update().await {
                        debug!("Heartbeat not delivered");
                    }
                }
            }
        }

        info!("Dispatch loop stopped (channel closed)");
        Ok(())
    }

    /// Stop accepting connections and mark the node stopped.
    pub fn stop(&mut self) {
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        self.frame_tx = None;
        self.frame_rx = None;
        self.set_state(NodeState::Stopped);
        info!(addr = %self.addr(), "Node stopped");
    }
}
