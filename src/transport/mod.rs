//! TCP framing and link management.
//!
//! Every mesh connection carries length-prefixed frames (see
//! [`crate::protocol`]). This module owns the byte-level concerns: reading
//! whole frames off a stream, writing them under a bounded timeout, the
//! packet channel that feeds the node's dispatch loop, and the outbound
//! link pool that lazily connects to peers.

use crate::Address;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Largest frame accepted off the wire by default.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// Packet channel depth between connection tasks and the dispatch loop.
const FRAME_CHANNEL_DEPTH: usize = 64;

/// Errors related to link I/O.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {host}:{port} timed out")]
    ConnectTimeout { host: String, port: u16 },

    #[error("send timed out")]
    SendTimeout,

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("declared frame length too small: {len}")]
    FrameTooSmall { len: usize },

    #[error("no endpoint known for address {0}")]
    NoEndpoint(Address),

    #[error("link closed")]
    Closed,
}

// ============================================================================
// Frame I/O
// ============================================================================

/// Read one length-prefixed frame.
///
/// Returns the complete frame bytes including the 4-byte prefix, so the
/// codec can validate the declared length itself. Returns `Ok(None)` on a
/// clean EOF at a frame boundary.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let declared = u32::from_le_bytes(len_bytes) as usize;
    if declared <= len_bytes.len() {
        return Err(TransportError::FrameTooSmall { len: declared });
    }
    if declared > max_len {
        return Err(TransportError::FrameTooLarge {
            len: declared,
            max: max_len,
        });
    }

    let mut frame = vec![0u8; declared];
    frame[..4].copy_from_slice(&len_bytes);
    reader.read_exact(&mut frame[4..]).await?;
    Ok(Some(frame))
}

/// Write a complete frame under a bounded timeout.
pub async fn write_frame<W>(
    writer: &mut W,
    bytes: &[u8],
    timeout: Duration,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, async {
        writer.write_all(bytes).await?;
        writer.flush().await
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TransportError::SendTimeout),
    }
}

// ============================================================================
// Packet channel
// ============================================================================

/// Raw reply bytes back to the connection a frame arrived on.
pub type ReplyTx = mpsc::UnboundedSender<Vec<u8>>;

/// One frame received from some connection, with a handle for immediate
/// replies (supervision status bytes).
pub struct InboundFrame {
    /// Complete frame bytes (length prefix included).
    pub data: Vec<u8>,
    /// Reply handle to the originating connection, when it is still open.
    pub reply: Option<ReplyTx>,
}

/// Sender half of the packet channel.
pub type FrameTx = mpsc::Sender<InboundFrame>;
/// Receiver half of the packet channel.
pub type FrameRx = mpsc::Receiver<InboundFrame>;

/// Create the packet channel between connection tasks and the dispatch loop.
pub fn frame_channel() -> (FrameTx, FrameRx) {
    mpsc::channel(FRAME_CHANNEL_DEPTH)
}

/// Serve one inbound connection: forward its frames to the dispatch loop
/// and drain reply bytes back to the socket.
///
/// Runs until the peer closes, a framing error occurs, or the dispatch
/// loop goes away.
pub async fn serve_connection(stream: TcpStream, frame_tx: FrameTx, max_frame_len: usize) {
    let peer = stream.peer_addr().ok();
    let (mut read_half, mut write_half) = stream.into_split();

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = reply_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    loop {
        match read_frame(&mut read_half, max_frame_len).await {
            Ok(Some(data)) => {
                let inbound = InboundFrame {
                    data,
                    reply: Some(reply_tx.clone()),
                };
                if frame_tx.send(inbound).await.is_err() {
                    break; // dispatch loop gone
                }
            }
            Ok(None) => {
                debug!(peer = ?peer, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(peer = ?peer, error = %e, "Dropping connection on framing error");
                break;
            }
        }
    }

    drop(reply_tx);
    let _ = writer_task.await;
}

// ============================================================================
// Outbound links
// ============================================================================

/// Where a peer listens.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Host name or IP.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// One outbound link: a writer to a peer, connected lazily and dropped on
/// the first failed send.
pub struct Link {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl Link {
    /// Wrap an already-connected writer (tests use in-memory duplex halves).
    pub fn from_writer(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self { writer }
    }

    /// Write one frame under the given timeout.
    pub async fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        write_frame(&mut self.writer, bytes, timeout).await
    }
}

/// Outbound connection pool keyed by mesh address.
///
/// `send` acquires or reuses a connection and writes a fully framed
/// message; any failure tears the link down so the next send reconnects.
pub struct LinkPool {
    links: HashMap<Address, Link>,
    endpoints: HashMap<Address, Endpoint>,
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl LinkPool {
    /// Create an empty pool.
    pub fn new(connect_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            links: HashMap::new(),
            endpoints: HashMap::new(),
            connect_timeout,
            send_timeout,
        }
    }

    /// Register where a peer listens.
    pub fn add_endpoint(&mut self, addr: Address, endpoint: Endpoint) {
        self.endpoints.insert(addr, endpoint);
    }

    /// The node's direct neighbors: every address with a registered
    /// endpoint or a live link.
    pub fn neighbor_addrs(&self) -> Vec<Address> {
        let mut addrs: Vec<Address> = self.endpoints.keys().copied().collect();
        for addr in self.links.keys() {
            if !addrs.contains(addr) {
                addrs.push(*addr);
            }
        }
        addrs.sort();
        addrs
    }

    /// Insert a ready link (tests wire in-memory duplex halves this way).
    pub fn insert_link(&mut self, addr: Address, link: Link) {
        self.links.insert(addr, link);
    }

    /// Whether a live link to `addr` is pooled.
    pub fn has_link(&self, addr: Address) -> bool {
        self.links.contains_key(&addr)
    }

    /// Acquire or reuse a connection to `addr` and write one frame.
    ///
    /// On failure the pooled link is dropped so a later send reconnects;
    /// the caller decides what the failure means for routing state.
    pub async fn send(&mut self, addr: Address, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.links.contains_key(&addr) {
            let link = self.connect(addr).await?;
            self.links.insert(addr, link);
        }

        let link = self.links.get_mut(&addr).ok_or(TransportError::Closed)?;
        match link.send(bytes, self.send_timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.links.remove(&addr);
                Err(e)
            }
        }
    }

    /// Drop every pooled connection (endpoints are kept).
    pub fn reset(&mut self) {
        self.links.clear();
    }

    async fn connect(&self, addr: Address) -> Result<Link, TransportError> {
        let endpoint = self
            .endpoints
            .get(&addr)
            .ok_or(TransportError::NoEndpoint(addr))?;

        let target = (endpoint.host.as_str(), endpoint.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => Ok(Link::from_writer(Box::new(stream))),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransportError::ConnectTimeout {
                host: endpoint.host.clone(),
                port: endpoint.port,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Frame, Request, Sender};

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        let frame = Frame::new(Sender::Server, Request::Reset).encode();
        write_frame(&mut a, &frame, Duration::from_secs(1))
            .await
            .unwrap();

        let read = read_frame(&mut b, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(read, Some(frame));
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let read = read_frame(&mut b, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversize() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(50_000u32).to_le_bytes()).await.unwrap();

        let result = read_frame(&mut b, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(
            result,
            Err(TransportError::FrameTooLarge { len: 50_000, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_undersize_length() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(3u32).to_le_bytes()).await.unwrap();

        let result = read_frame(&mut b, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(result, Err(TransportError::FrameTooSmall { len: 3 })));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(10u32).to_le_bytes()).await.unwrap();
        a.write_all(&[0x03, 0x00]).await.unwrap(); // 2 of 6 remaining bytes
        drop(a);

        assert!(read_frame(&mut b, DEFAULT_MAX_FRAME_LEN).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_frame_times_out_when_blocked() {
        // 8-byte buffer: the second frame cannot fit until someone reads
        let (mut a, _b) = tokio::io::duplex(8);

        let frame = Frame::new(Sender::Server, Request::Reset).encode();
        write_frame(&mut a, &frame, Duration::from_millis(100))
            .await
            .unwrap();

        let result = write_frame(&mut a, &frame, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(TransportError::SendTimeout)));
    }

    #[tokio::test]
    async fn test_link_pool_send_without_endpoint() {
        let mut pool = LinkPool::new(Duration::from_millis(100), Duration::from_millis(100));
        let result = pool.send(Address::new(3), b"x").await;
        assert!(matches!(result, Err(TransportError::NoEndpoint(_))));
    }

    #[tokio::test]
    async fn test_link_pool_failed_send_drops_link() {
        let mut pool = LinkPool::new(Duration::from_millis(100), Duration::from_millis(100));
        let (a, b) = tokio::io::duplex(1024);
        drop(b); // peer gone: writes will fail
        pool.insert_link(Address::new(1), Link::from_writer(Box::new(a)));

        let frame = Frame::new(Sender::Server, Request::Reset).encode();
        assert!(pool.send(Address::new(1), &frame).await.is_err());
        assert!(!pool.has_link(Address::new(1)));
    }

    #[tokio::test]
    async fn test_link_pool_send_over_inserted_link() {
        let mut pool = LinkPool::new(Duration::from_millis(100), Duration::from_millis(100));
        let (a, mut b) = tokio::io::duplex(1024);
        pool.insert_link(Address::new(1), Link::from_writer(Box::new(a)));

        let frame = Frame::new(Sender::Server, Request::Reset).encode();
        pool.send(Address::new(1), &frame).await.unwrap();

        let read = read_frame(&mut b, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(read, Some(frame));
    }

    #[tokio::test]
    async fn test_neighbor_addrs_sorted() {
        let mut pool = LinkPool::new(Duration::from_millis(100), Duration::from_millis(100));
        pool.add_endpoint(
            Address::new(9),
            Endpoint {
                host: "127.0.0.1".into(),
                port: 1,
            },
        );
        pool.add_endpoint(
            Address::new(2),
            Endpoint {
                host: "127.0.0.1".into(),
                port: 2,
            },
        );
        assert_eq!(pool.neighbor_addrs(), vec![Address::new(2), Address::new(9)]);
    }
}
