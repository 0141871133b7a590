//! Frame envelope and per-command payload codecs.
//!
//! Every message on a mesh connection is one frame:
//!
//! ```text
//! [length:4 LE][command:1][sender:1][payload...]
//! ```
//!
//! The length field counts the whole frame, itself included. Decoding first
//! validates the declared length against the received byte count; a mismatch
//! (or a frame no longer than the length field itself) is a framing error
//! and nothing further is parsed.
//!
//! ## Payload layouts (fixed field order, no padding)
//!
//! | Command                      | Payload fields                                                       |
//! |------------------------------|----------------------------------------------------------------------|
//! | Ping / KillNode / ReviveNode | optional addr(1)                                                     |
//! | Reset                        | none                                                                 |
//! | Send                         | addr_from(1) addr_to(1) app(var)                                     |
//! | Broadcast / Unicast          | addr_from(1) ttl(1) app(var)                                         |
//! | UnicastContest / UnicastFirst| req(1) node_addr(1) app(var)                                         |
//! | RouteDirect / RouteInverse   | sender_addr(1) receiver_addr(1) local_sender_addr(1) ttl(1) id(2 LE) app(var) |
//! | Update                       | port(2 LE) addr(1) pid(4 LE)                                         |
//! | Notify                       | notify_type(1) app_msg_id(2 LE)                                      |

use super::app::AppMessage;
use super::command::{Command, NotifyType, Sender};
use super::ProtocolError;
use crate::Address;

// ============================================================================
// Constants
// ============================================================================

/// Size of the frame length prefix.
pub const LEN_FIELD_SIZE: usize = 4;

/// Size of the envelope: length(4) + command(1) + sender(1).
pub const MSG_BASE_LEN: usize = 6;

/// Route payload fixed header: 3 addresses + ttl + id(2).
pub const ROUTE_HEADER_SIZE: usize = 6;

// ============================================================================
// Payload structs
// ============================================================================

/// Point-to-point app delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendPayload {
    /// Originating node.
    pub addr_from: Address,
    /// Destination node.
    pub addr_to: Address,
    /// Carried app message.
    pub app: AppMessage,
}

impl SendPayload {
    fn wire_len(&self) -> usize {
        2 + self.app.wire_len()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.addr_from.as_u8());
        buf.push(self.addr_to.as_u8());
        self.app.encode_into(buf);
    }

    fn decode(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < 2 {
            return Err(ProtocolError::MessageTooShort {
                expected: 2,
                got: payload.len(),
            });
        }
        let addr_from = Address::new(payload[0]);
        let addr_to = Address::new(payload[1]);
        let (app, consumed) = AppMessage::decode(&payload[2..])?;
        Ok((
            Self {
                addr_from,
                addr_to,
                app,
            },
            2 + consumed,
        ))
    }
}

/// Neighbor flood of an app message (server-originated broadcast/unicast).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastPayload {
    /// Flood originator.
    pub addr_from: Address,
    /// Remaining hop budget.
    pub time_to_live: i8,
    /// Carried app message.
    pub app: AppMessage,
}

impl BroadcastPayload {
    fn wire_len(&self) -> usize {
        2 + self.app.wire_len()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.addr_from.as_u8());
        buf.push(self.time_to_live as u8);
        self.app.encode_into(buf);
    }

    fn decode(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < 2 {
            return Err(ProtocolError::MessageTooShort {
                expected: 2,
                got: payload.len(),
            });
        }
        let addr_from = Address::new(payload[0]);
        let time_to_live = payload[1] as i8;
        let (app, consumed) = AppMessage::decode(&payload[2..])?;
        Ok((
            Self {
                addr_from,
                time_to_live,
                app,
            },
            2 + consumed,
        ))
    }
}

/// In-flight route discovery flood (RouteDirect) or its reverse
/// confirmation (RouteInverse).
///
/// `local_sender_addr` is rewritten at every hop to the forwarding node's
/// own address; receivers learn reverse paths from it. `id` mirrors the app
/// message id at origination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePayload {
    /// Flood originator (the node looking for a route).
    pub sender_addr: Address,
    /// Destination whose route is being discovered.
    pub receiver_addr: Address,
    /// The neighbor this copy arrived from (rewritten per hop).
    pub local_sender_addr: Address,
    /// Remaining hop budget; the flood dies silently at zero.
    pub time_to_live: i8,
    /// Discovery identity; mirrors the app message id.
    pub id: u16,
    /// Carried app message, delivered once the flood reaches the receiver.
    pub app: AppMessage,
}

impl RoutePayload {
    fn wire_len(&self) -> usize {
        ROUTE_HEADER_SIZE + self.app.wire_len()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.sender_addr.as_u8());
        buf.push(self.receiver_addr.as_u8());
        buf.push(self.local_sender_addr.as_u8());
        buf.push(self.time_to_live as u8);
        buf.extend_from_slice(&self.id.to_le_bytes());
        self.app.encode_into(buf);
    }

    fn decode(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < ROUTE_HEADER_SIZE {
            return Err(ProtocolError::MessageTooShort {
                expected: ROUTE_HEADER_SIZE,
                got: payload.len(),
            });
        }
        let sender_addr = Address::new(payload[0]);
        let receiver_addr = Address::new(payload[1]);
        let local_sender_addr = Address::new(payload[2]);
        let time_to_live = payload[3] as i8;
        let id = u16::from_le_bytes([payload[4], payload[5]]);
        let (app, consumed) = AppMessage::decode(&payload[ROUTE_HEADER_SIZE..])?;
        Ok((
            Self {
                sender_addr,
                receiver_addr,
                local_sender_addr,
                time_to_live,
                id,
                app,
            },
            ROUTE_HEADER_SIZE + consumed,
        ))
    }
}

/// Node liveness heartbeat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatePayload {
    /// Port the node listens on.
    pub port: u16,
    /// The node's mesh address.
    pub addr: Address,
    /// The node's OS process id.
    pub pid: u32,
}

impl UpdatePayload {
    const WIRE_LEN: usize = 7;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.port.to_le_bytes());
        buf.push(self.addr.as_u8());
        buf.extend_from_slice(&self.pid.to_le_bytes());
    }

    fn decode(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < Self::WIRE_LEN {
            return Err(ProtocolError::MessageTooShort {
                expected: Self::WIRE_LEN,
                got: payload.len(),
            });
        }
        let port = u16::from_le_bytes([payload[0], payload[1]]);
        let addr = Address::new(payload[2]);
        let pid = u32::from_le_bytes([payload[3], payload[4], payload[5], payload[6]]);
        Ok((Self { port, addr, pid }, Self::WIRE_LEN))
    }
}

/// Node-to-server outcome notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyPayload {
    /// Outcome category.
    pub notify_type: NotifyType,
    /// Id of the app message the outcome refers to.
    pub app_msg_id: u16,
}

impl NotifyPayload {
    const WIRE_LEN: usize = 3;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.notify_type.to_byte());
        buf.extend_from_slice(&self.app_msg_id.to_le_bytes());
    }

    fn decode(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < Self::WIRE_LEN {
            return Err(ProtocolError::MessageTooShort {
                expected: Self::WIRE_LEN,
                got: payload.len(),
            });
        }
        let notify_type = NotifyType::from_byte(payload[0])?;
        let app_msg_id = u16::from_le_bytes([payload[1], payload[2]]);
        Ok((
            Self {
                notify_type,
                app_msg_id,
            },
            Self::WIRE_LEN,
        ))
    }
}

/// Unicast contest announcement (UnicastContest) or response (UnicastFirst).
///
/// `req` echoes the outer command tag; `node_addr` is the initiator's
/// address in a contest announcement and the responder's address in a
/// response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContestPayload {
    /// Echo of the contest command.
    pub req: Command,
    /// Contest participant address (see struct docs).
    pub node_addr: Address,
    /// Carried app message.
    pub app: AppMessage,
}

impl ContestPayload {
    fn wire_len(&self) -> usize {
        2 + self.app.wire_len()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.req.to_byte());
        buf.push(self.node_addr.as_u8());
        self.app.encode_into(buf);
    }

    fn decode(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < 2 {
            return Err(ProtocolError::MessageTooShort {
                expected: 2,
                got: payload.len(),
            });
        }
        let req = Command::from_byte(payload[0])?;
        let node_addr = Address::new(payload[1]);
        let (app, consumed) = AppMessage::decode(&payload[2..])?;
        Ok((
            Self {
                req,
                node_addr,
                app,
            },
            2 + consumed,
        ))
    }
}

// ============================================================================
// Request: tagged union of decoded payloads
// ============================================================================

/// Decoded request, one variant per command shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Liveness probe, optionally naming a target node.
    Ping(Option<Address>),
    /// Mark a node dead.
    KillNode(Option<Address>),
    /// Revive a killed node.
    ReviveNode(Option<Address>),
    /// Clear suppression state and pooled connections.
    Reset,
    /// Point-to-point app delivery.
    Send(SendPayload),
    /// Neighbor flood.
    Broadcast(BroadcastPayload),
    /// Server-originated first-responder delivery.
    Unicast(BroadcastPayload),
    /// Contest announcement.
    UnicastContest(ContestPayload),
    /// Contest response.
    UnicastFirst(ContestPayload),
    /// Route discovery flood.
    RouteDirect(RoutePayload),
    /// Route confirmation.
    RouteInverse(RoutePayload),
    /// Liveness heartbeat.
    Update(UpdatePayload),
    /// Outcome notification.
    Notify(NotifyPayload),
}

impl Request {
    /// The command tag this request encodes under.
    pub fn command(&self) -> Command {
        match self {
            Request::Ping(_) => Command::Ping,
            Request::KillNode(_) => Command::KillNode,
            Request::ReviveNode(_) => Command::ReviveNode,
            Request::Reset => Command::Reset,
            Request::Send(_) => Command::Send,
            Request::Broadcast(_) => Command::Broadcast,
            Request::Unicast(_) => Command::Unicast,
            Request::UnicastContest(_) => Command::UnicastContest,
            Request::UnicastFirst(_) => Command::UnicastFirst,
            Request::RouteDirect(_) => Command::RouteDirect,
            Request::RouteInverse(_) => Command::RouteInverse,
            Request::Update(_) => Command::Update,
            Request::Notify(_) => Command::Notify,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Request::Ping(addr) | Request::KillNode(addr) | Request::ReviveNode(addr) => {
                if addr.is_some() {
                    1
                } else {
                    0
                }
            }
            Request::Reset => 0,
            Request::Send(p) => p.wire_len(),
            Request::Broadcast(p) | Request::Unicast(p) => p.wire_len(),
            Request::UnicastContest(p) | Request::UnicastFirst(p) => p.wire_len(),
            Request::RouteDirect(p) | Request::RouteInverse(p) => p.wire_len(),
            Request::Update(_) => UpdatePayload::WIRE_LEN,
            Request::Notify(_) => NotifyPayload::WIRE_LEN,
        }
    }

    fn encode_payload_into(&self, buf: &mut Vec<u8>) {
        match self {
            Request::Ping(addr) | Request::KillNode(addr) | Request::ReviveNode(addr) => {
                if let Some(addr) = addr {
                    buf.push(addr.as_u8());
                }
            }
            Request::Reset => {}
            Request::Send(p) => p.encode_into(buf),
            Request::Broadcast(p) | Request::Unicast(p) => p.encode_into(buf),
            Request::UnicastContest(p) | Request::UnicastFirst(p) => p.encode_into(buf),
            Request::RouteDirect(p) | Request::RouteInverse(p) => p.encode_into(buf),
            Request::Update(p) => p.encode_into(buf),
            Request::Notify(p) => p.encode_into(buf),
        }
    }

    fn decode_payload(command: Command, payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        match command {
            Command::Ping | Command::KillNode | Command::ReviveNode => {
                let addr = match payload.len() {
                    0 => None,
                    _ => Some(Address::new(payload[0])),
                };
                let consumed = if addr.is_some() { 1 } else { 0 };
                let request = match command {
                    Command::Ping => Request::Ping(addr),
                    Command::KillNode => Request::KillNode(addr),
                    _ => Request::ReviveNode(addr),
                };
                Ok((request, consumed))
            }
            Command::Reset => Ok((Request::Reset, 0)),
            Command::Send => {
                let (p, n) = SendPayload::decode(payload)?;
                Ok((Request::Send(p), n))
            }
            Command::Broadcast => {
                let (p, n) = BroadcastPayload::decode(payload)?;
                Ok((Request::Broadcast(p), n))
            }
            Command::Unicast => {
                let (p, n) = BroadcastPayload::decode(payload)?;
                Ok((Request::Unicast(p), n))
            }
            Command::UnicastContest => {
                let (p, n) = ContestPayload::decode(payload)?;
                Ok((Request::UnicastContest(p), n))
            }
            Command::UnicastFirst => {
                let (p, n) = ContestPayload::decode(payload)?;
                Ok((Request::UnicastFirst(p), n))
            }
            Command::RouteDirect => {
                let (p, n) = RoutePayload::decode(payload)?;
                Ok((Request::RouteDirect(p), n))
            }
            Command::RouteInverse => {
                let (p, n) = RoutePayload::decode(payload)?;
                Ok((Request::RouteInverse(p), n))
            }
            Command::Update => {
                let (p, n) = UpdatePayload::decode(payload)?;
                Ok((Request::Update(p), n))
            }
            Command::Notify => {
                let (p, n) = NotifyPayload::decode(payload)?;
                Ok((Request::Notify(p), n))
            }
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A complete wire frame: envelope plus decoded request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Who originated the frame.
    pub sender: Sender,
    /// The decoded request.
    pub request: Request,
}

impl Frame {
    /// Create a frame.
    pub fn new(sender: Sender, request: Request) -> Self {
        Self { sender, request }
    }

    /// Total encoded byte count (including the length prefix).
    pub fn wire_len(&self) -> usize {
        MSG_BASE_LEN + self.request.payload_len()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let total = self.wire_len();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.push(self.request.command().to_byte());
        buf.push(self.sender.to_byte());
        self.request.encode_payload_into(&mut buf);
        debug_assert_eq!(buf.len(), total);
        buf
    }

    /// Decode a complete received frame.
    ///
    /// The declared length must equal the received byte count, and the frame
    /// must be longer than the length field alone; otherwise nothing past
    /// the prefix is parsed.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() <= LEN_FIELD_SIZE {
            return Err(ProtocolError::FrameLengthMismatch {
                declared: 0,
                received: buf.len(),
            });
        }

        let declared = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if declared != buf.len() {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                received: buf.len(),
            });
        }

        if buf.len() < MSG_BASE_LEN {
            return Err(ProtocolError::MessageTooShort {
                expected: MSG_BASE_LEN,
                got: buf.len(),
            });
        }

        let command = Command::from_byte(buf[4])?;
        let sender = Sender::from_byte(buf[5])?;

        let payload = &buf[MSG_BASE_LEN..];
        let (request, consumed) = Request::decode_payload(command, payload)?;
        if consumed != payload.len() {
            return Err(ProtocolError::TrailingBytes {
                extra: payload.len() - consumed,
            });
        }

        Ok(Self { sender, request })
    }
}
