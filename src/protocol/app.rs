//! Application-layer message envelope.
//!
//! The routing core treats app messages as opaque cargo except for two
//! fields it inspects: `id` (message identity for deduplication) and
//! `req_type` (app dispatch branching). The structure reports its own wire
//! length via [`AppMessage::wire_len`] so outer frame lengths can be
//! computed without serializing twice.
//!
//! ## Wire Format (7-byte fixed header)
//!
//! | Offset | Field     | Size     | Notes                     |
//! |--------|-----------|----------|---------------------------|
//! | 0      | req_type  | 1 byte   | AppRequest value          |
//! | 1      | id        | 2 bytes  | LE, dedup identity        |
//! | 3      | addr_from | 1 byte   | app-level source          |
//! | 4      | addr_to   | 1 byte   | app-level destination     |
//! | 5      | body_len  | 2 bytes  | LE                        |
//! | 7      | body      | variable | opaque to the routing core|

use super::ProtocolError;
use crate::Address;

/// App message header size: req_type(1) + id(2) + addr_from(1) + addr_to(1) + body_len(2).
pub const APP_HEADER_SIZE: usize = 7;

// ============================================================================
// App request kinds
// ============================================================================

/// App-layer request kinds carried inside an [`AppMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AppRequest {
    /// First half of a key exchange round-trip.
    KeyExchange = 0x00,
    /// Reply half; produced by the app layer rewriting `req_type`.
    ExchangedKey = 0x01,
    /// Plain payload delivery.
    Delivery = 0x02,
    /// Delivery metadata for a server-originated broadcast.
    Broadcast = 0x03,
    /// Delivery metadata for a server-originated unicast.
    Unicast = 0x04,
}

impl AppRequest {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(AppRequest::KeyExchange),
            0x01 => Ok(AppRequest::ExchangedKey),
            0x02 => Ok(AppRequest::Delivery),
            0x03 => Ok(AppRequest::Broadcast),
            0x04 => Ok(AppRequest::Unicast),
            _ => Err(ProtocolError::UnknownAppRequest(b)),
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// App message
// ============================================================================

/// Opaque app-layer cargo with the two routing-visible fields up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppMessage {
    /// Message identity used by the dedup cache.
    pub id: u16,
    /// App dispatch branch; the app layer may rewrite this as a reply signal.
    pub req_type: AppRequest,
    /// App-level source address.
    pub addr_from: Address,
    /// App-level destination address.
    pub addr_to: Address,
    /// Opaque body.
    pub body: Vec<u8>,
}

impl AppMessage {
    /// Create a new app message.
    pub fn new(id: u16, req_type: AppRequest, addr_from: Address, addr_to: Address, body: Vec<u8>) -> Self {
        Self {
            id,
            req_type,
            addr_from,
            addr_to,
            body,
        }
    }

    /// Create a message with a random id.
    pub fn generate(req_type: AppRequest, addr_from: Address, addr_to: Address, body: Vec<u8>) -> Self {
        use rand::Rng;
        let id = rand::thread_rng().gen();
        Self::new(id, req_type, addr_from, addr_to, body)
    }

    /// Encoded byte count, computed without serializing.
    pub fn wire_len(&self) -> usize {
        APP_HEADER_SIZE + self.body.len()
    }

    /// Append the wire encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.req_type.to_byte());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.push(self.addr_from.as_u8());
        buf.push(self.addr_to.as_u8());
        buf.extend_from_slice(&(self.body.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.body);
    }

    /// Decode from `payload`, returning the message and the bytes consumed.
    pub fn decode(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < APP_HEADER_SIZE {
            return Err(ProtocolError::MessageTooShort {
                expected: APP_HEADER_SIZE,
                got: payload.len(),
            });
        }

        let req_type = AppRequest::from_byte(payload[0])?;
        let id = u16::from_le_bytes([payload[1], payload[2]]);
        let addr_from = Address::new(payload[3]);
        let addr_to = Address::new(payload[4]);
        let body_len = u16::from_le_bytes([payload[5], payload[6]]) as usize;

        let total = APP_HEADER_SIZE + body_len;
        if payload.len() < total {
            return Err(ProtocolError::MessageTooShort {
                expected: total,
                got: payload.len(),
            });
        }

        let body = payload[APP_HEADER_SIZE..total].to_vec();

        Ok((
            Self {
                id,
                req_type,
                addr_from,
                addr_to,
                body,
            },
            total,
        ))
    }
}
