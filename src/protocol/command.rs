//! Command, sender, and status tag enums.
//!
//! Every frame on a mesh connection carries a one-byte command tag and a
//! one-byte sender tag after the length prefix. The tag ranges group related
//! commands:
//!
//! | Range | Commands                                        |
//! |-------|-------------------------------------------------|
//! | 0x0x  | Supervision: Ping, KillNode, ReviveNode, Reset  |
//! | 0x1x  | Delivery: Send, Broadcast, Unicast + contest    |
//! | 0x2x  | Route discovery: RouteDirect, RouteInverse      |
//! | 0x3x  | Status: Update, Notify                          |

use super::ProtocolError;
use std::fmt;

// ============================================================================
// Command
// ============================================================================

/// Request command tags.
///
/// Decoding an unrecognized tag is a [`ProtocolError::UnknownCommand`];
/// there is no in-memory "undefined" variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    // Supervision (0x00-0x0F)
    /// Liveness probe; answered with a single status byte.
    Ping = 0x00,
    /// Mark a node dead (drops traffic until revived).
    KillNode = 0x01,
    /// Bring a killed node back.
    ReviveNode = 0x02,
    /// Clear broadcast-suppression state and pooled connections.
    Reset = 0x03,

    // Delivery (0x10-0x1F)
    /// Point-to-point app message, routed via the table.
    Send = 0x10,
    /// Flood an app message to all neighbors.
    Broadcast = 0x11,
    /// Server-originated first-responder-wins delivery.
    Unicast = 0x12,
    /// Contest announcement flooded by the unicast initiator.
    UnicastContest = 0x13,
    /// Contest response; first one back wins.
    UnicastFirst = 0x14,

    // Route discovery (0x20-0x2F)
    /// Forward flood with TTL decay and reverse-path metric learning.
    RouteDirect = 0x20,
    /// Reverse-path confirmation unicast back to the flood originator.
    RouteInverse = 0x21,

    // Status (0x30-0x3F)
    /// Node liveness heartbeat to the server.
    Update = 0x30,
    /// Node-to-server outcome notification.
    Notify = 0x31,
}

impl Command {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(Command::Ping),
            0x01 => Ok(Command::KillNode),
            0x02 => Ok(Command::ReviveNode),
            0x03 => Ok(Command::Reset),
            0x10 => Ok(Command::Send),
            0x11 => Ok(Command::Broadcast),
            0x12 => Ok(Command::Unicast),
            0x13 => Ok(Command::UnicastContest),
            0x14 => Ok(Command::UnicastFirst),
            0x20 => Ok(Command::RouteDirect),
            0x21 => Ok(Command::RouteInverse),
            0x30 => Ok(Command::Update),
            0x31 => Ok(Command::Notify),
            _ => Err(ProtocolError::UnknownCommand(b)),
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Ping => "Ping",
            Command::KillNode => "KillNode",
            Command::ReviveNode => "ReviveNode",
            Command::Reset => "Reset",
            Command::Send => "Send",
            Command::Broadcast => "Broadcast",
            Command::Unicast => "Unicast",
            Command::UnicastContest => "UnicastContest",
            Command::UnicastFirst => "UnicastFirst",
            Command::RouteDirect => "RouteDirect",
            Command::RouteInverse => "RouteInverse",
            Command::Update => "Update",
            Command::Notify => "Notify",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Who originated a frame: the coordinating server or a mesh node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Sender {
    /// The coordinating server process.
    Server = 0x00,
    /// A mesh node.
    Node = 0x01,
}

impl Sender {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(Sender::Server),
            0x01 => Ok(Sender::Node),
            _ => Err(ProtocolError::UnknownSender(b)),
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Server => write!(f, "server"),
            Sender::Node => write!(f, "node"),
        }
    }
}

// ============================================================================
// Request result (PING reply status byte)
// ============================================================================

/// One-byte status answer to a supervision request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestResult {
    /// Request handled.
    Ok = 0x00,
    /// Request failed.
    Err = 0x01,
    /// Request not understood.
    Unknown = 0x02,
}

impl RequestResult {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(RequestResult::Ok),
            0x01 => Some(RequestResult::Err),
            0x02 => Some(RequestResult::Unknown),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Notify type
// ============================================================================

/// Outcome categories a node reports to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NotifyType {
    /// App message delivered locally.
    GotMessage = 0x00,
    /// App delivery failed.
    Fail = 0x01,
    /// A unicast contest delivery completed at this node.
    UnicastHandled = 0x02,
    /// A route-inverse confirmation returned to its originator.
    InverseCompleted = 0x03,
}

impl NotifyType {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(NotifyType::GotMessage),
            0x01 => Ok(NotifyType::Fail),
            0x02 => Ok(NotifyType::UnicastHandled),
            0x03 => Ok(NotifyType::InverseCompleted),
            _ => Err(ProtocolError::UnknownNotifyType(b)),
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for NotifyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotifyType::GotMessage => "GotMessage",
            NotifyType::Fail => "Fail",
            NotifyType::UnicastHandled => "UnicastHandled",
            NotifyType::InverseCompleted => "InverseCompleted",
        };
        write!(f, "{}", name)
    }
}
