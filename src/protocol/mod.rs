//! Mesh Relay Protocol wire format.
//!
//! Defines the binary frames exchanged on every mesh connection: a u32
//! length prefix, a command tag, a sender tag, then the command-specific
//! payload in fixed field order. One byte stream multiplexes all request
//! kinds: supervision, app delivery, flood discovery, confirmations, and
//! server status traffic.
//!
//! The codec is stateless and total over well-formed inputs: decoding
//! validates the declared length before touching the payload, and an
//! unrecognized command or sender tag is an error, never a crash.

mod app;
mod command;
mod error;
mod frame;

pub use app::{AppMessage, AppRequest, APP_HEADER_SIZE};
pub use command::{Command, NotifyType, RequestResult, Sender};
pub use error::ProtocolError;
pub use frame::{
    BroadcastPayload, ContestPayload, Frame, NotifyPayload, Request, RoutePayload, SendPayload,
    UpdatePayload, LEN_FIELD_SIZE, MSG_BASE_LEN, ROUTE_HEADER_SIZE,
};
