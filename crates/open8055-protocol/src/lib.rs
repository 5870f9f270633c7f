//! Wire formats of the Open8055 server.
//!
//! - [`hid`]: fixed-layout binary records exchanged with a card
//! - [`command`] and [`reply`]: the newline-terminated text protocol
//! - [`codec`]: Tokio framing for the text protocol

pub mod codec;
pub mod command;
pub mod error;
pub mod hid;
pub mod reply;

pub use codec::ControlCodec;
pub use command::Request;
pub use error::{ProtocolError, Result};
pub use hid::{
    Config1Report, HidCommand, HidMessage, HidReport, HidType, InputReport, OutputReport,
};
pub use reply::Reply;
