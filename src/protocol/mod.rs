//! Wire protocol for the file-transfer port.
//!
//! Each connection carries exactly one transfer: a single action byte,
//! one length-prefixed compressed metadata frame, then raw payload bytes.

pub mod error;
pub mod frame;

use error::ProtocolError;

/// Client pushes a file to the server.
pub const ACTION_RECEIVE: u8 = 0x01;
/// Server streams a previously requested file back to the client.
pub const ACTION_SEND: u8 = 0x02;

/// Separates file name from file size inside the metadata text.
pub const MESSAGE_DELIMITER: &str = "|";
/// Terminates the metadata text. A frame without it is not yet actionable.
pub const END_MESSAGE_MARKER: &str = "|END";

/// Size of the metadata length prefix on the wire.
pub const LEN_PREFIX_SIZE: usize = 8;

/// Upper bound on a compressed metadata frame. Anything larger is a
/// corrupt or hostile length prefix, not a real file name.
pub const MAX_METADATA_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Receive,
    Send,
}

impl Action {
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            ACTION_RECEIVE => Ok(Action::Receive),
            ACTION_SEND => Ok(Action::Send),
            other => Err(ProtocolError::UnknownAction(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Action::Receive => ACTION_RECEIVE,
            Action::Send => ACTION_SEND,
        }
    }
}
