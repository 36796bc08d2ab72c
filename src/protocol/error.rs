use std::fmt;

#[derive(Debug)]
pub enum ProtocolError {
    UnknownAction(u8),
    Truncated,
    FrameTooLarge(usize),
    MissingEndMarker,
    MalformedMetadata(String),
    Overshoot { declared: u64, received: u64 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownAction(b) =>
                write!(f, "unknown action byte 0x{:02x}", b),
            ProtocolError::Truncated =>
                write!(f, "truncated frame"),
            ProtocolError::FrameTooLarge(size) =>
                write!(f, "metadata frame too large: {} bytes", size),
            ProtocolError::MissingEndMarker =>
                write!(f, "metadata end marker missing"),
            ProtocolError::MalformedMetadata(detail) =>
                write!(f, "malformed metadata: {}", detail),
            ProtocolError::Overshoot { declared, received } =>
                write!(f, "transfer overshoot: declared {} bytes, received {}", declared, received),
        }
    }
}

impl std::error::Error for ProtocolError {}
