//! Error types for the OMCI control channel.

use std::fmt;

/// Result type for control-channel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Ingress buffer is shorter than an OMCI baseline frame
    FrameTooShort { length: usize },
    /// Ingress bytes could not be parsed as OMCI
    Decode(String),
    /// Frame violates the request/response protocol
    Protocol(String),
    /// Autonomous message type with no handler yet
    UnsupportedMessage(String),
    /// Managed Entity instantiation rejected (unknown class or bad attributes)
    MeDefinition(String),
    /// A request frame could not be encoded
    Encode(String),
    /// A request frame could not be serialized into wire bytes
    Serialize(String),
    /// The inter-adapter transport refused the frame
    Transport(String),
    /// Device metadata could not be resolved prior to a send
    DeviceLookup(String),
    /// Response received for a transaction with no registered handler
    NoPendingRequest { transaction_id: u16 },
    /// The response channel of the owning FSM has been dropped
    ChannelClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FrameTooShort { length } => {
                write!(f, "frame too short for OMCI baseline format: {} bytes", length)
            }
            Error::Decode(msg) => write!(f, "decode error: {}", msg),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::UnsupportedMessage(msg) => write!(f, "unsupported message: {}", msg),
            Error::MeDefinition(msg) => write!(f, "managed entity error: {}", msg),
            Error::Encode(msg) => write!(f, "encode error: {}", msg),
            Error::Serialize(msg) => write!(f, "serialize error: {}", msg),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::DeviceLookup(msg) => write!(f, "device lookup error: {}", msg),
            Error::NoPendingRequest { transaction_id } => {
                write!(
                    f,
                    "no registered response handler for transaction {:#06x}",
                    transaction_id
                )
            }
            Error::ChannelClosed => write!(f, "response channel closed"),
        }
    }
}

impl std::error::Error for Error {}
