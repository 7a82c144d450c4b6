use failure::Fail;

use super::MessageKind;
use crate::cabinet::ConfigError;

/// A reliable broadcast error.
///
/// These are only ever returned for local calls. Problems with inbound messages are dropped and
/// reported as a `FaultKind` in the `Step` instead.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "Cabinet configuration error: {}", _0)]
    Config(#[cause] ConfigError),
    #[fail(display = "No cabinet has been installed")]
    NoCabinet,
    #[fail(display = "The channel is disabled")]
    Disabled,
    #[fail(display = "Message counter exhausted for the current cabinet")]
    CounterExhausted,
    #[fail(display = "The channel task has stopped")]
    Stopped,
    #[fail(display = "Failed to serialize message: {}", _0)]
    Encode(bincode::ErrorKind),
    #[fail(display = "Failed to deserialize message: {}", _0)]
    Decode(bincode::ErrorKind),
    #[fail(display = "Unknown message type {}", _0)]
    UnknownMessageType(u8),
    #[fail(display = "Invalid {} payload of {} bytes", _0, _1)]
    InvalidPayload(MessageKind, usize),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

/// A reliable broadcast result.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Represents each reason why a reliable broadcast message could be faulty.
#[derive(Clone, Debug, Fail, PartialEq)]
pub enum FaultKind {
    #[fail(display = "`Rbc` received a message from a node outside the cabinet.")]
    NonCabinetSender,
    #[fail(display = "`Rbc` received a message for a different channel.")]
    ChannelMismatch,
    #[fail(display = "`Rbc` received a message with an origin outside the cabinet.")]
    OriginOutOfRange,
    #[fail(display = "`Rbc` received a `Broadcast` from a node other than its origin.")]
    BroadcastFromNonOrigin,
    #[fail(display = "`Rbc` received a `Broadcast` conflicting with the known payload.")]
    ConflictingPayload,
    #[fail(display = "`Rbc` received an `Answer` that doesn't match the requested hash.")]
    AnswerHashMismatch,
    #[fail(display = "`Rbc` received a message that could not be decoded.")]
    MalformedMessage,
}
