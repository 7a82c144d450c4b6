use std::fmt::{self, Debug, Display};

use hex_fmt::HexFmt;
use serde::{Deserialize, Serialize};

use super::{Error, Result};
use crate::hash::{Digest, DIGEST_LEN};

/// The unique identifier of one broadcast instance.
///
/// It is a pure function of `(channel, origin, counter)`, so every peer derives the same tag
/// without exchanging it: the channel occupies the top 16 bits, the origin index bits 8 to 39
/// and the counter the lowest byte.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Tag(u64);

impl Tag {
    /// Creates the tag of the `counter`-th broadcast by the cabinet member at `origin`.
    pub fn new(channel: u16, origin: u32, counter: u8) -> Self {
        Tag(u64::from(channel) << 48 | u64::from(origin) << 8 | u64::from(counter))
    }

    /// Returns the channel the broadcast belongs to.
    pub fn channel(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// Returns the cabinet index of the originator.
    pub fn origin(self) -> u32 {
        (self.0 >> 8) as u32
    }

    /// Returns the originator's counter.
    pub fn counter(self) -> u8 {
        self.0 as u8
    }

    /// Returns the raw tag value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.channel(), self.origin(), self.counter())
    }
}

/// The five message kinds, as they appear in the wire `type` byte.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(u8)]
pub enum MessageKind {
    /// The originator's payload.
    Broadcast = 0,
    /// A payload digest, sent after the `Broadcast`.
    Echo = 1,
    /// A payload digest, sent after an `Echo` quorum or `Ready` amplification.
    Ready = 2,
    /// A request for the payload.
    Request = 3,
    /// The requested payload.
    Answer = 4,
}

impl MessageKind {
    /// Returns the kind with the given wire `type` byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MessageKind::Broadcast),
            1 => Some(MessageKind::Echo),
            2 => Some(MessageKind::Ready),
            3 => Some(MessageKind::Request),
            4 => Some(MessageKind::Answer),
            _ => None,
        }
    }

    /// Returns this kind's bit in a party's flag set.
    pub fn flag(self) -> u8 {
        1 << self as u8
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// The content of a reliable broadcast message.
#[derive(Clone, Eq, PartialEq)]
pub enum Content {
    /// The full payload, sent by the originator to every other member.
    Broadcast(Vec<u8>),
    /// The digest of the payload the sender received from the originator.
    Echo(Digest),
    /// Indicates that the sender knows that every correct node will eventually deliver the
    /// payload with this digest.
    Ready(Digest),
    /// Asks the recipient for the payload, after a `Ready` quorum was seen without it.
    Request,
    /// The full payload, in response to a `Request`.
    Answer(Vec<u8>),
}

impl Content {
    /// Returns a `Message` with this content for the broadcast instance `tag`.
    pub fn with(self, tag: Tag) -> Message {
        Message {
            channel: tag.channel(),
            origin: tag.origin(),
            counter: tag.counter(),
            content: self,
        }
    }

    /// Returns the kind of this content.
    pub fn kind(&self) -> MessageKind {
        match *self {
            Content::Broadcast(_) => MessageKind::Broadcast,
            Content::Echo(_) => MessageKind::Echo,
            Content::Ready(_) => MessageKind::Ready,
            Content::Request => MessageKind::Request,
            Content::Answer(_) => MessageKind::Answer,
        }
    }
}

impl Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Content::Broadcast(ref v) => write!(f, "Broadcast({:0.10})", HexFmt(v)),
            Content::Echo(ref h) => write!(f, "Echo({:0.10})", HexFmt(h)),
            Content::Ready(ref h) => write!(f, "Ready({:0.10})", HexFmt(h)),
            Content::Request => write!(f, "Request"),
            Content::Answer(ref v) => write!(f, "Answer({:0.10})", HexFmt(v)),
        }
    }
}

/// A reliable broadcast message, addressing the instance given by channel, origin and counter.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Message {
    /// The channel the engine is configured for.
    pub channel: u16,
    /// The cabinet index of the broadcast's originator.
    pub origin: u32,
    /// The originator's counter for this broadcast.
    pub counter: u8,
    /// The message content.
    pub content: Content,
}

/// The serialized form of a `Message`: fields in this order, with `payload` holding the
/// payload, the digest, or nothing, depending on `type`.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: u8,
    channel: u16,
    origin: u32,
    counter: u8,
    payload: Vec<u8>,
}

impl Message {
    /// Returns the tag of the broadcast instance this message belongs to.
    pub fn tag(&self) -> Tag {
        Tag::new(self.channel, self.origin, self.counter)
    }

    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }

    /// Serializes the message into its wire representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = match self.content {
            Content::Broadcast(ref v) | Content::Answer(ref v) => v.clone(),
            Content::Echo(ref h) | Content::Ready(ref h) => h.to_vec(),
            Content::Request => Vec::new(),
        };
        let wire = WireMessage {
            kind: self.kind() as u8,
            channel: self.channel,
            origin: self.origin,
            counter: self.counter,
            payload,
        };
        bincode::serialize(&wire).map_err(|err| Error::Encode(*err))
    }

    /// Deserializes a message from its wire representation.
    ///
    /// Fails if the type byte is unknown, a digest has the wrong length, or a `Request` carries a
    /// payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Message> {
        let wire: WireMessage = bincode::deserialize(bytes).map_err(|err| Error::Decode(*err))?;
        let kind = MessageKind::from_u8(wire.kind).ok_or(Error::UnknownMessageType(wire.kind))?;
        let content = match kind {
            MessageKind::Broadcast => Content::Broadcast(wire.payload),
            MessageKind::Answer => Content::Answer(wire.payload),
            MessageKind::Echo => Content::Echo(to_digest(kind, &wire.payload)?),
            MessageKind::Ready => Content::Ready(to_digest(kind, &wire.payload)?),
            MessageKind::Request if wire.payload.is_empty() => Content::Request,
            MessageKind::Request => return Err(Error::InvalidPayload(kind, wire.payload.len())),
        };
        Ok(Message {
            channel: wire.channel,
            origin: wire.origin,
            counter: wire.counter,
            content,
        })
    }
}

fn to_digest(kind: MessageKind, bytes: &[u8]) -> Result<Digest> {
    if bytes.len() != DIGEST_LEN {
        return Err(Error::InvalidPayload(kind, bytes.len()));
    }
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(bytes);
    Ok(digest)
}
