//! # Reliable Broadcast Channel
//!
//! Every cabinet member can broadcast any number of payloads on a channel. Each broadcast is an
//! independent protocol instance, identified by a _tag_ derived from the channel, the originator's
//! cabinet index and the originator's counter. Even if the originator is faulty it is guaranteed
//! that either none of the correct nodes deliver anything for a tag, or all of them deliver the
//! same payload. If the originator is correct, all correct nodes eventually deliver its payload.
//!
//! The cabinet has _N_ members, at most _t_ of them faulty, where _3 t < N_.
//!
//! ## How it works
//!
//! * The originator sends `Broadcast(v)` with the full payload to every other member.
//! * A member receiving the first `Broadcast(v)` from the originator itself multicasts `Echo(h)`,
//!   where _h_ is the hash of _v_.
//! * Upon _N - t_ `Echo(h)`, if it has not seen more than _t_ `Ready(h)` yet, a member multicasts
//!   `Ready(h)`. In any _N - t_ members, at least _t + 1_ are correct, and no other hash can
//!   collect _N - t_ echoes.
//! * Upon _t + 1_ `Ready(h)`, at least one correct member has seen the echo quorum, so a member
//!   multicasts `Ready(h)` itself, if it hasn't yet. This _amplification_ makes sure that every
//!   correct member eventually sees _2 t + 1_ readies, even if it missed some echoes.
//! * Upon _2 t + 1_ `Ready(h)`, the member delivers _v_ if it hashes to _h_. Otherwise it never
//!   received the right payload, so it sends a `Request` to _2 t + 1_ other members, at least
//!   _t + 1_ of which are correct and hold _v_, and delivers the first `Answer(v)` that hashes to
//!   _h_.
//!
//! Every member handles each message kind at most once per sender and tag, so replayed or
//! duplicated messages cause no state changes and no additional traffic.
//!
//! With ordered delivery, each originator's payloads are delivered in counter order: a payload
//! that is ready before its predecessors is held back until they have been delivered.
//!
//! Deliveries are returned in the `Step`'s `output`, after all state changes they imply. The
//! caller is free to broadcast again in response.

mod builder;
mod error;
mod message;
mod party;
mod rbc;
mod record;

pub use self::builder::RbcBuilder;
pub use self::error::{Error, FaultKind, Result};
pub use self::message::{Content, Message, MessageKind, Tag};
pub use self::party::FIRST_COUNTER;
pub use self::rbc::{Delivery, Rbc, Step};

/// The transport service ID reliable broadcast messages are sent and subscribed with.
pub const SERVICE_RBC: u16 = 930;

/// The default channel of a reliable broadcast instance.
pub const CHANNEL_RBC_BROADCAST: u16 = 1;
