//! Faulty node behaviours.
//!
//! A faulty node runs a regular engine, but the network tampers with the messages it receives
//! and sends, according to the node's set of `Failure`s.

use std::collections::BTreeSet;

use rbc::rbc::{Content, Message};

use super::NodeId;

/// The payload faulty nodes substitute for the real one.
pub const BAD_PAYLOAD: &[u8] = b"Goodbye";

/// A way a node deviates from the protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Failure {
    /// Replaces the payload of every `Broadcast` it receives.
    BadMessage,
    /// Never sends `Echo`.
    NoEcho,
    /// Never sends `Ready`.
    NoReady,
    /// Never sends `Answer`.
    NoAnswer,
    /// Sends `Answer`s with the wrong payload.
    BadAnswer,
    /// Sends every message twice.
    DoubleSend,
    /// Sends an `Answer` together with each `Echo`, although nobody asked for it.
    UnrequestedAnswer,
    /// Sends all its messages on the wrong channel.
    WrongChannel,
    /// Sends its own broadcasts in reverse counter order.
    OutOfSequence,
    /// Misreads the origin of every `Broadcast` it receives.
    WrongRank,
    /// Broadcasts a different payload to every other odd-numbered recipient.
    Equivocate,
}

/// Returns the message as the faulty receiver understands it.
pub fn tamper_inbound(failures: &BTreeSet<Failure>, num_nodes: usize, mut msg: Message) -> Message {
    if let Content::Broadcast(ref mut payload) = msg.content {
        if failures.contains(&Failure::BadMessage) {
            *payload = BAD_PAYLOAD.to_vec();
        }
        if failures.contains(&Failure::WrongRank) {
            msg.origin = ((msg.origin as usize + 1) % num_nodes) as u32;
        }
    }
    msg
}

/// Returns the messages the faulty sender actually sends to `recipient`, instead of `msg`.
pub fn tamper_outbound(
    failures: &BTreeSet<Failure>,
    recipient: NodeId,
    mut msg: Message,
) -> Vec<Message> {
    let has = |failure: Failure| failures.contains(&failure);
    match msg.content {
        Content::Echo(_) if has(Failure::NoEcho) => return vec![],
        Content::Ready(_) if has(Failure::NoReady) => return vec![],
        Content::Answer(_) if has(Failure::NoAnswer) => return vec![],
        Content::Answer(ref mut payload) if has(Failure::BadAnswer) => {
            *payload = BAD_PAYLOAD.to_vec();
        }
        Content::Broadcast(ref mut payload) if has(Failure::Equivocate) && recipient.0 % 2 == 1 => {
            *payload = BAD_PAYLOAD.to_vec();
        }
        _ => (),
    }
    if has(Failure::WrongChannel) {
        msg.channel = msg.channel.wrapping_add(1);
    }
    let mut msgs = vec![msg.clone()];
    if has(Failure::UnrequestedAnswer) {
        if let Content::Echo(_) = msg.content {
            msgs.push(Content::Answer(b"Hello".to_vec()).with(msg.tag()));
        }
    }
    if has(Failure::DoubleSend) {
        msgs.push(msg);
    }
    msgs
}
