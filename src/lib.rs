//! # Reliable Broadcast
//!
//! A Byzantine fault tolerant reliable broadcast channel, after Bracha's protocol.
//!
//! A fixed _cabinet_ of _N_ nodes, at most _t_ of which are faulty (_3 t < N_), exchange messages
//! over an asynchronous network. Every member can broadcast any number of payloads. The channel
//! guarantees that every correct member delivers the same payload for each broadcast, or none
//! at all, and that payloads of correct originators are eventually delivered by every correct
//! member. Optionally, each originator's payloads are delivered in the order they were sent.
//!
//! ## Usage
//!
//! The [Rbc](rbc/struct.Rbc.html) engine only implements the abstract protocol. The application
//! calls `broadcast` with its payloads and `handle_message` with every message received from a
//! peer. Both return a [Step](struct.Step.html), containing the messages that need to be sent,
//! fault logs indicating misbehaving peers, and the delivered payloads.
//!
//! The [transport](transport/index.html) module connects an engine to a message transport: it
//! serializes the messages, runs the engine on its own thread and hands out the deliveries on a
//! channel.
//!
//! ## Serialization
//!
//! Messages are serialized with [bincode](https://docs.rs/bincode), in a fixed layout: the
//! message type, channel, origin and counter, followed by the length-prefixed payload.

// We put algorithm structs in `src/algorithm/algorithm.rs`.
// Some of our constructors return results.
#![allow(clippy::module_inception, clippy::new_ret_no_self)]
#![warn(missing_docs)]

mod fault_log;
mod messaging;
mod traits;

pub mod cabinet;
pub mod hash;
pub mod rbc;
pub mod transport;
pub mod util;

pub use crate::cabinet::{Cabinet, ConfigError};
pub use crate::fault_log::{Fault, FaultLog};
pub use crate::messaging::{SourcedMessage, Target, TargetedMessage};
pub use crate::traits::{DaStep, DistAlgorithm, Message, NodeIdT, Step};
