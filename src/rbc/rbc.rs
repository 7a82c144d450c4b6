use std::borrow::Borrow;
use std::cmp::Ordering;
use std::{fmt, result};

use hex_fmt::HexFmt;
use log::{debug, info, trace, warn};

use super::party::PartyState;
use super::record::{PayloadUpdate, RecordStore};
use super::{Content, Error, FaultKind, Message, MessageKind, Result, Tag};
use crate::cabinet::{Cabinet, ConfigError};
use crate::fault_log::Fault;
use crate::hash::{hash, Digest};
use crate::{DistAlgorithm, NodeIdT, Target};

/// A payload that has been reliably broadcast by the cabinet member `origin`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delivery<N> {
    /// The ID of the originator.
    pub origin: N,
    /// The delivered payload.
    pub payload: Vec<u8>,
}

/// Reliable broadcast channel instance.
///
/// One instance runs every broadcast of every cabinet member on one channel. It is a pure state
/// machine: deliveries and outgoing messages are returned in the `Step`, never sent or called
/// back from inside.
#[derive(Debug)]
pub struct Rbc<N> {
    /// This node's ID.
    pub(super) our_id: N,
    /// The channel all our messages carry, and that inbound messages must match.
    pub(super) channel: u16,
    /// Whether each originator's broadcasts are delivered strictly in counter order.
    pub(super) ordered_delivery: bool,
    /// Whether we process messages at all.
    pub(super) enabled: bool,
    /// The current cabinet, if one has been installed.
    pub(super) cabinet: Option<Cabinet<N>>,
    /// The counter of our latest broadcast in this cabinet.
    pub(super) msg_counter: u8,
    /// Flags and delivery state for each cabinet member, by index.
    pub(super) parties: Vec<PartyState>,
    /// Per-tag broadcast state.
    pub(super) records: RecordStore,
}

/// An `Rbc` step, containing any number of deliveries.
pub type Step<N> = crate::DaStep<Rbc<N>>;

impl<N: NodeIdT> DistAlgorithm for Rbc<N> {
    type NodeId = N;
    type Input = Vec<u8>;
    type Output = Delivery<N>;
    type Message = Message;
    type Error = Error;
    type FaultKind = FaultKind;

    fn handle_input(&mut self, input: Self::Input) -> Result<Step<N>> {
        self.broadcast(input)
    }

    fn handle_message(&mut self, sender_id: &N, message: Message) -> Result<Step<N>> {
        self.handle_message(sender_id, message)
    }

    fn terminated(&self) -> bool {
        false
    }

    fn our_id(&self) -> &N {
        &self.our_id
    }
}

impl<N: NodeIdT> Rbc<N> {
    /// Creates an enabled, ordered instance on `channel` for the cabinet `members`.
    ///
    /// Use `RbcBuilder` for the other options.
    pub fn new<I>(our_id: N, channel: u16, members: I) -> result::Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: Borrow<N>,
    {
        super::RbcBuilder::new(our_id)
            .channel(channel)
            .cabinet(members)
            .build()
    }

    /// Replaces the cabinet and starts a new epoch: all broadcast records, party state and our
    /// counter are discarded.
    ///
    /// If the new cabinet is empty or doesn't contain us, an error is returned and nothing
    /// changes.
    pub fn reset_cabinet<I>(&mut self, members: I) -> result::Result<(), ConfigError>
    where
        I: IntoIterator,
        I::Item: Borrow<N>,
    {
        let cabinet = Cabinet::new(self.our_id.clone(), members)?;
        info!(
            "{}: New cabinet of {} members, tolerating {} faulty, our index {}",
            self,
            cabinet.num_nodes(),
            cabinet.num_faulty(),
            cabinet.our_index()
        );
        self.cabinet = Some(cabinet);
        self.clear_state();
        Ok(())
    }

    /// Enables or disables the channel. Disabling discards all state of the current epoch, so
    /// the protocol can't continue for any broadcast in flight.
    pub fn enable(&mut self, enable: bool) {
        info!("{}: {}", self, if enable { "Enabled" } else { "Disabled" });
        self.enabled = enable;
        if !enable {
            self.clear_state();
        }
    }

    /// Reliably broadcasts `payload` to the cabinet.
    ///
    /// The `Broadcast` message is sent to every other member, and handled by ourselves as if we
    /// had received it. Our own broadcasts are never delivered to ourselves.
    pub fn broadcast(&mut self, payload: Vec<u8>) -> Result<Step<N>> {
        if !self.enabled {
            return Err(Error::Disabled);
        }
        let our_index = self.cabinet()?.our_index();
        let counter = self
            .msg_counter
            .checked_add(1)
            .ok_or(Error::CounterExhausted)?;
        self.msg_counter = counter;
        let tag = Tag::new(self.channel, our_index as u32, counter);
        debug!(
            "{}: Broadcasting {} bytes as {}: {:0.10}",
            self,
            payload.len(),
            tag,
            HexFmt(&payload)
        );
        let msg = Content::Broadcast(payload.clone()).with(tag);
        let step: Step<N> = Target::All.message(msg).into();
        Ok(step.join(self.handle_broadcast(our_index, tag, payload)?))
    }

    /// Handles a message received from `sender_id`.
    ///
    /// This must be called with every message we receive from another node. Invalid messages
    /// are dropped, and reported in the fault log if the sender is to blame.
    pub fn handle_message(&mut self, sender_id: &N, message: Message) -> Result<Step<N>> {
        let sender_index = match self.check_message(sender_id, &message) {
            Ok(sender_index) => sender_index,
            Err(step) => return Ok(step),
        };
        let tag = message.tag();
        match message.content {
            Content::Broadcast(payload) => self.handle_broadcast(sender_index, tag, payload),
            Content::Echo(digest) => self.handle_echo(sender_index, tag, digest),
            Content::Ready(digest) => self.handle_ready(sender_index, tag, digest),
            Content::Request => self.handle_request(sender_index, tag),
            Content::Answer(payload) => self.handle_answer(sender_index, tag, payload),
        }
    }

    /// Returns our node ID.
    pub fn our_id(&self) -> &N {
        &self.our_id
    }

    /// Returns our index in the current cabinet.
    pub fn our_index(&self) -> Option<usize> {
        self.cabinet.as_ref().map(Cabinet::our_index)
    }

    /// Returns the current cabinet.
    pub fn cabinet(&self) -> Result<&Cabinet<N>> {
        self.cabinet.as_ref().ok_or(Error::NoCabinet)
    }

    /// Returns the maximum number of faulty members tolerated by the current cabinet.
    pub fn threshold(&self) -> Option<usize> {
        self.cabinet.as_ref().map(Cabinet::num_faulty)
    }

    /// Returns the channel this instance runs on.
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Returns `true` if each origin's broadcasts are delivered in counter order.
    pub fn ordered_delivery(&self) -> bool {
        self.ordered_delivery
    }

    /// Returns `true` if the channel is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the counter of our latest broadcast in the current cabinet.
    pub fn message_counter(&self) -> u8 {
        self.msg_counter
    }

    /// Returns the number of broadcast instances we hold state for.
    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Returns the number of ready broadcasts by `origin` that wait for earlier ones.
    pub fn num_undelivered(&self, origin: &N) -> usize {
        self.cabinet
            .as_ref()
            .and_then(|cabinet| cabinet.index(origin))
            .and_then(|idx| self.parties.get(idx))
            .map_or(0, PartyState::num_undelivered)
    }

    /// Discards all per-epoch state.
    fn clear_state(&mut self) {
        let num_nodes = self.cabinet.as_ref().map_or(0, Cabinet::num_nodes);
        self.parties = vec![PartyState::default(); num_nodes];
        self.records.clear();
        self.msg_counter = 0;
    }

    /// Checks that we are enabled, that the sender is a cabinet member, and that the channel
    /// and origin are valid. Returns the sender's index, or the step to return instead.
    fn check_message(&self, sender_id: &N, message: &Message) -> result::Result<usize, Step<N>> {
        if !self.enabled {
            debug!("{}: Disabled, dropping {:?} from {:?}", self, message, sender_id);
            return Err(Step::default());
        }
        let cabinet = match self.cabinet {
            Some(ref cabinet) => cabinet,
            None => {
                debug!("{}: No cabinet, dropping {:?} from {:?}", self, message, sender_id);
                return Err(Step::default());
            }
        };
        let sender_index = match cabinet.index(sender_id) {
            Some(sender_index) => sender_index,
            None => return Err(self.fault(sender_id, FaultKind::NonCabinetSender)),
        };
        if message.channel != self.channel {
            return Err(self.fault(sender_id, FaultKind::ChannelMismatch));
        }
        if message.origin as usize >= cabinet.num_nodes() {
            return Err(self.fault(sender_id, FaultKind::OriginOutOfRange));
        }
        Ok(sender_index)
    }

    /// Handles a `Broadcast` message: if it comes from its origin and is the first payload we
    /// see for the tag, multicasts an `Echo` with its digest and handles it ourselves.
    fn handle_broadcast(&mut self, sender_index: usize, tag: Tag, payload: Vec<u8>) -> Result<Step<N>> {
        if !self.set_party_flag(sender_index, tag, MessageKind::Broadcast) {
            let conflicting = self
                .records
                .get(tag)
                .and_then(|rec| rec.known_payload())
                .map_or(false, |known| *known != payload);
            if conflicting {
                warn!(
                    "{}: Received conflicting Broadcast {} from node {}, keeping the first payload",
                    self, tag, sender_index
                );
                return self.fault_at(sender_index, FaultKind::ConflictingPayload);
            }
            return Ok(Step::default());
        }
        trace!(
            "{}: Broadcast {} from node {}: {:0.10}",
            self,
            tag,
            sender_index,
            HexFmt(&payload)
        );
        if sender_index != tag.origin() as usize {
            warn!(
                "{}: Received Broadcast {} from node {}, which isn't its origin",
                self, tag, sender_index
            );
            return self.fault_at(sender_index, FaultKind::BroadcastFromNonOrigin);
        }
        let digest = hash(&payload);
        let record = self.records.entry(tag);
        if record.pending_request().map_or(false, |requested| *requested != digest) {
            warn!(
                "{}: Received Broadcast {} from node {} that contradicts the Ready quorum",
                self, tag, sender_index
            );
            return self.fault_at(sender_index, FaultKind::ConflictingPayload);
        }
        match record.offer_payload(payload) {
            PayloadUpdate::Set => (),
            PayloadUpdate::Unchanged => return Ok(Step::default()),
            PayloadUpdate::Conflict => {
                warn!(
                    "{}: Received conflicting Broadcast {} from node {}, keeping the first payload",
                    self, tag, sender_index
                );
                return self.fault_at(sender_index, FaultKind::ConflictingPayload);
            }
        }
        let mut step = self.send_echo(tag, digest)?;
        // A `Ready` quorum may have fixed this digest before the payload arrived.
        if self.records.entry(tag).requested(&digest) {
            step.extend(self.try_deliver(tag)?);
        }
        Ok(step)
    }

    /// Handles an `Echo` message: upon `N - t` matching echoes, multicasts `Ready`, unless more
    /// than `t` readies have been seen already.
    fn handle_echo(&mut self, sender_index: usize, tag: Tag, digest: Digest) -> Result<Step<N>> {
        if !self.set_party_flag(sender_index, tag, MessageKind::Echo) {
            return Ok(Step::default());
        }
        let count = self.records.entry(tag).add_echo(&digest);
        trace!(
            "{}: Echo {} from node {}: {:0.10}, {:?}",
            self,
            tag,
            sender_index,
            HexFmt(&digest),
            count
        );
        let cabinet = self.cabinet()?;
        if count.echo == cabinet.num_correct() && count.ready <= cabinet.num_faulty() {
            return self.send_ready(tag, digest);
        }
        Ok(Step::default())
    }

    /// Handles a `Ready` message: amplifies upon `t + 1`, and delivers or requests the payload
    /// upon `2 t + 1` matching readies.
    fn handle_ready(&mut self, sender_index: usize, tag: Tag, digest: Digest) -> Result<Step<N>> {
        if !self.set_party_flag(sender_index, tag, MessageKind::Ready) {
            return Ok(Step::default());
        }
        let count = self.records.entry(tag).add_ready(&digest);
        trace!(
            "{}: Ready {} from node {}: {:0.10}, {:?}",
            self,
            tag,
            sender_index,
            HexFmt(&digest),
            count
        );
        let cabinet = self.cabinet()?;
        let num_faulty = cabinet.num_faulty();
        if num_faulty > 0 && count.ready == num_faulty + 1 && count.echo < cabinet.num_correct() {
            return self.send_ready(tag, digest);
        }
        if count.ready == 2 * num_faulty + 1 {
            return self.on_ready_quorum(tag, digest);
        }
        Ok(Step::default())
    }

    /// Handles a `Request` message: answers with the payload, if we know it.
    fn handle_request(&mut self, sender_index: usize, tag: Tag) -> Result<Step<N>> {
        if !self.set_party_flag(sender_index, tag, MessageKind::Request) {
            return Ok(Step::default());
        }
        trace!("{}: Request {} from node {}", self, tag, sender_index);
        let payload = match self.records.get(tag).and_then(|rec| rec.known_payload()) {
            Some(payload) => payload.clone(),
            None => return Ok(Step::default()),
        };
        let sender_id = self.member_id(sender_index)?;
        let msg = Content::Answer(payload).with(tag);
        Ok(Target::Node(sender_id).message(msg).into())
    }

    /// Handles an `Answer` message: if it contains the payload we requested, delivers it.
    fn handle_answer(&mut self, sender_index: usize, tag: Tag, payload: Vec<u8>) -> Result<Step<N>> {
        if !self.set_party_flag(sender_index, tag, MessageKind::Answer) {
            return Ok(Step::default());
        }
        let requested = match self.records.get(tag).and_then(|rec| rec.pending_request()) {
            Some(digest) => *digest,
            None => {
                debug!(
                    "{}: Ignoring unrequested Answer {} from node {}",
                    self, tag, sender_index
                );
                return Ok(Step::default());
            }
        };
        if hash(&payload) != requested {
            warn!(
                "{}: Received bad Answer {} from node {}: {:0.10}",
                self,
                tag,
                sender_index,
                HexFmt(&payload)
            );
            return self.fault_at(sender_index, FaultKind::AnswerHashMismatch);
        }
        trace!("{}: Recovered payload {} from node {}", self, tag, sender_index);
        self.records.entry(tag).offer_payload(payload);
        self.try_deliver(tag)
    }

    /// Multicasts an `Echo` with the given digest, and handles it ourselves.
    fn send_echo(&mut self, tag: Tag, digest: Digest) -> Result<Step<N>> {
        debug!("{}: Sending Echo {}: {:0.10}", self, tag, HexFmt(&digest));
        let our_index = self.cabinet()?.our_index();
        let step: Step<N> = Target::All.message(Content::Echo(digest).with(tag)).into();
        Ok(step.join(self.handle_echo(our_index, tag, digest)?))
    }

    /// Multicasts a `Ready` with the given digest, and handles it ourselves. Does nothing if we
    /// have sent a `Ready` for this tag before.
    fn send_ready(&mut self, tag: Tag, digest: Digest) -> Result<Step<N>> {
        let our_index = self.cabinet()?.our_index();
        if self.parties[our_index].has_flag(tag, MessageKind::Ready) {
            return Ok(Step::default());
        }
        debug!("{}: Sending Ready {}: {:0.10}", self, tag, HexFmt(&digest));
        let step: Step<N> = Target::All.message(Content::Ready(digest).with(tag)).into();
        Ok(step.join(self.handle_ready(our_index, tag, digest)?))
    }

    /// `2 t + 1` members are ready to deliver the payload with `digest`. If ours matches, deliver
    /// it. Otherwise ask `2 t + 1` other members for it: at least `t + 1` of them are correct
    /// and know it.
    fn on_ready_quorum(&mut self, tag: Tag, digest: Digest) -> Result<Step<N>> {
        let record = self.records.entry(tag);
        if record.payload_matches(&digest) {
            return self.try_deliver(tag);
        }
        record.request(digest);
        let cabinet = self.cabinet()?;
        let num_requests = 2 * cabinet.num_faulty() + 1;
        let msg = Content::Request.with(tag);
        let mut step = Step::default();
        step.messages = cabinet
            .other_ids()
            .take(num_requests)
            .map(|id| Target::Node(id.clone()).message(msg.clone()))
            .collect();
        debug!(
            "{}: Ready quorum for {} without its payload, requesting {:0.10} from {} members",
            self,
            tag,
            HexFmt(&digest),
            step.messages.len()
        );
        Ok(step)
    }

    /// Delivers the known payload for `tag`, unless we are its origin, it was delivered already,
    /// or, with ordered delivery, earlier broadcasts by the same origin are still outstanding.
    fn try_deliver(&mut self, tag: Tag) -> Result<Step<N>> {
        let origin = tag.origin() as usize;
        if origin == self.cabinet()?.our_index() {
            return Ok(Step::default());
        }
        let record = self.records.entry(tag);
        if record.is_delivered() {
            return Ok(Step::default());
        }
        let payload = match record.known_payload() {
            Some(payload) => payload.clone(),
            None => return Ok(Step::default()),
        };
        if self.ordered_delivery {
            let party = &mut self.parties[origin];
            let expected = party.delivered_sequence();
            match tag.counter().cmp(&expected) {
                Ordering::Equal => (),
                Ordering::Greater => {
                    party.defer(tag);
                    debug!(
                        "{}: Deferring {}, node {} is at counter {}",
                        self, tag, origin, expected
                    );
                    return Ok(Step::default());
                }
                Ordering::Less => {
                    debug!(
                        "{}: Dropping stale {}, node {} is at counter {}",
                        self, tag, origin, expected
                    );
                    return Ok(Step::default());
                }
            }
        }
        self.deliver(origin, tag, payload)
    }

    /// Outputs the payload, advances the origin's sequence and, with ordered delivery, drains
    /// the broadcasts that were waiting for it.
    fn deliver(&mut self, origin: usize, tag: Tag, payload: Vec<u8>) -> Result<Step<N>> {
        let origin_id = self.member_id(origin)?;
        let mut step = Step::default();
        let mut next = Some((tag, payload));
        while let Some((tag, payload)) = next.take() {
            debug!("{}: Delivering {}: {:0.10}", self, tag, HexFmt(&payload));
            self.records.entry(tag).set_delivered();
            self.parties[origin].advance();
            step.output.push(Delivery {
                origin: origin_id.clone(),
                payload,
            });
            if !self.ordered_delivery {
                break;
            }
            if let Some(old_tag) = self.parties[origin].take_next() {
                match self.records.get(old_tag).and_then(|rec| rec.known_payload()) {
                    Some(payload) => next = Some((old_tag, payload.clone())),
                    None => warn!("{}: Deferred {} has no payload", self, old_tag),
                }
            }
        }
        Ok(step)
    }

    /// Sets the flag for `kind` and `tag` of the sender. Returns `false` if it was set already.
    fn set_party_flag(&mut self, sender_index: usize, tag: Tag, kind: MessageKind) -> bool {
        let is_new = self
            .parties
            .get_mut(sender_index)
            .map_or(false, |party| party.set_flag(tag, kind));
        if !is_new {
            debug!(
                "{}: Repeated {} {} from node {}",
                self, kind, tag, sender_index
            );
        }
        is_new
    }

    /// Returns the ID of the cabinet member at `index`.
    fn member_id(&self, index: usize) -> Result<N> {
        self.cabinet()?
            .id(index)
            .cloned()
            .ok_or(Error::NoCabinet)
    }

    /// Logs a fault by `sender_id` and returns it as a step.
    fn fault(&self, sender_id: &N, kind: FaultKind) -> Step<N> {
        warn!("{}: Dropping message from {:?}: {}", self, sender_id, kind);
        Fault::new(sender_id.clone(), kind).into()
    }

    /// Returns a step blaming the cabinet member at `sender_index`.
    fn fault_at(&self, sender_index: usize, kind: FaultKind) -> Result<Step<N>> {
        Ok(Fault::new(self.member_id(sender_index)?, kind).into())
    }
}

impl<N: NodeIdT> fmt::Display for Rbc<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{:?} Rbc({})", self.our_id, self.channel)
    }
}
