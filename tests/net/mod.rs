//! A test network.
//!
//! Test networks simulate a real network with faulty nodes, and pass messages back and forth
//! between engine instances. Networks are "cranked" to move things forward: each crank delivers
//! one message to a node.

pub mod adversary;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::iter;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;

use rbc::rbc::{Delivery, FaultKind, Message, Rbc, RbcBuilder, Step};
use rbc::{Fault, Target, TargetedMessage};

pub use self::adversary::{Failure, BAD_PAYLOAD};

/// The maximum number of cranks before a network is considered stuck.
const MAX_CRANKS: usize = 1_000_000;

/// A node identifier. In the tests, nodes are simply numbered.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Clone, Copy)]
pub struct NodeId(pub usize);

/// A "node" running an engine instance.
pub struct TestNode {
    /// This node's own ID.
    pub id: NodeId,
    /// The engine instance.
    rbc: Rbc<NodeId>,
    /// Incoming messages from other nodes that this node has not yet handled.
    pub queue: VecDeque<(NodeId, Message)>,
    /// The payloads this node has delivered so far.
    outputs: Vec<Delivery<NodeId>>,
    /// Collected fault logs.
    faults: Vec<Fault<NodeId, FaultKind>>,
    /// The ways this node deviates from the protocol.
    failures: BTreeSet<Failure>,
}

impl TestNode {
    fn new(rbc: Rbc<NodeId>) -> Self {
        TestNode {
            id: *rbc.our_id(),
            rbc,
            queue: VecDeque::new(),
            outputs: Vec::new(),
            faults: Vec::new(),
            failures: BTreeSet::new(),
        }
    }

    /// Returns the list of deliveries of this node.
    pub fn outputs(&self) -> &[Delivery<NodeId>] {
        &self.outputs
    }

    /// Returns the payloads delivered from `origin`, in delivery order.
    pub fn payloads_from(&self, origin: NodeId) -> Vec<Vec<u8>> {
        self.outputs
            .iter()
            .filter(|delivery| delivery.origin == origin)
            .map(|delivery| delivery.payload.clone())
            .collect()
    }

    /// Returns the faults this node has detected.
    pub fn faults(&self) -> &[Fault<NodeId, FaultKind>] {
        &self.faults
    }

    /// Returns `true` if this node has detected a fault of the given kind by `node_id`.
    pub fn has_fault(&self, node_id: NodeId, kind: &FaultKind) -> bool {
        self.faults
            .iter()
            .any(|fault| fault.node_id == node_id && fault.kind == *kind)
    }

    /// Returns `true` if this node deviates from the protocol.
    pub fn is_faulty(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns the engine instance.
    pub fn instance(&self) -> &Rbc<NodeId> {
        &self.rbc
    }

    /// Returns the mutable engine instance.
    #[allow(unused)] // Not used in all tests.
    pub fn instance_mut(&mut self) -> &mut Rbc<NodeId> {
        &mut self.rbc
    }

    /// Handles the first message in the node's queue, and returns the messages to send.
    fn handle_message(&mut self, num_nodes: usize) -> Vec<TargetedMessage<Message, NodeId>> {
        let (from_id, msg) = self.queue.pop_front().expect("message not found");
        let msg = adversary::tamper_inbound(&self.failures, num_nodes, msg);
        debug!("Handling {:?} -> {:?}: {:?}", from_id, self.id, msg);
        let step = self
            .rbc
            .handle_message(&from_id, msg)
            .expect("handling message");
        self.record(step)
    }

    /// Stores the step's outputs and faults, and returns its messages.
    fn record(&mut self, step: Step<NodeId>) -> Vec<TargetedMessage<Message, NodeId>> {
        self.outputs.extend(step.output);
        self.faults.extend(step.fault_log.0);
        step.messages
    }
}

/// A strategy for picking the next node to handle a message.
#[derive(Clone, Copy, Debug)]
pub enum MessageScheduler {
    /// Picks a random node.
    Random,
    /// Picks the first non-idle node.
    First,
}

/// A collection of `TestNode`s representing a network.
pub struct TestNetwork {
    /// All nodes, correct and faulty.
    pub nodes: BTreeMap<NodeId, TestNode>,
    scheduler: MessageScheduler,
    rng: StdRng,
    /// The number of messages that have been put on the wire.
    messages_sent: usize,
}

impl TestNetwork {
    /// Creates a network of `num_nodes` correct nodes with ordered delivery on the default
    /// channel.
    pub fn new(num_nodes: usize, scheduler: MessageScheduler) -> Self {
        Self::new_with(num_nodes, scheduler, |_| ())
    }

    /// Creates a network of `num_nodes` correct nodes, each configured by `configure`.
    pub fn new_with<F>(num_nodes: usize, scheduler: MessageScheduler, mut configure: F) -> Self
    where
        F: FnMut(&mut RbcBuilder<NodeId>),
    {
        let ids: Vec<NodeId> = (0..num_nodes).map(NodeId).collect();
        let nodes = ids
            .iter()
            .map(|&id| {
                let mut builder = RbcBuilder::new(id);
                builder.cabinet(ids.iter().cloned());
                configure(&mut builder);
                let rbc = builder.build().expect("instantiate engine");
                (id, TestNode::new(rbc))
            })
            .collect();
        TestNetwork {
            nodes,
            scheduler,
            rng: StdRng::from_entropy(),
            messages_sent: 0,
        }
    }

    /// Makes the network's random choices reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Makes `id` a faulty node with the given failures.
    pub fn set_failures(&mut self, id: NodeId, failures: &[Failure]) {
        let node = self.nodes.get_mut(&id).expect("unknown node");
        node.failures = failures.iter().cloned().collect();
    }

    /// Returns the number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of messages put on the wire so far.
    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    /// Returns `true` if no node has messages to handle.
    pub fn is_idle(&self) -> bool {
        self.nodes.values().all(|node| node.queue.is_empty())
    }

    /// Makes the node `id` broadcast `payload`.
    pub fn broadcast(&mut self, id: NodeId, payload: &[u8]) {
        self.broadcast_many(id, iter::once(payload.to_vec()));
    }

    /// Makes the node `id` broadcast all `payloads`, one after another. The messages are only
    /// sent once all of them have been broadcast.
    pub fn broadcast_many<I>(&mut self, id: NodeId, payloads: I)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let node = self.nodes.get_mut(&id).expect("unknown node");
        let mut batches = Vec::new();
        for payload in payloads {
            let step = node.rbc.broadcast(payload).expect("broadcast");
            batches.push(node.record(step));
        }
        if node.failures.contains(&Failure::OutOfSequence) {
            batches.reverse();
        }
        for msgs in batches {
            self.dispatch_messages(id, msgs);
        }
    }

    /// Queues `msg` for `to`, as if it had been sent by `from`.
    pub fn inject(&mut self, from: NodeId, to: NodeId, msg: Message) {
        self.messages_sent += 1;
        let node = self.nodes.get_mut(&to).expect("unknown node");
        node.queue.push_back((from, msg));
    }

    /// Pushes the messages into the queues of the corresponding recipients.
    pub fn dispatch_messages<Q>(&mut self, sender_id: NodeId, msgs: Q)
    where
        Q: IntoIterator<Item = TargetedMessage<Message, NodeId>>,
    {
        let failures = self.nodes[&sender_id].failures.clone();
        for TargetedMessage { target, message } in msgs {
            let recipients: Vec<NodeId> = match target {
                Target::All => self
                    .nodes
                    .keys()
                    .filter(|&&id| id != sender_id)
                    .cloned()
                    .collect(),
                Target::Node(id) => vec![id],
            };
            for to_id in recipients {
                for msg in adversary::tamper_outbound(&failures, to_id, message.clone()) {
                    self.inject(sender_id, to_id, msg);
                }
            }
        }
    }

    /// Handles a queued message in a node picked by the scheduler. Returns the node's ID, or
    /// `None` if all queues are empty.
    pub fn crank(&mut self) -> Option<NodeId> {
        let mut busy = self
            .nodes
            .iter()
            .filter(|(_, node)| !node.queue.is_empty())
            .map(|(id, _)| *id);
        let id = match self.scheduler {
            MessageScheduler::First => busy.next(),
            MessageScheduler::Random => busy.choose(&mut self.rng),
        }?;
        let num_nodes = self.num_nodes();
        let msgs = self
            .nodes
            .get_mut(&id)
            .expect("unknown node")
            .handle_message(num_nodes);
        self.dispatch_messages(id, msgs);
        Some(id)
    }

    /// Cranks the network until no messages are left.
    pub fn crank_until_idle(&mut self) {
        for _ in 0..MAX_CRANKS {
            if self.crank().is_none() {
                return;
            }
        }
        panic!("network still busy after {} cranks", MAX_CRANKS);
    }

    /// Returns the number of nodes other than `origin` that delivered exactly `expected` from it.
    pub fn num_completed(&self, origin: NodeId, expected: &[Vec<u8>]) -> usize {
        self.nodes
            .values()
            .filter(|node| node.id != origin && node.payloads_from(origin) == expected)
            .count()
    }

    /// Returns the correct nodes.
    pub fn correct_nodes(&self) -> impl Iterator<Item = &TestNode> {
        self.nodes.values().filter(|node| !node.is_faulty())
    }
}
