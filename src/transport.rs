//! # Transport adapter
//!
//! Connects an [`Rbc`](../rbc/struct.Rbc.html) engine to a message transport. The engine runs on
//! its own thread, which owns it exclusively: inbound packets and commands from the
//! [`RbcHandle`](struct.RbcHandle.html) are handled one at a time, in the order they arrive.
//!
//! Outgoing messages are serialized and sent to their targets, with `Target::All` expanded into
//! one packet per other cabinet member. Deliveries and detected faults are forwarded on
//! channels that the application can receive from.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};

use crate::rbc::{Delivery, Error, FaultKind, Message, Rbc, Result, Step, SERVICE_RBC};
use crate::{Fault, NodeIdT, SourcedMessage, Target};

/// A packet received from a peer: the sender's ID and the serialized message.
pub type Packet<N> = SourcedMessage<Vec<u8>, N>;

/// A point-to-point message transport, addressing peers by ID and messages by service and
/// channel.
pub trait Transport<N>: Send {
    /// Sends `bytes` to `peer`. Delivery is best-effort: the protocol tolerates lost packets
    /// from faulty links as long as enough correct members are connected.
    fn send(&self, peer: &N, service: u16, channel: u16, bytes: Vec<u8>);

    /// Returns a receiver of all packets sent to us with the given service and channel.
    fn subscribe(&self, service: u16, channel: u16) -> Receiver<Packet<N>>;
}

/// A request from an `RbcHandle` to the engine thread.
enum Command<N> {
    Broadcast(Vec<u8>, Sender<Result<()>>),
    Enable(bool),
    ResetCabinet(Vec<N>, Sender<Result<()>>),
    Shutdown,
}

/// Runs an engine against a transport, one event at a time.
pub struct RbcActor<N, T> {
    rbc: Rbc<N>,
    transport: T,
    deliveries: Sender<Delivery<N>>,
    faults: Sender<Fault<N, FaultKind>>,
}

impl<N, T> RbcActor<N, T>
where
    N: NodeIdT,
    T: Transport<N>,
{
    /// Creates an actor, and returns it together with the receivers of its deliveries and of
    /// the faults it detects.
    pub fn new(
        rbc: Rbc<N>,
        transport: T,
    ) -> (Self, Receiver<Delivery<N>>, Receiver<Fault<N, FaultKind>>) {
        let (deliveries, deliveries_rx) = unbounded();
        let (faults, faults_rx) = unbounded();
        let actor = RbcActor {
            rbc,
            transport,
            deliveries,
            faults,
        };
        (actor, deliveries_rx, faults_rx)
    }

    /// Returns the engine.
    pub fn rbc(&self) -> &Rbc<N> {
        &self.rbc
    }

    /// Broadcasts `payload` and sends the resulting messages.
    pub fn broadcast(&mut self, payload: Vec<u8>) -> Result<()> {
        let step = self.rbc.broadcast(payload)?;
        self.dispatch(step);
        Ok(())
    }

    /// Enables or disables the engine.
    pub fn enable(&mut self, enable: bool) {
        self.rbc.enable(enable);
    }

    /// Installs a new cabinet.
    pub fn reset_cabinet(&mut self, members: Vec<N>) -> Result<()> {
        self.rbc.reset_cabinet(members).map_err(Error::from)
    }

    /// Decodes and handles a packet from `source`. Packets that can't be decoded are dropped and
    /// reported as a `MalformedMessage` fault.
    pub fn handle_packet(&mut self, source: &N, bytes: &[u8]) {
        let msg = match Message::from_bytes(bytes) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(
                    "{}: Dropping malformed packet from {:?}: {}",
                    self.rbc, source, err
                );
                self.report(Fault::new(source.clone(), FaultKind::MalformedMessage));
                return;
            }
        };
        match self.rbc.handle_message(source, msg) {
            Ok(step) => self.dispatch(step),
            Err(err) => error!(
                "{}: Failed to handle a message from {:?}: {}",
                self.rbc, source, err
            ),
        }
    }

    /// Handles packets and commands until the handle asks us to stop or goes away.
    fn run(mut self, inbound: Receiver<Packet<N>>, commands: Receiver<Command<N>>) {
        info!("{}: Running", self.rbc);
        loop {
            select! {
                recv(inbound) -> packet => match packet {
                    Ok(SourcedMessage { source, message }) => self.handle_packet(&source, &message),
                    Err(_) => {
                        info!("{}: Transport closed", self.rbc);
                        break;
                    }
                },
                recv(commands) -> cmd => match cmd {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(cmd) => self.handle_command(cmd),
                },
            }
        }
        info!("{}: Stopped", self.rbc);
    }

    fn handle_command(&mut self, cmd: Command<N>) {
        match cmd {
            Command::Broadcast(payload, reply) => {
                let result = self.broadcast(payload);
                let _ = reply.send(result);
            }
            Command::Enable(enable) => self.enable(enable),
            Command::ResetCabinet(members, reply) => {
                let result = self.reset_cabinet(members);
                let _ = reply.send(result);
            }
            Command::Shutdown => (),
        }
    }

    /// Sends the step's messages, and forwards its deliveries and faults.
    fn dispatch(&mut self, step: Step<N>) {
        let channel = self.rbc.channel();
        for msg in step.messages {
            let bytes = match msg.message.to_bytes() {
                Ok(bytes) => bytes,
                Err(err) => {
                    error!("{}: Failed to serialize {:?}: {}", self.rbc, msg.message, err);
                    continue;
                }
            };
            match msg.target {
                Target::All => {
                    let cabinet = match self.rbc.cabinet() {
                        Ok(cabinet) => cabinet,
                        Err(_) => continue,
                    };
                    for id in cabinet.other_ids() {
                        self.transport.send(id, SERVICE_RBC, channel, bytes.clone());
                    }
                }
                Target::Node(ref id) => self.transport.send(id, SERVICE_RBC, channel, bytes),
            }
        }
        for fault in step.fault_log {
            self.report(fault);
        }
        for delivery in step.output {
            if self.deliveries.send(delivery).is_err() {
                debug!("{}: Nobody receives deliveries", self.rbc);
            }
        }
    }

    fn report(&self, fault: Fault<N, FaultKind>) {
        if self.faults.send(fault).is_err() {
            trace!("{}: Nobody receives faults", self.rbc);
        }
    }
}

/// The application's side of an engine running on its own thread.
pub struct RbcHandle<N> {
    commands: Sender<Command<N>>,
    deliveries: Receiver<Delivery<N>>,
    faults: Receiver<Fault<N, FaultKind>>,
    thread: Option<JoinHandle<()>>,
}

impl<N: NodeIdT> RbcHandle<N> {
    /// Broadcasts `payload`, and waits until the engine has sent the `Broadcast` messages.
    pub fn broadcast(&self, payload: Vec<u8>) -> Result<()> {
        let (reply, reply_rx) = unbounded();
        self.request(Command::Broadcast(payload, reply), &reply_rx)
    }

    /// Enables or disables the engine.
    pub fn enable(&self, enable: bool) -> Result<()> {
        self.commands
            .send(Command::Enable(enable))
            .map_err(|_| Error::Stopped)
    }

    /// Installs a new cabinet, and waits until the engine has done so.
    pub fn reset_cabinet<I: IntoIterator<Item = N>>(&self, members: I) -> Result<()> {
        let (reply, reply_rx) = unbounded();
        let members = members.into_iter().collect();
        self.request(Command::ResetCabinet(members, reply), &reply_rx)
    }

    /// Returns the receiver of all delivered payloads.
    pub fn deliveries(&self) -> &Receiver<Delivery<N>> {
        &self.deliveries
    }

    /// Returns the receiver of the faults the engine detects.
    pub fn faults(&self) -> &Receiver<Fault<N, FaultKind>> {
        &self.faults
    }

    /// Stops the engine thread and waits for it to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }
}

impl<N> RbcHandle<N> {
    fn request(&self, cmd: Command<N>, reply: &Receiver<Result<()>>) -> Result<()> {
        self.commands.send(cmd).map_err(|_| Error::Stopped)?;
        reply.recv().map_err(|_| Error::Stopped)?
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("The broadcast engine thread panicked");
            }
        }
    }
}

impl<N> Drop for RbcHandle<N> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Subscribes to the engine's channel on `transport` and runs the engine on a new thread.
pub fn spawn<N, T>(rbc: Rbc<N>, transport: T) -> RbcHandle<N>
where
    N: NodeIdT + 'static,
    T: Transport<N> + 'static,
{
    let inbound = transport.subscribe(SERVICE_RBC, rbc.channel());
    let (commands, commands_rx) = unbounded();
    let (actor, deliveries, faults) = RbcActor::new(rbc, transport);
    let thread = thread::spawn(move || actor.run(inbound, commands_rx));
    RbcHandle {
        commands,
        deliveries,
        faults,
        thread: Some(thread),
    }
}

type Routes<N> = BTreeMap<(N, u16, u16), Sender<Packet<N>>>;

/// An in-process transport: every endpoint's subscriptions are crossbeam channels in a shared
/// routing table.
#[derive(Debug)]
pub struct LocalNetwork<N: Ord> {
    routes: Arc<Mutex<Routes<N>>>,
}

impl<N: Ord> Clone for LocalNetwork<N> {
    fn clone(&self) -> Self {
        LocalNetwork {
            routes: self.routes.clone(),
        }
    }
}

impl<N: Ord> Default for LocalNetwork<N> {
    fn default() -> Self {
        LocalNetwork {
            routes: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl<N: NodeIdT> LocalNetwork<N> {
    /// Creates a network without any endpoints.
    pub fn new() -> Self {
        LocalNetwork::default()
    }

    /// Returns the endpoint of the node `id`.
    pub fn endpoint(&self, id: N) -> LocalEndpoint<N> {
        LocalEndpoint {
            id,
            network: self.clone(),
        }
    }

    /// Removes all subscriptions of the node `id`: packets sent to it are dropped from now on.
    pub fn disconnect(&self, id: &N) {
        self.routes().retain(|(node, _, _), _| node != id);
    }

    fn routes(&self) -> MutexGuard<'_, Routes<N>> {
        match self.routes.lock() {
            Ok(routes) => routes,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One node's access to a `LocalNetwork`.
#[derive(Clone, Debug)]
pub struct LocalEndpoint<N: Ord> {
    id: N,
    network: LocalNetwork<N>,
}

impl<N: NodeIdT> Transport<N> for LocalEndpoint<N> {
    fn send(&self, peer: &N, service: u16, channel: u16, bytes: Vec<u8>) {
        let routes = self.network.routes();
        let key = (peer.clone(), service, channel);
        let packet = SourcedMessage {
            source: self.id.clone(),
            message: bytes,
        };
        let sent = routes.get(&key).map_or(false, |tx| tx.send(packet).is_ok());
        if !sent {
            trace!("{:?}: No subscriber {:?} for a packet", self.id, key);
        }
    }

    fn subscribe(&self, service: u16, channel: u16) -> Receiver<Packet<N>> {
        let (tx, rx) = unbounded();
        self.network
            .routes()
            .insert((self.id.clone(), service, channel), tx);
        rx
    }
}
