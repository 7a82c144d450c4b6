use std::borrow::Borrow;

use super::record::RecordStore;
use super::{Rbc, CHANNEL_RBC_BROADCAST};
use crate::cabinet::ConfigError;
use crate::NodeIdT;

/// A reliable broadcast builder, to configure the parameters and create new instances of `Rbc`.
pub struct RbcBuilder<N> {
    /// This node's ID.
    our_id: N,
    /// The channel the instance runs on.
    channel: u16,
    /// Whether each origin's broadcasts are delivered in counter order.
    ordered_delivery: bool,
    /// Whether the instance starts enabled.
    enabled: bool,
    /// The initial cabinet, if any.
    cabinet: Option<Vec<N>>,
}

impl<N: NodeIdT> RbcBuilder<N> {
    /// Returns a new `RbcBuilder` for the node `our_id`, with ordered delivery on the default
    /// channel, enabled and without a cabinet.
    pub fn new(our_id: N) -> Self {
        RbcBuilder {
            our_id,
            channel: CHANNEL_RBC_BROADCAST,
            ordered_delivery: true,
            enabled: true,
            cabinet: None,
        }
    }

    /// Sets the channel. Messages for other channels are rejected.
    pub fn channel(&mut self, channel: u16) -> &mut Self {
        self.channel = channel;
        self
    }

    /// Sets whether each origin's broadcasts are delivered strictly in counter order.
    ///
    /// If disabled, payloads are delivered as soon as they are ready, with no per-origin FIFO
    /// guarantee.
    pub fn ordered_delivery(&mut self, ordered_delivery: bool) -> &mut Self {
        self.ordered_delivery = ordered_delivery;
        self
    }

    /// Sets whether the instance starts enabled.
    pub fn enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }

    /// Sets the initial cabinet.
    pub fn cabinet<I>(&mut self, members: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Borrow<N>,
    {
        self.cabinet = Some(members.into_iter().map(|id| id.borrow().clone()).collect());
        self
    }

    /// Creates a new `Rbc` instance. Fails if a cabinet was given that is empty or doesn't
    /// contain our ID.
    pub fn build(&self) -> Result<Rbc<N>, ConfigError> {
        let mut rbc = Rbc {
            our_id: self.our_id.clone(),
            channel: self.channel,
            ordered_delivery: self.ordered_delivery,
            enabled: self.enabled,
            cabinet: None,
            msg_counter: 0,
            parties: Vec::new(),
            records: RecordStore::default(),
        };
        if let Some(ref members) = self.cabinet {
            rbc.reset_cabinet(members)?;
        }
        Ok(rbc)
    }
}
