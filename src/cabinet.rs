//! Cabinet membership and the Byzantine threshold derived from it.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use failure::Fail;

use crate::{util, NodeIdT};

/// A cabinet could not be installed.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Fail)]
pub enum ConfigError {
    /// The member list was empty.
    #[fail(display = "Empty cabinet")]
    EmptyCabinet,
    /// Our own ID is not in the member list, so we can't determine our index.
    #[fail(display = "Our node is not a cabinet member")]
    NotAMember,
}

/// The ordered set of peers taking part in one epoch of the protocol, seen from one of them.
///
/// Members are sorted by ID, so every peer derives the same indices from the same set, no matter
/// in which order the members were listed.
#[derive(Debug, Clone)]
pub struct Cabinet<N> {
    /// This node's ID.
    our_id: N,
    /// This node's index in `ids`.
    our_index: usize,
    /// All member IDs, sorted.
    ids: Vec<N>,
    /// The position of each member in `ids`.
    indices: BTreeMap<N, usize>,
    /// The maximum number _t_ of faulty members.
    num_faulty: usize,
}

impl<N: NodeIdT> Cabinet<N> {
    /// Creates the cabinet `members`, as seen by `our_id`.
    pub fn new<I>(our_id: N, members: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: Borrow<N>,
    {
        let mut ids: Vec<N> = members.into_iter().map(|id| id.borrow().clone()).collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Err(ConfigError::EmptyCabinet);
        }
        let indices: BTreeMap<N, usize> = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        let our_index = *indices.get(&our_id).ok_or(ConfigError::NotAMember)?;
        let num_faulty = util::max_faulty(ids.len());
        debug_assert!(ids.len() > 3 * num_faulty);
        Ok(Cabinet {
            our_id,
            our_index,
            ids,
            indices,
            num_faulty,
        })
    }

    /// The ID of the node the engine runs on.
    #[inline]
    pub fn our_id(&self) -> &N {
        &self.our_id
    }

    /// Our own position in the cabinet.
    #[inline]
    pub fn our_index(&self) -> usize {
        self.our_index
    }

    /// Returns `true` if the given ID belongs to a cabinet member.
    #[inline]
    pub fn contains(&self, id: &N) -> bool {
        self.indices.contains_key(id)
    }

    /// Returns the member's index in the ordered list of all IDs.
    #[inline]
    pub fn index(&self, id: &N) -> Option<usize> {
        self.indices.get(id).cloned()
    }

    /// Returns the ID of the member at `index`.
    #[inline]
    pub fn id(&self, index: usize) -> Option<&N> {
        self.ids.get(index)
    }

    /// The total number _N_ of members.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.ids.len()
    }

    /// The maximum number _t_ of faulty, Byzantine members up to which the broadcast is
    /// guaranteed to be correct.
    #[inline]
    pub fn num_faulty(&self) -> usize {
        self.num_faulty
    }

    /// The minimum number _N - t_ of correct members, and the `Echo` quorum.
    #[inline]
    pub fn num_correct(&self) -> usize {
        // `num_faulty` is always less than a third of `num_nodes`.
        self.num_nodes() - self.num_faulty
    }

    /// IDs of all members, in cabinet order.
    #[inline]
    pub fn all_ids(&self) -> impl Iterator<Item = &N> + Clone {
        self.ids.iter()
    }

    /// IDs of all members except this one, in cabinet order.
    #[inline]
    pub fn other_ids(&self) -> impl Iterator<Item = &N> + Clone {
        let our_index = self.our_index;
        self.ids
            .iter()
            .enumerate()
            .filter(move |(idx, _)| *idx != our_index)
            .map(|(_, id)| id)
    }
}
