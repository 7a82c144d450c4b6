//! Per-sender bookkeeping: duplicate suppression and per-origin delivery sequencing.

use std::collections::BTreeMap;

use super::{MessageKind, Tag};

/// The first counter an originator uses in a new cabinet, and so the first one we deliver.
pub const FIRST_COUNTER: u8 = 1;

/// What we know about one cabinet member, both as a sender and as an originator.
#[derive(Clone, Debug)]
pub struct PartyState {
    /// The message kinds already received from this member, by tag. One bit per kind.
    flags: BTreeMap<Tag, u8>,
    /// The counter of the next broadcast by this member that may be delivered.
    delivered_sequence: u8,
    /// Tags of this member's broadcasts that are ready, but wait for earlier counters.
    undelivered: BTreeMap<u8, Tag>,
}

impl Default for PartyState {
    fn default() -> Self {
        PartyState {
            flags: BTreeMap::new(),
            delivered_sequence: FIRST_COUNTER,
            undelivered: BTreeMap::new(),
        }
    }
}

impl PartyState {
    /// Marks `kind` as received for `tag`. Returns `false` if it had already been received.
    pub fn set_flag(&mut self, tag: Tag, kind: MessageKind) -> bool {
        let flags = self.flags.entry(tag).or_insert(0);
        if *flags & kind.flag() != 0 {
            return false;
        }
        *flags |= kind.flag();
        true
    }

    /// Returns `true` if `kind` has already been received for `tag`.
    pub fn has_flag(&self, tag: Tag, kind: MessageKind) -> bool {
        self.flags
            .get(&tag)
            .map_or(false, |flags| flags & kind.flag() != 0)
    }

    /// Returns the counter of the next broadcast that may be delivered.
    pub fn delivered_sequence(&self) -> u8 {
        self.delivered_sequence
    }

    /// Records one more delivery from this originator.
    pub fn advance(&mut self) {
        self.delivered_sequence = self.delivered_sequence.wrapping_add(1);
    }

    /// Buffers `tag` until its counter is next in line. The first tag for a counter is kept.
    pub fn defer(&mut self, tag: Tag) {
        self.undelivered.entry(tag.counter()).or_insert(tag);
    }

    /// Removes and returns the buffered tag whose counter is next in line, if any.
    pub fn take_next(&mut self) -> Option<Tag> {
        self.undelivered.remove(&self.delivered_sequence)
    }

    /// Returns the number of buffered, not yet deliverable tags.
    pub fn num_undelivered(&self) -> usize {
        self.undelivered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_suppress_duplicates_per_kind_and_tag() {
        let mut party = PartyState::default();
        let tag = Tag::new(1, 0, 1);
        assert!(party.set_flag(tag, MessageKind::Echo));
        assert!(!party.set_flag(tag, MessageKind::Echo));
        assert!(party.has_flag(tag, MessageKind::Echo));
        assert!(!party.has_flag(tag, MessageKind::Ready));
        assert!(party.set_flag(tag, MessageKind::Ready));
        assert!(party.set_flag(Tag::new(1, 0, 2), MessageKind::Echo));
    }

    #[test]
    fn test_deferred_tags_drain_in_order() {
        let mut party = PartyState::default();
        assert_eq!(party.delivered_sequence(), FIRST_COUNTER);
        party.defer(Tag::new(1, 3, 3));
        party.defer(Tag::new(1, 3, 2));
        party.defer(Tag::new(1, 3, 2));
        assert_eq!(party.num_undelivered(), 2);
        assert_eq!(party.take_next(), None);

        party.advance();
        assert_eq!(party.take_next(), Some(Tag::new(1, 3, 2)));
        party.advance();
        assert_eq!(party.take_next(), Some(Tag::new(1, 3, 3)));
        party.advance();
        assert_eq!(party.take_next(), None);
        assert_eq!(party.delivered_sequence(), 4);
    }
}
