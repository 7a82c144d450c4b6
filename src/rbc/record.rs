//! Per-tag broadcast state: the known payload, the requested digest and the vote counters.

use std::collections::BTreeMap;

use super::Tag;
use crate::hash::{hash, Digest};

/// The number of `Echo` and `Ready` messages received for one digest.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MessageCount {
    /// The number of distinct members that echoed the digest.
    pub echo: usize,
    /// The number of distinct members that are ready to deliver it.
    pub ready: usize,
}

/// The outcome of offering a payload to a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadUpdate {
    /// The record had no payload and now holds the offered one.
    Set,
    /// The record already holds exactly this payload.
    Unchanged,
    /// The record holds a different payload, which was kept.
    Conflict,
}

/// The state of a single broadcast instance.
#[derive(Clone, Debug, Default)]
pub struct BroadcastRecord {
    /// The payload we know for this tag, if any.
    known_payload: Option<Vec<u8>>,
    /// The digest a `Ready` quorum agreed on, once we had to request the payload.
    requested_hash: Option<Digest>,
    /// Vote counters, by digest.
    counts: BTreeMap<Digest, MessageCount>,
    /// Whether the payload has been delivered.
    delivered: bool,
}

impl BroadcastRecord {
    /// Sets the payload if none is known yet. A different payload is never overwritten.
    pub fn offer_payload(&mut self, payload: Vec<u8>) -> PayloadUpdate {
        match self.known_payload {
            None => {
                self.known_payload = Some(payload);
                PayloadUpdate::Set
            }
            Some(ref known) if *known == payload => PayloadUpdate::Unchanged,
            Some(_) => PayloadUpdate::Conflict,
        }
    }

    /// Returns the known payload.
    pub fn known_payload(&self) -> Option<&Vec<u8>> {
        self.known_payload.as_ref()
    }

    /// Returns `true` if the known payload hashes to `digest`.
    pub fn payload_matches(&self, digest: &Digest) -> bool {
        self.known_payload
            .as_ref()
            .map_or(false, |payload| hash(payload) == *digest)
    }

    /// Records that we requested the payload with `digest`, and forgets any payload we hold: it
    /// doesn't match the digest the quorum agreed on.
    pub fn request(&mut self, digest: Digest) {
        self.requested_hash = Some(digest);
        self.known_payload = None;
    }

    /// Returns the digest of a pending request, unless the payload has been recovered already.
    pub fn pending_request(&self) -> Option<&Digest> {
        match self.known_payload {
            None => self.requested_hash.as_ref(),
            Some(_) => None,
        }
    }

    /// Returns `true` if we requested exactly the payload with this digest.
    pub fn requested(&self, digest: &Digest) -> bool {
        self.requested_hash.as_ref() == Some(digest)
    }

    /// Increments the `Echo` counter for `digest` and returns the new counts.
    pub fn add_echo(&mut self, digest: &Digest) -> MessageCount {
        let count = self.counts.entry(*digest).or_default();
        count.echo += 1;
        *count
    }

    /// Increments the `Ready` counter for `digest` and returns the new counts.
    pub fn add_ready(&mut self, digest: &Digest) -> MessageCount {
        let count = self.counts.entry(*digest).or_default();
        count.ready += 1;
        *count
    }

    /// Returns the counts for `digest`.
    pub fn count(&self, digest: &Digest) -> MessageCount {
        self.counts.get(digest).cloned().unwrap_or_default()
    }

    /// Returns `true` if the payload has been delivered.
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Marks the payload as delivered.
    pub fn set_delivered(&mut self) {
        self.delivered = true;
    }
}

/// All broadcast records of the current cabinet, by tag.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    records: BTreeMap<Tag, BroadcastRecord>,
}

impl RecordStore {
    /// Returns the record for `tag`, if there is one.
    pub fn get(&self, tag: Tag) -> Option<&BroadcastRecord> {
        self.records.get(&tag)
    }

    /// Returns the record for `tag`, creating an empty one if necessary.
    pub fn entry(&mut self, tag: Tag) -> &mut BroadcastRecord {
        self.records.entry(tag).or_default()
    }

    /// Returns the number of tracked broadcast instances.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no broadcast instances are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forgets all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_payload_is_kept_out() {
        let mut record = BroadcastRecord::default();
        assert_eq!(record.offer_payload(b"A".to_vec()), PayloadUpdate::Set);
        assert_eq!(record.offer_payload(b"A".to_vec()), PayloadUpdate::Unchanged);
        assert_eq!(record.offer_payload(b"B".to_vec()), PayloadUpdate::Conflict);
        assert_eq!(record.known_payload(), Some(&b"A".to_vec()));
        assert!(record.payload_matches(&hash(b"A")));
        assert!(!record.payload_matches(&hash(b"B")));
    }

    #[test]
    fn test_counts_are_per_digest() {
        let mut record = BroadcastRecord::default();
        let (a, b) = (hash(b"A"), hash(b"B"));
        record.add_echo(&a);
        record.add_echo(&a);
        record.add_ready(&b);
        assert_eq!(record.count(&a), MessageCount { echo: 2, ready: 0 });
        assert_eq!(record.add_ready(&a), MessageCount { echo: 2, ready: 1 });
        assert_eq!(record.count(&b), MessageCount { echo: 0, ready: 1 });
    }

    #[test]
    fn test_request_clears_stale_payload() {
        let mut record = BroadcastRecord::default();
        record.offer_payload(b"wrong".to_vec());
        let digest = hash(b"right");
        record.request(digest);
        assert_eq!(record.known_payload(), None);
        assert_eq!(record.pending_request(), Some(&digest));
        assert_eq!(record.offer_payload(b"right".to_vec()), PayloadUpdate::Set);
        assert_eq!(record.pending_request(), None);
        assert!(record.requested(&digest));
    }
}
