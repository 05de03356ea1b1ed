//! Frame reassembly with bounded memory.
//!
//! The store keeps one [`FrameSet`] per `(src_id, pkt_id)` key and copies each
//! frame's payload to `frag_offset * frame_payload_capacity` inside that set's
//! buffer. Frames may arrive in any order.
//!
//! # Design
//!
//! - **Byte bitmap**: every buffer byte has a received bit, so overlapping or
//!   repeated frames are caught no matter how they line up
//! - **Eager completion**: a set completes on the frame that fills its last
//!   missing byte and is removed at once
//! - **Caller-driven expiry**: [`ReassemblyStore::check_reassembly_store`] evicts
//!   sets that have not been updated for longer than the validity period
//! - **Sticky errors**: a transport error on any applied frame marks the
//!   whole packet
//!
//! # Memory Bounds
//!
//! Each set grows its buffer on demand up to `max_packet_bytes`:
//! ```text
//! in_flight_sets * max_packet_bytes * 2   (data plus one bitmap byte per byte)
//! ```
//!
//! # Thread Safety
//!
//! This structure is NOT thread-safe. It is owned by a single
//! [`AdaptationLayer`](crate::layer::AdaptationLayer).

use crate::frame::{Frame, FrameHeader};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Identifies the packet a frame belongs to. Ordered `src_id` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameSetKey {
    pub src_id: u8,
    pub pkt_id: u32,
}

impl FrameSetKey {
    pub fn new(src_id: u8, pkt_id: u32) -> Self {
        Self { src_id, pkt_id }
    }
}

impl From<&FrameHeader> for FrameSetKey {
    fn from(header: &FrameHeader) -> Self {
        Self::new(header.src_id, header.pkt_id)
    }
}

impl fmt::Display for FrameSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.src_id, self.pkt_id)
    }
}

/// Partial state of one packet being reassembled.
#[derive(Debug)]
pub struct FrameSet {
    /// Packet length, known once the final frame has been applied
    total_length: Option<usize>,

    /// One flag per buffer byte
    received: Vec<bool>,

    /// Bytes marked in `received`
    received_bytes: usize,

    /// Payload bytes at their packet offsets
    buffer: Vec<u8>,

    /// End of the furthest byte received so far
    high_water: usize,

    /// When a frame was last applied
    last_update: Instant,

    /// Any applied frame arrived with a transport error
    error: bool,
}

impl FrameSet {
    fn new(now: Instant) -> Self {
        Self {
            total_length: None,
            received: Vec::new(),
            received_bytes: 0,
            buffer: Vec::new(),
            high_water: 0,
            last_update: now,
            error: false,
        }
    }

    pub fn total_length(&self) -> Option<usize> {
        self.total_length
    }

    pub fn received_bytes(&self) -> usize {
        self.received_bytes
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Whether every byte up to the total length has arrived.
    pub fn is_complete(&self) -> bool {
        self.total_length == Some(self.received_bytes)
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        let end = end.min(self.received.len());
        start < end && self.received[start..end].iter().any(|&r| r)
    }

    /// Why a frame covering `start..end` cannot be applied, if it cannot.
    fn conflict(&self, start: usize, end: usize, last: bool) -> Option<&'static str> {
        if let Some(total) = self.total_length {
            if end > total {
                return Some("frame extends past packet end");
            }
            if last && end != total {
                return Some("conflicting packet length");
            }
        } else if last && end < self.high_water {
            return Some("final frame ends before data already received");
        }
        None
    }

    fn apply(&mut self, start: usize, data: &[u8], last: bool, transport_error: bool, now: Instant) {
        let end = start + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
            self.received.resize(end, false);
        }

        self.buffer[start..end].copy_from_slice(data);
        self.received[start..end].fill(true);
        self.received_bytes += data.len();
        self.high_water = self.high_water.max(end);
        self.last_update = now;

        if last && self.total_length.is_none() {
            self.total_length = Some(end);
        }
        self.error |= transport_error;
    }

    fn into_bytes(mut self) -> Vec<u8> {
        self.buffer.truncate(self.total_length.unwrap_or(self.received_bytes));
        self.buffer
    }
}

/// A packet whose every byte has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrameSet {
    pub key: FrameSetKey,
    pub bytes: Vec<u8>,
    /// A transport error was reported for at least one of its frames
    pub error: bool,
}

/// Outcome of feeding one frame to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Applied; the packet is still incomplete
    Stored,
    /// Overlaps bytes already received; nothing applied
    Duplicate,
    /// Inconsistent with the packet or the buffer; nothing applied
    Rejected,
    /// Applied, and the packet is now complete
    Completed(CompletedFrameSet),
}

/// Snapshot of store occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Packets currently being reassembled
    pub in_flight: usize,

    /// Payload bytes held across all sets
    pub buffered_bytes: usize,
}

/// Reassembles frames into packets, keyed by sender and packet id.
#[derive(Debug)]
pub struct ReassemblyStore {
    /// Payload bytes carried by every non-final frame
    frame_payload_capacity: usize,

    /// Buffer limit per set
    max_packet_bytes: usize,

    /// Idle time after which a set is evicted
    validity: Duration,

    sets: BTreeMap<FrameSetKey, FrameSet>,
}

impl ReassemblyStore {
    /// Create an empty store.
    ///
    /// # Arguments
    /// - `frame_payload_capacity`: payload bytes per full frame, which fixes
    ///   where frame `i` lands in the buffer
    /// - `max_packet_bytes`: largest packet a set may hold
    /// - `validity`: idle time before an incomplete set is dropped
    pub fn new(frame_payload_capacity: usize, max_packet_bytes: usize, validity: Duration) -> Self {
        Self {
            frame_payload_capacity,
            max_packet_bytes,
            validity,
            sets: BTreeMap::new(),
        }
    }

    /// Feed one frame.
    ///
    /// # Behavior
    ///
    /// - A frame overlapping bytes already received is a `Duplicate`.
    /// - A frame that would write past the buffer or past the known packet end
    ///   is `Rejected`. So is a final frame contradicting what is already known.
    /// - Otherwise the payload is applied and the set's timestamp refreshed.
    ///   `transport_error` marks the set only when the frame is applied.
    /// - Applying the last missing byte removes the set and returns it as
    ///   `Completed`.
    pub fn on_frame_received(&mut self, frame: &Frame, transport_error: bool, now: Instant) -> FrameDisposition {
        let key = FrameSetKey::from(&frame.header);
        let last = frame.is_last();

        let Some(start) = (frame.header.frag_offset as usize).checked_mul(self.frame_payload_capacity) else {
            tracing::warn!(%key, frag_offset = frame.header.frag_offset, "rejected frame: offset overflow");
            return FrameDisposition::Rejected;
        };
        let end = start.saturating_add(frame.payload.len());

        if let Some(set) = self.sets.get(&key) {
            if set.overlaps(start, end) {
                tracing::debug!(%key, frag_offset = frame.header.frag_offset, "duplicate frame");
                return FrameDisposition::Duplicate;
            }
        }

        if end > self.max_packet_bytes {
            tracing::warn!(%key, end, capacity = self.max_packet_bytes, "rejected frame: exceeds buffer");
            return FrameDisposition::Rejected;
        }

        if let Some(reason) = self.sets.get(&key).and_then(|set| set.conflict(start, end, last)) {
            tracing::warn!(%key, frag_offset = frame.header.frag_offset, reason, "rejected frame");
            return FrameDisposition::Rejected;
        }

        let set = self.sets.entry(key).or_insert_with(|| FrameSet::new(now));
        set.apply(start, &frame.payload, last, transport_error, now);
        tracing::trace!(
            %key,
            frag_offset = frame.header.frag_offset,
            received = set.received_bytes,
            total = ?set.total_length,
            "applied frame"
        );

        if !set.is_complete() {
            return FrameDisposition::Stored;
        }

        match self.sets.remove(&key) {
            Some(set) => {
                let error = set.error;
                FrameDisposition::Completed(CompletedFrameSet {
                    key,
                    bytes: set.into_bytes(),
                    error,
                })
            }
            None => FrameDisposition::Stored,
        }
    }

    /// Evict every set idle for longer than the validity period.
    ///
    /// # Returns
    /// Keys of the evicted sets, in key order.
    pub fn check_reassembly_store(&mut self, now: Instant) -> Vec<FrameSetKey> {
        let validity = self.validity;
        let expired: Vec<FrameSetKey> = self
            .sets
            .iter()
            .filter(|(_, set)| now.saturating_duration_since(set.last_update) > validity)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            if let Some(set) = self.sets.remove(key) {
                tracing::debug!(
                    %key,
                    received = set.received_bytes,
                    total = ?set.total_length,
                    "evicted stale frame set"
                );
            }
        }

        expired
    }

    /// Earliest instant at which a sweep would evict something.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.sets
            .values()
            .map(|set| set.last_update)
            .min()
            .map(|oldest| oldest + self.validity + Duration::from_nanos(1))
    }

    pub fn get(&self, key: &FrameSetKey) -> Option<&FrameSet> {
        self.sets.get(key)
    }

    pub fn contains(&self, key: &FrameSetKey) -> bool {
        self.sets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn stats(&self) -> ReassemblyStats {
        ReassemblyStats {
            in_flight: self.sets.len(),
            buffered_bytes: self.sets.values().map(|s| s.received_bytes).sum(),
        }
    }
}
