//! Counters describing what an adaptation layer has done.
//!
//! This module provides observable insights into layer behavior:
//! - Packets submitted and delivered (intact or marked erroneous)
//! - Frame-level statistics (queued, sent, received, duplicate, reordered)
//! - Losses (evicted frame sets, unpack failures, cancelled frames)
//!
//! # Design
//!
//! Metrics are a plain struct updated by the layer at each step. Nothing here
//! reads a clock; rates are ratios of counters.
//!
//! # Thread Safety
//!
//! `LayerMetrics` is NOT thread-safe. Per-node metrics can be combined with
//! [`LayerMetrics::merge`].

use crate::reassembly::FrameSetKey;
use std::collections::HashMap;

/// Counters for one adaptation layer instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerMetrics {
    // === Outbound ===
    /// Packets accepted by `submit`
    pub packets_submitted: u64,

    /// Packets `submit` refused (codec or fragmentation error)
    pub packets_refused: u64,

    /// Packed packet bytes, before framing
    pub payload_bytes_submitted: u64,

    /// Frames placed in the pacer queue
    pub frames_queued: u64,

    /// Frames handed to the transport
    pub frames_sent: u64,

    /// Frames dropped by `shutdown`
    pub frames_cancelled: u64,

    // === Inbound ===
    /// Frames passed to `on_receive`
    pub frames_received: u64,

    /// Frames too malformed to decode
    pub frames_malformed: u64,

    /// Frames that overlapped bytes already received
    pub frames_duplicate: u64,

    /// Frames inconsistent with their packet
    pub frames_rejected: u64,

    /// Frames that arrived after a higher offset of the same packet
    pub frames_reordered: u64,

    /// Frames received with a transport error flag
    pub frames_transport_error: u64,

    // === Reassembly ===
    /// Packets fully reassembled
    pub packets_reassembled: u64,

    /// Reassembled packets the codec could not unpack
    pub packets_unpack_failed: u64,

    /// Incomplete packets dropped after the validity period
    pub frame_sets_evicted: u64,

    // === Delivery ===
    /// Packets delivered upward
    pub packets_delivered: u64,

    /// Delivered packets carrying the error flag
    pub packets_delivered_erroneous: u64,

    /// Delivered packets marked by the PER table
    pub packets_per_marked: u64,
}

impl LayerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of delivered packets carrying the error flag.
    pub fn error_rate(&self) -> f64 {
        ratio(self.packets_delivered_erroneous, self.packets_delivered)
    }

    /// Fraction of received frames that were duplicates.
    pub fn duplicate_rate(&self) -> f64 {
        ratio(self.frames_duplicate, self.frames_received)
    }

    /// Fraction of received frames that arrived out of order.
    pub fn reorder_rate(&self) -> f64 {
        ratio(self.frames_reordered, self.frames_received)
    }

    /// Frames sent per packet submitted.
    pub fn frames_per_packet(&self) -> f64 {
        ratio(self.frames_queued, self.packets_submitted)
    }

    /// Add another instance's counters to these.
    pub fn merge(&mut self, other: &LayerMetrics) {
        self.packets_submitted += other.packets_submitted;
        self.packets_refused += other.packets_refused;
        self.payload_bytes_submitted += other.payload_bytes_submitted;
        self.frames_queued += other.frames_queued;
        self.frames_sent += other.frames_sent;
        self.frames_cancelled += other.frames_cancelled;
        self.frames_received += other.frames_received;
        self.frames_malformed += other.frames_malformed;
        self.frames_duplicate += other.frames_duplicate;
        self.frames_rejected += other.frames_rejected;
        self.frames_reordered += other.frames_reordered;
        self.frames_transport_error += other.frames_transport_error;
        self.packets_reassembled += other.packets_reassembled;
        self.packets_unpack_failed += other.packets_unpack_failed;
        self.frame_sets_evicted += other.frame_sets_evicted;
        self.packets_delivered += other.packets_delivered;
        self.packets_delivered_erroneous += other.packets_delivered_erroneous;
        self.packets_per_marked += other.packets_per_marked;
    }

    /// Export metrics as a simple text format (for parsing/testing).
    pub fn export_text(&self) -> String {
        format!(
            "packets_submitted={}\n\
             payload_bytes_submitted={}\n\
             packets_refused={}\n\
             frames_queued={}\n\
             frames_sent={}\n\
             frames_cancelled={}\n\
             frames_received={}\n\
             frames_malformed={}\n\
             frames_transport_error={}\n\
             frames_duplicate={}\n\
             frames_rejected={}\n\
             frames_reordered={}\n\
             reorder_rate={:.4}\n\
             packets_reassembled={}\n\
             packets_unpack_failed={}\n\
             frame_sets_evicted={}\n\
             packets_delivered={}\n\
             packets_delivered_erroneous={}\n\
             packets_per_marked={}\n\
             error_rate={:.4}\n",
            self.packets_submitted,
            self.payload_bytes_submitted,
            self.packets_refused,
            self.frames_queued,
            self.frames_sent,
            self.frames_cancelled,
            self.frames_received,
            self.frames_malformed,
            self.frames_transport_error,
            self.frames_duplicate,
            self.frames_rejected,
            self.frames_reordered,
            self.reorder_rate(),
            self.packets_reassembled,
            self.packets_unpack_failed,
            self.frame_sets_evicted,
            self.packets_delivered,
            self.packets_delivered_erroneous,
            self.packets_per_marked,
            self.error_rate(),
        )
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Helper for tracking reordering.
///
/// Tracks the highest `frag_offset` seen for each packet to detect
/// out-of-order arrival.
#[derive(Debug, Default)]
pub struct ReorderTracker {
    highest: HashMap<FrameSetKey, u32>,
}

impl ReorderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame and return true if it arrived out of order.
    ///
    /// A frame is reordered if a higher offset of the same packet was
    /// already seen.
    pub fn track(&mut self, key: FrameSetKey, frag_offset: u32) -> bool {
        let highest = self.highest.entry(key).or_insert(0);
        let reordered = frag_offset < *highest;
        *highest = (*highest).max(frag_offset);
        reordered
    }

    /// Forget a packet (completed or evicted).
    pub fn clear(&mut self, key: &FrameSetKey) {
        self.highest.remove(key);
    }

    pub fn len(&self) -> usize {
        self.highest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highest.is_empty()
    }
}
