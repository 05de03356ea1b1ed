//! The adaptation layer: packets in, paced frames out, and back again.
//!
//! [`AdaptationLayer`] ties the pieces together for one node:
//!
//! ```text
//!  submit(packet) ─► PacketCodec::pack ─► Fragmenter ─► FrameCodec::encode ─► Pacer
//!                                                                               │
//!  on_timer(now) ◄──────────────────────────── Transmit(frame bytes) ◄──────────┘
//!
//!  on_receive(bytes) ─► FrameCodec::decode ─► ReassemblyStore ─► PacketCodec::unpack
//!                                                                      │
//!                                       Deliver(packet, error) ◄───────┘
//! ```
//!
//! # Sans-IO
//!
//! The layer never sleeps, reads a clock or touches a socket. Every
//! time-dependent call takes `now`; the layer answers with [`LayerAction`]s
//! for the caller to carry out and exposes [`AdaptationLayer::next_deadline`]
//! so the caller knows when to call [`AdaptationLayer::on_timer`] again.
//!
//! # Errors
//!
//! Configuration problems fail [`AdaptationLayer::new`]. A packet that cannot
//! be packed or fragmented fails its own `submit` and leaves the layer
//! untouched. Everything that goes wrong on the receive path after a frame has
//! been decoded (duplicates, stale sets, packets that fail to unpack) is
//! logged and counted instead of returned.

use crate::codec::PacketCodec;
use crate::config::{check_per, LayerConfig};
use crate::error::Result;
use crate::fragment::Fragmenter;
use crate::frame::FrameCodec;
use crate::metrics::{LayerMetrics, ReorderTracker};
use crate::pacer::Pacer;
use crate::reassembly::{CompletedFrameSet, FrameDisposition, FrameSetKey, ReassemblyStore};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

/// A packet handed up to the layer above.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<P> {
    pub src_id: u8,
    pub pkt_id: u32,
    pub packet: P,
    /// Set when any frame carried a transport error or the PER table fired
    pub error: bool,
}

/// Work the caller must carry out on the layer's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerAction<P> {
    /// Send these bytes down to the transport
    Transmit(Vec<u8>),
    /// Hand this packet up
    Deliver(Delivery<P>),
}

/// Fragmentation and reassembly for one node.
pub struct AdaptationLayer<C: PacketCodec> {
    config: LayerConfig,
    codec: C,
    frame_codec: FrameCodec,
    fragmenter: Fragmenter,
    store: ReassemblyStore,
    pacer: Pacer<Vec<u8>>,

    /// Id given to the next submitted packet
    next_pkt_id: u32,

    per_rng: ChaCha8Rng,
    metrics: LayerMetrics,
    reorder: ReorderTracker,
}

impl<C: PacketCodec> AdaptationLayer<C> {
    /// Create a layer.
    ///
    /// # Errors
    /// Any error from [`LayerConfig::validate`].
    pub fn new(config: LayerConfig, codec: C) -> Result<Self> {
        config.validate()?;

        let frame_codec = config.frame_codec()?;
        let header_bytes = frame_codec.header_bytes();
        let fragmenter = Fragmenter::new(config.max_frame_bytes, config.max_packet_bytes, config.frame_padding);
        let store = ReassemblyStore::new(
            fragmenter.frame_payload_capacity(header_bytes),
            fragmenter.reassembly_limit(header_bytes),
            config.frame_set_validity,
        );

        tracing::debug!(
            node_id = config.node_id,
            header_bits = frame_codec.header_bits(),
            max_frame_bytes = config.max_frame_bytes,
            "adaptation layer ready"
        );

        Ok(Self {
            pacer: Pacer::new(config.interframe_period),
            per_rng: ChaCha8Rng::seed_from_u64(config.per_seed),
            config,
            codec,
            frame_codec,
            fragmenter,
            store,
            next_pkt_id: 0,
            metrics: LayerMetrics::new(),
            reorder: ReorderTracker::new(),
        })
    }

    /// Pack, fragment and queue a packet for transmission.
    ///
    /// # Returns
    /// The `pkt_id` assigned to the packet.
    ///
    /// # Errors
    /// - Codec errors from packing (e.g. `CodecError::PayloadOverflow`)
    /// - `FragmentError` if the packed bytes cannot be split into frames
    ///
    /// Nothing is queued and no id is consumed when this fails.
    pub fn submit(&mut self, packet: &C::Packet, now: Instant) -> Result<u32> {
        match self.prepare(packet) {
            Ok((pkt_id, frames, payload_len)) => {
                let count = frames.len();
                for frame in frames {
                    self.pacer.enqueue(frame, now);
                }

                self.next_pkt_id = if pkt_id >= self.frame_codec.max_pkt_id() {
                    0
                } else {
                    pkt_id + 1
                };

                self.metrics.packets_submitted += 1;
                self.metrics.payload_bytes_submitted += payload_len as u64;
                self.metrics.frames_queued += count as u64;
                tracing::trace!(pkt_id, frames = count, bytes = payload_len, "queued packet");
                Ok(pkt_id)
            }
            Err(e) => {
                self.metrics.packets_refused += 1;
                tracing::warn!(error = %e, "refused packet");
                Err(e)
            }
        }
    }

    fn prepare(&self, packet: &C::Packet) -> Result<(u32, Vec<Vec<u8>>, usize)> {
        let header_bytes = self.frame_codec.header_bytes();
        let payload = self.codec.pack(packet, self.fragmenter.max_payload_bytes(header_bytes))?;

        let pkt_id = self.next_pkt_id;
        let frames = self
            .fragmenter
            .fragment(&self.frame_codec, self.config.node_id, pkt_id, &payload)?
            .iter()
            .map(|frame| self.frame_codec.encode(frame))
            .collect::<Result<Vec<_>>>()?;

        Ok((pkt_id, frames, payload.len()))
    }

    /// Advance timers.
    ///
    /// Releases at most one frame from the pacer, then evicts stale frame sets.
    pub fn on_timer(&mut self, now: Instant) -> Vec<LayerAction<C::Packet>> {
        let mut actions = Vec::new();

        if let Some(bytes) = self.pacer.on_expire(now) {
            self.metrics.frames_sent += 1;
            actions.push(LayerAction::Transmit(bytes));
        }

        for key in self.store.check_reassembly_store(now) {
            self.metrics.frame_sets_evicted += 1;
            self.reorder.clear(&key);
        }

        actions
    }

    /// Process one frame from the transport.
    ///
    /// # Errors
    /// - `FrameError::FrameTooShort` or a codec error if the frame header
    ///   cannot be decoded
    pub fn on_receive(
        &mut self,
        bytes: &[u8],
        transport_error: bool,
        now: Instant,
    ) -> Result<Vec<LayerAction<C::Packet>>> {
        self.metrics.frames_received += 1;

        let frame = match self.frame_codec.decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.frames_malformed += 1;
                return Err(e);
            }
        };

        if transport_error {
            self.metrics.frames_transport_error += 1;
        }

        let key = FrameSetKey::from(&frame.header);
        let disposition = self.store.on_frame_received(&frame, transport_error, now);

        // Only frames the store accepted count towards ordering
        if matches!(disposition, FrameDisposition::Stored | FrameDisposition::Completed(_))
            && self.reorder.track(key, frame.header.frag_offset)
        {
            self.metrics.frames_reordered += 1;
        }

        let mut actions = Vec::new();
        match disposition {
            FrameDisposition::Stored => {}
            FrameDisposition::Duplicate => self.metrics.frames_duplicate += 1,
            FrameDisposition::Rejected => self.metrics.frames_rejected += 1,
            FrameDisposition::Completed(set) => {
                self.reorder.clear(&key);
                self.metrics.packets_reassembled += 1;
                if let Some(delivery) = self.finish(set) {
                    actions.push(LayerAction::Deliver(delivery));
                }
            }
        }

        Ok(actions)
    }

    fn finish(&mut self, set: CompletedFrameSet) -> Option<Delivery<C::Packet>> {
        let CompletedFrameSet { key, bytes, mut error } = set;

        if let Some(&per) = self.config.per_table.get(&key.src_id) {
            let roll: f64 = self.per_rng.gen();
            if roll < per {
                error = true;
                self.metrics.packets_per_marked += 1;
                tracing::debug!(%key, per, "packet marked erroneous by PER table");
            }
        }

        match self.codec.unpack(&bytes) {
            Ok(packet) => {
                self.metrics.packets_delivered += 1;
                if error {
                    self.metrics.packets_delivered_erroneous += 1;
                }
                tracing::trace!(%key, bytes = bytes.len(), error, "delivering packet");
                Some(Delivery {
                    src_id: key.src_id,
                    pkt_id: key.pkt_id,
                    packet,
                    error,
                })
            }
            Err(e) => {
                self.metrics.packets_unpack_failed += 1;
                tracing::warn!(%key, error = %e, "dropping packet that failed to unpack");
                None
            }
        }
    }

    /// When `on_timer` next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.pacer.deadline(), self.store.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drop every queued frame.
    ///
    /// # Returns
    /// Number of frames dropped.
    pub fn shutdown(&mut self) -> usize {
        let dropped = self.pacer.force_cancel();
        self.metrics.frames_cancelled += dropped as u64;
        if dropped > 0 {
            tracing::debug!(node_id = self.config.node_id, dropped, "cancelled queued frames");
        }
        dropped
    }

    /// Pause transmission, keeping the time left until the next frame.
    pub fn freeze(&mut self, now: Instant) {
        self.pacer.freeze(now);
    }

    /// Resume transmission after [`freeze`](Self::freeze).
    pub fn resume(&mut self, now: Instant) {
        self.pacer.resume(now);
    }

    // === PER table ===

    /// Mark packets completed from `src_id` erroneous with probability `per`.
    ///
    /// # Errors
    /// - `Error::Config` if `per` is outside `[0, 1]`
    pub fn set_per(&mut self, src_id: u8, per: f64) -> Result<()> {
        check_per(src_id, per)?;
        self.config.per_table.insert(src_id, per);
        Ok(())
    }

    /// Remove the entry for `src_id`.
    pub fn clear_per(&mut self, src_id: u8) {
        self.config.per_table.remove(&src_id);
    }

    /// Remove every entry.
    pub fn reset_per(&mut self) {
        self.config.per_table.clear();
    }

    // === Accessors ===

    pub fn metrics(&self) -> &LayerMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn node_id(&self) -> u8 {
        self.config.node_id
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn frame_codec(&self) -> &FrameCodec {
        &self.frame_codec
    }

    /// Frames waiting in the pacer.
    pub fn pending_frames(&self) -> usize {
        self.pacer.len()
    }

    /// Packets partially reassembled.
    pub fn pending_frame_sets(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecChain, CodecWidths, Passthrough};
    use crate::error::{CodecError, Error, FragmentError};
    use crate::frame::{Frame, FrameHeader};
    use crate::packet::{ApplicationData, Body, Packet};
    use std::time::Duration;

    const PERIOD: Duration = Duration::from_millis(100);

    fn config(node_id: u8) -> LayerConfig {
        LayerConfig {
            interframe_period: PERIOD,
            frame_set_validity: Duration::from_secs(2),
            ..LayerConfig::for_node(node_id)
        }
    }

    fn passthrough(node_id: u8) -> AdaptationLayer<Passthrough> {
        AdaptationLayer::new(config(node_id), Passthrough).unwrap()
    }

    /// Drive the pacer until it is empty and collect the frames it sends.
    fn drain<C: PacketCodec>(layer: &mut AdaptationLayer<C>, now: &mut Instant) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while layer.pending_frames() > 0 {
            if let Some(deadline) = layer.next_deadline() {
                *now = (*now).max(deadline);
            }
            for action in layer.on_timer(*now) {
                if let LayerAction::Transmit(bytes) = action {
                    frames.push(bytes);
                }
            }
        }
        frames
    }

    fn deliveries<P>(actions: Vec<LayerAction<P>>) -> Vec<Delivery<P>> {
        actions
            .into_iter()
            .filter_map(|a| match a {
                LayerAction::Deliver(d) => Some(d),
                LayerAction::Transmit(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_submit_and_deliver() {
        let mut tx = passthrough(1);
        let mut rx = passthrough(2);
        let mut now = Instant::now();

        let data: Vec<u8> = (0..100).collect();
        assert_eq!(tx.submit(&data, now).unwrap(), 0);
        assert_eq!(tx.pending_frames(), 5);

        let frames = drain(&mut tx, &mut now);
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|f| f.len() <= 32));

        let mut delivered = Vec::new();
        for frame in &frames {
            delivered.extend(deliveries(rx.on_receive(frame, false, now).unwrap()));
        }

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].src_id, 1);
        assert_eq!(delivered[0].pkt_id, 0);
        assert_eq!(delivered[0].packet, data);
        assert!(!delivered[0].error);
        assert_eq!(rx.metrics().packets_delivered, 1);
        assert_eq!(tx.metrics().frames_sent, 5);
    }

    #[test]
    fn test_padded_packet_at_size_limit() {
        // 8-byte header, 24-byte frame capacity: a 50-byte packet ends in a
        // frame padded out to byte 72, past the 52-byte payload limit
        for (max_packet_bytes, len, padded_len) in [(60, 50, 72), (20, 5, 24)] {
            let config = LayerConfig {
                max_packet_bytes,
                frame_padding: true,
                ..config(1)
            };
            let mut tx = AdaptationLayer::new(config.clone(), Passthrough).unwrap();
            let mut rx = AdaptationLayer::new(LayerConfig { node_id: 2, ..config }, Passthrough).unwrap();
            let mut now = Instant::now();

            let data = vec![0xA5u8; len];
            tx.submit(&data, now).unwrap();

            let mut delivered = Vec::new();
            for frame in drain(&mut tx, &mut now) {
                assert_eq!(frame.len(), 32);
                delivered.extend(deliveries(rx.on_receive(&frame, false, now).unwrap()));
            }

            assert_eq!(delivered.len(), 1, "max_packet_bytes {}", max_packet_bytes);
            assert_eq!(delivered[0].packet.len(), padded_len);
            assert_eq!(&delivered[0].packet[..len], &data[..]);
            assert!(delivered[0].packet[len..].iter().all(|&b| b == 0));
            assert_eq!(rx.metrics().frames_rejected, 0);
        }
    }

    #[test]
    fn test_rejected_frame_leaves_no_tracking() {
        let mut rx = passthrough(2);
        let now = Instant::now();

        // Starts far beyond any packet the store can hold
        let header = FrameHeader {
            src_id: 5,
            pkt_id: 9,
            frag_offset: 1000,
            more_fragments: true,
        };
        let bytes = rx.frame_codec.encode(&Frame::new(header, vec![1; 10])).unwrap();

        assert!(rx.on_receive(&bytes, false, now).unwrap().is_empty());
        assert_eq!(rx.metrics().frames_rejected, 1);
        assert_eq!(rx.metrics().frames_reordered, 0);
        assert_eq!(rx.pending_frame_sets(), 0);
        assert!(rx.reorder.is_empty());
    }

    #[test]
    fn test_frames_are_paced() {
        let mut tx = passthrough(1);
        let t0 = Instant::now();
        tx.submit(&vec![7u8; 60], t0).unwrap();

        assert!(tx.on_timer(t0).is_empty());
        assert_eq!(tx.next_deadline(), Some(t0 + PERIOD));
        assert_eq!(tx.on_timer(t0 + PERIOD).len(), 1);
        assert!(tx.on_timer(t0 + PERIOD + Duration::from_millis(50)).is_empty());
        assert_eq!(tx.on_timer(t0 + PERIOD * 2).len(), 1);
    }

    #[test]
    fn test_pkt_ids_increment_and_wrap() {
        let mut cfg = config(1);
        cfg.header.pkt_id = 2;
        let mut tx = AdaptationLayer::new(cfg, Passthrough).unwrap();
        let now = Instant::now();

        let ids: Vec<u32> = (0..6).map(|_| tx.submit(&vec![1u8], now).unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_refused_packet_consumes_nothing() {
        let mut tx = passthrough(1);
        let now = Instant::now();

        let result = tx.submit(&vec![0u8; 4000], now);
        assert!(matches!(result, Err(Error::Codec(CodecError::PayloadOverflow { .. }))));
        assert_eq!(tx.pending_frames(), 0);
        assert_eq!(tx.metrics().packets_refused, 1);
        assert_eq!(tx.submit(&vec![1u8], now).unwrap(), 0);
    }

    #[test]
    fn test_too_many_fragments_refused() {
        let mut cfg = config(1);
        cfg.header.frag_offset = 2;
        let mut tx = AdaptationLayer::new(cfg, Passthrough).unwrap();

        // 43-bit header rounds up to 6 bytes: 26-byte frames, at most 4 of them
        assert!(tx.submit(&vec![0u8; 104], Instant::now()).is_ok());
        assert!(matches!(
            tx.submit(&vec![0u8; 105], Instant::now()),
            Err(Error::Fragment(FragmentError::TooManyFragments { needed: 5, max: 4 }))
        ));
    }

    #[test]
    fn test_transport_error_is_delivered() {
        let mut tx = passthrough(1);
        let mut rx = passthrough(2);
        let mut now = Instant::now();

        tx.submit(&vec![3u8; 40], now).unwrap();
        let frames = drain(&mut tx, &mut now);

        rx.on_receive(&frames[0], true, now).unwrap();
        let delivered = deliveries(rx.on_receive(&frames[1], false, now).unwrap());
        assert!(delivered[0].error);
        assert_eq!(rx.metrics().packets_delivered_erroneous, 1);
    }

    #[test]
    fn test_duplicates_counted() {
        let mut tx = passthrough(1);
        let mut rx = passthrough(2);
        let mut now = Instant::now();

        tx.submit(&vec![3u8; 40], now).unwrap();
        let frames = drain(&mut tx, &mut now);

        rx.on_receive(&frames[0], false, now).unwrap();
        assert!(rx.on_receive(&frames[0], true, now).unwrap().is_empty());
        let delivered = deliveries(rx.on_receive(&frames[1], false, now).unwrap());

        assert_eq!(rx.metrics().frames_duplicate, 1);
        assert!(!delivered[0].error);
    }

    #[test]
    fn test_stale_set_evicted_on_timer() {
        let mut tx = passthrough(1);
        let mut rx = passthrough(2);
        let mut now = Instant::now();

        tx.submit(&vec![3u8; 40], now).unwrap();
        let frames = drain(&mut tx, &mut now);
        rx.on_receive(&frames[0], false, now).unwrap();
        assert_eq!(rx.pending_frame_sets(), 1);

        let expiry = rx.next_deadline().unwrap();
        assert!(expiry > now + Duration::from_secs(2));
        rx.on_timer(expiry);
        assert_eq!(rx.pending_frame_sets(), 0);
        assert_eq!(rx.metrics().frame_sets_evicted, 1);

        // The surviving half alone no longer completes anything
        assert!(rx.on_receive(&frames[1], false, expiry).unwrap().is_empty());
    }

    #[test]
    fn test_per_table() {
        let mut tx = passthrough(1);
        let mut rx = passthrough(2);
        let mut now = Instant::now();

        rx.set_per(1, 1.0).unwrap();
        assert!(rx.set_per(1, -0.1).is_err());

        tx.submit(&vec![1u8; 4], now).unwrap();
        tx.submit(&vec![2u8; 4], now).unwrap();
        let frames = drain(&mut tx, &mut now);

        let first = deliveries(rx.on_receive(&frames[0], false, now).unwrap());
        assert!(first[0].error);
        assert_eq!(rx.metrics().packets_per_marked, 1);

        rx.clear_per(1);
        let second = deliveries(rx.on_receive(&frames[1], false, now).unwrap());
        assert!(!second[0].error);

        rx.set_per(9, 0.5).unwrap();
        rx.reset_per();
        assert!(rx.config().per_table.is_empty());
    }

    #[test]
    fn test_per_zero_never_marks() {
        let mut tx = passthrough(1);
        let mut rx = passthrough(2);
        let mut now = Instant::now();
        rx.set_per(1, 0.0).unwrap();

        for _ in 0..20 {
            tx.submit(&vec![5u8; 3], now).unwrap();
        }
        for frame in drain(&mut tx, &mut now) {
            for d in deliveries(rx.on_receive(&frame, false, now).unwrap()) {
                assert!(!d.error);
            }
        }
        assert_eq!(rx.metrics().packets_delivered, 20);
    }

    #[test]
    fn test_shutdown_cancels_queue() {
        let mut tx = passthrough(1);
        let now = Instant::now();
        tx.submit(&vec![0u8; 200], now).unwrap();

        let queued = tx.pending_frames();
        assert!(queued > 1);
        assert_eq!(tx.shutdown(), queued);
        assert_eq!(tx.next_deadline(), None);
        assert!(tx.on_timer(now + Duration::from_secs(5)).is_empty());
        assert_eq!(tx.metrics().frames_cancelled, queued as u64);
    }

    #[test]
    fn test_malformed_frame() {
        let mut rx = passthrough(2);
        assert!(rx.on_receive(&[1, 2, 3], false, Instant::now()).is_err());
        assert_eq!(rx.metrics().frames_malformed, 1);
    }

    #[test]
    fn test_unpack_failure_is_dropped() {
        let chain = || CodecChain::standard(&CodecWidths::default()).unwrap();
        let mut tx = passthrough(1);
        let mut rx = AdaptationLayer::new(config(2), chain()).unwrap();
        let mut now = Instant::now();

        // ptype 200 is not a packet kind
        tx.submit(&vec![200u8, 0, 0], now).unwrap();
        let frames = drain(&mut tx, &mut now);

        assert!(rx.on_receive(&frames[0], false, now).unwrap().is_empty());
        assert_eq!(rx.metrics().packets_reassembled, 1);
        assert_eq!(rx.metrics().packets_unpack_failed, 1);
    }

    #[test]
    fn test_codec_chain_round_trip() {
        let chain = || CodecChain::standard(&CodecWidths::default()).unwrap();
        let mut tx = AdaptationLayer::new(config(1), chain()).unwrap();
        let mut rx = AdaptationLayer::new(config(2), chain()).unwrap();
        let mut now = Instant::now();

        let packet = Packet::new(Body::Application(ApplicationData {
            sn: 12,
            payload: b"hydrophone batch 0042: 1.2 1.3 1.1 0.9 1.4 1.6 1.0".to_vec(),
            ..ApplicationData::default()
        }))
        .with_mac(1, 2);

        tx.submit(&packet, now).unwrap();
        let mut delivered = Vec::new();
        for frame in drain(&mut tx, &mut now) {
            delivered.extend(deliveries(rx.on_receive(&frame, false, now).unwrap()));
        }

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].packet, packet);
    }
}
