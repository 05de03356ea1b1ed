//! Link simulator with latency, jitter, loss and corruption.
//!
//! This module simulates an unreliable link in a deterministic way using
//! seeded randomness and caller-supplied time. All link effects are
//! reproducible given the same seed and the same sequence of calls.
//!
//! # Simulated Effects
//!
//! - **Latency**: Base delay for all frames
//! - **Jitter**: Random variation in latency (uniform ±jitter), which reorders
//!   frames sent close together
//! - **Loss**: Random frame drops (Bernoulli)
//! - **Corruption**: Frames that arrive with the transport error flag set
//!
//! # Implementation
//!
//! Uses a priority queue (min-heap) keyed by delivery time, with a send
//! sequence number breaking ties so equal times come out in send order.
//! Nothing here reads a clock: `send` and `recv` take `now`, which lets tests
//! and simulations run on virtual time.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Configuration for link simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Base latency in milliseconds
    pub base_latency_ms: u64,

    /// Jitter range in milliseconds (uniform ±jitter)
    pub jitter_ms: u64,

    /// Frame loss probability [0.0, 1.0]
    pub loss_rate: f64,

    /// Probability [0.0, 1.0] that a delivered frame carries a transport error
    pub corruption_rate: f64,

    /// Random seed for determinism
    pub seed: u64,
}

impl LinkConfig {
    /// Create a configuration with no impairments (perfect link).
    pub fn perfect(seed: u64) -> Self {
        Self {
            base_latency_ms: 0,
            jitter_ms: 0,
            loss_rate: 0.0,
            corruption_rate: 0.0,
            seed,
        }
    }

    /// Create a configuration with moderate impairments.
    pub fn default_with_seed(seed: u64) -> Self {
        Self {
            base_latency_ms: 200,
            jitter_ms: 150,
            loss_rate: 0.01,
            corruption_rate: 0.01,
            seed,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::default_with_seed(0)
    }
}

/// A frame as it comes off the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival<T> {
    pub item: T,
    /// The link damaged this frame
    pub transport_error: bool,
}

/// A frame with scheduled delivery time.
#[derive(Debug)]
struct Scheduled<T> {
    delivery_time: Instant,
    seq: u64,
    arrival: Arrival<T>,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.delivery_time == other.delivery_time && self.seq == other.seq
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earlier time, then earlier send, first)
        other
            .delivery_time
            .cmp(&self.delivery_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One-way lossy link.
///
/// # Thread Safety
/// Not thread-safe; use one instance per link or synchronize externally.
#[derive(Debug)]
pub struct LinkSimulator<T> {
    config: LinkConfig,
    rng: ChaCha8Rng,
    queue: BinaryHeap<Scheduled<T>>,
    next_seq: u64,

    // Statistics
    frames_sent: u64,
    frames_dropped: u64,
    frames_corrupted: u64,
    frames_delivered: u64,
}

impl<T> LinkSimulator<T> {
    /// Create a new link simulator with the given configuration.
    pub fn new(config: LinkConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            queue: BinaryHeap::new(),
            next_seq: 0,
            frames_sent: 0,
            frames_dropped: 0,
            frames_corrupted: 0,
            frames_delivered: 0,
        }
    }

    /// Put a frame on the link at `now`.
    ///
    /// The frame may be dropped, delayed by latency and jitter, or marked
    /// with a transport error.
    pub fn send(&mut self, item: T, now: Instant) {
        self.frames_sent += 1;

        if self.roll(self.config.loss_rate) {
            self.frames_dropped += 1;
            tracing::trace!(seq = self.next_seq, "link dropped frame");
            self.next_seq += 1;
            return;
        }

        let transport_error = self.roll(self.config.corruption_rate);
        if transport_error {
            self.frames_corrupted += 1;
        }

        let delivery_time = now + Duration::from_millis(self.compute_delay());
        self.queue.push(Scheduled {
            delivery_time,
            seq: self.next_seq,
            arrival: Arrival { item, transport_error },
        });
        self.next_seq += 1;
    }

    /// Take the next frame whose delivery time is at or before `now`.
    pub fn recv(&mut self, now: Instant) -> Option<Arrival<T>> {
        if self.queue.peek()?.delivery_time > now {
            return None;
        }
        let scheduled = self.queue.pop()?;
        self.frames_delivered += 1;
        Some(scheduled.arrival)
    }

    /// Delivery time of the next frame in flight.
    pub fn next_delivery(&self) -> Option<Instant> {
        self.queue.peek().map(|s| s.delivery_time)
    }

    /// Check if any frames are currently in flight.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Get count of frames currently in flight.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Get statistics about link behavior.
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped,
            frames_corrupted: self.frames_corrupted,
            frames_delivered: self.frames_delivered,
            frames_in_flight: self.queue.len(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen::<f64>() < probability
    }

    /// Delay = base_latency ± jitter, in milliseconds.
    fn compute_delay(&mut self) -> u64 {
        let base = self.config.base_latency_ms;

        if self.config.jitter_ms == 0 {
            return base;
        }

        let jitter_range = self.config.jitter_ms * 2;
        let jitter = self.rng.gen_range(0..=jitter_range);
        let jitter_offset = jitter as i64 - self.config.jitter_ms as i64;

        (base as i64 + jitter_offset).max(0) as u64
    }
}

/// Statistics about link simulator behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    /// Total frames put on the link
    pub frames_sent: u64,

    /// Frames dropped due to loss
    pub frames_dropped: u64,

    /// Frames scheduled with a transport error
    pub frames_corrupted: u64,

    /// Frames handed out by `recv`
    pub frames_delivered: u64,

    /// Frames currently in flight
    pub frames_in_flight: usize,
}

impl LinkStats {
    /// Compute frame loss rate.
    pub fn loss_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            self.frames_dropped as f64 / self.frames_sent as f64
        }
    }

    /// Compute delivery rate (delivered / sent).
    pub fn delivery_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            self.frames_delivered as f64 / self.frames_sent as f64
        }
    }

    /// Add another link's counters to these.
    pub fn merge(&mut self, other: &LinkStats) {
        self.frames_sent += other.frames_sent;
        self.frames_dropped += other.frames_dropped;
        self.frames_corrupted += other.frames_corrupted;
        self.frames_delivered += other.frames_delivered;
        self.frames_in_flight += other.frames_in_flight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn drain_all(sim: &mut LinkSimulator<u32>) -> Vec<Arrival<u32>> {
        let mut out = Vec::new();
        while let Some(at) = sim.next_delivery() {
            while let Some(arrival) = sim.recv(at) {
                out.push(arrival);
            }
        }
        out
    }

    #[test]
    fn test_perfect_link() {
        let mut sim = LinkSimulator::new(LinkConfig::perfect(42));
        let now = Instant::now();

        sim.send(7u32, now);
        let arrival = sim.recv(now).unwrap();
        assert_eq!(arrival.item, 7);
        assert!(!arrival.transport_error);

        let stats = sim.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.frames_delivered, 1);
    }

    #[test]
    fn test_latency() {
        let config = LinkConfig {
            base_latency_ms: 50,
            ..LinkConfig::perfect(42)
        };
        let mut sim = LinkSimulator::new(config);
        let t0 = Instant::now();

        sim.send(0u32, t0);
        assert!(sim.recv(t0).is_none());
        assert!(sim.recv(t0 + ms(49)).is_none());
        assert_eq!(sim.next_delivery(), Some(t0 + ms(50)));
        assert_eq!(sim.recv(t0 + ms(50)).unwrap().item, 0);
    }

    #[test]
    fn test_equal_times_keep_send_order() {
        let mut sim = LinkSimulator::new(LinkConfig {
            base_latency_ms: 10,
            ..LinkConfig::perfect(1)
        });
        let t0 = Instant::now();
        for i in 0..50u32 {
            sim.send(i, t0);
        }

        let items: Vec<u32> = drain_all(&mut sim).into_iter().map(|a| a.item).collect();
        assert_eq!(items, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_frame_loss() {
        let config = LinkConfig {
            loss_rate: 0.5,
            ..LinkConfig::perfect(42)
        };
        let mut sim = LinkSimulator::new(config);
        let now = Instant::now();

        for i in 0..100u32 {
            sim.send(i, now);
        }

        let stats = sim.stats();
        assert_eq!(stats.frames_sent, 100);
        // Allow 30-70% range due to randomness
        assert!(stats.frames_dropped >= 30 && stats.frames_dropped <= 70);
        assert_eq!(stats.frames_in_flight as u64, 100 - stats.frames_dropped);
    }

    #[test]
    fn test_corruption_flag() {
        let config = LinkConfig {
            corruption_rate: 1.0,
            ..LinkConfig::perfect(3)
        };
        let mut sim = LinkSimulator::new(config);
        let now = Instant::now();
        sim.send(1u32, now);

        assert!(sim.recv(now).unwrap().transport_error);
        assert_eq!(sim.stats().frames_corrupted, 1);
    }

    #[test]
    fn test_determinism() {
        let config = LinkConfig::default_with_seed(12345);
        let mut a = LinkSimulator::new(config);
        let mut b = LinkSimulator::new(config);
        let t0 = Instant::now();

        for i in 0..40u32 {
            a.send(i, t0 + ms(i as u64 * 5));
            b.send(i, t0 + ms(i as u64 * 5));
        }

        assert_eq!(drain_all(&mut a), drain_all(&mut b));
        assert_eq!(a.stats(), b.stats());
    }

    #[test]
    fn test_jitter_reorders() {
        let config = LinkConfig {
            base_latency_ms: 20,
            jitter_ms: 15,
            ..LinkConfig::perfect(99)
        };
        let mut sim = LinkSimulator::new(config);
        let t0 = Instant::now();

        for i in 0..10u32 {
            sim.send(i, t0 + ms(i as u64));
        }

        let received: Vec<u32> = drain_all(&mut sim).into_iter().map(|a| a.item).collect();
        assert_eq!(received.len(), 10);
        assert!(
            received.windows(2).any(|w| w[1] < w[0]),
            "expected some reordering with large jitter: {:?}",
            received
        );
    }

    #[test]
    fn test_stats_rates() {
        let stats = LinkStats {
            frames_sent: 200,
            frames_dropped: 50,
            frames_delivered: 150,
            ..LinkStats::default()
        };
        assert_eq!(stats.loss_rate(), 0.25);
        assert_eq!(stats.delivery_rate(), 0.75);
    }
}
