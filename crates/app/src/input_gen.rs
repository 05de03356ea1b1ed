//! Traffic generation for the simulator.
//!
//! Each source produces a seeded stream of logical packets covering every
//! packet kind, so every header codec sees traffic.
//!
//! # Mix
//!
//! - 40% application messages with a random payload (multi-frame packets)
//! - 30% CBR data
//! - 30% polling control (trigger, poll, probe) and bare MAC packets
//!
//! Field values stay inside the default codec widths, so with default widths
//! every generated packet survives a pack/unpack round trip.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uwal_core::packet::{
    ApplicationData, Body, CbrHeader, Packet, PollHeader, ProbeHeader, TriggerHeader,
};

/// Address of the sink every source sends to.
pub const SINK_ADDR: i32 = 0;

/// Generate `count` packets from MAC address `src`.
///
/// # Arguments
/// - `seed`: random seed for determinism
/// - `src`: MAC source address, also used to make uids unique per source
/// - `max_payload_bytes`: upper bound on application payload length
pub fn generate_packets(seed: u64, src: i32, count: usize, max_payload_bytes: usize) -> Vec<Packet> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ (src as u64).rotate_left(32));

    (0..count)
        .map(|i| {
            let sn = i as u32;
            let body = match rng.gen_range(0..10u8) {
                0..=3 => Body::Application(ApplicationData {
                    sn,
                    payload: random_payload(&mut rng, max_payload_bytes),
                    ..ApplicationData::default()
                }),
                4..=6 => Body::Cbr(CbrHeader {
                    sn,
                    ..CbrHeader::default()
                }),
                7 => Body::Trigger(TriggerHeader {
                    t_in: rng.gen_range(0..100),
                    t_fin: rng.gen_range(100..1000),
                    uid: rng.gen(),
                }),
                8 => match rng.gen_range(0..3u8) {
                    0 => Body::Poll(PollHeader {
                        id_polled: rng.gen_range(-1..100),
                        uid: rng.gen(),
                    }),
                    1 => Body::Probe(ProbeHeader {
                        backoff_time: rng.gen(),
                        ts: rng.gen(),
                        n_pkts: rng.gen_range(0..=255),
                        id_node: src as u32 & 0xFF,
                        uid: rng.gen(),
                    }),
                    _ => Body::Empty,
                },
                _ => Body::Empty,
            };

            let mut packet = Packet::new(body).with_mac(src, SINK_ADDR);
            packet.common.uid = rng.gen_range(0..i32::MAX);
            packet.common.size = rng.gen_range(0..=u16::MAX as i32);
            packet.common.error = false;
            packet
        })
        .collect()
}

fn random_payload(rng: &mut ChaCha8Rng, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(0..=max_len);
    (0..len).map(|_| rng.gen()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uwal_core::{CodecChain, CodecWidths, PacketCodec, PacketKind};

    #[test]
    fn test_generate_packets() {
        let packets = generate_packets(42, 3, 50, 100);
        assert_eq!(packets.len(), 50);
        assert!(packets.iter().all(|p| p.mac.src == 3 && p.mac.dst == SINK_ADDR));
    }

    #[test]
    fn test_determinism() {
        assert_eq!(generate_packets(12345, 1, 40, 64), generate_packets(12345, 1, 40, 64));
    }

    #[test]
    fn test_different_sources() {
        assert_ne!(generate_packets(1, 1, 20, 64), generate_packets(1, 2, 20, 64));
    }

    #[test]
    fn test_covers_every_kind() {
        let kinds: HashSet<PacketKind> = generate_packets(7, 1, 500, 32).iter().map(|p| p.kind()).collect();
        assert_eq!(kinds.len(), PacketKind::ALL.len());
    }

    #[test]
    fn test_payload_bound() {
        for packet in generate_packets(9, 4, 200, 17) {
            if let Body::Application(app) = &packet.body {
                assert!(app.payload.len() <= 17);
            }
        }
    }

    #[test]
    fn test_fits_default_widths() {
        let chain = CodecChain::standard(&CodecWidths::default()).unwrap();
        for packet in generate_packets(5, 2, 200, 120) {
            let bytes = chain.pack(&packet, 2240).unwrap();
            let back = chain.unpack(&bytes).unwrap();
            assert_eq!(chain.pack(&back, 2240).unwrap(), bytes);
        }
    }
}
