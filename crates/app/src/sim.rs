//! Discrete-event simulation: sources, lossy links and one sink.
//!
//! Every source owns an [`AdaptationLayer`] and a one-way link to the sink.
//! The loop jumps virtual time straight to the next event (a submission, a
//! pacer expiry, a frame arrival or a frame set eviction), so a run that
//! spans hours of acoustic time finishes in milliseconds.

use crate::config::Config;
use crate::input_gen::generate_packets;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use uwal_core::metrics::LayerMetrics;
use uwal_core::network::{LinkSimulator, LinkStats};
use uwal_core::{AdaptationLayer, CodecChain, LayerAction, LayerConfig, Packet, PacketCodec, Result};

/// Node id of the sink.
pub const SINK_ID: u8 = 0;

/// Outcome of a simulation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimReport {
    /// Packets the sources tried to send
    pub packets_offered: u64,

    /// Packets a source refused (did not fit the configured widths or sizes)
    pub packets_refused: u64,

    /// Delivered without the error flag and identical to what was sent
    pub delivered_intact: u64,

    /// Delivered with the error flag set
    pub delivered_erroneous: u64,

    /// Delivered without the error flag but different from what was sent
    pub delivered_mismatched: u64,

    /// Accepted by a source but never delivered
    pub lost: u64,

    /// Virtual time from the first submission to the last event
    pub elapsed: Duration,

    /// All sources combined
    pub source_metrics: LayerMetrics,

    pub sink_metrics: LayerMetrics,

    /// All links combined
    pub link: LinkStats,
}

impl SimReport {
    /// Fraction of accepted packets delivered intact.
    pub fn intact_rate(&self) -> f64 {
        let accepted = self.packets_offered - self.packets_refused;
        if accepted == 0 {
            0.0
        } else {
            self.delivered_intact as f64 / accepted as f64
        }
    }
}

struct Source {
    layer: AdaptationLayer<CodecChain>,
    link: LinkSimulator<Vec<u8>>,
    backlog: VecDeque<Packet>,
    next_submit: Instant,
}

/// Run the simulation described by `config`.
///
/// # Errors
/// Configuration errors from building a node's layer or codec.
pub fn run(config: &Config) -> Result<SimReport> {
    let start = Instant::now();
    let interval = Duration::from_millis(config.traffic.submit_interval_ms);

    let mut sources = (1..=config.traffic.nodes)
        .map(|node_id| -> Result<Source> {
            let link_config = uwal_core::network::LinkConfig {
                seed: config.link.seed.wrapping_add(node_id as u64),
                ..config.link
            };
            Ok(Source {
                layer: AdaptationLayer::new(node_config(&config.layer, node_id), CodecChain::standard(&config.codec)?)?,
                link: LinkSimulator::new(link_config),
                backlog: generate_packets(
                    config.seed,
                    node_id as i32,
                    config.traffic.packets_per_node,
                    config.traffic.max_payload_bytes,
                )
                .into(),
                // Stagger sources so they do not submit in lockstep
                next_submit: start + interval * node_id as u32 / (config.traffic.nodes as u32 + 1),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sink = AdaptationLayer::new(node_config(&config.layer, SINK_ID), CodecChain::standard(&config.codec)?)?;

    tracing::info!(
        sources = sources.len(),
        packets_per_node = config.traffic.packets_per_node,
        "starting simulation"
    );

    let mut report = SimReport::default();
    let mut sent: HashMap<(u8, u32), Packet> = HashMap::new();
    let mut delivered: Vec<(u8, u32, Packet, bool)> = Vec::new();
    let mut now = start;

    loop {
        for source in &mut sources {
            // Submissions due
            while source.next_submit <= now {
                let Some(packet) = source.backlog.pop_front() else {
                    break;
                };
                report.packets_offered += 1;
                match source.layer.submit(&packet, now) {
                    Ok(pkt_id) => {
                        sent.insert((source.layer.node_id(), pkt_id), packet);
                    }
                    Err(_) => report.packets_refused += 1,
                }
                source.next_submit += interval;
            }

            // Pacer expiries
            if source.layer.next_deadline().is_some_and(|t| t <= now) {
                for action in source.layer.on_timer(now) {
                    if let LayerAction::Transmit(bytes) = action {
                        source.link.send(bytes, now);
                    }
                }
            }

            // Frame arrivals at the sink
            while let Some(arrival) = source.link.recv(now) {
                match sink.on_receive(&arrival.item, arrival.transport_error, now) {
                    Ok(actions) => {
                        for action in actions {
                            if let LayerAction::Deliver(d) = action {
                                delivered.push((d.src_id, d.pkt_id, d.packet, d.error));
                            }
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "sink dropped undecodable frame"),
                }
            }
        }

        if sink.next_deadline().is_some_and(|t| t <= now) {
            sink.on_timer(now);
        }

        let next = sources
            .iter()
            .flat_map(|s| {
                let submit = (!s.backlog.is_empty()).then_some(s.next_submit);
                [submit, s.layer.next_deadline(), s.link.next_delivery()]
            })
            .chain(std::iter::once(sink.next_deadline()))
            .flatten()
            .min();

        match next {
            Some(t) => now = now.max(t),
            None => break,
        }
    }

    report.elapsed = now.saturating_duration_since(start);

    let capacity = config.layer.max_packet_bytes;
    for (src_id, pkt_id, packet, error) in delivered {
        let Some(original) = sent.remove(&(src_id, pkt_id)) else {
            tracing::warn!(src_id, pkt_id, "delivery matches no submitted packet");
            report.delivered_mismatched += 1;
            continue;
        };

        if error {
            report.delivered_erroneous += 1;
        } else if sink.codec().pack(&packet, capacity)? == sink.codec().pack(&original, capacity)? {
            report.delivered_intact += 1;
        } else {
            tracing::warn!(src_id, pkt_id, "delivered packet differs from submitted packet");
            report.delivered_mismatched += 1;
        }
    }
    report.lost = sent.len() as u64;

    for source in &sources {
        report.source_metrics.merge(source.layer.metrics());
        report.link.merge(&source.link.stats());
    }
    report.sink_metrics = sink.metrics().clone();

    tracing::info!(
        intact = report.delivered_intact,
        erroneous = report.delivered_erroneous,
        lost = report.lost,
        elapsed_s = report.elapsed.as_secs(),
        "simulation finished"
    );

    Ok(report)
}

fn node_config(template: &LayerConfig, node_id: u8) -> LayerConfig {
    LayerConfig {
        node_id,
        ..template.clone()
    }
}

/// Print a human-readable summary of a run.
pub fn print_summary(report: &SimReport, print_metrics: bool) {
    println!("=== Results ===");
    println!("Packets offered:      {}", report.packets_offered);
    println!("Packets refused:      {}", report.packets_refused);
    println!("Delivered intact:     {}", report.delivered_intact);
    println!("Delivered erroneous:  {}", report.delivered_erroneous);
    println!("Delivered mismatched: {}", report.delivered_mismatched);
    println!("Lost:                 {}", report.lost);
    println!("Intact rate:          {:.2}%", report.intact_rate() * 100.0);
    println!("Virtual time:         {:.1} s", report.elapsed.as_secs_f64());
    println!();

    if !print_metrics {
        return;
    }

    println!("=== Link ===");
    println!("Frames sent:      {}", report.link.frames_sent);
    println!("Frames dropped:   {}", report.link.frames_dropped);
    println!("Frames corrupted: {}", report.link.frames_corrupted);
    println!("Loss rate:        {:.2}%", report.link.loss_rate() * 100.0);
    println!();
    println!("=== Sources ===");
    print!("{}", report.source_metrics.export_text());
    println!();
    println!("=== Sink ===");
    print!("{}", report.sink_metrics.export_text());
    println!();
}
