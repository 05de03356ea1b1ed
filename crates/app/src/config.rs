//! Configuration for the uwal-sim application.
//!
//! Handles parsing command-line arguments, an optional JSON scenario file,
//! and generating sensible defaults (including randomized link defaults that
//! are reproducible with a seed).
//!
//! # Precedence
//!
//! Built-in defaults, then the scenario file, then explicit flags. All
//! resolved values are printed with `--print-config` so runs are reproducible.

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uwal_core::network::LinkConfig;
use uwal_core::{CodecWidths, LayerConfig};

/// Command line of the simulator.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "uwal-sim",
    version,
    about = "Drive adaptation layer nodes over a simulated acoustic link"
)]
pub struct Args {
    /// JSON scenario file with layer, codec and link settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Random seed for determinism (default: time-based)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of source nodes sending to the sink
    #[arg(long)]
    pub nodes: Option<u8>,

    /// Packets each source submits
    #[arg(long)]
    pub packets: Option<usize>,

    /// Largest application payload in bytes
    #[arg(long)]
    pub max_payload: Option<usize>,

    /// Gap between two submissions of one source, in milliseconds
    #[arg(long)]
    pub submit_interval: Option<u64>,

    /// Modem PSDU size in bytes
    #[arg(long)]
    pub max_frame: Option<usize>,

    /// Minimum gap between transmitted frames, in milliseconds
    #[arg(long)]
    pub interframe: Option<u64>,

    /// Idle time before an incomplete packet is dropped, in milliseconds
    #[arg(long)]
    pub validity: Option<u64>,

    /// Zero-pad single and final frames to the PSDU size
    #[arg(long)]
    pub padding: bool,

    /// Base link latency in milliseconds (default: random 200-1500)
    #[arg(long)]
    pub latency: Option<u64>,

    /// Link jitter in milliseconds (default: random 0-300)
    #[arg(long)]
    pub jitter: Option<u64>,

    /// Frame loss rate 0.0-1.0 (default: random 0-0.05)
    #[arg(long)]
    pub loss: Option<f64>,

    /// Frame corruption rate 0.0-1.0 (default: random 0-0.05)
    #[arg(long)]
    pub corruption: Option<f64>,

    /// Disable frame loss and corruption
    #[arg(long)]
    pub perfect_link: bool,

    /// Packet error rate applied by the sink to every source
    #[arg(long)]
    pub per: Option<f64>,

    /// Print resolved configuration
    #[arg(long)]
    pub print_config: bool,

    /// Don't print metrics summary
    #[arg(long)]
    pub no_metrics: bool,
}

/// Settings a scenario file may provide. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub layer: LayerConfig,
    pub codec: CodecWidths,
    pub link: Option<LinkConfig>,
    pub traffic: Option<Traffic>,
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| format!("invalid scenario {}: {}", path.display(), e))
    }
}

/// What the sources send.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Traffic {
    pub nodes: u8,
    pub packets_per_node: usize,
    pub max_payload_bytes: usize,
    pub submit_interval_ms: u64,
}

impl Default for Traffic {
    fn default() -> Self {
        Self {
            nodes: 3,
            packets_per_node: 20,
            max_payload_bytes: 120,
            submit_interval_ms: 5_000,
        }
    }
}

/// Complete configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Seed every random choice derives from
    pub seed: u64,

    // === Traffic ===
    pub traffic: Traffic,

    // === Layer ===
    /// Template for every node; `node_id` is set per node
    pub layer: LayerConfig,

    /// Header codec widths shared by all nodes
    pub codec: CodecWidths,

    // === Link ===
    pub link: LinkConfig,

    // === Behavior ===
    pub print_config: bool,
    pub print_metrics: bool,
}

impl Config {
    /// Resolve the configuration from parsed arguments.
    ///
    /// If no seed is provided, a time-based one is used and printed.
    pub fn from_args(args: &Args) -> Result<Self, String> {
        let scenario = match &args.config {
            Some(path) => Scenario::load(path)?,
            None => Scenario::default(),
        };

        // Determine seed (explicit or time-based)
        let seed = args.seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        });

        // Generate defaults using seed
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let base = scenario.traffic.unwrap_or_default();
        let traffic = Traffic {
            nodes: args.nodes.unwrap_or(base.nodes),
            packets_per_node: args.packets.unwrap_or(base.packets_per_node),
            max_payload_bytes: args.max_payload.unwrap_or(base.max_payload_bytes),
            submit_interval_ms: args.submit_interval.unwrap_or(base.submit_interval_ms),
        };
        if traffic.nodes == 0 {
            return Err("--nodes must be at least 1".to_string());
        }

        let mut layer = scenario.layer;
        if let Some(max_frame) = args.max_frame {
            layer.max_frame_bytes = max_frame;
        }
        if let Some(ms) = args.interframe {
            layer.interframe_period = Duration::from_millis(ms);
        }
        if let Some(ms) = args.validity {
            layer.frame_set_validity = Duration::from_millis(ms);
        }
        if args.padding {
            layer.frame_padding = true;
        }
        if let Some(per) = args.per {
            for node in 1..=traffic.nodes {
                layer.per_table.insert(node, per);
            }
        }
        layer.per_seed = seed;

        let scenario_link = scenario.link.unwrap_or_else(|| LinkConfig {
            base_latency_ms: rng.gen_range(200..=1500),
            jitter_ms: rng.gen_range(0..=300),
            loss_rate: {
                // Bias toward small loss rates
                let r: f64 = rng.gen();
                (r * r * 0.05).min(0.05)
            },
            corruption_rate: {
                let r: f64 = rng.gen();
                (r * r * 0.05).min(0.05)
            },
            seed,
        });

        let mut link = LinkConfig {
            base_latency_ms: args.latency.unwrap_or(scenario_link.base_latency_ms),
            jitter_ms: args.jitter.unwrap_or(scenario_link.jitter_ms),
            loss_rate: args.loss.unwrap_or(scenario_link.loss_rate),
            corruption_rate: args.corruption.unwrap_or(scenario_link.corruption_rate),
            seed,
        };
        if args.perfect_link {
            link.loss_rate = 0.0;
            link.corruption_rate = 0.0;
        }
        for (name, rate) in [("loss", link.loss_rate), ("corruption", link.corruption_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("{} rate {} is outside [0, 1]", name, rate));
            }
        }

        Ok(Config {
            seed,
            traffic,
            layer,
            codec: scenario.codec,
            link,
            print_config: args.print_config,
            print_metrics: !args.no_metrics,
        })
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        println!("=== Configuration ===");
        println!("Seed: {}", self.seed);
        println!();
        println!("=== Traffic ===");
        println!("Sources: {} (node ids 1-{}), sink: node 0", self.traffic.nodes, self.traffic.nodes);
        println!("Packets per source: {}", self.traffic.packets_per_node);
        println!("Max payload: {} bytes", self.traffic.max_payload_bytes);
        println!("Submit interval: {} ms", self.traffic.submit_interval_ms);
        println!();
        println!("=== Adaptation Layer ===");
        println!("Max frame: {} bytes", self.layer.max_frame_bytes);
        println!("Max packet: {} bytes", self.layer.max_packet_bytes);
        println!("Padding: {}", self.layer.frame_padding);
        println!("Interframe period: {} ms", self.layer.interframe_period.as_millis());
        println!("Frame set validity: {} ms", self.layer.frame_set_validity.as_millis());
        println!(
            "Header widths: src_id={} pkt_id={} frag_offset={} M={} dummy={}",
            self.layer.header.src_id,
            self.layer.header.pkt_id,
            self.layer.header.frag_offset,
            self.layer.header.more_fragments,
            self.layer.header.dummy,
        );
        if !self.layer.per_table.is_empty() {
            println!("PER table: {:?}", self.layer.per_table);
        }
        println!();
        println!("=== Link Simulation ===");
        println!("Base latency: {} ms", self.link.base_latency_ms);
        println!("Jitter: ±{} ms", self.link.jitter_ms);
        println!("Loss rate: {:.2}%", self.link.loss_rate * 100.0);
        println!("Corruption rate: {:.2}%", self.link.corruption_rate * 100.0);
        println!();
    }
}
