//! uwal-core: Adaptation layer for acoustic underwater networks
//!
//! This library sits between a network stack and an acoustic modem whose
//! frames are a few tens of bytes long. It provides:
//! - Bit-packed header codecs whose field widths are configurable per field
//! - Fragmentation of packed packets into frames no larger than the modem PSDU
//! - Reassembly of out-of-order, duplicated and damaged frames
//! - A paced transmit queue with freeze/resume
//! - Optional packet error injection per sender
//!
//! # Architecture
//!
//! The system is designed around clear module boundaries:
//! - `bitio`: LSB-first bit get/put and signed-field restoration
//! - `schema`: Ordered field descriptors with per-field bit widths
//! - `packet`: Logical packet model (common, MAC and protocol headers)
//! - `codec`: Header codecs chained into a packet codec
//! - `frame`: Adaptation layer frame header encode/decode
//! - `fragment`: Splitting a packet into frames
//! - `reassembly`: Frame sets keyed by (src_id, pkt_id) with eviction
//! - `pacer`: Interframe timer in front of the transmit queue
//! - `layer`: The sans-IO adaptation layer tying it all together
//! - `network`: Link simulator with seeded randomness
//! - `metrics`: Observable layer behavior
//!
//! # Design Principles
//!
//! - **No panics**: All errors are structured and recoverable
//! - **Bounded memory**: Reassembly buffers never exceed the packet limit
//! - **Deterministic**: Seeded randomness and caller-supplied time make runs reproducible
//! - **Observable**: Counters for every frame and packet outcome

pub mod bitio;
pub mod codec;
pub mod config;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod layer;
pub mod metrics;
pub mod network;
pub mod pacer;
pub mod packet;
pub mod reassembly;
pub mod schema;

// Re-export commonly used types
pub use codec::{CodecChain, CodecWidths, PacketCodec, Passthrough};
pub use config::LayerConfig;
pub use error::{Error, Result};
pub use layer::{AdaptationLayer, Delivery, LayerAction};
pub use packet::{Body, Packet, PacketKind};
