//! Logical packets: what upper layers hand to the adaptation layer.
//!
//! A packet is a stack of typed headers. The common and MAC headers are always
//! present; everything above them is a [`Body`] variant whose [`PacketKind`] is
//! the discriminator carried on the wire by the common header's `ptype` field.
//!
//! ```text
//! +-----------------+
//! | CommonHeader    |  ptype (from Body), size, uid, error, timestamps, hops
//! +-----------------+
//! | MacHeader       |  ftype, src, dst, hdr_type, txtime, sstime, padding
//! +-----------------+
//! | Body            |  Empty | Cbr | Application | Trigger | Poll | Probe
//! +-----------------+
//! ```
//!
//! Which attributes actually reach the wire, and with how many bits, is decided
//! by the codec configuration, not by this module.

use std::fmt;

/// Discriminator selecting the body layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketKind {
    /// No body above the MAC header
    Generic,
    /// Constant-bit-rate application data
    Cbr,
    /// Generic application message with a variable payload
    Application,
    /// Polling MAC: sink opens a contention window
    Trigger,
    /// Polling MAC: sink polls one node
    Poll,
    /// Polling MAC: node answers a trigger
    Probe,
}

impl PacketKind {
    /// All kinds, in wire-value order.
    pub const ALL: [PacketKind; 6] = [
        PacketKind::Generic,
        PacketKind::Cbr,
        PacketKind::Application,
        PacketKind::Trigger,
        PacketKind::Poll,
        PacketKind::Probe,
    ];

    /// Value written into the `ptype` field.
    pub fn wire_value(self) -> u32 {
        match self {
            PacketKind::Generic => 0,
            PacketKind::Cbr => 1,
            PacketKind::Application => 2,
            PacketKind::Trigger => 3,
            PacketKind::Poll => 4,
            PacketKind::Probe => 5,
        }
    }

    /// Kind for a `ptype` value read off the wire.
    pub fn from_wire(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_value() == value)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Generic => "generic",
            PacketKind::Cbr => "cbr",
            PacketKind::Application => "application",
            PacketKind::Trigger => "trigger",
            PacketKind::Poll => "poll",
            PacketKind::Probe => "probe",
        };
        f.write_str(name)
    }
}

/// Header shared by every packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommonHeader {
    /// Size in bytes as seen by the upper layer
    pub size: i32,
    /// Unique id
    pub uid: i32,
    /// Upper-layer error mark
    pub error: bool,
    /// Creation time, seconds
    pub timestamp: f64,
    /// -1 down, 0 none, 1 up
    pub direction: i8,
    pub prev_hop: i32,
    pub next_hop: i32,
    pub addr_type: i32,
    pub last_hop: i32,
    /// Transmission time, seconds
    pub txtime: f64,
}

/// MAC header.
///
/// Addresses are signed so that the broadcast address `-1` survives narrow
/// field widths through sign extension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacHeader {
    pub ftype: u8,
    pub src: i32,
    pub dst: i32,
    pub hdr_type: u16,
    pub txtime: f64,
    pub sstime: f64,
    pub padding: i32,
}

/// Body of a CBR data packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CbrHeader {
    /// Sequence number
    pub sn: u32,
    /// Round-trip time estimate, seconds
    pub rftt: f64,
    pub rftt_valid: bool,
}

/// Body of a generic application message.
///
/// The payload length is carried on the wire by a `payload_size` field, so the
/// payload can be of any size the configured width allows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplicationData {
    pub sn: u32,
    /// Round-trip time estimate, milliseconds
    pub rftt: i32,
    pub rftt_valid: bool,
    pub priority: u8,
    pub payload: Vec<u8>,
}

/// Polling trigger: bounds of the backoff window nodes may pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerHeader {
    pub t_in: u16,
    pub t_fin: u16,
    pub uid: u32,
}

/// Polling poll: names the node allowed to transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollHeader {
    pub id_polled: i32,
    pub uid: u32,
}

/// Polling probe: a node's answer to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeHeader {
    pub backoff_time: u16,
    /// Timestamp of the node's most recent data packet
    pub ts: u16,
    /// Packets the node wants to send
    pub n_pkts: i32,
    pub id_node: u32,
    pub uid: u32,
}

/// Packet body, one variant per [`PacketKind`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Cbr(CbrHeader),
    Application(ApplicationData),
    Trigger(TriggerHeader),
    Poll(PollHeader),
    Probe(ProbeHeader),
}

impl Body {
    /// Discriminator for this body.
    pub fn kind(&self) -> PacketKind {
        match self {
            Body::Empty => PacketKind::Generic,
            Body::Cbr(_) => PacketKind::Cbr,
            Body::Application(_) => PacketKind::Application,
            Body::Trigger(_) => PacketKind::Trigger,
            Body::Poll(_) => PacketKind::Poll,
            Body::Probe(_) => PacketKind::Probe,
        }
    }

    /// Zeroed body of the given kind, ready to be filled by a decoder.
    pub fn default_for(kind: PacketKind) -> Self {
        match kind {
            PacketKind::Generic => Body::Empty,
            PacketKind::Cbr => Body::Cbr(CbrHeader::default()),
            PacketKind::Application => Body::Application(ApplicationData::default()),
            PacketKind::Trigger => Body::Trigger(TriggerHeader::default()),
            PacketKind::Poll => Body::Poll(PollHeader::default()),
            PacketKind::Probe => Body::Probe(ProbeHeader::default()),
        }
    }
}

/// A logical packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    pub common: CommonHeader,
    pub mac: MacHeader,
    pub body: Body,
}

impl Packet {
    /// Packet with default headers and the given body.
    pub fn new(body: Body) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Set MAC source and destination.
    pub fn with_mac(mut self, src: i32, dst: i32) -> Self {
        self.mac.src = src;
        self.mac.dst = dst;
        self
    }

    /// Discriminator of the body.
    pub fn kind(&self) -> PacketKind {
        self.body.kind()
    }
}
