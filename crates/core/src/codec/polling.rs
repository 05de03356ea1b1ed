//! Polling MAC header codec.
//!
//! One wire family, three packet kinds. Each kind writes its own subset of
//! the schema in its own order:
//!
//! | kind    | fields                                        |
//! |---------|-----------------------------------------------|
//! | Trigger | t_in, t_fin, uid_trigger                      |
//! | Poll    | id_polled, uid_poll                           |
//! | Probe   | backoff_time, ts, n_pkts, id_node, uid_probe  |

use super::{check_storage, FieldPacker, FieldUnpacker, HeaderCodec};
use crate::bitio::{BitReader, BitWriter, FieldValue};
use crate::error::Result;
use crate::packet::{Body, Packet, PacketKind};
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};

const T_IN: usize = 0;
const T_FIN: usize = 1;
const UID_TRIGGER: usize = 2;
const ID_POLLED: usize = 3;
const UID_POLL: usize = 4;
const BACKOFF_TIME: usize = 5;
const TS: usize = 6;
const N_PKTS: usize = 7;
const ID_NODE: usize = 8;
const UID_PROBE: usize = 9;

const TRIGGER_FIELDS: &[usize] = &[T_IN, T_FIN, UID_TRIGGER];
const POLL_FIELDS: &[usize] = &[ID_POLLED, UID_POLL];
const PROBE_FIELDS: &[usize] = &[BACKOFF_TIME, TS, N_PKTS, ID_NODE, UID_PROBE];

const STORAGE: [usize; 10] = [
    <u16 as FieldValue>::BITS,
    <u16 as FieldValue>::BITS,
    <u32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <u32 as FieldValue>::BITS,
    <u16 as FieldValue>::BITS,
    <u16 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <u32 as FieldValue>::BITS,
    <u32 as FieldValue>::BITS,
];

/// Bit widths of the polling header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingWidths {
    pub t_in: usize,
    pub t_fin: usize,
    pub uid_trigger: usize,
    pub id_polled: usize,
    pub uid_poll: usize,
    pub backoff_time: usize,
    pub ts: usize,
    pub n_pkts: usize,
    pub id_node: usize,
    pub uid_probe: usize,
}

impl Default for PollingWidths {
    fn default() -> Self {
        Self {
            t_in: 16,
            t_fin: 16,
            uid_trigger: 32,
            id_polled: 8,
            uid_poll: 32,
            backoff_time: 16,
            ts: 16,
            n_pkts: 8,
            id_node: 8,
            uid_probe: 32,
        }
    }
}

/// Codec for the Trigger, Poll and Probe bodies.
#[derive(Debug, Clone)]
pub struct PollingCodec {
    widths: PollingWidths,
    schema: FieldSchema,
}

impl PollingCodec {
    pub const NAME: &'static str = "polling";

    pub fn new(widths: PollingWidths) -> Result<Self> {
        Ok(Self {
            schema: build_schema(&widths)?,
            widths,
        })
    }

    /// Recompute the schema for new widths.
    pub fn reinit(&mut self, widths: PollingWidths) -> Result<()> {
        self.schema = build_schema(&widths)?;
        self.widths = widths;
        Ok(())
    }

    pub fn widths(&self) -> &PollingWidths {
        &self.widths
    }

    /// Bits this codec writes for a packet of `kind`.
    pub fn bits_for(&self, kind: PacketKind) -> usize {
        let fields = match kind {
            PacketKind::Trigger => TRIGGER_FIELDS,
            PacketKind::Poll => POLL_FIELDS,
            PacketKind::Probe => PROBE_FIELDS,
            PacketKind::Generic | PacketKind::Cbr | PacketKind::Application => &[],
        };
        fields
            .iter()
            .filter_map(|&i| self.schema.get(i))
            .map(|f| f.bit_width)
            .sum()
    }
}

fn build_schema(w: &PollingWidths) -> Result<FieldSchema> {
    let schema = FieldSchema::new()
        .field("t_in", w.t_in)
        .field("t_fin", w.t_fin)
        .field("uid_trigger", w.uid_trigger)
        .signed_field("id_polled", w.id_polled)
        .field("uid_poll", w.uid_poll)
        .field("backoff_time", w.backoff_time)
        .field("ts", w.ts)
        .field("n_pkts", w.n_pkts)
        .field("id_node", w.id_node)
        .field("uid_probe", w.uid_probe);
    check_storage(PollingCodec::NAME, &schema, &STORAGE)?;
    Ok(schema)
}

impl HeaderCodec for PollingCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    fn pack(&self, packet: &Packet, writer: &mut BitWriter<'_>) -> Result<()> {
        let mut out = FieldPacker::new(Self::NAME, &self.schema, writer);

        match &packet.body {
            Body::Trigger(h) => {
                out.put(T_IN, h.t_in)?;
                out.put(T_FIN, h.t_fin)?;
                out.put(UID_TRIGGER, h.uid)?;
            }
            Body::Poll(h) => {
                out.put(ID_POLLED, h.id_polled)?;
                out.put(UID_POLL, h.uid)?;
            }
            Body::Probe(h) => {
                out.put(BACKOFF_TIME, h.backoff_time)?;
                out.put(TS, h.ts)?;
                out.put(N_PKTS, h.n_pkts)?;
                out.put(ID_NODE, h.id_node)?;
                out.put(UID_PROBE, h.uid)?;
            }
            Body::Empty | Body::Cbr(_) | Body::Application(_) => {}
        }
        Ok(())
    }

    fn unpack(&self, reader: &mut BitReader<'_>, packet: &mut Packet) -> Result<()> {
        let mut input = FieldUnpacker::new(Self::NAME, &self.schema, reader);

        match &mut packet.body {
            Body::Trigger(h) => {
                input.get(T_IN, &mut h.t_in)?;
                input.get(T_FIN, &mut h.t_fin)?;
                input.get(UID_TRIGGER, &mut h.uid)?;
            }
            Body::Poll(h) => {
                input.get(ID_POLLED, &mut h.id_polled)?;
                input.get(UID_POLL, &mut h.uid)?;
            }
            Body::Probe(h) => {
                input.get(BACKOFF_TIME, &mut h.backoff_time)?;
                input.get(TS, &mut h.ts)?;
                input.get(N_PKTS, &mut h.n_pkts)?;
                input.get(ID_NODE, &mut h.id_node)?;
                input.get(UID_PROBE, &mut h.uid)?;
            }
            Body::Empty | Body::Cbr(_) | Body::Application(_) => {}
        }
        Ok(())
    }
}
