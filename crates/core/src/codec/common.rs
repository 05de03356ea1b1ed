//! Common header codec.
//!
//! Carries the packet-kind discriminator (`ptype`) and the bookkeeping fields
//! every packet has. Must be the first codec of a chain: its unpack installs
//! the body variant that later codecs fill.

use super::{check_storage, FieldPacker, FieldUnpacker, HeaderCodec};
use crate::bitio::{BitReader, BitWriter, FieldValue};
use crate::error::{CodecError, Result};
use crate::packet::{Body, Packet, PacketKind};
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};

const PTYPE: usize = 0;
const SIZE: usize = 1;
const UID: usize = 2;
const ERROR: usize = 3;
const TIMESTAMP: usize = 4;
const DIRECTION: usize = 5;
const PREV_HOP: usize = 6;
const NEXT_HOP: usize = 7;
const ADDR_TYPE: usize = 8;
const LAST_HOP: usize = 9;
const TXTIME: usize = 10;

const STORAGE: [usize; 11] = [
    <u32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <bool as FieldValue>::BITS,
    <f64 as FieldValue>::BITS,
    <i8 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <f64 as FieldValue>::BITS,
];

/// Bit widths of the common header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonWidths {
    pub ptype: usize,
    pub size: usize,
    pub uid: usize,
    pub error: usize,
    pub timestamp: usize,
    pub direction: usize,
    pub prev_hop: usize,
    pub next_hop: usize,
    pub addr_type: usize,
    pub last_hop: usize,
    pub txtime: usize,
}

impl Default for CommonWidths {
    fn default() -> Self {
        Self {
            ptype: 8,
            size: 16,
            uid: 32,
            error: 1,
            timestamp: 0,
            direction: 0,
            prev_hop: 0,
            next_hop: 0,
            addr_type: 0,
            last_hop: 0,
            txtime: 0,
        }
    }
}

/// Codec for [`CommonHeader`](crate::packet::CommonHeader) plus `ptype`.
#[derive(Debug, Clone)]
pub struct CommonCodec {
    widths: CommonWidths,
    schema: FieldSchema,
}

impl CommonCodec {
    pub const NAME: &'static str = "common";

    pub fn new(widths: CommonWidths) -> Result<Self> {
        Ok(Self {
            schema: build_schema(&widths)?,
            widths,
        })
    }

    /// Recompute the schema for new widths.
    pub fn reinit(&mut self, widths: CommonWidths) -> Result<()> {
        self.schema = build_schema(&widths)?;
        self.widths = widths;
        Ok(())
    }

    pub fn widths(&self) -> &CommonWidths {
        &self.widths
    }
}

fn build_schema(w: &CommonWidths) -> Result<FieldSchema> {
    let schema = FieldSchema::new()
        .field("ptype", w.ptype)
        .field("size", w.size)
        .field("uid", w.uid)
        .field("error", w.error)
        .field("timestamp", w.timestamp)
        .signed_field("direction", w.direction)
        .signed_field("prev_hop", w.prev_hop)
        .signed_field("next_hop", w.next_hop)
        .field("addr_type", w.addr_type)
        .signed_field("last_hop", w.last_hop)
        .field("txtime", w.txtime);
    check_storage(CommonCodec::NAME, &schema, &STORAGE)?;
    Ok(schema)
}

impl HeaderCodec for CommonCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    fn pack(&self, packet: &Packet, writer: &mut BitWriter<'_>) -> Result<()> {
        let h = &packet.common;
        let mut out = FieldPacker::new(Self::NAME, &self.schema, writer);

        out.put(PTYPE, packet.kind().wire_value())?;
        out.put(SIZE, h.size)?;
        out.put(UID, h.uid)?;
        out.put(ERROR, h.error)?;
        out.put(TIMESTAMP, h.timestamp)?;
        out.put(DIRECTION, h.direction)?;
        out.put(PREV_HOP, h.prev_hop)?;
        out.put(NEXT_HOP, h.next_hop)?;
        out.put(ADDR_TYPE, h.addr_type)?;
        out.put(LAST_HOP, h.last_hop)?;
        out.put(TXTIME, h.txtime)?;
        Ok(())
    }

    fn unpack(&self, reader: &mut BitReader<'_>, packet: &mut Packet) -> Result<()> {
        let mut input = FieldUnpacker::new(Self::NAME, &self.schema, reader);

        let mut ptype = 0u32;
        input.get(PTYPE, &mut ptype)?;
        if self.widths.ptype > 0 {
            let kind = PacketKind::from_wire(ptype).ok_or(CodecError::UnknownPacketKind(ptype))?;
            packet.body = Body::default_for(kind);
        }

        let h = &mut packet.common;
        input.get(SIZE, &mut h.size)?;
        input.get(UID, &mut h.uid)?;
        input.get(ERROR, &mut h.error)?;
        input.get(TIMESTAMP, &mut h.timestamp)?;
        input.get(DIRECTION, &mut h.direction)?;
        input.get(PREV_HOP, &mut h.prev_hop)?;
        input.get(NEXT_HOP, &mut h.next_hop)?;
        input.get(ADDR_TYPE, &mut h.addr_type)?;
        input.get(LAST_HOP, &mut h.last_hop)?;
        input.get(TXTIME, &mut h.txtime)?;
        Ok(())
    }
}
