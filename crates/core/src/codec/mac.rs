//! MAC header codec.

use super::{check_storage, FieldPacker, FieldUnpacker, HeaderCodec};
use crate::bitio::{BitReader, BitWriter, FieldValue};
use crate::error::Result;
use crate::packet::Packet;
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};

const FTYPE: usize = 0;
const SRC: usize = 1;
const DST: usize = 2;
const HDR_TYPE: usize = 3;
const TXTIME: usize = 4;
const SSTIME: usize = 5;
const PADDING: usize = 6;

const STORAGE: [usize; 7] = [
    <u8 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <u16 as FieldValue>::BITS,
    <f64 as FieldValue>::BITS,
    <f64 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
];

/// Bit widths of the MAC header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacWidths {
    pub ftype: usize,
    pub src: usize,
    pub dst: usize,
    pub hdr_type: usize,
    pub txtime: usize,
    pub sstime: usize,
    pub padding: usize,
}

impl Default for MacWidths {
    fn default() -> Self {
        Self {
            ftype: 0,
            src: 8,
            dst: 8,
            hdr_type: 0,
            txtime: 0,
            sstime: 0,
            padding: 0,
        }
    }
}

/// Codec for [`MacHeader`](crate::packet::MacHeader).
///
/// Source and destination are signed so a broadcast `-1` survives any width.
#[derive(Debug, Clone)]
pub struct MacCodec {
    widths: MacWidths,
    schema: FieldSchema,
}

impl MacCodec {
    pub const NAME: &'static str = "mac";

    pub fn new(widths: MacWidths) -> Result<Self> {
        Ok(Self {
            schema: build_schema(&widths)?,
            widths,
        })
    }

    /// Recompute the schema for new widths.
    pub fn reinit(&mut self, widths: MacWidths) -> Result<()> {
        self.schema = build_schema(&widths)?;
        self.widths = widths;
        Ok(())
    }

    pub fn widths(&self) -> &MacWidths {
        &self.widths
    }
}

fn build_schema(w: &MacWidths) -> Result<FieldSchema> {
    let schema = FieldSchema::new()
        .field("ftype", w.ftype)
        .signed_field("src", w.src)
        .signed_field("dst", w.dst)
        .field("hdr_type", w.hdr_type)
        .field("txtime", w.txtime)
        .field("sstime", w.sstime)
        .signed_field("padding", w.padding);
    check_storage(MacCodec::NAME, &schema, &STORAGE)?;
    Ok(schema)
}

impl HeaderCodec for MacCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    fn pack(&self, packet: &Packet, writer: &mut BitWriter<'_>) -> Result<()> {
        let h = &packet.mac;
        let mut out = FieldPacker::new(Self::NAME, &self.schema, writer);

        out.put(FTYPE, h.ftype)?;
        out.put(SRC, h.src)?;
        out.put(DST, h.dst)?;
        out.put(HDR_TYPE, h.hdr_type)?;
        out.put(TXTIME, h.txtime)?;
        out.put(SSTIME, h.sstime)?;
        out.put(PADDING, h.padding)?;
        Ok(())
    }

    fn unpack(&self, reader: &mut BitReader<'_>, packet: &mut Packet) -> Result<()> {
        let h = &mut packet.mac;
        let mut input = FieldUnpacker::new(Self::NAME, &self.schema, reader);

        input.get(FTYPE, &mut h.ftype)?;
        input.get(SRC, &mut h.src)?;
        input.get(DST, &mut h.dst)?;
        input.get(HDR_TYPE, &mut h.hdr_type)?;
        input.get(TXTIME, &mut h.txtime)?;
        input.get(SSTIME, &mut h.sstime)?;
        input.get(PADDING, &mut h.padding)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_survives_narrow_width() {
        let codec = MacCodec::new(MacWidths {
            src: 4,
            dst: 4,
            ..MacWidths::default()
        })
        .unwrap();
        let packet = Packet::default().with_mac(7, -1);

        let mut buf = [0u8; 1];
        assert_eq!(codec.pack_at(&packet, &mut buf, 0).unwrap(), 8);

        let mut decoded = Packet::default();
        codec.unpack_at(&buf, 0, &mut decoded).unwrap();
        assert_eq!(decoded.mac.src, 7);
        assert_eq!(decoded.mac.dst, -1);
    }

    #[test]
    fn test_full_widths_round_trip() {
        let codec = MacCodec::new(MacWidths {
            ftype: 3,
            src: 16,
            dst: 16,
            hdr_type: 5,
            txtime: 64,
            sstime: 64,
            padding: 10,
        })
        .unwrap();

        let mut packet = Packet::default().with_mac(-300, 12_000);
        packet.mac.ftype = 5;
        packet.mac.hdr_type = 17;
        packet.mac.txtime = 1.25;
        packet.mac.sstime = -3.5;
        packet.mac.padding = -7;

        let mut buf = [0u8; 32];
        codec.pack_at(&packet, &mut buf, 3).unwrap();

        let mut decoded = Packet::default();
        codec.unpack_at(&buf, 3, &mut decoded).unwrap();
        assert_eq!(decoded.mac, packet.mac);
    }
}
