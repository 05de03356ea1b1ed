//! CBR application header codec.

use super::{check_storage, FieldPacker, FieldUnpacker, HeaderCodec};
use crate::bitio::{BitReader, BitWriter, FieldValue};
use crate::error::Result;
use crate::packet::{Body, Packet};
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};

const SN: usize = 0;
const RFTT: usize = 1;
const RFTT_VALID: usize = 2;

const STORAGE: [usize; 3] = [
    <u32 as FieldValue>::BITS,
    <f64 as FieldValue>::BITS,
    <bool as FieldValue>::BITS,
];

/// Bit widths of the CBR header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbrWidths {
    pub sn: usize,
    pub rftt: usize,
    pub rftt_valid: usize,
}

impl Default for CbrWidths {
    fn default() -> Self {
        Self {
            sn: 32,
            rftt: 0,
            rftt_valid: 0,
        }
    }
}

/// Codec for [`Body::Cbr`]. Other bodies are left alone.
#[derive(Debug, Clone)]
pub struct CbrCodec {
    widths: CbrWidths,
    schema: FieldSchema,
}

impl CbrCodec {
    pub const NAME: &'static str = "cbr";

    pub fn new(widths: CbrWidths) -> Result<Self> {
        Ok(Self {
            schema: build_schema(&widths)?,
            widths,
        })
    }

    /// Recompute the schema for new widths.
    pub fn reinit(&mut self, widths: CbrWidths) -> Result<()> {
        self.schema = build_schema(&widths)?;
        self.widths = widths;
        Ok(())
    }

    pub fn widths(&self) -> &CbrWidths {
        &self.widths
    }
}

fn build_schema(w: &CbrWidths) -> Result<FieldSchema> {
    let schema = FieldSchema::new()
        .field("sn", w.sn)
        .field("rftt", w.rftt)
        .field("rftt_valid", w.rftt_valid);
    check_storage(CbrCodec::NAME, &schema, &STORAGE)?;
    Ok(schema)
}

impl HeaderCodec for CbrCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    fn pack(&self, packet: &Packet, writer: &mut BitWriter<'_>) -> Result<()> {
        let Body::Cbr(h) = &packet.body else {
            return Ok(());
        };
        let mut out = FieldPacker::new(Self::NAME, &self.schema, writer);

        out.put(SN, h.sn)?;
        out.put(RFTT, h.rftt)?;
        out.put(RFTT_VALID, h.rftt_valid)?;
        Ok(())
    }

    fn unpack(&self, reader: &mut BitReader<'_>, packet: &mut Packet) -> Result<()> {
        let Body::Cbr(h) = &mut packet.body else {
            return Ok(());
        };
        let mut input = FieldUnpacker::new(Self::NAME, &self.schema, reader);

        input.get(SN, &mut h.sn)?;
        input.get(RFTT, &mut h.rftt)?;
        input.get(RFTT_VALID, &mut h.rftt_valid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{CbrHeader, PollHeader};

    #[test]
    fn test_round_trip() {
        let codec = CbrCodec::new(CbrWidths {
            sn: 12,
            rftt: 64,
            rftt_valid: 1,
        })
        .unwrap();
        let packet = Packet::new(Body::Cbr(CbrHeader {
            sn: 4095,
            rftt: 2.75,
            rftt_valid: true,
        }));

        let mut buf = [0u8; 16];
        assert_eq!(codec.pack_at(&packet, &mut buf, 0).unwrap(), 77);

        let mut decoded = Packet::new(Body::Cbr(CbrHeader::default()));
        codec.unpack_at(&buf, 0, &mut decoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_other_kinds_are_skipped() {
        let codec = CbrCodec::new(CbrWidths::default()).unwrap();
        let packet = Packet::new(Body::Poll(PollHeader { id_polled: 1, uid: 1 }));

        let mut buf = [0u8; 8];
        assert_eq!(codec.pack_at(&packet, &mut buf, 5).unwrap(), 5);

        let mut decoded = packet.clone();
        assert_eq!(codec.unpack_at(&buf, 5, &mut decoded).unwrap(), 5);
        assert_eq!(decoded, packet);
    }
}
