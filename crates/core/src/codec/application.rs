//! Generic application message codec.
//!
//! The fixed fields are followed by `payload_size` and then exactly that many
//! payload bytes. The payload is not a schema field: its length comes from the
//! packet on pack and from `payload_size` on unpack. With `payload_size` at
//! zero width the payload cannot be delimited and is not carried.

use super::{check_storage, FieldPacker, FieldUnpacker, HeaderCodec};
use crate::bitio::{BitReader, BitWriter, FieldValue};
use crate::error::{CodecError, Result};
use crate::packet::{Body, Packet};
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};

const SN: usize = 0;
const RFTT: usize = 1;
const RFTT_VALID: usize = 2;
const PRIORITY: usize = 3;
const PAYLOAD_SIZE: usize = 4;

const STORAGE: [usize; 5] = [
    <u32 as FieldValue>::BITS,
    <i32 as FieldValue>::BITS,
    <bool as FieldValue>::BITS,
    <u8 as FieldValue>::BITS,
    <u32 as FieldValue>::BITS,
];

/// Bit widths of the application header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationWidths {
    pub sn: usize,
    pub rftt: usize,
    pub rftt_valid: usize,
    pub priority: usize,
    pub payload_size: usize,
}

impl Default for ApplicationWidths {
    fn default() -> Self {
        Self {
            sn: 32,
            rftt: 0,
            rftt_valid: 0,
            priority: 0,
            payload_size: 16,
        }
    }
}

/// Codec for [`Body::Application`].
#[derive(Debug, Clone)]
pub struct ApplicationCodec {
    widths: ApplicationWidths,
    schema: FieldSchema,
}

impl ApplicationCodec {
    pub const NAME: &'static str = "application";

    pub fn new(widths: ApplicationWidths) -> Result<Self> {
        Ok(Self {
            schema: build_schema(&widths)?,
            widths,
        })
    }

    /// Recompute the schema for new widths.
    pub fn reinit(&mut self, widths: ApplicationWidths) -> Result<()> {
        self.schema = build_schema(&widths)?;
        self.widths = widths;
        Ok(())
    }

    pub fn widths(&self) -> &ApplicationWidths {
        &self.widths
    }

    fn carries_payload(&self) -> bool {
        self.widths.payload_size > 0
    }
}

fn build_schema(w: &ApplicationWidths) -> Result<FieldSchema> {
    let schema = FieldSchema::new()
        .field("sn", w.sn)
        .signed_field("rftt", w.rftt)
        .field("rftt_valid", w.rftt_valid)
        .field("priority", w.priority)
        .field("payload_size", w.payload_size);
    check_storage(ApplicationCodec::NAME, &schema, &STORAGE)?;
    Ok(schema)
}

impl HeaderCodec for ApplicationCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    fn pack(&self, packet: &Packet, writer: &mut BitWriter<'_>) -> Result<()> {
        let Body::Application(h) = &packet.body else {
            return Ok(());
        };
        let mut out = FieldPacker::new(Self::NAME, &self.schema, writer);

        out.put(SN, h.sn)?;
        out.put(RFTT, h.rftt)?;
        out.put(RFTT_VALID, h.rftt_valid)?;
        out.put(PRIORITY, h.priority)?;

        if self.carries_payload() {
            let size = u32::try_from(h.payload.len()).map_err(|_| CodecError::ValueOutOfRange {
                codec: Self::NAME,
                field: "payload_size",
                width: self.widths.payload_size,
            })?;
            out.put(PAYLOAD_SIZE, size)?;
            out.put_bytes(&h.payload)?;
        } else if !h.payload.is_empty() {
            // Nothing on the wire could say how long the payload is
            return Err(CodecError::ValueOutOfRange {
                codec: Self::NAME,
                field: "payload_size",
                width: 0,
            }
            .into());
        }
        Ok(())
    }

    fn unpack(&self, reader: &mut BitReader<'_>, packet: &mut Packet) -> Result<()> {
        let Body::Application(h) = &mut packet.body else {
            return Ok(());
        };
        let mut input = FieldUnpacker::new(Self::NAME, &self.schema, reader);

        input.get(SN, &mut h.sn)?;
        input.get(RFTT, &mut h.rftt)?;
        input.get(RFTT_VALID, &mut h.rftt_valid)?;
        input.get(PRIORITY, &mut h.priority)?;

        h.payload.clear();
        if self.carries_payload() {
            let mut size = 0u32;
            input.get(PAYLOAD_SIZE, &mut size)?;
            h.payload = input.get_bytes(size as usize)?;
        }
        Ok(())
    }
}
