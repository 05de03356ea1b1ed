//! Adaptation-layer frames.
//!
//! Every frame on the link starts with a bit-packed header identifying the
//! packet it belongs to and where its payload sits inside that packet:
//!
//! # Frame Format
//!
//! ```text
//! +----------------------+
//! | src_id (w_src)       |  sending node
//! +----------------------+
//! | pkt_id (w_pkt)       |  per-sender packet counter
//! +----------------------+
//! | frag_offset (w_off)  |  index of this frame within the packet
//! +----------------------+
//! | more_fragments (w_m) |  false on the frame that ends the packet
//! +----------------------+
//! | dummy (w_dummy)      |  filler taken from the dummy content
//! +----------------------+
//! | zero pad to a byte   |
//! +----------------------+
//! | payload              |  raw bytes of the packed packet
//! | (variable)           |
//! +----------------------+
//! ```
//!
//! Fields are LSB-first in the order shown. Header widths come from
//! [`FrameHeaderWidths`]; a zero width omits the field and it decodes as zero.
//! The header always occupies `ceil(bits / 8)` bytes so the payload starts on a
//! byte boundary.

use crate::bitio::{BitReader, BitWriter, FieldValue};
use crate::codec::{check_storage, FieldPacker, FieldUnpacker};
use crate::error::{FrameError, Result};
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};

const SRC_ID: usize = 0;
const PKT_ID: usize = 1;
const FRAG_OFFSET: usize = 2;
const MORE_FRAGMENTS: usize = 3;

const STORAGE: [usize; 4] = [
    <u8 as FieldValue>::BITS,
    <u32 as FieldValue>::BITS,
    <u32 as FieldValue>::BITS,
    <bool as FieldValue>::BITS,
];

/// Default filler written into the dummy field.
pub const DEFAULT_DUMMY_CONTENT: &str = " DEFAULT DUMMY STRING ";

/// Bit widths of the frame header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameHeaderWidths {
    pub src_id: usize,
    pub pkt_id: usize,
    pub frag_offset: usize,
    pub more_fragments: usize,
    /// Filler bits; not bounded by any storage type
    pub dummy: usize,
}

impl Default for FrameHeaderWidths {
    fn default() -> Self {
        Self {
            src_id: 8,
            pkt_id: 32,
            frag_offset: 16,
            more_fragments: 1,
            dummy: 0,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub src_id: u8,
    pub pkt_id: u32,
    pub frag_offset: u32,
    pub more_fragments: bool,
}

/// One transmission unit: header plus a slice of a packed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(header: FrameHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Size on the wire for a header of `header_bytes`.
    pub fn encoded_len(&self, header_bytes: usize) -> usize {
        header_bytes + self.payload.len()
    }

    /// Whether this frame ends its packet.
    pub fn is_last(&self) -> bool {
        !self.header.more_fragments
    }
}

/// Encodes and decodes frames for one header configuration.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    widths: FrameHeaderWidths,
    schema: FieldSchema,
    /// Dummy filler, already repeated out to the dummy width
    dummy: Vec<u8>,
}

impl FrameCodec {
    pub const NAME: &'static str = "frame";

    /// Build a codec for `widths`, filling the dummy field from `dummy_content`.
    ///
    /// An empty `dummy_content` fills the dummy field with zeros.
    ///
    /// # Errors
    /// - `CodecError::FieldTooWide` if a width exceeds its field's storage
    pub fn new(widths: FrameHeaderWidths, dummy_content: &[u8]) -> Result<Self> {
        let schema = FieldSchema::new()
            .field("src_id", widths.src_id)
            .field("pkt_id", widths.pkt_id)
            .field("frag_offset", widths.frag_offset)
            .field("more_fragments", widths.more_fragments)
            .field("dummy", widths.dummy);
        check_storage(Self::NAME, &schema, &STORAGE)?;

        let dummy_len = widths.dummy.div_ceil(8);
        let dummy = if dummy_content.is_empty() {
            vec![0u8; dummy_len]
        } else {
            dummy_content.iter().copied().cycle().take(dummy_len).collect()
        };

        Ok(Self { widths, schema, dummy })
    }

    pub fn widths(&self) -> &FrameHeaderWidths {
        &self.widths
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Header size in bits.
    pub fn header_bits(&self) -> usize {
        self.schema.total_bits()
    }

    /// Header size in bytes, rounded up.
    pub fn header_bytes(&self) -> usize {
        self.schema.byte_len()
    }

    /// How many frames one packet may span.
    ///
    /// Without a `more_fragments` bit a receiver cannot tell where a packet
    /// ends, so every packet must fit in a single frame.
    pub fn max_fragments(&self) -> u64 {
        if self.widths.more_fragments == 0 {
            1
        } else {
            crate::bitio::low_mask(self.widths.frag_offset).saturating_add(1)
        }
    }

    /// Largest `pkt_id` the header can carry; the packet counter wraps after it.
    pub fn max_pkt_id(&self) -> u32 {
        crate::bitio::low_mask(self.widths.pkt_id) as u32
    }

    /// Serialize a frame.
    ///
    /// # Errors
    /// - `CodecError::ValueOutOfRange` if a header value does not fit its width
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let header_bytes = self.header_bytes();
        let mut buf = vec![0u8; frame.encoded_len(header_bytes)];

        {
            let mut writer = BitWriter::new(&mut buf[..header_bytes]);
            let mut out = FieldPacker::new(Self::NAME, &self.schema, &mut writer);
            out.put(SRC_ID, frame.header.src_id)?;
            out.put(PKT_ID, frame.header.pkt_id)?;
            out.put(FRAG_OFFSET, frame.header.frag_offset)?;
            out.put(MORE_FRAGMENTS, frame.header.more_fragments)?;
            writer.write_bytes(&self.dummy, self.widths.dummy)?;
        }

        buf[header_bytes..].copy_from_slice(&frame.payload);
        Ok(buf)
    }

    /// Parse a frame. Everything after the header is payload.
    ///
    /// # Errors
    /// - `FrameError::FrameTooShort` if `bytes` cannot hold the header
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame> {
        let header_bytes = self.header_bytes();
        if bytes.len() < header_bytes {
            return Err(FrameError::FrameTooShort {
                required: header_bytes,
                actual: bytes.len(),
            }
            .into());
        }

        let mut header = FrameHeader::default();
        let mut reader = BitReader::new(&bytes[..header_bytes]);
        let mut input = FieldUnpacker::new(Self::NAME, &self.schema, &mut reader);
        input.get(SRC_ID, &mut header.src_id)?;
        input.get(PKT_ID, &mut header.pkt_id)?;
        input.get(FRAG_OFFSET, &mut header.frag_offset)?;
        input.get(MORE_FRAGMENTS, &mut header.more_fragments)?;

        Ok(Frame::new(header, bytes[header_bytes..].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, Error};

    fn header(frag_offset: u32, more_fragments: bool) -> FrameHeader {
        FrameHeader {
            src_id: 3,
            pkt_id: 1000,
            frag_offset,
            more_fragments,
        }
    }

    #[test]
    fn test_default_header_size() {
        let codec = FrameCodec::new(FrameHeaderWidths::default(), b"").unwrap();
        assert_eq!(codec.header_bits(), 57);
        assert_eq!(codec.header_bytes(), 8);
        assert_eq!(codec.max_fragments(), 65_536);
        assert_eq!(codec.max_pkt_id(), u32::MAX);
    }

    #[test]
    fn test_encode_decode() {
        let codec = FrameCodec::new(FrameHeaderWidths::default(), b"").unwrap();
        let frame = Frame::new(header(7, true), vec![0xDE, 0xAD, 0xBE, 0xEF]);

        let bytes = codec.encode(&frame).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[8..], &[0xDE, 0xAD, 0xBE, 0xEF]);

        assert_eq!(codec.decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_bit_exact_layout() {
        let widths = FrameHeaderWidths {
            src_id: 3,
            pkt_id: 4,
            frag_offset: 2,
            more_fragments: 1,
            dummy: 0,
        };
        let codec = FrameCodec::new(widths, b"").unwrap();
        let frame = Frame::new(
            FrameHeader {
                src_id: 0b101,
                pkt_id: 0b1100,
                frag_offset: 0b10,
                more_fragments: true,
            },
            vec![],
        );

        // src in bits 0..3, pkt_id 3..7, frag_offset 7..9, M at bit 9
        let bytes = codec.encode(&frame).unwrap();
        assert_eq!(bytes, vec![0b0110_0101, 0b0000_0011]);
    }

    #[test]
    fn test_dummy_field_repeats_content() {
        let widths = FrameHeaderWidths {
            dummy: 40,
            ..FrameHeaderWidths::default()
        };
        let codec = FrameCodec::new(widths, b"AB").unwrap();
        assert_eq!(codec.header_bits(), 97);
        assert_eq!(codec.header_bytes(), 13);

        let frame = Frame::new(header(0, false), b"xyz".to_vec());
        let bytes = codec.encode(&frame).unwrap();

        let mut dummy = [0u8; 5];
        crate::bitio::get_bytes(&bytes, 57, &mut dummy, 40).unwrap();
        assert_eq!(&dummy, b"ABABA");
        assert_eq!(codec.decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_too_short() {
        let codec = FrameCodec::new(FrameHeaderWidths::default(), b"").unwrap();
        let result = codec.decode(&[0u8; 5]);
        assert!(matches!(
            result,
            Err(Error::Frame(FrameError::FrameTooShort { required: 8, actual: 5 }))
        ));
    }

    #[test]
    fn test_offset_out_of_range() {
        let widths = FrameHeaderWidths {
            frag_offset: 2,
            ..FrameHeaderWidths::default()
        };
        let codec = FrameCodec::new(widths, b"").unwrap();
        assert_eq!(codec.max_fragments(), 4);

        let result = codec.encode(&Frame::new(header(4, false), vec![]));
        assert!(matches!(
            result,
            Err(Error::Codec(CodecError::ValueOutOfRange { field: "frag_offset", .. }))
        ));
    }

    #[test]
    fn test_omitted_fields_decode_as_zero() {
        let widths = FrameHeaderWidths {
            src_id: 0,
            more_fragments: 0,
            ..FrameHeaderWidths::default()
        };
        let codec = FrameCodec::new(widths, b"").unwrap();
        assert_eq!(codec.max_fragments(), 1);

        let bytes = codec.encode(&Frame::new(header(0, false), vec![1])).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.header.src_id, 0);
        assert_eq!(decoded.header.pkt_id, 1000);
        assert!(decoded.is_last());
    }

    #[test]
    fn test_storage_limits() {
        let widths = FrameHeaderWidths {
            src_id: 9,
            ..FrameHeaderWidths::default()
        };
        assert!(matches!(
            FrameCodec::new(widths, b""),
            Err(Error::Codec(CodecError::FieldTooWide { field: "src_id", max: 8, .. }))
        ));
    }
}
