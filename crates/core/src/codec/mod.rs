//! Header codecs: packing logical packets into compact bitstreams.
//!
//! Each [`HeaderCodec`] owns a [`FieldSchema`] built from externally supplied
//! bit widths and knows which packet attribute every schema slot maps to.
//! Codecs are chained in a [`CodecChain`]; packing a packet walks the chain in
//! registration order and concatenates each codec's bits, unpacking walks it in
//! the same order.
//!
//! # Field rules
//!
//! - A zero-width field is skipped both ways; on unpack the attribute keeps its
//!   default value.
//! - Packing refuses values that do not fit their configured width instead of
//!   truncating them. Signed fields accept the two's complement range of their
//!   width and are sign-extended on unpack.
//! - A codec whose output would overflow the packet buffer aborts the whole
//!   pack with [`CodecError::PayloadOverflow`] naming that codec.
//!
//! # Packet kinds
//!
//! The common codec carries the [`PacketKind`](crate::packet::PacketKind)
//! discriminator and must run first. On unpack it installs an empty body of
//! the decoded kind, which later codecs then fill. Family codecs match the body
//! exhaustively and only touch the kinds they own.

pub mod application;
pub mod cbr;
pub mod common;
pub mod mac;
pub mod polling;

pub use application::{ApplicationCodec, ApplicationWidths};
pub use cbr::{CbrCodec, CbrWidths};
pub use common::{CommonCodec, CommonWidths};
pub use mac::{MacCodec, MacWidths};
pub use polling::{PollingCodec, PollingWidths};

use crate::bitio::{self, BitReader, BitWriter, FieldValue};
use crate::error::{BitIoError, CodecError, Error, Result};
use crate::packet::Packet;
use crate::schema::{FieldDescriptor, FieldSchema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Packs and unpacks one header family.
pub trait HeaderCodec: fmt::Debug {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Current wire layout.
    fn schema(&self) -> &FieldSchema;

    /// Append this codec's fields for `packet` at the writer's position.
    fn pack(&self, packet: &Packet, writer: &mut BitWriter<'_>) -> Result<()>;

    /// Read this codec's fields into `packet` from the reader's position.
    fn unpack(&self, reader: &mut BitReader<'_>, packet: &mut Packet) -> Result<()>;

    /// Pack at an explicit bit offset and return the offset after the last field.
    fn pack_at(&self, packet: &Packet, buf: &mut [u8], offset: usize) -> Result<usize> {
        let mut writer = BitWriter::at(buf, offset);
        self.pack(packet, &mut writer)?;
        Ok(writer.position())
    }

    /// Unpack from an explicit bit offset and return the offset after the last field.
    fn unpack_at(&self, buf: &[u8], offset: usize, packet: &mut Packet) -> Result<usize> {
        let mut reader = BitReader::at(buf, offset);
        self.unpack(&mut reader, packet)?;
        Ok(reader.position())
    }
}

/// Serializes whole logical packets for the adaptation layer.
pub trait PacketCodec {
    /// Logical packet type carried by the layer.
    type Packet: Clone + fmt::Debug;

    /// Serialize `packet` into at most `capacity` bytes.
    fn pack(&self, packet: &Self::Packet, capacity: usize) -> Result<Vec<u8>>;

    /// Rebuild a packet from reassembled bytes. Trailing bytes are ignored.
    fn unpack(&self, bytes: &[u8]) -> Result<Self::Packet>;
}

/// Bit widths for every codec family of the standard chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecWidths {
    pub common: CommonWidths,
    pub mac: MacWidths,
    pub cbr: CbrWidths,
    pub polling: PollingWidths,
    pub application: ApplicationWidths,
}

/// Ordered list of active header codecs.
#[derive(Debug, Default)]
pub struct CodecChain {
    codecs: Vec<Box<dyn HeaderCodec>>,
}

impl CodecChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Chain with every family codec, common header first.
    pub fn standard(widths: &CodecWidths) -> Result<Self> {
        let mut chain = Self::new();
        chain
            .register(CommonCodec::new(widths.common)?)
            .register(MacCodec::new(widths.mac)?)
            .register(CbrCodec::new(widths.cbr)?)
            .register(PollingCodec::new(widths.polling)?)
            .register(ApplicationCodec::new(widths.application)?);
        Ok(chain)
    }

    /// Append a codec; packing follows registration order.
    pub fn register(&mut self, codec: impl HeaderCodec + 'static) -> &mut Self {
        self.codecs.push(Box::new(codec));
        self
    }

    /// Names of the active codecs, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.codecs.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl PacketCodec for CodecChain {
    type Packet = Packet;

    fn pack(&self, packet: &Packet, capacity: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; capacity];

        let len = {
            let mut writer = BitWriter::new(&mut buf);
            for codec in &self.codecs {
                codec.pack(packet, &mut writer)?;
                tracing::trace!(codec = codec.name(), bits = writer.position(), "packed header");
            }
            writer.byte_len()
        };

        buf.truncate(len);
        Ok(buf)
    }

    fn unpack(&self, bytes: &[u8]) -> Result<Packet> {
        let mut packet = Packet::default();
        let mut reader = BitReader::new(bytes);

        for codec in &self.codecs {
            codec.unpack(&mut reader, &mut packet)?;
        }

        Ok(packet)
    }
}

/// Explicit bypass: packets are opaque byte strings carried verbatim.
///
/// No header codec runs, so nothing checks the reassembled size against what
/// was sent. Receivers get every reassembled byte, including zero padding
/// added to the final frame when padding is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Passthrough {
    const NAME: &'static str = "passthrough";
}

impl PacketCodec for Passthrough {
    type Packet = Vec<u8>;

    fn pack(&self, packet: &Vec<u8>, capacity: usize) -> Result<Vec<u8>> {
        if packet.len() > capacity {
            return Err(CodecError::PayloadOverflow {
                codec: Self::NAME,
                capacity_bits: capacity * 8,
            }
            .into());
        }
        Ok(packet.clone())
    }

    fn unpack(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Reject schemas whose widths exceed the storage of the mapped attributes.
///
/// `storage[i]` is the storage width of the attribute behind schema slot `i`.
pub(crate) fn check_storage(codec: &'static str, schema: &FieldSchema, storage: &[usize]) -> Result<()> {
    for (field, &max) in schema.iter().zip(storage) {
        if field.bit_width > max {
            return Err(CodecError::FieldTooWide {
                codec,
                field: field.name,
                width: field.bit_width,
                max,
            }
            .into());
        }
    }
    Ok(())
}

fn descriptor<'s>(codec: &'static str, schema: &'s FieldSchema, index: usize) -> Result<&'s FieldDescriptor> {
    schema
        .get(index)
        .ok_or_else(|| CodecError::UnknownField { codec, index }.into())
}

fn too_wide<T: FieldValue>(codec: &'static str, field: &FieldDescriptor) -> Result<()> {
    if field.bit_width > T::BITS {
        return Err(CodecError::FieldTooWide {
            codec,
            field: field.name,
            width: field.bit_width,
            max: T::BITS,
        }
        .into());
    }
    Ok(())
}

/// Schema-driven writer used inside [`HeaderCodec::pack`].
pub struct FieldPacker<'s, 'w, 'b> {
    codec: &'static str,
    schema: &'s FieldSchema,
    writer: &'w mut BitWriter<'b>,
}

impl<'s, 'w, 'b> FieldPacker<'s, 'w, 'b> {
    pub fn new(codec: &'static str, schema: &'s FieldSchema, writer: &'w mut BitWriter<'b>) -> Self {
        Self { codec, schema, writer }
    }

    /// Write `value` into schema slot `index`.
    pub fn put<T: FieldValue>(&mut self, index: usize, value: T) -> Result<()> {
        let field = descriptor(self.codec, self.schema, index)?;
        if !field.is_present() {
            return Ok(());
        }
        too_wide::<T>(self.codec, field)?;

        if !bitio::fits(value, field.bit_width, field.signed) {
            return Err(CodecError::ValueOutOfRange {
                codec: self.codec,
                field: field.name,
                width: field.bit_width,
            }
            .into());
        }

        let capacity_bits = self.writer.capacity_bits();
        self.writer
            .write(value, field.bit_width)
            .map_err(|e| overflow(self.codec, capacity_bits, e))
    }

    /// Write a variable-length byte run that is not part of the schema.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let capacity_bits = self.writer.capacity_bits();
        self.writer
            .write_bytes(bytes, bytes.len() * 8)
            .map_err(|e| overflow(self.codec, capacity_bits, e))
    }
}

/// Schema-driven reader used inside [`HeaderCodec::unpack`].
pub struct FieldUnpacker<'s, 'r, 'b> {
    codec: &'static str,
    schema: &'s FieldSchema,
    reader: &'r mut BitReader<'b>,
}

impl<'s, 'r, 'b> FieldUnpacker<'s, 'r, 'b> {
    pub fn new(codec: &'static str, schema: &'s FieldSchema, reader: &'r mut BitReader<'b>) -> Self {
        Self { codec, schema, reader }
    }

    /// Zero `out`, then read schema slot `index` into it.
    pub fn get<T: FieldValue>(&mut self, index: usize, out: &mut T) -> Result<()> {
        let field = descriptor(self.codec, self.schema, index)?;
        *out = T::default();
        if !field.is_present() {
            return Ok(());
        }
        too_wide::<T>(self.codec, field)?;

        let raw: T = self
            .reader
            .read(field.bit_width)
            .map_err(|e| truncated(self.codec, e))?;

        *out = if field.signed {
            bitio::restore_signed(raw, field.bit_width)
        } else {
            raw
        };
        Ok(())
    }

    /// Read a variable-length byte run that is not part of the schema.
    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if len.saturating_mul(8) > self.reader.bits_remaining() {
            return Err(CodecError::Truncated { codec: self.codec }.into());
        }
        let mut bytes = vec![0u8; len];
        self.reader
            .read_bytes(&mut bytes, len * 8)
            .map_err(|e| truncated(self.codec, e))?;
        Ok(bytes)
    }
}

fn overflow(codec: &'static str, capacity_bits: usize, err: Error) -> Error {
    match err {
        Error::BitIo(BitIoError::OutOfBounds { .. }) => CodecError::PayloadOverflow { codec, capacity_bits }.into(),
        other => other,
    }
}

fn truncated(codec: &'static str, err: Error) -> Error {
    match err {
        Error::BitIo(BitIoError::OutOfBounds { .. }) => CodecError::Truncated { codec }.into(),
        other => other,
    }
}
