//! Bit-level field access inside bounded byte buffers.
//!
//! Every header codec in this crate is built from two primitives, [`put`] and
//! [`get`], which move a run of `n_bits` between a typed value and an arbitrary
//! bit offset of a byte buffer. Buffers are treated as packed bit arrays
//! addressed least-significant-bit first within each byte: bit `i` of a value
//! lands at buffer bit `offset + i`, and buffer bit `k` lives in byte `k / 8`
//! at position `k % 8`.
//!
//! Truncating a signed value to fewer bits than its storage loses the sign;
//! [`restore_signed`] recovers it after a read.
//!
//! [`BitWriter`] and [`BitReader`] wrap the primitives with a running offset so
//! that chained fields accumulate their positions.
//!
//! # Example
//! ```
//! use uwal_core::bitio::{restore_signed, BitReader, BitWriter};
//!
//! let mut buf = [0u8; 2];
//! let mut writer = BitWriter::new(&mut buf);
//! writer.write(0b101u8, 3).unwrap();
//! writer.write(-3i16, 5).unwrap();
//! assert_eq!(writer.position(), 8);
//! assert_eq!(buf[0], 0b11101_101);
//!
//! let mut reader = BitReader::new(&buf);
//! assert_eq!(reader.read::<u8>(3).unwrap(), 0b101);
//! let raw: i16 = reader.read(5).unwrap();
//! assert_eq!(restore_signed(raw, 5), -3);
//! ```

use crate::error::{BitIoError, Result};

/// A value that can be stored in a bit field.
///
/// `BITS` is the width of the underlying storage; no operation may move more
/// bits than that. Values travel through the primitives as raw `u64` bit
/// patterns, floats included.
pub trait FieldValue: Copy + Default + PartialEq + std::fmt::Debug {
    /// Storage width in bits
    const BITS: usize;

    /// Whether the native type is a two's complement integer
    const SIGNED: bool;

    /// Raw bit pattern, zero-extended to 64 bits
    fn to_raw(self) -> u64;

    /// Rebuild a value from the low `BITS` bits of `raw`
    fn from_raw(raw: u64) -> Self;
}

macro_rules! impl_unsigned_field {
    ($($t:ty),*) => {$(
        impl FieldValue for $t {
            const BITS: usize = <$t>::BITS as usize;
            const SIGNED: bool = false;

            fn to_raw(self) -> u64 {
                self as u64
            }

            fn from_raw(raw: u64) -> Self {
                raw as $t
            }
        }
    )*};
}

macro_rules! impl_signed_field {
    ($($t:ty => $u:ty),*) => {$(
        impl FieldValue for $t {
            const BITS: usize = <$t>::BITS as usize;
            const SIGNED: bool = true;

            fn to_raw(self) -> u64 {
                self as $u as u64
            }

            fn from_raw(raw: u64) -> Self {
                raw as $u as $t
            }
        }
    )*};
}

impl_unsigned_field!(u8, u16, u32, u64);
impl_signed_field!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);

impl FieldValue for bool {
    const BITS: usize = 1;
    const SIGNED: bool = false;

    fn to_raw(self) -> u64 {
        self as u64
    }

    fn from_raw(raw: u64) -> Self {
        raw & 1 == 1
    }
}

impl FieldValue for f32 {
    const BITS: usize = 32;
    const SIGNED: bool = false;

    fn to_raw(self) -> u64 {
        self.to_bits() as u64
    }

    fn from_raw(raw: u64) -> Self {
        f32::from_bits(raw as u32)
    }
}

impl FieldValue for f64 {
    const BITS: usize = 64;
    const SIGNED: bool = false;

    fn to_raw(self) -> u64 {
        self.to_bits()
    }

    fn from_raw(raw: u64) -> Self {
        f64::from_bits(raw)
    }
}

/// Mask with the low `n_bits` bits set.
pub fn low_mask(n_bits: usize) -> u64 {
    if n_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << n_bits) - 1
    }
}

fn check_width<T: FieldValue>(n_bits: usize) -> Result<()> {
    if n_bits > T::BITS {
        return Err(BitIoError::InvalidBitCount {
            requested: n_bits,
            max: T::BITS,
        }
        .into());
    }
    Ok(())
}

fn check_range(buf_len: usize, bit_offset: usize, n_bits: usize) -> Result<()> {
    let capacity = buf_len * 8;
    match bit_offset.checked_add(n_bits) {
        Some(end) if end <= capacity => Ok(()),
        end => Err(BitIoError::OutOfBounds {
            offset: bit_offset,
            end: end.unwrap_or(usize::MAX),
            capacity,
        }
        .into()),
    }
}

/// Write the low `n_bits` of `value` into `buf` starting at `bit_offset`.
///
/// Bits of `buf` outside the written run are preserved.
///
/// # Returns
/// The number of bits written (always `n_bits`), so calls can chain an offset.
///
/// # Errors
/// - `BitIoError::InvalidBitCount` if `n_bits` exceeds `T::BITS`
/// - `BitIoError::OutOfBounds` if the run does not fit in `buf`
pub fn put<T: FieldValue>(buf: &mut [u8], bit_offset: usize, value: T, n_bits: usize) -> Result<usize> {
    check_width::<T>(n_bits)?;
    check_range(buf.len(), bit_offset, n_bits)?;

    let raw = value.to_raw();
    let mut done = 0;

    while done < n_bits {
        let pos = bit_offset + done;
        let byte = pos / 8;
        let shift = pos % 8;

        // Bits that still fit in the current byte
        let take = (8 - shift).min(n_bits - done);
        let mask = (((1u16 << take) - 1) as u8) << shift;
        let bits = ((raw >> done) as u8) << shift;

        buf[byte] = (buf[byte] & !mask) | (bits & mask);
        done += take;
    }

    Ok(n_bits)
}

/// Read `n_bits` from `buf` starting at `bit_offset` into `out`.
///
/// Bits above `n_bits` in `out` are zero. Signed fields must be passed through
/// [`restore_signed`] afterwards.
///
/// # Returns
/// The number of bits read (always `n_bits`).
///
/// # Errors
/// - `BitIoError::InvalidBitCount` if `n_bits` exceeds `T::BITS`
/// - `BitIoError::OutOfBounds` if the run does not fit in `buf`
pub fn get<T: FieldValue>(buf: &[u8], bit_offset: usize, out: &mut T, n_bits: usize) -> Result<usize> {
    check_width::<T>(n_bits)?;
    check_range(buf.len(), bit_offset, n_bits)?;

    let mut raw = 0u64;
    let mut done = 0;

    while done < n_bits {
        let pos = bit_offset + done;
        let byte = pos / 8;
        let shift = pos % 8;

        let take = (8 - shift).min(n_bits - done);
        let bits = (buf[byte] >> shift) & ((1u16 << take) - 1) as u8;

        raw |= (bits as u64) << done;
        done += take;
    }

    *out = T::from_raw(raw);
    Ok(n_bits)
}

/// Write the first `n_bits` of `src` into `buf` starting at `bit_offset`.
///
/// `src` is consumed byte by byte, each byte LSB-first, so byte-aligned runs
/// reproduce `src` verbatim.
///
/// # Errors
/// - `BitIoError::InsufficientBits` if `src` holds fewer than `n_bits` bits
/// - `BitIoError::OutOfBounds` if the run does not fit in `buf`
pub fn put_bytes(buf: &mut [u8], bit_offset: usize, src: &[u8], n_bits: usize) -> Result<usize> {
    if n_bits > src.len() * 8 {
        return Err(BitIoError::InsufficientBits {
            requested: n_bits,
            available: src.len() * 8,
        }
        .into());
    }
    check_range(buf.len(), bit_offset, n_bits)?;

    let mut done = 0;
    for &byte in src {
        if done >= n_bits {
            break;
        }
        let take = (n_bits - done).min(8);
        put(buf, bit_offset + done, byte, take)?;
        done += take;
    }

    Ok(n_bits)
}

/// Read `n_bits` from `buf` starting at `bit_offset` into `dst`.
///
/// `dst` is zeroed first; a trailing partial byte keeps its high bits clear.
///
/// # Errors
/// - `BitIoError::InsufficientBits` if `dst` cannot hold `n_bits` bits
/// - `BitIoError::OutOfBounds` if the run does not fit in `buf`
pub fn get_bytes(buf: &[u8], bit_offset: usize, dst: &mut [u8], n_bits: usize) -> Result<usize> {
    if n_bits > dst.len() * 8 {
        return Err(BitIoError::InsufficientBits {
            requested: n_bits,
            available: dst.len() * 8,
        }
        .into());
    }
    check_range(buf.len(), bit_offset, n_bits)?;

    dst.fill(0);
    let mut done = 0;
    for slot in dst.iter_mut() {
        if done >= n_bits {
            break;
        }
        let take = (n_bits - done).min(8);
        get(buf, bit_offset + done, slot, take)?;
        done += take;
    }

    Ok(n_bits)
}

/// Sign-extend a field that was truncated to `n_bits`.
///
/// Tests bit `n_bits - 1`; if set, every bit above it is filled with ones.
/// Widths of zero or at least the storage width leave the value untouched.
pub fn restore_signed<T: FieldValue>(value: T, n_bits: usize) -> T {
    if n_bits == 0 || n_bits >= T::BITS {
        return value;
    }

    let raw = value.to_raw();
    if (raw >> (n_bits - 1)) & 1 == 1 {
        T::from_raw(raw | (low_mask(T::BITS) & !low_mask(n_bits)))
    } else {
        value
    }
}

/// Keep only the low `n_bits` of `value`, as a write/read pair would.
pub fn truncate<T: FieldValue>(value: T, n_bits: usize) -> T {
    T::from_raw(value.to_raw() & low_mask(n_bits))
}

/// Whether `value` survives a round trip through an `n_bits` field.
///
/// Unsigned fields must have no bits set above `n_bits`; signed fields must
/// come back unchanged after truncation and [`restore_signed`].
pub fn fits<T: FieldValue>(value: T, n_bits: usize, signed: bool) -> bool {
    if n_bits == 0 || n_bits >= T::BITS {
        return true;
    }

    let truncated = truncate(value, n_bits);
    let restored = if signed {
        restore_signed(truncated, n_bits)
    } else {
        truncated
    };
    restored.to_raw() == value.to_raw()
}

/// Writes consecutive bit fields into a borrowed buffer.
///
/// # Invariants
/// - `position` never exceeds `buf.len() * 8`
#[derive(Debug)]
pub struct BitWriter<'a> {
    /// Destination buffer (fixed capacity)
    buf: &'a mut [u8],
    /// Next bit to write
    position: usize,
}

impl<'a> BitWriter<'a> {
    /// Create a writer positioned at bit 0.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, position: 0 }
    }

    /// Create a writer positioned at an arbitrary bit offset.
    pub fn at(buf: &'a mut [u8], position: usize) -> Self {
        Self { buf, position }
    }

    /// Write the low `n_bits` of `value` and advance.
    pub fn write<T: FieldValue>(&mut self, value: T, n_bits: usize) -> Result<()> {
        self.position += put(self.buf, self.position, value, n_bits)?;
        Ok(())
    }

    /// Write the first `n_bits` of `src` and advance.
    pub fn write_bytes(&mut self, src: &[u8], n_bits: usize) -> Result<()> {
        self.position += put_bytes(self.buf, self.position, src, n_bits)?;
        Ok(())
    }

    /// Current bit position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes touched so far (partial final byte included).
    pub fn byte_len(&self) -> usize {
        self.position.div_ceil(8)
    }

    /// Total capacity of the buffer in bits.
    pub fn capacity_bits(&self) -> usize {
        self.buf.len() * 8
    }

    /// Bits still available before the end of the buffer.
    pub fn bits_remaining(&self) -> usize {
        self.capacity_bits().saturating_sub(self.position)
    }
}

/// Reads consecutive bit fields from a borrowed buffer.
///
/// # Invariants
/// - `position` never exceeds `data.len() * 8`
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// Source data
    data: &'a [u8],
    /// Next bit to read
    position: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at bit 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a reader positioned at an arbitrary bit offset.
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    /// Read `n_bits` as a `T` and advance.
    pub fn read<T: FieldValue>(&mut self, n_bits: usize) -> Result<T> {
        let mut value = T::default();
        self.position += get(self.data, self.position, &mut value, n_bits)?;
        Ok(value)
    }

    /// Read `n_bits` into `dst` and advance.
    pub fn read_bytes(&mut self, dst: &mut [u8], n_bits: usize) -> Result<()> {
        self.position += get_bytes(self.data, self.position, dst, n_bits)?;
        Ok(())
    }

    /// Return the number of bits remaining in the buffer.
    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position)
    }

    /// Return the current bit position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if we're at the end of the buffer.
    pub fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }
}
