//! Error types for the adaptation layer.
//!
//! All operations return structured errors rather than panicking. Problems the
//! layer can absorb on its own (duplicate fragments, stale frame sets) are not
//! errors at all; they are logged and counted. What remains here is either a
//! configuration mistake or a malformed input handed to us by a caller.

use thiserror::Error;

/// Top-level error type for all operations in the crate.
///
/// Each variant corresponds to a specific failure domain:
/// - Bit I/O: reading/writing bit runs inside bounded byte buffers
/// - Codec: header codecs packing/unpacking logical packets
/// - Frame: adaptation-layer frame encoding/decoding
/// - Fragment: splitting a packed packet into frames
#[derive(Debug, Error)]
pub enum Error {
    /// Bit I/O operation failed (e.g., writing past the end of the buffer)
    #[error("bit I/O error: {0}")]
    BitIo(#[from] BitIoError),

    /// Header codec error (e.g., value does not fit its configured width)
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Frame error (e.g., frame shorter than the adaptation-layer header)
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Fragmentation error (e.g., header cannot fit in one frame)
    #[error("fragmentation error: {0}")]
    Fragment(#[from] FragmentError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Bit-level I/O errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitIoError {
    /// More bits requested than the value's storage type holds
    #[error("invalid bit count: {requested} exceeds storage width {max}")]
    InvalidBitCount { requested: usize, max: usize },

    /// The bit run does not fit inside the buffer
    #[error("bit range {offset}..{end} out of bounds for {capacity} bits")]
    OutOfBounds {
        offset: usize,
        end: usize,
        capacity: usize,
    },

    /// Source slice holds fewer bits than requested
    #[error("insufficient bits: requested {requested}, available {available}")]
    InsufficientBits { requested: usize, available: usize },
}

/// Header codec errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Codec addressed a field index its schema does not have
    #[error("{codec}: no field at index {index}")]
    UnknownField { codec: &'static str, index: usize },

    /// Configured width exceeds the attribute's storage width
    #[error("{codec}.{field}: width {width} exceeds storage width {max}")]
    FieldTooWide {
        codec: &'static str,
        field: &'static str,
        width: usize,
        max: usize,
    },

    /// Value cannot be represented in its configured width
    #[error("{codec}.{field}: value does not fit in {width} bits")]
    ValueOutOfRange {
        codec: &'static str,
        field: &'static str,
        width: usize,
    },

    /// A codec's contribution would overflow the packet buffer
    #[error("{codec}: packed output exceeds buffer of {capacity_bits} bits")]
    PayloadOverflow {
        codec: &'static str,
        capacity_bits: usize,
    },

    /// The packet-kind discriminator carries an unknown value
    #[error("unknown packet kind {0}")]
    UnknownPacketKind(u32),

    /// Reassembled bytes ended before a codec finished reading
    #[error("{codec}: buffer ended before all fields were read")]
    Truncated { codec: &'static str },
}

/// Adaptation-layer frame errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Frame is too short to contain the adaptation-layer header
    #[error("frame too short: need at least {required} bytes, got {actual}")]
    FrameTooShort { required: usize, actual: usize },

    /// Encoded frame exceeds the transmission unit
    #[error("frame size {size} exceeds max frame size {max}")]
    ExceedsMtu { size: usize, max: usize },
}

/// Fragmentation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FragmentError {
    /// Header alone does not fit in a frame
    #[error("header of {header_bytes} bytes cannot fit in max frame size {max_frame_bytes}")]
    HeaderTooLarge {
        header_bytes: usize,
        max_frame_bytes: usize,
    },

    /// More fragments than the frag_offset field can number
    #[error("{needed} fragments needed but frag_offset field allows {max}")]
    TooManyFragments { needed: usize, max: u64 },

    /// Packed packet is larger than a receiver can reassemble
    #[error("packet of {size} bytes exceeds reassembly capacity {max}")]
    PacketTooLarge { size: usize, max: usize },
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;
