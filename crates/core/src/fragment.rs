//! Splitting packed packets into frames.
//!
//! # Algorithm
//!
//! With `capacity = max_frame_bytes - header_bytes`:
//!
//! 1. A payload that fits next to one header goes out as a single frame with
//!    `frag_offset = 0` and `more_fragments = false`.
//! 2. Otherwise the payload is cut into `floor(len / capacity)` full frames
//!    numbered `0, 1, ...`, followed by one frame carrying the remainder if it
//!    is non-zero.
//! 3. Exactly one frame per packet has `more_fragments = false`: the remainder
//!    frame, or the last full frame when the payload divides evenly. That frame
//!    tells the receiver the packet's total length.
//!
//! Frame `i` always carries payload bytes starting at `i * capacity`, which is
//! what the receiver relies on to place it.
//!
//! # Padding
//!
//! With padding enabled the single frame, or the final fragment, is
//! zero-filled so every frame on the link is the same size. The padding is
//! part of the payload as far as the receiver is concerned.

use crate::error::{FragmentError, FrameError, Result};
use crate::frame::{Frame, FrameCodec, FrameHeader};

/// Cuts packed packets into frames no larger than `max_frame_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragmenter {
    /// Largest encoded frame the transport accepts (PSDU)
    max_frame_bytes: usize,

    /// Largest packet, header included, a receiver can reassemble
    max_packet_bytes: usize,

    /// Zero-fill the final frame up to the frame size
    padding: bool,
}

impl Fragmenter {
    pub fn new(max_frame_bytes: usize, max_packet_bytes: usize, padding: bool) -> Self {
        Self {
            max_frame_bytes,
            max_packet_bytes,
            padding,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Payload bytes each frame carries for the given header size.
    pub fn frame_payload_capacity(&self, header_bytes: usize) -> usize {
        self.max_frame_bytes.saturating_sub(header_bytes)
    }

    /// Largest payload a receiver can reassemble for the given header size.
    pub fn max_payload_bytes(&self, header_bytes: usize) -> usize {
        self.max_packet_bytes.saturating_sub(header_bytes)
    }

    /// Bytes a receiver must be able to buffer per frame set.
    ///
    /// With padding on, the last frame of a maximum size payload is filled
    /// up to the frame capacity, so the buffer is rounded up to a whole
    /// number of frames.
    pub fn reassembly_limit(&self, header_bytes: usize) -> usize {
        let max_payload = self.max_payload_bytes(header_bytes);
        let capacity = self.frame_payload_capacity(header_bytes);
        if !self.padding || capacity == 0 {
            return max_payload;
        }
        max_payload.div_ceil(capacity) * capacity
    }

    /// Split `payload` into frames addressed `(src_id, pkt_id)`.
    ///
    /// # Returns
    /// Frames in `frag_offset` order, ready to be queued for transmission.
    ///
    /// # Errors
    /// - `FragmentError::HeaderTooLarge` if the header leaves no room in a frame
    /// - `FragmentError::PacketTooLarge` if the receiver could not hold the payload
    /// - `FragmentError::TooManyFragments` if the `frag_offset` field cannot
    ///   number every frame
    pub fn fragment(&self, codec: &FrameCodec, src_id: u8, pkt_id: u32, payload: &[u8]) -> Result<Vec<Frame>> {
        let header_bytes = codec.header_bytes();
        let header_too_large = FragmentError::HeaderTooLarge {
            header_bytes,
            max_frame_bytes: self.max_frame_bytes,
        };

        if header_bytes > self.max_frame_bytes {
            return Err(header_too_large.into());
        }

        let max_payload = self.max_payload_bytes(header_bytes);
        if payload.len() > max_payload {
            return Err(FragmentError::PacketTooLarge {
                size: payload.len(),
                max: max_payload,
            }
            .into());
        }

        let header = |frag_offset: u32, more_fragments: bool| FrameHeader {
            src_id,
            pkt_id,
            frag_offset,
            more_fragments,
        };

        // Single frame
        if header_bytes + payload.len() <= self.max_frame_bytes {
            let size = if self.padding {
                self.max_frame_bytes - header_bytes
            } else {
                payload.len()
            };
            return Ok(vec![Frame::new(header(0, false), padded(payload, size))]);
        }

        let capacity = self.frame_payload_capacity(header_bytes);
        if capacity == 0 {
            return Err(header_too_large.into());
        }

        let full = payload.len() / capacity;
        let remainder = payload.len() % capacity;
        let needed = full + usize::from(remainder > 0);

        if needed as u64 > codec.max_fragments() {
            return Err(FragmentError::TooManyFragments {
                needed,
                max: codec.max_fragments(),
            }
            .into());
        }

        let mut frames = Vec::with_capacity(needed);
        for (i, chunk) in payload.chunks(capacity).enumerate() {
            let last = i + 1 == needed;
            let data = if last && self.padding {
                padded(chunk, capacity)
            } else {
                chunk.to_vec()
            };

            // `needed` fits the frag_offset field, which is at most 32 bits wide
            let frag_offset = u32::try_from(i).map_err(|_| FragmentError::TooManyFragments {
                needed,
                max: codec.max_fragments(),
            })?;

            let frame = Frame::new(header(frag_offset, !last), data);
            let size = frame.encoded_len(header_bytes);
            if size > self.max_frame_bytes {
                return Err(FrameError::ExceedsMtu {
                    size,
                    max: self.max_frame_bytes,
                }
                .into());
            }
            frames.push(frame);
        }

        tracing::trace!(src_id, pkt_id, frames = frames.len(), bytes = payload.len(), "fragmented packet");
        Ok(frames)
    }
}

fn padded(data: &[u8], size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size.max(data.len()));
    out.extend_from_slice(data);
    out.resize(size.max(data.len()), 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::frame::FrameHeaderWidths;

    /// 8 + 32 + 7 + 1 = 48 bits, a 6-byte header
    fn six_byte_codec() -> FrameCodec {
        let widths = FrameHeaderWidths {
            src_id: 8,
            pkt_id: 32,
            frag_offset: 7,
            more_fragments: 1,
            dummy: 0,
        };
        FrameCodec::new(widths, b"").unwrap()
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_psdu_32_payload_70() {
        let codec = six_byte_codec();
        assert_eq!(codec.header_bytes(), 6);

        let fragmenter = Fragmenter::new(32, 2240, false);
        let data = payload(70);
        let frames = fragmenter.fragment(&codec, 1, 42, &data).unwrap();

        let sizes: Vec<usize> = frames.iter().map(|f| f.payload.len()).collect();
        assert_eq!(sizes, vec![26, 26, 18]);

        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.header.src_id, 1);
            assert_eq!(frame.header.pkt_id, 42);
            assert_eq!(frame.header.frag_offset, i as u32);
            assert_eq!(frame.header.more_fragments, i < 2);
            assert!(frame.encoded_len(6) <= 32);
        }

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.payload.clone()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_single_frame_boundary() {
        let codec = six_byte_codec();
        let fragmenter = Fragmenter::new(32, 2240, false);

        let frames = fragmenter.fragment(&codec, 1, 0, &payload(26)).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_last());
        assert_eq!(frames[0].header.frag_offset, 0);

        let frames = fragmenter.fragment(&codec, 1, 0, &payload(27)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.len(), 26);
        assert_eq!(frames[1].payload.len(), 1);
        assert!(!frames[0].is_last());
        assert!(frames[1].is_last());
    }

    #[test]
    fn test_even_split_marks_last_full_frame() {
        let codec = six_byte_codec();
        let fragmenter = Fragmenter::new(32, 2240, false);

        let frames = fragmenter.fragment(&codec, 1, 0, &payload(78)).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.payload.len() == 26));
        assert_eq!(
            frames.iter().map(|f| f.header.more_fragments).collect::<Vec<_>>(),
            vec![true, true, false]
        );
    }

    #[test]
    fn test_empty_payload() {
        let codec = six_byte_codec();
        let frames = Fragmenter::new(32, 2240, false)
            .fragment(&codec, 1, 0, &[])
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
        assert!(frames[0].is_last());
    }

    #[test]
    fn test_padding() {
        let codec = six_byte_codec();
        let fragmenter = Fragmenter::new(32, 2240, true);

        let single = fragmenter.fragment(&codec, 1, 0, &payload(10)).unwrap();
        assert_eq!(single[0].payload.len(), 26);
        assert_eq!(&single[0].payload[..10], &payload(10)[..]);
        assert!(single[0].payload[10..].iter().all(|&b| b == 0));

        let multi = fragmenter.fragment(&codec, 1, 0, &payload(70)).unwrap();
        assert!(multi.iter().all(|f| f.encoded_len(6) == 32));
    }

    #[test]
    fn test_reassembly_limit_covers_padding() {
        // capacity 26, max payload 54 -> three frames
        let padded = Fragmenter::new(32, 60, true);
        assert_eq!(padded.reassembly_limit(6), 78);
        let frames = padded.fragment(&six_byte_codec(), 1, 0, &payload(54)).unwrap();
        let end = frames.last().map(|f| f.header.frag_offset as usize * 26 + f.payload.len());
        assert_eq!(end, Some(78));

        // Smaller than one frame: the single padded frame is the limit
        assert_eq!(Fragmenter::new(32, 20, true).reassembly_limit(6), 26);
        assert_eq!(Fragmenter::new(32, 60, false).reassembly_limit(6), 54);
    }

    #[test]
    fn test_header_too_large() {
        let codec = six_byte_codec();
        let result = Fragmenter::new(5, 2240, false).fragment(&codec, 1, 0, &payload(1));
        assert!(matches!(
            result,
            Err(Error::Fragment(FragmentError::HeaderTooLarge {
                header_bytes: 6,
                max_frame_bytes: 5
            }))
        ));

        // Header exactly fills the frame: only an empty payload fits
        let fragmenter = Fragmenter::new(6, 2240, false);
        assert!(fragmenter.fragment(&codec, 1, 0, &[]).is_ok());
        assert!(matches!(
            fragmenter.fragment(&codec, 1, 0, &payload(1)),
            Err(Error::Fragment(FragmentError::HeaderTooLarge { .. }))
        ));
    }

    #[test]
    fn test_packet_too_large() {
        let codec = six_byte_codec();
        let fragmenter = Fragmenter::new(32, 100, false);

        assert!(fragmenter.fragment(&codec, 1, 0, &payload(94)).is_ok());
        assert!(matches!(
            fragmenter.fragment(&codec, 1, 0, &payload(95)),
            Err(Error::Fragment(FragmentError::PacketTooLarge { size: 95, max: 94 }))
        ));
    }

    #[test]
    fn test_too_many_fragments() {
        let widths = FrameHeaderWidths {
            frag_offset: 1,
            ..FrameHeaderWidths::default()
        };
        let codec = FrameCodec::new(widths, b"").unwrap();
        // 8 + 32 + 1 + 1 = 42 bits, 6 bytes
        let fragmenter = Fragmenter::new(16, 2240, false);

        assert_eq!(fragmenter.fragment(&codec, 1, 0, &payload(20)).unwrap().len(), 2);
        assert!(matches!(
            fragmenter.fragment(&codec, 1, 0, &payload(21)),
            Err(Error::Fragment(FragmentError::TooManyFragments { needed: 3, max: 2 }))
        ));
    }
}
