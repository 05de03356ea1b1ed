//! Adaptation layer configuration.
//!
//! Everything the layer needs is in one typed, immutable [`LayerConfig`].
//! [`LayerConfig::validate`] runs at construction so a bad configuration
//! fails before any packet is accepted.

use crate::bitio;
use crate::error::{Error, FragmentError, Result};
use crate::frame::{FrameCodec, FrameHeaderWidths, DEFAULT_DUMMY_CONTENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for one [`AdaptationLayer`](crate::layer::AdaptationLayer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    // === Identity ===
    /// This node's address, sent as `src_id`
    pub node_id: u8,

    // === Sizes ===
    /// Largest frame the transport accepts (PSDU)
    pub max_frame_bytes: usize,

    /// Largest packet, header included, a receiver reassembles
    pub max_packet_bytes: usize,

    /// Zero-fill single and final frames to `max_frame_bytes`
    pub frame_padding: bool,

    // === Timing ===
    /// Minimum gap between two transmitted frames
    pub interframe_period: Duration,

    /// Idle time after which an incomplete packet is dropped
    pub frame_set_validity: Duration,

    // === Header ===
    pub header: FrameHeaderWidths,

    /// Filler for the dummy header field, repeated as needed
    pub dummy_content: String,

    // === Error injection ===
    /// Packet error rate per sender, applied to completed packets
    pub per_table: BTreeMap<u8, f64>,

    /// Seed for the PER draws
    pub per_seed: u64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            max_frame_bytes: 32,
            max_packet_bytes: 2240,
            frame_padding: false,
            interframe_period: Duration::from_millis(100),
            frame_set_validity: Duration::from_secs(60),
            header: FrameHeaderWidths::default(),
            dummy_content: DEFAULT_DUMMY_CONTENT.to_string(),
            per_table: BTreeMap::new(),
            per_seed: 0,
        }
    }
}

impl LayerConfig {
    /// Default configuration for `node_id`.
    pub fn for_node(node_id: u8) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    /// Build the frame codec this configuration describes.
    pub fn frame_codec(&self) -> Result<FrameCodec> {
        FrameCodec::new(self.header, self.dummy_content.as_bytes())
    }

    /// Check the configuration for consistency.
    ///
    /// # Errors
    /// - `CodecError::FieldTooWide` if a header width exceeds its storage
    /// - `FragmentError::HeaderTooLarge` if the header leaves no room for payload
    /// - `Error::Config` for every other inconsistency
    pub fn validate(&self) -> Result<()> {
        let codec = self.frame_codec()?;
        let header_bytes = codec.header_bytes();

        if header_bytes >= self.max_frame_bytes {
            return Err(FragmentError::HeaderTooLarge {
                header_bytes,
                max_frame_bytes: self.max_frame_bytes,
            }
            .into());
        }

        if self.max_packet_bytes <= header_bytes {
            return Err(Error::Config(format!(
                "max_packet_bytes {} must exceed header size {}",
                self.max_packet_bytes, header_bytes
            )));
        }

        if !bitio::fits(self.node_id, self.header.src_id, false) {
            return Err(Error::Config(format!(
                "node_id {} does not fit a {}-bit src_id",
                self.node_id, self.header.src_id
            )));
        }

        if self.frame_set_validity.is_zero() {
            return Err(Error::Config("frame_set_validity must be positive".to_string()));
        }

        for (&src_id, &per) in &self.per_table {
            check_per(src_id, per)?;
        }

        Ok(())
    }
}

/// Reject packet error rates outside `[0, 1]`.
pub(crate) fn check_per(src_id: u8, per: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&per) {
        return Err(Error::Config(format!(
            "packet error rate {} for node {} is outside [0, 1]",
            per, src_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn test_default_is_valid() {
        let config = LayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_codec().unwrap().header_bytes(), 8);
    }

    #[test]
    fn test_header_must_leave_room() {
        let config = LayerConfig {
            max_frame_bytes: 8,
            ..LayerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Fragment(FragmentError::HeaderTooLarge {
                header_bytes: 8,
                max_frame_bytes: 8
            }))
        ));
    }

    #[test]
    fn test_node_id_must_fit() {
        let mut config = LayerConfig::for_node(9);
        config.header.src_id = 3;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.node_id = 7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_range() {
        let mut config = LayerConfig::default();
        config.per_table.insert(2, 0.5);
        assert!(config.validate().is_ok());

        config.per_table.insert(3, 1.5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_header_width_limits() {
        let mut config = LayerConfig::default();
        config.header.pkt_id = 33;
        assert!(matches!(
            config.validate(),
            Err(Error::Codec(CodecError::FieldTooWide { field: "pkt_id", .. }))
        ));
    }

    #[test]
    fn test_zero_validity_rejected() {
        let config = LayerConfig {
            frame_set_validity: Duration::ZERO,
            ..LayerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
