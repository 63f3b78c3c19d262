//! Header checks applied to every frame the server sends.
//!
//! These run as soon as the header is decoded, before the payload is
//! buffered, so an oversized or malformed frame is rejected without reading
//! its body.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::frame::FrameHeader;

/// Validator for incoming (server-to-client) frame headers.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    limits: Limits,
}

impl FrameValidator {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Validate a decoded header.
    ///
    /// # Errors
    ///
    /// - `Error::MaskedServerFrame` - servers must not mask (RFC 6455 Section 5.1)
    /// - `Error::ReservedBitsSet` - no extension is negotiated, so RSV bits must be 0
    /// - `Error::FrameTooLarge` - payload exceeds `limits.max_frame_size`
    pub fn validate_incoming(&self, header: &FrameHeader) -> Result<()> {
        if header.mask.is_some() {
            return Err(Error::MaskedServerFrame);
        }
        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::ReservedBitsSet);
        }
        self.limits.check_frame_size(header.payload_len)
    }
}
