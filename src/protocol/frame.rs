//! Frame parsing and serialization (RFC 6455 Section 5.2).

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Fixed part of a frame header, decoded before the payload is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: usize,
    /// Header length including extended length and masking key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Decode a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` does not yet hold the whole header
    /// - `Error::InvalidOpcode` / `Error::ReservedOpcode` for a bad opcode
    /// - `Error::PayloadTooLargeForPlatform` if the length does not fit in `usize`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let masked = (byte1 & 0x80) != 0;

        let (payload_len, len_end) = match byte1 & 0x7F {
            126 => {
                let bytes = need(buf, 4)?;
                (u16::from_be_bytes([bytes[2], bytes[3]]) as usize, 4)
            }
            127 => {
                let bytes = need(buf, 10)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[2..10]);
                let len = u64::from_be_bytes(raw);
                let len = usize::try_from(len).map_err(|_| Error::PayloadTooLargeForPlatform {
                    size: len,
                    max: usize::MAX as u64,
                })?;
                (len, 10)
            }
            short => (short as usize, 2),
        };

        let (mask, header_len) = if masked {
            let bytes = need(buf, len_end + 4)?;
            let mut key = [0u8; 4];
            key.copy_from_slice(&bytes[len_end..len_end + 4]);
            (Some(key), len_end + 4)
        } else {
            (None, len_end)
        };

        Ok(Self {
            fin: (byte0 & 0x80) != 0,
            rsv1: (byte0 & 0x40) != 0,
            rsv2: (byte0 & 0x20) != 0,
            rsv3: (byte0 & 0x10) != 0,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }
}

fn need(buf: &[u8], len: usize) -> Result<&[u8]> {
    if buf.len() < len {
        Err(Error::IncompleteFrame {
            needed: len - buf.len(),
        })
    } else {
        Ok(buf)
    }
}

/// A single WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                  Masking key (client frames only)             |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse one frame from the start of `buf`, unmasking the payload if needed.
    ///
    /// Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Same as [`FrameHeader::parse`], plus `Error::IncompleteFrame` while the
    /// payload is still arriving.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        let total = header.header_len.checked_add(header.payload_len).ok_or(
            Error::PayloadTooLargeForPlatform {
                size: header.payload_len as u64,
                max: usize::MAX as u64,
            },
        )?;
        need(buf, total)?;

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            payload,
        };
        Ok((frame, total))
    }

    /// Check RFC 6455 structural rules that do not depend on the connection.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV bits are set (no extensions are negotiated)
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control frame payload exceeds 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }

        Ok(())
    }

    /// Serialize the frame into `buf`, masking the payload when `mask` is set.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` if `buf` is shorter than [`Frame::wire_size`].
    pub fn write(&self, buf: &mut [u8], mask: Option<[u8; 4]>) -> Result<usize> {
        let payload_len = self.payload.len();
        let total = self.wire_size(mask.is_some());
        if buf.len() < total {
            return Err(Error::InvalidFrame(format!(
                "Buffer too small: need {} bytes, have {}",
                total,
                buf.len()
            )));
        }

        let mut byte0 = self.opcode.as_u8();
        for (set, bit) in [
            (self.fin, 0x80),
            (self.rsv1, 0x40),
            (self.rsv2, 0x20),
            (self.rsv3, 0x10),
        ] {
            if set {
                byte0 |= bit;
            }
        }
        buf[0] = byte0;
        let mask_bit = if mask.is_some() { 0x80 } else { 0 };

        let mut offset = 2;
        if payload_len <= 125 {
            buf[1] = mask_bit | payload_len as u8;
        } else if payload_len <= usize::from(u16::MAX) {
            buf[1] = mask_bit | 126;
            buf[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
            offset = 4;
        } else {
            buf[1] = mask_bit | 127;
            buf[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
            offset = 10;
        }

        if let Some(key) = mask {
            buf[offset..offset + 4].copy_from_slice(&key);
            offset += 4;
        }

        let body = &mut buf[offset..offset + payload_len];
        body.copy_from_slice(&self.payload);
        if let Some(key) = mask {
            apply_mask(body, key);
        }

        Ok(total)
    }

    /// Number of bytes [`Frame::write`] needs.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended = match payload_len {
            0..=125 => 0,
            126..=65535 => 2,
            _ => 8,
        };
        let mask = if masked { 4 } else { 0 };
        2 + extended + mask + payload_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unmasked_text_frame() {
        let data = &[0x81, 0x05, b'H', b'e', b'l', b'l', b'o'];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 7);
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_masked_text_frame() {
        // RFC 6455 Section 5.7 example
        let data = &[
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 11);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_header_reports_mask_and_length() {
        let data = &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d];
        let header = FrameHeader::parse(data).unwrap();
        assert_eq!(header.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(header.payload_len, 5);
        assert_eq!(header.header_len, 6);
    }

    #[test]
    fn test_parse_extended_length_16() {
        let mut data = vec![0x81, 0x7e, 0x01, 0x00];
        data.extend(vec![b'a'; 256]);
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 260);
        assert_eq!(frame.payload().len(), 256);
    }

    #[test]
    fn test_parse_extended_length_64() {
        let mut data = vec![0x81, 0x7f];
        data.extend(65536u64.to_be_bytes());
        data.extend(vec![b'z'; 65536]);
        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 10 + 65536);
        assert!(frame.payload().iter().all(|&b| b == b'z'));
    }

    #[test]
    fn test_parse_incomplete_reports_missing_bytes() {
        assert!(matches!(
            Frame::parse(&[0x81]),
            Err(Error::IncompleteFrame { needed: 1 })
        ));
        assert!(matches!(
            Frame::parse(&[0x81, 0x05, b'H', b'e', b'l']),
            Err(Error::IncompleteFrame { needed: 2 })
        ));
        assert!(matches!(
            Frame::parse(&[0x81, 0x7e, 0x01]),
            Err(Error::IncompleteFrame { needed: 1 })
        ));
        assert!(matches!(
            Frame::parse(&[0x81, 0x85, 0x37, 0xfa]),
            Err(Error::IncompleteFrame { needed: 2 })
        ));
    }

    #[test]
    fn test_parse_reserved_opcode() {
        assert!(matches!(
            Frame::parse(&[0x83, 0x00]),
            Err(Error::ReservedOpcode(0x03))
        ));
    }

    #[test]
    fn test_huge_declared_length_is_an_error_not_a_panic() {
        let mut data = vec![0x82, 0xFF];
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 0]);
        assert!(Frame::parse(&data).is_err());
    }

    #[test]
    fn test_write_masked_text_frame() {
        let frame = Frame::text("Hello");
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let mut buf = vec![0u8; frame.wire_size(true)];

        let len = frame.write(&mut buf, Some(mask)).unwrap();

        assert_eq!(len, 11);
        assert_eq!(
            buf,
            [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_write_unmasked_extended_length() {
        let frame = Frame::text(vec![b'x'; 300]);
        let mut buf = vec![0u8; frame.wire_size(false)];
        let len = frame.write(&mut buf, None).unwrap();
        assert_eq!(len, 304);
        assert_eq!(&buf[..4], &[0x81, 0x7e, 0x01, 0x2c]);
    }

    #[test]
    fn test_write_buffer_too_small() {
        let frame = Frame::text("Hello");
        let mut buf = vec![0u8; 4];
        assert!(matches!(
            frame.write(&mut buf, None),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_masked_write_parses_back() {
        let original = Frame::text("Hello, WebSocket!");
        let mut buf = vec![0u8; original.wire_size(true)];
        let written = original.write(&mut buf, Some([1, 2, 3, 4])).unwrap();
        let (parsed, consumed) = Frame::parse(&buf).unwrap();
        assert_eq!(consumed, written);
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_wire_size_boundaries() {
        assert_eq!(Frame::text(vec![0; 125]).wire_size(false), 127);
        assert_eq!(Frame::text(vec![0; 126]).wire_size(false), 130);
        assert_eq!(Frame::text(vec![0; 65535]).wire_size(true), 65543);
        assert_eq!(Frame::text(vec![0; 65536]).wire_size(true), 65550);
    }

    #[test]
    fn test_close_frame_payload() {
        let frame = Frame::close(Some(1000), "bye");
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(frame.payload(), &[0x03, 0xe8, b'b', b'y', b'e']);
        assert!(Frame::close(None, "ignored").payload().is_empty());
    }

    #[test]
    fn test_validate_rules() {
        assert!(Frame::text("ok").validate().is_ok());
        assert!(Frame::ping(vec![0u8; 125]).validate().is_ok());

        let mut fragmented_ping = Frame::ping("p");
        fragmented_ping.fin = false;
        assert!(matches!(
            fragmented_ping.validate(),
            Err(Error::FragmentedControlFrame)
        ));

        assert!(matches!(
            Frame::pong(vec![0u8; 126]).validate(),
            Err(Error::ControlFrameTooLarge(126))
        ));

        let mut rsv = Frame::text("x");
        rsv.rsv2 = true;
        assert!(matches!(rsv.validate(), Err(Error::ReservedBitsSet)));
    }
}
