//! Length-prefixed framing.
//!
//! ```text
//! [u32 BE total length, header included][2-byte code][payload]
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::WireMessage;
use bytes::{Buf, BufMut};

/// Size of the length header.
pub const FRAME_HEADER_LEN: usize = 4;

/// Smallest valid frame: header plus a type code.
pub const MIN_FRAME_LEN: usize = FRAME_HEADER_LEN + 2;

/// Allowance for headers and non-data fields on top of the packet size.
pub const FRAME_OVERHEAD: usize = 1024;

/// Largest frame accepted for a given data block size.
pub fn max_frame_len(max_packet_size: usize) -> usize {
    max_packet_size.saturating_add(FRAME_OVERHEAD)
}

/// Encodes a message with its length header.
pub fn encode_frame(message: &WireMessage) -> ProtocolResult<Vec<u8>> {
    let body = message.encode();
    let total = body.len() + FRAME_HEADER_LEN;
    let header = u32::try_from(total).map_err(|_| ProtocolError::FrameTooLarge {
        length: total,
        max: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(total);
    frame.put_u32(header);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Validates a length header and returns the body length that follows it.
pub fn frame_length(header: [u8; FRAME_HEADER_LEN], max: usize) -> ProtocolResult<usize> {
    let total = (&header[..]).get_u32() as usize;
    if total < MIN_FRAME_LEN {
        return Err(ProtocolError::invalid_frame(format!(
            "frame length {total} is below minimum {MIN_FRAME_LEN}"
        )));
    }
    if total > max {
        return Err(ProtocolError::FrameTooLarge { length: total, max });
    }
    Ok(total - FRAME_HEADER_LEN)
}

/// Decodes one complete frame.
pub fn decode_frame(frame: &[u8], max: usize) -> ProtocolResult<WireMessage> {
    let header: [u8; FRAME_HEADER_LEN] = frame
        .get(..FRAME_HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| ProtocolError::invalid_frame("frame shorter than header"))?;
    let body_len = frame_length(header, max)?;
    let body = &frame[FRAME_HEADER_LEN..];
    if body.len() != body_len {
        return Err(ProtocolError::invalid_frame(format!(
            "header announces {body_len} body bytes, got {}",
            body.len()
        )));
    }
    WireMessage::decode(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{FileDataMessage, StatusAck};

    #[test]
    fn header_counts_itself() {
        let frame = encode_frame(&WireMessage::KeepAlive).unwrap();
        assert_eq!(frame, vec![0, 0, 0, 6, b'K', b'A']);
    }

    #[test]
    fn frame_roundtrip() {
        let message = WireMessage::SyncEndAck(StatusAck::failed("x"));
        let frame = encode_frame(&message).unwrap();
        assert_eq!(decode_frame(&frame, 1024).unwrap(), message);
    }

    #[test]
    fn short_frames_rejected() {
        assert!(matches!(
            frame_length([0, 0, 0, 5], 100),
            Err(ProtocolError::InvalidFrame { .. })
        ));
        assert!(decode_frame(&[0, 0], 100).is_err());
    }

    #[test]
    fn oversized_frames_rejected() {
        let message: WireMessage = FileDataMessage {
            relative_path: "big".into(),
            block_number: 0,
            total_blocks: 1,
            data: vec![0u8; 4096],
        }
        .into();
        let frame = encode_frame(&message).unwrap();
        assert!(matches!(
            decode_frame(&frame, max_frame_len(1024)),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
        assert!(decode_frame(&frame, max_frame_len(4096)).is_ok());
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut frame = encode_frame(&WireMessage::StartRestore).unwrap();
        frame.push(0);
        assert!(matches!(
            decode_frame(&frame, 100),
            Err(ProtocolError::InvalidFrame { .. })
        ));
    }
}
