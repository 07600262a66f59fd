//! Tokio codec for framed protocol messages
//!
//! Frame layout (big-endian):
//!
//! ```text
//! +---------+--------------+------------+----------------+=========+
//! | version | message_type | request_id | payload_length | payload |
//! |   u8    |      u8      |    u32     |      u32       | bincode |
//! +---------+--------------+------------+----------------+=========+
//! ```
//!
//! The decoder is stateless: it inspects the buffered header, rejects bad
//! versions, unknown type tags, and oversized lengths before consuming
//! anything, and only splits the frame off once the whole payload has
//! arrived. The header's type tag is cross-checked against the decoded
//! message so a desynchronized peer fails loudly instead of delivering a
//! mislabeled message.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::message::Message;
use crate::request::RequestId;

/// Wire format version; bumped on incompatible layout changes
pub const WIRE_VERSION: u8 = 1;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 10;

/// Maximum payload size accepted on encode and decode
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

/// A complete frame with correlation id and message
#[derive(Debug, Clone)]
pub struct Frame {
    /// Request this frame belongs to
    pub request_id: RequestId,
    /// The message payload
    pub message: Message,
}

impl Frame {
    /// Create a new frame
    pub fn new(request_id: RequestId, message: Message) -> Self {
        Self {
            request_id,
            message,
        }
    }
}

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Validate the header in place before consuming any bytes
        let version = src[0];
        if version != WIRE_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let tag = src[1];
        if crate::message::MessageType::from_u8(tag).is_none() {
            return Err(ProtocolError::UnknownMessageType(tag));
        }
        let payload_len = u32::from_be_bytes([src[6], src[7], src[8], src[9]]) as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let frame_len = HEADER_SIZE + payload_len;
        if src.len() < frame_len {
            // Ask for the rest of the frame in one allocation
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut header = src.split_to(HEADER_SIZE);
        header.advance(2); // version and tag already validated
        let request_id = RequestId::new(header.get_u32());

        let payload = src.split_to(payload_len).freeze();
        let message: Message = bincode::deserialize(&payload)?;

        let body_tag = message.message_type().as_u8();
        if body_tag != tag {
            return Err(ProtocolError::TypeTagMismatch {
                header: tag,
                body: body_tag,
            });
        }

        Ok(Some(Frame {
            request_id,
            message,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(&frame.message)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u8(WIRE_VERSION);
        dst.put_u8(frame.message.message_type().as_u8());
        dst.put_u32(frame.request_id.as_u32());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ServiceSpec;

    fn encode_frame(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_codec_roundtrip() {
        let frame = Frame::new(
            RequestId::new(1),
            Message::Call {
                service: "knowledge".to_string(),
                method: "query".to_string(),
                payload: r#"{"query":"rust"}"#.to_string(),
            },
        );

        let mut buf = encode_frame(frame.clone());
        let decoded = FrameCodec::new().decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.request_id, frame.request_id);
        if let Message::Call {
            service, method, ..
        } = decoded.message
        {
            assert_eq!(service, "knowledge");
            assert_eq!(method, "query");
        } else {
            panic!("Expected Call message");
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_service_list() {
        let frame = Frame::new(
            RequestId::new(42),
            Message::ServiceList {
                services: vec![ServiceSpec {
                    name: "learning".to_string(),
                    status: "available".to_string(),
                    methods: vec!["learnFromUrl".to_string(), "getStats".to_string()],
                    metadata: "{}".to_string(),
                }],
            },
        );

        let mut buf = encode_frame(frame);
        let decoded = FrameCodec::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.request_id, RequestId::new(42));

        if let Message::ServiceList { services } = decoded.message {
            assert_eq!(services.len(), 1);
            assert_eq!(services[0].name, "learning");
            assert_eq!(services[0].methods.len(), 2);
        } else {
            panic!("Expected ServiceList message");
        }
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();
        let full = encode_frame(Frame::new(RequestId::new(1), Message::Ping { timestamp: 12345 }));

        // Mid-header: nothing decoded, nothing consumed
        let mut buf = BytesMut::from(&full[..HEADER_SIZE - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE - 1);

        // Mid-payload: header stays buffered until the payload completes
        buf.extend_from_slice(&full[HEADER_SIZE - 1..full.len() - 2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[full.len() - 2..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        if let Message::Ping { timestamp } = decoded.message {
            assert_eq!(timestamp, 12345);
        } else {
            panic!("Expected Ping message");
        }
    }

    #[test]
    fn test_unsupported_version() {
        let mut buf = encode_frame(Frame::new(RequestId::new(1), Message::Ping { timestamp: 0 }));
        buf[0] = WIRE_VERSION + 1;

        let result = FrameCodec::new().decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedVersion(v)) if v == WIRE_VERSION + 1
        ));
    }

    #[test]
    fn test_unknown_type_tag() {
        let mut buf = encode_frame(Frame::new(RequestId::new(1), Message::Ping { timestamp: 0 }));
        buf[1] = 0xFE;

        let result = FrameCodec::new().decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownMessageType(0xFE))
        ));
    }

    #[test]
    fn test_tag_body_mismatch() {
        // A Pong body labeled as a Ping in the header
        let mut buf = encode_frame(Frame::new(RequestId::new(1), Message::Pong { timestamp: 7 }));
        buf[1] = Message::Ping { timestamp: 0 }.message_type().as_u8();

        let result = FrameCodec::new().decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::TypeTagMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversize_length() {
        // Hand-built header claiming a payload beyond the cap
        let mut buf = BytesMut::new();
        buf.put_u8(WIRE_VERSION);
        buf.put_u8(Message::ListServices.message_type().as_u8());
        buf.put_u32(1);
        buf.put_u32((MAX_PAYLOAD_SIZE + 1) as u32);

        let result = FrameCodec::new().decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let frame = Frame::new(
            RequestId::new(1),
            Message::CallResult {
                payload: "x".repeat(MAX_PAYLOAD_SIZE + 1),
            },
        );

        let mut buf = BytesMut::new();
        let result = FrameCodec::new().encode(frame, &mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Frame::new(RequestId::new(1), Message::Ping { timestamp: 1 }),
                &mut buf,
            )
            .unwrap();
        codec
            .encode(
                Frame::new(RequestId::new(2), Message::Ping { timestamp: 2 }),
                &mut buf,
            )
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.request_id, RequestId::new(1));
        assert_eq!(second.request_id, RequestId::new(2));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
