//! Protocol Tests
//!
//! ## Test Scopes
//! - **Framing**: partial frames, several frames per read, the length limit.
//! - **Versioning**: frames from another protocol version are refused.
//! - **Malformed input**: unknown message kinds and garbage bodies.

#[cfg(test)]
mod tests {
    use crate::dataset::SaleRecord;
    use crate::error::ProtocolError;
    use crate::planner::{ChunkId, RowRange};
    use crate::protocol::{
        ChunkPayload, Envelope, FrameCodec, Message, PROTOCOL_VERSION, decode_message,
        encode_message,
    };
    use crate::store::{ChunkMetrics, WorkerId};
    use bytes::{BufMut, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    fn job() -> Message {
        Message::Job {
            chunk_id: ChunkId(3),
            payload: ChunkPayload {
                range: RowRange { start: 30, end: 33 },
                rows: vec![
                    SaleRecord::new(1.5, 2.0),
                    SaleRecord {
                        price: None,
                        quantity: Some(1.0),
                    },
                    SaleRecord {
                        price: Some(4.0),
                        quantity: None,
                    },
                ],
            },
        }
    }

    fn frame(body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32(body.len() as u32);
        buf.extend_from_slice(body);
        buf
    }

    // ============================================================
    // FRAMING
    // ============================================================

    #[test]
    fn test_job_and_result_survive_the_codec() {
        let mut codec = FrameCodec::new(1024 * 1024);
        let result = Message::Result {
            worker_id: WorkerId("w1".into()),
            chunk_id: ChunkId(3),
            metrics: ChunkMetrics {
                rows_processed: 2,
                total_sales: 3.0,
                min_price: 1.5,
                max_price: 4.0,
                avg_price: 2.75,
            },
        };

        let mut buf = BytesMut::new();
        codec.encode(job(), &mut buf).unwrap();
        codec.encode(result.clone(), &mut buf).unwrap();

        // Two frames in one buffer decode in order.
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(job()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(result));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let mut codec = FrameCodec::new(1024);
        let mut full = BytesMut::new();
        codec.encode(Message::GetJob, &mut full).unwrap();

        let mut buf = BytesMut::from(&full[..3]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&full[3..full.len() - 1]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&full[full.len() - 1..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::GetJob));
    }

    #[test]
    fn test_declared_length_over_limit_is_rejected_early() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.put_u32(1_000_000);

        let err = codec.decode(&mut buf).unwrap_err();

        assert!(matches!(
            err,
            ProtocolError::FrameTooLarge {
                len: 1_000_000,
                max: 1024
            }
        ));
    }

    #[test]
    fn test_encoder_refuses_oversized_message() {
        let mut codec = FrameCodec::new(32);
        let mut buf = BytesMut::new();

        let err = codec.encode(job(), &mut buf).unwrap_err();

        assert!(matches!(err, ProtocolError::FrameTooLarge { max: 32, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_payload_bound_covers_encoding() {
        let Message::Job { payload, .. } = job() else {
            unreachable!()
        };
        let rows = payload.rows.len() as u64;
        let body = encode_message(&job()).unwrap();

        assert!(body.len() as u64 <= ChunkPayload::encoded_len_bound(rows));
    }

    // ============================================================
    // VERSIONING & MALFORMED INPUT
    // ============================================================

    #[test]
    fn test_other_version_is_refused() {
        let body = bincode::serialize(&Envelope {
            version: PROTOCOL_VERSION + 1,
            message: Message::GetJob,
        })
        .unwrap();

        let err = decode_message(&body).unwrap_err();

        assert!(matches!(
            err,
            ProtocolError::UnsupportedVersion { found: 2, expected: 1 }
        ));
    }

    #[test]
    fn test_unknown_message_kind_is_malformed() {
        let body = bincode::serialize(&(PROTOCOL_VERSION, 99u32)).unwrap();
        let mut codec = FrameCodec::new(1024);

        let err = codec.decode(&mut frame(&body)).unwrap_err();

        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_garbage_and_empty_bodies_are_malformed() {
        assert!(matches!(
            decode_message(&[]),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_message(&[1, 0, 0xff]),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_after_envelope_are_malformed() {
        let mut body = encode_message(&Message::GetJob).unwrap();
        assert_eq!(decode_message(&body).unwrap(), Message::GetJob);

        body.extend_from_slice(&[0xde, 0xad]);

        assert!(matches!(
            decode_message(&body),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_borrowed_and_owned_envelopes_encode_alike() {
        let owned = bincode::serialize(&Envelope::new(Message::Bye)).unwrap();

        assert_eq!(encode_message(&Message::Bye).unwrap(), owned);
    }
}
