pub mod domain;
pub mod error;
pub mod protocol;

#[cfg(test)]
mod tests {
    use super::{
        domain::{is_object_id, MemberId, RoomKey},
        error::{ApiError, ErrorCode},
        protocol::ChannelEvent,
    };

    #[test]
    fn object_id_requires_exactly_24_hex_chars() {
        assert!(is_object_id("65f1a2b3c4d5e6f7a8b9c0d1"));
        assert!(!is_object_id("65f1a2b3c4d5e6f7a8b9c0d"));
        assert!(!is_object_id("65f1a2b3c4d5e6f7a8b9c0d1f"));
        assert!(!is_object_id("zzf1a2b3c4d5e6f7a8b9c0d1"));
    }

    #[test]
    fn channel_event_uses_tagged_snake_case_encoding() {
        let raw = r#"{"type":"message_deleted","payload":{"room":{"classroom_id":"c1","lesson_id":"l1"},"message_id":"x1"}}"#;
        let event: ChannelEvent = serde_json::from_str(raw).expect("event");
        match event {
            ChannelEvent::MessageDeleted { room, message_id } => {
                assert_eq!(room, RoomKey::lesson("c1", "l1"));
                assert_eq!(message_id.as_str(), "x1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn classroom_room_omits_lesson_id() {
        let json = serde_json::to_string(&RoomKey::classroom("c1")).expect("json");
        assert_eq!(json, r#"{"classroom_id":"c1"}"#);
        assert_eq!(MemberId::from("m1").to_string(), "m1");
    }

    #[test]
    fn error_envelope_decodes_from_channel_event() {
        let raw = r#"{"type":"error","payload":{"code":"rate_limited","message":"slow down"}}"#;
        let event: ChannelEvent = serde_json::from_str(raw).expect("event");
        match event {
            ChannelEvent::Error(err) => {
                assert_eq!(err, ApiError::new(ErrorCode::RateLimited, "slow down"));
                assert!(err.code.is_transient());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn status_codes_map_to_error_codes() {
        assert_eq!(ErrorCode::from_status(403), ErrorCode::Forbidden);
        assert_eq!(ErrorCode::from_status(422), ErrorCode::Validation);
        assert_eq!(ErrorCode::from_status(503), ErrorCode::Internal);
        assert!(!ErrorCode::Forbidden.is_transient());
    }
}
