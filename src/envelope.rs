//! Decoder for realtime envelopes.
//!
//! Binary frames carry one protobuf `Envelope` whose `payload` is a oneof:
//!
//! ```text
//! message Envelope {
//!   oneof payload {
//!     FriendRequest friend_request = 1;
//!     FriendGameSession friend_game_session = 2;
//!   }
//! }
//! message FriendRequest { string sender_id = 1; }
//! message FriendGameSession { string friend_id = 1; string object_id = 2; }
//! ```
//!
//! Payload kinds this client does not know about are skipped by the decoder
//! and surface as [`Envelope::Unknown`].

use prost::Message;
use std::fmt::{Display, Formatter};

/// A single decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    FriendRequest(FriendRequest),
    FriendGameSession(FriendGameSession),
    /// Absent or unrecognized payload; dispatch ignores it.
    Unknown,
}

impl Envelope {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FriendRequest(_) => "friend_request",
            Self::FriendGameSession(_) => "friend_game_session",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct FriendRequest {
    #[prost(string, tag = "1")]
    pub sender_id: String,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct FriendGameSession {
    #[prost(string, tag = "1")]
    pub friend_id: String,
    #[prost(string, tag = "2")]
    pub object_id: String,
}

/// Wire representation of the envelope.
#[derive(Clone, PartialEq, Message)]
pub(crate) struct WireEnvelope {
    #[prost(oneof = "wire::Payload", tags = "1, 2")]
    pub payload: Option<wire::Payload>,
}

pub(crate) mod wire {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        FriendRequest(super::FriendRequest),
        #[prost(message, tag = "2")]
        FriendGameSession(super::FriendGameSession),
    }
}

/// Errors raised for frames that are not valid envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Bytes are truncated or carry an invalid tag / wire type.
    Malformed { message: String },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { message } => write!(f, "malformed envelope: {}", message),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes one frame payload into an [`Envelope`].
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let wire = WireEnvelope::decode(bytes).map_err(|e| DecodeError::Malformed {
        message: e.to_string(),
    })?;

    Ok(match wire.payload {
        Some(wire::Payload::FriendRequest(payload)) => Envelope::FriendRequest(payload),
        Some(wire::Payload::FriendGameSession(payload)) => Envelope::FriendGameSession(payload),
        None => Envelope::Unknown,
    })
}

/// Encodes an envelope back to wire bytes. `Unknown` encodes as an empty envelope.
#[cfg(test)]
pub(crate) fn encode(envelope: &Envelope) -> Vec<u8> {
    let payload = match envelope {
        Envelope::FriendRequest(p) => Some(wire::Payload::FriendRequest(p.clone())),
        Envelope::FriendGameSession(p) => Some(wire::Payload::FriendGameSession(p.clone())),
        Envelope::Unknown => None,
    };
    WireEnvelope { payload }.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friend_request_bytes() -> Vec<u8> {
        encode(&Envelope::FriendRequest(FriendRequest {
            sender_id: "user-42".to_string(),
        }))
    }

    #[test]
    fn test_decode_friend_request() {
        let envelope = decode(&friend_request_bytes()).unwrap();
        assert_eq!(
            envelope,
            Envelope::FriendRequest(FriendRequest {
                sender_id: "user-42".to_string()
            })
        );
        assert_eq!(envelope.kind(), "friend_request");
    }

    #[test]
    fn test_decode_friend_game_session() {
        let bytes = encode(&Envelope::FriendGameSession(FriendGameSession {
            friend_id: "friend-1".to_string(),
            object_id: "1245620".to_string(),
        }));
        match decode(&bytes).unwrap() {
            Envelope::FriendGameSession(payload) => {
                assert_eq!(payload.friend_id, "friend-1");
                assert_eq!(payload.object_id, "1245620");
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_payload_tag_is_not_an_error() {
        // Field 15, length-delimited, 2 bytes of nested content.
        let bytes = [0x7a, 0x02, 0x0a, 0x00];
        assert_eq!(decode(&bytes).unwrap(), Envelope::Unknown);
    }

    #[test]
    fn test_empty_frame_is_unknown() {
        assert_eq!(decode(&[]).unwrap(), Envelope::Unknown);
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let mut bytes = friend_request_bytes();
        bytes.pop();
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().starts_with("malformed envelope"));
    }

    #[test]
    fn test_invalid_wire_type_is_rejected() {
        // Field 1 with wire type 7, which does not exist.
        assert!(decode(&[0x0f]).is_err());
        // Tag 0 is reserved.
        assert!(decode(&[0x00]).is_err());
    }

    #[test]
    fn test_known_field_with_wrong_wire_type_is_rejected() {
        // Field 1 encoded as a varint instead of a nested message.
        assert!(decode(&[0x08, 0x01]).is_err());
    }
}
