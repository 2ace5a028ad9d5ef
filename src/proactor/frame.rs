//! Topics and the on-the-wire frame
//!
//! Topics follow `{src}/{suffix}`. A suffix of `gw` carries a full frame
//! (`{"Header": {...}, "Payload": {...}}`); any other suffix is a type alias
//! and carries the bare payload object.

use super::message::{now_ns, Header};
use crate::codec::schema::TYPE_ALIAS_KEY;
use crate::codec::CodecError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Suffix of topics that carry framed messages
pub const FRAME_SUFFIX: &str = "gw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub src: String,
    pub suffix: String,
}

impl Topic {
    pub fn parse(topic: &str) -> Result<Self, CodecError> {
        match topic.rsplit_once('/') {
            Some((src, suffix)) if !src.is_empty() && !suffix.is_empty() => Ok(Self {
                src: src.to_string(),
                suffix: suffix.to_string(),
            }),
            _ => Err(CodecError::malformed(format!("bad topic: {topic}"))),
        }
    }

    pub fn is_frame(&self) -> bool {
        self.suffix == FRAME_SUFFIX
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.src, self.suffix)
    }
}

/// Builds the topics a node publishes on
#[derive(Debug, Clone)]
pub struct TopicBuilder {
    src: String,
}

impl TopicBuilder {
    pub fn new<S: Into<String>>(src: S) -> Self {
        Self { src: src.into() }
    }

    pub fn frame(&self) -> String {
        format!("{}/{}", self.src, FRAME_SUFFIX)
    }

    pub fn typed(&self, type_alias: &str) -> String {
        format!("{}/{}", self.src, type_alias)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FrameHeader {
    src: String,
    dst: String,
    message_type: String,
    message_id: String,
    #[serde(default)]
    ack_required: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireFrame {
    header: FrameHeader,
    payload: Value,
}

pub fn encode_frame(header: &Header, payload: Map<String, Value>) -> Result<Vec<u8>, CodecError> {
    let frame = WireFrame {
        header: FrameHeader {
            src: header.src.clone(),
            dst: header.dst.clone(),
            message_type: header.message_type.clone(),
            message_id: header.message_id.to_string(),
            ack_required: header.ack_required,
        },
        payload: Value::Object(payload),
    };
    serde_json::to_vec(&frame).map_err(|e| CodecError::malformed(format!("frame: {e}")))
}

pub fn encode_bare(payload: Map<String, Value>) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&payload).map_err(|e| CodecError::malformed(format!("payload: {e}")))
}

/// A receipt with its header resolved but its payload still untyped
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub header: Header,
    pub type_alias: String,
    pub payload: Value,
}

/// Split a raw receipt into header and payload.
///
/// Bare payloads get a synthesized header: a fresh id, `src` from the topic
/// and `dst` set to the receiving node.
pub fn decode_receipt(topic: &str, bytes: &[u8], node_name: &str) -> Result<Inbound, CodecError> {
    let topic = Topic::parse(topic)?;
    if topic.is_frame() {
        decode_frame(bytes)
    } else {
        decode_bare(&topic, bytes, node_name)
    }
}

fn decode_frame(bytes: &[u8]) -> Result<Inbound, CodecError> {
    let frame: WireFrame = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::malformed(format!("frame: {e}")))?;
    let message_id = Uuid::parse_str(&frame.header.message_id).map_err(|_| {
        CodecError::malformed(format!("frame MessageId is not a uuid: {}", frame.header.message_id))
    })?;
    let type_alias = payload_alias(&frame.payload)?.unwrap_or(&frame.header.message_type);
    if type_alias != frame.header.message_type {
        return Err(CodecError::malformed(format!(
            "frame MessageType {} does not match payload TypeAlias {type_alias}",
            frame.header.message_type
        )));
    }
    let type_alias = type_alias.to_string();

    Ok(Inbound {
        header: Header {
            message_id,
            src: frame.header.src,
            dst: frame.header.dst,
            message_type: frame.header.message_type,
            created_at_ns: now_ns(),
            ack_required: frame.header.ack_required,
        },
        type_alias,
        payload: frame.payload,
    })
}

fn decode_bare(topic: &Topic, bytes: &[u8], node_name: &str) -> Result<Inbound, CodecError> {
    let payload: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::malformed(format!("{}: {e}", topic.suffix)))?;
    let type_alias = payload_alias(&payload)?.unwrap_or(&topic.suffix);
    if type_alias != topic.suffix {
        return Err(CodecError::malformed(format!(
            "topic {topic} carries TypeAlias {type_alias}"
        )));
    }

    Ok(Inbound {
        header: Header::new(topic.src.clone(), node_name, topic.suffix.clone()),
        type_alias: topic.suffix.clone(),
        payload,
    })
}

fn payload_alias(payload: &Value) -> Result<Option<&str>, CodecError> {
    let object = payload
        .as_object()
        .ok_or_else(|| CodecError::malformed("payload is not a JSON object"))?;
    match object.get(TYPE_ALIAS_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(alias)) => Ok(Some(alias)),
        Some(_) => Err(CodecError::malformed("TypeAlias is not a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_frame_round_trip() {
        // Arrange
        let header = Header::new("a.s", "a.d", "gs.pwr.100").with_ack_required(true);
        let payload = json!({"TypeAlias": "gs.pwr.100", "Power": 12})
            .as_object()
            .cloned()
            .unwrap();

        // Act
        let bytes = encode_frame(&header, payload).unwrap();
        let inbound = decode_receipt("a.s/gw", &bytes, "a.d").unwrap();

        // Assert
        assert_eq!(inbound.header.message_id, header.message_id);
        assert_eq!(inbound.header.src, "a.s");
        assert!(inbound.header.ack_required);
        assert_eq!(inbound.type_alias, "gs.pwr.100");
        assert_eq!(inbound.payload["Power"], json!(12));
    }

    #[test]
    fn test_frame_wire_keys() {
        let header = Header::new("a.s", "a.d", "gridworks.ping");
        let payload = json!({"TypeAlias": "gridworks.ping"}).as_object().cloned().unwrap();

        let bytes = encode_frame(&header, payload).unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(raw["Header"]["Src"], json!("a.s"));
        assert_eq!(raw["Header"]["Dst"], json!("a.d"));
        assert_eq!(raw["Header"]["MessageType"], json!("gridworks.ping"));
        assert_eq!(raw["Header"]["AckRequired"], json!(false));
        assert_eq!(raw["Header"]["MessageId"], json!(header.message_id.to_string()));
    }

    #[test]
    fn test_bare_payload_gets_synthesized_header() {
        let inbound =
            decode_receipt("a.scada/gs.pwr.100", br#"{"TypeAlias":"gs.pwr.100","Power":7}"#, "a")
                .unwrap();

        assert_eq!(inbound.header.src, "a.scada");
        assert_eq!(inbound.header.dst, "a");
        assert_eq!(inbound.type_alias, "gs.pwr.100");
        assert!(!inbound.header.ack_required);
    }

    #[test]
    fn test_bare_payload_alias_must_match_topic() {
        let err = decode_receipt("a.scada/gs.pwr.100", br#"{"TypeAlias":"gridworks.ping"}"#, "a")
            .unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(decode_receipt("no-slash", b"{}", "a").is_err());
        assert!(decode_receipt("a.s/gw", b"not json", "a").is_err());
        assert!(decode_receipt("a.s/gs.pwr.100", b"[1,2]", "a").is_err());

        let bad_id = br#"{"Header":{"Src":"a.s","Dst":"a","MessageType":"gridworks.ping","MessageId":"nope"},"Payload":{}}"#;
        assert!(decode_receipt("a.s/gw", bad_id, "a").is_err());
    }

    #[test]
    fn test_topic_builder() {
        let topics = TopicBuilder::new("dw1.isone.ct.newhaven.orange1");
        assert_eq!(topics.frame(), "dw1.isone.ct.newhaven.orange1/gw");
        assert_eq!(topics.typed("gs.pwr.100"), "dw1.isone.ct.newhaven.orange1/gs.pwr.100");
    }

    proptest! {
        #[test]
        fn prop_topic_parse_inverts_builder(src in "[a-z][a-z0-9]{0,8}(\\.[a-z][a-z0-9]{0,8}){0,4}",
                                            alias in "[a-z]{1,8}(\\.[a-z0-9]{1,8}){0,3}") {
            let topic = Topic::parse(&TopicBuilder::new(src.clone()).typed(&alias)).unwrap();
            prop_assert_eq!(topic.src, src);
            prop_assert_eq!(topic.suffix, alias);
        }
    }
}
