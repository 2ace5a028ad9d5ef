//! Wire types the dispatch loop handles itself

use crate::codec::{FieldDescriptor, FieldKind, Format, Schema, WireType};
use serde::{Deserialize, Serialize};

/// Application-level acknowledgement of a processed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "AckMessageID")]
    pub ack_message_id: String,
}

impl WireType for Ack {
    const TYPE_ALIAS: &'static str = "gridworks.ack";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gridworks.ack",
            &[FieldDescriptor::required("AckMessageID", FieldKind::Str)
                .with_format(Format::UuidCanonicalTextual)],
        );
        &SCHEMA
    }
}

/// Liveness probe; any traffic from the peer answers it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

impl WireType for Ping {
    const TYPE_ALIAS: &'static str = "gridworks.ping";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new("gridworks.ping", &[]);
        &SCHEMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ack_wire_key() {
        let ack = Ack {
            ack_message_id: "6a2b8c4d-1e2f-4a3b-8c9d-0e1f2a3b4c5d".to_string(),
        };
        let wire = ack.encode().unwrap();
        assert_eq!(
            serde_json::Value::Object(wire),
            json!({"TypeAlias": "gridworks.ack", "AckMessageID": "6a2b8c4d-1e2f-4a3b-8c9d-0e1f2a3b4c5d"})
        );
    }

    #[test]
    fn test_ping_decodes_from_alias_only() {
        assert_eq!(Ping::decode(&json!({"TypeAlias": "gridworks.ping"})).unwrap(), Ping {});
    }
}
