//! Commands an ATN sends to its SCADA

use crate::codec::{FieldDescriptor, FieldKind, Format, Schema, Violation, WireType};
use serde::{Deserialize, Serialize};

/// Turn one boolean actuator on or off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtDispatchBoolean {
    pub about_node_name: String,
    pub to_g_node_alias: String,
    pub from_g_node_alias: String,
    pub from_g_node_instance_id: String,
    pub relay_state: i64,
    pub send_time_unix_ms: i64,
}

impl WireType for GtDispatchBoolean {
    const TYPE_ALIAS: &'static str = "gt.dispatch.boolean.100";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gt.dispatch.boolean.100",
            &[
                FieldDescriptor::required("AboutNodeName", FieldKind::Str)
                    .with_format(Format::LeftRightDot),
                FieldDescriptor::required("ToGNodeAlias", FieldKind::Str)
                    .with_format(Format::LeftRightDot),
                FieldDescriptor::required("FromGNodeAlias", FieldKind::Str)
                    .with_format(Format::LeftRightDot),
                FieldDescriptor::required("FromGNodeInstanceId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual),
                FieldDescriptor::required("RelayState", FieldKind::Int).with_format(Format::Bit),
                FieldDescriptor::required("SendTimeUnixMs", FieldKind::Int)
                    .with_format(Format::ReasonableUnixTimeMs),
            ],
        );
        &SCHEMA
    }
}

/// Ask the SCADA for a fresh snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtShCliAtnCmd {
    pub from_g_node_alias: String,
    pub from_g_node_id: String,
    pub send_snapshot: bool,
}

impl WireType for GtShCliAtnCmd {
    const TYPE_ALIAS: &'static str = "gt.sh.cli.atn.cmd.110";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gt.sh.cli.atn.cmd.110",
            &[
                FieldDescriptor::required("FromGNodeAlias", FieldKind::Str)
                    .with_format(Format::LeftRightDot),
                FieldDescriptor::required("FromGNodeId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual),
                FieldDescriptor::required("SendSnapshot", FieldKind::Bool),
            ],
        );
        &SCHEMA
    }

    fn validate(&self) -> Vec<Violation> {
        if self.send_snapshot {
            Vec::new()
        } else {
            vec![Violation::new("SendSnapshot", "must be true")]
        }
    }
}
