//! Periodic status reports sent from the SCADA to its ATN

use super::enums::TelemetryName;
use crate::codec::{
    same_length, DefaultValue, FieldDescriptor, FieldKind, Format, GtEnum, Schema, Violation,
    WireType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtShSimpleTelemetryStatus {
    pub sh_node_alias: String,
    pub telemetry_name: TelemetryName,
    pub value_list: Vec<i64>,
    pub read_time_unix_ms_list: Vec<i64>,
}

static SIMPLE_TELEMETRY_STATUS: Schema = Schema::new(
    "gt.sh.simple.telemetry.status.100",
    &[
        FieldDescriptor::required("ShNodeAlias", FieldKind::Str)
            .with_format(Format::LeftRightDot),
        FieldDescriptor::required("TelemetryName", FieldKind::Enum(TelemetryName::TABLE)),
        FieldDescriptor::required("ValueList", FieldKind::IntList),
        FieldDescriptor::required("ReadTimeUnixMsList", FieldKind::IntList)
            .with_format(Format::ReasonableUnixTimeMs),
    ],
);

impl WireType for GtShSimpleTelemetryStatus {
    const TYPE_ALIAS: &'static str = "gt.sh.simple.telemetry.status.100";

    fn schema() -> &'static Schema {
        &SIMPLE_TELEMETRY_STATUS
    }

    fn validate(&self) -> Vec<Violation> {
        same_length(
            "ValueList",
            &[self.value_list.len(), self.read_time_unix_ms_list.len()],
        )
        .into_iter()
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtShBooleanactuatorCmdStatus {
    pub sh_node_alias: String,
    pub relay_state_command_list: Vec<i64>,
    pub command_time_unix_ms_list: Vec<i64>,
}

static BOOLEANACTUATOR_CMD_STATUS: Schema = Schema::new(
    "gt.sh.booleanactuator.cmd.status.100",
    &[
        FieldDescriptor::required("ShNodeAlias", FieldKind::Str)
            .with_format(Format::LeftRightDot),
        FieldDescriptor::required("RelayStateCommandList", FieldKind::IntList)
            .with_format(Format::Bit),
        FieldDescriptor::required("CommandTimeUnixMsList", FieldKind::IntList)
            .with_format(Format::ReasonableUnixTimeMs),
    ],
);

impl WireType for GtShBooleanactuatorCmdStatus {
    const TYPE_ALIAS: &'static str = "gt.sh.booleanactuator.cmd.status.100";

    fn schema() -> &'static Schema {
        &BOOLEANACTUATOR_CMD_STATUS
    }

    fn validate(&self) -> Vec<Violation> {
        same_length(
            "RelayStateCommandList",
            &[
                self.relay_state_command_list.len(),
                self.command_time_unix_ms_list.len(),
            ],
        )
        .into_iter()
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtShMultipurposeTelemetryStatus {
    pub about_node_alias: String,
    pub sensor_node_alias: String,
    pub telemetry_name: TelemetryName,
    pub value_list: Vec<i64>,
    pub read_time_unix_ms_list: Vec<i64>,
}

static MULTIPURPOSE_TELEMETRY_STATUS: Schema = Schema::new(
    "gt.sh.multipurpose.telemetry.status.100",
    &[
        FieldDescriptor::required("AboutNodeAlias", FieldKind::Str)
            .with_format(Format::LeftRightDot),
        FieldDescriptor::required("SensorNodeAlias", FieldKind::Str),
        FieldDescriptor::required("TelemetryName", FieldKind::Enum(TelemetryName::TABLE)),
        FieldDescriptor::required("ValueList", FieldKind::IntList),
        FieldDescriptor::required("ReadTimeUnixMsList", FieldKind::IntList)
            .with_format(Format::ReasonableUnixTimeMs),
    ],
);

impl WireType for GtShMultipurposeTelemetryStatus {
    const TYPE_ALIAS: &'static str = "gt.sh.multipurpose.telemetry.status.100";

    fn schema() -> &'static Schema {
        &MULTIPURPOSE_TELEMETRY_STATUS
    }

    fn validate(&self) -> Vec<Violation> {
        same_length(
            "ValueList",
            &[self.value_list.len(), self.read_time_unix_ms_list.len()],
        )
        .into_iter()
        .collect()
    }
}

/// Status for one reporting slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtShStatus {
    pub from_g_node_alias: String,
    pub from_g_node_id: String,
    pub about_g_node_alias: String,
    pub slot_start_unix_s: i64,
    pub reporting_period_s: i64,
    pub status_uid: String,
    pub simple_telemetry_list: Vec<GtShSimpleTelemetryStatus>,
    pub booleanactuator_cmd_list: Vec<GtShBooleanactuatorCmdStatus>,
    pub multipurpose_telemetry_list: Vec<GtShMultipurposeTelemetryStatus>,
}

pub(super) static STATUS: Schema = Schema::new(
    "gt.sh.status.100",
    &[
        FieldDescriptor::required("FromGNodeAlias", FieldKind::Str)
            .with_format(Format::LeftRightDot),
        FieldDescriptor::required("FromGNodeId", FieldKind::Str)
            .with_format(Format::UuidCanonicalTextual),
        FieldDescriptor::required("AboutGNodeAlias", FieldKind::Str)
            .with_format(Format::LeftRightDot),
        FieldDescriptor::required("SlotStartUnixS", FieldKind::Int)
            .with_format(Format::ReasonableUnixTimeS),
        FieldDescriptor::defaulted("ReportingPeriodS", FieldKind::Int, DefaultValue::Int(300))
            .with_format(Format::PositiveInteger),
        FieldDescriptor::required("StatusUid", FieldKind::Str)
            .with_format(Format::UuidCanonicalTextual),
        FieldDescriptor::defaulted(
            "SimpleTelemetryList",
            FieldKind::ObjectList(&SIMPLE_TELEMETRY_STATUS),
            DefaultValue::EmptyList,
        ),
        FieldDescriptor::defaulted(
            "BooleanactuatorCmdList",
            FieldKind::ObjectList(&BOOLEANACTUATOR_CMD_STATUS),
            DefaultValue::EmptyList,
        ),
        FieldDescriptor::defaulted(
            "MultipurposeTelemetryList",
            FieldKind::ObjectList(&MULTIPURPOSE_TELEMETRY_STATUS),
            DefaultValue::EmptyList,
        ),
    ],
);

impl WireType for GtShStatus {
    const TYPE_ALIAS: &'static str = "gt.sh.status.100";

    fn schema() -> &'static Schema {
        &STATUS
    }

    fn validate(&self) -> Vec<Violation> {
        let mut violations: Vec<Violation> = Vec::new();
        violations.extend(self.simple_telemetry_list.iter().flat_map(|s| s.validate()));
        violations.extend(self.booleanactuator_cmd_list.iter().flat_map(|s| s.validate()));
        violations.extend(self.multipurpose_telemetry_list.iter().flat_map(|s| s.validate()));
        violations
    }
}
