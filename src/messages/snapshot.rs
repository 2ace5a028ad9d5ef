//! Point-in-time snapshot of every reading a SCADA knows about

use super::enums::TelemetryName;
use crate::codec::{
    same_length, FieldDescriptor, FieldKind, Format, GtEnum, Schema, Violation, WireType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TelemetrySnapshotSpaceheat {
    pub report_time_unix_ms: i64,
    pub about_node_alias_list: Vec<String>,
    pub value_list: Vec<i64>,
    pub telemetry_name_list: Vec<TelemetryName>,
}

static TELEMETRY_SNAPSHOT: Schema = Schema::new(
    "telemetry.snapshot.spaceheat.100",
    &[
        FieldDescriptor::required("ReportTimeUnixMs", FieldKind::Int)
            .with_format(Format::ReasonableUnixTimeMs),
        FieldDescriptor::required("AboutNodeAliasList", FieldKind::StrList)
            .with_format(Format::LeftRightDot),
        FieldDescriptor::required("ValueList", FieldKind::IntList),
        FieldDescriptor::required("TelemetryNameList", FieldKind::EnumList(TelemetryName::TABLE)),
    ],
);

impl WireType for TelemetrySnapshotSpaceheat {
    const TYPE_ALIAS: &'static str = "telemetry.snapshot.spaceheat.100";

    fn schema() -> &'static Schema {
        &TELEMETRY_SNAPSHOT
    }

    fn validate(&self) -> Vec<Violation> {
        same_length(
            "AboutNodeAliasList",
            &[
                self.about_node_alias_list.len(),
                self.value_list.len(),
                self.telemetry_name_list.len(),
            ],
        )
        .into_iter()
        .collect()
    }
}

impl TelemetrySnapshotSpaceheat {
    /// Indices whose alias and telemetry name both match
    pub fn indices_of(&self, alias: &str, name: TelemetryName) -> Vec<usize> {
        self.about_node_alias_list
            .iter()
            .zip(&self.telemetry_name_list)
            .enumerate()
            .filter(|(_, (a, n))| a.as_str() == alias && **n == name)
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotSpaceheat {
    pub from_g_node_alias: String,
    pub from_g_node_instance_id: String,
    pub snapshot: TelemetrySnapshotSpaceheat,
}

pub(super) static SNAPSHOT: Schema = Schema::new(
    "snapshot.spaceheat.100",
    &[
        FieldDescriptor::required("FromGNodeAlias", FieldKind::Str)
            .with_format(Format::LeftRightDot),
        FieldDescriptor::required("FromGNodeInstanceId", FieldKind::Str)
            .with_format(Format::UuidCanonicalTextual),
        FieldDescriptor::required("Snapshot", FieldKind::Object(&TELEMETRY_SNAPSHOT)),
    ],
);

impl WireType for SnapshotSpaceheat {
    const TYPE_ALIAS: &'static str = "snapshot.spaceheat.100";

    fn schema() -> &'static Schema {
        &SNAPSHOT
    }

    fn validate(&self) -> Vec<Violation> {
        self.snapshot.validate()
    }
}
