//! Events reported by field nodes for persistence upstream

use super::enums::ProblemType;
use super::snapshot::{SnapshotSpaceheat, SNAPSHOT};
use super::status::{GtShStatus, STATUS};
use crate::codec::{FieldDescriptor, FieldKind, Format, GtEnum, Schema, Violation, WireType};
use serde::{Deserialize, Serialize};

/// Fields every event carries, used to name its file when persisted
pub trait Event: WireType {
    const TYPE_NAME: &'static str;

    fn message_id(&self) -> &str;

    /// Nanoseconds since the Unix epoch
    fn time_ns(&self) -> i64;
}

macro_rules! event_fields {
    () => {
        fn message_id(&self) -> &str {
            &self.message_id
        }

        fn time_ns(&self) -> i64 {
            self.time_ns
        }
    };
}

/// A problem a node wants a human to know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProblemEvent {
    pub message_id: String,
    #[serde(rename = "TimeNS")]
    pub time_ns: i64,
    pub src: String,
    pub problem_type: ProblemType,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Event for ProblemEvent {
    const TYPE_NAME: &'static str = "gridworks.event.problem";
    event_fields!();
}

impl WireType for ProblemEvent {
    const TYPE_ALIAS: &'static str = "gridworks.event.problem.100";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gridworks.event.problem.100",
            &[
                FieldDescriptor::required("MessageId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual)
                    .key(),
                FieldDescriptor::required("TimeNS", FieldKind::Int).with_format(Format::NonNegative),
                FieldDescriptor::required("Src", FieldKind::Str),
                FieldDescriptor::required("ProblemType", FieldKind::Enum(ProblemType::TABLE)),
                FieldDescriptor::required("Summary", FieldKind::Str),
                FieldDescriptor::optional("Details", FieldKind::Str),
            ],
        );
        &SCHEMA
    }
}

/// A slot status, sent as an event so it is persisted as well as processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtShStatusEvent {
    pub message_id: String,
    #[serde(rename = "TimeNS")]
    pub time_ns: i64,
    pub src: String,
    pub status: GtShStatus,
}

impl Event for GtShStatusEvent {
    const TYPE_NAME: &'static str = "gridworks.event.gt.sh.status";
    event_fields!();
}

impl WireType for GtShStatusEvent {
    const TYPE_ALIAS: &'static str = "gridworks.event.gt.sh.status.100";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gridworks.event.gt.sh.status.100",
            &[
                FieldDescriptor::required("MessageId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual)
                    .key(),
                FieldDescriptor::required("TimeNS", FieldKind::Int).with_format(Format::NonNegative),
                FieldDescriptor::required("Src", FieldKind::Str),
                FieldDescriptor::required("Status", FieldKind::Object(&STATUS)),
            ],
        );
        &SCHEMA
    }

    fn validate(&self) -> Vec<Violation> {
        self.status.validate()
    }
}

/// A snapshot, sent as an event so it is persisted as well as processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotSpaceheatEvent {
    pub message_id: String,
    #[serde(rename = "TimeNS")]
    pub time_ns: i64,
    pub src: String,
    pub snap: SnapshotSpaceheat,
}

impl Event for SnapshotSpaceheatEvent {
    const TYPE_NAME: &'static str = "gridworks.event.snapshot.spaceheat";
    event_fields!();
}

impl WireType for SnapshotSpaceheatEvent {
    const TYPE_ALIAS: &'static str = "gridworks.event.snapshot.spaceheat.100";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gridworks.event.snapshot.spaceheat.100",
            &[
                FieldDescriptor::required("MessageId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual)
                    .key(),
                FieldDescriptor::required("TimeNS", FieldKind::Int).with_format(Format::NonNegative),
                FieldDescriptor::required("Src", FieldKind::Str),
                FieldDescriptor::required("Snap", FieldKind::Object(&SNAPSHOT)),
            ],
        );
        &SCHEMA
    }

    fn validate(&self) -> Vec<Violation> {
        self.snap.validate()
    }
}
