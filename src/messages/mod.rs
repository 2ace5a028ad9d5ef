//! Wire types of the home-heating domain
//!
//! Each type is a plain serde struct plus a static field-descriptor table; the
//! generic engine in [`crate::codec`] does all conversion and validation.

pub mod builtin;
pub mod commands;
pub mod components;
pub mod enums;
pub mod events;
pub mod snapshot;
pub mod status;
pub mod telemetry;

pub use builtin::{Ack, Ping};
pub use commands::{GtDispatchBoolean, GtShCliAtnCmd};
pub use components::{ElectricMeterCac, GtBooleanActuatorComponent};
pub use enums::{ActorClass, LocalCommInterface, MakeModel, ProblemType, TelemetryName, Unit};
pub use events::{Event, GtShStatusEvent, ProblemEvent, SnapshotSpaceheatEvent};
pub use snapshot::{SnapshotSpaceheat, TelemetrySnapshotSpaceheat};
pub use status::{
    GtShBooleanactuatorCmdStatus, GtShMultipurposeTelemetryStatus, GtShSimpleTelemetryStatus,
    GtShStatus,
};
pub use telemetry::{GsPwr, GtTelemetry, TelemetryReportingConfig};

crate::wire_payloads! {
    /// Every domain wire type, for actors that want to accept all of them
    pub enum SpaceheatPayload {
        GsPwr(GsPwr),
        GtTelemetry(GtTelemetry),
        TelemetryReportingConfig(TelemetryReportingConfig),
        GtShStatus(GtShStatus),
        SnapshotSpaceheat(SnapshotSpaceheat),
        GtDispatchBoolean(GtDispatchBoolean),
        GtShCliAtnCmd(GtShCliAtnCmd),
        GtBooleanActuatorComponent(GtBooleanActuatorComponent),
        ElectricMeterCac(ElectricMeterCac),
        ProblemEvent(ProblemEvent),
        GtShStatusEvent(GtShStatusEvent),
        SnapshotSpaceheatEvent(SnapshotSpaceheatEvent),
    }
}
