//! Power and telemetry readings

use super::enums::{TelemetryName, Unit};
use crate::codec::{FieldDescriptor, FieldKind, Format, GtEnum, Schema, Violation, WireType};
use serde::{Deserialize, Serialize};

/// Current total power draw reported by the SCADA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GsPwr {
    pub power: i64,
}

impl WireType for GsPwr {
    const TYPE_ALIAS: &'static str = "gs.pwr.100";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gs.pwr.100",
            &[FieldDescriptor::required("Power", FieldKind::Int)],
        );
        &SCHEMA
    }
}

/// One scaled telemetry reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtTelemetry {
    pub name: TelemetryName,
    pub value: i64,
    pub exponent: i32,
    pub scada_read_time_unix_ms: i64,
}

impl WireType for GtTelemetry {
    const TYPE_ALIAS: &'static str = "gt.telemetry.110";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gt.telemetry.110",
            &[
                FieldDescriptor::required("Name", FieldKind::Enum(TelemetryName::TABLE)),
                FieldDescriptor::required("Value", FieldKind::Int),
                FieldDescriptor::required("Exponent", FieldKind::Int),
                FieldDescriptor::required("ScadaReadTimeUnixMs", FieldKind::Int)
                    .with_format(Format::ReasonableUnixTimeMs),
            ],
        );
        &SCHEMA
    }
}

/// How a sensor channel reports one kind of telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TelemetryReportingConfig {
    pub report_on_change: bool,
    pub exponent: i32,
    pub about_node_name: String,
    pub sample_period_s: i64,
    pub unit: Unit,
    pub telemetry_name: TelemetryName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_report_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameplate_max_value: Option<i64>,
}

impl WireType for TelemetryReportingConfig {
    const TYPE_ALIAS: &'static str = "telemetry.reporting.config.000";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "telemetry.reporting.config.000",
            &[
                FieldDescriptor::required("ReportOnChange", FieldKind::Bool),
                FieldDescriptor::required("Exponent", FieldKind::Int),
                FieldDescriptor::required("AboutNodeName", FieldKind::Str)
                    .with_format(Format::LeftRightDot),
                FieldDescriptor::required("SamplePeriodS", FieldKind::Int)
                    .with_format(Format::PositiveInteger),
                FieldDescriptor::required("Unit", FieldKind::Enum(Unit::TABLE)),
                FieldDescriptor::required("TelemetryName", FieldKind::Enum(TelemetryName::TABLE)),
                FieldDescriptor::optional("AsyncReportThreshold", FieldKind::Float)
                    .with_format(Format::NonNegative),
                FieldDescriptor::optional("NameplateMaxValue", FieldKind::Int)
                    .with_format(Format::PositiveInteger),
            ],
        );
        &SCHEMA
    }

    fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        if self.report_on_change && self.async_report_threshold.is_none() {
            violations.push(Violation::new(
                "AsyncReportThreshold",
                "required when ReportOnChange is true",
            ));
        }
        if self.async_report_threshold.is_some() && self.nameplate_max_value.is_none() {
            violations.push(Violation::new(
                "NameplateMaxValue",
                "required when AsyncReportThreshold is set",
            ));
        }
        violations
    }
}
