//! Hardware component descriptions
//!
//! These carry identity: instances live in a [`crate::codec::Repository`] and
//! their identity fields never change once created.

use super::enums::{LocalCommInterface, MakeModel};
use crate::codec::{FieldDescriptor, FieldKind, Format, GtEnum, Schema, WireType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GtBooleanActuatorComponent {
    pub component_id: String,
    pub component_attribute_class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpio: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_uid: Option<String>,
}

impl WireType for GtBooleanActuatorComponent {
    const TYPE_ALIAS: &'static str = "gt.boolean.actuator.component.100";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gt.boolean.actuator.component.100",
            &[
                FieldDescriptor::required("ComponentId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual)
                    .key(),
                FieldDescriptor::required("ComponentAttributeClassId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual)
                    .immutable(),
                FieldDescriptor::optional("DisplayName", FieldKind::Str),
                FieldDescriptor::optional("Gpio", FieldKind::Int).with_format(Format::NonNegative),
                FieldDescriptor::optional("HwUid", FieldKind::Str).immutable(),
            ],
        );
        &SCHEMA
    }
}

/// Attribute class shared by every electric meter of one make and model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElectricMeterCac {
    pub component_attribute_class_id: String,
    pub make_model: MakeModel,
    pub local_comm_interface: LocalCommInterface,
    pub update_period_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_baud: Option<i64>,
}

impl WireType for ElectricMeterCac {
    const TYPE_ALIAS: &'static str = "gt.electric.meter.cac.100";

    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            "gt.electric.meter.cac.100",
            &[
                FieldDescriptor::required("ComponentAttributeClassId", FieldKind::Str)
                    .with_format(Format::UuidCanonicalTextual)
                    .key(),
                FieldDescriptor::required("MakeModel", FieldKind::Enum(MakeModel::TABLE)).immutable(),
                FieldDescriptor::required(
                    "LocalCommInterface",
                    FieldKind::Enum(LocalCommInterface::TABLE),
                )
                .immutable(),
                FieldDescriptor::required("UpdatePeriodMs", FieldKind::Int)
                    .with_format(Format::NonNegative)
                    .immutable(),
                FieldDescriptor::optional("DisplayName", FieldKind::Str),
                FieldDescriptor::optional("DefaultBaud", FieldKind::Int)
                    .with_format(Format::PositiveInteger)
                    .immutable(),
            ],
        );
        &SCHEMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_component_omits_absent_optionals() {
        // Arrange
        let raw = json!({
            "TypeAlias": "gt.boolean.actuator.component.100",
            "ComponentId": "798fe14a-4073-41eb-bce2-075906aee6bb",
            "ComponentAttributeClassId": "69f101fc-22e4-4caa-8103-50b8aeb66028",
            "Gpio": 0,
        });

        // Act
        let component = GtBooleanActuatorComponent::decode(&raw).unwrap();
        let wire = component.encode().unwrap();

        // Assert
        assert_eq!(component.display_name, None);
        assert_eq!(component.gpio, Some(0));
        assert!(!wire.contains_key("DisplayName"));
        assert!(!wire.contains_key("HwUid"));
        assert_eq!(serde_json::Value::Object(wire), raw);
    }

    #[test]
    fn test_meter_cac_enum_keys() {
        let cac = ElectricMeterCac {
            component_attribute_class_id: "c1f17330-6269-4bc5-aa4b-82e939e9b70c".to_string(),
            make_model: MakeModel::SchneiderelectricIem3455,
            local_comm_interface: LocalCommInterface::Rs485,
            update_period_ms: 1000,
            display_name: None,
            default_baud: Some(9600),
        };
        let wire = cac.encode().unwrap();
        assert_eq!(wire["MakeModelGtEnumSymbol"], json!("d300635e"));
        assert_eq!(wire["LocalCommInterfaceGtEnumSymbol"], json!("a6a4ac9f"));
        assert_eq!(ElectricMeterCac::decode(&serde_json::Value::Object(wire)).unwrap(), cac);
    }
}
