//! Codec behavior across the domain wire types
//!
//! Decoding what was encoded must give back the same value, for every valid
//! value; malformed input must be reported precisely.

use proptest::prelude::*;
use serde_json::json;
use spaceheat_proactor::codec::{CodecError, Repository, WirePayload, WireType};
use spaceheat_proactor::messages::{
    ElectricMeterCac, GsPwr, GtBooleanActuatorComponent, GtDispatchBoolean, GtShBooleanactuatorCmdStatus,
    GtShCliAtnCmd, GtShMultipurposeTelemetryStatus, GtShSimpleTelemetryStatus, GtShStatus, GtTelemetry,
    LocalCommInterface, MakeModel, ProblemEvent, ProblemType, SnapshotSpaceheat, SpaceheatPayload,
    TelemetryName, TelemetryReportingConfig, TelemetrySnapshotSpaceheat, Unit,
};

fn telemetry_name() -> impl Strategy<Value = TelemetryName> {
    prop_oneof![
        Just(TelemetryName::PowerW),
        Just(TelemetryName::RelayState),
        Just(TelemetryName::WaterTempCTimes1000),
        Just(TelemetryName::GallonsTimes100),
    ]
}

fn node_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}(\\.[a-z0-9]{1,6}){0,4}"
}

fn uuid_text() -> impl Strategy<Value = String> {
    any::<u128>().prop_map(|n| uuid::Uuid::from_u128(n).to_string())
}

fn unix_ms() -> impl Strategy<Value = i64> {
    946_684_800_000i64..4_102_444_800_000
}

fn unit() -> impl Strategy<Value = Unit> {
    prop_oneof![Just(Unit::W), Just(Unit::Celcius), Just(Unit::Gpm), Just(Unit::AmpsRms)]
}

/// Thresholds with few enough digits to survive a trip through JSON text
fn threshold() -> impl Strategy<Value = f64> {
    (0u32..1_000_000).prop_map(|k| f64::from(k) / 1000.0)
}

fn readings() -> impl Strategy<Value = (Vec<i64>, Vec<i64>)> {
    prop::collection::vec((any::<i64>(), unix_ms()), 0..5).prop_map(|pairs| pairs.into_iter().unzip())
}

fn simple_telemetry_status() -> impl Strategy<Value = GtShSimpleTelemetryStatus> {
    (node_name(), telemetry_name(), readings()).prop_map(|(alias, name, (values, times))| {
        GtShSimpleTelemetryStatus {
            sh_node_alias: alias,
            telemetry_name: name,
            value_list: values,
            read_time_unix_ms_list: times,
        }
    })
}

fn booleanactuator_cmd_status() -> impl Strategy<Value = GtShBooleanactuatorCmdStatus> {
    (node_name(), prop::collection::vec((0i64..=1, unix_ms()), 0..5)).prop_map(|(alias, pairs)| {
        let (commands, times) = pairs.into_iter().unzip();
        GtShBooleanactuatorCmdStatus {
            sh_node_alias: alias,
            relay_state_command_list: commands,
            command_time_unix_ms_list: times,
        }
    })
}

fn multipurpose_telemetry_status() -> impl Strategy<Value = GtShMultipurposeTelemetryStatus> {
    (node_name(), node_name(), telemetry_name(), readings()).prop_map(
        |(about, sensor, name, (values, times))| GtShMultipurposeTelemetryStatus {
            about_node_alias: about,
            sensor_node_alias: sensor,
            telemetry_name: name,
            value_list: values,
            read_time_unix_ms_list: times,
        },
    )
}

fn status() -> impl Strategy<Value = GtShStatus> {
    (
        (node_name(), uuid_text(), node_name(), 946_684_800i64..4_102_444_800),
        (1i64..86_400, uuid_text()),
        prop::collection::vec(simple_telemetry_status(), 0..3),
        prop::collection::vec(booleanactuator_cmd_status(), 0..3),
        prop::collection::vec(multipurpose_telemetry_status(), 0..3),
    )
        .prop_map(|((from, from_id, about, slot), (period, uid), simple, relays, multi)| GtShStatus {
            from_g_node_alias: from,
            from_g_node_id: from_id,
            about_g_node_alias: about,
            slot_start_unix_s: slot,
            reporting_period_s: period,
            status_uid: uid,
            simple_telemetry_list: simple,
            booleanactuator_cmd_list: relays,
            multipurpose_telemetry_list: multi,
        })
}

fn snapshot() -> impl Strategy<Value = SnapshotSpaceheat> {
    (
        node_name(),
        uuid_text(),
        unix_ms(),
        prop::collection::vec((node_name(), any::<i64>(), telemetry_name()), 0..6),
    )
        .prop_map(|(from, instance, report_time, rows)| {
            let mut snapshot = TelemetrySnapshotSpaceheat {
                report_time_unix_ms: report_time,
                about_node_alias_list: Vec::new(),
                value_list: Vec::new(),
                telemetry_name_list: Vec::new(),
            };
            for (alias, value, name) in rows {
                snapshot.about_node_alias_list.push(alias);
                snapshot.value_list.push(value);
                snapshot.telemetry_name_list.push(name);
            }
            SnapshotSpaceheat {
                from_g_node_alias: from,
                from_g_node_instance_id: instance,
                snapshot,
            }
        })
}

fn reporting_config() -> impl Strategy<Value = TelemetryReportingConfig> {
    (
        any::<bool>(),
        any::<i32>(),
        node_name(),
        1i64..i64::MAX,
        unit(),
        telemetry_name(),
        proptest::option::of(threshold()),
        proptest::option::of(1i64..i64::MAX),
    )
        .prop_map(|(on_change, exponent, about, period, unit, name, threshold, nameplate)| {
            // ReportOnChange needs a threshold, and a threshold needs a nameplate
            let nameplate = match threshold {
                Some(_) => Some(nameplate.unwrap_or(1)),
                None => nameplate,
            };
            TelemetryReportingConfig {
                report_on_change: on_change && threshold.is_some(),
                exponent,
                about_node_name: about,
                sample_period_s: period,
                unit,
                telemetry_name: name,
                async_report_threshold: threshold,
                nameplate_max_value: nameplate,
            }
        })
}

fn meter_cac() -> impl Strategy<Value = ElectricMeterCac> {
    (
        uuid_text(),
        prop_oneof![
            Just(MakeModel::GridworksSimPm1),
            Just(MakeModel::SchneiderelectricIem3455),
        ],
        prop_oneof![
            Just(LocalCommInterface::Rs485),
            Just(LocalCommInterface::Ethernet),
            Just(LocalCommInterface::SimRabbit),
        ],
        0i64..i64::MAX,
        proptest::option::of(".{0,20}"),
        proptest::option::of(1i64..i64::MAX),
    )
        .prop_map(|(id, make_model, interface, period, display, baud)| ElectricMeterCac {
            component_attribute_class_id: id,
            make_model,
            local_comm_interface: interface,
            update_period_ms: period,
            display_name: display,
            default_baud: baud,
        })
}

fn relay_component() -> impl Strategy<Value = GtBooleanActuatorComponent> {
    (
        uuid_text(),
        uuid_text(),
        proptest::option::of(".{0,20}"),
        proptest::option::of(0i64..64),
        proptest::option::of("[0-9a-f]{8}"),
    )
        .prop_map(|(id, cac, display, gpio, hw_uid)| GtBooleanActuatorComponent {
            component_id: id,
            component_attribute_class_id: cac,
            display_name: display,
            gpio,
            hw_uid,
        })
}

proptest! {
    #[test]
    fn gs_pwr_round_trips(power in any::<i64>()) {
        let value = GsPwr { power };
        let bytes = value.to_bytes().unwrap();
        prop_assert_eq!(GsPwr::decode_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn telemetry_round_trips(
        name in telemetry_name(),
        value in any::<i64>(),
        exponent in -6i32..6,
        read_time in 946_684_800_000i64..4_102_444_800_000,
    ) {
        let telemetry = GtTelemetry { name, value, exponent, scada_read_time_unix_ms: read_time };
        let wire = serde_json::Value::Object(telemetry.encode().unwrap());
        prop_assert_eq!(GtTelemetry::decode(&wire).unwrap(), telemetry);
    }

    #[test]
    fn dispatch_boolean_round_trips(
        about in node_name(),
        to in node_name(),
        from in node_name(),
        instance in uuid_text(),
        on in any::<bool>(),
        sent in 946_684_800_000i64..4_102_444_800_000,
    ) {
        let dispatch = GtDispatchBoolean {
            about_node_name: about,
            to_g_node_alias: to,
            from_g_node_alias: from,
            from_g_node_instance_id: instance,
            relay_state: i64::from(on),
            send_time_unix_ms: sent,
        };
        let wire = serde_json::Value::Object(dispatch.encode().unwrap());
        prop_assert_eq!(GtDispatchBoolean::decode(&wire).unwrap(), dispatch);
    }

    #[test]
    fn problem_event_round_trips_through_payload_registry(
        id in uuid_text(),
        time_ns in 0i64..i64::MAX,
        summary in ".{0,40}",
        details in proptest::option::of(".{0,40}"),
    ) {
        let registry = SpaceheatPayload::registry().unwrap();
        let payload: SpaceheatPayload = ProblemEvent {
            message_id: id,
            time_ns,
            src: "hw1.isone.me.versant.keene.beech.scada".to_string(),
            problem_type: ProblemType::Warning,
            summary,
            details,
        }
        .into();

        let wire = serde_json::Value::Object(registry.encode(&payload).unwrap());

        prop_assert_eq!(registry.decode_value(&wire).unwrap(), payload);
    }

    #[test]
    fn status_with_nested_lists_round_trips(status in status()) {
        let bytes = status.to_bytes().unwrap();
        prop_assert_eq!(GtShStatus::decode_bytes(&bytes).unwrap(), status);
    }

    #[test]
    fn snapshot_round_trips(snapshot in snapshot()) {
        let bytes = snapshot.to_bytes().unwrap();
        prop_assert_eq!(SnapshotSpaceheat::decode_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn reporting_config_round_trips_through_json_text(config in reporting_config()) {
        let bytes = config.to_bytes().unwrap();
        let decoded = TelemetryReportingConfig::decode_bytes(&bytes).unwrap();
        prop_assert_eq!(
            decoded.async_report_threshold.map(f64::to_bits),
            config.async_report_threshold.map(f64::to_bits)
        );
        prop_assert_eq!(decoded, config);
    }

    #[test]
    fn meter_cac_round_trips(cac in meter_cac()) {
        let wire = serde_json::Value::Object(cac.encode().unwrap());
        prop_assert_eq!(wire.get("DisplayName").is_some(), cac.display_name.is_some());
        prop_assert_eq!(ElectricMeterCac::decode(&wire).unwrap(), cac);
    }

    #[test]
    fn relay_component_round_trips(component in relay_component()) {
        let bytes = component.to_bytes().unwrap();
        prop_assert_eq!(GtBooleanActuatorComponent::decode_bytes(&bytes).unwrap(), component);
    }

    #[test]
    fn cli_atn_cmd_round_trips(from in node_name(), id in uuid_text()) {
        let cmd = GtShCliAtnCmd {
            from_g_node_alias: from,
            from_g_node_id: id,
            send_snapshot: true,
        };
        let wire = serde_json::Value::Object(cmd.encode().unwrap());
        prop_assert_eq!(GtShCliAtnCmd::decode(&wire).unwrap(), cmd);
    }
}

#[test]
fn test_enum_travels_as_symbol() {
    let telemetry = GtTelemetry {
        name: TelemetryName::PowerW,
        value: 1200,
        exponent: 0,
        scada_read_time_unix_ms: 1_656_245_000_000,
    };

    let wire = telemetry.encode().unwrap();

    assert_eq!(wire["NameGtEnumSymbol"], json!("af39eec9"));
    assert_eq!(wire["TypeAlias"], json!("gt.telemetry.110"));
    assert!(!wire.contains_key("Name"));
}

#[test]
fn test_every_missing_field_is_reported() {
    let raw = json!({"TypeAlias": "gt.telemetry.110", "Value": 5});

    let err = GtTelemetry::decode(&raw).unwrap_err();

    match err {
        CodecError::MissingField { type_alias, fields } => {
            assert_eq!(type_alias, "gt.telemetry.110");
            assert_eq!(fields, vec!["Name", "Exponent", "ScadaReadTimeUnixMs"]);
        }
        other => panic!("expected MissingField, got {other:?}"),
    }
}

#[test]
fn test_unknown_enum_symbol_rejected() {
    let raw = json!({
        "TypeAlias": "gt.telemetry.110",
        "NameGtEnumSymbol": "deadbeef",
        "Value": 5,
        "Exponent": 0,
        "ScadaReadTimeUnixMs": 1_656_245_000_000_i64,
    });

    let err = GtTelemetry::decode(&raw).unwrap_err();

    assert!(matches!(err, CodecError::UnknownEnumSymbol { ref symbol, .. } if symbol == "deadbeef"));
}

#[test]
fn test_wrong_type_alias_rejected() {
    let err = GsPwr::decode(&json!({"TypeAlias": "gs.pwr.101", "Power": 1})).unwrap_err();
    assert!(matches!(err, CodecError::BadFormat { ref field, .. } if field == "TypeAlias"));
}

#[test]
fn test_unregistered_alias_is_unknown_type() {
    let registry = SpaceheatPayload::registry().unwrap();

    let err = registry
        .decode_bytes(br#"{"TypeAlias": "not.a.type.000"}"#)
        .unwrap_err();

    assert!(matches!(err, CodecError::UnknownType { .. }));
}

#[test]
fn test_out_of_range_send_time_rejected_on_encode() {
    let dispatch = GtDispatchBoolean {
        about_node_name: "a.elt1.relay".to_string(),
        to_g_node_alias: "hw1.isone.me.versant.keene.beech.scada".to_string(),
        from_g_node_alias: "hw1.isone.me.versant.keene.beech".to_string(),
        from_g_node_instance_id: "7a8e4046-178e-4a00-a8a5-fc2fd2a0a3e4".to_string(),
        relay_state: 1,
        send_time_unix_ms: 12,
    };

    assert!(matches!(
        dispatch.encode(),
        Err(CodecError::BadFormat { ref field, .. }) if field == "SendTimeUnixMs"
    ));
}

#[test]
fn test_payload_reports_its_alias() {
    let payload: SpaceheatPayload = GsPwr { power: 3 }.into();
    assert_eq!(payload.type_alias(), "gs.pwr.100");
}

#[test]
fn test_repository_rejects_identity_change() {
    let mut events: Repository<ProblemEvent> = Repository::new();
    let event = ProblemEvent {
        message_id: "2e1e2c4c-6c1a-4a4e-8d4c-9f1e1c2b3a4d".to_string(),
        time_ns: 1,
        src: "a.s".to_string(),
        problem_type: ProblemType::Notice,
        summary: "first".to_string(),
        details: None,
    };
    events.upsert(event.clone()).unwrap();

    let mut updated = event.clone();
    updated.summary = "second".to_string();
    let previous = events.upsert(updated).unwrap();

    assert_eq!(previous, Some(event));
    assert_eq!(events.len(), 1);
    assert_eq!(
        events.get("2e1e2c4c-6c1a-4a4e-8d4c-9f1e1c2b3a4d").map(|e| e.summary.as_str()),
        Some("second")
    );
}
