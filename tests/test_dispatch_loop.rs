//! Dispatch loop behavior: ordering, lifecycle, publish policies, acks


use spaceheat_proactor::config::{ProactorConfig, SubscriptionSection};
use spaceheat_proactor::error::{ProactorError, UsageError};
use spaceheat_proactor::messages::{Ack, GsPwr, Ping, SpaceheatPayload};
use spaceheat_proactor::proactor::{
    AckTimeoutError, AckTimeoutPolicy, LinkState, OnTimeout, Proactor, PublishOptions,
    PublishPolicy, Qos, SubmitError, TimeoutDecision,
};
use spaceheat_proactor::testing::MockTransport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;

fn started(actor: &RecordingActor, transport: &MockTransport) -> Proactor<RecordingActor> {
    started_with(test_config(), actor, transport)
}

fn started_with(
    config: ProactorConfig,
    actor: &RecordingActor,
    transport: &MockTransport,
) -> Proactor<RecordingActor> {
    let mut proactor = Proactor::new(
        config,
        SpaceheatPayload::registry().unwrap(),
        actor.clone(),
    );
    proactor.add_link(LINK, transport.clone()).unwrap();
    proactor.start().unwrap();
    proactor
}

fn wait_active(proactor: &Proactor<RecordingActor>) {
    assert!(wait_for(WAIT, || {
        proactor.stats().link(LINK).and_then(|l| l.state) == Some(LinkState::Active)
    }));
}

/// Drop the broker connection and wait for the link to report Faulted
fn fault_link(actor: &RecordingActor, transport: &MockTransport) {
    transport.disconnected("broker went away");
    assert!(wait_for(WAIT, || actor.states().last() == Some(&LinkState::Faulted)));
}

fn counting_policy(calls: &Arc<AtomicUsize>) -> impl AckTimeoutPolicy {
    let counter = Arc::clone(calls);
    OnTimeout(move |_: &AckTimeoutError| {
        counter.fetch_add(1, Ordering::SeqCst);
        TimeoutDecision::Abandon
    })
}

#[test]
fn test_commands_processed_in_submission_order() {
    // Arrange
    let actor = RecordingActor::new();
    let proactor = started(&actor, &MockTransport::auto_connecting());
    let handle = proactor.handle();

    // Act
    for n in 0..50 {
        handle.send("note", TestCommand::Note(n)).unwrap();
    }

    // Assert
    assert!(wait_for(WAIT, || actor.notes().len() == 50));
    assert_eq!(actor.notes(), (0..50).collect::<Vec<_>>());
    assert_eq!(proactor.stats().processed("note"), 50);
    proactor.stop();
}

#[test]
fn test_second_start_is_usage_error() {
    let actor = RecordingActor::new();
    let mut proactor = started(&actor, &MockTransport::auto_connecting());

    let result = proactor.start();

    assert!(matches!(
        result,
        Err(ProactorError::Usage(UsageError::AlreadyStarted))
    ));
    assert!(proactor.is_started());
    proactor.stop();
}

#[test]
fn test_links_frozen_after_start() {
    let actor = RecordingActor::new();
    let mut proactor = started(&actor, &MockTransport::auto_connecting());

    let result = proactor.add_link("other", MockTransport::new());

    assert!(matches!(
        result,
        Err(ProactorError::Usage(UsageError::LinksFrozen))
    ));
    proactor.stop();
}

#[test]
fn test_add_link_rejects_unknown_and_duplicate_names() {
    let mut proactor = Proactor::new(
        test_config(),
        SpaceheatPayload::registry().unwrap(),
        RecordingActor::new(),
    );

    assert!(matches!(
        proactor.add_link("nowhere", MockTransport::new()),
        Err(ProactorError::Usage(UsageError::UnknownLink(_)))
    ));
    proactor.add_link(LINK, MockTransport::new()).unwrap();
    assert!(matches!(
        proactor.add_link(LINK, MockTransport::new()),
        Err(ProactorError::Usage(UsageError::DuplicateLink(_)))
    ));
}

#[test]
fn test_stop_is_idempotent_and_closes_queue() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    let handle = proactor.handle();

    // Act
    proactor.stop();
    handle.stop();
    proactor.stop();

    // Assert
    assert!(handle.is_stopped());
    assert_eq!(
        handle.send("note", TestCommand::Note(1)),
        Err(SubmitError::Stopped)
    );
    assert_eq!(transport.disconnect_count(), 1);
}

#[test]
fn test_stop_runs_commands_queued_before_it() {
    // Arrange
    let actor = RecordingActor::new();
    let proactor = started(&actor, &MockTransport::auto_connecting());
    let handle = proactor.handle();

    // Act
    for n in 0..200 {
        handle.send("note", TestCommand::Note(n)).unwrap();
    }
    handle.stop();

    // Assert
    assert_eq!(actor.notes(), (0..200).collect::<Vec<_>>());
    assert_eq!(proactor.stats().processed("note"), 200);
    assert_eq!(
        handle.send("note", TestCommand::Note(200)),
        Err(SubmitError::Stopped)
    );
}

#[test]
fn test_stop_before_start_exits_immediately() {
    let actor = RecordingActor::new();
    let mut proactor = Proactor::new(
        test_config(),
        SpaceheatPayload::registry().unwrap(),
        actor.clone(),
    );
    proactor.add_link(LINK, MockTransport::auto_connecting()).unwrap();
    let handle = proactor.handle();

    handle.stop();
    proactor.start().unwrap();

    assert!(wait_for(WAIT, || handle.is_stopped()));
    proactor.stop();
}

#[test]
fn test_actor_can_stop_the_loop() {
    let actor = RecordingActor::new();
    let proactor = started(&actor, &MockTransport::auto_connecting());
    let handle = proactor.handle();

    handle.send("stop", TestCommand::Stop).unwrap();

    assert!(wait_for(WAIT, || handle.is_stopped()));
    proactor.stop();
}

#[test]
fn test_full_queue_rejects_submissions() {
    // Arrange: a loop that never starts draining its queue
    let mut config = test_config();
    config.node.queue_capacity = 2;
    let proactor = Proactor::new(
        config,
        SpaceheatPayload::registry().unwrap(),
        RecordingActor::new(),
    );
    let handle = proactor.handle();

    // Act
    handle.send("note", TestCommand::Note(1)).unwrap();
    handle.send("note", TestCommand::Note(2)).unwrap();
    let third = handle.send("note", TestCommand::Note(3));

    // Assert
    assert_eq!(third, Err(SubmitError::QueueFull));
}

#[test]
fn test_link_reaches_active_and_actor_sees_transitions() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();

    // Act
    let proactor = started(&actor, &transport);

    // Assert
    wait_active(&proactor);
    assert!(wait_for(WAIT, || actor.states().len() == 3));
    assert_eq!(
        actor.states(),
        vec![LinkState::Connecting, LinkState::Subscribing, LinkState::Active]
    );
    let link = proactor.stats().link(LINK).cloned().unwrap();
    assert_eq!(link.comm_events.len(), 3);
    proactor.stop();
}

#[test]
fn test_fail_fast_publish_rejected_while_not_active() {
    // Arrange: the broker never answers
    let mut config = test_config();
    config.links[0].publish_policy = PublishPolicy::FailFast;
    let actor = RecordingActor::new();
    let transport = MockTransport::new();
    let proactor = started_with(config, &actor, &transport);

    // Act
    proactor.handle().send("publish", TestCommand::power(10)).unwrap();

    // Assert
    assert!(wait_for(WAIT, || actor.publish_results().len() == 1));
    let result = &actor.publish_results()[0];
    assert!(result.as_ref().unwrap_err().contains("not active"));
    assert!(transport.published().is_empty());
    proactor.stop();
}

#[test]
fn test_queued_publish_flushed_on_active() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::new();
    let proactor = started(&actor, &transport);
    let handle = proactor.handle();
    assert!(wait_for(WAIT, || transport.connect_count() == 1));

    // Act
    handle.send("publish", TestCommand::power(1)).unwrap();
    handle.send("publish", TestCommand::power(2)).unwrap();
    assert!(wait_for(WAIT, || actor.publish_results().len() == 2));
    assert!(transport.published().is_empty());
    transport.connected();

    // Assert
    assert!(wait_for(WAIT, || transport.published().len() == 2));
    let powers: Vec<i64> = transport
        .published()
        .iter()
        .map(|p| parse_frame(p).1["Power"].as_i64().unwrap())
        .collect();
    assert_eq!(powers, vec![1, 2]);
    assert_eq!(transport.published()[0].topic, format!("{NODE}/gw"));
    proactor.stop();
}

#[test]
fn test_publish_usage_errors() {
    // Arrange
    let actor = RecordingActor::new();
    let proactor = started(&actor, &MockTransport::auto_connecting());
    let handle = proactor.handle();

    // Act
    handle
        .send(
            "publish",
            TestCommand::Publish {
                link: "nowhere".to_string(),
                payload: GsPwr { power: 1 }.into(),
                options: PublishOptions::new(),
            },
        )
        .unwrap();
    handle
        .send(
            "publish",
            TestCommand::Publish {
                link: LINK.to_string(),
                payload: GsPwr { power: 1 }.into(),
                options: PublishOptions::new().bare().with_ack(),
            },
        )
        .unwrap();

    // Assert
    assert!(wait_for(WAIT, || actor.publish_results().len() == 2));
    let results = actor.publish_results();
    assert!(results[0].as_ref().unwrap_err().contains("Unknown link"));
    assert!(results[1].as_ref().unwrap_err().contains("framed"));
    proactor.stop();
}

#[test]
fn test_bare_publish_uses_typed_topic() {
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);

    proactor
        .handle()
        .send(
            "publish",
            TestCommand::Publish {
                link: LINK.to_string(),
                payload: GsPwr { power: 7 }.into(),
                options: PublishOptions::new().bare(),
            },
        )
        .unwrap();

    assert!(wait_for(WAIT, || transport.published().len() == 1));
    let published = transport.published().remove(0);
    assert_eq!(published.topic, format!("{NODE}/gs.pwr.100"));
    assert_eq!(published.payload_json()["Power"], 7);
    proactor.stop();
}

#[test]
fn test_ack_before_deadline_clears_pending() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);

    // Act
    proactor.handle().send("publish", TestCommand::acked_power(5)).unwrap();
    assert!(wait_for(WAIT, || transport.published().len() == 1));
    let (header, _) = parse_frame(&transport.published()[0]);
    assert_eq!(header["AckRequired"], true);
    assert_eq!(header["Dst"], PEER);
    let ack = Ack {
        ack_message_id: header["MessageId"].as_str().unwrap().to_string(),
    };
    let (_, bytes) = frame_from(PEER, &ack, false);
    transport.receive(&format!("{PEER}/gw"), bytes);
    std::thread::sleep(Duration::from_millis(300));

    // Assert
    let stats = proactor.stats();
    assert_eq!(stats.num_ack_timeouts, 0);
    assert_eq!(transport.published().len(), 1);
    assert_eq!(stats.link(LINK).unwrap().num_received_by_type.get("gridworks.ack"), Some(&1));
    proactor.stop();
}

#[test]
fn test_expired_ack_runs_policy_exactly_once() {
    // Arrange
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);

    // Act
    proactor
        .handle()
        .send(
            "publish",
            TestCommand::Publish {
                link: LINK.to_string(),
                payload: GsPwr { power: 5 }.into(),
                options: PublishOptions::new().with_ack_policy(OnTimeout(move |_: &AckTimeoutError| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    TimeoutDecision::Abandon
                })),
            },
        )
        .unwrap();
    assert!(wait_for(WAIT, || proactor.stats().num_ack_timeouts == 1));
    std::thread::sleep(Duration::from_millis(300));

    // Assert
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(proactor.stats().num_ack_timeouts, 1);
    assert_eq!(transport.published().len(), 1);
    proactor.stop();
}

#[test]
fn test_default_policy_retries_then_faults_link() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);

    // Act
    proactor.handle().send("publish", TestCommand::acked_power(5)).unwrap();

    // Assert: one retry with the same id, then the link faults and reconnects
    assert!(wait_for(WAIT, || proactor.stats().num_ack_timeouts == 2));
    let frames: Vec<String> = transport
        .published_on(&format!("{NODE}/gw"))
        .iter()
        .map(|p| parse_frame(p).0["MessageId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], frames[1]);

    assert!(wait_for(WAIT, || {
        let states = actor.states();
        states.contains(&LinkState::Faulted) && states.last() == Some(&LinkState::Active)
    }));
    let faulted = proactor
        .stats()
        .link(LINK)
        .unwrap()
        .comm_events
        .iter()
        .find(|e| e.to == LinkState::Faulted)
        .cloned()
        .unwrap();
    assert_eq!(faulted.cause, "ack timeout");
    assert!(transport.connect_count() >= 2);
    proactor.stop();
}

#[test]
fn test_inbound_ack_required_is_acknowledged_after_processing() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);
    let (id, bytes) = frame_from(PEER, &GsPwr { power: 4100 }, true);

    // Act
    transport.receive(&format!("{PEER}/gw"), bytes);

    // Assert
    assert!(wait_for(WAIT, || transport.published().len() == 1));
    assert_eq!(
        actor.mqtt_payloads(),
        vec![SpaceheatPayload::GsPwr(GsPwr { power: 4100 })]
    );
    let (header, payload) = parse_frame(&transport.published()[0]);
    assert_eq!(header["MessageType"], "gridworks.ack");
    assert_eq!(header["Dst"], PEER);
    assert_eq!(payload["AckMessageID"], id.to_string());
    proactor.stop();
}

#[test]
fn test_failed_processing_sends_no_ack() {
    let actor = RecordingActor::rejecting();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);
    let (_, bytes) = frame_from(PEER, &GsPwr { power: 1 }, true);

    transport.receive(&format!("{PEER}/gw"), bytes);

    assert!(wait_for(WAIT, || proactor.stats().processed("gs.pwr.100") == 1));
    std::thread::sleep(Duration::from_millis(50));
    assert!(transport.published().is_empty());
    proactor.stop();
}

#[test]
fn test_ping_is_answered_with_ack() {
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);
    let (id, bytes) = frame_from(PEER, &Ping {}, false);

    transport.receive(&format!("{PEER}/gw"), bytes);

    assert!(wait_for(WAIT, || transport.published().len() == 1));
    let (_, payload) = parse_frame(&transport.published()[0]);
    assert_eq!(payload["AckMessageID"], id.to_string());
    assert!(actor.mqtt_payloads().is_empty());
    proactor.stop();
}

#[test]
fn test_bare_receipt_decoded_from_typed_topic() {
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);

    transport.receive(&format!("{PEER}/gs.pwr.100"), bare(&GsPwr { power: 12 }));

    assert!(wait_for(WAIT, || actor.mqtt_payloads().len() == 1));
    match &actor.observed().last() {
        Some(Observed::Mqtt { link, src, .. }) => {
            assert_eq!(link, LINK);
            assert_eq!(src, PEER);
        }
        other => panic!("expected mqtt observation, got {other:?}"),
    }
    proactor.stop();
}

#[test]
fn test_undecodable_receipts_are_counted_and_dropped() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);

    // Act
    transport.receive(&format!("{PEER}/gw"), &b"not json"[..]);
    transport.receive(&format!("{PEER}/gs.pwr.100"), &br#"{"TypeAlias":"gs.pwr.100"}"#[..]);
    transport.receive(&format!("{PEER}/unknown.type.100"), &br#"{"TypeAlias":"unknown.type.100"}"#[..]);

    // Assert
    assert!(wait_for(WAIT, || {
        proactor.stats().link(LINK).map(|l| l.num_decode_failures) == Some(3)
    }));
    assert!(actor.mqtt_payloads().is_empty());
    assert_eq!(
        actor.raw_topics(),
        vec![
            format!("{PEER}/gw"),
            format!("{PEER}/gs.pwr.100"),
            format!("{PEER}/unknown.type.100"),
        ]
    );
    let envelopes: Vec<bool> = actor
        .observed()
        .into_iter()
        .filter_map(|o| match o {
            Observed::Raw { envelope_ok, .. } => Some(envelope_ok),
            _ => None,
        })
        .collect();
    assert_eq!(envelopes, vec![false, true, true]);
    proactor.stop();
}

#[test]
fn test_actor_sees_receipt_before_it_is_routed() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);
    let (_, bytes) = frame_from(PEER, &GsPwr { power: 9 }, false);

    // Act
    transport.receive(&format!("{PEER}/gw"), bytes);

    // Assert
    assert!(wait_for(WAIT, || actor.mqtt_payloads().len() == 1));
    let receipts: Vec<&'static str> = actor
        .observed()
        .iter()
        .filter_map(|o| match o {
            Observed::Raw { .. } => Some("raw"),
            Observed::Mqtt { .. } => Some("mqtt"),
            _ => None,
        })
        .collect();
    assert_eq!(receipts, vec!["raw", "mqtt"]);
    proactor.stop();
}

#[test]
fn test_acks_and_pings_never_reach_the_actor() {
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);
    let (_, ping) = frame_from(PEER, &Ping {}, false);

    transport.receive(&format!("{PEER}/gw"), ping);

    assert!(wait_for(WAIT, || transport.published().len() == 1));
    assert!(actor.raw_topics().is_empty());
    proactor.stop();
}

#[test]
fn test_disconnect_faults_and_reconnects() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);

    // Act
    transport.disconnected("broker went away");

    // Assert
    assert!(wait_for(WAIT, || transport.connect_count() == 2));
    wait_active(&proactor);
    let states = actor.states();
    assert!(states.contains(&LinkState::Faulted));
    proactor.stop();
}

#[test]
fn test_silent_peer_is_pinged_then_faulted() {
    // Arrange
    let mut config = test_config();
    config.liveness.enabled = true;
    config.liveness.interval_ms = 30;
    config.liveness.probe_timeout_ms = 30;
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();

    // Act
    let proactor = started_with(config, &actor, &transport);

    // Assert
    assert!(wait_for(WAIT, || actor.states().contains(&LinkState::Faulted)));
    let states = actor.states();
    let suspended = states.iter().position(|s| *s == LinkState::Suspended);
    let faulted = states.iter().position(|s| *s == LinkState::Faulted);
    assert!(suspended.is_some() && suspended < faulted);
    let pings: Vec<_> = transport
        .published()
        .iter()
        .map(parse_frame)
        .filter(|(header, _)| header["MessageType"] == "gridworks.ping")
        .collect();
    assert!(pings.len() >= 2);
    assert_eq!(pings[0].0["Dst"], PEER);
    proactor.stop();
}

#[test]
fn test_acked_publishes_on_faulted_link_fail_fast() {
    // Arrange
    let mut config = test_config();
    config.links[0].publish_policy = PublishPolicy::FailFast;
    config.links[0].backoff.pattern_ms = vec![5_000];
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started_with(config, &actor, &transport);
    wait_active(&proactor);
    fault_link(&actor, &transport);
    let handle = proactor.handle();

    // Act
    handle.send("publish", TestCommand::acked_power(1)).unwrap();
    handle.send("publish", TestCommand::acked_power(2)).unwrap();
    handle.send("count", TestCommand::CountPendingAcks).unwrap();

    // Assert
    assert!(wait_for(WAIT, || actor.pending_acks().len() == 1));
    let results = actor.publish_results();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.as_ref().unwrap_err().contains("not active")));
    assert_eq!(actor.pending_acks(), vec![(0, Some(LinkState::Faulted))]);
    assert!(transport.published().is_empty());
    proactor.stop();
}

#[test]
fn test_acked_publishes_on_faulted_link_tracked_once_after_flush() {
    // Arrange
    let mut config = test_config();
    config.ack.timeout_ms = 60_000;
    config.links[0].backoff.pattern_ms = vec![400];
    config.links[0].backoff.sustained_ms = 400;
    let actor = RecordingActor::new();
    let transport = MockTransport::new();
    let proactor = started_with(config, &actor, &transport);
    let handle = proactor.handle();
    assert!(wait_for(WAIT, || transport.connect_count() == 1));
    transport.connected();
    wait_active(&proactor);
    fault_link(&actor, &transport);

    // Act
    handle.send("publish", TestCommand::acked_power(1)).unwrap();
    handle.send("publish", TestCommand::acked_power(2)).unwrap();
    handle.send("count", TestCommand::CountPendingAcks).unwrap();
    assert!(wait_for(WAIT, || actor.pending_acks().len() == 1));
    assert!(wait_for(WAIT, || transport.connect_count() == 2));
    transport.connected();
    assert!(wait_for(WAIT, || transport.published().len() == 2));
    handle.send("count", TestCommand::CountPendingAcks).unwrap();

    // Assert
    assert!(wait_for(WAIT, || actor.pending_acks().len() == 2));
    assert_eq!(
        actor.pending_acks(),
        vec![(0, Some(LinkState::Faulted)), (2, Some(LinkState::Active))]
    );
    let ids: Vec<String> = actor
        .publish_results()
        .into_iter()
        .map(|r| r.unwrap().to_string())
        .collect();
    let sent: Vec<String> = transport
        .published()
        .iter()
        .map(|p| parse_frame(p).0["MessageId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(sent, ids);
    assert_ne!(ids[0], ids[1]);
    proactor.stop();
}

#[test]
fn test_stop_discards_pending_acks_and_outbox_without_running_policies() {
    // Arrange
    let calls = Arc::new(AtomicUsize::new(0));
    let mut config = test_config();
    config.ack.timeout_ms = 60_000;
    config.links[0].backoff.pattern_ms = vec![5_000];
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started_with(config, &actor, &transport);
    let handle = proactor.handle();
    wait_active(&proactor);
    let acked = |watts| TestCommand::Publish {
        link: LINK.to_string(),
        payload: GsPwr { power: watts }.into(),
        options: PublishOptions::new().with_ack_policy(counting_policy(&calls)),
    };
    handle.send("publish", acked(1)).unwrap();
    assert!(wait_for(WAIT, || transport.published().len() == 1));
    fault_link(&actor, &transport);
    handle.send("publish", acked(2)).unwrap();
    handle.send("count", TestCommand::CountPendingAcks).unwrap();
    assert!(wait_for(WAIT, || actor.pending_acks() == vec![(1, Some(LinkState::Faulted))]));

    // Act
    proactor.stop();
    let late = handle.send("note", TestCommand::Note(1));
    std::thread::sleep(Duration::from_millis(100));

    // Assert
    assert_eq!(late, Err(SubmitError::Stopped));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(proactor.stats().num_ack_timeouts, 0);
    assert_eq!(transport.published().len(), 1);
    assert!(!transport.receive(&format!("{PEER}/gs.pwr.100"), bare(&GsPwr { power: 3 })));
    assert!(actor.notes().is_empty());
    assert!(actor.mqtt_payloads().is_empty());
}

#[test]
fn test_retry_that_cannot_be_sent_faults_the_link() {
    // Arrange
    let actor = RecordingActor::new();
    let transport = MockTransport::auto_connecting();
    let proactor = started(&actor, &transport);
    wait_active(&proactor);
    proactor.handle().send("publish", TestCommand::acked_power(5)).unwrap();
    assert!(wait_for(WAIT, || transport.published().len() == 1));

    // Act
    transport.set_publish_failure(true);

    // Assert
    assert!(wait_for(WAIT, || actor.states().contains(&LinkState::Faulted)));
    let faulted = proactor
        .stats()
        .link(LINK)
        .unwrap()
        .comm_events
        .iter()
        .find(|e| e.to == LinkState::Faulted)
        .cloned()
        .unwrap();
    assert_eq!(faulted.cause, "ack timeout");
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(proactor.stats().num_ack_timeouts, 1);
    assert_eq!(transport.published().len(), 1);
    transport.set_publish_failure(false);
    proactor.stop();
}

#[test]
fn test_link_without_suback_faults_after_subscribe_timeout() {
    // Arrange
    let mut config = test_config();
    config.links[0].subscribe_timeout_ms = 50;
    config.links[0].backoff.pattern_ms = vec![5_000];
    config.links[0].subscriptions = vec![SubscriptionSection {
        topic: format!("{PEER}/gw"),
        qos: Qos::AtLeastOnce,
    }];
    let actor = RecordingActor::new();
    let transport = MockTransport::new();
    let proactor = started_with(config, &actor, &transport);
    assert!(wait_for(WAIT, || transport.connect_count() == 1));

    // Act
    transport.connected();

    // Assert
    assert!(wait_for(WAIT, || actor.states().contains(&LinkState::Faulted)));
    let states = actor.states();
    assert!(!states.contains(&LinkState::Active));
    let subscribing = states.iter().position(|s| *s == LinkState::Subscribing);
    let faulted = states.iter().position(|s| *s == LinkState::Faulted);
    assert!(subscribing.is_some() && subscribing < faulted);
    let cause = proactor
        .stats()
        .link(LINK)
        .unwrap()
        .comm_events
        .iter()
        .find(|e| e.to == LinkState::Faulted)
        .map(|e| e.cause.clone())
        .unwrap();
    assert!(cause.contains("suback timeout"), "{cause}");
    assert_eq!(transport.subscriptions().len(), 1);
    proactor.stop();
}
