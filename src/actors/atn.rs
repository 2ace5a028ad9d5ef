//! The ATN: a supervisory client of one SCADA
//!
//! Receives power readings, status reports, snapshots and events from its
//! SCADA, persists status and events as JSON files, tracks relay states and
//! receive counts, and sends snapshot requests and relay dispatches back.

use crate::codec::{CodecError, TypeRegistry, WirePayload, WireType};
use crate::config::{ConfigError, ProactorConfig, SubscriptionSection};
use crate::error::{ProactorError, ProactorResult};
use crate::messages::{
    Event, GsPwr, GtDispatchBoolean, GtShCliAtnCmd, GtShStatus, GtShStatusEvent, ProblemEvent,
    SnapshotSpaceheat, SnapshotSpaceheatEvent, TelemetryName,
};
use crate::proactor::{
    registry_decode, Actor, CommEvent, LinkState, Message, ProactorContext, ProactorHandle,
    PublishOptions, Qos, Receipt, SubmitError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

crate::wire_payloads! {
    /// Everything an ATN exchanges with its SCADA
    pub enum AtnPayload {
        GsPwr(GsPwr),
        GtShStatus(GtShStatus),
        SnapshotSpaceheat(SnapshotSpaceheat),
        GtDispatchBoolean(GtDispatchBoolean),
        GtShCliAtnCmd(GtShCliAtnCmd),
        ProblemEvent(ProblemEvent),
        GtShStatusEvent(GtShStatusEvent),
        SnapshotSpaceheatEvent(SnapshotSpaceheatEvent),
    }
}

/// Commands submitted to a running ATN
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtnCommand {
    RequestSnapshot,
    SetRelay { relay: String, on: bool },
}

impl AtnCommand {
    pub fn message_type(&self) -> &'static str {
        match self {
            AtnCommand::RequestSnapshot => GtShCliAtnCmd::TYPE_ALIAS,
            AtnCommand::SetRelay { .. } => GtDispatchBoolean::TYPE_ALIAS,
        }
    }
}

/// Client side of a running ATN
impl ProactorHandle<AtnCommand> {
    /// Ask the SCADA for a fresh snapshot
    pub fn request_snapshot(&self) -> Result<Uuid, SubmitError> {
        let command = AtnCommand::RequestSnapshot;
        self.send(command.message_type(), command)
    }

    pub fn set_relay(&self, relay: &str, on: bool) -> Result<Uuid, SubmitError> {
        let command = AtnCommand::SetRelay {
            relay: relay.to_string(),
            on,
        };
        self.send(command.message_type(), command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtnSettings {
    /// This ATN's alias
    pub alias: String,
    pub g_node_id: String,
    pub scada_alias: String,
    /// Link to the SCADA
    pub link: String,
    pub relays: Vec<String>,
    pub status_dir: PathBuf,
    pub event_dir: PathBuf,
}

impl AtnSettings {
    pub fn from_config(config: &ProactorConfig) -> Result<Self, ConfigError> {
        let atn = config
            .atn
            .as_ref()
            .ok_or_else(|| ConfigError::InvalidConfig("missing [atn] section".to_string()))?;
        if config.link(&atn.link).is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "atn.link '{}' does not name a configured link",
                atn.link
            )));
        }
        Ok(Self {
            alias: config.node.name.clone(),
            g_node_id: atn.g_node_id.clone(),
            scada_alias: atn.scada_alias.clone(),
            link: atn.link.clone(),
            relays: atn.relays.clone(),
            status_dir: config.paths.data_dir.join("status"),
            event_dir: config.paths.event_dir.clone(),
        })
    }

    /// What the ATN listens to on its SCADA link
    pub fn subscriptions(&self) -> Vec<SubscriptionSection> {
        let scada = &self.scada_alias;
        [
            (GsPwr::TYPE_ALIAS, Qos::AtMostOnce),
            (GtShStatus::TYPE_ALIAS, Qos::AtLeastOnce),
            (SnapshotSpaceheat::TYPE_ALIAS, Qos::AtLeastOnce),
            (crate::proactor::frame::FRAME_SUFFIX, Qos::AtMostOnce),
        ]
        .into_iter()
        .map(|(suffix, qos)| SubscriptionSection {
            topic: format!("{scada}/{suffix}"),
            qos,
        })
        .collect()
    }

    /// Fill in the SCADA link's subscriptions and peer where the file left them out
    pub fn configure_link(&self, config: &mut ProactorConfig) {
        if let Some(link) = config.links.iter_mut().find(|l| l.name == self.link) {
            if link.subscriptions.is_empty() {
                link.subscriptions = self.subscriptions();
            }
            if link.peer.is_none() {
                link.peer = Some(self.scada_alias.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayState {
    pub state: Option<i64>,
    pub last_change_unix_ms: Option<i64>,
}

/// Latest value a snapshot reported for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimpleReading {
    pub value: i64,
    pub telemetry_name: TelemetryName,
}

/// What the ATN currently knows about its SCADA
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtnData {
    pub latest_power_w: Option<i64>,
    pub latest_status: Option<GtShStatus>,
    pub latest_snapshot: Option<SnapshotSpaceheat>,
    pub relay_state: BTreeMap<String, RelayState>,
    pub link_state: Option<LinkState>,
    pub rejected: u64,
    pub events_written: u64,
    /// Messages accepted from the SCADA
    pub num_received: u64,
    /// Every application receipt, counted before it is decoded
    pub num_received_by_topic: BTreeMap<String, u64>,
    pub num_received_by_type: BTreeMap<String, u64>,
}

impl AtnData {
    /// The first reading for `node` in the latest snapshot
    pub fn latest_simple_reading(&self, node: &str) -> Option<SimpleReading> {
        let snapshot = &self.latest_snapshot.as_ref()?.snapshot;
        let index = snapshot
            .about_node_alias_list
            .iter()
            .position(|alias| alias == node)?;
        Some(SimpleReading {
            value: *snapshot.value_list.get(index)?,
            telemetry_name: *snapshot.telemetry_name_list.get(index)?,
        })
    }

    pub fn received(&self, type_alias: &str) -> u64 {
        self.num_received_by_type.get(type_alias).copied().unwrap_or(0)
    }

    /// Receive counts in a few human-readable lines
    pub fn summary(&self, alias: &str) -> String {
        let mut s = format!(
            "Atn [{alias}] total: {}  status:{}  snapshot:{}",
            self.num_received,
            self.received(GtShStatus::TYPE_ALIAS),
            self.received(SnapshotSpaceheat::TYPE_ALIAS),
        );
        if !self.num_received_by_topic.is_empty() {
            s.push_str("\n  Received by topic:");
            for (topic, n) in &self.num_received_by_topic {
                s.push_str(&format!("\n    {n:3}: [{topic}]"));
            }
        }
        if !self.num_received_by_type.is_empty() {
            s.push_str("\n  Received by message_type:");
            for (message_type, n) in &self.num_received_by_type {
                s.push_str(&format!("\n    {n:3}: [{message_type}]"));
            }
        }
        s
    }
}

/// Read access to an [`Atn`]'s data from outside the loop thread
#[derive(Debug, Clone)]
pub struct AtnView {
    alias: String,
    data: Arc<Mutex<AtnData>>,
}

impl AtnView {
    pub fn data(&self) -> AtnData {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn relay(&self, name: &str) -> Option<RelayState> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .relay_state
            .get(name)
            .cloned()
    }

    pub fn latest_simple_reading(&self, node: &str) -> Option<SimpleReading> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_simple_reading(node)
    }

    pub fn summary_str(&self) -> String {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary(&self.alias)
    }
}

pub struct Atn {
    settings: AtnSettings,
    data: Arc<Mutex<AtnData>>,
}

impl Atn {
    pub fn new(settings: AtnSettings) -> Self {
        let data = AtnData {
            relay_state: settings
                .relays
                .iter()
                .map(|relay| (relay.clone(), RelayState::default()))
                .collect(),
            ..Default::default()
        };
        Self {
            settings,
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn settings(&self) -> &AtnSettings {
        &self.settings
    }

    pub fn view(&self) -> AtnView {
        AtnView {
            alias: self.settings.alias.clone(),
            data: Arc::clone(&self.data),
        }
    }

    fn data(&self) -> MutexGuard<'_, AtnData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_status(&self, status: GtShStatus) -> ProactorResult<()> {
        let path = self
            .settings
            .status_dir
            .join(format!("GtShStatus.{}.json", status.slot_start_unix_s));
        write_json(&path, &status)?;
        info!(path = %path.display(), "Wrote status file");
        self.data().latest_status = Some(status);
        Ok(())
    }

    fn process_snapshot(&self, snapshot: SnapshotSpaceheat) {
        let now_ms = Utc::now().timestamp_millis();
        let mut data = self.data();
        for relay in &self.settings.relays {
            let indices = snapshot.snapshot.indices_of(relay, TelemetryName::RelayState);
            let [index] = indices.as_slice() else {
                warn!(
                    relay = %relay,
                    matches = indices.len(),
                    "Expected exactly one relay state in snapshot; skipping relay"
                );
                continue;
            };
            let value = snapshot.snapshot.value_list[*index];
            let entry = data.relay_state.entry(relay.clone()).or_default();
            if entry.state != Some(value) {
                entry.state = Some(value);
                entry.last_change_unix_ms = Some(now_ms);
            }
        }
        for (i, alias) in snapshot.snapshot.about_node_alias_list.iter().enumerate() {
            debug!(
                node = %alias,
                value = snapshot.snapshot.value_list[i],
                telemetry = ?snapshot.snapshot.telemetry_name_list[i],
                "Snapshot reading"
            );
        }
        data.latest_snapshot = Some(snapshot);
    }

    fn process_event<E: Event>(&self, event: &E) -> ProactorResult<()> {
        let path = self.settings.event_dir.join(event_file_name(event));
        write_json(&path, event)?;
        self.data().events_written += 1;
        info!(path = %path.display(), type_name = E::TYPE_NAME, "Wrote event file");
        Ok(())
    }

    fn to_scada(&self) -> PublishOptions {
        PublishOptions::new()
            .to(self.settings.scada_alias.clone())
            .qos(Qos::AtMostOnce)
    }
}

/// `{iso8601}.{TypeName}.uid[{MessageId}].json`
pub fn event_file_name<E: Event>(event: &E) -> String {
    let time_ns = event.time_ns();
    let secs = time_ns.div_euclid(1_000_000_000);
    let nanos = time_ns.rem_euclid(1_000_000_000) as u32;
    let timestamp = DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| time_ns.to_string());
    format!(
        "{timestamp}.{}.uid[{}].json",
        E::TYPE_NAME,
        event.message_id()
    )
}

fn write_json<T: WireType>(path: &Path, value: &T) -> ProactorResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let wire = value.encode()?;
    let bytes = serde_json::to_vec_pretty(&wire)
        .map_err(|e| ProactorError::actor(format!("cannot serialize {}: {e}", T::TYPE_ALIAS)))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

impl Actor for Atn {
    type Payload = AtnPayload;
    type Command = AtnCommand;

    fn process_message(
        &mut self,
        message: Message<AtnCommand>,
        ctx: &mut ProactorContext<'_, AtnPayload>,
    ) -> ProactorResult<()> {
        let payload: AtnPayload = match message.payload {
            AtnCommand::RequestSnapshot => GtShCliAtnCmd {
                from_g_node_alias: self.settings.alias.clone(),
                from_g_node_id: self.settings.g_node_id.clone(),
                send_snapshot: true,
            }
            .into(),
            AtnCommand::SetRelay { relay, on } => GtDispatchBoolean {
                about_node_name: relay,
                to_g_node_alias: self.settings.scada_alias.clone(),
                from_g_node_alias: self.settings.alias.clone(),
                from_g_node_instance_id: self.settings.g_node_id.clone(),
                relay_state: i64::from(on),
                send_time_unix_ms: Utc::now().timestamp_millis(),
            }
            .into(),
        };
        let link = self.settings.link.clone();
        let id = ctx.publish(&link, payload, self.to_scada())?;
        debug!(message_id = %id, "Published command to SCADA");
        Ok(())
    }

    fn decode_mqtt_message(
        &mut self,
        _link: &str,
        receipt: Receipt<'_>,
        registry: &TypeRegistry<AtnPayload>,
    ) -> Result<Message<AtnPayload>, CodecError> {
        *self
            .data()
            .num_received_by_topic
            .entry(receipt.topic.to_string())
            .or_default() += 1;
        registry_decode(receipt, registry)
    }

    fn process_mqtt_message(
        &mut self,
        link: &str,
        message: Message<AtnPayload>,
        _ctx: &mut ProactorContext<'_, AtnPayload>,
    ) -> ProactorResult<()> {
        if message.header.src != self.settings.scada_alias {
            self.data().rejected += 1;
            return Err(ProactorError::actor(format!(
                "message on {link} from {} is not from SCADA {}",
                message.header.src, self.settings.scada_alias
            )));
        }
        {
            let mut data = self.data();
            data.num_received += 1;
            *data
                .num_received_by_type
                .entry(message.payload.type_alias().to_string())
                .or_default() += 1;
        }

        match message.payload {
            AtnPayload::GsPwr(pwr) => {
                debug!(power_w = pwr.power, "Received power");
                self.data().latest_power_w = Some(pwr.power);
            }
            AtnPayload::GtShStatus(status) => self.process_status(status)?,
            AtnPayload::SnapshotSpaceheat(snapshot) => self.process_snapshot(snapshot),
            AtnPayload::ProblemEvent(event) => {
                self.process_event(&event)?;
                info!(summary = %event.summary, "Problem reported by SCADA");
            }
            AtnPayload::GtShStatusEvent(event) => {
                self.process_event(&event)?;
                self.process_status(event.status)?;
            }
            AtnPayload::SnapshotSpaceheatEvent(event) => {
                self.process_event(&event)?;
                self.process_snapshot(event.snap);
            }
            other => {
                debug!(type_alias = %other.type_alias(), "No handler for message");
            }
        }
        Ok(())
    }

    fn on_comm_event(&mut self, event: &CommEvent, _ctx: &mut ProactorContext<'_, AtnPayload>) {
        if event.link == self.settings.link {
            self.data().link_state = Some(event.to);
        }
    }
}
