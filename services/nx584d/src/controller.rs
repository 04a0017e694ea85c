//! The controller loop: single-task poller that owns the panel mirror.
//!
//! One iteration either receives a frame (ack it if asked, dispatch it to
//! the handler for its message type) or, on a quiet tick, sends at most one
//! queued command. Commands are never sent in direct response to a received
//! frame: interleaving replies with the panel's own traffic double-replies
//! on half-duplex links. A watchdog polls system status when the link has
//! been silent too long.
//!
//! All model mutation happens here; HTTP handlers only read the registries
//! and append to the outbound queue.

use crate::config::{self, GatewayConfig};
use crate::event_queue::EventQueue;
use crate::ext::PanelExtension;
use crate::mail::Mailer;
use crate::state::PanelState;
use crate::stream::{ConnectTarget, PanelStream, StreamTimeouts, WireProtocol};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use nx_model::{LogEvent, Partition, User, Zone, flags};
use nx_proto::{Frame, command};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Handler errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error("message type {msgtype} payload truncated ({len} bytes)")]
    Truncated { msgtype: u8, len: usize },
    #[error("log event carries an impossible timestamp")]
    BadTimestamp,
}

fn need(frame: &Frame, len: usize) -> Result<(), HandlerError> {
    if frame.data.len() < len {
        Err(HandlerError::Truncated {
            msgtype: frame.msgtype,
            len: frame.data.len(),
        })
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The panel controller. Create one, hand it the shared state and event
/// queue, then drive it with [`Controller::run_forever`] on its own task.
pub struct Controller {
    state: Arc<PanelState>,
    events: Arc<EventQueue>,
    config: GatewayConfig,
    config_path: PathBuf,
    target: ConnectTarget,
    timeouts: StreamTimeouts,
    extensions: Vec<Box<dyn PanelExtension>>,
    mailer: Mailer,
    running: Arc<AtomicBool>,
    last_activity: Instant,
}

impl Controller {
    pub fn new(
        config: GatewayConfig,
        config_path: PathBuf,
        target: ConnectTarget,
        state: Arc<PanelState>,
        events: Arc<EventQueue>,
    ) -> Controller {
        let mailer = Mailer::new(&config);
        Controller {
            state,
            events,
            config,
            config_path,
            target,
            timeouts: StreamTimeouts::default(),
            extensions: Vec::new(),
            mailer,
            running: Arc::new(AtomicBool::new(true)),
            last_activity: Instant::now(),
        }
    }

    /// Override the link timing knobs (tests shrink them).
    pub fn with_timeouts(mut self, timeouts: StreamTimeouts) -> Controller {
        self.timeouts = timeouts;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<Box<dyn PanelExtension>>) -> Controller {
        self.extensions = extensions;
        self
    }

    /// Clearing the returned flag stops the loop at its next iteration
    /// boundary; an in-flight read completes or times out first.
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    fn protocol(&self) -> WireProtocol {
        if self.config.use_binary_protocol {
            WireProtocol::Binary
        } else {
            WireProtocol::Ascii
        }
    }

    /// Connect and run until stopped. Any failed connect waits out the
    /// reconnect delay and tries again, so a panel that is down at boot
    /// does not kill the daemon.
    pub async fn run_forever(mut self) {
        self.seed_zone_names().await;
        while self.running.load(Ordering::SeqCst) {
            match PanelStream::connect_with_timeouts(
                self.target.clone(),
                self.protocol(),
                self.timeouts.clone(),
            )
            .await
            {
                Ok(stream) => self.run_connected(stream).await,
                Err(e) => {
                    warn!(error = %e, target = %self.target, "panel connect failed");
                    tokio::time::sleep(self.timeouts.reconnect_base).await;
                }
            }
        }
        info!("controller stopped");
    }

    /// Pre-create zones named in the config so `/zones` shows them before
    /// the panel has reported anything.
    async fn seed_zone_names(&self) {
        let mut zones = self.state.zones.write().await;
        for (&number, name) in &self.config.zone_names {
            zones
                .entry(number)
                .or_insert_with(|| Zone::new(number))
                .name = name.clone();
        }
    }

    /// The startup conversation: set the panel clock, ask for system
    /// status, then interrogate every configured zone.
    async fn startup(&self) {
        let now = Local::now();
        self.state
            .enqueue(command::set_clock(
                now.year().clamp(2000, 2255) as u16,
                now.month() as u8,
                now.day() as u8,
                now.hour() as u8,
                now.minute() as u8,
                now.weekday().num_days_from_monday() as u8,
            ))
            .await;
        self.state.request_system_status().await;
        for zone in 1..=self.config.max_zone {
            self.state.request_zone_status(zone).await;
            if !self.config.zone_names.contains_key(&zone) {
                self.state.request_zone_name(zone).await;
            }
        }
    }

    /// Drive one connection until it is stopped. Link loss is handled
    /// inside the stream; this loop never exits for link trouble.
    pub async fn run_connected(&mut self, mut stream: PanelStream) {
        self.startup().await;
        self.last_activity = Instant::now();
        let idle_heartbeat = Duration::from_secs(self.config.idle_time_heartbeat_seconds);
        while self.running.load(Ordering::SeqCst) {
            match stream.read_frame().await {
                None => {
                    if self.last_activity.elapsed() < idle_heartbeat {
                        if let Some(msg) = self.state.pop_outbound().await {
                            stream.write_frame(&msg).await;
                        }
                    } else {
                        debug!("link idle; queueing system status heartbeat");
                        self.state.request_system_status().await;
                        self.last_activity = Instant::now();
                    }
                }
                Some(body) => {
                    self.last_activity = Instant::now();
                    let frame = match Frame::decode(&body) {
                        Ok(f) => f,
                        Err(e) => {
                            warn!(error = %e, "dropping undecodable frame");
                            continue;
                        }
                    };
                    debug!(msgtype = frame.msgtype, len = frame.data.len(), "frame received");
                    if frame.ack_required {
                        stream.write_frame(&command::positive_ack()).await;
                    }
                    self.dispatch(&frame).await;
                }
            }
        }
    }

    /// Route a frame to the handler for its message type. Unknown types
    /// are ignored; a failing handler never takes the loop down.
    async fn dispatch(&mut self, frame: &Frame) {
        let result = match frame.msgtype {
            3 => self.handle_zone_name(frame).await,
            4 => self.handle_zone_status(frame).await,
            6 => self.handle_partition_status(frame).await,
            8 => self.handle_system_status(frame).await,
            9 => self.handle_device_command(frame).await,
            10 => self.handle_log_event(frame).await,
            18 => self.handle_user_info(frame).await,
            other => {
                debug!(msgtype = other, "ignoring unhandled message type");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(msgtype = frame.msgtype, error = %e, "handler failed");
        }
    }

    // -----------------------------------------------------------------------
    // Message handlers
    // -----------------------------------------------------------------------

    /// Type 3: Zone Name.
    async fn handle_zone_name(&mut self, frame: &Frame) -> Result<(), HandlerError> {
        need(frame, 1)?;
        let number = frame.data[0].wrapping_add(1);
        let name = String::from_utf8_lossy(&frame.data[1..]).trim().to_owned();
        debug!(zone = number, name = %name, "zone name received");
        if !self.config.zone_name_update {
            return Ok(());
        }
        {
            let mut zones = self.state.zones.write().await;
            zones
                .entry(number)
                .or_insert_with(|| Zone::new(number))
                .name = name.clone();
        }
        self.config.zone_names.insert(number, name);
        if let Err(e) = config::save_config(&self.config, &self.config_path) {
            warn!(error = %e, "failed to persist learned zone names");
        }
        Ok(())
    }

    /// Type 4: Zone Status.
    async fn handle_zone_status(&mut self, frame: &Frame) -> Result<(), HandlerError> {
        need(frame, 6)?;
        let d = &frame.data;
        let number = d[0].wrapping_add(1);
        let snapshot = {
            let mut zones = self.state.zones.write().await;
            let zone = zones.entry(number).or_insert_with(|| Zone::new(number));
            zone.state = d[5] & 0x01 != 0;
            zone.condition_flags = flags::flags_from_byte(&flags::ZONE_CONDITION_FLAGS, d[5]);
            zone.type_flags = flags::flags_from_bytes(&flags::ZONE_TYPE_FLAGS, &d[2..5]);
            zone.clone()
        };
        info!(
            zone = number,
            name = %snapshot.name,
            state = if snapshot.state { "FAULT" } else { "NORMAL" },
            "zone status"
        );
        self.events
            .push(json!({
                "type": "zone_status",
                "zone": snapshot.number,
                "name": snapshot.name.clone(),
                "state": snapshot.state,
                "bypassed": snapshot.bypassed(),
                "condition_flags": snapshot.condition_flags.clone(),
            }))
            .await;
        for ext in &self.extensions {
            ext.zone_status(&snapshot);
        }
        Ok(())
    }

    /// Type 6: Partition Status.
    async fn handle_partition_status(&mut self, frame: &Frame) -> Result<(), HandlerError> {
        need(frame, 8)?;
        let d = &frame.data;
        let number = d[0].wrapping_add(1);
        let mut flag_bytes = d[1..5].to_vec();
        flag_bytes.extend_from_slice(&d[6..8]);
        let new_flags = flags::flags_from_bytes(&flags::PARTITION_CONDITION_FLAGS, &flag_bytes);
        let (snapshot, asserted, deasserted) = {
            let mut partitions = self.state.partitions.write().await;
            let partition = partitions
                .entry(number)
                .or_insert_with(|| Partition::new(number));
            let asserted: Vec<String> = new_flags
                .iter()
                .filter(|f| !partition.condition_flags.contains(*f))
                .cloned()
                .collect();
            let deasserted: Vec<String> = partition
                .condition_flags
                .iter()
                .filter(|f| !new_flags.contains(*f))
                .cloned()
                .collect();
            partition.condition_flags = new_flags;
            partition.last_user = d[5];
            (partition.clone(), asserted, deasserted)
        };
        info!(
            partition = number,
            armed = snapshot.armed(),
            last_user = snapshot.last_user,
            "partition status"
        );
        self.events
            .push(json!({
                "type": "partition",
                "partition": snapshot.number,
                "armed": snapshot.armed(),
                "asserted": asserted.clone(),
                "deasserted": deasserted.clone(),
            }))
            .await;
        for ext in &self.extensions {
            ext.partition_status(&snapshot);
        }
        self.mailer
            .notify_partition_transitions(&snapshot, &deasserted, &asserted);
        Ok(())
    }

    /// Type 8: System Status.
    async fn handle_system_status(&mut self, frame: &Frame) -> Result<(), HandlerError> {
        need(frame, 10)?;
        let d = &frame.data;
        let new_flags = flags::flags_from_bytes(&flags::SYSTEM_STATUS_FLAGS, &d[1..10]);
        let (snapshot, asserted, deasserted) = {
            let mut system = self.state.system.write().await;
            system.panel_id = d[0];
            let old: HashSet<String> = system.status_flags.iter().cloned().collect();
            let new: HashSet<String> = new_flags.iter().cloned().collect();
            let asserted: Vec<String> =
                new_flags.iter().filter(|f| !old.contains(*f)).cloned().collect();
            let deasserted: Vec<String> = system
                .status_flags
                .iter()
                .filter(|f| !new.contains(*f))
                .cloned()
                .collect();
            system.status_flags = new_flags;
            (system.clone(), asserted, deasserted)
        };
        debug!(panel_id = snapshot.panel_id, "system status received");

        // Flag groups 1 and 2 are hardware trouble; their assertions log as
        // errors and their restorals as warnings.
        let error_bank: HashSet<&str> = flags::SYSTEM_STATUS_FLAGS[1]
            .iter()
            .chain(flags::SYSTEM_STATUS_FLAGS[2].iter())
            .copied()
            .collect();
        for flag in &deasserted {
            if error_bank.contains(flag.as_str()) {
                warn!(flag = %flag, "system de-asserts");
            } else {
                info!(flag = %flag, "system de-asserts");
            }
        }
        for flag in &asserted {
            if error_bank.contains(flag.as_str()) {
                error!(flag = %flag, "system asserts");
            } else {
                info!(flag = %flag, "system asserts");
            }
        }

        for flag in &asserted {
            if let Some(number) = flag.strip_prefix("Valid partition ") {
                if let Ok(number) = number.parse::<u8>() {
                    self.state.request_partition_status(number).await;
                }
            }
        }

        for ext in &self.extensions {
            ext.system_status(&snapshot);
        }
        self.mailer.notify_system(&deasserted, &asserted);
        Ok(())
    }

    /// Type 9: X-10 device command relayed by the panel.
    async fn handle_device_command(&mut self, frame: &Frame) -> Result<(), HandlerError> {
        need(frame, 3)?;
        let d = &frame.data;
        let house = char::from(b'A'.saturating_add(d[0]));
        let unit = d[1];
        let command = match d[2] {
            0x28 => "on".to_owned(),
            0x38 => "off".to_owned(),
            other => other.to_string(),
        };
        info!(house = %house, unit, command = %command, "device command");
        self.events
            .push(json!({
                "type": "device-command",
                "house": house,
                "unit": unit,
                "command": command.clone(),
            }))
            .await;
        for ext in &self.extensions {
            ext.device_command(house, unit, &command);
        }
        Ok(())
    }

    /// Type 10: Log Event.
    async fn handle_log_event(&mut self, frame: &Frame) -> Result<(), HandlerError> {
        need(frame, 9)?;
        let d = &frame.data;
        let (month, day) = if self.config.euro_date_format {
            (d[6], d[5])
        } else {
            (d[5], d[6])
        };
        // The panel does not report a year. Assume the current one, rolling
        // back across New Year when the event month is ahead of the clock.
        let now = Local::now();
        let mut year = now.year();
        if u32::from(month) > now.month() {
            year -= 1;
        }
        let timestamp = NaiveDate::from_ymd_opt(year, u32::from(month), u32::from(day))
            .and_then(|date| date.and_hms_opt(u32::from(d[7]), u32::from(d[8]), 0))
            .ok_or(HandlerError::BadTimestamp)?;
        let event = LogEvent {
            number: d[0],
            log_size: d[1],
            event_type: d[2] & 0x7F,
            reportable: d[2] & 0x80 != 0,
            zone_user_device: d[3],
            partition_number: d[4],
            timestamp,
        };
        info!(event = %event.event_string(), "panel log event");
        self.events
            .push(json!({
                "type": "log",
                "event": serde_json::to_value(&event).unwrap_or_default(),
                "event_string": event.event_string(),
            }))
            .await;
        for ext in &self.extensions {
            ext.log_event(&event);
        }
        self.mailer.notify_log_event(&event);
        Ok(())
    }

    /// Type 18: User Information Reply.
    async fn handle_user_info(&mut self, frame: &Frame) -> Result<(), HandlerError> {
        need(frame, 6)?;
        let d = &frame.data;
        let number = d[0];
        let mut pin = [0u8; 6];
        for (i, &byte) in d[1..4].iter().enumerate() {
            pin[2 * i] = byte & 0x0F;
            pin[2 * i + 1] = (byte >> 4) & 0x0F;
        }
        let vocabulary = if d[4] & 0x80 != 0 {
            &flags::USER_AUTHORITY_OUTPUT
        } else {
            &flags::USER_AUTHORITY_STANDARD
        };
        let authority_flags = flags::flags_from_byte(vocabulary, d[4] & 0x7F);
        let authorized_partitions: Vec<u8> =
            (0..8u8).filter(|&bit| d[5] & (1u8 << bit) != 0).map(|bit| bit + 1).collect();
        debug!(user = number, "user information received");
        let mut users = self.state.users.write().await;
        let user = users.entry(number).or_insert_with(|| User::new(number));
        user.pin = Some(pin);
        user.authority_flags = authority_flags;
        user.authorized_partitions = authorized_partitions;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests: handlers against constructed frames
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn frame(msgtype: u8, data: &[u8]) -> Frame {
        Frame {
            length: data.len() as u8 + 1,
            msgtype,
            ack_required: false,
            data: data.to_vec(),
            checksum: 0,
        }
    }

    fn test_controller(dir: &tempfile::TempDir) -> (Controller, Arc<PanelState>, Arc<EventQueue>) {
        test_controller_with(dir, GatewayConfig::default())
    }

    fn test_controller_with(
        dir: &tempfile::TempDir,
        config: GatewayConfig,
    ) -> (Controller, Arc<PanelState>, Arc<EventQueue>) {
        let state = Arc::new(PanelState::new());
        let events = Arc::new(EventQueue::new(100));
        let controller = Controller::new(
            config,
            dir.path().join("nx584.toml"),
            ConnectTarget::Tcp {
                addr: "127.0.0.1:1".to_owned(),
            },
            Arc::clone(&state),
            Arc::clone(&events),
        );
        (controller, state, events)
    }

    #[tokio::test]
    async fn partition_status_decodes_the_documented_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, state, events) = test_controller(&dir);
        let payload = [0x00, 0x68, 0x00, 0xE0, 0x40, 0x62, 0x04, 0x82, 0x02, 0x07];
        c.dispatch(&frame(6, &payload)).await;

        let partitions = state.partitions.read().await;
        let p = partitions.get(&1).expect("partition 1 created");
        assert!(p.armed());
        assert_eq!(p.last_user, 0x62);
        assert_eq!(
            p.condition_flags,
            vec![
                "Pulsing buzzer",
                "reserved",
                "Armed",
                "Delay expiration warning",
                "Exit 1",
                "Exit 2",
                "Sensor low battery",
                "Ready to arm",
                "Open period",
                "Delay trip in progress (common zone)",
            ]
        );

        let pushed = events.get(0, StdDuration::ZERO).await;
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].payload["type"], "partition");
        assert_eq!(pushed[0].payload["armed"], true);
    }

    #[tokio::test]
    async fn zone_status_sets_state_flags_and_bypass() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, state, events) = test_controller(&dir);
        // Zone 3 (wire 0x02), types: Interior (byte 0 bit 6), condition:
        // Faulted + Inhibit (0x11).
        c.dispatch(&frame(4, &[0x02, 0x00, 0x40, 0x00, 0x00, 0x11])).await;

        let zones = state.zones.read().await;
        let z = zones.get(&3).expect("zone 3 created");
        assert!(z.state);
        assert_eq!(z.condition_flags, vec!["Faulted", "Inhibit"]);
        assert_eq!(z.type_flags, vec!["Interior"]);
        assert!(z.bypassed());

        let pushed = events.get(0, StdDuration::ZERO).await;
        assert_eq!(pushed[0].payload["type"], "zone_status");
        assert_eq!(pushed[0].payload["zone"], 3);
        assert_eq!(pushed[0].payload["bypassed"], true);
    }

    #[tokio::test]
    async fn system_status_requests_newly_valid_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, state, _) = test_controller(&dir);
        // Panel id 0x21; byte 9 says partitions 1 and 3 are valid.
        let payload = [0x21, 0, 0, 0, 0, 0, 0, 0, 0, 0b0000_0101];
        c.dispatch(&frame(8, &payload)).await;

        assert_eq!(state.system.read().await.panel_id, 0x21);
        assert_eq!(state.pop_outbound().await, Some(vec![0x26, 0x00]));
        assert_eq!(state.pop_outbound().await, Some(vec![0x26, 0x02]));
        assert_eq!(state.pop_outbound().await, None);

        // A repeat report asserts nothing new, so no more requests.
        c.dispatch(&frame(8, &payload)).await;
        assert_eq!(state.pop_outbound().await, None);
    }

    #[tokio::test]
    async fn device_command_maps_known_codes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _, events) = test_controller(&dir);
        c.dispatch(&frame(9, &[0x02, 5, 0x28])).await;
        c.dispatch(&frame(9, &[0x00, 1, 0x44])).await;

        let pushed = events.get(0, StdDuration::ZERO).await;
        assert_eq!(pushed[0].payload["house"], "C");
        assert_eq!(pushed[0].payload["unit"], 5);
        assert_eq!(pushed[0].payload["command"], "on");
        assert_eq!(pushed[1].payload["command"], "68");
    }

    #[tokio::test]
    async fn log_event_rolls_the_year_back_across_new_year() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _, events) = test_controller(&dir);
        let now = Local::now();

        // An event stamped with the current month keeps the current year.
        let payload = [1, 185, 0x80, 5, 1, now.month() as u8, 1, 12, 30];
        c.dispatch(&frame(10, &payload)).await;
        let pushed = events.get(0, StdDuration::ZERO).await;
        let ts = pushed[0].payload["event"]["timestamp"]
            .as_str()
            .expect("timestamp string")
            .to_owned();
        assert!(ts.starts_with(&now.year().to_string()), "got {ts}");
        assert_eq!(pushed[0].payload["event"]["reportable"], true);
        assert_eq!(pushed[0].payload["event"]["event_type"], 0);
        assert_eq!(pushed[0].payload["event_string"], "Zone 5 Alarm");

        // A month ahead of the clock must be last year's.
        if now.month() < 12 {
            let payload = [2, 185, 0x00, 5, 1, now.month() as u8 + 1, 1, 12, 30];
            c.dispatch(&frame(10, &payload)).await;
            let pushed = events.get(1, StdDuration::ZERO).await;
            let ts = pushed[0].payload["event"]["timestamp"]
                .as_str()
                .expect("timestamp string")
                .to_owned();
            assert!(ts.starts_with(&(now.year() - 1).to_string()), "got {ts}");
        }
    }

    #[tokio::test]
    async fn euro_date_format_swaps_month_and_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.euro_date_format = true;
        let (mut c, _, events) = test_controller_with(&dir, config);
        // Day 25, month 1: in euro order the payload is day-then-month.
        c.dispatch(&frame(10, &[1, 185, 46, 0, 1, 25, 1, 6, 0])).await;
        let pushed = events.get(0, StdDuration::ZERO).await;
        let ts = pushed[0].payload["event"]["timestamp"]
            .as_str()
            .expect("timestamp string")
            .to_owned();
        assert!(ts.contains("-01-25"), "got {ts}");
    }

    #[tokio::test]
    async fn user_info_unpacks_pin_and_authorities() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, state, _) = test_controller(&dir);
        // User 2, PIN 123456 packed low/high, standard authority with
        // Master (bit 3) + Arm / disarm (bit 4), partitions 1 and 2.
        c.dispatch(&frame(18, &[2, 0x21, 0x43, 0x65, 0b0001_1000, 0b0000_0011])).await;

        let users = state.users.read().await;
        let u = users.get(&2).expect("user 2 created");
        assert_eq!(u.pin, Some([1, 2, 3, 4, 5, 6]));
        assert_eq!(u.authority_flags, vec!["Master / program", "Arm / disarm"]);
        assert_eq!(u.authorized_partitions, vec![1, 2]);
        assert!(u.is_master());
    }

    #[tokio::test]
    async fn user_info_high_bit_selects_output_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, state, _) = test_controller(&dir);
        c.dispatch(&frame(18, &[5, 0xFF, 0xFF, 0xFF, 0b1000_0001, 0x00])).await;

        let users = state.users.read().await;
        let u = users.get(&5).expect("user 5 created");
        assert_eq!(u.authority_flags, vec!["Output 1 enable"]);
        assert!(!u.is_master());
        assert_eq!(u.pin, Some([15, 15, 15, 15, 15, 15]));
    }

    #[tokio::test]
    async fn zone_name_updates_model_and_persists_config() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, state, _) = test_controller(&dir);
        let mut payload = vec![0x00];
        payload.extend_from_slice(b"Front Door      ");
        c.dispatch(&frame(3, &payload)).await;

        assert_eq!(state.zones.read().await.get(&1).expect("zone 1").name, "Front Door");
        let saved = config::load_config(&dir.path().join("nx584.toml")).unwrap();
        assert_eq!(saved.zone_names.get(&1).expect("persisted"), "Front Door");
    }

    #[tokio::test]
    async fn zone_name_update_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.zone_name_update = false;
        let (mut c, state, _) = test_controller_with(&dir, config);
        c.dispatch(&frame(3, &[0x00, b'X'])).await;

        assert!(state.zones.read().await.is_empty());
        assert!(!dir.path().join("nx584.toml").exists());
    }

    #[tokio::test]
    async fn truncated_payloads_are_rejected_without_panic() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, state, events) = test_controller(&dir);
        for msgtype in [3, 4, 6, 8, 9, 10, 18] {
            c.dispatch(&frame(msgtype, &[])).await;
        }
        assert!(state.zones.read().await.is_empty());
        assert!(state.partitions.read().await.is_empty());
        assert!(events.get(0, StdDuration::ZERO).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_message_types_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut c, _, events) = test_controller(&dir);
        c.dispatch(&frame(0x2A, &[1, 2, 3])).await;
        assert!(events.get(0, StdDuration::ZERO).await.is_empty());
    }

    #[tokio::test]
    async fn extensions_observe_dispatched_messages() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Recorder {
            calls: Arc<Mutex<Vec<String>>>,
        }
        impl PanelExtension for Recorder {
            fn zone_status(&self, zone: &Zone) {
                self.calls.lock().unwrap().push(format!("zone {}", zone.number));
            }
            fn device_command(&self, house: char, unit: u8, command: &str) {
                self.calls
                    .lock()
                    .unwrap()
                    .push(format!("device {house}{unit} {command}"));
            }
        }

        let calls = Arc::new(Mutex::new(Vec::new()));
        let dir = tempfile::tempdir().unwrap();
        let (c, _, _) = test_controller(&dir);
        let mut c = c.with_extensions(vec![Box::new(Recorder {
            calls: Arc::clone(&calls),
        })]);

        c.dispatch(&frame(4, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00])).await;
        c.dispatch(&frame(9, &[0x00, 7, 0x38])).await;

        assert_eq!(*calls.lock().unwrap(), vec!["zone 1", "device A7 off"]);
    }

    #[tokio::test]
    async fn startup_enqueues_clock_status_and_zone_interrogation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::default();
        config.max_zone = 2;
        config.zone_names.insert(2, "Kitchen".to_owned());
        let (c, state, _) = test_controller_with(&dir, config);
        c.startup().await;

        let clock = state.pop_outbound().await.expect("clock command");
        assert_eq!(clock[0], 0x3B);
        assert_eq!(clock.len(), 7);
        assert_eq!(state.pop_outbound().await, Some(vec![0x28]));
        assert_eq!(state.pop_outbound().await, Some(vec![0x24, 0x00]));
        // Zone 1 has no configured name, so its name is requested too.
        assert_eq!(state.pop_outbound().await, Some(vec![0x23, 0x00]));
        // Zone 2 is named in the config: status only.
        assert_eq!(state.pop_outbound().await, Some(vec![0x24, 0x01]));
        assert_eq!(state.pop_outbound().await, None);
    }
}
