//! Shared panel mirror and outbound command queue.
//!
//! The controller task is the only writer of the registries; HTTP handlers
//! read them and enqueue commands. Entries are created lazily on first
//! reference and live for the process lifetime. Locks are per-registry, so
//! a reader always sees a complete per-entity snapshot.

use nx_model::{Partition, System, User, Zone};
use nx_proto::command;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Process-wide panel state shared between the controller and HTTP layer.
#[derive(Default)]
pub struct PanelState {
    pub zones: RwLock<BTreeMap<u8, Zone>>,
    pub partitions: RwLock<BTreeMap<u8, Partition>>,
    pub users: RwLock<BTreeMap<u8, User>>,
    pub system: RwLock<System>,
    /// Outbound command payloads, strictly FIFO. Appended by HTTP handlers
    /// and the controller; drained only by the controller during quiet
    /// periods on the link.
    outbound: Mutex<VecDeque<Vec<u8>>>,
}

impl PanelState {
    pub fn new() -> PanelState {
        PanelState::default()
    }

    // -----------------------------------------------------------------------
    // Outbound queue
    // -----------------------------------------------------------------------

    pub async fn enqueue(&self, msg: Vec<u8>) {
        debug!(msgtype = msg.first().copied().unwrap_or(0), "command queued");
        self.outbound.lock().await.push_back(msg);
    }

    pub async fn pop_outbound(&self) -> Option<Vec<u8>> {
        self.outbound.lock().await.pop_front()
    }

    pub async fn outbound_len(&self) -> usize {
        self.outbound.lock().await.len()
    }

    // -----------------------------------------------------------------------
    // Command methods (the mutation surface HTTP handlers call)
    // -----------------------------------------------------------------------

    pub async fn arm_stay(&self, partition: u8) {
        self.enqueue(command::arm_stay(partition)).await;
    }

    pub async fn arm_exit(&self, partition: u8) {
        self.enqueue(command::arm_exit(partition)).await;
    }

    pub async fn arm_auto(&self) {
        self.enqueue(command::arm_auto()).await;
    }

    pub async fn disarm(&self, master_pin: &str, partition: u8) {
        self.enqueue(command::disarm(master_pin, partition)).await;
    }

    pub async fn zone_bypass_toggle(&self, zone: u8) {
        self.enqueue(command::zone_bypass_toggle(zone)).await;
    }

    pub async fn request_zone_name(&self, zone: u8) {
        self.enqueue(command::zone_name_request(zone)).await;
    }

    pub async fn request_zone_status(&self, zone: u8) {
        self.enqueue(command::zone_status_request(zone)).await;
    }

    pub async fn request_partition_status(&self, partition: u8) {
        self.enqueue(command::partition_status_request(partition)).await;
    }

    pub async fn request_system_status(&self) {
        self.enqueue(command::system_status_request()).await;
    }

    pub async fn request_user_info(&self, master_pin: &str, user: u8) {
        self.enqueue(command::user_info_request(master_pin, user)).await;
    }

    pub async fn set_user_code(&self, master_pin: &str, user: u8, pin: &[u8; 6]) {
        self.enqueue(command::set_user_code(master_pin, user, pin)).await;
    }

    // -----------------------------------------------------------------------
    // Derived queries
    // -----------------------------------------------------------------------

    /// All interior zones are currently inhibited (the panel's stay-mode
    /// bypass state).
    pub async fn interior_bypassed(&self) -> bool {
        let zones = self.zones.read().await;
        zones
            .values()
            .filter(|z| z.interior())
            .all(|z| z.condition_flags.iter().any(|f| f == "Inhibit"))
    }
}
