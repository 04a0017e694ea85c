//! Domain model for the NX-584 panel mirror.
//!
//! Plain data types for zones, partitions, the panel system block, users,
//! and log events, together with the flag-bit vocabularies their status
//! lists are drawn from. All mutation happens in the controller; everything
//! here is inert data with a few derived accessors.

pub mod flags;
pub mod log_event;

pub use log_event::LogEvent;

use serde::Serialize;

/// A PIN digit value meaning "not set".
pub const PIN_UNSET: u8 = 15;

// ---------------------------------------------------------------------------
// Zone
// ---------------------------------------------------------------------------

/// A single sensor input on the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    /// 1-based zone number.
    pub number: u8,
    /// Display name, from config or learned from the panel.
    pub name: String,
    /// True when the zone is faulted.
    pub state: bool,
    /// Active condition flags, in vocabulary order.
    pub condition_flags: Vec<String>,
    /// Active type flags, in vocabulary order.
    pub type_flags: Vec<String>,
}

impl Zone {
    pub fn new(number: u8) -> Zone {
        Zone {
            number,
            name: "Unknown".to_owned(),
            state: false,
            condition_flags: Vec::new(),
            type_flags: Vec::new(),
        }
    }

    /// A zone is bypassed when the panel inhibits it or a bypass is forced.
    pub fn bypassed(&self) -> bool {
        self.condition_flags
            .iter()
            .any(|f| f == "Inhibit" || f == "Bypass")
    }

    /// Interior zones participate in the stay/entryguard logic.
    pub fn interior(&self) -> bool {
        self.type_flags.iter().any(|f| f == "Interior")
    }
}

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

/// A logically independent armable grouping of zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// 1-based partition number.
    pub number: u8,
    /// Active condition flags, in vocabulary order.
    pub condition_flags: Vec<String>,
    /// The user code most recently entered on this partition.
    pub last_user: u8,
}

impl Partition {
    pub fn new(number: u8) -> Partition {
        Partition {
            number,
            condition_flags: Vec::new(),
            last_user: 0,
        }
    }

    pub fn armed(&self) -> bool {
        self.condition_flags.iter().any(|f| f == "Armed")
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// The process-wide panel system block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct System {
    pub panel_id: u8,
    /// Active status flags, in vocabulary order.
    pub status_flags: Vec<String>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A panel user code slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// 1-based user number; user 1 is the master.
    pub number: u8,
    /// Six PIN digit values, [`PIN_UNSET`] for unset digits. `None` until
    /// the panel has replied to a user-info request.
    pub pin: Option<[u8; 6]>,
    /// Active authority flags from one of the two authority vocabularies.
    pub authority_flags: Vec<String>,
    /// Partition numbers (1..=8) this user may operate.
    pub authorized_partitions: Vec<u8>,
}

impl User {
    pub fn new(number: u8) -> User {
        User {
            number,
            pin: None,
            authority_flags: Vec::new(),
            authorized_partitions: Vec::new(),
        }
    }

    /// Master users may not be reprogrammed over the HTTP surface.
    pub fn is_master(&self) -> bool {
        self.authority_flags
            .iter()
            .any(|f| f == flags::MASTER_AUTHORITY)
    }
}
