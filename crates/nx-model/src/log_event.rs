//! Panel log events.
//!
//! The panel numbers log entries itself and reports them with a
//! month/day/hour/minute timestamp but no year; the year is inferred from
//! the wall clock when the event is decoded.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Log event codes whose subject is a zone.
const ZONE_EVENTS: [u8; 14] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 17];
/// Log event codes whose subject is a bus device.
const DEVICE_EVENTS: [u8; 12] = [24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 38, 39];
/// Log event codes whose subject is a user.
const USER_EVENTS: [u8; 6] = [42, 43, 44, 45, 51, 55];

/// One entry from the panel's internal log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    /// Panel-assigned entry number (wraps at the log size).
    pub number: u8,
    /// Total log capacity as reported alongside the entry.
    pub log_size: u8,
    /// Event code (the low seven bits of the type byte).
    pub event_type: u8,
    /// Top bit of the type byte: the event is reportable to a central
    /// station.
    pub reportable: bool,
    /// Zone, user, or device number, depending on the event code.
    pub zone_user_device: u8,
    pub partition_number: u8,
    /// Reconstructed local timestamp (year inferred from the clock).
    pub timestamp: NaiveDateTime,
}

impl LogEvent {
    /// The documented name of this event code.
    pub fn event_name(&self) -> String {
        event_name(self.event_type)
            .map_or_else(|| format!("Unknown event {}", self.event_type), str::to_owned)
    }

    /// Human-readable event line: `Zone N <event>`, `User N <event>`,
    /// `Device N <event>`, or the bare event name.
    pub fn event_string(&self) -> String {
        let event = self.event_name();
        if ZONE_EVENTS.contains(&self.event_type) {
            format!("Zone {} {}", self.zone_user_device, event)
        } else if DEVICE_EVENTS.contains(&self.event_type) {
            format!("Device {} {}", self.zone_user_device, event)
        } else if USER_EVENTS.contains(&self.event_type) {
            format!("User {} {}", self.zone_user_device, event)
        } else {
            event
        }
    }
}

/// Event-code table from the NX-584 protocol document.
pub fn event_name(event_type: u8) -> Option<&'static str> {
    Some(match event_type {
        0 => "Alarm",
        1 => "Alarm restore",
        2 => "Bypass",
        3 => "Bypass restore",
        4 => "Tamper",
        5 => "Tamper restore",
        6 => "Trouble",
        7 => "Trouble restore",
        8 => "TX low battery",
        9 => "TX low battery restore",
        10 => "Zone lost",
        11 => "Zone lost restore",
        12 => "Start of cross time",
        17 => "Special expansion event",
        18 => "Duress",
        19 => "Manual fire",
        20 => "Auxiliary 2 panic",
        22 => "Panic",
        23 => "Keypad tamper",
        24 => "Control box tamper",
        25 => "Control box tamper restore",
        26 => "AC fail",
        27 => "AC fail restore",
        28 => "Low battery",
        29 => "Low battery restore",
        30 => "Over-current",
        31 => "Over-current restore",
        32 => "Siren tamper",
        33 => "Siren tamper restore",
        34 => "Telephone fault",
        35 => "Telephone fault restore",
        38 => "Expander trouble",
        39 => "Expander trouble restore",
        40 => "Fail to communicate",
        41 => "Log full",
        42 => "Opening",
        43 => "Closing",
        44 => "Exit error",
        45 => "Recent closing",
        46 => "Auto-test",
        47 => "Start program",
        48 => "End program",
        49 => "Start download",
        50 => "End download",
        51 => "Cancel",
        52 => "Ground fault",
        53 => "Ground fault restore",
        54 => "Manual test",
        55 => "Closed with zones bypassed",
        56 => "Start of listen in",
        57 => "Technician on site",
        58 => "Technician left",
        59 => "Control power up",
        119 => "Data lost",
        _ => return None,
    })
}
