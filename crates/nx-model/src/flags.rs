//! Flag-bit vocabularies.
//!
//! Every status byte the panel reports expands to an ordered list of
//! human-readable names: iterate the vocabulary and append each name whose
//! bit is set. The tables follow the NX-584 protocol document; `reserved`
//! entries keep bit positions aligned and do appear in flag lists when the
//! panel sets those bits.

/// Zone condition byte (zone status message, byte 5).
pub const ZONE_CONDITION_FLAGS: [&str; 7] = [
    "Faulted",
    "Tampered",
    "Trouble",
    "Bypass",
    "Inhibit",
    "Low battery",
    "Loss of supervision",
];

/// Zone type/partition bytes (zone status message, bytes 2..5).
pub const ZONE_TYPE_FLAGS: [[&str; 8]; 3] = [
    [
        "Fire",
        "24 hour",
        "Key-switch",
        "Follower",
        "Entry / exit delay 1",
        "Entry / exit delay 2",
        "Interior",
        "Local only",
    ],
    [
        "Keypad sounder",
        "Yelping siren",
        "Steady siren",
        "Chime",
        "Bypassable",
        "Group bypassable",
        "Force armable",
        "Entry guard",
    ],
    [
        "Fast loop response",
        "Double EOL tamper",
        "Trouble",
        "Cross zone",
        "Dialer delay",
        "Swinger shutdown",
        "Restorable",
        "Listen in",
    ],
];

/// Partition condition bytes (partition status message, bytes 1..5 and 6..8).
pub const PARTITION_CONDITION_FLAGS: [[&str; 8]; 6] = [
    [
        "Bypass code required",
        "Fire trouble",
        "Fire",
        "Pulsing buzzer",
        "TLM fault memory",
        "reserved",
        "Armed",
        "Instant",
    ],
    [
        "Previous alarm",
        "Siren on",
        "Steady siren on",
        "Alarm memory",
        "Tamper",
        "Cancel command entered",
        "Code entered",
        "Cancel pending",
    ],
    [
        "reserved",
        "Silent exit enabled",
        "Entryguard (stay mode)",
        "Chime mode on",
        "Entry",
        "Delay expiration warning",
        "Exit 1",
        "Exit 2",
    ],
    [
        "LED extinguish",
        "Cross timing",
        "Recent closing being timed",
        "reserved",
        "Exit error triggered",
        "Auto home inhibited",
        "Sensor low battery",
        "Sensor lost supervision",
    ],
    [
        "Zone bypassed",
        "Force arm triggered by auto arm",
        "Ready to arm",
        "Ready to force arm",
        "Valid PIN accepted",
        "Chime on (sounding)",
        "Error beep (triple beep)",
        "Tone on (activation tone)",
    ],
    [
        "Entry 1",
        "Open period",
        "Alarm sent using phone number 1",
        "Alarm sent using phone number 2",
        "Alarm sent using phone number 3",
        "Cancel report is in the stack",
        "Keyswitch armed",
        "Delay trip in progress (common zone)",
    ],
];

/// System status bytes (system status message, bytes 1..10). The last
/// group names the partitions the panel considers valid.
pub const SYSTEM_STATUS_FLAGS: [[&str; 8]; 9] = [
    [
        "Line seizure",
        "Off hook",
        "Initial handshake received",
        "Download in progress",
        "Dialer delay in progress",
        "Using backup phone",
        "Listen in active",
        "Two way lockout",
    ],
    [
        "Ground fault",
        "Phone fault",
        "Fail to communicate",
        "Fuse fault",
        "Box tamper",
        "Siren tamper / trouble",
        "Low battery",
        "AC fail",
    ],
    [
        "Expander box tamper",
        "Expander AC failure",
        "Expander low battery",
        "Expander loss of supervision",
        "Expander auxiliary output over current",
        "Auxiliary communication channel failure",
        "Expander bell fault",
        "reserved",
    ],
    [
        "6 digit PIN enabled",
        "Programming token in use",
        "PIN required for local download",
        "Global pulsing buzzer",
        "Global siren on",
        "Global steady siren",
        "Bus device has line seized",
        "Bus device has requested sniff mode",
    ],
    [
        "Dynamic battery test",
        "AC power on",
        "Low battery memory",
        "Ground fault memory",
        "Fire alarm verification being timed",
        "Smoke power reset",
        "50 Hz line power detected",
        "Timing a high voltage battery charge",
    ],
    [
        "Communication since last autotest",
        "Power up delay in progress",
        "Walk test mode",
        "Loss of system time",
        "Enroll requested",
        "Test fixture mode",
        "Control shutdown mode",
        "Timing a cancel window",
    ],
    [
        "reserved",
        "reserved",
        "reserved",
        "reserved",
        "reserved",
        "reserved",
        "reserved",
        "Call back in progress",
    ],
    [
        "Phone line faulted",
        "Voltage present interrupt active",
        "House phone off hook",
        "Phone line monitor enabled",
        "Sniffing",
        "Last read was off hook",
        "Listen in requested",
        "Listen in trigger",
    ],
    [
        "Valid partition 1",
        "Valid partition 2",
        "Valid partition 3",
        "Valid partition 4",
        "Valid partition 5",
        "Valid partition 6",
        "Valid partition 7",
        "Valid partition 8",
    ],
];

/// The authority flag that marks a user as protected from remote edits.
pub const MASTER_AUTHORITY: &str = "Master / program";

/// User authority byte, low seven bits, when bit 7 is clear.
pub const USER_AUTHORITY_STANDARD: [&str; 7] = [
    "Reserved",
    "Arm only",
    "Arm only (during close window)",
    MASTER_AUTHORITY,
    "Arm / disarm",
    "Bypass enable",
    "Open / close report enabled",
];

/// User authority byte, low seven bits, when bit 7 is set.
pub const USER_AUTHORITY_OUTPUT: [&str; 7] = [
    "Output 1 enable",
    "Output 2 enable",
    "Output 3 enable",
    "Output 4 enable",
    "Arm / disarm",
    "Bypass enable",
    "Open / close report enabled",
];

/// Expand a single status byte against a flat vocabulary.
pub fn flags_from_byte(vocab: &[&str], byte: u8) -> Vec<String> {
    vocab
        .iter()
        .enumerate()
        .filter(|&(bit, _)| byte & (1 << bit) != 0)
        .map(|(_, name)| (*name).to_owned())
        .collect()
}

/// Expand consecutive status bytes against a per-byte vocabulary. Extra
/// bytes beyond the vocabulary (or vice versa) are ignored.
pub fn flags_from_bytes(vocab: &[[&str; 8]], bytes: &[u8]) -> Vec<String> {
    vocab
        .iter()
        .zip(bytes)
        .flat_map(|(names, &byte)| flags_from_byte(names, byte))
        .collect()
}
