//! Outbound command payload builders.
//!
//! Each builder returns the message bytes (type byte + payload) without the
//! length/checksum wrapper; the frame codec adds those at write time. Zone,
//! partition, and user numbers are 1-based at this interface; the wire is
//! 0-based where the panel protocol says so.

/// A PIN digit value meaning "not set".
pub const PIN_UNSET: u8 = 15;

/// Positive acknowledgement.
pub fn positive_ack() -> Vec<u8> {
    vec![0x1D]
}

/// Negative acknowledgement.
pub fn negative_ack() -> Vec<u8> {
    vec![0x1E]
}

/// Request the configured name of a zone.
pub fn zone_name_request(zone: u8) -> Vec<u8> {
    vec![0x23, zone - 1]
}

/// Request the status of a zone.
pub fn zone_status_request(zone: u8) -> Vec<u8> {
    vec![0x24, zone - 1]
}

/// Request the status of a partition.
pub fn partition_status_request(partition: u8) -> Vec<u8> {
    vec![0x26, partition - 1]
}

/// Request the panel system status.
pub fn system_status_request() -> Vec<u8> {
    vec![0x28]
}

/// Request a user record. Requires the master PIN.
pub fn user_info_request(master_pin: &str, user: u8) -> Vec<u8> {
    let mut msg = vec![0x32];
    msg.extend_from_slice(&pack_pin(master_pin));
    msg.push(user);
    msg
}

/// Program a user's PIN. Requires the master PIN. `pin` is the six digit
/// values (use [`PIN_UNSET`] to clear a digit pair).
pub fn set_user_code(master_pin: &str, user: u8, pin: &[u8; 6]) -> Vec<u8> {
    let mut msg = vec![0x34];
    msg.extend_from_slice(&pack_pin(master_pin));
    msg.push(user);
    msg.extend_from_slice(&pack_digits(pin));
    msg
}

/// Set the panel clock and calendar. `weekday_monday0` is 0 for Monday,
/// as chrono counts; the panel wants 1 for Sunday through 7 for Saturday.
pub fn set_clock(year: u16, month: u8, day: u8, hour: u8, minute: u8, weekday_monday0: u8) -> Vec<u8> {
    vec![
        0x3B,
        (year.saturating_sub(2000) & 0xFF) as u8,
        month,
        day,
        hour,
        minute,
        ((weekday_monday0 + 1) % 7) + 1,
    ]
}

/// Disarm a partition (primary keypad function 0x01, with PIN).
pub fn disarm(pin: &str, partition: u8) -> Vec<u8> {
    let mut msg = vec![0x3C];
    msg.extend_from_slice(&pack_pin(pin));
    msg.push(0x01);
    msg.push(partition);
    msg
}

/// Arm in auto mode (secondary keypad function).
pub fn arm_auto() -> Vec<u8> {
    vec![0x3D, 0x05, 0x01, 0x01]
}

/// Arm in stay mode (primary keypad function, no PIN).
pub fn arm_stay(partition: u8) -> Vec<u8> {
    vec![0x3E, 0x00, partition]
}

/// Arm in exit mode (primary keypad function, no PIN).
pub fn arm_exit(partition: u8) -> Vec<u8> {
    vec![0x3E, 0x02, partition]
}

/// Toggle the bypass state of a zone.
pub fn zone_bypass_toggle(zone: u8) -> Vec<u8> {
    vec![0x3F, zone - 1]
}

// ---------------------------------------------------------------------------
// PIN packing
// ---------------------------------------------------------------------------

/// Pack a PIN string into the three nibble-paired bytes the panel expects:
/// `b[i] = (d[2i+1] << 4) | d[2i]`. Any byte with a missing digit becomes
/// `0xFF`, so a four-digit PIN packs to two bytes plus `0xFF`.
pub fn pack_pin(pin: &str) -> [u8; 3] {
    let mut digits = [PIN_UNSET; 6];
    for (slot, digit) in digits.iter_mut().zip(pin.chars().filter_map(|c| c.to_digit(10))) {
        *slot = digit as u8;
    }
    pack_digits(&digits)
}

/// Pack six digit values (0..=9, or [`PIN_UNSET`]) into three bytes.
pub fn pack_digits(digits: &[u8; 6]) -> [u8; 3] {
    let mut out = [0xFF; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let (lo, hi) = (digits[2 * i], digits[2 * i + 1]);
        if lo <= 9 && hi <= 9 {
            *slot = (hi << 4) | lo;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
