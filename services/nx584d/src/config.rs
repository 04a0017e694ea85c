//! Gateway configuration loading and write-back.
//!
//! TOML is the sole config source. The file is read once at startup and
//! rewritten whenever the controller learns a zone name from the panel, so
//! names survive restarts. A missing file yields the defaults.
//!
//! # Sections
//! - `[config]` — protocol and controller tuning
//! - `[zones]`  — `"<number>" = "<name>"` for each known zone
//! - `[email]`  — SMTP notification settings (all optional)
//! - `[partition_<n>]` — per-partition notification flag lists

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Use the byte-stuffed binary transport instead of hex-ASCII.
    pub use_binary_protocol: bool,
    /// Accept zone names reported by the panel and persist them.
    pub zone_name_update: bool,
    /// Highest zone number to interrogate at startup.
    pub max_zone: u8,
    /// Quiet-link watchdog: after this many idle seconds, poll the panel.
    pub idle_time_heartbeat_seconds: u64,
    /// Log-event payloads carry day before month.
    pub euro_date_format: bool,
    /// Known zone names, keyed by 1-based zone number.
    pub zone_names: BTreeMap<u8, String>,
    pub email: EmailConfig,
    /// Per-partition notification settings, keyed by partition number.
    pub partition_notify: BTreeMap<u8, PartitionNotifyConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct EmailConfig {
    pub fromaddr: Option<String>,
    pub smtphost: Option<String>,
    /// Recipients for system status flag changes.
    pub system: Vec<String>,
    /// Recipients for alarm-class log events.
    pub alarms: Vec<String>,
    /// Event names that count as alarms.
    pub alarm_events: Vec<String>,
    /// Recipients for every log event.
    pub events: Vec<String>,
}

/// Per-partition notification lists. The `flags`, `status_flags`, and
/// `alarm_flags` keys are recipient address lists; only `ignore_flags`
/// actually names flags.
#[derive(Debug, Clone, Default)]
pub struct PartitionNotifyConfig {
    /// Recipients for flag-transition mail.
    pub flags: Vec<String>,
    /// Flag names excluded from transition mail.
    pub ignore_flags: Vec<String>,
    /// Recipients for armed/disarmed notices.
    pub status_flags: Vec<String>,
    /// Recipients for siren-on notices.
    pub alarm_flags: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            use_binary_protocol: false,
            zone_name_update: true,
            max_zone: 8,
            idle_time_heartbeat_seconds: 120,
            euro_date_format: false,
            zone_names: BTreeMap::new(),
            email: EmailConfig {
                alarm_events: default_alarm_events(),
                ..EmailConfig::default()
            },
            partition_notify: BTreeMap::new(),
        }
    }
}

fn default_alarm_events() -> Vec<String> {
    ["Alarm", "Alarm restore", "Manual fire"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Raw TOML types (Option for every field so partial files load)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<RawConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zones: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<RawEmail>,
    #[serde(flatten)]
    partitions: BTreeMap<String, RawPartitionNotify>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    use_binary_protocol: Option<bool>,
    zone_name_update: Option<bool>,
    max_zone: Option<u8>,
    idle_time_heartbeat_seconds: Option<u64>,
    euro_date_format: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawEmail {
    #[serde(skip_serializing_if = "Option::is_none")]
    fromaddr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    smtphost: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alarms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alarm_events: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawPartitionNotify {
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ignore_flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alarm_flags: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(String),
    #[error("serializing config: {0}")]
    Serialize(String),
    #[error("writing config file '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Split a comma list, trimming entries and dropping empties.
fn comma_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Load gateway config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    if !path.exists() {
        return Ok(GatewayConfig::default());
    }
    let toml_str = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_config_from_str(&toml_str)
}

/// Load gateway config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawFile = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = GatewayConfig::default();

    let raw_config = raw.config.unwrap_or_default();
    let mut zone_names = BTreeMap::new();
    for (key, name) in raw.zones.unwrap_or_default() {
        let number: u8 = key
            .parse()
            .map_err(|_| ConfigError::Parse(format!("invalid zone number '{key}'")))?;
        zone_names.insert(number, name);
    }

    let email = match raw.email {
        Some(e) => EmailConfig {
            fromaddr: e.fromaddr,
            smtphost: e.smtphost,
            system: comma_list(e.system),
            alarms: comma_list(e.alarms),
            alarm_events: match e.alarm_events {
                Some(v) => comma_list(Some(v)),
                None => default_alarm_events(),
            },
            events: comma_list(e.events),
        },
        None => defaults.email.clone(),
    };

    let mut partition_notify = BTreeMap::new();
    for (key, raw_part) in raw.partitions {
        let Some(suffix) = key.strip_prefix("partition_") else {
            return Err(ConfigError::Parse(format!("unexpected section '{key}'")));
        };
        let number: u8 = suffix
            .parse()
            .map_err(|_| ConfigError::Parse(format!("invalid partition section '{key}'")))?;
        partition_notify.insert(
            number,
            PartitionNotifyConfig {
                flags: comma_list(raw_part.flags),
                ignore_flags: comma_list(raw_part.ignore_flags),
                status_flags: comma_list(raw_part.status_flags),
                alarm_flags: comma_list(raw_part.alarm_flags),
            },
        );
    }

    Ok(GatewayConfig {
        use_binary_protocol: raw_config
            .use_binary_protocol
            .unwrap_or(defaults.use_binary_protocol),
        zone_name_update: raw_config.zone_name_update.unwrap_or(defaults.zone_name_update),
        max_zone: raw_config.max_zone.unwrap_or(defaults.max_zone),
        idle_time_heartbeat_seconds: raw_config
            .idle_time_heartbeat_seconds
            .unwrap_or(defaults.idle_time_heartbeat_seconds),
        euro_date_format: raw_config.euro_date_format.unwrap_or(defaults.euro_date_format),
        zone_names,
        email,
        partition_notify,
    })
}

fn join_list(list: &[String]) -> Option<String> {
    if list.is_empty() {
        None
    } else {
        Some(list.join(","))
    }
}

/// Write the config back to `path` (learned zone names included).
pub fn save_config(cfg: &GatewayConfig, path: &Path) -> Result<(), ConfigError> {
    let raw = RawFile {
        config: Some(RawConfig {
            use_binary_protocol: Some(cfg.use_binary_protocol),
            zone_name_update: Some(cfg.zone_name_update),
            max_zone: Some(cfg.max_zone),
            idle_time_heartbeat_seconds: Some(cfg.idle_time_heartbeat_seconds),
            euro_date_format: Some(cfg.euro_date_format),
        }),
        zones: if cfg.zone_names.is_empty() {
            None
        } else {
            Some(
                cfg.zone_names
                    .iter()
                    .map(|(n, name)| (n.to_string(), name.clone()))
                    .collect(),
            )
        },
        email: Some(RawEmail {
            fromaddr: cfg.email.fromaddr.clone(),
            smtphost: cfg.email.smtphost.clone(),
            system: join_list(&cfg.email.system),
            alarms: join_list(&cfg.email.alarms),
            alarm_events: join_list(&cfg.email.alarm_events),
            events: join_list(&cfg.email.events),
        }),
        partitions: cfg
            .partition_notify
            .iter()
            .map(|(n, p)| {
                (
                    format!("partition_{n}"),
                    RawPartitionNotify {
                        flags: join_list(&p.flags),
                        ignore_flags: join_list(&p.ignore_flags),
                        status_flags: join_list(&p.status_flags),
                        alarm_flags: join_list(&p.alarm_flags),
                    },
                )
            })
            .collect(),
    };

    let toml_str =
        toml::to_string_pretty(&raw).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    std::fs::write(path, toml_str).map_err(|e| ConfigError::Write {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
