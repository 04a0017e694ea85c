//! HTTP/JSON surface.
//!
//! Read-mostly endpoints over the shared panel mirror, command endpoints
//! that append to the outbound queue, and a long-poll event feed. The only
//! authentication is the `Master-Pin` header on the user endpoints; it is
//! forwarded to the panel, which is the actual authority.

use crate::event_queue::EventQueue;
use crate::state::PanelState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nx_model::{PIN_UNSET, Partition, User, Zone};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// The version string reported by `GET /version`.
const API_VERSION: &str = "1.1";

// ---------------------------------------------------------------------------
// Router and state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiState {
    pub panel: Arc<PanelState>,
    pub events: Arc<EventQueue>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/zones", get(list_zones))
        .route("/zones/{zone}", axum::routing::put(update_zone))
        .route("/partitions", get(list_partitions))
        .route("/command", get(run_command))
        .route("/users/{user}", get(get_user).put(update_user))
        .route("/events", get(poll_events))
        .route("/version", get(version))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON views
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ZoneView {
    number: u8,
    name: String,
    state: bool,
    bypassed: bool,
    condition_flags: Vec<String>,
    type_flags: Vec<String>,
}

impl From<&Zone> for ZoneView {
    fn from(zone: &Zone) -> ZoneView {
        ZoneView {
            number: zone.number,
            name: zone.name.clone(),
            state: zone.state,
            bypassed: zone.bypassed(),
            condition_flags: zone.condition_flags.clone(),
            type_flags: zone.type_flags.clone(),
        }
    }
}

#[derive(Serialize)]
struct PartitionView {
    number: u8,
    condition_flags: Vec<String>,
    armed: bool,
    last_user: u8,
}

impl From<&Partition> for PartitionView {
    fn from(partition: &Partition) -> PartitionView {
        PartitionView {
            number: partition.number,
            condition_flags: partition.condition_flags.clone(),
            armed: partition.armed(),
            last_user: partition.last_user,
        }
    }
}

#[derive(Serialize)]
struct UserView {
    number: u8,
    pin: Option<[u8; 6]>,
    authority_flags: Vec<String>,
    authorized_partitions: Vec<u8>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> UserView {
        UserView {
            number: user.number,
            pin: user.pin,
            authority_flags: user.authority_flags.clone(),
            authorized_partitions: user.authorized_partitions.clone(),
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

async fn list_zones(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let zones = state.panel.zones.read().await;
    let views: Vec<ZoneView> = zones.values().map(ZoneView::from).collect();
    Json(json!({ "zones": views }))
}

#[derive(Deserialize)]
struct ZoneUpdate {
    bypassed: Option<bool>,
}

async fn update_zone(
    State(state): State<ApiState>,
    Path(zone): Path<u8>,
    Json(body): Json<ZoneUpdate>,
) -> Response {
    let Some(want) = body.bypassed else {
        return error_body(StatusCode::BAD_REQUEST, "body must carry 'bypassed'");
    };
    {
        let zones = state.panel.zones.read().await;
        match zones.get(&zone) {
            None => return error_body(StatusCode::NOT_FOUND, "unknown zone"),
            Some(z) if z.bypassed() == want => {
                return error_body(StatusCode::CONFLICT, "zone already in that state");
            }
            Some(_) => {}
        }
    }
    state.panel.zone_bypass_toggle(zone).await;
    Json(json!({"queued": true})).into_response()
}

// ---------------------------------------------------------------------------
// Partitions
// ---------------------------------------------------------------------------

async fn list_partitions(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let partitions = state.panel.partitions.read().await;
    let views: Vec<PartitionView> = partitions.values().map(PartitionView::from).collect();
    Json(json!({ "partitions": views }))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CommandQuery {
    cmd: Option<String>,
    #[serde(rename = "type")]
    arm_type: Option<String>,
    master_pin: Option<String>,
    partition: Option<u8>,
}

async fn run_command(State(state): State<ApiState>, Query(q): Query<CommandQuery>) -> Response {
    let partition = q.partition.unwrap_or(1);
    match q.cmd.as_deref() {
        Some("arm") => match q.arm_type.as_deref() {
            Some("stay") => state.panel.arm_stay(partition).await,
            Some("exit") => state.panel.arm_exit(partition).await,
            Some("auto") => state.panel.arm_auto().await,
            _ => return error_body(StatusCode::BAD_REQUEST, "type must be stay, exit, or auto"),
        },
        Some("disarm") => match q.master_pin.as_deref() {
            Some(pin) => state.panel.disarm(pin, partition).await,
            None => return error_body(StatusCode::BAD_REQUEST, "disarm requires master_pin"),
        },
        _ => return error_body(StatusCode::BAD_REQUEST, "cmd must be arm or disarm"),
    }
    Json(json!({"queued": true})).into_response()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn master_pin(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Master-Pin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[derive(Deserialize)]
struct UserQuery {
    retry: Option<String>,
}

async fn get_user(
    State(state): State<ApiState>,
    Path(user): Path<u8>,
    Query(q): Query<UserQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(pin) = master_pin(&headers) else {
        return error_body(StatusCode::FORBIDDEN, "Master-Pin header required");
    };
    {
        let users = state.panel.users.read().await;
        if let Some(u) = users.get(&user) {
            return Json(UserView::from(u)).into_response();
        }
    }
    if q.retry.as_deref() == Some("yes") {
        // The earlier fetch has not been answered yet; the caller keeps
        // polling without queueing duplicates.
        return error_body(StatusCode::NOT_FOUND, "user not reported by panel");
    }
    state.panel.request_user_info(&pin, user).await;
    (
        StatusCode::ACCEPTED,
        Json(json!({"pending": true, "retry": "add ?retry=yes"})),
    )
        .into_response()
}

#[derive(Deserialize)]
struct UserUpdate {
    pin: Option<Vec<u8>>,
}

async fn update_user(
    State(state): State<ApiState>,
    Path(user): Path<u8>,
    headers: HeaderMap,
    Json(body): Json<UserUpdate>,
) -> Response {
    let Some(pin) = master_pin(&headers) else {
        return error_body(StatusCode::FORBIDDEN, "Master-Pin header required");
    };
    if user == 1 {
        return error_body(StatusCode::FORBIDDEN, "the master user is not editable");
    }
    {
        let users = state.panel.users.read().await;
        if users.get(&user).is_some_and(User::is_master) {
            return error_body(StatusCode::FORBIDDEN, "users with master authority are not editable");
        }
    }
    let digits = match body.pin {
        None => [PIN_UNSET; 6],
        Some(digits) => {
            if !digits.iter().all(|&d| d <= 9 || d == PIN_UNSET) {
                return error_body(StatusCode::BAD_REQUEST, "PIN digits must be 0-9 or 15");
            }
            match digits.len() {
                4 => {
                    let mut padded = [PIN_UNSET; 6];
                    padded[..4].copy_from_slice(&digits);
                    padded
                }
                6 => {
                    let mut full = [PIN_UNSET; 6];
                    full.copy_from_slice(&digits);
                    full
                }
                _ => return error_body(StatusCode::BAD_REQUEST, "PIN must have 4 or 6 digits"),
            }
        }
    };
    state.panel.set_user_code(&pin, user, &digits).await;
    Json(json!({"queued": true})).into_response()
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct EventsQuery {
    index: Option<u64>,
    timeout: Option<u64>,
}

async fn poll_events(State(state): State<ApiState>, Query(q): Query<EventsQuery>) -> Response {
    let index = q.index.unwrap_or(0);
    let timeout = Duration::from_secs(q.timeout.unwrap_or(10));
    let events = state.events.get(index, timeout).await;
    let last = events.last().map_or(index, |e| e.number);
    Json(json!({"events": events, "index": last})).into_response()
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

async fn version() -> Json<serde_json::Value> {
    Json(json!({"version": API_VERSION}))
}
