//! HTTP surface against live shared state.
//!
//! Serves the axum router on an ephemeral port and drives it with a real
//! HTTP client. The controller is not involved: handlers read the shared
//! mirror and append to the outbound queue, which these tests inspect
//! directly.

use nx584d::event_queue::EventQueue;
use nx584d::http_api::{self, ApiState};
use nx584d::state::PanelState;
use nx_model::{User, Zone, flags};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

struct Api {
    base: String,
    panel: Arc<PanelState>,
    events: Arc<EventQueue>,
    client: reqwest::Client,
}

async fn serve() -> Api {
    let panel = Arc::new(PanelState::new());
    let events = Arc::new(EventQueue::new(100));
    let app = http_api::router(ApiState {
        panel: Arc::clone(&panel),
        events: Arc::clone(&events),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    Api {
        base: format!("http://{addr}"),
        panel,
        events,
        client: reqwest::Client::new(),
    }
}

impl Api {
    async fn get_json(&self, path: &str) -> Value {
        self.client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json body")
    }
}

#[tokio::test]
async fn version_reports_the_api_version() {
    let api = serve().await;
    let body = api.get_json("/version").await;
    assert_eq!(body, json!({"version": "1.1"}));
}

#[tokio::test]
async fn zones_listing_carries_derived_bypass() {
    let api = serve().await;
    {
        let mut zones = api.panel.zones.write().await;
        let mut z = Zone::new(1);
        z.name = "Front Door".to_owned();
        z.state = true;
        z.condition_flags = vec!["Faulted".to_owned(), "Inhibit".to_owned()];
        zones.insert(1, z);
        zones.insert(2, Zone::new(2));
    }
    let body = api.get_json("/zones").await;
    let zones = body["zones"].as_array().expect("zones array");
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0]["number"], 1);
    assert_eq!(zones[0]["name"], "Front Door");
    assert_eq!(zones[0]["state"], true);
    assert_eq!(zones[0]["bypassed"], true);
    assert_eq!(zones[1]["bypassed"], false);
    assert_eq!(zones[1]["name"], "Unknown");
}

#[tokio::test]
async fn zone_bypass_put_validates_and_queues_a_toggle() {
    let api = serve().await;
    api.panel.zones.write().await.insert(4, Zone::new(4));

    // Unknown zone.
    let resp = api
        .client
        .put(format!("{}/zones/9", api.base))
        .json(&json!({"bypassed": true}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 404);

    // No-op toggle: zone 4 is already un-bypassed.
    let resp = api
        .client
        .put(format!("{}/zones/4", api.base))
        .json(&json!({"bypassed": false}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 409);

    // Missing body field.
    let resp = api
        .client
        .put(format!("{}/zones/4", api.base))
        .json(&json!({}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);

    // A real state change queues the toggle command.
    let resp = api
        .client
        .put(format!("{}/zones/4", api.base))
        .json(&json!({"bypassed": true}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(api.panel.pop_outbound().await, Some(vec![0x3F, 0x03]));
}

#[tokio::test]
async fn arm_and_disarm_commands_enqueue_documented_payloads() {
    let api = serve().await;

    let resp = api
        .client
        .get(format!("{}/command?cmd=arm&type=stay", api.base))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(api.panel.pop_outbound().await, Some(vec![0x3E, 0x00, 0x01]));

    let resp = api
        .client
        .get(format!("{}/command?cmd=arm&type=exit&partition=2", api.base))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(api.panel.pop_outbound().await, Some(vec![0x3E, 0x02, 0x02]));

    let resp = api
        .client
        .get(format!("{}/command?cmd=arm&type=auto", api.base))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        api.panel.pop_outbound().await,
        Some(vec![0x3D, 0x05, 0x01, 0x01])
    );

    let resp = api
        .client
        .get(format!("{}/command?cmd=disarm&master_pin=1234", api.base))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        api.panel.pop_outbound().await,
        Some(vec![0x3C, 0x21, 0x43, 0xFF, 0x01, 0x01])
    );

    // Bad requests queue nothing.
    for path in [
        "/command?cmd=arm&type=sideways",
        "/command?cmd=disarm",
        "/command?cmd=dance",
    ] {
        let resp = api
            .client
            .get(format!("{}{path}", api.base))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), 400, "for {path}");
    }
    assert_eq!(api.panel.pop_outbound().await, None);
}

#[tokio::test]
async fn user_fetch_needs_the_master_pin_and_polls_through_202() {
    let api = serve().await;

    // No header: forbidden.
    let resp = api
        .client
        .get(format!("{}/users/3", api.base))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 403);

    // Unknown user: a fetch is queued and the caller gets 202.
    let resp = api
        .client
        .get(format!("{}/users/3", api.base))
        .header("Master-Pin", "1234")
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 202);
    assert_eq!(
        api.panel.pop_outbound().await,
        Some(vec![0x32, 0x21, 0x43, 0xFF, 0x03])
    );

    // Retrying while the panel has not answered: 404, nothing re-queued.
    let resp = api
        .client
        .get(format!("{}/users/3?retry=yes", api.base))
        .header("Master-Pin", "1234")
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 404);
    assert_eq!(api.panel.pop_outbound().await, None);

    // Once the reply has landed, the record is served.
    {
        let mut users = api.panel.users.write().await;
        let mut u = User::new(3);
        u.pin = Some([1, 2, 3, 4, 15, 15]);
        u.authorized_partitions = vec![1];
        users.insert(3, u);
    }
    let resp = api
        .client
        .get(format!("{}/users/3?retry=yes", api.base))
        .header("Master-Pin", "1234")
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["number"], 3);
    assert_eq!(body["pin"], json!([1, 2, 3, 4, 15, 15]));
    assert_eq!(body["authorized_partitions"], json!([1]));
}

#[tokio::test]
async fn user_updates_guard_master_users() {
    let api = serve().await;
    {
        let mut users = api.panel.users.write().await;
        let mut master_ish = User::new(2);
        master_ish.authority_flags = vec![flags::MASTER_AUTHORITY.to_owned()];
        users.insert(2, master_ish);
        users.insert(3, User::new(3));
    }

    // User 1 is always refused.
    let resp = api
        .client
        .put(format!("{}/users/1", api.base))
        .header("Master-Pin", "1234")
        .json(&json!({"pin": [1, 2, 3, 4]}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 403);

    // So is any user holding master authority.
    let resp = api
        .client
        .put(format!("{}/users/2", api.base))
        .header("Master-Pin", "1234")
        .json(&json!({"pin": [1, 2, 3, 4]}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 403);

    // A 4-digit PIN pads with two unset digits.
    let resp = api
        .client
        .put(format!("{}/users/3", api.base))
        .header("Master-Pin", "9999")
        .json(&json!({"pin": [5, 6, 7, 8]}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        api.panel.pop_outbound().await,
        Some(vec![0x34, 0x99, 0x99, 0xFF, 0x03, 0x65, 0x87, 0xFF])
    );

    // Null clears the PIN.
    let resp = api
        .client
        .put(format!("{}/users/3", api.base))
        .header("Master-Pin", "9999")
        .json(&json!({"pin": null}))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        api.panel.pop_outbound().await,
        Some(vec![0x34, 0x99, 0x99, 0xFF, 0x03, 0xFF, 0xFF, 0xFF])
    );

    // Wrong digit counts and out-of-range digits are rejected.
    for bad in [json!({"pin": [1, 2, 3]}), json!({"pin": [1, 2, 3, 4, 5, 12]})] {
        let resp = api
            .client
            .put(format!("{}/users/3", api.base))
            .header("Master-Pin", "9999")
            .json(&bad)
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), 400);
    }
    assert_eq!(api.panel.pop_outbound().await, None);
}

#[tokio::test]
async fn event_long_poll_blocks_until_a_push_arrives() {
    let api = serve().await;

    let poll = {
        let client = api.client.clone();
        let url = format!("{}/events?index=0&timeout=10", api.base);
        tokio::spawn(async move {
            client
                .get(url)
                .send()
                .await
                .expect("request")
                .json::<Value>()
                .await
                .expect("json")
        })
    };

    // Let the poller park, then push one event.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!poll.is_finished(), "long poll returned before any event");
    api.events
        .push(json!({"type": "zone_status", "zone": 1}))
        .await;

    let body = poll.await.expect("poll task");
    let events = body["events"].as_array().expect("events array");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["payload"]["type"], "zone_status");
    assert_eq!(body["index"], api.events.current().await);
}

#[tokio::test]
async fn event_poll_with_stale_cursor_returns_immediately() {
    let api = serve().await;
    api.events.push(json!({"n": 1})).await;
    api.events.push(json!({"n": 2})).await;

    let body = api.get_json("/events?index=0&timeout=10").await;
    let events = body["events"].as_array().expect("events array");
    assert_eq!(events.len(), 2);
    assert_eq!(body["index"], 2);

    // A timed-out poll keeps the caller's cursor.
    let body = api.get_json("/events?index=2&timeout=0").await;
    assert!(body["events"].as_array().expect("events array").is_empty());
    assert_eq!(body["index"], 2);
}

#[tokio::test]
async fn partitions_listing_carries_derived_armed() {
    let api = serve().await;
    {
        let mut partitions = api.panel.partitions.write().await;
        let mut p = nx_model::Partition::new(1);
        p.condition_flags = vec!["Armed".to_owned(), "Instant".to_owned()];
        p.last_user = 0x62;
        partitions.insert(1, p);
    }
    let body = api.get_json("/partitions").await;
    let partitions = body["partitions"].as_array().expect("partitions array");
    assert_eq!(partitions[0]["number"], 1);
    assert_eq!(partitions[0]["armed"], true);
    assert_eq!(partitions[0]["last_user"], 0x62);
    assert_eq!(
        partitions[0]["condition_flags"],
        json!(["Armed", "Instant"])
    );
}
