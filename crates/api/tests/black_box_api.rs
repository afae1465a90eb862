use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{Value, json};

use axum::Router;
use famreport_api::app::{AppServices, cors_layer, router_with};
use famreport_core::{Contact, ContactId, ContactNote, Engagement};
use famreport_events::{SyncNotice, SyncStep};
use famreport_infra::{InMemoryContactCache, InMemoryContactSource, SyncConfig};

struct TestServer {
    base_url: String,
    source: Arc<InMemoryContactSource>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(contacts: Vec<Contact>) -> Self {
        Self::spawn_with(contacts, |router| router).await
    }

    async fn spawn_with(contacts: Vec<Contact>, wrap: impl FnOnce(Router) -> Router) -> Self {
        let source = Arc::new(InMemoryContactSource::with_contacts(contacts));
        let services = AppServices::new(
            source.clone(),
            Arc::new(InMemoryContactCache::new()),
            25,
            SyncConfig {
                detail_delay: Duration::ZERO,
                ..SyncConfig::default()
            },
        );

        // Same router as prod, bound to an ephemeral port.
        let app = wrap(router_with(Arc::new(services)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            source,
            handle,
        }
    }

    async fn action(&self, client: &reqwest::Client, body: Value) -> (StatusCode, Value) {
        let res = client
            .post(format!("{}/api/sync-patient-families", self.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn families(n: i64) -> Vec<Contact> {
    (1..=n)
        .map(|i| {
            let mut c = Contact::new(ContactId::new(i), format!("Family {i:03}"));
            c.created_date = NaiveDate::from_ymd_opt(2024, 11, 1);
            c
        })
        .collect()
}

#[tokio::test]
async fn health_and_root() {
    let server = TestServer::spawn(vec![]).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", server.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = client
        .get(format!("{}/api/", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "PBTF Family Reporting API");
}

#[tokio::test]
async fn sync_pages_until_complete() {
    let server = TestServer::spawn(families(120)).await;
    let client = reqwest::Client::new();

    let (_, state) = server.action(&client, json!({"action": "get-state"})).await;
    assert_eq!(state["syncState"]["last_synced_contact_count"], 0);
    assert_eq!(state["totalContacts"], 0);

    let mut rounds = Vec::new();
    loop {
        let (status, body) = server.action(&client, json!({"action": "sync"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        rounds.push(body["nextSkip"].as_u64().unwrap());
        if body["complete"] == true {
            assert_eq!(body["cachedCount"], 120);
            assert_eq!(body["totalContacts"], 120);
            break;
        }
        assert!(rounds.len() < 10, "sync never completed");
    }
    assert_eq!(rounds, vec![50, 100, 120]);

    // Completed sync does not hit the CRM again.
    let calls = server.source.listing_calls().len();
    let (_, again) = server.action(&client, json!({"action": "sync"})).await;
    assert_eq!(again["complete"], true);
    assert_eq!(server.source.listing_calls().len(), calls);

    let (_, reset) = server.action(&client, json!({"action": "sync", "reset": true})).await;
    assert_eq!(reset["nextSkip"], 0);
    assert_eq!(reset["cachedCount"], 120);
}

#[tokio::test]
async fn sync_events_stream_batch_notices() {
    let server = TestServer::spawn(families(120)).await;
    let client = reqwest::Client::new();

    let mut events = client
        .get(format!("{}/api/sync-events", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(events.status(), StatusCode::OK);
    let content_type = events.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let (_, batch) = server.action(&client, json!({"action": "sync"})).await;
    assert_eq!(batch["nextSkip"], 50);

    // Read frames until a full batch event has arrived.
    let mut buf = String::new();
    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(end) = buf.find("\n\n") {
                let frame = buf[..end].to_string();
                buf.drain(..end + 2);
                if frame.lines().any(|l| l.trim_end() == "event: batch" || l.trim_end() == "event:batch") {
                    return frame;
                }
                continue;
            }
            let chunk = events.chunk().await.unwrap().expect("stream ended early");
            buf.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("no batch event within 5s");

    let data = frame
        .lines()
        .find_map(|l| l.strip_prefix("data: ").or_else(|| l.strip_prefix("data:")))
        .unwrap();
    let notice: SyncNotice = serde_json::from_str(data).unwrap();
    assert_eq!(notice.step, SyncStep::Batch);
    assert_eq!(notice.next_offset, 50);
    assert_eq!(notice.total, 120);
    assert!(!notice.complete);
}

#[tokio::test]
async fn dashboard_after_refresh() {
    let server = TestServer::spawn(families(3)).await;
    let client = reqwest::Client::new();

    server.source.add_engagements(vec![Engagement {
        contact_id: ContactId::new(2),
        date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        engagement_type: "Butterfly Fund".into(),
    }]);
    server.source.add_notes(vec![ContactNote {
        contact_id: ContactId::new(1),
        date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        note_type: "Support Call".into(),
        staff: Some("Dana".into()),
    }]);

    server.action(&client, json!({"action": "sync"})).await;
    let (_, refreshed) = server
        .action(&client, json!({"action": "refresh-dates", "offset": 0, "batchSize": 10}))
        .await;
    assert_eq!(refreshed["nextOffset"], 3);
    assert_eq!(refreshed["totalCached"], 3);
    assert_eq!(refreshed["complete"], true);

    let (status, metrics) = server
        .action(
            &client,
            json!({
                "action": "dashboard",
                "fiscalYearStart": "2024-10-01T00:00:00.000Z",
                "fiscalYearEnd": "2025-09-30T23:59:59.999Z",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["success"], true);
    assert_eq!(metrics["totalFamilies"], 3);
    assert_eq!(metrics["engagedCount"], 1);
    assert_eq!(metrics["notEngagedCount"], 2);
    assert_eq!(metrics["supportTypes"]["butterflyFund"], 1);
    assert_eq!(metrics["monthlyData"].as_array().unwrap().len(), 12);
    assert_eq!(metrics["engagedFamilies"][0]["name"], "Family 002");

    let calls: Value = client
        .post(format!("{}/api/query-contact-notes", server.base_url))
        .json(&json!({
            "action": "query-support-calls",
            "fiscalYearStart": "2024-10-01",
            "fiscalYearEnd": "2025-09-30",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(calls["totalCalls"], 1);
    assert_eq!(calls["callsByStaff"]["Dana"], 1);

    let selected: Value = client
        .post(format!("{}/api/query-contact-notes", server.base_url))
        .json(&json!({
            "action": "query-support-calls",
            "fiscalYearStart": "2024-10-01",
            "fiscalYearEnd": "2025-09-30",
            "selectedStaff": ["Lee", "Kim"],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(selected["success"], true);
    assert_eq!(selected["totalCalls"], 0);
    assert_eq!(selected["staffList"], json!(["Dana"]));

    let (_, yoy) = server.action(&client, json!({"action": "yoy-comparison"})).await;
    assert_eq!(yoy["data"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let server = TestServer::spawn(vec![]).await;
    let client = reqwest::Client::new();

    let (status, body) = server.action(&client, json!({"action": "explode"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_action");

    let res = client
        .post(format!("{}/api/query-contact-notes", server.base_url))
        .json(&json!({"action": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn families_listing_and_clear() {
    let server = TestServer::spawn(families(5)).await;
    let client = reqwest::Client::new();
    server.action(&client, json!({"action": "sync"})).await;

    let page: Value = client
        .get(format!("{}/api/patient-families?skip=1&limit=2", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 5);
    assert_eq!(page["families"][0]["name"], "Family 002");

    let found: Value = client
        .get(format!("{}/api/patient-families?search=family%20004", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["total"], 1);

    let cleared: Value = client
        .post(format!("{}/api/clear-cache", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["success"], true);
    assert_eq!(cleared["message"], "Cache cleared successfully");
    assert_eq!(cleared["deleted"]["families"], 5);
    assert_eq!(cleared["deleted"]["sync_states"], 1);

    let (_, state) = server.action(&client, json!({"action": "get-state"})).await;
    assert_eq!(state["totalContacts"], 0);
}

#[tokio::test]
async fn crm_proxy_forwards_requests() {
    let server = TestServer::spawn(vec![]).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/api/virtuous-api", server.base_url))
        .json(&json!({"endpoint": "/Contact/1", "method": "GET"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["endpoint"], "/Contact/1");
    assert_eq!(body["method"], "GET");
}

#[tokio::test]
async fn failed_listing_maps_to_bad_gateway() {
    let server = TestServer::spawn(families(2)).await;
    let client = reqwest::Client::new();
    server
        .source
        .fail_next_listing(famreport_infra::CrmError::Api {
            status: 503,
            body: "maintenance".into(),
        });

    let (status, body) = server.action(&client, json!({"action": "sync"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "crm_error");

    let (status, _) = server.action(&client, json!({"action": "sync"})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cors_allows_only_configured_origins() {
    let origins = vec!["http://localhost:3000".to_string()];
    let server = TestServer::spawn_with(families(1), |router| router.layer(cors_layer(&origins))).await;
    let client = reqwest::Client::new();

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/api/sync-patient-families", server.base_url))
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert_eq!(
        preflight.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );

    let foreign = client
        .get(format!("{}/health", server.base_url))
        .header("Origin", "http://elsewhere.test")
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::OK);
    assert!(foreign.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn cors_wildcard_allows_any_origin() {
    let origins = vec!["*".to_string()];
    let server = TestServer::spawn_with(families(1), |router| router.layer(cors_layer(&origins))).await;

    let res = reqwest::Client::new()
        .get(format!("{}/health", server.base_url))
        .header("Origin", "http://elsewhere.test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
}
