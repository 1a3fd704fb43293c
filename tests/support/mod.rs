// In-process fake of the registration backend for client integration tests.
#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub ts: Option<String>,
    pub cache_control: Option<String>,
    pub pragma: Option<String>,
    pub query: HashMap<String, String>,
}

pub struct BackendState {
    participants: Mutex<Vec<Value>>,
    // Number of upcoming requests answered with 503.
    unavailable: AtomicUsize,
    // Check-in answers leave out the alreadyCheckedIn flag.
    omit_flag: AtomicBool,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl BackendState {
    fn record(&self, path: String, query: HashMap<String, String>, headers: &HeaderMap) {
        let header_value = |name| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let request = RecordedRequest {
            path,
            ts: query.get("_ts").cloned(),
            cache_control: header_value(header::CACHE_CONTROL),
            pragma: header_value(header::PRAGMA),
            query,
        };
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request);
    }

    // Consume one scripted outage, if any remain.
    fn take_outage(&self) -> bool {
        self.unavailable
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

pub struct FakeBackend {
    pub base_url: String,
    state: Arc<BackendState>,
}

impl FakeBackend {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .expect("requests mutex poisoned")
            .clone()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    pub fn fail_with_503(&self, times: usize) {
        self.state.unavailable.store(times, Ordering::SeqCst);
    }

    pub fn omit_already_checked_in_flag(&self) {
        self.state.omit_flag.store(true, Ordering::SeqCst);
    }
}

pub fn participant_json(id: &str, short_code: Option<&str>, first: &str, last: &str) -> Value {
    json!({
        "id": id,
        "shortCode": short_code,
        "firstName": first,
        "lastName": last,
        "email": format!("{}@example.com", first.to_lowercase()),
        "type": "SPEAKER",
        "company": "Analytical Engines",
        "checkedIn": false,
    })
}

// Bind on an ephemeral port and serve until the test runtime shuts down.
pub async fn spawn_backend(participants: Vec<Value>) -> FakeBackend {
    let state = Arc::new(BackendState {
        participants: Mutex::new(participants),
        unavailable: AtomicUsize::new(0),
        omit_flag: AtomicBool::new(false),
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/api/lookup", post(lookup))
        .route("/api/search", get(search))
        .route("/api/registrations/{id}/checkin", post(check_in))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend failed");
    });

    FakeBackend {
        base_url: format!("http://{addr}/api"),
        state,
    }
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "message": "registration service unavailable" })),
    )
        .into_response()
}

fn field<'a>(participant: &'a Value, name: &str) -> Option<&'a str> {
    participant.get(name).and_then(Value::as_str)
}

async fn lookup(
    State(state): State<Arc<BackendState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/api/lookup".to_string(), query, &headers);
    if state.take_outage() {
        return unavailable();
    }

    let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
    let participants = state.participants.lock().expect("participants mutex poisoned");
    let found = participants.iter().find(|p| {
        field(p, "id") == Some(code)
            || field(p, "shortCode") == Some(code)
            || field(p, "qrCode") == Some(code)
            || field(p, "id").is_some_and(|id| id.get(..9) == Some(code))
    });

    match found {
        Some(participant) => Json(json!({ "participant": participant })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "notFound": true, "message": "Participant not found" })),
        )
            .into_response(),
    }
}

async fn search(
    State(state): State<Arc<BackendState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let needle = query.get("query").cloned().unwrap_or_default().to_lowercase();
    state.record("/api/search".to_string(), query, &headers);
    if state.take_outage() {
        return unavailable();
    }

    let participants = state.participants.lock().expect("participants mutex poisoned");
    let results: Vec<&Value> = participants
        .iter()
        .filter(|p| {
            ["firstName", "lastName", "email"]
                .iter()
                .filter_map(|name| field(p, name))
                .any(|value| value.to_lowercase().contains(&needle))
        })
        .collect();

    Json(json!({ "results": results })).into_response()
}

async fn check_in(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(_body): Json<Value>,
) -> Response {
    state.record(format!("/api/registrations/{id}/checkin"), query, &headers);
    if state.take_outage() {
        return unavailable();
    }

    let mut participants = state.participants.lock().expect("participants mutex poisoned");
    let Some(participant) = participants
        .iter_mut()
        .find(|p| field(p, "id") == Some(id.as_str()))
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "registration not found" })),
        )
            .into_response();
    };

    let already_checked_in = participant
        .get("checkedIn")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !already_checked_in {
        participant["checkedIn"] = json!(true);
        participant["checkInTime"] = json!(chrono::Utc::now().to_rfc3339());
    }

    if state.omit_flag.load(Ordering::SeqCst) {
        return Json(json!({ "registration": participant.clone() })).into_response();
    }
    Json(json!({
        "registration": participant.clone(),
        "alreadyCheckedIn": already_checked_in,
    }))
    .into_response()
}
