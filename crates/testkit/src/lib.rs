use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{Value, json};

pub const FAKE_ACCESS_TOKEN: &str = "fake-access-token";
pub const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct FakeState {
    requests: Vec<RecordedRequest>,
    failures: HashMap<String, u16>,
    insert_errors: Option<Value>,
    next_message_id: u64,
}

/// Stand-in for the Google REST endpoints the pipeline talks to: Pub/Sub
/// publish, Monitoring timeSeries, BigQuery insertAll/queries and the
/// metadata token server. Every request is recorded.
#[derive(Clone)]
pub struct FakeGoogleApi {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
}

impl FakeGoogleApi {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let app = Router::new()
            .fallback(handle)
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn host_port(&self) -> String {
        self.addr.to_string()
    }

    /// Makes every later request to `path` answer with `status`.
    pub fn fail_path(&self, path: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(path.to_string(), status);
    }

    pub fn set_insert_errors(&self, errors: Value) {
        self.state.lock().unwrap().insert_errors = Some(errors);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn requests_ending_with(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with(suffix))
            .collect()
    }
}

async fn handle(
    State(state): State<Arc<Mutex<FakeState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body: body.to_vec(),
    });

    if let Some(status) = state.failures.get(&path) {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "forced failure").into_response();
    }

    if path.ends_with(":publish") {
        state.next_message_id += 1;
        let id = state.next_message_id.to_string();
        return axum::Json(json!({ "messageIds": [id] })).into_response();
    }
    if path.ends_with("/timeSeries") {
        return axum::Json(json!({})).into_response();
    }
    if path.ends_with("/insertAll") {
        let body = match &state.insert_errors {
            Some(errors) => json!({ "kind": "bigquery#tableDataInsertAllResponse", "insertErrors": errors }),
            None => json!({ "kind": "bigquery#tableDataInsertAllResponse" }),
        };
        return axum::Json(body).into_response();
    }
    if path.ends_with("/queries") {
        return axum::Json(sample_anomaly_query_response()).into_response();
    }
    if path == TOKEN_PATH {
        return axum::Json(json!({
            "access_token": FAKE_ACCESS_TOKEN,
            "expires_in": 3599,
            "token_type": "Bearer"
        }))
        .into_response();
    }

    (StatusCode::NOT_FOUND, "unknown fake endpoint").into_response()
}

pub fn sample_anomaly_query_response() -> Value {
    json!({
        "kind": "bigquery#queryResponse",
        "jobComplete": true,
        "schema": {
            "fields": [
                {"name": "timestamp", "type": "TIMESTAMP", "mode": "NULLABLE"},
                {"name": "latency", "type": "FLOAT", "mode": "NULLABLE"},
                {"name": "is_anomaly", "type": "BOOLEAN", "mode": "NULLABLE"},
                {"name": "anomaly_probability", "type": "FLOAT", "mode": "NULLABLE"}
            ]
        },
        "rows": [
            {"f": [{"v": "1.7E9"}, {"v": "912.0"}, {"v": "true"}, {"v": "0.9991"}]}
        ],
        "totalRows": "1"
    })
}
