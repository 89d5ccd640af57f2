//! Globus Transfer API client.
//!
//! Talks to Transfer API v0.10 with an access token obtained from a stored
//! refresh token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::core::models::{
    ActivationStatus, AutoActivation, CancelOutcome, DirEntry, Endpoint, PollOutcome, Task,
    TaskState, TransferRequest,
};
use crate::core::transfer_service::TransferService;
use crate::error::TransferError;
use crate::logging::LogThrottle;

pub struct GlobusTransferClient {
    client: reqwest::Client,
    base_url: Url,
    auth_url: String,
    client_id: String,
    refresh_token: String,
    access_token: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl GlobusTransferClient {
    /// Fails with [`TransferError::Unauthorized`] when no refresh token is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, TransferError> {
        let refresh_token = config.refresh_token.clone().ok_or_else(|| {
            TransferError::Unauthorized(
                "Was not able to find a refresh token in the configuration".to_string(),
            )
        })?;

        let base_url = Url::parse(&config.transfer_url)
            .map_err(|e| TransferError::Transport(format!("invalid transfer_url: {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("globus-condor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            refresh_token,
            access_token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, TransferError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        debug!("Exchanging refresh token for a transfer access token");
        let response = self
            .client
            .post(&self.auth_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Unauthorized(format!(
                "Was not able to authorize ({status}): {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, TransferError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| TransferError::Transport(format!("invalid request path {path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let token = self.access_token().await?;

        trace!(%method, %url, "Transfer API request");
        let mut builder = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error: ApiErrorBody = response.json().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TransferError::Unauthorized(error.message));
        }
        Err(TransferError::Api {
            status: status.as_u16(),
            code: error.code,
            message: error.message,
        })
    }
}

#[async_trait]
impl TransferService for GlobusTransferClient {
    async fn get_endpoint(&self, endpoint_id: &str) -> Result<Endpoint, TransferError> {
        let doc = self
            .request(Method::GET, &format!("endpoint/{endpoint_id}"), &[], None)
            .await?;
        Ok(endpoint_from_document(endpoint_id, doc))
    }

    async fn autoactivate(&self, endpoint_id: &str) -> Result<AutoActivation, TransferError> {
        let doc = self
            .request(
                Method::POST,
                &format!("endpoint/{endpoint_id}/autoactivate"),
                &[],
                None,
            )
            .await?;

        let code = doc["code"].as_str().unwrap_or_default();
        debug!(endpoint = endpoint_id, code, "Autoactivation response");
        if code == "AutoActivationFailed" {
            Ok(AutoActivation::Rejected)
        } else {
            Ok(AutoActivation::Activated)
        }
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String, TransferError> {
        let submission = self.request(Method::GET, "submission_id", &[], None).await?;
        let submission_id = submission["value"].as_str().ok_or_else(|| {
            TransferError::Transport("submission_id response has no value".to_string())
        })?;

        let doc = transfer_document(request, submission_id);
        let result = self.request(Method::POST, "transfer", &[], Some(&doc)).await?;

        result["task_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransferError::Transport("transfer response has no task_id".to_string()))
    }

    async fn poll_task(
        &self,
        task_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<PollOutcome, TransferError> {
        let deadline = Instant::now() + timeout;
        let throttle = LogThrottle::new(Duration::from_secs(30));

        loop {
            let task = self.get_task(task_id).await?;
            if task.state.is_terminal() {
                return Ok(PollOutcome::Done);
            }
            if throttle.should_log() {
                debug!(task_id, "Task still active");
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(PollOutcome::NotDone);
            }
            sleep(interval.min(deadline - now)).await;
        }
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, TransferError> {
        let doc = self
            .request(Method::GET, &format!("task/{task_id}"), &[], None)
            .await?;
        Ok(task_from_document(task_id, &doc))
    }

    async fn cancel_task(&self, task_id: &str) -> Result<CancelOutcome, TransferError> {
        let doc = self
            .request(Method::POST, &format!("task/{task_id}/cancel"), &[], None)
            .await?;
        Ok(cancel_outcome(&doc))
    }

    async fn list_directory(
        &self,
        endpoint_id: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferError> {
        let doc = self
            .request(
                Method::GET,
                &format!("operation/endpoint/{endpoint_id}/ls"),
                &[("path", path)],
                None,
            )
            .await?;
        serde_json::from_value(doc["DATA"].clone())
            .map_err(|e| TransferError::Transport(format!("unexpected ls response: {e}")))
    }

    async fn list_tasks(&self, limit: usize) -> Result<Vec<Task>, TransferError> {
        let limit = limit.to_string();
        let doc = self
            .request(
                Method::GET,
                "task_list",
                &[("limit", limit.as_str()), ("orderby", "request_time desc")],
                None,
            )
            .await?;
        Ok(data(&doc)
            .iter()
            .map(|task| task_from_document(task["task_id"].as_str().unwrap_or_default(), task))
            .collect())
    }

    async fn search_endpoints(&self, limit: usize) -> Result<Vec<Endpoint>, TransferError> {
        let limit = limit.to_string();
        let doc = self
            .request(
                Method::GET,
                "endpoint_search",
                &[("filter_scope", "my-endpoints"), ("limit", limit.as_str())],
                None,
            )
            .await?;
        Ok(data(&doc)
            .iter()
            .map(|ep| endpoint_from_document(ep["id"].as_str().unwrap_or_default(), ep.clone()))
            .collect())
    }
}

/// `DATA` array of a paged Transfer API response.
fn data(doc: &Value) -> &[Value] {
    doc["DATA"].as_array().map(Vec::as_slice).unwrap_or_default()
}

fn task_from_document(task_id: &str, doc: &Value) -> Task {
    let text = |key: &str| doc[key].as_str().map(str::to_string);
    Task {
        id: task_id.to_string(),
        state: TaskState::from_api(doc["status"].as_str().unwrap_or_default()),
        label: text("label"),
        source: text("source_endpoint_display_name"),
        destination: text("destination_endpoint_display_name"),
        requested_at: text("request_time"),
    }
}

/// Build the endpoint model from a Transfer API endpoint document.
///
/// The document only says whether the endpoint is activated; an inactive one
/// is assumed auto-activatable until the service says otherwise.
pub fn endpoint_from_document(endpoint_id: &str, doc: Value) -> Endpoint {
    let activated = doc["activated"].as_bool().unwrap_or(false);
    let expires_in = doc["expires_in"]
        .as_i64()
        .filter(|secs| *secs >= 0)
        .map(|secs| Duration::from_secs(secs as u64));

    Endpoint {
        id: endpoint_id.to_string(),
        internal_id: doc["id"].as_str().unwrap_or(endpoint_id).to_string(),
        display_name: doc["display_name"].as_str().map(str::to_string),
        status: if activated {
            ActivationStatus::Active
        } else {
            ActivationStatus::AutoActivatable
        },
        expires_in: if activated { expires_in } else { None },
        raw: doc,
    }
}

/// Transfer submission document.
pub fn transfer_document(request: &TransferRequest, submission_id: &str) -> Value {
    let items: Vec<Value> = request
        .items
        .iter()
        .map(|item| {
            json!({
                "DATA_TYPE": "transfer_item",
                "source_path": item.source_path,
                "destination_path": item.destination_path,
                "recursive": item.recursive,
            })
        })
        .collect();

    let mut doc = json!({
        "DATA_TYPE": "transfer",
        "submission_id": submission_id,
        "source_endpoint": request.source_endpoint,
        "destination_endpoint": request.destination_endpoint,
        "sync_level": request.sync_level.api_level(),
        "preserve_timestamp": request.preserve_timestamps,
        "verify_checksum": request.verify_checksums,
        "DATA": items,
    });
    if let Some(label) = &request.label {
        doc["label"] = json!(label);
    }
    doc
}

fn cancel_outcome(doc: &Value) -> CancelOutcome {
    let code = doc["code"].as_str().unwrap_or_default();
    if code == "Canceled" {
        CancelOutcome::Canceled
    } else {
        CancelOutcome::NotCanceled {
            code: code.to_string(),
            message: doc["message"].as_str().unwrap_or_default().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{SyncLevel, TransferItem};

    #[test]
    fn active_endpoint_document() {
        let doc = json!({
            "id": "ddb59aef-6d04-11e5-ba46-22000b92c6ec",
            "display_name": "Tutorial Endpoint 1",
            "activated": true,
            "expires_in": 3600,
        });
        let endpoint = endpoint_from_document("tutorial", doc);
        assert!(endpoint.is_active());
        assert_eq!(endpoint.internal_id, "ddb59aef-6d04-11e5-ba46-22000b92c6ec");
        assert_eq!(endpoint.expires_in, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn never_expiring_activation_has_no_expiry() {
        let doc = json!({ "id": "x", "activated": true, "expires_in": -1 });
        assert_eq!(endpoint_from_document("x", doc).expires_in, None);
    }

    #[test]
    fn inactive_endpoint_is_auto_activatable() {
        let doc = json!({ "id": "x", "activated": false, "expires_in": 0 });
        let endpoint = endpoint_from_document("x", doc);
        assert_eq!(endpoint.status, ActivationStatus::AutoActivatable);
    }

    #[test]
    fn transfer_document_carries_options_and_items() {
        let request = TransferRequest {
            source_endpoint: "src".into(),
            destination_endpoint: "dst".into(),
            items: vec![TransferItem {
                source_path: "/a/".into(),
                destination_path: "/b/".into(),
                recursive: true,
            }],
            label: Some("nightly".into()),
            sync_level: SyncLevel::Mtime,
            preserve_timestamps: true,
            verify_checksums: false,
        };

        let doc = transfer_document(&request, "sub-1");
        assert_eq!(doc["submission_id"], "sub-1");
        assert_eq!(doc["sync_level"], 2);
        assert_eq!(doc["label"], "nightly");
        assert_eq!(doc["verify_checksum"], false);
        assert_eq!(doc["DATA"][0]["recursive"], true);
        assert_eq!(doc["DATA"][0]["DATA_TYPE"], "transfer_item");
    }

    #[test]
    fn only_canceled_code_counts_as_cancelled() {
        assert_eq!(
            cancel_outcome(&json!({"code": "Canceled"})),
            CancelOutcome::Canceled
        );
        assert!(matches!(
            cancel_outcome(&json!({"code": "TaskComplete", "message": "already done"})),
            CancelOutcome::NotCanceled { .. }
        ));
    }

    #[test]
    fn task_list_entries_carry_endpoint_names() {
        let doc = json!({
            "task_id": "t-1",
            "status": "SUCCEEDED",
            "label": null,
            "source_endpoint_display_name": "Laptop",
            "destination_endpoint_display_name": "Cluster",
            "request_time": "2026-01-02 12:00:00+00:00",
        });
        let task = task_from_document("t-1", &doc);
        assert_eq!(task.state, TaskState::Succeeded);
        assert_eq!(task.label, None);
        assert_eq!(task.source.as_deref(), Some("Laptop"));
        assert_eq!(task.requested_at.as_deref(), Some("2026-01-02 12:00:00+00:00"));
    }

    #[test]
    fn ls_entries_deserialize() {
        let doc = json!({
            "DATA": [
                {"DATA_TYPE": "file", "name": "data.h5", "type": "file", "size": 2048,
                 "last_modified": "2026-01-02 12:00:00+00:00", "permissions": "0644"},
                {"DATA_TYPE": "file", "name": "results", "type": "dir", "size": 4096},
                {"DATA_TYPE": "file", "name": "latest", "type": "link", "size": 7}
            ]
        });
        let entries: Vec<DirEntry> = serde_json::from_value(doc["DATA"].clone()).unwrap();
        assert_eq!(entries[0].size, 2048);
        assert_eq!(entries[1].kind, crate::core::models::EntryKind::Dir);
        assert_eq!(entries[2].kind, crate::core::models::EntryKind::Other);
        assert_eq!(data(&doc).len(), 3);
        assert!(data(&json!({})).is_empty());
    }

    #[test]
    fn missing_refresh_token_is_unauthorized() {
        let err = GlobusTransferClient::from_config(&AppConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, TransferError::Unauthorized(_)));
    }
}
