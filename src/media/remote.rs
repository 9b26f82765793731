//! HTTP client for `SyncRemoteOp`/`RemoteOp`, grounded on spec.md §4.F/§9
//! ("POST multipart → receive replacement bytes") and on the teacher's own
//! `reqwest` usage for the CLI's connect mode (`clarium_cli.rs`).

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;

use crate::error::AppError;

#[derive(Clone)]
pub struct RemoteOpClient {
    http: Client,
}

impl RemoteOpClient {
    pub fn new() -> Self {
        RemoteOpClient { http: Client::new() }
    }

    /// POSTs `input` as a multipart file field alongside `params` as a JSON
    /// field, returning the replacement bytes the remote endpoint sends
    /// back, per spec.md §4.F.
    pub async fn dispatch(&self, url: &str, params: &Value, input: &[u8]) -> Result<Vec<u8>, AppError> {
        let params_text = serde_json::to_string(params).map_err(|e| AppError::media("bad_params", e.to_string()))?;
        let form = Form::new().text("params", params_text).part("file", Part::bytes(input.to_vec()).file_name("payload"));

        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::media("remote_op_request_failed", format!("request to '{url}' failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::media("remote_op_rejected", format!("remote operation at '{url}' returned status {}", response.status())));
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(|e| AppError::media("remote_op_read_failed", format!("could not read response body from '{url}': {e}")))
    }
}

impl Default for RemoteOpClient {
    fn default() -> Self {
        RemoteOpClient::new()
    }
}
