//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::{future::Future, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

/// Default timeout for a single RPC request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of a single JSON-RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request never produced a response (connection refused, timeout, TLS...).
    #[error("failed to send {method} request: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    /// The node answered with a JSON-RPC error object.
    #[error("{method} failed: {message} (code {code})")]
    Response {
        method: String,
        code: i64,
        message: String,
    },
    /// The node answered with something that is not the expected result.
    #[error("invalid {method} response: {reason}")]
    Decode { method: String, reason: String },
}

impl RpcError {
    /// Whether the node may not have seen the request at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport { .. })
    }

    /// Whether the connection could not be opened, so the request was never written.
    pub fn is_connect(&self) -> bool {
        matches!(self, RpcError::Transport { source, .. } if source.is_connect())
    }
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|source| RpcError::Transport {
            method: method.to_string(),
            source,
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|source| RpcError::Transport {
        method: method.to_string(),
        source,
    })?;

    parse_response(method, status, &body)
}

/// Decode a raw JSON-RPC response body.
fn parse_response<T: DeserializeOwned>(
    method: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> Result<T, RpcError> {
    let decode = |reason: String| RpcError::Decode {
        method: method.to_string(),
        reason,
    };

    let result: Value = serde_json::from_str(body).map_err(|e| {
        decode(if status.is_success() {
            e.to_string()
        } else {
            format!("HTTP {}: {}", status, body.trim())
        })
    })?;

    if let Some(error) = result.get("error") {
        return Err(RpcError::Response {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result_value = result
        .get("result")
        .ok_or_else(|| decode("no result in response".to_string()))?
        .clone();

    serde_json::from_value(result_value).map_err(|e| decode(e.to_string()))
}

/// Poll `check_fn` every `interval` until it yields a value or `deadline` passes.
///
/// Errors from `check_fn` are logged and polling continues.
///
/// # Returns
/// `Some(value)` when the check succeeded, `None` after the deadline.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    deadline: Instant,
    interval: Duration,
    check_fn: F,
) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, RpcError>>,
{
    loop {
        if Instant::now() >= deadline {
            return None;
        }

        match tokio::time::timeout_at(deadline, check_fn()).await {
            Ok(Ok(Some(value))) => return Some(value),
            Ok(Ok(None)) => {
                tracing::trace!(target_name = %name, "Not ready yet, retrying...");
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, target_name = %name, "Poll failed, retrying...");
            }
            Err(_) => return None,
        }

        let wake = (Instant::now() + interval).min(deadline);
        tokio::time::sleep_until(wake).await;
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(method: &str, value: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        reason: format!("`{}` is not a hex quantity: {}", value, e),
    })
}
