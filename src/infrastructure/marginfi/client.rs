//! JSON-RPC 2.0 account source backed by a ledger node.

use crate::domain::account::AccountSnapshot;
use crate::domain::errors::SourceError;
use crate::domain::ports::AccountSource;
use crate::infrastructure::core::HttpClientFactory;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const LIST_ACCOUNTS_METHOD: &str = "marginfi_getAccountAddresses";
const GET_ACCOUNT_METHOD: &str = "marginfi_getAccount";

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

pub struct RpcAccountSource {
    client: ClientWithMiddleware,
    endpoint: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcAccountSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            client: HttpClientFactory::create_client(timeout, max_retries),
            endpoint: endpoint.into(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, SourceError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let body = serde_json::to_string(&request).map_err(|e| SourceError::Decode {
            reason: format!("failed to serialize {} request: {}", method, e),
        })?;

        debug!("RPC {} -> {}", method, self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SourceError::Connection {
                reason: format!("{} returned HTTP {}: {}", method, status, error_text),
            });
        }

        let envelope: RpcResponse<T> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error()
            } else {
                SourceError::Decode {
                    reason: format!("{} response: {}", method, e),
                }
            }
        })?;

        if let Some(error) = envelope.error {
            return Err(SourceError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(envelope.result)
    }

    fn transport_error(&self, error: reqwest_middleware::Error) -> SourceError {
        match error {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => self.timeout_error(),
            e => SourceError::Connection {
                reason: e.to_string(),
            },
        }
    }

    fn timeout_error(&self) -> SourceError {
        SourceError::Timeout {
            duration_ms: self.timeout.as_millis() as u64,
        }
    }
}

#[async_trait]
impl AccountSource for RpcAccountSource {
    async fn list_account_addresses(&self) -> Result<Vec<String>, SourceError> {
        self.call::<Vec<String>>(LIST_ACCOUNTS_METHOD, json!([]))
            .await?
            .ok_or_else(|| SourceError::Decode {
                reason: format!("{} returned no result", LIST_ACCOUNTS_METHOD),
            })
    }

    async fn load_account(&self, address: &str) -> Result<AccountSnapshot, SourceError> {
        self.call::<AccountSnapshot>(GET_ACCOUNT_METHOD, json!([address]))
            .await?
            .ok_or_else(|| SourceError::NotFound {
                address: address.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use tokio::net::TcpListener;

    async fn handle(Json(request): Json<Value>) -> Json<Value> {
        let id = request["id"].clone();
        let response = match request["method"].as_str() {
            Some(LIST_ACCOUNTS_METHOD) => json!({ "jsonrpc": "2.0", "id": id, "result": ["A", "B"] }),
            Some(GET_ACCOUNT_METHOD) => match request["params"][0].as_str() {
                Some("A") => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "address": "A",
                        "authority": "Auth",
                        "assets": "100",
                        "liabilities": 40,
                        "mango": { "address": "M", "equity": 20 }
                    }
                }),
                Some("broken") => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32602, "message": "invalid account data" }
                }),
                _ => json!({ "jsonrpc": "2.0", "id": id, "result": null }),
            },
            _ => json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32601, "message": "Method not found" } }),
        };
        Json(response)
    }

    async fn spawn_node() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let app = Router::new().route("/", post(handle));
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_lists_and_loads_accounts() {
        let endpoint = spawn_node().await;
        let source = RpcAccountSource::new(endpoint, Duration::from_secs(5), 0);

        let addresses = source.list_account_addresses().await.expect("list");
        assert_eq!(addresses, vec!["A".to_string(), "B".to_string()]);

        let snapshot = source.load_account("A").await.expect("load");
        assert_eq!(snapshot.authority, "Auth");
        assert_eq!(snapshot.assets, Some(json!("100")));
        assert_eq!(snapshot.mango.map(|m| m.address), Some("M".to_string()));
        assert!(snapshot.zo.is_none());
    }

    #[tokio::test]
    async fn test_null_result_is_not_found() {
        let endpoint = spawn_node().await;
        let source = RpcAccountSource::new(endpoint, Duration::from_secs(5), 0);

        let err = source.load_account("missing").await.expect_err("null result");
        assert!(matches!(err, SourceError::NotFound { address } if address == "missing"));
    }

    #[tokio::test]
    async fn test_rpc_error_object_is_surfaced() {
        let endpoint = spawn_node().await;
        let source = RpcAccountSource::new(endpoint, Duration::from_secs(5), 0);

        let err = source.load_account("broken").await.expect_err("rpc error");
        assert!(matches!(err, SourceError::Rpc { code: -32602, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let source = RpcAccountSource::new(format!("http://{}/", addr), Duration::from_secs(2), 0);
        let err = source.list_account_addresses().await.expect_err("no node");
        assert_eq!(err.kind(), "connection");
    }
}
