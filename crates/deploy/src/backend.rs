//! Client for the custodial backend (status, deploy, view calls).

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DeployError;

/// Timeout applied to backend requests. Compilation can be slow.
const BACKEND_TIMEOUT: Duration = Duration::from_secs(120);

/// Create the HTTP client shared by the backend-facing clients.
pub(crate) fn http_client() -> Result<reqwest::Client, DeployError> {
    reqwest::Client::builder()
        .timeout(BACKEND_TIMEOUT)
        .build()
        .map_err(|e| DeployError::InvalidResponse(format!("Failed to create HTTP client: {}", e)))
}

/// Error payload returned by the backend on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self, fallback: impl Into<String>) -> String {
        self.error
            .or(self.message)
            .unwrap_or_else(|| fallback.into())
    }
}

/// Answer of the backend status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BackendStatus {
    /// Whether deployment credentials are configured on the backend.
    pub configured: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployRequest<'a> {
    wasm_base64: &'a str,
    init_method: &'a str,
    init_args: &'a Value,
}

/// A deployment performed with the backend's signing key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDeployment {
    #[serde(default)]
    pub success: bool,
    pub contract_id: String,
    pub transaction_hash: String,
    pub network: String,
    pub explorer_url: Option<String>,
    pub account_url: Option<String>,
    pub deployment_time: Option<f64>,
}

impl BackendDeployment {
    /// Explorer links provided by the backend, in display order.
    pub fn explorer_links(&self) -> Vec<String> {
        self.explorer_url
            .iter()
            .chain(self.account_url.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewRequest<'a> {
    contract_account_id: &'a str,
    method_name: &'a str,
    args: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

/// HTTP client for the backend's deployment endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, DeployError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query whether the backend can deploy on the user's behalf.
    pub async fn status(&self) -> Result<BackendStatus, DeployError> {
        let url = format!("{}/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DeployError::unreachable(&self.base_url, e))?;

        if !response.status().is_success() {
            return Err(DeployError::InvalidResponse(format!(
                "status endpoint answered HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DeployError::InvalidResponse(e.to_string()))
    }

    /// Deploy base64-encoded wasm with the backend's credentials.
    ///
    /// # Errors
    /// - [`DeployError::BackendNotConfigured`] on HTTP 503
    /// - [`DeployError::DeploymentRejected`] on any other failure reported by the backend
    pub async fn deploy(
        &self,
        wasm_base64: &str,
        init_method: &str,
        init_args: &Value,
    ) -> Result<BackendDeployment, DeployError> {
        let url = format!("{}/deploy", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&DeployRequest {
                wasm_base64,
                init_method,
                init_args,
            })
            .send()
            .await
            .map_err(|e| DeployError::unreachable(&self.base_url, e))?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(DeployError::BackendNotConfigured);
        }
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(DeployError::DeploymentRejected(
                body.into_message("Deployment failed"),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DeployError::InvalidResponse(e.to_string()))?;

        if body.get("success").and_then(Value::as_bool) != Some(true) {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Deployment failed");
            return Err(DeployError::DeploymentRejected(message.to_string()));
        }

        serde_json::from_value(body).map_err(|e| DeployError::InvalidResponse(e.to_string()))
    }

    /// Call a view method on a deployed contract.
    pub async fn view(
        &self,
        contract_id: &str,
        method_name: &str,
        args: &Value,
    ) -> Result<Value, DeployError> {
        let url = format!("{}/contract/view", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ViewRequest {
                contract_account_id: contract_id,
                method_name,
                args,
            })
            .send()
            .await
            .map_err(|e| DeployError::unreachable(&self.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(DeployError::DeploymentRejected(
                body.into_message(format!("HTTP {}", status)),
            ));
        }

        let view: ViewResponse = response
            .json()
            .await
            .map_err(|e| DeployError::InvalidResponse(e.to_string()))?;

        if !view.success {
            return Err(DeployError::DeploymentRejected(
                view.error.unwrap_or_else(|| "View call failed".to_string()),
            ));
        }

        Ok(view.result)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::ErrorKind;

    fn deployment_json() -> Value {
        serde_json::json!({
            "success": true,
            "contractId": "nbx-1700000000.testnet",
            "transactionHash": "9xKf",
            "network": "testnet",
            "explorerUrl": "https://testnet.nearblocks.io/txns/9xKf",
            "accountUrl": "https://testnet.nearblocks.io/address/nbx-1700000000.testnet"
        })
    }

    #[tokio::test]
    async fn test_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"configured": false})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = BackendClient::new(&server.uri()).unwrap();
        assert!(!backend.status().await.unwrap().configured);
    }

    #[tokio::test]
    async fn test_deploy_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deploy"))
            .and(body_partial_json(serde_json::json!({
                "wasmBase64": "AGFzbQ==",
                "initMethod": "new",
                "initArgs": {}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment_json()))
            .expect(1)
            .mount(&server)
            .await;

        let backend = BackendClient::new(&server.uri()).unwrap();
        let deployment = backend
            .deploy("AGFzbQ==", "new", &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(deployment.contract_id, "nbx-1700000000.testnet");
        assert_eq!(deployment.transaction_hash, "9xKf");
        assert_eq!(deployment.explorer_links().len(), 2);
    }

    #[tokio::test]
    async fn test_deploy_503_means_not_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deploy"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": "NEAR CLI not configured"
            })))
            .mount(&server)
            .await;

        let backend = BackendClient::new(&server.uri()).unwrap();
        let err = backend
            .deploy("AGFzbQ==", "new", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendNotConfigured);
    }

    #[tokio::test]
    async fn test_deploy_failure_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deploy"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "Not enough balance"
            })))
            .mount(&server)
            .await;

        let backend = BackendClient::new(&server.uri()).unwrap();
        let err = backend
            .deploy("AGFzbQ==", "new", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeploymentRejected);
        assert_eq!(err.to_string(), "Not enough balance");
    }

    #[tokio::test]
    async fn test_deploy_success_false_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deploy"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": false, "error": "nonce too low"})),
            )
            .mount(&server)
            .await;

        let backend = BackendClient::new(&server.uri()).unwrap();
        let err = backend
            .deploy("AGFzbQ==", "new", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nonce too low");
    }

    #[tokio::test]
    async fn test_view_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contract/view"))
            .and(body_partial_json(serde_json::json!({
                "contractAccountId": "nbx.testnet",
                "methodName": "hello_world"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "result": "Hello, NEAR!"})),
            )
            .mount(&server)
            .await;

        let backend = BackendClient::new(&server.uri()).unwrap();
        let result = backend
            .view("nbx.testnet", "hello_world", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result, "Hello, NEAR!");
    }
}
