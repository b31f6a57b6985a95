//! Client for the remote build service.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::backend::{self, ErrorBody};
use crate::{CompiledArtifact, DeployError, SourceLanguage};

#[derive(Debug, Serialize)]
struct CompileRequest<'a> {
    code: &'a str,
    language: SourceLanguage,
}

#[derive(Debug, Deserialize)]
struct CompileResponse {
    #[serde(default)]
    success: bool,
    wasm: Option<String>,
    size: Option<u64>,
    stderr: Option<String>,
    error: Option<String>,
    compilation_time: Option<f64>,
}

/// Sends source code to the build service and normalizes the answer.
///
/// Calls are not meant to overlap; the orchestrator serializes them behind
/// its busy flag.
#[derive(Debug, Clone)]
pub struct CompileClient {
    client: reqwest::Client,
    base_url: String,
}

impl CompileClient {
    pub fn new(base_url: &str) -> Result<Self, DeployError> {
        Ok(Self {
            client: backend::http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Compile `code` written in `language`.
    ///
    /// # Errors
    /// - [`DeployError::EmptySource`] if `code` is blank; no request is made
    /// - [`DeployError::Unreachable`] if the service cannot be reached
    /// - [`DeployError::CompileRejected`] on a non-2xx status or `success: false`
    /// - [`DeployError::InvalidResponse`] if the wasm payload is not valid base64
    pub async fn compile(
        &self,
        code: &str,
        language: SourceLanguage,
    ) -> Result<CompiledArtifact, DeployError> {
        if code.trim().is_empty() {
            return Err(DeployError::EmptySource);
        }

        let url = format!("{}/compile", self.base_url);
        tracing::debug!(url = %url, language = %language, "Compiling contract");

        let response = self
            .client
            .post(&url)
            .json(&CompileRequest { code, language })
            .send()
            .await
            .map_err(|e| DeployError::unreachable(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(DeployError::CompileRejected(
                body.into_message(format!("HTTP {}", status)),
            ));
        }

        let result: CompileResponse = response
            .json()
            .await
            .map_err(|e| DeployError::InvalidResponse(e.to_string()))?;

        if !result.success {
            let message = result
                .stderr
                .or(result.error)
                .unwrap_or_else(|| "Compilation failed".to_string());
            return Err(DeployError::CompileRejected(message));
        }

        let wasm = STANDARD
            .decode(result.wasm.as_deref().unwrap_or_default())
            .map_err(|e| DeployError::InvalidResponse(format!("wasm is not base64: {}", e)))?;
        let size_bytes = reported_size(result.size, wasm.len());

        tracing::info!(size_bytes, language = %language, "Contract compiled");

        Ok(CompiledArtifact {
            success: true,
            wasm,
            size_bytes,
            diagnostics: result.stderr,
            compile_duration_secs: result.compilation_time,
        })
    }
}

/// The size to show for a compiled artifact.
///
/// The server's figure is kept verbatim; a disagreement with the decoded
/// payload is logged.
fn reported_size(reported: Option<u64>, decoded_len: usize) -> u64 {
    let decoded = decoded_len as u64;
    match reported {
        Some(size) if size != decoded => {
            tracing::warn!(
                reported = size,
                decoded,
                "Compile service size differs from the decoded wasm length"
            );
            size
        }
        Some(size) => size,
        None => decoded,
    }
}
