//! Compiled contract artifacts.

use base64::{Engine, engine::general_purpose::STANDARD};

/// Output of one compile request.
///
/// Immutable once produced. The reported size and duration come from the build
/// service and are never recomputed locally.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    pub success: bool,
    /// Raw wasm bytes.
    pub wasm: Vec<u8>,
    /// Size reported by the build service, in bytes.
    pub size_bytes: u64,
    pub diagnostics: Option<String>,
    pub compile_duration_secs: Option<f64>,
}

impl CompiledArtifact {
    /// Base64 encoding of the wasm, as the backend deploy endpoint expects it.
    pub fn wasm_base64(&self) -> String {
        STANDARD.encode(&self.wasm)
    }

    /// Size in kilobytes, rounded to two decimals for display.
    pub fn size_kb(&self) -> String {
        format!("{:.2}", self.size_bytes as f64 / 1024.0)
    }
}
