//! Sandbox provider — the external system that actually creates, stops,
//! and reports sandbox compute resources.
//!
//! DESIGN
//! ======
//! The lifecycle controller only ever talks to the [`SandboxProvider`]
//! trait. Production wires in the HTTP client; tests wire in doubles that
//! script successes and failures. Provider truth and the cached status can
//! drift between polls; `status` reconciles them on the read path.

pub mod http;

pub use http::HttpSandboxProvider;

use crate::state::SandboxStatus;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider configuration error: {0}")]
    Config(String),
    #[error("failed to build provider HTTP client: {0}")]
    HttpClientBuild(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },
}

// =============================================================================
// CONTRACT
// =============================================================================

/// Result of a successful provisioning call.
#[derive(Debug, Clone)]
pub struct ProvisionedSandbox {
    pub sandbox_id: String,
    pub preview_url: String,
}

/// Live view reported by the provider for an existing sandbox.
#[derive(Debug, Clone)]
pub struct SandboxProbe {
    pub status: SandboxStatus,
    pub preview_url: Option<String>,
    pub error: Option<String>,
}

#[async_trait::async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a new sandbox for a project.
    async fn create(&self, title: &str) -> Result<ProvisionedSandbox, ProviderError>;

    /// Query live status for an existing sandbox.
    async fn status(&self, sandbox_id: &str) -> Result<SandboxProbe, ProviderError>;

    /// Request graceful shutdown of a sandbox.
    async fn stop(&self, sandbox_id: &str) -> Result<SandboxProbe, ProviderError>;
}
