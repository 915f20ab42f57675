// crates/exchange-gate-audit/src/http.rs
// ============================================================================
// Module: HTTP Audit Sink
// Description: Audit sink posting records to a remote audit service.
// Purpose: Forward audit records to the central audit log endpoint.
// Dependencies: async-trait, reqwest
// ============================================================================

//! ## Overview
//! Records are posted as JSON to `<base_url>/api/audit-logs`. Only
//! `201 Created` acknowledges a record; every other status is reported as
//! [`AuditSinkError::Rejected`] with a truncated body so the recorder can
//! decide whether to retry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use exchange_gate_core::AuditLogRecord;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;

use crate::sink::AuditSink;
use crate::sink::AuditSinkError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Path of the audit ingestion endpoint relative to the base URL.
pub const AUDIT_LOGS_PATH: &str = "/api/audit-logs";
/// Header carrying the request correlation identifier.
pub const CORRELATION_HEADER: &str = "x-correlation-id";
/// Maximum response body characters kept on rejection.
const MAX_REJECTION_BODY_CHARS: usize = 512;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// HTTP audit sink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAuditSinkConfig {
    /// Audit service base URL.
    pub base_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

impl HttpAuditSinkConfig {
    /// Creates settings with default timeouts.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Audit sink backed by the audit service REST endpoint.
///
/// # Invariants
/// - `endpoint` is the base URL without a trailing slash plus [`AUDIT_LOGS_PATH`].
pub struct HttpAuditSink {
    /// Fully-qualified ingestion URL.
    endpoint: String,
    /// Optional bearer token.
    token: Option<String>,
    /// HTTP client configured with timeouts.
    client: Client,
}

impl HttpAuditSink {
    /// Builds a sink from settings.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSinkError::Unavailable`] when the client cannot be built.
    pub fn new(config: HttpAuditSinkConfig) -> Result<Self, AuditSinkError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AuditSinkError::Unavailable(err.to_string()))?;
        let base_url = config.base_url.trim_end_matches('/');
        Ok(Self {
            endpoint: format!("{base_url}{AUDIT_LOGS_PATH}"),
            token: config.token,
            client,
        })
    }

    /// Returns the ingestion URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds request headers for one record.
    fn build_headers(&self, record: &AuditLogRecord) -> Result<HeaderMap, AuditSinkError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| AuditSinkError::Serialize("invalid auth token".to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let correlation = HeaderValue::from_str(record.correlation_id.as_str())
            .map_err(|_| AuditSinkError::Serialize("invalid correlation id".to_string()))?;
        headers.insert(CORRELATION_HEADER, correlation);
        Ok(headers)
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        let headers = self.build_headers(record)?;
        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(record)
            .send()
            .await
            .map_err(|err| AuditSinkError::Unavailable(err.to_string()))?;
        match response.status() {
            StatusCode::CREATED => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AuditSinkError::Rejected {
                    status: status.as_u16(),
                    body: body.chars().take(MAX_REJECTION_BODY_CHARS).collect(),
                })
            }
        }
    }
}
