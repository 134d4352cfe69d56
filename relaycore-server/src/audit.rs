// relaycore-server/src/audit.rs
// ============================================================================
// Module: Submission API Audit Logging
// Description: Structured audit events for Submission API request handling.
// Purpose: Emit redacted audit logs without tying callers to a specific sink.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! One event is emitted per completed Submission API request. Sinks are
//! pluggable so deployments can route events to their preferred logging
//! pipeline without redesign.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::auth::ApiAction;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Submission API audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Endpoint invoked.
    pub action: &'static str,
    /// Run id the request concerned, when applicable.
    pub run_id: Option<String>,
    /// Tenant id the request concerned, when applicable.
    pub tenant_id: Option<String>,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// HTTP status code returned to the caller.
    pub status_code: u16,
    /// Wire failure code on error responses.
    pub failure_code: Option<&'static str>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

impl RequestAuditEvent {
    /// Builds an audit event for a completed request.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "One audit event per request field; splitting adds indirection without reducing call-site complexity.")]
    pub fn new(
        action: ApiAction,
        request_id: Option<String>,
        run_id: Option<String>,
        tenant_id: Option<String>,
        peer_ip: Option<String>,
        status_code: u16,
        failure_code: Option<&'static str>,
        request_bytes: usize,
        response_bytes: usize,
    ) -> Self {
        Self {
            event: "submission_api_request",
            timestamp_ms: now_millis(),
            request_id,
            action: action_label(action),
            run_id,
            tenant_id,
            peer_ip,
            status_code,
            failure_code,
            request_bytes,
            response_bytes,
        }
    }
}

fn action_label(action: ApiAction) -> &'static str {
    match action {
        ApiAction::SubmitRun => "submit_run",
        ApiAction::FetchRunState => "fetch_run_state",
        ApiAction::FetchArtifact => "fetch_artifact",
        ApiAction::SubmitOperatorInput => "submit_operator_input",
        ApiAction::SubmitManualDecision => "submit_manual_decision",
    }
}

fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default()
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink for Submission API audit events.
pub trait RequestAuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &RequestAuditEvent);
}

/// No-op sink, used when audit logging is disabled.
pub struct NoopRequestAuditSink;

impl RequestAuditSink for NoopRequestAuditSink {
    fn record(&self, _event: &RequestAuditEvent) {}
}

/// Sink that writes JSON lines to stderr.
pub struct StderrRequestAuditSink;

impl RequestAuditSink for StderrRequestAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            eprintln!("{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
///
/// # Invariants
/// - Writes are serialized through an internal mutex; one line per event.
pub struct FileRequestAuditSink {
    file: Mutex<std::fs::File>,
}

impl FileRequestAuditSink {
    /// Opens (creating if absent) the audit log file at `path` for
    /// append-only writes.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] when the file cannot be opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl RequestAuditSink for FileRequestAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        let Ok(payload) = serde_json::to_string(event) else { return };
        let mut file = self.file.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = writeln!(file, "{payload}");
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
