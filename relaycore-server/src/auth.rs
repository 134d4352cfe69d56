// relaycore-server/src/auth.rs
// ============================================================================
// Module: Submission API Authn/Authz
// Description: Boundary-only authentication and authorization for the
// Submission API.
// Purpose: Provide strict, fail-closed auth policies for inbound requests.
// Dependencies: relaycore-core, serde
// ============================================================================

//! ## Overview
//! Authorization happens once, at the HTTP boundary, before a request
//! reaches any handler; nothing downstream re-checks identity. All
//! decisions are fail-closed and emit audit events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::IpAddr;

use relaycore_core::hashing::HashAlgorithm;
use relaycore_core::hashing::hash_bytes;
use serde::Serialize;
use thiserror::Error;

use crate::config::ServerAuthConfig;
use crate::config::ServerAuthMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context used for auth decisions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Authorization header value.
    pub auth_header: Option<String>,
    /// Client subject asserted by a trusted mTLS-terminating proxy.
    pub client_subject: Option<String>,
    /// Optional request identifier for auditing.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Builds an HTTP request context.
    #[must_use]
    pub fn http(
        peer_ip: Option<IpAddr>,
        auth_header: Option<String>,
        client_subject: Option<String>,
    ) -> Self {
        Self { peer_ip, auth_header, client_subject, request_id: None }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns true when the peer IP is loopback.
    #[must_use]
    pub fn peer_is_loopback(&self) -> bool {
        self.peer_ip.is_some_and(|ip| ip.is_loopback())
    }
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Authenticated caller context.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authentication method.
    pub method: AuthMethod,
    /// Optional subject identifier.
    pub subject: Option<String>,
    /// Token fingerprint for bearer auth (hashed).
    pub token_fingerprint: Option<String>,
}

impl AuthContext {
    fn method_label(&self) -> &'static str {
        match self.method {
            AuthMethod::Local => "local",
            AuthMethod::BearerToken => "bearer_token",
            AuthMethod::MtlsSubject => "mtls_subject",
        }
    }
}

/// Authentication method used for the request.
#[derive(Debug, Clone, Copy)]
pub enum AuthMethod {
    /// Local-only loopback access.
    Local,
    /// Bearer token authentication.
    BearerToken,
    /// mTLS subject authentication via trusted proxy header.
    MtlsSubject,
}

/// Submission API endpoint an authorization decision is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiAction {
    /// `POST /runs`.
    SubmitRun,
    /// `GET /runs/:run_id`.
    FetchRunState,
    /// `GET /runs/:run_id/artifacts*`.
    FetchArtifact,
    /// `POST /runs/:run_id/operator-input`.
    SubmitOperatorInput,
    /// `POST /runs/:run_id/decision`.
    SubmitManualDecision,
}

impl ApiAction {
    fn label(self) -> &'static str {
        match self {
            Self::SubmitRun => "submit_run",
            Self::FetchRunState => "fetch_run_state",
            Self::FetchArtifact => "fetch_artifact",
            Self::SubmitOperatorInput => "submit_operator_input",
            Self::SubmitManualDecision => "submit_manual_decision",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication or authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Caller is authenticated but not authorized.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Authn/authz interface for Submission API requests.
pub trait RequestAuthorizer: Send + Sync {
    /// Authorizes a request. Returns an authenticated context on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the request cannot be authenticated or
    /// is not authorized for `action`.
    fn authorize(&self, ctx: &RequestContext, action: ApiAction) -> Result<AuthContext, AuthError>;
}

/// Audit sink for auth decisions.
pub trait AuthAuditSink: Send + Sync {
    /// Records an auth audit event.
    fn record(&self, event: &AuthAuditEvent);
}

// ============================================================================
// SECTION: Default Policy
// ============================================================================

/// Default authorizer derived from server auth configuration.
pub struct DefaultRequestAuthorizer {
    mode: ServerAuthMode,
    bearer_tokens: BTreeSet<String>,
    mtls_subjects: BTreeSet<String>,
}

impl DefaultRequestAuthorizer {
    /// Builds a default authorizer from server auth configuration.
    #[must_use]
    pub fn from_config(config: Option<&ServerAuthConfig>) -> Self {
        let mode = config.map_or(ServerAuthMode::LocalOnly, |cfg| cfg.mode);
        let bearer_tokens =
            config.map(|cfg| cfg.bearer_tokens.iter().cloned().collect()).unwrap_or_default();
        let mtls_subjects =
            config.map(|cfg| cfg.mtls_subjects.iter().cloned().collect()).unwrap_or_default();
        Self { mode, bearer_tokens, mtls_subjects }
    }

    /// Returns the configured auth mode.
    #[must_use]
    pub const fn mode(&self) -> ServerAuthMode {
        self.mode
    }
}

impl RequestAuthorizer for DefaultRequestAuthorizer {
    fn authorize(&self, ctx: &RequestContext, _action: ApiAction) -> Result<AuthContext, AuthError> {
        let mut auth = match self.mode {
            ServerAuthMode::LocalOnly => authorize_local_only(ctx)?,
            ServerAuthMode::BearerToken => authorize_bearer(ctx, &self.bearer_tokens)?,
            ServerAuthMode::Mtls => authorize_mtls(ctx, &self.mtls_subjects)?,
        };
        if auth.subject.is_none() && matches!(auth.method, AuthMethod::Local) {
            auth.subject = Some("loopback".to_string());
        }
        Ok(auth)
    }
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Auth audit event payload.
#[derive(Debug, Serialize)]
pub struct AuthAuditEvent {
    event: &'static str,
    decision: &'static str,
    action: &'static str,
    peer_ip: Option<String>,
    auth_method: Option<&'static str>,
    subject: Option<String>,
    token_fingerprint: Option<String>,
    reason: Option<String>,
    request_id: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(ctx: &RequestContext, action: ApiAction, auth: &AuthContext) -> Self {
        Self {
            event: "submission_api_authz",
            decision: "allow",
            action: action.label(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: Some(auth.method_label()),
            subject: auth.subject.clone(),
            token_fingerprint: auth.token_fingerprint.clone(),
            reason: None,
            request_id: ctx.request_id.clone(),
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(ctx: &RequestContext, action: ApiAction, error: &AuthError) -> Self {
        Self {
            event: "submission_api_authz",
            decision: "deny",
            action: action.label(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: None,
            subject: None,
            token_fingerprint: None,
            reason: Some(error.to_string()),
            request_id: ctx.request_id.clone(),
        }
    }
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuthAuditSink for StderrAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            eprintln!("{payload}");
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuthAuditSink for NoopAuditSink {
    fn record(&self, _event: &AuthAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn authorize_local_only(ctx: &RequestContext) -> Result<AuthContext, AuthError> {
    if ctx.peer_is_loopback() {
        Ok(AuthContext { method: AuthMethod::Local, subject: Some("loopback".to_string()), token_fingerprint: None })
    } else {
        Err(AuthError::Unauthenticated("local-only mode requires loopback access".to_string()))
    }
}

fn authorize_bearer(
    ctx: &RequestContext,
    tokens: &BTreeSet<String>,
) -> Result<AuthContext, AuthError> {
    let token = parse_bearer_token(ctx.auth_header.as_deref())?;
    if !tokens.contains(&token) {
        return Err(AuthError::Unauthenticated("invalid bearer token".to_string()));
    }
    let digest = hash_bytes(HashAlgorithm::Sha256, token.as_bytes());
    Ok(AuthContext { method: AuthMethod::BearerToken, subject: None, token_fingerprint: Some(digest.value) })
}

fn authorize_mtls(
    ctx: &RequestContext,
    subjects: &BTreeSet<String>,
) -> Result<AuthContext, AuthError> {
    let subject = ctx
        .client_subject
        .as_deref()
        .ok_or_else(|| AuthError::Unauthenticated("missing mTLS client subject".to_string()))?;
    if !subjects.is_empty() && !subjects.contains(subject) {
        return Err(AuthError::Unauthorized("client subject not authorized".to_string()));
    }
    Ok(AuthContext { method: AuthMethod::MtlsSubject, subject: Some(subject.to_string()), token_fingerprint: None })
}

fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header =
        auth_header.ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn local_only_rejects_non_loopback() {
        let authz = DefaultRequestAuthorizer::from_config(None);
        let ctx = RequestContext::http(Some("8.8.8.8".parse().unwrap()), None, None);
        assert!(authz.authorize(&ctx, ApiAction::SubmitRun).is_err());
    }

    #[test]
    fn bearer_token_accepts_known_token() {
        let config = ServerAuthConfig {
            mode: ServerAuthMode::BearerToken,
            bearer_tokens: vec!["secret-token".to_string()],
            mtls_subjects: Vec::new(),
        };
        let authz = DefaultRequestAuthorizer::from_config(Some(&config));
        let ctx = RequestContext::http(None, Some("Bearer secret-token".to_string()), None);
        let auth = authz.authorize(&ctx, ApiAction::SubmitRun).unwrap();
        assert!(matches!(auth.method, AuthMethod::BearerToken));
    }

    #[test]
    fn bearer_token_rejects_unknown_token() {
        let config = ServerAuthConfig {
            mode: ServerAuthMode::BearerToken,
            bearer_tokens: vec!["secret-token".to_string()],
            mtls_subjects: Vec::new(),
        };
        let authz = DefaultRequestAuthorizer::from_config(Some(&config));
        let ctx = RequestContext::http(None, Some("Bearer wrong".to_string()), None);
        assert!(authz.authorize(&ctx, ApiAction::SubmitRun).is_err());
    }
}
