// relaycore-server/src/server.rs
// ============================================================================
// Module: Submission API Router
// Description: axum HTTP router implementing RelayCore's Submission API.
// Purpose: Accept run submissions, report run state, serve artifacts, and
// resolve paused runs, with boundary-only authorization, per-tenant rate
// limiting, and structured audit logging.
// Dependencies: axum, relaycore-core, relaycore-budget, relaycore-contract
// ============================================================================

//! ## Overview
//! Five endpoints, one per spec.md §6 wire operation. Every request is
//! authorized once at the boundary via [`RequestAuthorizer`], then rate
//! limited per tenant, then dispatched to a handler that speaks only to
//! [`RunStateStore`], [`BudgetController`], and the artifact store. Handlers
//! never re-check identity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use relaycore_budget::BudgetController;
use relaycore_budget::BudgetError;
use relaycore_contract::ApiErrorBody;
use relaycore_contract::FailureCode;
use relaycore_contract::ManualDecision;
use relaycore_contract::ManualDecisionRequest;
use relaycore_contract::OperatorInputRequest;
use relaycore_contract::ResumeResponse;
use relaycore_contract::RunStateResponse;
use relaycore_contract::SubmitRunRequest;
use relaycore_contract::SubmitRunResponse;
use relaycore_core::ArtifactError;
use relaycore_core::ArtifactReader;
use relaycore_core::ArtifactSink;
use relaycore_core::ExecutionMode;
use relaycore_core::Money;
use relaycore_core::Run;
use relaycore_core::RunId;
use relaycore_core::RunStateStore;
use relaycore_core::RunStatus;
use relaycore_core::StoreError;
use relaycore_core::TenantId;
use relaycore_core::Timestamp;
use serde_json::Value;
use uuid::Uuid;

use crate::audit::RequestAuditEvent;
use crate::audit::RequestAuditSink;
use crate::auth::ApiAction;
use crate::auth::AuthAuditEvent;
use crate::auth::AuthAuditSink;
use crate::auth::AuthError;
use crate::auth::RequestAuthorizer;
use crate::auth::RequestContext;
use crate::config::RateLimitConfig;

// ============================================================================
// SECTION: Application State
// ============================================================================

/// An artifact backend satisfying both read and write roles.
///
/// Lets [`AppState`] hold a single trait object rather than two, since every
/// concrete artifact store (e.g. [`crate::artifact_store::FileArtifactStore`])
/// implements both halves together.
pub trait ArtifactStoreHandle: ArtifactSink + ArtifactReader {}

impl<T> ArtifactStoreHandle for T where T: ArtifactSink + ArtifactReader {}

/// Shared dependencies for every Submission API handler.
#[derive(Clone)]
pub struct AppState {
    run_state: Arc<dyn RunStateStore>,
    budget: Arc<dyn BudgetController>,
    artifacts: Arc<dyn ArtifactStoreHandle>,
    authz: Arc<dyn RequestAuthorizer>,
    auth_audit: Arc<dyn AuthAuditSink>,
    request_audit: Arc<dyn RequestAuditSink>,
    rate_limiter: Arc<TenantRateLimiter>,
}

impl AppState {
    /// Builds application state from its component dependencies.
    #[must_use]
    pub fn new(
        run_state: Arc<dyn RunStateStore>,
        budget: Arc<dyn BudgetController>,
        artifacts: Arc<dyn ArtifactStoreHandle>,
        authz: Arc<dyn RequestAuthorizer>,
        auth_audit: Arc<dyn AuthAuditSink>,
        request_audit: Arc<dyn RequestAuditSink>,
        rate_limit: RateLimitConfig,
    ) -> Self {
        Self {
            run_state,
            budget,
            artifacts,
            authz,
            auth_audit,
            request_audit,
            rate_limiter: Arc::new(TenantRateLimiter::new(rate_limit)),
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the Submission API router over `state`.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/runs", post(submit_run))
        .route("/runs/{run_id}", get(fetch_run_state))
        .route("/runs/{run_id}/artifacts", get(list_artifacts))
        .route("/runs/{run_id}/artifacts/{*path}", get(fetch_artifact))
        .route("/operator-input", post(submit_operator_input))
        .route("/decision", post(submit_manual_decision))
        .with_state(state)
}

/// Serves the Submission API on `bind`, propagating peer addresses to
/// handlers for auth and audit decisions.
///
/// # Errors
///
/// Returns [`std::io::Error`] when the listener cannot be bound or the
/// server exits with an I/O failure.
pub async fn serve(state: AppState, bind: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-tenant token-bucket rate limiter.
///
/// # Invariants
/// - At most `max_entries` distinct tenant buckets are tracked; once full,
///   unseen tenants are rate limited conservatively rather than unbounded.
struct TenantRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<TenantId, TokenBucket>>,
}

impl TenantRateLimiter {
    fn new(config: RateLimitConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()) }
    }

    /// Attempts to consume one token for `tenant_id`; returns `false` when
    /// the tenant's bucket is exhausted.
    fn acquire(&self, tenant_id: &TenantId) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        let capacity = f64::from(self.config.max_requests);
        #[allow(clippy::cast_precision_loss, reason = "Window bounds are small; precision loss is immaterial.")]
        let refill_per_ms = capacity / self.config.window_ms.max(1) as f64;
        if !buckets.contains_key(tenant_id) && buckets.len() >= self.config.max_entries {
            return false;
        }
        let bucket = buckets
            .entry(tenant_id.clone())
            .or_insert_with(|| TokenBucket { tokens: capacity, last_refill: now });
        #[allow(clippy::cast_precision_loss, reason = "Elapsed request gaps fit comfortably in an f64 mantissa.")]
        let elapsed_ms = now.duration_since(bucket.last_refill).as_millis() as f64;
        bucket.tokens = (bucket.tokens + elapsed_ms * refill_per_ms).min(capacity);
        bucket.last_refill = now;
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// A failure ready to be rendered as an HTTP response.
///
/// `code` is `None` for failures outside spec.md §6's closed taxonomy (e.g.
/// a missing artifact path, which is an ordinary REST 404, not a run
/// lifecycle or admission failure).
struct ApiError {
    status: StatusCode,
    code: Option<FailureCode>,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: FailureCode, message: impl Into<String>) -> Self {
        Self { status, code: Some(code), message: message.into() }
    }

    fn plain(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, code: None, message: message.into() }
    }

    fn failure_code_label(&self) -> Option<&'static str> {
        self.code.map(|code| match code {
            FailureCode::TenantUnknown => "tenant_unknown",
            FailureCode::TenantSuspended => "tenant_suspended",
            FailureCode::BudgetExceeded => "budget_exceeded",
            FailureCode::ConcurrencyExceeded => "concurrency_exceeded",
            FailureCode::SpecInvalid => "spec_invalid",
            FailureCode::NotPaused => "not_paused",
            FailureCode::PatchInvalid => "patch_invalid",
            FailureCode::RunNotFound => "run_not_found",
            FailureCode::TransitionIllegal => "transition_illegal",
            FailureCode::Timeout => "timeout",
            FailureCode::LeaseExpired => "lease_expired",
            FailureCode::TaskDead => "task_dead",
            FailureCode::CapabilityUnavailable => "capability_unavailable",
            FailureCode::LedgerUnavailable => "ledger_unavailable",
            FailureCode::GovernancePaused => "governance_paused",
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        match self.code {
            Some(code) => (status, Json(ApiErrorBody::new(code, self.message))).into_response(),
            None => (status, Json(serde_json::json!({ "message": self.message }))).into_response(),
        }
    }
}

impl From<BudgetError> for ApiError {
    fn from(err: BudgetError) -> Self {
        match err {
            BudgetError::TenantUnknown(_) => {
                Self::new(StatusCode::NOT_FOUND, FailureCode::TenantUnknown, err.to_string())
            }
            BudgetError::TenantSuspended(_) => {
                Self::new(StatusCode::FORBIDDEN, FailureCode::TenantSuspended, err.to_string())
            }
            BudgetError::BudgetExceeded(_) => {
                Self::new(StatusCode::CONFLICT, FailureCode::BudgetExceeded, err.to_string())
            }
            BudgetError::ConcurrencyExceeded(_) => {
                Self::new(StatusCode::CONFLICT, FailureCode::ConcurrencyExceeded, err.to_string())
            }
            BudgetError::TokenNotFound(_) | BudgetError::RunNotAdmitted(_) => {
                Self::new(StatusCode::NOT_FOUND, FailureCode::RunNotFound, err.to_string())
            }
            BudgetError::LedgerUnavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                FailureCode::LedgerUnavailable,
                err.to_string(),
            ),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, FailureCode::RunNotFound, err.to_string())
            }
            StoreError::TransitionIllegal { .. } => {
                Self::new(StatusCode::CONFLICT, FailureCode::TransitionIllegal, err.to_string())
            }
            StoreError::Io(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                FailureCode::LedgerUnavailable,
                err.to_string(),
            ),
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(_) => Self::plain(StatusCode::NOT_FOUND, err.to_string()),
            ArtifactError::Sealed(_) => Self::plain(StatusCode::CONFLICT, err.to_string()),
            ArtifactError::Io(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                FailureCode::LedgerUnavailable,
                err.to_string(),
            ),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(message) => Self::plain(StatusCode::UNAUTHORIZED, message),
            AuthError::Unauthorized(message) => Self::plain(StatusCode::FORBIDDEN, message),
        }
    }
}

// ============================================================================
// SECTION: Request Plumbing
// ============================================================================

fn request_context(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestContext {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let client_subject =
        headers.get("x-client-subject").and_then(|v| v.to_str().ok()).map(str::to_string);
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    RequestContext::http(peer.map(|addr| addr.ip()), auth_header, client_subject)
        .with_request_id(request_id)
}

fn authorize(state: &AppState, ctx: &RequestContext, action: ApiAction) -> Result<(), ApiError> {
    match state.authz.authorize(ctx, action) {
        Ok(auth) => {
            state.auth_audit.record(&AuthAuditEvent::allowed(ctx, action, &auth));
            Ok(())
        }
        Err(err) => {
            state.auth_audit.record(&AuthAuditEvent::denied(ctx, action, &err));
            Err(err.into())
        }
    }
}

fn enforce_rate_limit(state: &AppState, tenant_id: &TenantId) -> Result<(), ApiError> {
    if state.rate_limiter.acquire(tenant_id) {
        Ok(())
    } else {
        Err(ApiError::plain(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"))
    }
}

#[allow(clippy::too_many_arguments, reason = "One audit event per request field.")]
fn record_audit(
    state: &AppState,
    action: ApiAction,
    ctx: &RequestContext,
    run_id: Option<&RunId>,
    tenant_id: Option<&TenantId>,
    status: StatusCode,
    code: Option<&'static str>,
) {
    state.request_audit.record(&RequestAuditEvent::new(
        action,
        ctx.request_id.clone(),
        run_id.map(|id| id.as_str().to_string()),
        tenant_id.map(|id| id.as_str().to_string()),
        ctx.peer_ip.map(|ip| ip.to_string()),
        status.as_u16(),
        code,
        0,
        0,
    ));
}

#[allow(clippy::cast_possible_truncation, reason = "Millisecond epoch fits in i64 until year 292277026596.")]
fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as i64)
}

fn progress_marker(run: &Run) -> String {
    format!("status={status:?}, mode={mode:?}", status = run.status, mode = run.latest_mode)
}

fn estimated_cost(spec: &Value) -> Money {
    spec.get("estimatedCost").and_then(Value::as_f64).map_or(Money::ZERO, Money::from_major_units)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

async fn submit_run(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<SubmitRunRequest>,
) -> Result<(StatusCode, Json<SubmitRunResponse>), ApiError> {
    let ctx = request_context(&headers, Some(peer));
    authorize(&state, &ctx, ApiAction::SubmitRun)?;
    enforce_rate_limit(&state, &req.tenant_id)?;

    if !req.spec.is_object() {
        let err =
            ApiError::new(StatusCode::BAD_REQUEST, FailureCode::SpecInvalid, "spec must be a JSON object");
        record_audit(&state, ApiAction::SubmitRun, &ctx, None, Some(&req.tenant_id), err.status, err.failure_code_label());
        return Err(err);
    }

    let run_id = RunId::new(format!("run-{}", Uuid::new_v4()));
    let cost = estimated_cost(&req.spec);
    let token = match state.budget.admit(&req.tenant_id, &run_id, cost).await {
        Ok(token) => token,
        Err(budget_err) => {
            let err: ApiError = budget_err.into();
            record_audit(&state, ApiAction::SubmitRun, &ctx, Some(&run_id), Some(&req.tenant_id), err.status, err.failure_code_label());
            return Err(err);
        }
    };

    let run =
        Run::new(run_id.clone(), req.tenant_id.clone(), req.spec.clone(), Timestamp::UnixMillis(now_millis()));
    if let Err(store_err) = state.run_state.create(run).await {
        state.budget.release(&token).await;
        let err: ApiError = store_err.into();
        record_audit(&state, ApiAction::SubmitRun, &ctx, Some(&run_id), Some(&req.tenant_id), err.status, err.failure_code_label());
        return Err(err);
    }

    let record = state
        .run_state
        .transition(&run_id, RunStatus::SpecReady, "admitted", "submission-api")
        .await
        .map_err(ApiError::from)?;

    record_audit(&state, ApiAction::SubmitRun, &ctx, Some(&run_id), Some(&req.tenant_id), StatusCode::CREATED, None);
    Ok((
        StatusCode::CREATED,
        Json(SubmitRunResponse { run_id, state: record.to, admission_token: Some(token.as_str().to_string()) }),
    ))
}

async fn fetch_run_state(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<RunStateResponse>, ApiError> {
    let ctx = request_context(&headers, Some(peer));
    authorize(&state, &ctx, ApiAction::FetchRunState)?;

    let run_id = RunId::new(run_id);
    let run = state.run_state.read(&run_id).await.map_err(ApiError::from)?;
    enforce_rate_limit(&state, &run.tenant_id)?;

    record_audit(&state, ApiAction::FetchRunState, &ctx, Some(&run_id), Some(&run.tenant_id), StatusCode::OK, None);
    Ok(Json(RunStateResponse {
        run_id: run.run_id.clone(),
        tenant_id: run.tenant_id.clone(),
        state: run.status,
        current_plan_id: run.current_plan_id.clone(),
        latest_mode: run.latest_mode,
        cumulative_cost: run.cumulative_cost,
        progress: progress_marker(&run),
    }))
}

async fn list_artifacts(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let ctx = request_context(&headers, Some(peer));
    authorize(&state, &ctx, ApiAction::FetchArtifact)?;

    let run_id = RunId::new(run_id);
    let run = state.run_state.read(&run_id).await.map_err(ApiError::from)?;
    enforce_rate_limit(&state, &run.tenant_id)?;

    let paths = state.artifacts.list(&run_id).await.map_err(ApiError::from)?;
    record_audit(&state, ApiAction::FetchArtifact, &ctx, Some(&run_id), Some(&run.tenant_id), StatusCode::OK, None);
    Ok(Json(paths))
}

async fn fetch_artifact(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path((run_id, path)): Path<(String, String)>,
) -> Result<Vec<u8>, ApiError> {
    let ctx = request_context(&headers, Some(peer));
    authorize(&state, &ctx, ApiAction::FetchArtifact)?;

    let run_id = RunId::new(run_id);
    let run = state.run_state.read(&run_id).await.map_err(ApiError::from)?;
    enforce_rate_limit(&state, &run.tenant_id)?;

    let bytes = state.artifacts.read(&run_id, &path).await.map_err(ApiError::from)?;
    record_audit(&state, ApiAction::FetchArtifact, &ctx, Some(&run_id), Some(&run.tenant_id), StatusCode::OK, None);
    Ok(bytes)
}

async fn submit_operator_input(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<OperatorInputRequest>,
) -> Result<Json<ResumeResponse>, ApiError> {
    let ctx = request_context(&headers, Some(peer));
    authorize(&state, &ctx, ApiAction::SubmitOperatorInput)?;

    let run = state.run_state.read(&req.run_id).await.map_err(ApiError::from)?;
    enforce_rate_limit(&state, &run.tenant_id)?;

    if run.status != RunStatus::Paused {
        let err = ApiError::new(StatusCode::CONFLICT, FailureCode::NotPaused, "run is not paused");
        record_audit(&state, ApiAction::SubmitOperatorInput, &ctx, Some(&req.run_id), Some(&run.tenant_id), err.status, err.failure_code_label());
        return Err(err);
    }
    if !req.patch.is_object() {
        let err =
            ApiError::new(StatusCode::BAD_REQUEST, FailureCode::PatchInvalid, "patch must be a JSON object");
        record_audit(&state, ApiAction::SubmitOperatorInput, &ctx, Some(&req.run_id), Some(&run.tenant_id), err.status, err.failure_code_label());
        return Err(err);
    }

    let record = state
        .run_state
        .transition(&req.run_id, RunStatus::Running, &req.patch.to_string(), "operator-input")
        .await
        .map_err(ApiError::from)?;

    record_audit(&state, ApiAction::SubmitOperatorInput, &ctx, Some(&req.run_id), Some(&run.tenant_id), StatusCode::OK, None);
    Ok(Json(ResumeResponse { run_id: req.run_id, state: record.to }))
}

async fn submit_manual_decision(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ManualDecisionRequest>,
) -> Result<Json<ResumeResponse>, ApiError> {
    let ctx = request_context(&headers, Some(peer));
    authorize(&state, &ctx, ApiAction::SubmitManualDecision)?;

    let run = state.run_state.read(&req.run_id).await.map_err(ApiError::from)?;
    enforce_rate_limit(&state, &run.tenant_id)?;

    if run.status != RunStatus::Paused {
        let err = ApiError::new(StatusCode::CONFLICT, FailureCode::NotPaused, "run is not paused");
        record_audit(&state, ApiAction::SubmitManualDecision, &ctx, Some(&req.run_id), Some(&run.tenant_id), err.status, err.failure_code_label());
        return Err(err);
    }

    let reason = match req.decision {
        ManualDecision::ContinueMinimal => {
            state.run_state.record_mode(&req.run_id, ExecutionMode::Minimal).await.map_err(ApiError::from)?;
            "manual_decision:continue_minimal"
        }
        ManualDecision::ContinueDegraded => {
            state.run_state.record_mode(&req.run_id, ExecutionMode::Degraded).await.map_err(ApiError::from)?;
            "manual_decision:continue_degraded"
        }
        ManualDecision::Stop => "manual_decision:stop",
    };
    let to = if matches!(req.decision, ManualDecision::Stop) { RunStatus::Failed } else { RunStatus::Running };
    let record =
        state.run_state.transition(&req.run_id, to, reason, "operator").await.map_err(ApiError::from)?;

    record_audit(&state, ApiAction::SubmitManualDecision, &ctx, Some(&req.run_id), Some(&run.tenant_id), StatusCode::OK, None);
    Ok(Json(ResumeResponse { run_id: req.run_id, state: record.to }))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
