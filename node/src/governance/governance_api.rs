//! Governance HTTP API
//!
//! JSON endpoints for proposal creation, voting and lifecycle checks. Handlers
//! call the tracker and translate its typed outcome into a status code.
//!
//! ## Endpoints
//!
//! ```text
//! GET    /agora/api/health
//! GET    /agora/api/proposals?status=&category=&author=&limit=
//! POST   /agora/api/proposals
//! GET    /agora/api/proposals/stats
//! POST   /agora/api/proposals/sweep
//! GET    /agora/api/proposals/{id}
//! DELETE /agora/api/proposals/{id}
//! POST   /agora/api/proposals/{id}/votes
//! GET    /agora/api/proposals/{id}/votes/{voter}
//! POST   /agora/api/proposals/{id}/check-status
//! ```

use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::proposal_store::ProposalFilter;
use super::tracker::{NewProposal, ProposalTracker};
use super::{
    GovernanceError, Proposal, ProposalCategory, ProposalMetadata, ProposalStatus, VoteRecord,
};
use crate::rate_limiter::WalletRateLimiter;

/// Route prefix for every endpoint
pub const API_PREFIX: &str = "/agora/api";

// =============================================================================
// API RESPONSE
// =============================================================================

/// Standard API response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn success_message(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            data: None,
        }
    }
}

// =============================================================================
// PROPOSAL TYPES
// =============================================================================

/// Proposal as returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub id: String,
    pub author: String,
    pub title: String,
    pub description: String,
    pub category: ProposalCategory,
    pub status: ProposalStatus,
    pub votes_for: u64,
    pub votes_against: u64,
    pub total_votes: u64,
    pub support_rate: f64,
    pub voter_count: usize,
    pub created_at: i64,
    pub deadline: i64,
    pub time_remaining: i64,
    pub voting_open: bool,
    pub metadata: ProposalMetadata,
}

impl ProposalResponse {
    pub fn from_proposal(proposal: &Proposal, now: i64) -> Self {
        Self {
            id: proposal.id.clone(),
            author: proposal.author.clone(),
            title: proposal.title.clone(),
            description: proposal.description.clone(),
            category: proposal.category,
            status: proposal.status,
            votes_for: proposal.votes_for,
            votes_against: proposal.votes_against,
            total_votes: proposal.total_votes(),
            support_rate: proposal.support_rate(),
            voter_count: proposal.votes.len(),
            created_at: proposal.created_at,
            deadline: proposal.deadline,
            time_remaining: proposal.time_remaining(now),
            voting_open: proposal.is_voting_open(now),
            metadata: proposal.metadata,
        }
    }
}

/// Request body for proposal creation
#[derive(Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub author: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub voting_period_secs: Option<i64>,
}

/// Request body for proposal deletion
#[derive(Debug, Deserialize)]
pub struct DeleteProposalRequest {
    pub requester: String,
}

// =============================================================================
// VOTE TYPES
// =============================================================================

/// Request body for vote submission
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub voter: String,
    pub choice: String,
}

/// Accepted vote with the updated tallies
#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub proposal_id: String,
    pub vote: VoteRecord,
    pub votes_for: u64,
    pub votes_against: u64,
}

/// Result of an explicit status check
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckStatusResponse {
    pub proposal: ProposalResponse,
    /// Status this request moved the proposal into, if any
    pub transitioned: Option<ProposalStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    pub transitioned: Vec<String>,
    pub count: usize,
}

// =============================================================================
// GOVERNANCE API
// =============================================================================

/// Governance API handler
pub struct GovernanceApi {
    tracker: Arc<ProposalTracker>,
    limiter: Arc<WalletRateLimiter>,
}

impl GovernanceApi {
    pub fn new(tracker: Arc<ProposalTracker>, limiter: Arc<WalletRateLimiter>) -> Self {
        Self { tracker, limiter }
    }

    /// Handle an incoming HTTP request
    pub async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!("Governance API request: {} {}", method, path);

        let segments = match route_segments(&path) {
            Some(segments) => segments,
            None => return Ok(self.not_found()),
        };

        let response = match (method, segments.as_slice()) {
            (Method::GET, ["health"]) => self.handle_health().await,

            (Method::GET, ["proposals"]) => self.handle_list_proposals(req.uri().query()).await,
            (Method::POST, ["proposals"]) => self.handle_create_proposal(req).await,
            (Method::GET, ["proposals", "stats"]) => self.handle_stats().await,
            (Method::POST, ["proposals", "sweep"]) => self.handle_sweep().await,

            (Method::GET, ["proposals", id]) => self.handle_get_proposal(id).await,
            (Method::DELETE, ["proposals", id]) => self.handle_delete_proposal(id, req).await,
            (Method::POST, ["proposals", id, "check-status"]) => {
                self.handle_check_status(id).await
            }

            (Method::POST, ["proposals", id, "votes"]) => self.handle_submit_vote(id, req).await,
            (Method::GET, ["proposals", id, "votes", voter]) => {
                self.handle_get_vote(id, voter).await
            }

            (Method::OPTIONS, _) => cors_preflight(),

            _ => self.not_found(),
        };

        Ok(response)
    }

    // =========================================================================
    // HEALTH
    // =========================================================================

    async fn handle_health(&self) -> Response<Body> {
        match self.tracker.stats().await {
            Ok(stats) => {
                let response = serde_json::json!({
                    "status": "healthy",
                    "service": "agora-governance",
                    "proposal_count": stats.total,
                    "rate_limiting": self.limiter.is_enabled(),
                });
                json_response(StatusCode::OK, &response)
            }
            Err(e) => error_response(&e),
        }
    }

    // =========================================================================
    // PROPOSAL HANDLERS
    // =========================================================================

    async fn handle_list_proposals(&self, query: Option<&str>) -> Response<Body> {
        let filter = match parse_filter(query) {
            Ok(f) => f,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
        };

        match self.tracker.list_proposals(&filter).await {
            Ok(proposals) => {
                let now = self.tracker.clock().now();
                let responses: Vec<ProposalResponse> = proposals
                    .iter()
                    .map(|p| ProposalResponse::from_proposal(p, now))
                    .collect();
                json_response(StatusCode::OK, &ApiResponse::success(responses))
            }
            Err(e) => error_response(&e),
        }
    }

    async fn handle_create_proposal(&self, req: Request<Body>) -> Response<Body> {
        let body = match parse_body::<CreateProposalRequest>(req).await {
            Ok(b) => b,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
        };

        let category = match body.category.parse::<ProposalCategory>() {
            Ok(c) => c,
            Err(e) => return error_response(&e),
        };

        if !self.limiter.check(body.author.trim()).await {
            warn!("Rate limited proposal creation from {}", body.author);
            return rate_limited();
        }

        let request = NewProposal {
            author: body.author,
            title: body.title,
            description: body.description,
            category,
            voting_period_secs: body.voting_period_secs,
        };

        match self.tracker.create_proposal(request).await {
            Ok(proposal) => {
                info!("Created proposal {} by {}", proposal.id, proposal.author);
                let now = self.tracker.clock().now();
                let response = ProposalResponse::from_proposal(&proposal, now);
                json_response(StatusCode::CREATED, &ApiResponse::success(response))
            }
            Err(e) => error_response(&e),
        }
    }

    async fn handle_get_proposal(&self, id: &str) -> Response<Body> {
        match self.tracker.get_proposal(id).await {
            Ok(proposal) => {
                let now = self.tracker.clock().now();
                let response = ProposalResponse::from_proposal(&proposal, now);
                json_response(StatusCode::OK, &ApiResponse::success(response))
            }
            Err(e) => error_response(&e),
        }
    }

    async fn handle_delete_proposal(&self, id: &str, req: Request<Body>) -> Response<Body> {
        let body = match parse_body::<DeleteProposalRequest>(req).await {
            Ok(b) => b,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
        };

        match self.tracker.delete_proposal(id, body.requester.trim()).await {
            Ok(()) => {
                info!("Deleted proposal {} on behalf of {}", id, body.requester);
                json_response(
                    StatusCode::OK,
                    &ApiResponse::<()>::success_message("Proposal deleted"),
                )
            }
            Err(e) => error_response(&e),
        }
    }

    async fn handle_check_status(&self, id: &str) -> Response<Body> {
        match self.tracker.evaluate(id).await {
            Ok(evaluation) => {
                if let Some(status) = evaluation.transitioned {
                    info!("Proposal {} closed as {}", id, status);
                }
                let now = self.tracker.clock().now();
                let response = CheckStatusResponse {
                    proposal: ProposalResponse::from_proposal(&evaluation.proposal, now),
                    transitioned: evaluation.transitioned,
                };
                json_response(StatusCode::OK, &ApiResponse::success(response))
            }
            Err(e) => error_response(&e),
        }
    }

    async fn handle_stats(&self) -> Response<Body> {
        match self.tracker.stats().await {
            Ok(stats) => json_response(StatusCode::OK, &ApiResponse::success(stats)),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_sweep(&self) -> Response<Body> {
        let now = self.tracker.clock().now();
        match self.tracker.sweep(now).await {
            Ok(transitioned) => {
                if !transitioned.is_empty() {
                    info!("Manual sweep settled {} proposal(s)", transitioned.len());
                }
                let response = SweepResponse {
                    count: transitioned.len(),
                    transitioned,
                };
                json_response(StatusCode::OK, &ApiResponse::success(response))
            }
            Err(e) => error_response(&e),
        }
    }

    // =========================================================================
    // VOTE HANDLERS
    // =========================================================================

    async fn handle_submit_vote(&self, id: &str, req: Request<Body>) -> Response<Body> {
        let body = match parse_body::<VoteRequest>(req).await {
            Ok(b) => b,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
        };

        if !self.limiter.check(body.voter.trim()).await {
            warn!("Rate limited vote from {} on {}", body.voter, id);
            return rate_limited();
        }

        match self.tracker.submit_vote_str(id, &body.voter, &body.choice).await {
            Ok(receipt) => {
                debug!(
                    "Vote {} from {} on {} ({}/{})",
                    receipt.vote.choice,
                    receipt.vote.voter_id,
                    id,
                    receipt.votes_for,
                    receipt.votes_against
                );
                let response = VoteResponse {
                    proposal_id: receipt.proposal_id,
                    vote: receipt.vote,
                    votes_for: receipt.votes_for,
                    votes_against: receipt.votes_against,
                };
                json_response(StatusCode::CREATED, &ApiResponse::success(response))
            }
            Err(e) => error_response(&e),
        }
    }

    async fn handle_get_vote(&self, id: &str, voter: &str) -> Response<Body> {
        match self.tracker.get_vote(id, voter).await {
            Ok(Some(vote)) => json_response(StatusCode::OK, &ApiResponse::success(vote)),
            Ok(None) => json_error(StatusCode::NOT_FOUND, "Vote not found"),
            Err(e) => error_response(&e),
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn not_found(&self) -> Response<Body> {
        json_error(StatusCode::NOT_FOUND, "Endpoint not found")
    }

    /// Run the API server until `shutdown` turns true
    pub async fn run(
        self: Arc<Self>,
        addr: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        run_governance_api(addr, self, shutdown).await
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Status code for a tracker error
pub fn status_for(err: &GovernanceError) -> StatusCode {
    match err {
        GovernanceError::NotFound(_) => StatusCode::NOT_FOUND,
        GovernanceError::AlreadyVoted { .. }
        | GovernanceError::ProposalNotActive(_)
        | GovernanceError::ProposalStillActive(_) => StatusCode::CONFLICT,
        GovernanceError::InvalidChoice(_) | GovernanceError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        GovernanceError::Unauthorized(_) => StatusCode::FORBIDDEN,
        GovernanceError::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
        GovernanceError::Overflow(_)
        | GovernanceError::Storage(_)
        | GovernanceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &GovernanceError) -> Response<Body> {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Governance request failed: {}", err);
    } else {
        debug!("Governance request rejected: {}", err);
    }
    json_error(status, &err.to_string())
}

fn rate_limited() -> Response<Body> {
    json_error(
        StatusCode::TOO_MANY_REQUESTS,
        "Rate limit exceeded. Try again shortly.",
    )
}

/// Path segments after the API prefix, or `None` for foreign paths
fn route_segments(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix(API_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(rest.split('/').filter(|s| !s.is_empty()).collect())
}

/// Parse listing query parameters
fn parse_filter(query: Option<&str>) -> Result<ProposalFilter, String> {
    let mut filter = ProposalFilter::default();

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "status" => {
                let status = value.parse::<ProposalStatus>().map_err(|e| e.to_string())?;
                filter.status = Some(status);
            }
            "category" => {
                let category = value.parse::<ProposalCategory>().map_err(|e| e.to_string())?;
                filter.category = Some(category);
            }
            "author" => filter.author = Some(value.into_owned()),
            "limit" => {
                let limit = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid limit: {}", value))?;
                filter.limit = Some(limit);
            }
            _ => {}
        }
    }

    Ok(filter)
}

/// Parse JSON body from request
async fn parse_body<T: for<'de> Deserialize<'de>>(req: Request<Body>) -> Result<T, String> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| format!("Failed to read body: {}", e))?;

    serde_json::from_slice(&bytes).map_err(|e| format!("Invalid JSON: {}", e))
}

/// Create JSON response
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Body::from(json));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Create JSON error response
fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &ApiResponse::<()>::error(message))
}

fn cors_preflight() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

// =============================================================================
// SERVER
// =============================================================================

/// Run the governance API server
pub async fn run_governance_api(
    addr: SocketAddr,
    api: Arc<GovernanceApi>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let api = Arc::clone(&api);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let api = Arc::clone(&api);
                async move { api.handle_request(req).await }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!("Governance API listening on http://{}", addr);

    server
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("Governance API shutting down");
        })
        .await?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
