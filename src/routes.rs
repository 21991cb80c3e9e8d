//! HTTP routes for the screener service.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::advisory::Advice;
use crate::data::{is_valid_symbol, market_for_symbol};
use crate::job::{JobKind, RefreshJobStatus};
use crate::screener::{Fundamentals, SignalSet, TradeLevels};
use crate::ScreenerState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub providers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshActionResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AutoRefreshRequest {
    pub enabled: bool,
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct AutoRefreshResponse {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default = "default_status_kind")]
    pub kind: JobKind,
}

fn default_status_kind() -> JobKind {
    JobKind::Manual
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub symbol: String,
}

/// Single-symbol analysis view: quote, signals, fundamentals, advisory
/// verdict and derived trade levels.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub symbol: String,
    pub display_name: String,
    pub market: String,
    pub last_price: f64,
    pub change_percent: f64,
    pub signals: SignalSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fundamentals: Option<Fundamentals>,
    pub advice: Advice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<TradeLevels>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<ScreenerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "ashare-screener".to_string(),
        providers: state
            .gateway
            .provider_names()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

/// Start a manual refresh cycle
pub async fn start_refresh(
    State(state): State<Arc<ScreenerState>>,
) -> Result<Json<RefreshActionResponse>, StatusCode> {
    match state.orchestrator.start_manual_refresh() {
        Ok(()) => Ok(Json(RefreshActionResponse {
            status: "started".to_string(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "manual refresh not started");
            Err(StatusCode::CONFLICT)
        }
    }
}

/// Request cancellation of the manual refresh cycle
pub async fn stop_refresh(
    State(state): State<Arc<ScreenerState>>,
) -> Json<RefreshActionResponse> {
    state.orchestrator.stop_manual_refresh();
    Json(RefreshActionResponse {
        status: "stopping".to_string(),
    })
}

/// Request cancellation of the in-flight auto cycle; the loop itself stays
/// enabled and starts the next iteration on schedule
pub async fn stop_auto_cycle(
    State(state): State<Arc<ScreenerState>>,
) -> Json<RefreshActionResponse> {
    state.orchestrator.stop_auto_cycle();
    Json(RefreshActionResponse {
        status: "stopping".to_string(),
    })
}

/// Enable/disable the auto-refresh loop
pub async fn set_auto_refresh(
    State(state): State<Arc<ScreenerState>>,
    Json(request): Json<AutoRefreshRequest>,
) -> Json<AutoRefreshResponse> {
    state
        .orchestrator
        .set_auto_refresh(request.enabled, request.interval_secs);
    Json(AutoRefreshResponse {
        enabled: state.orchestrator.auto_refresh_enabled(),
        interval_secs: state.orchestrator.auto_interval_secs(),
    })
}

/// Poll a job's status record
pub async fn job_status(
    State(state): State<Arc<ScreenerState>>,
    Query(query): Query<StatusQuery>,
) -> Json<RefreshJobStatus> {
    Json(state.orchestrator.get_job_status(query.kind).await)
}

/// On-demand single-symbol analysis
pub async fn analyze(
    State(state): State<Arc<ScreenerState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, StatusCode> {
    let symbol = request.symbol.trim();
    if !is_valid_symbol(symbol) {
        tracing::debug!(symbol, "rejecting invalid symbol");
        return Err(StatusCode::BAD_REQUEST);
    }

    let Some(result) = state.pipeline.screen_one_symbol(symbol).await else {
        tracing::debug!(symbol, "no data available for symbol");
        return Err(StatusCode::NOT_FOUND);
    };

    let advice = state.advisory.advise(&result).await;
    let levels = TradeLevels::from_price(result.last_price);
    // validated above, every valid symbol maps to a market
    let market = market_for_symbol(symbol)
        .map(|m| m.code().to_string())
        .unwrap_or_default();

    Ok(Json(AnalyzeResponse {
        symbol: result.symbol,
        display_name: result.display_name,
        market,
        last_price: result.last_price,
        change_percent: result.change_percent,
        signals: result.signals,
        fundamentals: result.fundamentals,
        advice,
        levels,
    }))
}

// ============================================================================
// Tests
// ============================================================================
