//! A-share screener service.
//!
//! Screens equities across the Shanghai main, Shenzhen main, ChiNext and
//! STAR segments by combining live snapshots, derived technical indicators
//! and optional fundamental metrics, exposed through cancellable background
//! refresh jobs with pollable status.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                   ashare-screener (:4450)                      │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────────┐  │
//! │  │ Market Data  │  │  Indicator   │  │  Refresh Job        │  │
//! │  │ Gateway      │→ │  Engine      │→ │  Orchestrator       │  │
//! │  │ (failover)   │  │  + Screener  │  │  (manual / auto)    │  │
//! │  └──────────────┘  └──────────────┘  └─────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows gateway → indicators → screening rules → job status record;
//! the HTTP layer only ever reads the status record and triggers jobs.

#![warn(clippy::all)]

pub mod advisory;
pub mod config;
pub mod data;
pub mod indicators;
pub mod job;
pub mod routes;
pub mod screener;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::advisory::AdvisoryClient;
use crate::config::{Config, DataConfig};
use crate::data::{
    EastmoneyProvider, MarketDataGateway, QuoteProvider, TencentProvider, TushareProvider,
};
use crate::job::RefreshOrchestrator;
use crate::screener::{ScreeningPipeline, SyntheticFundamentals};

// ============================================================================
// Service State
// ============================================================================

/// Shared service state behind the HTTP handlers.
pub struct ScreenerState {
    pub config: Config,
    pub gateway: Arc<MarketDataGateway>,
    pub pipeline: Arc<ScreeningPipeline>,
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub advisory: Arc<AdvisoryClient>,
}

impl ScreenerState {
    pub fn new(config: Config) -> Self {
        let gateway = Arc::new(MarketDataGateway::new(build_provider_chain(&config.data)));
        let pipeline = Arc::new(ScreeningPipeline::new(
            Arc::clone(&gateway),
            Arc::new(SyntheticFundamentals::new()),
            config.screener.clone(),
        ));
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            Arc::clone(&pipeline),
            config.auto_refresh.interval_secs,
        ));
        let advisory = Arc::new(AdvisoryClient::from_config(&config.advisory));

        Self {
            config,
            gateway,
            pipeline,
            orchestrator,
            advisory,
        }
    }
}

/// Instantiate the provider chain in configured failover order.
pub fn build_provider_chain(config: &DataConfig) -> Vec<Arc<dyn QuoteProvider>> {
    let mut chain: Vec<Arc<dyn QuoteProvider>> = Vec::new();
    for name in &config.providers {
        match name.as_str() {
            "eastmoney" => chain.push(Arc::new(EastmoneyProvider::new())),
            "tushare" => match &config.tushare_token {
                Some(token) => chain.push(Arc::new(TushareProvider::new(token.clone()))),
                None => warn!("tushare configured without a token, skipping"),
            },
            "tencent" => chain.push(Arc::new(TencentProvider::new())),
            other => warn!(provider = other, "unknown provider in chain, skipping"),
        }
    }
    if chain.is_empty() {
        warn!("provider chain is empty, every fetch will come back empty");
    }
    chain
}

// ============================================================================
// Service
// ============================================================================

/// Main screener service.
pub struct ScreenerService {
    state: Arc<ScreenerState>,
}

impl ScreenerService {
    pub fn new(config: Config) -> Self {
        Self {
            state: Arc::new(ScreenerState::new(config)),
        }
    }

    pub fn state(&self) -> Arc<ScreenerState> {
        Arc::clone(&self.state)
    }

    /// Start the HTTP server (and the auto-refresh loop when configured).
    pub async fn start(self) -> Result<()> {
        let host = self.state.config.server.host.clone();
        let port = self.state.config.server.port;

        if self.state.config.auto_refresh.enabled {
            let interval = self.state.config.auto_refresh.interval_secs;
            self.state.orchestrator.set_auto_refresh(true, Some(interval));
        }

        let app = router(Arc::clone(&self.state));

        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
        info!(address = %addr, "starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Build the HTTP router over the service state.
pub fn router(state: Arc<ScreenerState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/refresh/start", post(routes::start_refresh))
        .route("/api/v1/refresh/stop", post(routes::stop_refresh))
        .route("/api/v1/refresh/auto", post(routes::set_auto_refresh))
        .route("/api/v1/refresh/auto/stop", post(routes::stop_auto_cycle))
        .route("/api/v1/refresh/status", get(routes::job_status))
        .route("/api/v1/analyze", post(routes::analyze))
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    } else {
        info!("shutdown signal received");
    }
}

// ============================================================================
// Tests
// ============================================================================
