mod bondmath;
mod config;
mod errors;
mod maturity;
mod parse;
mod portfolio;
mod risk;
mod server;
mod state;

use crate::bondmath::format_usd;
use crate::state::{AnalysisSnapshot, AppState};
use portable_atomic::Ordering;

#[tokio::main]
async fn main() {
    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    tracing::info!("leverwatch starting");

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    // Initial analysis -- without it there is nothing to serve
    let as_of = chrono::Utc::now().date_naive();
    let initial = match AnalysisSnapshot::build(&cfg, as_of) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("initial analysis failed: {e}");
            std::process::exit(1);
        }
    };

    log_key_findings(&initial);

    let app_state = AppState::new(cfg.clone(), initial);

    // ── Spawn tasks ──

    // Snapshot refresher: re-reads the source document on an interval.
    // On failure the last good snapshot stays published.
    let refresh_state = app_state.clone();
    let refresh_cfg = cfg.clone();
    tokio::spawn(async move {
        let period = tokio::time::Duration::from_secs(refresh_cfg.reload_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // initial snapshot is already built

        loop {
            interval.tick().await;
            let as_of = chrono::Utc::now().date_naive();
            match AnalysisSnapshot::build(&refresh_cfg, as_of) {
                Ok(snapshot) => {
                    refresh_state.publish(snapshot);
                    tracing::info!("snapshot refreshed");
                }
                Err(e) => {
                    refresh_state
                        .counters
                        .refresh_failures
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "refresh failed, keeping last good snapshot");
                }
            }
        }
    });

    // ── Axum HTTP server ──

    let app = axum::Router::new()
        .route("/api/portfolio", axum::routing::get(server::routes::get_portfolio))
        .route("/api/metrics", axum::routing::get(server::routes::get_metrics))
        .route("/api/risk", axum::routing::get(server::routes::get_risk))
        .route("/api/stress", axum::routing::get(server::routes::get_stress))
        .route("/api/grid", axum::routing::get(server::routes::get_grid))
        .route("/api/coverage", axum::routing::get(server::routes::get_coverage))
        .route("/api/schedule", axum::routing::get(server::routes::get_schedule))
        .route("/api/wall", axum::routing::get(server::routes::get_wall))
        .route("/api/rollover", axum::routing::get(server::routes::get_rollover))
        .route("/api/refinancing", axum::routing::get(server::routes::get_refinancing))
        .route("/api/counters", axum::routing::get(server::routes::get_counters))
        .fallback_service(
            tower_http::services::ServeDir::new("dashboard/dist")
                .fallback(tower_http::services::ServeFile::new("dashboard/dist/index.html")),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(app_state);

    let addr = format!("0.0.0.0:{}", cfg.server_port);
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}

/// Startup report of the headline numbers, mirroring what the dashboard
/// front page shows.
fn log_key_findings(snapshot: &AnalysisSnapshot) {
    let metrics = &snapshot.portfolio.metrics;
    let leverage = &snapshot.leverage;
    let margin = &snapshot.margin_of_safety;

    tracing::info!(
        bonds = metrics.num_bonds,
        total_debt = %format_usd(leverage.total_debt_musd * 1_000_000.0, 1),
        weighted_coupon_pct = metrics.weighted_avg_coupon_pct,
        nearest_maturity = %metrics.nearest_maturity,
        furthest_maturity = %metrics.furthest_maturity,
        "debt portfolio parsed"
    );
    tracing::info!(
        btc_value = %format_usd(leverage.btc_value, 1),
        ltv_pct = leverage.ltv * 100.0,
        coverage = leverage.collateral_coverage,
        band = %leverage.band,
        "current leverage"
    );
    tracing::info!(
        liquidation_price = %format_usd(margin.liquidation_price, 1),
        buffer_pct = margin.price_drop_pct,
        target_ltv = margin.target_ltv,
        "margin of safety"
    );
    tracing::info!(
        maturing_musd = snapshot.rollover.total_maturing_musd,
        bonds = snapshot.rollover.bond_count,
        window_years = snapshot.rollover.years_ahead,
        "rollover requirement"
    );
}
