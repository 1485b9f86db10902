use crate::maturity::MaturityAnalyzer;
use crate::risk::stress::{self, GRID_DEBT_STEPS, GRID_PRICE_STEPS};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use portable_atomic::Ordering::Relaxed;
use std::sync::Arc;

#[derive(serde::Deserialize)]
pub struct RiskQuery {
    pub target_ltv: Option<f64>,
}

#[derive(serde::Deserialize)]
pub struct RolloverQuery {
    pub years: Option<f64>,
}

#[derive(serde::Deserialize)]
pub struct RefinancingQuery {
    pub price: Option<f64>,
}

#[derive(serde::Deserialize)]
pub struct GridQuery {
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub debt_min: Option<f64>,
    pub debt_max: Option<f64>,
}

#[derive(serde::Deserialize)]
pub struct CoverageQuery {
    pub operating_income_musd: Option<f64>,
}

/// GET /api/portfolio -- parsed bond records + aggregates
pub async fn get_portfolio(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    Json(serde_json::json!({
        "generated_at": snapshot.generated_at,
        "as_of": snapshot.as_of,
        "portfolio": snapshot.portfolio,
    }))
}

/// GET /api/metrics -- current leverage summary + margin of safety at the
/// configured target
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    Json(serde_json::json!({
        "leverage": snapshot.leverage,
        "margin_of_safety": snapshot.margin_of_safety,
    }))
}

/// GET /api/risk?target_ltv= -- margin of safety at a caller-chosen
/// threshold. Absent data serializes as null; a failed computation is an
/// explicit error body.
pub async fn get_risk(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RiskQuery>,
) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    let target_ltv = params.target_ltv.unwrap_or(state.config.target_ltv);
    match snapshot
        .liquidation_state()
        .and_then(|s| s.margin_of_safety(target_ltv))
    {
        Ok(margin) => Json(serde_json::json!({ "margin_of_safety": margin })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/stress -- the default stress-scenario table
pub async fn get_stress(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    Json(serde_json::json!({ "scenarios": snapshot.stress }))
}

/// GET /api/grid?price_min=&price_max=&debt_min=&debt_max= -- LTV
/// sensitivity matrix. Defaults span 0.2x..1.5x the current price and
/// 0.5x..2x the current debt.
pub async fn get_grid(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GridQuery>,
) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    let btc_price = snapshot.leverage.btc_price;
    let price_range = (
        params.price_min.unwrap_or(btc_price * 0.2),
        params.price_max.unwrap_or(btc_price * 1.5),
    );
    let debt_range = (
        params.debt_min.unwrap_or(0.5),
        params.debt_max.unwrap_or(2.0),
    );
    match snapshot.liquidation_state().and_then(|s| {
        stress::ltv_grid(&s, price_range, debt_range, GRID_PRICE_STEPS, GRID_DEBT_STEPS)
    }) {
        Ok(cells) => Json(serde_json::json!({ "cells": cells })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/coverage?operating_income_musd= -- interest coverage ratio.
/// Infinite coverage (no interest expense) serializes as null.
pub async fn get_coverage(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoverageQuery>,
) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    match snapshot.liquidation_state() {
        Ok(s) => {
            let coverage = s.interest_coverage(params.operating_income_musd.unwrap_or(0.0));
            Json(serde_json::json!({
                "interest_coverage": if coverage.is_finite() { Some(coverage) } else { None },
                "annual_interest_musd": snapshot.leverage.annual_interest_musd,
            }))
        }
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/schedule -- maturity schedule, ascending by maturity
pub async fn get_schedule(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    Json(serde_json::json!({
        "as_of": snapshot.as_of,
        "schedule": snapshot.schedule,
    }))
}

/// GET /api/wall -- maturity concentration by calendar year
pub async fn get_wall(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    Json(serde_json::json!({ "maturity_wall": snapshot.maturity_wall }))
}

/// GET /api/rollover?years= -- rollover requirement over a caller-chosen
/// window
pub async fn get_rollover(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RolloverQuery>,
) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    let years = params.years.unwrap_or(state.config.rollover_years);
    let analyzer = MaturityAnalyzer::new(&snapshot.portfolio, snapshot.as_of);
    match analyzer.rollover_requirement(years) {
        Ok(rollover) => Json(serde_json::json!({ "rollover": rollover })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

/// GET /api/refinancing?price= -- refinancing classification under a
/// caller-chosen future BTC price
pub async fn get_refinancing(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefinancingQuery>,
) -> Json<serde_json::Value> {
    state.counters.api_requests.fetch_add(1, Relaxed);
    let snapshot = state.snapshot();
    let price = params.price.unwrap_or(state.config.future_btc_price);
    let analyzer = MaturityAnalyzer::new(&snapshot.portfolio, snapshot.as_of);
    let entries = analyzer.refinancing_risk(price);
    let total_cash: f64 = entries.iter().map(|e| e.cash_requirement_musd).sum();
    Json(serde_json::json!({
        "future_btc_price": price,
        "total_cash_requirement_musd": total_cash,
        "refinancing": entries,
    }))
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "snapshots_built": state.counters.snapshots_built.load(Relaxed),
        "refresh_failures": state.counters.refresh_failures.load(Relaxed),
        "api_requests": state.counters.api_requests.load(Relaxed),
    }))
}
