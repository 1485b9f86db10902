use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::risk::liquidation::{classify_ltv, LiquidationState, RiskBand};
use smallvec::SmallVec;

/// Price multipliers swept by the default stress test, current price first.
pub const DEFAULT_STRESS_MULTIPLIERS: [f64; 7] = [1.00, 0.80, 0.70, 0.60, 0.50, 0.40, 0.30];

/// Default sensitivity-grid shape: price steps x debt-multiplier steps.
pub const GRID_PRICE_STEPS: usize = 20;
pub const GRID_DEBT_STEPS: usize = 15;

/// One stress point. Produced transiently, never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScenarioResult {
    pub label: String,
    pub btc_price: f64,
    pub btc_value: f64,
    pub ltv: f64,
    pub collateral_coverage: f64,
    pub band: RiskBand,
}

/// One sensitivity-grid cell.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct GridCell {
    pub btc_price: f64,
    pub debt_multiplier: f64,
    pub ltv_pct: f64,
}

/// Sweep the current price through `multipliers`, one scenario per entry,
/// in input order. The 1.00 multiplier reproduces the current-state metrics
/// exactly.
pub fn stress_test(
    state: &LiquidationState,
    multipliers: &[f64],
) -> AnalyzerResult<SmallVec<[ScenarioResult; 8]>> {
    let mut results = SmallVec::new();
    for &multiplier in multipliers {
        let price = state.btc_price() * multiplier;
        let ltv = state.ltv_ratio_at(price)?;
        results.push(ScenarioResult {
            label: scenario_label(multiplier),
            btc_price: price,
            btc_value: state.btc_value_at(price),
            ltv,
            collateral_coverage: state.collateral_coverage_at(price)?,
            band: classify_ltv(ltv),
        });
    }
    Ok(results)
}

fn scenario_label(multiplier: f64) -> String {
    if (multiplier - 1.0).abs() < 1e-9 {
        return "Current".to_string();
    }
    format!("{:+.0}%", (multiplier - 1.0) * 100.0)
}

/// LTV across a BTC-price x debt-level matrix, row-major by debt multiplier.
///
/// Every cell gets its own independently constructed `LiquidationState`.
/// No shared value is mutated between cells, so evaluation order cannot
/// affect results and cells may be computed concurrently.
pub fn ltv_grid(
    state: &LiquidationState,
    price_range: (f64, f64),
    debt_mult_range: (f64, f64),
    n_prices: usize,
    n_mults: usize,
) -> AnalyzerResult<Vec<GridCell>> {
    if n_prices < 2 || n_mults < 2 {
        return Err(AnalyzerError::InvalidParameter(
            "grid needs at least 2 steps per axis".into(),
        ));
    }
    if !(price_range.0 > 0.0 && price_range.1 > price_range.0) {
        return Err(AnalyzerError::InvalidParameter(format!(
            "bad price range: {price_range:?}"
        )));
    }
    if !(debt_mult_range.0 > 0.0 && debt_mult_range.1 > debt_mult_range.0) {
        return Err(AnalyzerError::InvalidParameter(format!(
            "bad debt multiplier range: {debt_mult_range:?}"
        )));
    }

    let mut cells = Vec::with_capacity(n_prices * n_mults);
    for i in 0..n_mults {
        let multiplier = lerp(debt_mult_range, i, n_mults);
        let debt_musd = state.total_debt() / 1_000_000.0 * multiplier;
        for j in 0..n_prices {
            let price = lerp(price_range, j, n_prices);
            let cell_state = LiquidationState::new(
                state.btc_holdings(),
                price,
                debt_musd,
                state.annual_interest() / 1_000_000.0,
            )?;
            cells.push(GridCell {
                btc_price: price,
                debt_multiplier: multiplier,
                ltv_pct: cell_state.ltv_ratio()? * 100.0,
            });
        }
    }
    Ok(cells)
}

#[inline]
fn lerp(range: (f64, f64), step: usize, steps: usize) -> f64 {
    range.0 + (range.1 - range.0) * step as f64 / (steps - 1) as f64
}
