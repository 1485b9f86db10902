use crate::config::AppConfig;
use crate::errors::AnalyzerResult;
use crate::maturity::{MaturityAnalyzer, RefinancingEntry, RolloverSummary, ScheduleEntry, WallYear};
use crate::parse::table;
use crate::portfolio::DebtPortfolio;
use crate::risk::liquidation::{classify_ltv, LiquidationState, MarginOfSafety, RiskBand};
use crate::risk::stress::{self, ScenarioResult, DEFAULT_STRESS_MULTIPLIERS};
use chrono::{DateTime, NaiveDate, Utc};
use portable_atomic::{AtomicU64, Ordering};
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::watch;

// ── Current leverage metrics ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct LeverageSummary {
    pub btc_holdings: f64,
    pub btc_price: f64,
    pub total_debt_musd: f64,
    pub annual_interest_musd: f64,
    pub btc_value: f64,
    pub ltv: f64,
    pub collateral_coverage: f64,
    pub band: RiskBand,
}

// ── Analysis snapshot (immutable output bundle) ──

/// Everything the presentation layer reads, produced in one pass and
/// replaced whole on refresh. Handlers never see a half-built snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisSnapshot {
    pub generated_at: DateTime<Utc>,
    /// Reference date all maturity arithmetic was computed against.
    pub as_of: NaiveDate,
    pub portfolio: DebtPortfolio,
    pub leverage: LeverageSummary,
    pub margin_of_safety: MarginOfSafety,
    pub stress: SmallVec<[ScenarioResult; 8]>,
    pub schedule: Vec<ScheduleEntry>,
    pub maturity_wall: Vec<WallYear>,
    pub rollover: RolloverSummary,
    pub refinancing: Vec<RefinancingEntry>,
}

impl AnalysisSnapshot {
    /// One-shot read of the source document, then the pure pipeline.
    pub fn build(config: &AppConfig, as_of: NaiveDate) -> AnalyzerResult<Self> {
        let html = std::fs::read_to_string(&config.debt_data_path)?;
        Self::from_html(&html, config, as_of)
    }

    /// parse -> aggregate -> risk/maturity computations. Deterministic for a
    /// given document, config, and reference date.
    pub fn from_html(html: &str, config: &AppConfig, as_of: NaiveDate) -> AnalyzerResult<Self> {
        let bonds = table::parse_debt_table(html)?;
        let portfolio = DebtPortfolio::build(bonds)?;

        let total_debt_musd = portfolio.metrics.total_notional_musd;
        let annual_interest_musd =
            total_debt_musd * portfolio.metrics.weighted_avg_coupon_pct / 100.0;
        let state = LiquidationState::new(
            config.btc_holdings,
            config.btc_price,
            total_debt_musd,
            annual_interest_musd,
        )?;

        let ltv = state.ltv_ratio()?;
        let leverage = LeverageSummary {
            btc_holdings: config.btc_holdings,
            btc_price: config.btc_price,
            total_debt_musd,
            annual_interest_musd,
            btc_value: state.btc_value(),
            ltv,
            collateral_coverage: state.collateral_coverage()?,
            band: classify_ltv(ltv),
        };

        let analyzer = MaturityAnalyzer::new(&portfolio, as_of);

        Ok(Self {
            generated_at: Utc::now(),
            as_of,
            portfolio,
            leverage,
            margin_of_safety: state.margin_of_safety(config.target_ltv)?,
            stress: stress::stress_test(&state, &DEFAULT_STRESS_MULTIPLIERS)?,
            schedule: analyzer.schedule().to_vec(),
            maturity_wall: analyzer.maturity_wall()?,
            rollover: analyzer.rollover_requirement(config.rollover_years)?,
            refinancing: analyzer.refinancing_risk(config.future_btc_price),
        })
    }

    /// The liquidation state this snapshot was derived from, for handlers
    /// recomputing with caller-supplied parameters.
    pub fn liquidation_state(&self) -> AnalyzerResult<LiquidationState> {
        LiquidationState::new(
            self.leverage.btc_holdings,
            self.leverage.btc_price,
            self.leverage.total_debt_musd,
            self.leverage.annual_interest_musd,
        )
    }
}

// ── Performance counters (lock-free) ──

pub struct PerfCounters {
    pub snapshots_built: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub api_requests: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            snapshots_built: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
            api_requests: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,

    // Refresh task -> handlers: latest snapshot (watch = single producer,
    // multi consumer; replaced whole, never mutated in place)
    pub snapshot_tx: watch::Sender<Arc<AnalysisSnapshot>>,
    pub snapshot_rx: watch::Receiver<Arc<AnalysisSnapshot>>,

    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig, initial: AnalysisSnapshot) -> Arc<Self> {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(initial));
        Arc::new(Self {
            config,
            snapshot_tx,
            snapshot_rx,
            counters: PerfCounters::new(),
        })
    }

    #[inline]
    pub fn snapshot(&self) -> Arc<AnalysisSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    pub fn publish(&self, snapshot: AnalysisSnapshot) {
        self.counters.snapshots_built.fetch_add(1, Ordering::Relaxed);
        let _ = self.snapshot_tx.send(Arc::new(snapshot));
    }
}
