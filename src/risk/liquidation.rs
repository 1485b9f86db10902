use crate::errors::{AnalyzerError, AnalyzerResult};

/// LTV cut points, ascending, exclusive upper bounds. Evaluated in order;
/// first match wins. Anything at or above the last cut is Danger.
pub const RISK_BAND_CUTS: [(f64, RiskBand); 3] = [
    (0.50, RiskBand::Safe),
    (0.65, RiskBand::Caution),
    (0.85, RiskBand::Warning),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Safe,
    Caution,
    Warning,
    Danger,
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Caution => write!(f, "caution"),
            Self::Warning => write!(f, "warning"),
            Self::Danger => write!(f, "danger"),
        }
    }
}

#[inline]
pub fn classify_ltv(ltv: f64) -> RiskBand {
    for (cut, band) in RISK_BAND_CUTS {
        if ltv < cut {
            return band;
        }
    }
    RiskBand::Danger
}

/// Immutable leverage snapshot: BTC collateral against total debt.
///
/// Construct a fresh value whenever any input changes -- no method here
/// mutates the state, so concurrent and reentrant use is safe. Debt and
/// interest arrive in USD millions and are normalized to dollars once,
/// at construction.
#[derive(Debug, Clone, Copy)]
pub struct LiquidationState {
    btc_holdings: f64,
    btc_price: f64,
    /// Dollars, not millions.
    total_debt: f64,
    /// Dollars, not millions.
    annual_interest: f64,
}

/// Price buffer between the current price and the price at which LTV
/// reaches the target. The drop is negative when the target is already
/// breached -- a meaningful signal, not an error.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MarginOfSafety {
    pub current_price: f64,
    pub liquidation_price: f64,
    pub price_drop_usd: f64,
    pub price_drop_pct: f64,
    pub current_ltv: f64,
    pub target_ltv: f64,
}

impl LiquidationState {
    pub fn new(
        btc_holdings: f64,
        btc_price: f64,
        total_debt_musd: f64,
        annual_interest_musd: f64,
    ) -> AnalyzerResult<Self> {
        if !(btc_holdings > 0.0) || !btc_holdings.is_finite() {
            return Err(AnalyzerError::InvalidParameter(format!(
                "btc_holdings must be > 0, got {btc_holdings}"
            )));
        }
        if !(btc_price > 0.0) || !btc_price.is_finite() {
            return Err(AnalyzerError::InvalidParameter(format!(
                "btc_price must be > 0, got {btc_price}"
            )));
        }
        if total_debt_musd < 0.0 || annual_interest_musd < 0.0 {
            return Err(AnalyzerError::InvalidParameter(
                "debt and interest cannot be negative".into(),
            ));
        }
        Ok(Self {
            btc_holdings,
            btc_price,
            total_debt: total_debt_musd * 1_000_000.0,
            annual_interest: annual_interest_musd * 1_000_000.0,
        })
    }

    #[inline]
    pub fn btc_holdings(&self) -> f64 {
        self.btc_holdings
    }

    #[inline]
    pub fn btc_price(&self) -> f64 {
        self.btc_price
    }

    /// Total debt in dollars.
    #[inline]
    pub fn total_debt(&self) -> f64 {
        self.total_debt
    }

    /// Annual interest expense in dollars.
    #[inline]
    pub fn annual_interest(&self) -> f64 {
        self.annual_interest
    }

    #[inline]
    pub fn btc_value(&self) -> f64 {
        self.btc_value_at(self.btc_price)
    }

    #[inline]
    pub fn btc_value_at(&self, price: f64) -> f64 {
        self.btc_holdings * price
    }

    /// LTV = total debt / collateral value. Lower is safer.
    pub fn ltv_ratio(&self) -> AnalyzerResult<f64> {
        self.ltv_ratio_at(self.btc_price)
    }

    /// Construction validates holdings and price positive, so the zero
    /// branch is unreachable through `new` -- the contract still defines it
    /// for defensive callers.
    pub fn ltv_ratio_at(&self, price: f64) -> AnalyzerResult<f64> {
        let value = self.btc_value_at(price);
        if value == 0.0 {
            return Err(AnalyzerError::DivideByZero(
                "collateral value is zero".into(),
            ));
        }
        Ok(self.total_debt / value)
    }

    /// Coverage = collateral value / debt, the reciprocal of LTV.
    /// `coverage * ltv == 1` for any price.
    pub fn collateral_coverage(&self) -> AnalyzerResult<f64> {
        self.collateral_coverage_at(self.btc_price)
    }

    pub fn collateral_coverage_at(&self, price: f64) -> AnalyzerResult<f64> {
        Ok(1.0 / self.ltv_ratio_at(price)?)
    }

    /// Price at which LTV reaches `target_ltv`, from solving
    /// `target_ltv = debt / (holdings * price)` for price.
    pub fn liquidation_price(&self, target_ltv: f64) -> AnalyzerResult<f64> {
        if !(target_ltv > 0.0 && target_ltv <= 1.0) {
            return Err(AnalyzerError::InvalidParameter(format!(
                "target_ltv must be in (0, 1], got {target_ltv}"
            )));
        }
        Ok(self.total_debt / (self.btc_holdings * target_ltv))
    }

    pub fn margin_of_safety(&self, target_ltv: f64) -> AnalyzerResult<MarginOfSafety> {
        let liquidation_price = self.liquidation_price(target_ltv)?;
        let price_drop_usd = self.btc_price - liquidation_price;
        Ok(MarginOfSafety {
            current_price: self.btc_price,
            liquidation_price,
            price_drop_usd,
            price_drop_pct: price_drop_usd / self.btc_price * 100.0,
            current_ltv: self.ltv_ratio()?,
            target_ltv,
        })
    }

    /// Operating income / annual interest. Infinite when there is no
    /// interest expense -- zero debt-service burden is not an error.
    #[inline]
    pub fn interest_coverage(&self, operating_income_musd: f64) -> f64 {
        if self.annual_interest == 0.0 {
            return f64::INFINITY;
        }
        operating_income_musd * 1_000_000.0 / self.annual_interest
    }
}
