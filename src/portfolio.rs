use crate::errors::{AnalyzerError, AnalyzerResult};
use chrono::NaiveDate;

/// One convertible-debt instrument, as parsed from a single table row.
/// Immutable after parsing. Absent source fields stay absent -- they are
/// never coerced to zero.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BondRecord {
    pub name: String,
    pub issue_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub put_date: Option<NaiveDate>,
    pub earliest_call_date: Option<NaiveDate>,
    /// Par-scaled price (100 = par).
    pub price: Option<f64>,
    /// Coupon in percentage points ("4.21" means 4.21%).
    pub coupon_pct: Option<f64>,
    /// Face amount in USD millions.
    pub notional_musd: Option<f64>,
    pub market_value_musd: Option<f64>,
    pub btc_par: Option<f64>,
    pub reference_price: Option<f64>,
    pub conversion_price: Option<f64>,
}

/// Portfolio-level totals and weighted averages.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DebtMetrics {
    pub total_notional_musd: f64,
    pub total_market_value_musd: f64,
    pub weighted_avg_coupon_pct: f64,
    pub weighted_avg_conversion_price: f64,
    pub num_bonds: usize,
    pub nearest_maturity: NaiveDate,
    pub furthest_maturity: NaiveDate,
}

/// Ordered bond records plus their derived aggregates. Rebuilt from scratch
/// on every parse; nothing here is incrementally mutated.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DebtPortfolio {
    pub bonds: Vec<BondRecord>,
    pub metrics: DebtMetrics,
}

impl DebtPortfolio {
    pub fn build(bonds: Vec<BondRecord>) -> AnalyzerResult<Self> {
        let metrics = aggregate(&bonds)?;
        Ok(Self { bonds, metrics })
    }
}

/// Compute portfolio metrics. Pure function of its input.
///
/// A record with an absent notional contributes zero to the totals but still
/// counts in `num_bonds`. Weighted averages exclude a record from both
/// numerator and denominator when either side of the product is absent, and
/// surface `DivideByZero` rather than a silent zero when nothing is eligible.
pub fn aggregate(bonds: &[BondRecord]) -> AnalyzerResult<DebtMetrics> {
    let nearest_maturity = bonds
        .iter()
        .filter_map(|b| b.maturity_date)
        .min()
        .ok_or_else(|| AnalyzerError::EmptyPortfolio("no maturity dates present".into()))?;
    let furthest_maturity = bonds
        .iter()
        .filter_map(|b| b.maturity_date)
        .max()
        .ok_or_else(|| AnalyzerError::EmptyPortfolio("no maturity dates present".into()))?;

    Ok(DebtMetrics {
        total_notional_musd: bonds.iter().filter_map(|b| b.notional_musd).sum(),
        total_market_value_musd: bonds.iter().filter_map(|b| b.market_value_musd).sum(),
        weighted_avg_coupon_pct: notional_weighted_avg(bonds, |b| b.coupon_pct, "coupon")?,
        weighted_avg_conversion_price: notional_weighted_avg(
            bonds,
            |b| b.conversion_price,
            "conversion price",
        )?,
        num_bonds: bonds.len(),
        nearest_maturity,
        furthest_maturity,
    })
}

fn notional_weighted_avg(
    bonds: &[BondRecord],
    field: impl Fn(&BondRecord) -> Option<f64>,
    what: &str,
) -> AnalyzerResult<f64> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for bond in bonds {
        if let (Some(value), Some(notional)) = (field(bond), bond.notional_musd) {
            numerator += value * notional;
            denominator += notional;
        }
    }
    if denominator == 0.0 {
        return Err(AnalyzerError::DivideByZero(format!(
            "no notional eligible for weighted {what}"
        )));
    }
    Ok(numerator / denominator)
}
