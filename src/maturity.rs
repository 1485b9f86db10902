use crate::bondmath;
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::portfolio::DebtPortfolio;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// BTC price above which a convertible with a known conversion price is
/// assumed to convert to equity instead of demanding cash at maturity.
/// Simplified proxy -- the equity is assumed to track the BTC price.
/// Callers needing real conversion economics must supply an equity-price
/// projection instead.
pub const ITM_REFERENCE_PRICE: f64 = 50_000.0;

const DAYS_PER_YEAR: f64 = 365.25;

/// Par scale the source table quotes bond prices against.
const PAR_VALUE: f64 = 100.0;

/// One bond projected onto the maturity timeline.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScheduleEntry {
    pub name: String,
    pub maturity_date: NaiveDate,
    pub put_date: Option<NaiveDate>,
    pub coupon_pct: Option<f64>,
    pub notional_musd: Option<f64>,
    pub conversion_price: Option<f64>,
    /// Negative when the date is already past.
    pub years_to_maturity: f64,
    pub years_to_put: Option<f64>,
    pub maturity_year: i32,
    pub approx_ytm_pct: Option<f64>,
    pub macaulay_duration: Option<f64>,
}

/// Debt maturing in one calendar year.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WallYear {
    pub year: i32,
    pub total_notional_musd: f64,
    pub bond_count: usize,
    /// Rounded to one decimal for display; computed at full precision.
    pub percent_of_total: f64,
}

/// Debt that must be replaced within a forward-looking window.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RolloverSummary {
    pub years_ahead: f64,
    pub total_maturing_musd: f64,
    pub bond_count: usize,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinancingStatus {
    LikelyConverts,
    NeedsRefinancing,
}

impl std::fmt::Display for RefinancingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LikelyConverts => write!(f, "likely converts"),
            Self::NeedsRefinancing => write!(f, "needs refinancing"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RefinancingEntry {
    pub name: String,
    pub maturity_date: NaiveDate,
    pub notional_musd: Option<f64>,
    pub in_the_money: bool,
    pub status: RefinancingStatus,
    pub cash_requirement_musd: f64,
    pub years_to_maturity: f64,
}

/// Maturity schedule and refinancing risk for a portfolio snapshot.
///
/// The reference date is injected, never read from the wall clock, so every
/// derived number is deterministic and testable. Bonds without a maturity
/// date cannot be scheduled and are dropped with a warning at construction;
/// the rest are sorted ascending by maturity.
pub struct MaturityAnalyzer {
    entries: Vec<ScheduleEntry>,
    now: NaiveDate,
}

impl MaturityAnalyzer {
    pub fn new(portfolio: &DebtPortfolio, now: NaiveDate) -> Self {
        let mut entries: Vec<ScheduleEntry> = portfolio
            .bonds
            .iter()
            .filter_map(|bond| {
                let maturity = match bond.maturity_date {
                    Some(date) => date,
                    None => {
                        tracing::warn!(bond = %bond.name, "no maturity date, excluded from schedule");
                        return None;
                    }
                };
                let years_to_maturity = years_between(now, maturity);
                let (approx_ytm_pct, macaulay_duration) = match (bond.price, bond.coupon_pct) {
                    (Some(price), Some(coupon)) if years_to_maturity > 0.0 => (
                        Some(bondmath::approx_ytm(price, PAR_VALUE, coupon, years_to_maturity)),
                        Some(bondmath::macaulay_duration(
                            price,
                            PAR_VALUE,
                            coupon,
                            years_to_maturity,
                        )),
                    ),
                    _ => (None, None),
                };
                Some(ScheduleEntry {
                    name: bond.name.clone(),
                    maturity_date: maturity,
                    put_date: bond.put_date,
                    coupon_pct: bond.coupon_pct,
                    notional_musd: bond.notional_musd,
                    conversion_price: bond.conversion_price,
                    years_to_maturity,
                    years_to_put: bond.put_date.map(|date| years_between(now, date)),
                    maturity_year: maturity.year(),
                    approx_ytm_pct,
                    macaulay_duration,
                })
            })
            .collect();
        entries.sort_by_key(|entry| entry.maturity_date);
        Self { entries, now }
    }

    /// Ascending by maturity date.
    pub fn schedule(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    fn schedule_notional(&self) -> f64 {
        self.entries.iter().filter_map(|e| e.notional_musd).sum()
    }

    /// Maturity concentration by calendar year. Percentages are computed at
    /// full precision against the whole schedule, then rounded to one
    /// decimal for display.
    pub fn maturity_wall(&self) -> AnalyzerResult<Vec<WallYear>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let total = self.schedule_notional();
        if total == 0.0 {
            return Err(AnalyzerError::DivideByZero(
                "schedule notional sums to zero".into(),
            ));
        }

        let mut by_year: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
        for entry in &self.entries {
            let slot = by_year.entry(entry.maturity_year).or_insert((0.0, 0));
            slot.0 += entry.notional_musd.unwrap_or(0.0);
            slot.1 += 1;
        }

        Ok(by_year
            .into_iter()
            .map(|(year, (notional, count))| WallYear {
                year,
                total_notional_musd: notional,
                bond_count: count,
                percent_of_total: round1(notional / total * 100.0),
            })
            .collect())
    }

    /// Debt maturing within `now + years_ahead * 365.25 days`. Windows are
    /// nested, so the total is monotonic non-decreasing in `years_ahead`.
    pub fn rollover_requirement(&self, years_ahead: f64) -> AnalyzerResult<RolloverSummary> {
        if years_ahead < 0.0 || !years_ahead.is_finite() {
            return Err(AnalyzerError::InvalidParameter(format!(
                "years_ahead must be >= 0, got {years_ahead}"
            )));
        }
        if self.entries.is_empty() {
            return Err(AnalyzerError::EmptyPortfolio(
                "no scheduled maturities".into(),
            ));
        }
        let total = self.schedule_notional();
        if total == 0.0 {
            return Err(AnalyzerError::DivideByZero(
                "schedule notional sums to zero".into(),
            ));
        }

        let horizon_days = years_ahead * DAYS_PER_YEAR;
        let mut total_maturing_musd = 0.0;
        let mut bond_count = 0;
        for entry in &self.entries {
            let days_out = (entry.maturity_date - self.now).num_days() as f64;
            if days_out <= horizon_days {
                total_maturing_musd += entry.notional_musd.unwrap_or(0.0);
                bond_count += 1;
            }
        }

        Ok(RolloverSummary {
            years_ahead,
            total_maturing_musd,
            bond_count,
            percent_of_total: total_maturing_musd / total * 100.0,
        })
    }

    /// Classify each scheduled bond under a hypothetical future BTC price.
    ///
    /// A bond is in the money -- assumed to convert to equity, needing no
    /// cash -- iff it has a conversion price and the future price clears
    /// `ITM_REFERENCE_PRICE`; otherwise its full notional is a cash
    /// requirement.
    pub fn refinancing_risk(&self, future_btc_price: f64) -> Vec<RefinancingEntry> {
        self.entries
            .iter()
            .map(|entry| {
                let in_the_money =
                    entry.conversion_price.is_some() && future_btc_price > ITM_REFERENCE_PRICE;
                let (status, cash_requirement_musd) = if in_the_money {
                    (RefinancingStatus::LikelyConverts, 0.0)
                } else {
                    (
                        RefinancingStatus::NeedsRefinancing,
                        entry.notional_musd.unwrap_or(0.0),
                    )
                };
                RefinancingEntry {
                    name: entry.name.clone(),
                    maturity_date: entry.maturity_date,
                    notional_musd: entry.notional_musd,
                    in_the_money,
                    status,
                    cash_requirement_musd,
                    years_to_maturity: entry.years_to_maturity,
                }
            })
            .collect()
    }
}

fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / DAYS_PER_YEAR
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::BondRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bond(
        name: &str,
        maturity: Option<NaiveDate>,
        notional: Option<f64>,
        conversion: Option<f64>,
        put: Option<NaiveDate>,
    ) -> BondRecord {
        BondRecord {
            name: name.to_string(),
            maturity_date: maturity,
            notional_musd: notional,
            conversion_price: conversion,
            put_date: put,
            coupon_pct: Some(0.625),
            price: Some(100.0),
            ..BondRecord::default()
        }
    }

    fn portfolio() -> DebtPortfolio {
        // Intentionally out of maturity order
        DebtPortfolio::build(vec![
            bond("2030 Convert", Some(date(2030, 3, 15)), Some(800.0), Some(149.77), None),
            bond("2028 Convert", Some(date(2028, 9, 15)), Some(1010.0), Some(183.19), Some(date(2027, 9, 15))),
            bond("Perp Strife", None, Some(500.0), None, None),
            bond("2032 Convert", Some(date(2032, 6, 15)), Some(3000.0), None, None),
        ])
        .unwrap()
    }

    const NOW: (i32, u32, u32) = (2025, 1, 15);

    fn analyzer() -> MaturityAnalyzer {
        let (y, m, d) = NOW;
        MaturityAnalyzer::new(&portfolio(), date(y, m, d))
    }

    #[test]
    fn test_schedule_sorted_and_filtered() {
        let analyzer = analyzer();
        let names: Vec<&str> = analyzer.schedule().iter().map(|e| e.name.as_str()).collect();
        // Sorted by maturity; the bond with no maturity date is gone
        assert_eq!(names, ["2028 Convert", "2030 Convert", "2032 Convert"]);
    }

    #[test]
    fn test_years_to_maturity() {
        let analyzer = analyzer();
        let entry = &analyzer.schedule()[0];
        // 2025-01-15 -> 2028-09-15 is 1339 days
        assert!((entry.years_to_maturity - 1339.0 / 365.25).abs() < 1e-9);
        assert!(entry.years_to_put.is_some());
        assert_eq!(entry.maturity_year, 2028);
    }

    #[test]
    fn test_years_negative_when_past() {
        let (y, m, d) = NOW;
        let portfolio = DebtPortfolio::build(vec![bond(
            "Matured",
            Some(date(2024, 6, 15)),
            Some(100.0),
            Some(39.8),
            None,
        )])
        .unwrap();
        let analyzer = MaturityAnalyzer::new(&portfolio, date(y, m, d));
        assert!(analyzer.schedule()[0].years_to_maturity < 0.0);
    }

    #[test]
    fn test_maturity_wall_groups_by_year() {
        let wall = analyzer().maturity_wall().unwrap();
        let years: Vec<i32> = wall.iter().map(|w| w.year).collect();
        assert_eq!(years, [2028, 2030, 2032]);
        assert_eq!(wall[0].bond_count, 1);
        assert!((wall[0].total_notional_musd - 1010.0).abs() < 1e-9);
    }

    #[test]
    fn test_wall_percentages_sum_to_100() {
        let wall = analyzer().maturity_wall().unwrap();
        let sum: f64 = wall.iter().map(|w| w.percent_of_total).sum();
        assert!(
            (sum - 100.0).abs() <= 0.1 * wall.len() as f64,
            "wall percentages sum to {sum}"
        );
    }

    #[test]
    fn test_rollover_monotonic_in_window() {
        let analyzer = analyzer();
        let mut prev = 0.0;
        for years in [0.0, 1.0, 3.0, 5.0, 6.0, 8.0, 20.0] {
            let rollover = analyzer.rollover_requirement(years).unwrap();
            assert!(
                rollover.total_maturing_musd >= prev,
                "rollover shrank at window {years}"
            );
            prev = rollover.total_maturing_musd;
        }
    }

    #[test]
    fn test_rollover_windows() {
        let analyzer = analyzer();
        let short = analyzer.rollover_requirement(4.0).unwrap();
        assert_eq!(short.bond_count, 1);
        assert!((short.total_maturing_musd - 1010.0).abs() < 1e-9);

        let long = analyzer.rollover_requirement(8.0).unwrap();
        assert_eq!(long.bond_count, 3);
        assert!((long.total_maturing_musd - 4810.0).abs() < 1e-9);
        assert!((long.percent_of_total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rollover_rejects_negative_window() {
        assert!(matches!(
            analyzer().rollover_requirement(-1.0),
            Err(AnalyzerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_refinancing_itm_needs_conversion_price_and_high_price() {
        let analyzer = analyzer();
        let risk = analyzer.refinancing_risk(100_000.0);

        let c2028 = risk.iter().find(|r| r.name == "2028 Convert").unwrap();
        assert!(c2028.in_the_money);
        assert_eq!(c2028.status, RefinancingStatus::LikelyConverts);
        assert_eq!(c2028.cash_requirement_musd, 0.0);

        // No conversion price: always needs cash, whatever the price does
        let c2032 = risk.iter().find(|r| r.name == "2032 Convert").unwrap();
        assert!(!c2032.in_the_money);
        assert_eq!(c2032.status, RefinancingStatus::NeedsRefinancing);
        assert!((c2032.cash_requirement_musd - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn test_refinancing_low_price_flips_everything_to_cash() {
        let analyzer = analyzer();
        let risk = analyzer.refinancing_risk(40_000.0);
        assert!(risk.iter().all(|r| !r.in_the_money));
        let cash: f64 = risk.iter().map(|r| r.cash_requirement_musd).sum();
        assert!((cash - 4810.0).abs() < 1e-9);
    }

    #[test]
    fn test_refinancing_threshold_is_exclusive() {
        let analyzer = analyzer();
        let at_threshold = analyzer.refinancing_risk(ITM_REFERENCE_PRICE);
        assert!(
            at_threshold.iter().all(|r| !r.in_the_money),
            "price must exceed the reference threshold, not equal it"
        );
    }

    #[test]
    fn test_empty_schedule_errors() {
        let (y, m, d) = NOW;
        let portfolio = DebtPortfolio {
            bonds: Vec::new(),
            metrics: analyzer_metrics_stub(),
        };
        let analyzer = MaturityAnalyzer::new(&portfolio, date(y, m, d));
        assert!(analyzer.maturity_wall().unwrap().is_empty());
        assert!(matches!(
            analyzer.rollover_requirement(5.0),
            Err(AnalyzerError::EmptyPortfolio(_))
        ));
    }

    fn analyzer_metrics_stub() -> crate::portfolio::DebtMetrics {
        crate::portfolio::DebtMetrics {
            total_notional_musd: 0.0,
            total_market_value_musd: 0.0,
            weighted_avg_coupon_pct: 0.0,
            weighted_avg_conversion_price: 0.0,
            num_bonds: 0,
            nearest_maturity: date(2028, 1, 1),
            furthest_maturity: date(2028, 1, 1),
        }
    }
}
