use crate::errors::{AnalyzerError, AnalyzerResult};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debt_data_path: PathBuf,
    pub btc_holdings: f64,
    pub btc_price: f64,
    pub target_ltv: f64,
    pub future_btc_price: f64,
    pub rollover_years: f64,
    pub reload_secs: u64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> AnalyzerResult<Self> {
        dotenvy::dotenv().ok();

        let cfg = Self {
            debt_data_path: PathBuf::from(env_var_or("DEBT_DATA_PATH", "data/raw/DEBT/data.html")),
            btc_holdings: parse_var("BTC_HOLDINGS", "447470")?,
            btc_price: parse_var("BTC_PRICE", "100000")?,
            target_ltv: parse_var("TARGET_LTV", "0.85")?,
            future_btc_price: parse_var("FUTURE_BTC_PRICE", "100000")?,
            rollover_years: parse_var("ROLLOVER_YEARS", "5")?,
            reload_secs: parse_var("RELOAD_SECS", "300")?,
            server_port: parse_var("SERVER_PORT", "3001")?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> AnalyzerResult<()> {
        if self.btc_holdings <= 0.0 {
            return Err(AnalyzerError::Config("BTC_HOLDINGS must be > 0".into()));
        }
        if self.btc_price <= 0.0 {
            return Err(AnalyzerError::Config("BTC_PRICE must be > 0".into()));
        }
        if !(self.target_ltv > 0.0 && self.target_ltv <= 1.0) {
            return Err(AnalyzerError::Config("TARGET_LTV must be in (0, 1]".into()));
        }
        if self.future_btc_price <= 0.0 {
            return Err(AnalyzerError::Config("FUTURE_BTC_PRICE must be > 0".into()));
        }
        if self.rollover_years < 0.0 {
            return Err(AnalyzerError::Config("ROLLOVER_YEARS must be >= 0".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> AnalyzerResult<T>
where
    T::Err: std::fmt::Display,
{
    env_var_or(key, default)
        .parse::<T>()
        .map_err(|e| AnalyzerError::Config(format!("{key}: {e}")))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            debt_data_path: PathBuf::from("data/raw/DEBT/data.html"),
            btc_holdings: 447_470.0,
            btc_price: 100_000.0,
            target_ltv: 0.85,
            future_btc_price: 100_000.0,
            rollover_years: 5.0,
            reload_secs: 300,
            server_port: 3001,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_domain_values() {
        let mut cfg = base();
        cfg.btc_holdings = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.target_ltv = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.target_ltv = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.rollover_years = -1.0;
        assert!(cfg.validate().is_err());
    }
}
