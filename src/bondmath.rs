/// Bond arithmetic shared by the maturity analyzer and the startup report.
/// Schedule-level approximations, not a full pricing stack.

/// Approximate yield to maturity in percentage points:
/// (C + (F - P)/n) / ((F + P)/2).
pub fn approx_ytm(price: f64, face_value: f64, coupon_pct: f64, years_to_maturity: f64) -> f64 {
    if years_to_maturity <= 0.0 || price <= 0.0 {
        return 0.0;
    }
    let annual_coupon = face_value * (coupon_pct / 100.0);
    let ytm = (annual_coupon + (face_value - price) / years_to_maturity)
        / ((face_value + price) / 2.0);
    ytm * 100.0
}

/// Simplified Macaulay duration in years: whole-period PV weighting at the
/// approximate yield. Equals years-to-maturity when the yield is zero.
pub fn macaulay_duration(
    price: f64,
    face_value: f64,
    coupon_pct: f64,
    years_to_maturity: f64,
) -> f64 {
    if years_to_maturity <= 0.0 || price <= 0.0 {
        return 0.0;
    }
    let annual_coupon = face_value * (coupon_pct / 100.0);
    let ytm = approx_ytm(price, face_value, coupon_pct, years_to_maturity) / 100.0;
    if ytm == 0.0 {
        return years_to_maturity;
    }

    let mut pv_coupons = 0.0;
    for period in 1..=(years_to_maturity as i64) {
        let t = period as f64;
        pv_coupons += (annual_coupon * t) / (1.0 + ytm).powf(t);
    }
    let pv_face = (face_value * years_to_maturity) / (1.0 + ytm).powf(years_to_maturity);

    (pv_coupons + pv_face) / price
}

/// Compact $B/$M/$K currency formatting for log output.
pub fn format_usd(amount: f64, decimals: usize) -> String {
    if amount >= 1_000_000_000.0 {
        format!("${:.*}B", decimals, amount / 1_000_000_000.0)
    } else if amount >= 1_000_000.0 {
        format!("${:.*}M", decimals, amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("${:.*}K", decimals, amount / 1_000.0)
    } else {
        format!("${:.*}", decimals, amount)
    }
}
