//! Synthetic price series for offline development and tests.
//!
//! Returns follow a GARCH(1,1) process so fits on this data converge to
//! something meaningful. The RNG is seeded from BLAKE3 of the label, so the
//! same label always yields the same series. Dates skip weekends.

use super::provider::PriceRow;
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Parameters of the generating process (daily return units).
#[derive(Debug, Clone, Copy)]
pub struct SyntheticParams {
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    pub start_price: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            omega: 2e-6,
            alpha: 0.08,
            beta: 0.90,
            start_price: 100.0,
        }
    }
}

/// Generate `rows` weekday price rows starting at `start`.
pub fn garch_price_series(
    label: &str,
    rows: usize,
    start: NaiveDate,
    params: SyntheticParams,
) -> Vec<PriceRow> {
    let seed: [u8; 32] = *blake3::hash(label.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let persistence = params.alpha + params.beta;
    let mut sigma2 = if persistence < 1.0 {
        params.omega / (1.0 - persistence)
    } else {
        params.omega * 100.0
    };
    let mut shock2 = sigma2;

    let mut out = Vec::with_capacity(rows);
    let mut price = params.start_price;
    let mut date = start;

    while out.len() < rows {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += chrono::Duration::days(1);
            continue;
        }

        sigma2 = params.omega + params.alpha * shock2 + params.beta * sigma2;
        let shock = sigma2.sqrt() * standard_normal(&mut rng);
        shock2 = shock * shock;

        let open = price;
        let close = (price * (1.0 + shock)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.005));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.005));

        out.push(PriceRow {
            timestamp: date,
            open,
            high,
            low,
            close,
            adjusted_close: close,
            volume: rng.gen_range(100_000..2_000_000u64),
            dividend_amount: 0.0,
            split_coefficient: 1.0,
        });

        price = close;
        date += chrono::Duration::days(1);
    }

    out
}

/// Box–Muller draw from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    #[test]
    fn deterministic_per_label() {
        let a = garch_price_series("TEST", 50, start(), SyntheticParams::default());
        let b = garch_price_series("TEST", 50, start(), SyntheticParams::default());
        let c = garch_price_series("OTHER", 50, start(), SyntheticParams::default());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn exact_row_count_weekdays_ascending() {
        let rows = garch_price_series("TEST", 1000, start(), SyntheticParams::default());
        assert_eq!(rows.len(), 1000);
        assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(rows
            .iter()
            .all(|r| !matches!(r.timestamp.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn prices_positive_with_nonzero_returns() {
        let rows = garch_price_series("TEST", 500, start(), SyntheticParams::default());
        assert!(rows.iter().all(|r| r.close > 0.0 && r.low <= r.high));
        assert!(rows.windows(2).any(|w| w[0].close != w[1].close));
    }
}
