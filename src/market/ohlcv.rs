//! Summary statistics over daily OHLCV bars.
//!
//! Bars come from historical price tools and may have gaps; any field
//! except the date can be null.

use serde::{Deserialize, Serialize};

/// One trading day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub date: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Metrics over a series of bars. Returns and gaps are fractions, `pct_change` is a percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OhlcvMetrics {
    pub start_close: Option<f64>,
    pub end_close: Option<f64>,
    pub pct_change: Option<f64>,
    pub max_daily_return: Option<f64>,
    pub min_daily_return: Option<f64>,
    pub max_gap_up: Option<f64>,
    pub max_gap_down: Option<f64>,
    pub volatility: Option<f64>,
    pub count: usize,
}

fn keep_max(slot: &mut Option<f64>, value: f64) {
    if slot.map_or(true, |current| value > current) {
        *slot = Some(value);
    }
}

fn keep_min(slot: &mut Option<f64>, value: f64) {
    if slot.map_or(true, |current| value < current) {
        *slot = Some(value);
    }
}

/// Compute summary metrics for `bars` in date order
pub fn compute_ohlcv_metrics(bars: &[OhlcvBar]) -> OhlcvMetrics {
    if bars.is_empty() {
        return OhlcvMetrics::default();
    }

    let mut closes = bars.iter().filter_map(|b| b.close);
    let start_close = closes.next();
    let end_close = closes.last().or(start_close);

    let pct_change = match (start_close, end_close) {
        (Some(start), Some(end)) if start != 0.0 => Some((end / start - 1.0) * 100.0),
        _ => None,
    };

    let mut metrics = OhlcvMetrics {
        start_close,
        end_close,
        pct_change,
        count: bars.len(),
        ..OhlcvMetrics::default()
    };

    let mut returns = Vec::with_capacity(bars.len());
    let mut prev_close: Option<f64> = None;

    for bar in bars {
        if let Some(prev) = prev_close.filter(|p| *p != 0.0) {
            if let Some(close) = bar.close {
                let ret = close / prev - 1.0;
                returns.push(ret);
                keep_max(&mut metrics.max_daily_return, ret);
                keep_min(&mut metrics.min_daily_return, ret);
            }

            if let Some(open) = bar.open {
                let gap = open / prev - 1.0;
                if gap > 0.0 {
                    keep_max(&mut metrics.max_gap_up, gap);
                } else if gap < 0.0 {
                    keep_min(&mut metrics.max_gap_down, gap);
                }
            }
        }

        if bar.close.is_some() {
            prev_close = bar.close;
        }
    }

    if returns.len() > 1 {
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        metrics.volatility = Some(variance.sqrt());
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, open: Option<f64>, close: Option<f64>) -> OhlcvBar {
        OhlcvBar {
            date: date.to_string(),
            open,
            close,
            ..OhlcvBar::default()
        }
    }

    fn approx(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap_or(f64::NAN);
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_empty_input() {
        let metrics = compute_ohlcv_metrics(&[]);
        assert_eq!(metrics, OhlcvMetrics::default());
        assert_eq!(metrics.count, 0);
    }

    #[test]
    fn test_basic_series() {
        let bars = vec![
            bar("2024-01-01", Some(99.0), Some(100.0)),
            bar("2024-01-02", Some(105.0), Some(110.0)),
            bar("2024-01-03", Some(100.0), Some(99.0)),
        ];
        let m = compute_ohlcv_metrics(&bars);

        assert_eq!(m.count, 3);
        assert_eq!(m.start_close, Some(100.0));
        assert_eq!(m.end_close, Some(99.0));
        approx(m.pct_change, -1.0);
        approx(m.max_daily_return, 0.1);
        approx(m.min_daily_return, -0.1);
        approx(m.max_gap_up, 0.05);
        approx(m.max_gap_down, 100.0 / 110.0 - 1.0);

        // returns 0.1 and -0.1: mean 0, sample variance 0.02
        approx(m.volatility, 0.02f64.sqrt());
    }

    #[test]
    fn test_null_closes_are_skipped() {
        let bars = vec![
            bar("d1", None, None),
            bar("d2", None, Some(50.0)),
            bar("d3", Some(50.0), None),
            bar("d4", None, Some(55.0)),
        ];
        let m = compute_ohlcv_metrics(&bars);

        assert_eq!(m.count, 4);
        assert_eq!(m.start_close, Some(50.0));
        assert_eq!(m.end_close, Some(55.0));
        approx(m.max_daily_return, 0.1);
        assert_eq!(m.max_gap_up, None);
        assert_eq!(m.max_gap_down, None);
        // one return is not enough for a sample deviation
        assert_eq!(m.volatility, None);
    }

    #[test]
    fn test_zero_start_close() {
        let bars = vec![bar("d1", None, Some(0.0)), bar("d2", Some(1.0), Some(2.0))];
        let m = compute_ohlcv_metrics(&bars);

        assert_eq!(m.pct_change, None);
        assert_eq!(m.max_daily_return, None);
        assert_eq!(m.max_gap_up, None);
    }

    #[test]
    fn test_single_close() {
        let m = compute_ohlcv_metrics(&[bar("d1", None, Some(42.0))]);
        assert_eq!(m.start_close, Some(42.0));
        assert_eq!(m.end_close, Some(42.0));
        approx(m.pct_change, 0.0);
    }

    #[test]
    fn test_bars_deserialize_with_nulls() {
        let bars: Vec<OhlcvBar> = serde_json::from_str(
            r#"[{"date":"2024-01-01","open":1.0,"high":null,"low":0.5,"close":1.0,"volume":null},
                {"date":"2024-01-02","close":2.0}]"#,
        )
        .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].open, None);
        approx(compute_ohlcv_metrics(&bars).pct_change, 100.0);
    }
}
