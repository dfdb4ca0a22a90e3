//! Heap trend tracking and out-of-memory projection.
//!
//! The predictor keeps a bounded ring of heap usage samples, damps
//! single-sample noise with a simple moving average, fits a least-squares
//! line over the smoothed points, and projects when usage would reach 100%.
//! "No prediction" is the healthy outcome, not an error.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::config::TrendConfig;
use crate::models::HeapTrendPoint;

#[derive(Debug)]
pub struct TrendPredictor {
    window: VecDeque<HeapTrendPoint>,
    capacity: usize,
    smoothing: usize,
    horizon: Duration,
}

impl TrendPredictor {
    pub fn new(config: &TrendConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.history_window),
            capacity: config.history_window,
            smoothing: config.smoothing_window,
            horizon: Duration::from_secs(config.horizon_secs),
        }
    }

    /// Append a sample, evicting the oldest at capacity. Samples with a
    /// timestamp behind the newest retained point are dropped so the window
    /// stays ordered.
    pub fn record(&mut self, at: SystemTime, heap_used_pct: f64) {
        if let Some(last) = self.window.back() {
            if at < last.at {
                warn!("dropping out-of-order heap sample");
                return;
            }
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(HeapTrendPoint { at, heap_used_pct });
    }

    /// Project the time until heap usage reaches 100%, or `None` when usage
    /// is flat/decreasing, the window is too small, or the projection lands
    /// beyond the configured horizon.
    pub fn predict_oom(&self) -> Option<Duration> {
        if self.window.len() < 2 {
            return None;
        }

        let points = self.smoothed();
        let (slope, _intercept) = fit_line(&points)?;
        if slope <= 0.0 {
            return None;
        }

        let current = points.last().map(|(_, value)| *value)?;
        let eta_secs = (100.0 - current) / slope;
        if !eta_secs.is_finite() || eta_secs <= 0.0 {
            return None;
        }
        // Bound-check before constructing the Duration: absurdly long
        // projections are noise, and from_secs_f64 rejects huge values.
        if eta_secs > self.horizon.as_secs_f64() {
            return None;
        }
        Some(Duration::from_secs_f64(eta_secs))
    }

    /// The retained window, oldest first.
    pub fn points(&self) -> Vec<HeapTrendPoint> {
        self.window.iter().copied().collect()
    }

    /// Samples as (seconds since first point, value) with the moving
    /// average applied.
    fn smoothed(&self) -> Vec<(f64, f64)> {
        let first_at = match self.window.front() {
            Some(point) => point.at,
            None => return Vec::new(),
        };
        let raw: Vec<(f64, f64)> = self
            .window
            .iter()
            .map(|point| {
                let x = point
                    .at
                    .duration_since(first_at)
                    .unwrap_or(Duration::ZERO)
                    .as_secs_f64();
                (x, point.heap_used_pct)
            })
            .collect();

        if self.smoothing <= 1 {
            return raw;
        }

        raw.iter()
            .enumerate()
            .map(|(i, &(x, _))| {
                let start = i.saturating_sub(self.smoothing - 1);
                let span = raw.get(start..=i).unwrap_or(&[]);
                let sum: f64 = span.iter().map(|&(_, value)| value).sum();
                (x, sum / span.len().max(1) as f64)
            })
            .collect()
    }
}

/// Least-squares fit over (x, y) points; returns (slope, intercept) in
/// y-units per x-unit, or `None` for degenerate input.
fn fit_line(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let sum_x: f64 = points.iter().map(|&(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|&(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|&(x, y)| x * y).sum();
    let sum_xx: f64 = points.iter().map(|&(x, _)| x * x).sum();

    let denom = n_f * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        return None;
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;
    Some((slope, intercept))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictor(history_window: usize, smoothing_window: usize, horizon_secs: u64) -> TrendPredictor {
        TrendPredictor::new(&TrendConfig {
            history_window,
            smoothing_window,
            horizon_secs,
            oom_alert_threshold_secs: 3600,
        })
    }

    fn at(second: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(second)
    }

    #[test]
    fn linear_growth_projects_consistent_eta() {
        let mut trend = predictor(32, 1, 24 * 3600);
        // 50% -> 60% over 10 minutes, one sample per minute.
        for minute in 0..=10u64 {
            trend.record(at(minute * 60), 50.0 + minute as f64);
        }

        let eta = trend.predict_oom();
        assert!(eta.is_some());
        let eta = match eta {
            Some(eta) => eta.as_secs_f64(),
            None => return,
        };
        // Slope is 1%/minute, 40% of headroom left: 2400 seconds.
        assert!((eta - 2400.0).abs() < 1.0, "eta was {eta}");
    }

    #[test]
    fn flat_usage_returns_no_prediction() {
        let mut trend = predictor(32, 1, 24 * 3600);
        for minute in 0..10u64 {
            trend.record(at(minute * 60), 55.0);
        }
        assert_eq!(trend.predict_oom(), None);
    }

    #[test]
    fn decreasing_usage_returns_no_prediction() {
        let mut trend = predictor(32, 1, 24 * 3600);
        for minute in 0..10u64 {
            trend.record(at(minute * 60), 80.0 - minute as f64);
        }
        assert_eq!(trend.predict_oom(), None);
    }

    #[test]
    fn single_sample_returns_no_prediction() {
        let mut trend = predictor(32, 1, 24 * 3600);
        trend.record(at(0), 90.0);
        assert_eq!(trend.predict_oom(), None);
    }

    #[test]
    fn projections_beyond_horizon_are_discarded() {
        // 0.01%/minute growth from 50%: exhaustion in ~347 days.
        let mut trend = predictor(32, 1, 3600);
        for minute in 0..=10u64 {
            trend.record(at(minute * 60), 50.0 + minute as f64 * 0.01);
        }
        assert_eq!(trend.predict_oom(), None);
    }

    #[test]
    fn window_evicts_oldest_at_capacity() {
        let mut trend = predictor(5, 1, 24 * 3600);
        for second in 0..8u64 {
            trend.record(at(second), 50.0);
        }
        let points = trend.points();
        assert_eq!(points.len(), 5);
        assert_eq!(points.first().map(|p| p.at), Some(at(3)));
    }

    #[test]
    fn out_of_order_samples_are_dropped() {
        let mut trend = predictor(5, 1, 24 * 3600);
        trend.record(at(100), 50.0);
        trend.record(at(50), 60.0);
        assert_eq!(trend.points().len(), 1);
    }

    #[test]
    fn smoothing_damps_single_sample_spike() {
        let mut spiky = predictor(32, 3, 24 * 3600);
        let mut plain = predictor(32, 1, 24 * 3600);
        for minute in 0..=10u64 {
            let value = if minute == 5 { 90.0 } else { 50.0 + minute as f64 * 0.1 };
            spiky.record(at(minute * 60), value);
            plain.record(at(minute * 60), value);
        }
        // Both still predict nothing catastrophic; smoothing must not panic
        // and must keep the x-axis intact.
        let _ = spiky.predict_oom();
        let _ = plain.predict_oom();
        assert_eq!(spiky.points().len(), plain.points().len());
    }
}
