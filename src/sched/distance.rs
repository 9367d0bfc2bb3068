//! Dynamic render distance controller
//!
//! Widens the view when updates are comfortably fast and narrows it as
//! soon as any budget shows strain, holding the distance inside a
//! fixed band around the configured target.

use crate::core::config::Config;
use crate::sched::metrics::FrameMetrics;

/// Fraction of the target removed per over-budget frame.
const SHRINK_STEP: f32 = 0.03;
/// Fraction of the target added per comfortable frame.
const GROW_STEP: f32 = 0.015;
/// Lower bound as a divisor of the target.
const MIN_DIVISOR: f32 = 3.0;
/// Upper bound as a multiple of the target.
const MAX_MULTIPLE: f32 = 5.0;

pub struct DynamicDistance {
    render_distance: f32,
    target: f32,
}

impl DynamicDistance {
    pub fn new(target: f32) -> Self {
        Self {
            render_distance: target,
            target,
        }
    }

    pub fn render_distance(&self) -> f32 {
        self.render_distance
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Reset the target and snap the distance back into its band.
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
        self.render_distance = self.render_distance.clamp(self.min(), self.max());
    }

    pub fn min(&self) -> f32 {
        self.target / MIN_DIVISOR
    }

    pub fn max(&self) -> f32 {
        self.target * MAX_MULTIPLE
    }

    /// One controller step from the frame's rolling metrics.
    pub fn update(&mut self, metrics: &FrameMetrics, config: &Config) {
        let strained = metrics.skipped_search.mean() > 0.0
            || metrics.skipped_ingest.mean() > 0.0
            || (!metrics.object_delta.is_empty()
                && metrics.object_delta.mean() >= config.refresh_rate_midpoint())
            || metrics.last_search_duration > config.search_time_budget
            || metrics.last_ingest_duration > config.ingest_time_budget;

        if strained {
            self.render_distance -= SHRINK_STEP * self.target;
        } else if !metrics.object_delta.is_empty()
            && metrics.object_delta.mean() <= config.best_refresh_rate
        {
            self.render_distance += GROW_STEP * self.target;
        }
        self.render_distance = self.render_distance.clamp(self.min(), self.max());
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn comfortable_metrics(config: &Config) -> FrameMetrics {
        let mut metrics = FrameMetrics::default();
        metrics.skipped_search.push(0.0);
        metrics.skipped_ingest.push(0.0);
        metrics.object_delta.push(config.best_refresh_rate * 0.5);
        metrics
    }

    #[test]
    fn test_grows_when_comfortable() {
        let config = Config::default();
        let mut distance = DynamicDistance::new(100.0);
        let metrics = comfortable_metrics(&config);

        distance.update(&metrics, &config);
        assert_abs_diff_eq!(distance.render_distance(), 101.5, epsilon = 1e-4);
    }

    #[test]
    fn test_shrinks_on_skipped_search() {
        let config = Config::default();
        let mut distance = DynamicDistance::new(100.0);
        let mut metrics = comfortable_metrics(&config);
        metrics.skipped_search.push(3.0);

        distance.update(&metrics, &config);
        assert_abs_diff_eq!(distance.render_distance(), 97.0, epsilon = 1e-4);
    }

    #[test]
    fn test_shrinks_on_slow_object_delta() {
        let config = Config::default();
        let mut distance = DynamicDistance::new(100.0);
        let mut metrics = FrameMetrics::default();
        metrics.object_delta.push(config.worst_refresh_rate);

        distance.update(&metrics, &config);
        assert!(distance.render_distance() < 100.0);
    }

    #[test]
    fn test_shrinks_on_over_budget_search() {
        let config = Config::default();
        let mut distance = DynamicDistance::new(100.0);
        let mut metrics = FrameMetrics::default();
        metrics.last_search_duration = config.search_time_budget * 2.0;

        distance.update(&metrics, &config);
        assert!(distance.render_distance() < 100.0);
    }

    #[test]
    fn test_holds_without_delta_samples() {
        let config = Config::default();
        let mut distance = DynamicDistance::new(100.0);
        let metrics = FrameMetrics::default();

        distance.update(&metrics, &config);
        assert_eq!(distance.render_distance(), 100.0);
    }

    #[test]
    fn test_clamped_to_band() {
        let config = Config::default();
        let mut distance = DynamicDistance::new(90.0);

        let mut strained = FrameMetrics::default();
        strained.skipped_search.push(1.0);
        for _ in 0..1000 {
            distance.update(&strained, &config);
        }
        assert_abs_diff_eq!(distance.render_distance(), 30.0, epsilon = 1e-3);

        let comfortable = comfortable_metrics(&config);
        for _ in 0..10_000 {
            distance.update(&comfortable, &config);
        }
        assert_abs_diff_eq!(distance.render_distance(), 450.0, epsilon = 1e-2);
    }

    #[test]
    fn test_set_target_resnaps() {
        let mut distance = DynamicDistance::new(100.0);
        distance.set_target(10.0);
        // 100 is outside the new band [10/3, 50]
        assert_abs_diff_eq!(distance.render_distance(), 50.0, epsilon = 1e-4);
    }
}
