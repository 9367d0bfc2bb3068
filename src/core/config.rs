//! Scheduler configuration

use crate::core::error::Error;
use crate::core::types::Result;

/// Tunable parameters for the visibility and update pipeline.
///
/// Budgets are in seconds. Refresh rates are update *periods*: the
/// best rate is the shortest interval an object is allowed to update
/// at, the worst rate the longest it should have to wait.
#[derive(Clone, Debug)]
pub struct Config {
    /// Side length of a grid voxel in world units.
    pub voxel_size: f32,
    /// Render distance the dynamic controller steers around.
    pub render_distance_target: f32,
    /// Budget for the frustum search phase.
    pub search_time_budget: f64,
    /// Budget for the ingest phase.
    pub ingest_time_budget: f64,
    /// Budget for the caller-facing update iterator.
    pub update_time_budget: f64,
    /// Budget for each of the voxel-update drain and physics poll.
    pub micro_budget: f64,
    /// Shortest allowed update interval.
    pub best_refresh_rate: f64,
    /// Longest acceptable update interval.
    pub worst_refresh_rate: f64,
    /// How long a voxel proven visible is assumed to stay visible.
    pub grace_window: f64,
    /// Defer the pipeline until visibility is actually queried.
    pub compute_visibility_only_on_demand: bool,
    /// Never cut off p0 objects on budget exhaustion.
    pub strictly_enforce_worst_refresh_rate: bool,
    /// Let the controller move the render distance.
    pub dynamic_render_distance: bool,
    /// Seed for search shuffles and jitter. `None` mixes the wall clock.
    pub search_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            voxel_size: 20.0,
            render_distance_target: 400.0,
            search_time_budget: 0.0008,
            ingest_time_budget: 0.0006,
            update_time_budget: 0.0015,
            micro_budget: 0.000_050,
            best_refresh_rate: 1.0 / 60.0,
            worst_refresh_rate: 1.0 / 15.0,
            grace_window: 0.175,
            compute_visibility_only_on_demand: false,
            strictly_enforce_worst_refresh_rate: false,
            dynamic_render_distance: true,
            search_seed: None,
        }
    }
}

impl Config {
    /// Midpoint of the refresh-rate band, used by the distance controller.
    pub fn refresh_rate_midpoint(&self) -> f64 {
        (self.best_refresh_rate + self.worst_refresh_rate) * 0.5
    }

    /// Values above 2 are frequencies in Hz; invert them into periods.
    pub fn normalize_refresh_rate(value: f64) -> f64 {
        if value > 2.0 {
            1.0 / value
        } else {
            value
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_positive_finite("voxel_size", self.voxel_size as f64)?;
        check_positive_finite("render_distance_target", self.render_distance_target as f64)?;
        check_budget("search_time_budget", self.search_time_budget)?;
        check_budget("ingest_time_budget", self.ingest_time_budget)?;
        check_budget("update_time_budget", self.update_time_budget)?;
        check_budget("micro_budget", self.micro_budget)?;
        check_positive_finite("best_refresh_rate", self.best_refresh_rate)?;
        check_positive_finite("worst_refresh_rate", self.worst_refresh_rate)?;
        if self.best_refresh_rate >= self.worst_refresh_rate {
            return Err(Error::Config(format!(
                "best_refresh_rate ({}) must be shorter than worst_refresh_rate ({})",
                self.best_refresh_rate, self.worst_refresh_rate
            )));
        }
        check_positive_finite("grace_window", self.grace_window)?;
        Ok(())
    }
}

fn check_positive_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Config(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}

/// Budgets may be zero (starve the phase) or infinite (never cut off).
fn check_budget(name: &str, value: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(Error::Config(format!(
            "{name} must be non-negative, got {value}"
        )));
    }
    Ok(())
}
