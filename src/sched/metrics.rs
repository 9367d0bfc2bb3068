//! Rolling frame measurements

use serde::{Deserialize, Serialize};

/// Default number of frames averaged for skipped-work metrics.
pub const ROLLING_WINDOW: usize = 4;

/// Fixed-capacity rolling mean over the most recent samples.
#[derive(Clone, Debug)]
pub struct RollingMean {
    samples: Vec<f64>,
    capacity: usize,
    cursor: usize,
}

impl RollingMean {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            cursor: 0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples[self.cursor] = value;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Mean of the retained samples; 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.cursor = 0;
    }
}

impl Default for RollingMean {
    fn default() -> Self {
        Self::new(ROLLING_WINDOW)
    }
}

/// Rolling measurements consumed by the dynamic-distance controller.
#[derive(Clone, Debug, Default)]
pub struct FrameMetrics {
    /// Volumes abandoned by the frustum search, per frame.
    pub skipped_search: RollingMean,
    /// Voxels fast-ingested after the ingest budget ran out, per frame.
    pub skipped_ingest: RollingMean,
    /// Mean delta time of yielded updates, excluding >= 1 s outliers.
    pub object_delta: RollingMean,
    pub last_search_duration: f64,
    pub last_ingest_duration: f64,
}

/// Snapshot of scheduler health for one frame.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub object_count: usize,
    pub occupied_voxels: usize,
    pub visible_voxels: usize,
    pub search_duration: f64,
    pub ingest_duration: f64,
    pub avg_skipped_search: f64,
    pub avg_skipped_ingest: f64,
    pub avg_object_delta: f64,
    pub render_distance: f32,
}
