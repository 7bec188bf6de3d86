//! Frame timing and input-to-render latency.
//!
//! The recorder is observational: nothing here feeds back into whether or
//! what the engine draws.

use std::collections::VecDeque;

use serde::Serialize;

const RENDER_EMA_KEEP: f64 = 0.95;
const RENDER_EMA_TAKE: f64 = 0.05;

/// Fixed-capacity latency samples, oldest evicted first.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Nearest-rank percentile, `pct` in `0..=100`.
    pub fn percentile(&self, pct: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let rank = ((pct.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub last_render_ms: f64,
    pub average_render_ms: f64,
    pub total_frames: u64,
    pub dropped_frames: u64,
    pub failed_frames: u64,
    pub idle_ticks: u64,
    pub resizes: u64,
    pub last_keypress_at: Option<f64>,
    pub loop_started_at: Option<f64>,
    pub latency_samples: Vec<f64>,
    pub average_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub buffer_width: u32,
    pub buffer_height: u32,
    pub device_pixel_ratio: f64,
}

impl PerformanceMetrics {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceRecorder {
    frame_budget_ms: f64,
    pending_keypress: Option<f64>,
    last_keypress_at: Option<f64>,
    last_render_ms: f64,
    average_render_ms: f64,
    total_frames: u64,
    dropped_frames: u64,
    failed_frames: u64,
    idle_ticks: u64,
    latencies: LatencyWindow,
}

impl PerformanceRecorder {
    pub fn new(frame_budget_ms: f64, latency_window: usize) -> Self {
        Self {
            frame_budget_ms,
            pending_keypress: None,
            last_keypress_at: None,
            last_render_ms: 0.0,
            average_render_ms: 0.0,
            total_frames: 0,
            dropped_frames: 0,
            failed_frames: 0,
            idle_ticks: 0,
            latencies: LatencyWindow::new(latency_window),
        }
    }

    /// Opens a latency window at `now`. A second keypress before the next
    /// frame moves the window start forward.
    pub fn record_keypress(&mut self, now: f64) -> f64 {
        self.pending_keypress = Some(now);
        self.last_keypress_at = Some(now);
        now
    }

    pub fn pending_keypress(&self) -> Option<f64> {
        self.pending_keypress
    }

    /// Records a frame that drew, started at `render_start` and taking
    /// `duration_ms`. Closes the pending keypress window, if any.
    pub fn record_frame(&mut self, render_start: f64, duration_ms: f64) {
        if let Some(pressed_at) = self.pending_keypress.take() {
            self.latencies.push((render_start - pressed_at).max(0.0));
        }

        self.last_render_ms = duration_ms;
        self.average_render_ms =
            self.average_render_ms * RENDER_EMA_KEEP + duration_ms * RENDER_EMA_TAKE;
        self.total_frames += 1;
        if duration_ms > self.frame_budget_ms {
            self.dropped_frames += 1;
        }
    }

    pub fn record_failed_frame(&mut self) {
        self.failed_frames += 1;
    }

    pub fn record_idle_tick(&mut self) {
        self.idle_ticks += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.frame_budget_ms, self.latencies.capacity);
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            last_render_ms: self.last_render_ms,
            average_render_ms: self.average_render_ms,
            total_frames: self.total_frames,
            dropped_frames: self.dropped_frames,
            failed_frames: self.failed_frames,
            idle_ticks: self.idle_ticks,
            last_keypress_at: self.last_keypress_at,
            latency_samples: self.latencies.samples(),
            average_latency_ms: self.latencies.average(),
            p50_latency_ms: self.latencies.percentile(50.0),
            p95_latency_ms: self.latencies.percentile(95.0),
            ..PerformanceMetrics::default()
        }
    }
}
