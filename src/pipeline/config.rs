use std::time::Duration;

const DEFAULT_HIGH_WATER_MARK: usize = 16;
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Run-wide settings for a [`Pipeline`](crate::pipeline::driver::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    high_water_mark: usize,
    grace_period: Duration,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// High-water mark used by [`Pipeline::link`](crate::pipeline::driver::Pipeline::link).
    /// Clamped to at least 1.
    pub fn high_water_mark(mut self, n: usize) -> Self {
        self.high_water_mark = n.max(1);
        self
    }

    /// How long stages get to wind down once teardown began. Stages still
    /// running afterwards are dropped and reported as aborted.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn default_high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn teardown_grace(&self) -> Duration {
        self.grace_period
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
