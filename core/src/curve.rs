use std::time::Duration;

/// Linear map from an observation (distance, age) to a refresh interval,
/// clamped at both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalCurve {
    pub min_value: f32,
    pub max_value: f32,
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl IntervalCurve {
    #[must_use]
    pub const fn new(
        min_value: f32,
        max_value: f32,
        min_interval: Duration,
        max_interval: Duration,
    ) -> Self {
        Self {
            min_value,
            max_value,
            min_interval,
            max_interval,
        }
    }

    #[must_use]
    pub fn at(&self, value: f32) -> Duration {
        if value.is_nan() {
            return self.max_interval;
        }
        if value <= self.min_value {
            return self.min_interval;
        }
        if value >= self.max_value {
            return self.max_interval;
        }
        // A NaN or infinite endpoint makes `t` NaN; fall back to the slow end.
        let t = f64::from(value - self.min_value) / f64::from(self.max_value - self.min_value);
        let min = self.min_interval.as_secs_f64();
        let max = self.max_interval.as_secs_f64();
        Duration::try_from_secs_f64(min + (max - min) * t).unwrap_or(self.max_interval)
    }

    /// Interval for a value that has been unchanged for `age`.
    #[must_use]
    pub fn at_age(&self, age: Duration) -> Duration {
        self.at(age.as_secs_f32())
    }
}
