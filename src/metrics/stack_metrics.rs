//! Stacking metrics using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for recomputations and notification fan-out.
///
/// # Examples
///
/// ```rust,no_run
/// use opentelemetry::global;
/// use stacked_config::metrics::StackMetrics;
///
/// let metrics = StackMetrics::new(global::meter("stacked-config"));
///
/// let timer = metrics.start_restack();
/// // ... stack and publish ...
/// metrics.record_restack_success(timer, 2);
/// ```
#[derive(Clone)]
pub struct StackMetrics {
    restack_attempts: Counter<u64>,
    restack_success: Counter<u64>,
    restack_failures: Counter<u64>,
    restack_duration: Histogram<f64>,
    verification_failures: Counter<u64>,
    dropped_events: Counter<u64>,
    active_callbacks: Gauge<i64>,
    serial: Gauge<u64>,
    config_age_seconds: Gauge<i64>,
    last_publish: Arc<parking_lot::Mutex<Instant>>,
}

impl StackMetrics {
    /// Create a collector whose instruments live on `meter`.
    pub fn new(meter: Meter) -> Self {
        let restack_attempts = meter
            .u64_counter("stacked_config.restack.attempts")
            .with_description("Total number of recomputations started")
            .build();

        let restack_success = meter
            .u64_counter("stacked_config.restack.success")
            .with_description("Number of recomputations that published a snapshot")
            .build();

        let restack_failures = meter
            .u64_counter("stacked_config.restack.failures")
            .with_description("Number of recomputations that kept the previous snapshot")
            .build();

        let restack_duration = meter
            .f64_histogram("stacked_config.restack.duration")
            .with_description("Duration of recomputations in seconds")
            .with_unit("s")
            .build();

        let verification_failures = meter
            .u64_counter("stacked_config.verification.failures")
            .with_description("Number of merged values rejected by verification")
            .build();

        let dropped_events = meter
            .u64_counter("stacked_config.events.dropped")
            .with_description("Values not delivered because the events channel was full")
            .build();

        let active_callbacks = meter
            .i64_gauge("stacked_config.callbacks.active")
            .with_description("Number of registered callbacks")
            .build();

        let serial = meter
            .u64_gauge("stacked_config.serial")
            .with_description("Serial of the current snapshot")
            .build();

        let config_age_seconds = meter
            .i64_gauge("stacked_config.age")
            .with_description("Time since the last published snapshot in seconds")
            .with_unit("s")
            .build();

        Self {
            restack_attempts,
            restack_success,
            restack_failures,
            restack_duration,
            verification_failures,
            dropped_events,
            active_callbacks,
            serial,
            config_age_seconds,
            last_publish: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Start timing a recomputation.
    pub fn start_restack(&self) -> Instant {
        self.restack_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a recomputation that published `serial`.
    pub fn record_restack_success(&self, start: Instant, serial: u64) {
        self.restack_success.add(1, &[]);
        self.restack_duration.record(start.elapsed().as_secs_f64(), &[]);
        self.serial.record(serial, &[]);
        *self.last_publish.lock() = Instant::now();
    }

    /// Record a recomputation that was rejected.
    pub fn record_restack_failure(&self, start: Instant) {
        self.restack_failures.add(1, &[]);
        self.restack_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a merged value refused by verification.
    pub fn record_verification_failure(&self) {
        self.verification_failures.add(1, &[]);
    }

    /// Record a value the events channel had no room for.
    pub fn record_dropped_event(&self) {
        self.dropped_events.add(1, &[]);
    }

    /// Update the number of registered callbacks.
    pub fn record_callbacks(&self, count: usize) {
        self.active_callbacks
            .record(i64::try_from(count).unwrap_or(i64::MAX), &[]);
    }

    /// Update the age gauge from the time of the last publication.
    pub fn update_config_age(&self) {
        let age_secs = self.last_publish.lock().elapsed().as_secs();
        self.config_age_seconds
            .record(i64::try_from(age_secs).unwrap_or(i64::MAX), &[]);
    }
}

impl std::fmt::Debug for StackMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_creation() {
        let metrics = StackMetrics::new(global::meter("test"));

        let timer = metrics.start_restack();
        metrics.record_restack_success(timer, 2);

        let timer = metrics.start_restack();
        metrics.record_restack_failure(timer);

        metrics.record_verification_failure();
        metrics.record_dropped_event();
        metrics.record_callbacks(3);
        metrics.update_config_age();
    }

    #[test]
    fn test_metrics_clone_shares_age() {
        let metrics = StackMetrics::new(global::meter("test"));
        let other = metrics.clone();

        let timer = other.start_restack();
        other.record_restack_success(timer, 5);

        assert!(Arc::ptr_eq(&metrics.last_publish, &other.last_publish));
    }
}
