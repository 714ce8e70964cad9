//! In-process metrics (spec §4.9): an in-flight gauge, a rate-limit drop
//! counter, per-handler request counters by status class, and per-handler
//! latency histograms, rendered as Prometheus text exposition on
//! `/metrics`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Cumulative bucket boundaries (seconds) the spec names for every
/// handler's latency histogram.
const BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0];

#[derive(Default)]
struct Histogram {
    /// Cumulative count per bucket, parallel to `BUCKETS` plus a trailing
    /// `+Inf` bucket.
    bucket_counts: [u64; BUCKETS.len() + 1],
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, seconds: f64) {
        for (i, b) in BUCKETS.iter().enumerate() {
            if seconds <= *b {
                self.bucket_counts[i] += 1;
            }
        }
        self.bucket_counts[BUCKETS.len()] += 1;
        self.sum += seconds;
        self.count += 1;
    }
}

#[derive(Default)]
pub struct Metrics {
    in_flight: AtomicI64,
    rate_limit_drops: AtomicU64,
    request_counts: Mutex<HashMap<(String, &'static str), u64>>,
    histograms: Mutex<HashMap<String, Histogram>>,
}

/// RAII guard: increments the in-flight gauge on creation, decrements on
/// drop so early returns and panics both release it.
pub struct InFlightGuard<'a>(&'a Metrics);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Metrics {
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard(self)
    }

    pub fn record_drop(&self) {
        self.rate_limit_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed request: `status` is bucketed into its class
    /// (`2xx`, `4xx`, `5xx`, ...) and `elapsed` observed in the handler's
    /// latency histogram.
    pub fn record(&self, handler: &str, status: u16, elapsed_secs: f64) {
        let class = status_class(status);
        *self
            .request_counts
            .lock()
            .entry((handler.to_string(), class))
            .or_insert(0) += 1;
        self.histograms
            .lock()
            .entry(handler.to_string())
            .or_default()
            .observe(elapsed_secs);
    }

    /// Render Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP orizon_registry_in_flight_requests Requests currently being handled.");
        let _ = writeln!(out, "# TYPE orizon_registry_in_flight_requests gauge");
        let _ = writeln!(
            out,
            "orizon_registry_in_flight_requests {}",
            self.in_flight.load(Ordering::Relaxed)
        );

        let _ = writeln!(out, "# HELP orizon_registry_rate_limit_drops_total Requests rejected by the rate limiter.");
        let _ = writeln!(out, "# TYPE orizon_registry_rate_limit_drops_total counter");
        let _ = writeln!(
            out,
            "orizon_registry_rate_limit_drops_total {}",
            self.rate_limit_drops.load(Ordering::Relaxed)
        );

        let _ = writeln!(out, "# HELP orizon_registry_requests_total Requests by handler and status class.");
        let _ = writeln!(out, "# TYPE orizon_registry_requests_total counter");
        let counts = self.request_counts.lock();
        let mut count_keys: Vec<_> = counts.keys().collect();
        count_keys.sort();
        for key in count_keys {
            let (handler, class) = key;
            let _ = writeln!(
                out,
                "orizon_registry_requests_total{{handler=\"{}\",status=\"{}\"}} {}",
                handler,
                class,
                counts[key]
            );
        }

        let _ = writeln!(out, "# HELP orizon_registry_request_duration_seconds Handler latency.");
        let _ = writeln!(out, "# TYPE orizon_registry_request_duration_seconds histogram");
        let histograms = self.histograms.lock();
        let mut hist_keys: Vec<_> = histograms.keys().collect();
        hist_keys.sort();
        for handler in hist_keys {
            let hist = &histograms[handler];
            for (i, bound) in BUCKETS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "orizon_registry_request_duration_seconds_bucket{{handler=\"{}\",le=\"{}\"}} {}",
                    handler, bound, hist.bucket_counts[i]
                );
            }
            let _ = writeln!(
                out,
                "orizon_registry_request_duration_seconds_bucket{{handler=\"{}\",le=\"+Inf\"}} {}",
                handler,
                hist.bucket_counts[BUCKETS.len()]
            );
            let _ = writeln!(
                out,
                "orizon_registry_request_duration_seconds_sum{{handler=\"{}\"}} {}",
                handler, hist.sum
            );
            let _ = writeln!(
                out,
                "orizon_registry_request_duration_seconds_count{{handler=\"{}\"}} {}",
                handler, hist.count
            );
        }

        out
    }
}

fn status_class(status: u16) -> &'static str {
    match status / 100 {
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_guard_decrements_on_drop() {
        let metrics = Metrics::default();
        {
            let _guard = metrics.enter();
            assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 1);
        }
        assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn records_request_counts_and_latency() {
        let metrics = Metrics::default();
        metrics.record("fetch", 200, 0.02);
        metrics.record("fetch", 404, 0.2);
        let rendered = metrics.render();
        assert!(rendered.contains("handler=\"fetch\",status=\"2xx\"} 1"));
        assert!(rendered.contains("handler=\"fetch\",status=\"4xx\"} 1"));
        assert!(rendered.contains("orizon_registry_request_duration_seconds_count{handler=\"fetch\"} 2"));
    }

    #[test]
    fn drop_counter_increments() {
        let metrics = Metrics::default();
        metrics.record_drop();
        metrics.record_drop();
        assert!(metrics.render().contains("orizon_registry_rate_limit_drops_total 2"));
    }
}
