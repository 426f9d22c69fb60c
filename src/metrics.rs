//! Performance metrics sink
//!
//! The percentile collector lives outside this crate; components only push
//! observations into it.

/// Write-only sink for request/latency/error observations
pub trait MetricsSink: Send + Sync {
    fn record_response_time(&self, ms: u64);
    fn record_request(&self);
    fn record_error(&self, kind: &str);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_response_time(&self, _ms: u64) {}
    fn record_request(&self) {}
    fn record_error(&self, _kind: &str) {}
}
