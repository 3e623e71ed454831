//! Metrics sink
//!
//! The transport reports through [`MetricsSink`] and never reads anything
//! back, so a failing or missing backend cannot influence control flow.

use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Registry};
use std::collections::HashMap;

pub const RTP_PACKETS_SENT: &str = "rtp_packets_sent";
pub const RTP_PACKETS_SENT_BYTES: &str = "rtp_packets_sent_bytes";
pub const RTP_PACKETS_RECEIVED: &str = "rtp_packets_received";
pub const RTP_PACKETS_RECEIVED_BYTES: &str = "rtp_packets_received_bytes";
pub const RTP_PACKETS_NO_SUBSCRIBER: &str = "rtp_packets_no_subscriber";
pub const RTCP_PACKETS_SENT: &str = "rtcp_packets_sent";
pub const RTCP_PACKETS_RECEIVED: &str = "rtcp_packets_received";
pub const TRACKS_TOTAL: &str = "webrtc_tracks_total";
pub const TRACKS_ACTIVE: &str = "webrtc_tracks_active";
pub const TRACKS_DURATION_SECONDS: &str = "webrtc_tracks_duration_seconds";

pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str) {
        self.add_to_counter(name, 1.0);
    }

    fn add_to_counter(&self, name: &'static str, value: f64);

    fn add_to_gauge(&self, name: &'static str, delta: f64);

    fn observe(&self, histogram: &'static str, value: f64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add_to_counter(&self, _name: &'static str, _value: f64) {}

    fn add_to_gauge(&self, _name: &'static str, _delta: f64) {}

    fn observe(&self, _histogram: &'static str, _value: f64) {}
}

/// Prometheus-backed sink; names it does not know are ignored
pub struct PrometheusMetrics {
    counters: HashMap<&'static str, Counter>,
    gauges: HashMap<&'static str, Gauge>,
    histograms: HashMap<&'static str, Histogram>,
}

impl PrometheusMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let counter_help = [
            (RTP_PACKETS_SENT, "Total number of RTP packets sent"),
            (RTP_PACKETS_SENT_BYTES, "Total bytes of RTP packets sent"),
            (RTP_PACKETS_RECEIVED, "Total number of RTP packets received"),
            (RTP_PACKETS_RECEIVED_BYTES, "Total bytes of RTP packets received"),
            (
                RTP_PACKETS_NO_SUBSCRIBER,
                "RTP packets written to a track nobody subscribed to yet",
            ),
            (RTCP_PACKETS_SENT, "Total number of RTCP packets sent"),
            (RTCP_PACKETS_RECEIVED, "Total number of RTCP packets received"),
            (TRACKS_TOTAL, "Total number of remote tracks received"),
        ];

        let mut counters = HashMap::new();
        for (name, help) in counter_help {
            let base = name.strip_suffix("_total").unwrap_or(name);
            let counter = Counter::new(format!("mediarelay_{}_total", base), help)?;
            registry.register(Box::new(counter.clone()))?;
            counters.insert(name, counter);
        }

        let active = Gauge::new(
            format!("mediarelay_{}", TRACKS_ACTIVE),
            "Number of remote tracks currently being received",
        )?;
        registry.register(Box::new(active.clone()))?;

        let duration = Histogram::with_opts(
            HistogramOpts::new(
                format!("mediarelay_{}", TRACKS_DURATION_SECONDS),
                "How long remote tracks were received, in seconds",
            )
            .buckets(vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            counters,
            gauges: HashMap::from([(TRACKS_ACTIVE, active)]),
            histograms: HashMap::from([(TRACKS_DURATION_SECONDS, duration)]),
        })
    }
}

impl MetricsSink for PrometheusMetrics {
    fn add_to_counter(&self, name: &'static str, value: f64) {
        if let Some(counter) = self.counters.get(name) {
            counter.inc_by(value);
        }
    }

    fn add_to_gauge(&self, name: &'static str, delta: f64) {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.add(delta);
        }
    }

    fn observe(&self, histogram: &'static str, value: f64) {
        if let Some(histogram) = self.histograms.get(histogram) {
            histogram.observe(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(registry: &Registry, name: &str) -> f64 {
        let family = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == name)
            .unwrap_or_else(|| panic!("metric {} not registered", name));
        let metric = &family.get_metric()[0];

        if metric.has_gauge() {
            metric.get_gauge().get_value()
        } else {
            metric.get_counter().get_value()
        }
    }

    #[test]
    fn test_counters_and_gauges() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::new(&registry).unwrap();

        metrics.increment_counter(RTP_PACKETS_SENT);
        metrics.add_to_counter(RTP_PACKETS_SENT_BYTES, 200.0);
        metrics.add_to_gauge(TRACKS_ACTIVE, 1.0);
        metrics.add_to_gauge(TRACKS_ACTIVE, 1.0);
        metrics.add_to_gauge(TRACKS_ACTIVE, -1.0);

        assert_eq!(sample(&registry, "mediarelay_rtp_packets_sent_total"), 1.0);
        assert_eq!(sample(&registry, "mediarelay_rtp_packets_sent_bytes_total"), 200.0);
        assert_eq!(sample(&registry, "mediarelay_webrtc_tracks_active"), 1.0);

        metrics.increment_counter(TRACKS_TOTAL);
        assert_eq!(sample(&registry, "mediarelay_webrtc_tracks_total"), 1.0);
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::new(&registry).unwrap();

        metrics.increment_counter("not_a_metric");
        metrics.observe("not_a_histogram", 1.0);
        metrics.observe(TRACKS_DURATION_SECONDS, 12.5);

        let duration = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "mediarelay_webrtc_tracks_duration_seconds")
            .unwrap();
        assert_eq!(duration.get_metric()[0].get_histogram().get_sample_count(), 1);
    }

    #[test]
    fn test_registering_twice_fails() {
        let registry = Registry::new();
        assert!(PrometheusMetrics::new(&registry).is_ok());
        assert!(PrometheusMetrics::new(&registry).is_err());
    }
}
