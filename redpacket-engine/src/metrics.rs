use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

use tracing::error;

use crate::errors::ErrorKind;
use crate::models::PacketType;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref PACKETS_CREATED: IntCounterVec = IntCounterVec::new(
        Opts::new("redpacket_packets_created_total", "Total red packets created"),
        &["type"]
    ).expect("metric can be created");

    pub static ref CLAIMS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("redpacket_claims_total", "Claim attempts by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref CLAIMED_AMOUNT: Histogram = Histogram::with_opts(
        HistogramOpts::new("redpacket_claimed_amount", "Distribution of claimed amounts")
            .buckets(vec![1.0, 10.0, 100.0, 1000.0, 10000.0, 100000.0, 1000000.0])
    ).expect("metric can be created");

    pub static ref CLAIM_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("redpacket_claim_duration_seconds", "Claim transaction duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("metric can be created");
}

/// Register all metrics with `registry`. Safe to call more than once.
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PACKETS_CREATED.clone()),
        Box::new(CLAIMS_TOTAL.clone()),
        Box::new(CLAIMED_AMOUNT.clone()),
        Box::new(CLAIM_DURATION.clone()),
    ];
    for collector in collectors {
        match registry.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => {
                error!(error = %e, "Failed to register metric");
                return Err(e);
            }
        }
    }
    Ok(())
}

pub fn record_packet_created(packet_type: PacketType) {
    let label = match packet_type {
        PacketType::Even => "even",
        PacketType::Lucky => "lucky",
    };
    PACKETS_CREATED.with_label_values(&[label]).inc();
}

pub fn record_claim_success(amount: i64, seconds: f64) {
    CLAIMS_TOTAL.with_label_values(&["success"]).inc();
    CLAIMED_AMOUNT.observe(amount as f64);
    CLAIM_DURATION.observe(seconds);
}

pub fn record_claim_rejected(kind: ErrorKind) {
    CLAIMS_TOTAL.with_label_values(&[kind.as_str()]).inc();
}

/// Render the registry in the Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    register_metrics(&REGISTRY)?;

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_repeatable() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        register_metrics(&registry).unwrap();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        assert!(names.contains(&"redpacket_claim_duration_seconds".to_string()));
        assert!(names.contains(&"redpacket_claimed_amount".to_string()));
    }

    #[test]
    fn exposes_claim_metrics() {
        record_claim_success(42, 0.002);
        record_claim_rejected(ErrorKind::PacketEmpty);
        record_packet_created(PacketType::Lucky);

        let body = metrics_handler().unwrap();
        assert!(body.contains("redpacket_claims_total"));
        assert!(body.contains("outcome=\"packet_empty\""));
        assert!(body.contains("redpacket_packets_created_total"));
        assert!(body.contains("redpacket_claimed_amount"));
    }
}
