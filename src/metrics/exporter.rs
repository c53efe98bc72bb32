//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;

/// Initialize the Prometheus metrics exporter
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    describe_counter!("slotnet_connections_total", "Total connections accepted");
    describe_gauge!("slotnet_connections_active", "Currently admitted connections");
    describe_counter!("slotnet_accept_failures", "Failed accept operations");
    describe_counter!("slotnet_bytes_received", "Total bytes received");
    describe_counter!("slotnet_bytes_sent", "Total bytes sent");
    describe_counter!("slotnet_chunks_received", "Receive completions delivered");
    describe_counter!("slotnet_chunks_sent", "Send completions");
    describe_counter!("slotnet_chunks_decrypted", "Received chunks decrypted");
    describe_counter!("slotnet_send_drops", "Sends dropped for lack of a send slot");
    describe_counter!(
        "slotnet_receive_slot_misses",
        "Accepted connections that found no free receive slot"
    );
    describe_counter!("slotnet_receive_errors", "Receive errors ending a connection");
    describe_counter!("slotnet_send_errors", "Send errors ending a connection");

    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    // Start background task to sync atomic counters to metrics crate
    tokio::spawn(sync_metrics_task());

    Ok(())
}

/// Background task that periodically syncs our atomic counters to the metrics crate
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut last_snapshot = MetricsSnapshot::default();

    loop {
        interval.tick().await;

        let snapshot = METRICS.snapshot();

        gauge!("slotnet_connections_active").set(snapshot.connections_active as f64);

        let deltas = [
            ("slotnet_connections_total", snapshot.connections_total, last_snapshot.connections_total),
            ("slotnet_accept_failures", snapshot.accept_failures, last_snapshot.accept_failures),
            ("slotnet_bytes_received", snapshot.bytes_received, last_snapshot.bytes_received),
            ("slotnet_bytes_sent", snapshot.bytes_sent, last_snapshot.bytes_sent),
            ("slotnet_chunks_received", snapshot.chunks_received, last_snapshot.chunks_received),
            ("slotnet_chunks_sent", snapshot.chunks_sent, last_snapshot.chunks_sent),
            ("slotnet_chunks_decrypted", snapshot.chunks_decrypted, last_snapshot.chunks_decrypted),
            ("slotnet_send_drops", snapshot.send_drops, last_snapshot.send_drops),
            ("slotnet_receive_slot_misses", snapshot.receive_slot_misses, last_snapshot.receive_slot_misses),
            ("slotnet_receive_errors", snapshot.receive_errors, last_snapshot.receive_errors),
            ("slotnet_send_errors", snapshot.send_errors, last_snapshot.send_errors),
        ];

        for (name, current, previous) in deltas {
            let delta = current.saturating_sub(previous);
            if delta > 0 {
                counter!(name).increment(delta);
            }
        }

        last_snapshot = snapshot;
    }
}
