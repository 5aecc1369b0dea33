use crate::nmea::Rejection;
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Start the Prometheus exporter on `0.0.0.0:<port>`; must run inside a Tokio runtime
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

/// Register gateway metrics at zero so they are scraped before the first event
pub fn initialize_gateway_metrics() {
    metrics::counter!("nxdn.gps.block.received_total").absolute(0);
    metrics::counter!("nxdn.gps.transmission.discarded_total").absolute(0);
    metrics::counter!("nxdn.gps.report.published_total").absolute(0);
    for reason in ["bad_length", "overflow"] {
        metrics::counter!("nxdn.gps.block.dropped_total", "reason" => reason).absolute(0);
    }
    for reason in Rejection::REASONS {
        metrics::counter!("nxdn.gps.rejected_total", "reason" => reason).absolute(0);
    }

    metrics::counter!("aprs.connection.established_total").absolute(0);
    metrics::counter!("aprs.connection.failed_total").absolute(0);
    metrics::counter!("aprs.connection.operation_failed_total").absolute(0);
    metrics::gauge!("aprs.connection.connected").set(0.0);
    metrics::counter!("aprs.keepalive.sent_total").absolute(0);
    metrics::counter!("aprs.writer.queued_total").absolute(0);
    metrics::counter!("aprs.writer.sent_total").absolute(0);
}
