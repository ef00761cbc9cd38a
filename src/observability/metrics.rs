//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_registrations_total` (counter): accepted registrations by engine
//! - `dispatch_conflicts_total` (counter): templates rejected as ambiguous
//! - `dispatch_requests_total` (counter): dispatches by engine and outcome
//! - `dispatch_candidate_sets` (gauge): address buckets currently registered

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    describe_counter!("dispatch_registrations_total", "Registrations accepted, by engine");
    describe_counter!("dispatch_conflicts_total", "Template registrations rejected as ambiguous");
    describe_counter!("dispatch_requests_total", "Dispatch calls, by engine and outcome");
    describe_gauge!("dispatch_candidate_sets", "Address buckets currently registered");
    describe_counter!("dispatch_config_reloads_total", "Config file reloads, by outcome");
}

pub fn record_registration(engine: &'static str) {
    counter!("dispatch_registrations_total", "engine" => engine).increment(1);
}

pub fn record_conflict() {
    counter!("dispatch_conflicts_total").increment(1);
}

/// Record one dispatch that produced `matched` results.
pub fn record_dispatch(engine: &'static str, matched: usize) {
    let outcome = match matched {
        0 => "miss",
        1 => "hit",
        _ => "multiple",
    };
    counter!("dispatch_requests_total", "engine" => engine, "outcome" => outcome).increment(1);
}

pub fn record_candidate_sets(count: usize) {
    gauge!("dispatch_candidate_sets").set(count as f64);
}

pub fn record_reload(ok: bool) {
    let outcome = if ok { "loaded" } else { "rejected" };
    counter!("dispatch_config_reloads_total", "outcome" => outcome).increment(1);
}
