//! Prometheus metrics for a CLI run
//!
//! With `--metrics` a recorder is installed before the command runs and the
//! text exposition is printed to stderr afterwards. Without it every call is
//! a no-op.
//!
//! - `ocr_chat_commands_total` (counter): label `command`
//! - `chat_requests_total` (counter): labels `model`, `outcome`
//! - `chat_request_duration_seconds` (histogram): label `model`
//! - `key_pool_selections_total`, `key_pool_failures_total`,
//!   `key_pool_active_keys` from the key pool

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Chat latency is bucketed from 100ms to 60s, the range of the request
/// timeout.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("chat_request_duration_seconds".to_string()),
            &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
        )
        .context("failed to set histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

pub fn record_command(command: &'static str) {
    metrics::counter!("ocr_chat_commands_total", "command" => command).increment(1);
}

/// Record one chat request with its outcome (`ok` or `error`).
pub fn record_chat(model: &str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("chat_requests_total", "model" => model.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("chat_request_duration_seconds", "model" => model.to_string())
        .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_command("ask");
        record_chat("gemma2-9b-it", "ok", 0.4);
    }

    #[test]
    fn recorded_values_render() {
        let recorder: PrometheusRecorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("chat_request_duration_seconds".to_string()),
                &[0.5, 1.0],
            )
            .unwrap()
            .build_recorder();
        let handle = recorder.handle();

        let _guard = metrics::set_default_local_recorder(&recorder);

        record_command("ask");
        record_chat("gemma2-9b-it", "error", 0.7);

        let output = handle.render();
        assert!(output.contains("ocr_chat_commands_total{command=\"ask\"} 1"), "{output}");
        assert!(output.contains("chat_requests_total"), "{output}");
        assert!(output.contains("chat_request_duration_seconds_bucket"), "{output}");
    }
}
