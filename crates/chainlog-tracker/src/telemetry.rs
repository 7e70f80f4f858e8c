use tracing::{info, instrument, warn};

use crate::run_record::RunRecord;

/// Run telemetry on the operational tracing channel
pub struct RunTelemetry {
    /// Service name for tracing
    service_name: String,
}

impl RunTelemetry {
    /// Create new telemetry service
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    /// Start run span
    #[instrument(skip(self, record), fields(
        run_id = %record.run_id,
        chain_type = %record.chain_type,
        depth = record.depth,
        service = %self.service_name
    ))]
    pub fn start_run_span(&self, record: &RunRecord) {
        info!(
            parent_run_id = ?record.parent_run_id,
            primary = record.is_primary,
            "Started chain run"
        );
    }

    /// End run span
    #[instrument(skip(self, record, error), fields(
        run_id = %record.run_id,
        chain_type = %record.chain_type,
        duration_secs = duration_secs,
        service = %self.service_name
    ))]
    pub fn end_run_span(&self, record: &RunRecord, duration_secs: f64, error: Option<&str>) {
        match error {
            None => info!(children = record.children.len(), "Chain run completed"),
            Some(error) => warn!(error = error, "Chain run failed"),
        }
    }

    /// Record run event
    #[instrument(skip(self), fields(service = %self.service_name))]
    pub fn record_event(&self, run_id: &str, event_name: &str, details: &str) {
        info!(
            event = event_name,
            details = details,
            "Recorded run event"
        );
    }
}

impl Default for RunTelemetry {
    fn default() -> Self {
        Self::new("chainlog")
    }
}
