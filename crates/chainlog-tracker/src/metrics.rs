use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Run metrics collector
#[derive(Clone)]
pub struct RunMetrics {
    /// Total runs started
    runs_started: IntCounter,

    /// Runs started but not yet ended or errored
    active_runs: IntGauge,

    /// Records handed to the store
    records_written: IntCounter,

    /// Chain runs that ended in an error
    run_errors: IntCounter,

    /// Logger-internal faults by kind
    faults: IntCounterVec,

    /// Config extractions that fell back to common fields
    extraction_warnings: IntCounter,

    /// Run duration histogram
    run_duration: Histogram,

    registry: Registry,
}

impl RunMetrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_started = IntCounter::new(
            "chainlog_runs_started_total",
            "Total number of chain runs started",
        )?;
        registry.register(Box::new(runs_started.clone()))?;

        let active_runs = IntGauge::new(
            "chainlog_active_runs",
            "Number of chain runs started but not finished",
        )?;
        registry.register(Box::new(active_runs.clone()))?;

        let records_written = IntCounter::new(
            "chainlog_records_written_total",
            "Total number of log records handed to the store",
        )?;
        registry.register(Box::new(records_written.clone()))?;

        let run_errors = IntCounter::new(
            "chainlog_run_errors_total",
            "Total number of chain runs that ended in an error",
        )?;
        registry.register(Box::new(run_errors.clone()))?;

        let faults = IntCounterVec::new(
            Opts::new("chainlog_faults_total", "Logger-internal faults by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(faults.clone()))?;

        let extraction_warnings = IntCounter::new(
            "chainlog_extraction_warnings_total",
            "Config extractions that degraded to common fields",
        )?;
        registry.register(Box::new(extraction_warnings.clone()))?;

        let run_duration = Histogram::with_opts(
            HistogramOpts::new("chainlog_run_duration_seconds", "Chain run duration in seconds")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            runs_started,
            active_runs,
            records_written,
            run_errors,
            faults,
            extraction_warnings,
            run_duration,
            registry,
        })
    }

    pub fn run_started(&self) {
        self.runs_started.inc();
    }

    pub fn run_finished(&self, duration_secs: f64) {
        self.run_duration.observe(duration_secs);
    }

    /// Mirror the tracker's count of open runs.
    pub fn set_active_runs(&self, active: usize) {
        self.active_runs.set(active as i64);
    }

    pub fn run_failed(&self, duration_secs: f64) {
        self.run_errors.inc();
        self.run_finished(duration_secs);
    }

    pub fn record_written(&self) {
        self.records_written.inc();
    }

    pub fn fault(&self, kind: &str) {
        self.faults.with_label_values(&[kind]).inc();
    }

    pub fn extraction_warning(&self) {
        self.extraction_warnings.inc();
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.get()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.get()
    }

    pub fn extraction_warnings(&self) -> u64 {
        self.extraction_warnings.get()
    }

    pub fn faults_of_kind(&self, kind: &str) -> u64 {
        self.faults.with_label_values(&[kind]).get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
