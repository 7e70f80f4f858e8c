use chainlog_core::{FeedbackCollector, LoggerConfig, NoFeedback, TerminalFeedback};
use chainlog_store::LogTarget;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::error::{Result, TrackerError};
use crate::history::{LogHistory, LogRecord};
use crate::metrics::RunMetrics;
use crate::run_tracker::{FinishedRun, RunTracker};
use crate::telemetry::RunTelemetry;

/// Lifecycle notifications delivered by the chain engine.
///
/// Implementations must never fail the chain: every method returns `()`.
pub trait ChainCallbackHandler: Send + Sync {
    fn on_chain_start(
        &self,
        serialized: &Value,
        inputs: &Map<String, Value>,
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
        tags: &[String],
        metadata: &Map<String, Value>,
    );

    fn on_chain_end(&self, outputs: &Map<String, Value>, run_id: Uuid);

    fn on_chain_error(&self, error: &str, run_id: Uuid);

    fn on_llm_start(
        &self,
        _serialized: &Value,
        _prompts: &[String],
        _run_id: Uuid,
        _parent_run_id: Option<Uuid>,
    ) {
    }

    fn on_llm_error(&self, _error: &str, _run_id: Uuid, _parent_run_id: Option<Uuid>) {}
}

/// A failure inside the logger, kept for inspection instead of raised.
#[derive(Debug, Clone, Serialize)]
pub struct LoggerFault {
    pub run_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
    pub at: DateTime<Local>,
}

/// Callback handler that logs chain runs to the store.
pub struct ChainLogger {
    tracker: Mutex<RunTracker>,

    /// None when CSV output is disabled
    target: Option<LogTarget>,

    feedback: Box<dyn FeedbackCollector>,

    /// Recently produced records
    history: Mutex<LogHistory>,

    faults: Mutex<VecDeque<LoggerFault>>,
    max_faults: usize,

    metrics: Arc<RunMetrics>,
    telemetry: RunTelemetry,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChainLogger {
    /// Create a logger for `config`, asking the terminal for feedback when
    /// rating or comments are requested.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        let feedback: Box<dyn FeedbackCollector> = if config.wants_feedback() {
            Box::new(TerminalFeedback::stdio(
                config.request_rating,
                config.request_comments,
            ))
        } else {
            Box::new(NoFeedback)
        };

        let target = config.output_csv.then(|| {
            LogTarget::new(
                config.path.clone(),
                config.user_name.clone(),
                config.experiment_name.clone(),
            )
        });

        info!(
            user = %config.user_name,
            experiment = %config.experiment_name,
            path = %config.path.display(),
            combine_runs = config.combine_runs,
            output_csv = config.output_csv,
            "Chain logger initialized"
        );

        Ok(Self {
            history: Mutex::new(LogHistory::new(config.history_size)),
            faults: Mutex::new(VecDeque::new()),
            max_faults: config.max_faults,
            tracker: Mutex::new(RunTracker::new(config)),
            target,
            feedback,
            metrics: Arc::new(RunMetrics::new()?),
            telemetry: RunTelemetry::default(),
        })
    }

    /// Replace the feedback source.
    pub fn with_feedback(mut self, feedback: impl FeedbackCollector + 'static) -> Self {
        self.feedback = Box::new(feedback);
        self
    }

    /// Share a metrics collector with other components.
    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[instrument(skip(self, serialized, inputs, tags, metadata), fields(run_id = %run_id))]
    pub fn try_chain_start(
        &self,
        serialized: &Value,
        inputs: &Map<String, Value>,
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
        tags: &[String],
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        let mut tracker = lock(&self.tracker);
        let (record, warning) = tracker.start_run(
            serialized,
            inputs,
            run_id,
            parent_run_id,
            tags,
            metadata,
            Local::now(),
        )?;

        self.metrics.run_started();
        self.metrics.set_active_runs(tracker.active_runs());
        if warning.is_some() {
            self.metrics.extraction_warning();
        }
        self.telemetry.start_run_span(&record);
        Ok(())
    }

    /// Close a run; returns the record written for it, if any.
    #[instrument(skip(self, outputs), fields(run_id = %run_id))]
    pub fn try_chain_end(
        &self,
        outputs: &Map<String, Value>,
        run_id: Uuid,
    ) -> Result<Option<LogRecord>> {
        let finished = {
            let mut tracker = lock(&self.tracker);
            let result = tracker.end_run(outputs, run_id, self.feedback.as_ref(), Local::now());
            self.metrics.set_active_runs(tracker.active_runs());
            result?
        };

        self.metrics.run_finished(finished.duration_secs);
        self.telemetry
            .end_run_span(&finished.run, finished.duration_secs, None);
        self.emit(finished)
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    pub fn try_chain_error(&self, error: &str, run_id: Uuid) -> Result<Option<LogRecord>> {
        let finished = {
            let mut tracker = lock(&self.tracker);
            let result = tracker.fail_run(error, run_id, Local::now());
            self.metrics.set_active_runs(tracker.active_runs());
            result?
        };

        self.metrics.run_failed(finished.duration_secs);
        self.telemetry
            .end_run_span(&finished.run, finished.duration_secs, Some(error));
        self.emit(finished)
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    pub fn try_llm_error(
        &self,
        error: &str,
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
    ) -> Result<LogRecord> {
        let record = lock(&self.tracker).llm_error(error, run_id, parent_run_id, Local::now());
        self.telemetry
            .record_event(&run_id.to_string(), "llm_error", error);
        self.persist(&record)?;
        Ok(record)
    }

    fn emit(&self, finished: FinishedRun) -> Result<Option<LogRecord>> {
        match finished.record {
            Some(record) => {
                self.persist(&record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Hand a record to history and, when enabled, to the store.
    fn persist(&self, record: &LogRecord) -> Result<()> {
        lock(&self.history).push(record.clone());
        if let Some(target) = &self.target {
            target.write(&record.fields, record.with_subset)?;
            self.metrics.record_written();
        }
        Ok(())
    }

    fn report(&self, run_id: Option<Uuid>, err: &TrackerError) {
        let kind = err.kind();
        error!(run_id = ?run_id, kind, error = %err, "Chain logger fault");
        self.metrics.fault(kind);

        if self.max_faults == 0 {
            return;
        }
        let mut faults = lock(&self.faults);
        while faults.len() >= self.max_faults {
            faults.pop_front();
        }
        faults.push_back(LoggerFault {
            run_id,
            kind: kind.to_string(),
            message: err.to_string(),
            at: Local::now(),
        });
    }

    /// Records produced so far, oldest first.
    pub fn history(&self) -> Vec<LogRecord> {
        lock(&self.history).records()
    }

    /// Responses-only views of the primary records in history.
    pub fn responses(&self) -> Vec<Map<String, Value>> {
        lock(&self.history).responses()
    }

    pub fn faults(&self) -> Vec<LoggerFault> {
        lock(&self.faults).iter().cloned().collect()
    }

    pub fn active_runs(&self) -> usize {
        lock(&self.tracker).active_runs()
    }

    pub fn metrics(&self) -> Arc<RunMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn target(&self) -> Option<&LogTarget> {
        self.target.as_ref()
    }
}

impl ChainCallbackHandler for ChainLogger {
    fn on_chain_start(
        &self,
        serialized: &Value,
        inputs: &Map<String, Value>,
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
        tags: &[String],
        metadata: &Map<String, Value>,
    ) {
        if let Err(e) = self.try_chain_start(serialized, inputs, run_id, parent_run_id, tags, metadata) {
            self.report(Some(run_id), &e);
        }
    }

    fn on_chain_end(&self, outputs: &Map<String, Value>, run_id: Uuid) {
        if let Err(e) = self.try_chain_end(outputs, run_id) {
            self.report(Some(run_id), &e);
        }
    }

    fn on_chain_error(&self, error: &str, run_id: Uuid) {
        if let Err(e) = self.try_chain_error(error, run_id) {
            self.report(Some(run_id), &e);
        }
    }

    fn on_llm_start(
        &self,
        serialized: &Value,
        prompts: &[String],
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
    ) {
        let model = serialized
            .get("id")
            .and_then(Value::as_array)
            .and_then(|id| id.last())
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(
            run_id = %run_id,
            parent_run_id = ?parent_run_id,
            model,
            prompts = prompts.len(),
            "LLM call started"
        );
    }

    fn on_llm_error(&self, error: &str, run_id: Uuid, parent_run_id: Option<Uuid>) {
        if let Err(e) = self.try_llm_error(error, run_id, parent_run_id) {
            self.report(Some(run_id), &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn llm_chain() -> Value {
        json!({
            "type": "constructor",
            "id": ["langchain", "chains", "llm", "LLMChain"],
            "kwargs": {
                "prompt": {"id": ["PromptTemplate"], "kwargs": {"template": "{question}"}},
                "llm": {"id": ["FakeLLM"], "kwargs": {}}
            }
        })
    }

    #[test]
    fn test_run_not_found_becomes_fault() {
        let logger = ChainLogger::new(LoggerConfig::default().with_output_csv(false)).unwrap();
        let run_id = Uuid::new_v4();
        logger.on_chain_end(&obj(json!({"text": "x"})), run_id);

        let faults = logger.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, "run_not_found");
        assert_eq!(faults[0].run_id, Some(run_id));
        assert_eq!(logger.metrics().faults_of_kind("run_not_found"), 1);
    }

    #[test]
    fn test_no_csv_keeps_history_only() {
        let dir = TempDir::new().unwrap();
        let config = LoggerConfig::default()
            .with_path(dir.path())
            .with_output_csv(false);
        let logger = ChainLogger::new(config).unwrap();
        assert!(logger.target().is_none());

        let run_id = Uuid::new_v4();
        logger.on_chain_start(&llm_chain(), &obj(json!({"question": "q"})), run_id, None, &[], &Map::new());
        assert_eq!(logger.active_runs(), 1);
        logger.on_chain_end(&obj(json!({"text": "a"})), run_id);

        assert_eq!(logger.active_runs(), 0);
        assert_eq!(logger.history().len(), 1);
        assert_eq!(logger.responses()[0]["response"], json!("a"));
        assert_eq!(logger.metrics().records_written(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_fault_list_is_bounded() {
        let mut config = LoggerConfig::default().with_output_csv(false);
        config.max_faults = 2;
        let logger = ChainLogger::new(config).unwrap();
        for _ in 0..3 {
            logger.on_chain_error("boom", Uuid::new_v4());
        }
        assert_eq!(logger.faults().len(), 2);
        assert_eq!(logger.metrics().faults_of_kind("run_not_found"), 3);
    }

    #[test]
    fn test_extraction_warning_is_counted() {
        let logger = ChainLogger::new(LoggerConfig::default().with_output_csv(false)).unwrap();
        let run_id = Uuid::new_v4();
        logger.on_chain_start(
            &json!({"id": ["LLMChain"], "type": "not_implemented", "repr": "LLMChain(...)"}),
            &obj(json!({"question": "q"})),
            run_id,
            None,
            &[],
            &Map::new(),
        );
        assert_eq!(logger.metrics().extraction_warnings(), 1);
        assert!(logger.faults().is_empty());

        logger.on_chain_start(&llm_chain(), &obj(json!({"question": "q"})), Uuid::new_v4(), None, &[], &Map::new());
        assert_eq!(logger.metrics().extraction_warnings(), 1);
    }
}
