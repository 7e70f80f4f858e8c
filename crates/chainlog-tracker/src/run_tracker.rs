//! Run table and record assembly
//!
//! Children always attach to the current primary run (flat nesting). When
//! merging is on and the primary chain supports it, the primary's end emits
//! a single record carrying every child's fields; otherwise each run is
//! written on its own.

use chainlog_core::{FeedbackCollector, LoggerConfig};
use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chain_type::ChainType;
use crate::error::{ConfigExtractionWarning, Result, TrackerError};
use crate::extraction::{class_name, dotted_id, extract_config};
use crate::history::LogRecord;
use crate::run_record::{format_duration, RunRecord};

/// A run that reached its end or error callback.
#[derive(Debug, Clone)]
pub struct FinishedRun {
    /// State of the run as it was when it finished
    pub run: RunRecord,
    pub duration_secs: f64,
    /// None when the run is folded into its primary's record
    pub record: Option<LogRecord>,
}

/// Tracks runs of chain executions in the current process.
#[derive(Debug)]
pub struct RunTracker {
    config: LoggerConfig,
    runs: HashMap<Uuid, RunRecord>,
    primary_run_id: Option<Uuid>,
    active_runs: usize,
}

impl RunTracker {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            runs: HashMap::new(),
            primary_run_id: None,
            active_runs: 0,
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn primary_run_id(&self) -> Option<Uuid> {
        self.primary_run_id
    }

    pub fn run(&self, run_id: &Uuid) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Runs started but not yet ended or errored.
    pub fn active_runs(&self) -> usize {
        self.active_runs
    }

    /// Records still held in the run table.
    pub fn tracked_runs(&self) -> usize {
        self.runs.len()
    }

    /// Register a run and extract its configuration.
    ///
    /// Returns the extraction warning when chain-specific fields could not be
    /// read; the run is tracked with its common fields either way.
    #[allow(clippy::too_many_arguments)]
    pub fn start_run(
        &mut self,
        serialized: &Value,
        inputs: &Map<String, Value>,
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
        tags: &[String],
        metadata: &Map<String, Value>,
        now: DateTime<Local>,
    ) -> Result<(RunRecord, Option<ConfigExtractionWarning>)> {
        if self.runs.contains_key(&run_id) {
            return Err(TrackerError::DuplicateRunId(run_id));
        }

        let chain_type = ChainType::from_tag(class_name(serialized).unwrap_or("unknown"));
        if parent_run_id.is_none() {
            self.primary_run_id = Some(run_id);
        }
        let depth = match parent_run_id {
            None => 0,
            Some(parent) => self.runs.get(&parent).map(|p| p.depth + 1).unwrap_or(1),
        };

        let mut record = RunRecord::new(run_id, parent_run_id, depth, chain_type.clone(), now);
        self.populate_common_fields(&mut record, serialized, inputs, tags, metadata);

        let warning = match extract_config(&chain_type, serialized) {
            Ok(extracted) => {
                record.fields.extend(extracted.fields);
                record.additional_info.extend(extracted.additional_info);
                None
            }
            Err(warning) => {
                warn!(run_id = %run_id, %warning, "Logging common fields only");
                Some(warning)
            }
        };

        if parent_run_id.is_some() {
            match self.primary_run_id.and_then(|id| self.runs.get_mut(&id)) {
                Some(primary) => primary.push_child(run_id, &chain_type),
                None => warn!(run_id = %run_id, parent_run_id = ?parent_run_id, "Child run has no primary run"),
            }
        }

        self.runs.insert(run_id, record.clone());
        self.active_runs += 1;
        Ok((record, warning))
    }

    fn populate_common_fields(
        &self,
        record: &mut RunRecord,
        serialized: &Value,
        inputs: &Map<String, Value>,
        tags: &[String],
        metadata: &Map<String, Value>,
    ) {
        let run_id = record.run_id;
        record.set_field("start_time", Value::String(record.start_time_string()));
        record.set_field("run_id", Value::String(run_id.to_string()));

        if !self.config.combine_runs {
            record.set_field(
                "top_level_chain_run_id",
                self.primary_run_id
                    .map(|id| Value::String(id.to_string()))
                    .unwrap_or(Value::Null),
            );
            record.set_field(
                "is_top_level_chain",
                Value::Bool(self.primary_run_id == Some(run_id)),
            );
        }

        record.set_field(
            "template_variables",
            Value::Array(inputs.keys().cloned().map(Value::String).collect()),
        );
        for (name, value) in inputs {
            record.set_field(format!("{}_template_variable_value", name), value.clone());
        }

        let input = inputs.get(&self.config.input_keyword).cloned().unwrap_or_else(|| {
            warn!(
                run_id = %run_id,
                input_keyword = %self.config.input_keyword,
                "Input keyword not among chain inputs"
            );
            Value::Null
        });
        record.set_field("input", input);

        record.set_field("chain_type", Value::String(record.chain_type.tag().to_string()));
        record.set_field(
            "chain_type_long",
            dotted_id(serialized).map(Value::String).unwrap_or(Value::Null),
        );
        if record.is_primary {
            record.set_field("child_chains", Value::Array(Vec::new()));
        }

        if !tags.is_empty() {
            record.set_field(
                "tags",
                Value::Array(tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if !metadata.is_empty() {
            record.set_field("metadata", Value::Object(metadata.clone()));
        }

        if let Some(kind) = serialized.get("type") {
            record
                .additional_info
                .insert("chain_langchain_type".to_string(), kind.clone());
        }
    }

    /// Close a run that produced `outputs`.
    pub fn end_run(
        &mut self,
        outputs: &Map<String, Value>,
        run_id: Uuid,
        feedback: &dyn FeedbackCollector,
        now: DateTime<Local>,
    ) -> Result<FinishedRun> {
        let run = self
            .runs
            .get(&run_id)
            .cloned()
            .ok_or(TrackerError::RunNotFound(run_id))?;
        let duration_secs = run.elapsed_seconds(now);
        self.active_runs = self.active_runs.saturating_sub(1);

        let is_primary = self.primary_run_id == Some(run_id);
        let result = self.build_end_record(&run, outputs, feedback, duration_secs, is_primary);
        if is_primary {
            self.finish_primary(run_id);
        }

        Ok(FinishedRun {
            run,
            duration_secs,
            record: result?,
        })
    }

    fn build_end_record(
        &self,
        run: &RunRecord,
        outputs: &Map<String, Value>,
        feedback: &dyn FeedbackCollector,
        duration_secs: f64,
        is_primary: bool,
    ) -> Result<Option<LogRecord>> {
        let field = run
            .chain_type
            .output_field()
            .ok_or_else(|| TrackerError::UnknownChainType(run.chain_type.tag().to_string()))?;
        let response = outputs
            .get(field)
            .cloned()
            .ok_or_else(|| TrackerError::MissingOutputField {
                chain_type: run.chain_type.tag().to_string(),
                field: field.to_string(),
            })?;

        let merge_into_primary = self.config.combine_runs
            && self
                .primary_run_id
                .and_then(|id| self.runs.get(&id))
                .is_some_and(|primary| primary.chain_type.supports_merge());
        if merge_into_primary && !is_primary {
            debug!(run_id = %run.run_id, "Child run folded into primary record");
            return Ok(None);
        }

        let user_feedback = if is_primary {
            let text = match &response {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            feedback.collect(&text)
        } else {
            Default::default()
        };

        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String("chain".to_string()));
        fields.insert("response".to_string(), response);
        if let Some(rating) = user_feedback.rating {
            fields.insert("rating".to_string(), Value::String(rating));
        }
        if let Some(comments) = user_feedback.comments {
            fields.insert("comments".to_string(), Value::String(comments));
        }
        fields.insert(
            "duration_in_seconds".to_string(),
            Value::String(format_duration(duration_secs)),
        );
        fields.insert("error".to_string(), Value::String("False".to_string()));
        for (key, value) in &run.fields {
            fields.insert(key.clone(), value.clone());
        }

        if merge_into_primary {
            self.merge_children(&mut fields, run.run_id);
            return Ok(Some(LogRecord {
                run_id: run.run_id,
                fields,
                with_subset: true,
            }));
        }

        for (key, value) in &run.additional_info {
            fields.insert(key.clone(), value.clone());
        }
        Ok(Some(LogRecord {
            run_id: run.run_id,
            fields,
            with_subset: is_primary,
        }))
    }

    /// Close a run whose chain raised `error`. Always produces a record.
    pub fn fail_run(&mut self, error: &str, run_id: Uuid, now: DateTime<Local>) -> Result<FinishedRun> {
        let run = self
            .runs
            .get(&run_id)
            .cloned()
            .ok_or(TrackerError::RunNotFound(run_id))?;
        let duration_secs = run.elapsed_seconds(now);
        self.active_runs = self.active_runs.saturating_sub(1);

        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String("chain".to_string()));
        fields.insert(
            "primary_chain_id".to_string(),
            self.primary_run_id
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
        );
        for (key, value) in &run.fields {
            fields.insert(key.clone(), value.clone());
        }
        fields.insert("response".to_string(), Value::String(error.to_string()));
        fields.insert(
            "duration_in_seconds".to_string(),
            Value::String(format_duration(duration_secs)),
        );
        fields.insert("error".to_string(), Value::String("True".to_string()));

        if self.config.combine_runs {
            if let Some(primary_id) = self.primary_run_id {
                self.merge_children(&mut fields, primary_id);
            }
        }

        if self.primary_run_id == Some(run_id) {
            self.finish_primary(run_id);
        }

        Ok(FinishedRun {
            run,
            duration_secs,
            record: Some(LogRecord {
                run_id,
                fields,
                with_subset: true,
            }),
        })
    }

    /// Error row for a model call made inside the current chain execution.
    pub fn llm_error(
        &self,
        error: &str,
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
        now: DateTime<Local>,
    ) -> LogRecord {
        let primary = self.primary_run_id.and_then(|id| self.runs.get(&id));

        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String("llm".to_string()));
        fields.insert("run_id".to_string(), Value::String(run_id.to_string()));
        fields.insert(
            "parent_run_id".to_string(),
            parent_run_id
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
        );
        fields.insert(
            "primary_chain_id".to_string(),
            self.primary_run_id
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
        );
        fields.insert(
            "input".to_string(),
            primary
                .and_then(|p| p.fields.get("input").cloned())
                .unwrap_or(Value::Null),
        );
        fields.insert(
            "start_time".to_string(),
            primary
                .map(|p| Value::String(p.start_time_string()))
                .unwrap_or(Value::Null),
        );
        fields.insert("response".to_string(), Value::String(error.to_string()));
        fields.insert(
            "duration_in_seconds".to_string(),
            primary
                .map(|p| Value::String(format_duration(p.elapsed_seconds(now))))
                .unwrap_or(Value::Null),
        );
        fields.insert("error".to_string(), Value::String("True".to_string()));

        LogRecord {
            run_id,
            fields,
            with_subset: true,
        }
    }

    /// Add child fields the record does not already carry, in child arrival
    /// order, down to the configured depth.
    fn merge_children(&self, fields: &mut Map<String, Value>, primary_id: Uuid) {
        let Some(primary) = self.runs.get(&primary_id) else {
            return;
        };
        for child_id in &primary.children {
            let Some(child) = self.runs.get(child_id) else {
                continue;
            };
            if self.config.merge_depth.is_some_and(|limit| child.depth > limit) {
                continue;
            }
            for (key, value) in &child.fields {
                if !fields.contains_key(key) {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Drop the primary run and its children from the table.
    fn finish_primary(&mut self, primary_id: Uuid) {
        if let Some(primary) = self.runs.remove(&primary_id) {
            for child in &primary.children {
                self.runs.remove(child);
            }
        }
        if self.primary_run_id == Some(primary_id) {
            self.primary_run_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlog_core::{Feedback, NoFeedback};
    use chrono::Duration;
    use serde_json::json;

    struct FixedFeedback;

    impl FeedbackCollector for FixedFeedback {
        fn collect(&self, response: &str) -> Feedback {
            Feedback {
                rating: Some("5".to_string()),
                comments: Some(format!("liked '{}'", response)),
            }
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn llm_chain() -> Value {
        json!({
            "type": "constructor",
            "id": ["langchain", "chains", "llm", "LLMChain"],
            "kwargs": {
                "prompt": {"id": ["PromptTemplate"], "type": "constructor", "kwargs": {"template": "{question}"}},
                "llm": {"id": ["FakeLLM"], "type": "constructor", "kwargs": {"temperature": 0.2}}
            }
        })
    }

    fn retrieval_chain() -> Value {
        json!({
            "type": "not_implemented",
            "id": ["langchain", "chains", "conversational_retrieval", "base", "ConversationalRetrievalChain"],
            "repr": "ConversationalRetrievalChain(retriever=AmazonKendraRetriever(index_id='idx'))"
        })
    }

    fn start(tracker: &mut RunTracker, serialized: &Value, inputs: Value, run_id: Uuid, parent: Option<Uuid>) {
        tracker
            .start_run(serialized, &obj(inputs), run_id, parent, &[], &Map::new(), Local::now())
            .unwrap();
    }

    #[test]
    fn test_primary_llm_chain_record() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let run_id = Uuid::new_v4();
        start(&mut tracker, &llm_chain(), json!({"question": "What is 2+2?"}), run_id, None);
        assert_eq!(tracker.primary_run_id(), Some(run_id));
        assert_eq!(tracker.active_runs(), 1);

        let finished = tracker
            .end_run(&obj(json!({"text": "4"})), run_id, &FixedFeedback, Local::now())
            .unwrap();
        let record = finished.record.unwrap();
        assert!(record.with_subset);
        assert_eq!(record.get_str("response"), Some("4"));
        assert_eq!(record.get_str("error"), Some("False"));
        assert_eq!(record.get_str("rating"), Some("5"));
        assert_eq!(record.get_str("comments"), Some("liked '4'"));
        assert_eq!(record.get_str("question_template_variable_value"), Some("What is 2+2?"));
        assert_eq!(record.get("temperature"), Some(&json!(0.2)));
        assert_eq!(record.get_str("llm_type"), Some("FakeLLM"));
        assert_eq!(tracker.active_runs(), 0);
        assert_eq!(tracker.tracked_runs(), 0);
    }

    #[test]
    fn test_duplicate_run_id_rejected() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let run_id = Uuid::new_v4();
        start(&mut tracker, &llm_chain(), json!({"question": "q"}), run_id, None);
        let err = tracker
            .start_run(&llm_chain(), &Map::new(), run_id, None, &[], &Map::new(), Local::now())
            .unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateRunId(id) if id == run_id));
        assert_eq!(tracker.active_runs(), 1);
    }

    #[test]
    fn test_unknown_chain_type_at_end() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let run_id = Uuid::new_v4();
        let (record, warning) = tracker
            .start_run(
                &json!({"id": ["langchain", "chains", "SequentialChain"]}),
                &obj(json!({"question": "q"})),
                run_id,
                None,
                &[],
                &Map::new(),
                Local::now(),
            )
            .unwrap();
        assert!(warning.is_none());
        assert_eq!(record.fields["chain_type"], json!("SequentialChain"));

        let err = tracker
            .end_run(&obj(json!({"output": "x"})), run_id, &NoFeedback, Local::now())
            .unwrap_err();
        assert!(matches!(err, TrackerError::UnknownChainType(ref t) if t == "SequentialChain"));
        assert_eq!(tracker.tracked_runs(), 0);
    }

    #[test]
    fn test_missing_output_field() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let run_id = Uuid::new_v4();
        start(&mut tracker, &llm_chain(), json!({"question": "q"}), run_id, None);
        let err = tracker
            .end_run(&obj(json!({"answer": "x"})), run_id, &NoFeedback, Local::now())
            .unwrap_err();
        assert!(matches!(err, TrackerError::MissingOutputField { .. }));
    }

    #[test]
    fn test_end_of_unknown_run() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let run_id = Uuid::new_v4();
        assert!(matches!(
            tracker.end_run(&Map::new(), run_id, &NoFeedback, Local::now()),
            Err(TrackerError::RunNotFound(id)) if id == run_id
        ));
        assert!(matches!(
            tracker.fail_run("boom", run_id, Local::now()),
            Err(TrackerError::RunNotFound(_))
        ));
    }

    #[test]
    fn test_retrieval_chain_merges_children() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        start(&mut tracker, &retrieval_chain(), json!({"question": "q", "chat_history": []}), parent, None);
        start(&mut tracker, &llm_chain(), json!({"question": "standalone q"}), child, Some(parent));

        let child_end = tracker
            .end_run(&obj(json!({"text": "rephrased"})), child, &FixedFeedback, Local::now())
            .unwrap();
        assert!(child_end.record.is_none());

        let record = tracker
            .end_run(&obj(json!({"answer": "a"})), parent, &NoFeedback, Local::now())
            .unwrap()
            .record
            .unwrap();
        assert_eq!(record.get_str("run_id"), Some(parent.to_string().as_str()));
        assert_eq!(record.get_str("input"), Some("q"));
        assert_eq!(record.get_str("kendra_index_id"), Some("idx"));
        assert_eq!(record.get_str("prompt_template"), Some("{question}"));
        assert_eq!(record.get("child_chains"), Some(&json!(["LLMChain"])));
        assert!(!record.fields.contains_key("children_ids"));
        assert!(!record.fields.contains_key("chain_langchain_type"));
    }

    #[test]
    fn test_earlier_child_wins_merge_conflicts() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let parent = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        start(&mut tracker, &retrieval_chain(), json!({"question": "q"}), parent, None);
        start(&mut tracker, &llm_chain(), json!({"question": "q1", "context": "first"}), first, Some(parent));
        start(
            &mut tracker,
            &llm_chain(),
            json!({"question": "q2", "context": "second", "extra": "later only"}),
            second,
            Some(parent),
        );
        for child in [first, second] {
            tracker
                .end_run(&obj(json!({"text": "t"})), child, &NoFeedback, Local::now())
                .unwrap();
        }

        let record = tracker
            .end_run(&obj(json!({"answer": "a"})), parent, &NoFeedback, Local::now())
            .unwrap()
            .record
            .unwrap();
        assert_eq!(record.get_str("question_template_variable_value"), Some("q"));
        assert_eq!(record.get_str("context_template_variable_value"), Some("first"));
        assert_eq!(record.get_str("extra_template_variable_value"), Some("later only"));
    }

    #[test]
    fn test_non_merging_chain_logs_children_separately() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        start(&mut tracker, &llm_chain(), json!({"question": "q"}), parent, None);
        start(&mut tracker, &llm_chain(), json!({"question": "inner"}), child, Some(parent));

        let child_record = tracker
            .end_run(&obj(json!({"text": "c"})), child, &FixedFeedback, Local::now())
            .unwrap()
            .record
            .unwrap();
        assert!(!child_record.with_subset);
        assert!(child_record.get("rating").is_none());
        assert_eq!(child_record.get_str("chain_langchain_type"), Some("constructor"));

        let parent_record = tracker
            .end_run(&obj(json!({"text": "p"})), parent, &NoFeedback, Local::now())
            .unwrap()
            .record
            .unwrap();
        assert!(parent_record.with_subset);
        assert_eq!(parent_record.get_str("input"), Some("q"));
    }

    #[test]
    fn test_top_level_markers_without_combining() {
        let config = LoggerConfig::default().with_combine_runs(false);
        let mut tracker = RunTracker::new(config);
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        start(&mut tracker, &retrieval_chain(), json!({"question": "q"}), parent, None);
        start(&mut tracker, &llm_chain(), json!({"question": "q2"}), child, Some(parent));

        let child_run = tracker.run(&child).unwrap();
        assert_eq!(child_run.fields["is_top_level_chain"], json!(false));
        assert_eq!(child_run.fields["top_level_chain_run_id"], json!(parent.to_string()));
        assert_eq!(child_run.depth, 1);

        let child_record = tracker
            .end_run(&obj(json!({"text": "c"})), child, &NoFeedback, Local::now())
            .unwrap()
            .record;
        assert!(child_record.is_some());
    }

    #[test]
    fn test_merge_depth_limit() {
        let config = LoggerConfig::default().with_merge_depth(Some(1));
        let mut tracker = RunTracker::new(config);
        let root = Uuid::new_v4();
        let child = Uuid::new_v4();
        let grandchild = Uuid::new_v4();
        start(&mut tracker, &retrieval_chain(), json!({"question": "q"}), root, None);
        start(&mut tracker, &llm_chain(), json!({"question": "c", "only_child": 1}), child, Some(root));
        start(&mut tracker, &llm_chain(), json!({"question": "g", "only_grandchild": 2}), grandchild, Some(child));
        assert_eq!(tracker.run(&grandchild).unwrap().depth, 2);
        assert_eq!(tracker.run(&root).unwrap().children, vec![child, grandchild]);

        let record = tracker
            .end_run(&obj(json!({"answer": "a"})), root, &NoFeedback, Local::now())
            .unwrap()
            .record
            .unwrap();
        assert!(record.fields.contains_key("only_child_template_variable_value"));
        assert!(!record.fields.contains_key("only_grandchild_template_variable_value"));
    }

    #[test]
    fn test_error_record_merges_children_and_times_from_start() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        let started = Local::now();
        tracker
            .start_run(&llm_chain(), &obj(json!({"question": "q"})), parent, None, &[], &Map::new(), started)
            .unwrap();
        start(&mut tracker, &llm_chain(), json!({"question": "q", "extra": "x"}), child, Some(parent));

        let finished = tracker
            .fail_run("timeout", parent, started + Duration::seconds(3))
            .unwrap();
        assert_eq!(finished.duration_secs, 3.0);
        let record = finished.record.unwrap();
        assert!(record.is_error());
        assert!(record.with_subset);
        assert_eq!(record.get_str("response"), Some("timeout"));
        assert_eq!(record.get_str("duration_in_seconds"), Some("3.0"));
        assert_eq!(record.get_str("primary_chain_id"), Some(parent.to_string().as_str()));
        assert_eq!(record.get_str("extra_template_variable_value"), Some("x"));
        assert_eq!(tracker.tracked_runs(), 0);
    }

    #[test]
    fn test_tags_and_metadata_recorded() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let run_id = Uuid::new_v4();
        let (record, _) = tracker
            .start_run(
                &llm_chain(),
                &obj(json!({"question": "q"})),
                run_id,
                None,
                &["eval".to_string()],
                &obj(json!({"session": "s1"})),
                Local::now(),
            )
            .unwrap();
        assert_eq!(record.fields["tags"], json!(["eval"]));
        assert_eq!(record.fields["metadata"], json!({"session": "s1"}));
    }

    #[test]
    fn test_extraction_warning_keeps_common_fields() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let run_id = Uuid::new_v4();
        let (record, warning) = tracker
            .start_run(
                &json!({"id": ["LLMChain"], "type": "not_implemented", "repr": "LLMChain(...)"}),
                &obj(json!({"question": "q"})),
                run_id,
                None,
                &[],
                &Map::new(),
                Local::now(),
            )
            .unwrap();
        assert!(warning.is_some());
        assert_eq!(record.fields["input"], json!("q"));
        assert!(!record.fields.contains_key("prompt_template"));
    }

    #[test]
    fn test_llm_error_uses_primary_context() {
        let mut tracker = RunTracker::new(LoggerConfig::default());
        let parent = Uuid::new_v4();
        start(&mut tracker, &llm_chain(), json!({"question": "why?"}), parent, None);
        let llm_run = Uuid::new_v4();

        let record = tracker.llm_error("throttled", llm_run, Some(parent), Local::now());
        assert_eq!(record.get_str("type"), Some("llm"));
        assert_eq!(record.get_str("input"), Some("why?"));
        assert_eq!(record.get_str("primary_chain_id"), Some(parent.to_string().as_str()));
        assert!(record.is_error());
    }
}
