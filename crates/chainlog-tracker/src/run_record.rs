use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::chain_type::ChainType;

/// Timestamp format used in logged rows
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// State of one chain run between its start and end callbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run ID assigned by the engine
    pub run_id: Uuid,

    /// Enclosing run, if any
    pub parent_run_id: Option<Uuid>,

    /// True for the top-level run of a chain execution
    pub is_primary: bool,

    /// Levels below the primary run (0 for the primary)
    pub depth: usize,

    /// Resolved chain class
    pub chain_type: ChainType,

    /// Captured at run start
    pub start_time: DateTime<Local>,

    /// Fields logged with the run
    pub fields: Map<String, Value>,

    /// Fields logged only when the run is written on its own
    pub additional_info: Map<String, Value>,

    /// Child runs in arrival order (primary runs only)
    pub children: Vec<Uuid>,
}

impl RunRecord {
    pub fn new(
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
        depth: usize,
        chain_type: ChainType,
        start_time: DateTime<Local>,
    ) -> Self {
        Self {
            run_id,
            parent_run_id,
            is_primary: parent_run_id.is_none(),
            depth,
            chain_type,
            start_time,
            fields: Map::new(),
            additional_info: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn start_time_string(&self) -> String {
        self.start_time.format(START_TIME_FORMAT).to_string()
    }

    /// Seconds between run start and `now`, never negative.
    pub fn elapsed_seconds(&self, now: DateTime<Local>) -> f64 {
        let micros = (now - self.start_time).num_microseconds().unwrap_or(i64::MAX);
        micros.max(0) as f64 / 1_000_000.0
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Append a child's chain type to `child_chains`.
    pub fn push_child(&mut self, child: Uuid, chain_type: &ChainType) {
        self.children.push(child);
        match self.fields.get_mut("child_chains") {
            Some(Value::Array(chains)) => chains.push(Value::String(chain_type.tag().to_string())),
            _ => {
                self.fields.insert(
                    "child_chains".to_string(),
                    Value::Array(vec![Value::String(chain_type.tag().to_string())]),
                );
            }
        }
    }
}

/// Render seconds the way the store has always shown them (`0.0`, `1.25`).
pub fn format_duration(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{:.1}", seconds)
    } else {
        seconds.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_primary_flag_follows_parent() {
        let now = Local::now();
        let primary = RunRecord::new(Uuid::new_v4(), None, 0, ChainType::Llm, now);
        assert!(primary.is_primary);

        let child = RunRecord::new(Uuid::new_v4(), Some(primary.run_id), 1, ChainType::Llm, now);
        assert!(!child.is_primary);
    }

    #[test]
    fn test_elapsed_seconds() {
        let start = Local::now();
        let record = RunRecord::new(Uuid::new_v4(), None, 0, ChainType::Llm, start);
        assert_eq!(record.elapsed_seconds(start + Duration::milliseconds(1500)), 1.5);
        assert_eq!(record.elapsed_seconds(start - Duration::seconds(1)), 0.0);
    }

    #[test]
    fn test_push_child_tracks_chain_types() {
        let mut record = RunRecord::new(
            Uuid::new_v4(),
            None,
            0,
            ChainType::ConversationalRetrieval,
            Local::now(),
        );
        record.set_field("child_chains", json!([]));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        record.push_child(a, &ChainType::Llm);
        record.push_child(b, &ChainType::StuffDocuments);
        assert_eq!(record.children, vec![a, b]);
        assert_eq!(record.fields["child_chains"], json!(["LLMChain", "StuffDocumentsChain"]));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0.0");
        assert_eq!(format_duration(2.0), "2.0");
        assert_eq!(format_duration(0.25), "0.25");
    }
}
