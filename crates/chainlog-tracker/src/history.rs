//! Bounded in-memory history of logged records

use chainlog_store::responses_subset;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use uuid::Uuid;

/// One flattened execution (or merged group of executions) ready to store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Run the record was produced for
    pub run_id: Uuid,
    /// Column name to value
    pub fields: Map<String, Value>,
    /// Also write the responses-only view
    pub with_subset: bool,
}

impl LogRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// `get` for string-valued fields.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.get_str("error") == Some("True")
    }
}

/// Most recent records, oldest dropped first.
#[derive(Debug, Clone)]
pub struct LogHistory {
    records: VecDeque<LogRecord>,
    max_history: usize,
}

impl LogHistory {
    pub fn new(max_history: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(max_history.min(1024)),
            max_history,
        }
    }

    pub fn push(&mut self, record: LogRecord) {
        if self.max_history == 0 {
            return;
        }
        while self.records.len() >= self.max_history {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.iter().cloned().collect()
    }

    /// Responses-only views of the records that carry one.
    pub fn responses(&self) -> Vec<Map<String, Value>> {
        self.records
            .iter()
            .filter(|r| r.with_subset)
            .map(|r| responses_subset(&r.fields))
            .collect()
    }
}
