//! Recorded chain lifecycle events, one JSON object per line

use anyhow::{Context, Result};
use chainlog_tracker::ChainCallbackHandler;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    ChainStart {
        serialized: Value,
        #[serde(default)]
        inputs: Map<String, Value>,
        run_id: Uuid,
        #[serde(default)]
        parent_run_id: Option<Uuid>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    ChainEnd {
        #[serde(default)]
        outputs: Map<String, Value>,
        run_id: Uuid,
    },
    ChainError {
        error: String,
        run_id: Uuid,
    },
    LlmStart {
        #[serde(default)]
        serialized: Value,
        #[serde(default)]
        prompts: Vec<String>,
        run_id: Uuid,
        #[serde(default)]
        parent_run_id: Option<Uuid>,
    },
    LlmError {
        error: String,
        run_id: Uuid,
        #[serde(default)]
        parent_run_id: Option<Uuid>,
    },
}

impl ChainEvent {
    /// Deliver the event to `handler`.
    pub fn dispatch(&self, handler: &dyn ChainCallbackHandler) {
        match self {
            ChainEvent::ChainStart {
                serialized,
                inputs,
                run_id,
                parent_run_id,
                tags,
                metadata,
            } => handler.on_chain_start(serialized, inputs, *run_id, *parent_run_id, tags, metadata),
            ChainEvent::ChainEnd { outputs, run_id } => handler.on_chain_end(outputs, *run_id),
            ChainEvent::ChainError { error, run_id } => handler.on_chain_error(error, *run_id),
            ChainEvent::LlmStart {
                serialized,
                prompts,
                run_id,
                parent_run_id,
            } => handler.on_llm_start(serialized, prompts, *run_id, *parent_run_id),
            ChainEvent::LlmError {
                error,
                run_id,
                parent_run_id,
            } => handler.on_llm_error(error, *run_id, *parent_run_id),
        }
    }
}

/// Parse an event log. Blank lines and `#` comments are skipped.
pub fn parse_events(content: &str) -> Result<Vec<ChainEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", index + 1))
        })
        .collect()
}
