//! chainlog tracker - Chain run tracking layer
//!
//! Turns chain lifecycle callbacks into logged records:
//! - Run table keyed by run id, with child runs attached to their primary
//! - Chain configuration extraction from serialized chain descriptions
//! - Optional merging of child records into the primary record
//! - Fault capture so logging never fails the chain itself

pub mod callback;
pub mod chain_type;
pub mod error;
pub mod extraction;
pub mod history;
pub mod metrics;
pub mod repr_parser;
pub mod run_record;
pub mod run_tracker;
pub mod telemetry;

pub use callback::{ChainCallbackHandler, ChainLogger, LoggerFault};
pub use chain_type::ChainType;
pub use error::{ConfigExtractionWarning, Result, TrackerError};
pub use extraction::{extract_config, Extracted};
pub use history::{LogHistory, LogRecord};
pub use metrics::RunMetrics;
pub use run_record::RunRecord;
pub use run_tracker::{FinishedRun, RunTracker};
pub use telemetry::RunTelemetry;
