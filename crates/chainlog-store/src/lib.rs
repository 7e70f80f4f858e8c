//! chainlog store - Schema-evolving CSV persistence for chain records
//!
//! Provides append-only flat files whose column set grows with the records:
//! - Nested values flattened to dotted column names
//! - Full rewrite on every append, never dropping rows or columns
//! - Paired full-fidelity and responses-only files per logging target

pub mod error;
pub mod flatten;
pub mod log_target;
pub mod tabular;

pub use error::{Result, StoreError};
pub use flatten::{flatten_record, render_cell};
pub use log_target::{responses_subset, LogTarget};
pub use tabular::{read_table, AppendOutcome, TabularWriter, Table};
