//! Core types and utilities for chainlog
//!
//! # Modules
//!
//! - `config`: Logger configuration and environment loading
//! - `error`: Error types and Result alias
//! - `feedback`: Operator rating/comments collection
//! - `identity`: User identity resolution for store file names

pub mod config;
pub mod error;
pub mod feedback;
pub mod identity;

// Re-exports
pub use config::LoggerConfig;
pub use error::{Error, Result};
pub use feedback::{Feedback, FeedbackCollector, NoFeedback, PromptFeedback, TerminalFeedback};
pub use identity::{IdentityProvider, NotebookIdentity, StaticIdentity};
