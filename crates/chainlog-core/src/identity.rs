//! User identity for store file names
//!
//! Hosted notebook environments publish the signed-in user profile in a
//! metadata file. Anything else falls back to a fixed name.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Metadata file written by hosted notebook environments
pub const NOTEBOOK_METADATA_PATH: &str = "/opt/ml/metadata/resource-metadata.json";

/// Name returned when no identity can be resolved
pub const FALLBACK_USER: &str = "unknown_user";

/// Resolves the name of the user running the chains.
pub trait IdentityProvider: Send + Sync {
    /// Never fails: implementations return a fallback name instead.
    fn resolve(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct ResourceMetadata {
    #[serde(rename = "UserProfileName")]
    user_profile_name: String,
}

/// Reads the user profile name from a notebook metadata file.
#[derive(Debug, Clone)]
pub struct NotebookIdentity {
    metadata_path: PathBuf,
}

impl NotebookIdentity {
    pub fn new() -> Self {
        Self::with_path(NOTEBOOK_METADATA_PATH)
    }

    pub fn with_path(metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            metadata_path: metadata_path.into(),
        }
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    fn read_profile_name(&self) -> Result<String> {
        let content = std::fs::read_to_string(&self.metadata_path)?;
        let metadata: ResourceMetadata = serde_json::from_str(&content)?;
        if metadata.user_profile_name.trim().is_empty() {
            return Err(Error::identity("UserProfileName is empty"));
        }
        Ok(metadata.user_profile_name)
    }
}

impl Default for NotebookIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for NotebookIdentity {
    fn resolve(&self) -> String {
        match self.read_profile_name() {
            Ok(name) => {
                info!(user = %name, "Resolved notebook user profile");
                name
            }
            Err(e) => {
                debug!(
                    path = %self.metadata_path.display(),
                    error = %e,
                    "No notebook identity, using fallback user"
                );
                FALLBACK_USER.to_string()
            }
        }
    }
}

/// Always returns the same name.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub String);

impl IdentityProvider for StaticIdentity {
    fn resolve(&self) -> String {
        self.0.clone()
    }
}
