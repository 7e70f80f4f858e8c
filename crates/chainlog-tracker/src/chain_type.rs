use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain classes the logger knows how to describe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainType {
    ConversationalRetrieval,
    Llm,
    StuffDocuments,
    Conversation,
    /// Any other chain class; logged with common fields only
    Unrecognized(String),
}

impl ChainType {
    /// Resolve the class name reported by the engine (last element of the
    /// serialized id).
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ConversationalRetrievalChain" => ChainType::ConversationalRetrieval,
            "LLMChain" => ChainType::Llm,
            "StuffDocumentsChain" => ChainType::StuffDocuments,
            "ConversationChain" => ChainType::Conversation,
            other => ChainType::Unrecognized(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ChainType::ConversationalRetrieval => "ConversationalRetrievalChain",
            ChainType::Llm => "LLMChain",
            ChainType::StuffDocuments => "StuffDocumentsChain",
            ChainType::Conversation => "ConversationChain",
            ChainType::Unrecognized(tag) => tag,
        }
    }

    /// Output key holding the chain's response text.
    pub fn output_field(&self) -> Option<&'static str> {
        match self {
            ChainType::ConversationalRetrieval => Some("answer"),
            ChainType::Llm => Some("text"),
            ChainType::StuffDocuments => Some("output_text"),
            ChainType::Conversation => Some("response"),
            ChainType::Unrecognized(_) => None,
        }
    }

    /// Whether child runs are folded into this chain's primary record.
    pub fn supports_merge(&self) -> bool {
        matches!(self, ChainType::ConversationalRetrieval)
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}
