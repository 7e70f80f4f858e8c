//! Chain configuration extraction
//!
//! Reads the prompt, model and retriever settings out of the engine's
//! serialized chain description. Structured `kwargs` are read first; the
//! printable `repr` is only a fallback.

use serde_json::{Map, Value};

use crate::chain_type::ChainType;
use crate::error::ConfigExtractionWarning;
use crate::repr_parser::{parse_repr_kwargs, parse_retriever};

const KENDRA_RETRIEVER: &str = "AmazonKendraRetriever";
const VECTOR_STORE_RETRIEVER: &str = "VectorStoreRetriever";

/// Fields read from a chain description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    /// Logged with every record of the run
    pub fields: Map<String, Value>,
    /// Logged only when the run is written on its own
    pub additional_info: Map<String, Value>,
}

/// Extract the chain-type-specific configuration.
///
/// Unrecognized chain types yield nothing and never fail.
pub fn extract_config(
    chain_type: &ChainType,
    serialized: &Value,
) -> Result<Extracted, ConfigExtractionWarning> {
    let result = match chain_type {
        ChainType::Llm | ChainType::Conversation => extract_llm_chain(serialized),
        ChainType::StuffDocuments => match serialized.pointer("/kwargs/llm_chain") {
            Some(llm_chain) => extract_llm_chain(llm_chain),
            None => Ok(Extracted::default()),
        },
        ChainType::ConversationalRetrieval => extract_retriever(serialized),
        ChainType::Unrecognized(_) => Ok(Extracted::default()),
    };
    result.map_err(|reason| ConfigExtractionWarning {
        chain_type: chain_type.tag().to_string(),
        reason,
    })
}

/// `["langchain", "llms", "bedrock", "Bedrock"]` → `langchain.llms.bedrock.Bedrock`
pub fn dotted_id(serialized: &Value) -> Option<String> {
    let parts: Vec<&str> = serialized
        .get("id")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

/// Last element of the serialized id, i.e. the class name.
pub fn class_name(serialized: &Value) -> Option<&str> {
    serialized.get("id")?.as_array()?.last()?.as_str()
}

fn is_secret(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("secret")
}

fn copy_descriptor(info: &mut Map<String, Value>, prefix: &str, component: &Value) {
    if let Some(id) = dotted_id(component) {
        info.insert(format!("{}_type", prefix), Value::String(id));
    }
    if let Some(kind) = component.get("type") {
        info.insert(format!("{}_langchain_type", prefix), kind.clone());
    }
}

fn extract_llm_chain(serialized: &Value) -> Result<Extracted, String> {
    let kwargs = serialized
        .get("kwargs")
        .ok_or_else(|| "chain has no structured kwargs".to_string())?;
    let prompt = kwargs
        .get("prompt")
        .ok_or_else(|| "chain has no prompt".to_string())?;
    let template = prompt
        .pointer("/kwargs/template")
        .and_then(Value::as_str)
        .ok_or_else(|| "prompt has no template".to_string())?;
    let llm = kwargs
        .get("llm")
        .ok_or_else(|| "chain has no llm".to_string())?;

    let mut extracted = Extracted::default();
    extracted
        .fields
        .insert("prompt_template".to_string(), Value::String(template.to_string()));

    if let Some(llm_kwargs) = llm.get("kwargs").and_then(Value::as_object) {
        for (key, value) in llm_kwargs {
            if is_secret(value) {
                continue;
            }
            extracted.fields.insert(key.clone(), value.clone());
        }
    } else if let Some(repr) = llm.get("repr").and_then(Value::as_str) {
        let parsed = parse_repr_kwargs(repr)
            .ok_or_else(|| format!("llm repr could not be parsed: {}", repr))?;
        extracted.fields.extend(parsed.to_fields());
    } else {
        return Err("llm has neither kwargs nor repr".to_string());
    }

    copy_descriptor(&mut extracted.additional_info, "prompt", prompt);
    copy_descriptor(&mut extracted.additional_info, "llm", llm);
    Ok(extracted)
}

struct RetrieverInfo {
    name: String,
    index_id: Option<String>,
    tags: Option<Vec<String>>,
}

fn structured_retriever(serialized: &Value) -> Option<RetrieverInfo> {
    let retriever = serialized.pointer("/kwargs/retriever")?;
    let name = class_name(retriever)?.to_string();
    let index_id = retriever
        .pointer("/kwargs/index_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let tags = retriever
        .pointer("/kwargs/tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        });
    Some(RetrieverInfo {
        name,
        index_id,
        tags,
    })
}

fn repr_retriever(serialized: &Value) -> Option<RetrieverInfo> {
    let repr = serialized.get("repr")?.as_str()?;
    let parsed = parse_retriever(repr)?;
    Some(RetrieverInfo {
        name: parsed.name,
        index_id: parsed.index_id,
        tags: parsed.tags,
    })
}

fn extract_retriever(serialized: &Value) -> Result<Extracted, String> {
    let info = structured_retriever(serialized)
        .or_else(|| repr_retriever(serialized))
        .ok_or_else(|| "no retriever found in chain description".to_string())?;

    let mut extracted = Extracted::default();
    let fields = &mut extracted.fields;
    fields.insert("retriever".to_string(), Value::String(info.name.clone()));

    if info.name.contains(KENDRA_RETRIEVER) {
        fields.insert(
            "kendra_index_id".to_string(),
            info.index_id.map(Value::String).unwrap_or(Value::Null),
        );
    }
    if info.name.contains(VECTOR_STORE_RETRIEVER) {
        if let Some(tags) = info.tags {
            let printed: Vec<String> = tags.iter().map(|t| format!("'{}'", t)).collect();
            fields.insert(
                "retriever_db_and_embeddings".to_string(),
                Value::String(printed.join(", ")),
            );
            if let Some(db) = tags.first() {
                fields.insert("retriever_db".to_string(), Value::String(db.clone()));
            }
            if let Some(embeddings) = tags.get(1) {
                fields.insert(
                    "retriever_embeddings".to_string(),
                    Value::String(embeddings.clone()),
                );
            }
        }
    }

    extracted
        .additional_info
        .insert("retriever".to_string(), Value::String(info.name));
    Ok(extracted)
}
