//! Wire types for the Ollama HTTP API

use serde::{Deserialize, Serialize};

/// A single model reported by the Ollama `/api/tags` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name, e.g. `llama3.2:latest`
    pub name: String,

    /// On-disk size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    /// Last modification timestamp as reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,

    /// Fields the server adds that we do not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response body of the Ollama `/api/tags` endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelList {
    /// Installed models
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl ModelList {
    /// Number of installed models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the server has no models installed.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model names in server order.
    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }
}
