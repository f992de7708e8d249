//! Agent templates: the read-only blueprints sessions are minted from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::session::{SessionRecord, ToolGrant};
use super::{API_VERSION, KIND_AGENT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    #[serde(default)]
    pub description: String,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<ToolGrant>,
    /// May contain template markers; rendered once in the child environment.
    pub system_prompt: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub api_version: String,
    pub kind: String,
    pub metadata: TemplateMeta,
    pub spec: TemplateSpec,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl TemplateRecord {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND_AGENT.to_string(),
            metadata: TemplateMeta {
                name: name.into(),
                labels: BTreeMap::new(),
                extra: BTreeMap::new(),
            },
            spec: TemplateSpec {
                description: String::new(),
                model: model.into(),
                tools: Vec::new(),
                system_prompt: String::new(),
                extra: BTreeMap::new(),
            },
            extra: BTreeMap::new(),
        }
    }

    /// Instantiate a session from this template.
    pub fn instantiate(&self, id: u64, name: &str) -> SessionRecord {
        let mut record = SessionRecord::new(id, name, self.spec.model.clone());
        record.metadata.labels = self.metadata.labels.clone();
        record.spec.tools = self.spec.tools.clone();
        record.spec.system_prompt = self.spec.system_prompt.clone();
        record
    }
}
