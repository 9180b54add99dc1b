//! npm publish payloads
//!
//! The document a registry receives on `npm publish`: the full version map,
//! the dist-tags and the base64 tarball attachments.

use serde::Deserialize;
use std::collections::HashMap;

use crate::core::spec::BuildSpec;
use crate::error::SpecError;
use crate::registry::Manifest;

/// Publish payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishPayload {
    #[serde(default)]
    pub name: Option<String>,

    /// Either spelling is accepted; `distTags` wins when both are present
    #[serde(default, rename = "distTags")]
    pub dist_tags_camel: Option<HashMap<String, String>>,

    #[serde(default, rename = "dist-tags")]
    pub dist_tags: Option<HashMap<String, String>>,

    #[serde(default)]
    pub versions: HashMap<String, serde_json::Value>,

    #[serde(default, rename = "_attachments")]
    pub attachments: HashMap<String, Attachment>,

    /// Raw environment name
    #[serde(default)]
    pub env: Option<String>,
}

/// One tarball attachment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub data: Option<String>,
}

/// Input of one orchestrator build
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub promote: bool,
    pub payload: PublishPayload,
}

impl PublishPayload {
    /// Parse a payload from JSON
    pub fn from_json(input: &str) -> Result<Self, SpecError> {
        serde_json::from_str(input).map_err(|e| SpecError::Malformed {
            error: e.to_string(),
        })
    }

    /// Version `dist-tags.latest` points to
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags_camel
            .as_ref()
            .or(self.dist_tags.as_ref())
            .and_then(|tags| tags.get("latest"))
            .map(String::as_str)
    }

    /// Manifest of the latest version
    pub fn manifest(&self) -> Result<&Manifest, SpecError> {
        match &self.name {
            Some(name) if !name.is_empty() => {}
            _ => {
                return Err(SpecError::MissingField {
                    field: "name".to_string(),
                })
            }
        }

        let latest = self.latest().ok_or_else(|| SpecError::MissingField {
            field: "dist-tags.latest".to_string(),
        })?;

        self.versions
            .get(latest)
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| SpecError::MissingVersion {
                name: self.name.clone().unwrap_or_default(),
                version: latest.to_string(),
            })
    }

    /// Base64 tarball content for `spec`, empty when not attached
    pub fn content(&self, spec: &BuildSpec) -> &str {
        self.attachments
            .get(&spec.attachment_name())
            .and_then(|a| a.data.as_deref())
            .unwrap_or_default()
    }
}
