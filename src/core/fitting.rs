//! Build type classification
//!
//! Decides which build system a manifest asks for. Evaluated in order, first
//! match wins:
//!
//! 1. the `build` property naming a type (or one of its keywords)
//! 2. the manifest `keywords` containing a type keyword
//! 3. a string-valued property named after a type
//!
//! Types are always tried in [`BuildType::ALL`] order.

use serde_json::Value;

use crate::core::spec::BuildType;
use crate::registry::Manifest;

/// Result of classifying a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub build_type: Option<BuildType>,
    /// The type's manifest property, when it is a path rather than inline config
    pub entry: Option<String>,
}

/// Classify a manifest
pub fn classify(manifest: &Manifest) -> Classification {
    let build_type = explicit(manifest)
        .or_else(|| by_keywords(manifest))
        .or_else(|| by_property(manifest));

    let entry = build_type
        .and_then(|t| manifest.get(t.as_str()))
        .and_then(Value::as_str)
        .map(str::to_string);

    Classification { build_type, entry }
}

fn explicit(manifest: &Manifest) -> Option<BuildType> {
    let wanted = manifest.get("build")?.as_str()?;
    BuildType::ALL
        .into_iter()
        .find(|t| t.as_str() == wanted)
        .or_else(|| {
            BuildType::ALL
                .into_iter()
                .find(|t| t.keywords().contains(&wanted))
        })
}

fn by_keywords(manifest: &Manifest) -> Option<BuildType> {
    let keywords: Vec<&str> = manifest
        .get("keywords")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();

    BuildType::ALL
        .into_iter()
        .find(|t| t.keywords().iter().any(|k| keywords.contains(k)))
}

fn by_property(manifest: &Manifest) -> Option<BuildType> {
    BuildType::ALL
        .into_iter()
        .find(|t| manifest.get(t.as_str()).is_some_and(Value::is_string))
}
