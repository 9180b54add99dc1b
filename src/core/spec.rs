//! Build specifications
//!
//! A [`BuildSpec`] is compiled once per publish event and then only read.
//! [`DispatchRecord`] is the per-locale message workers consume from the
//! build topic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::infra::storage::encode_uri_component;

/// Build system a package is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Browserify,
    Webpack,
    Es6,
    Npm,
}

impl BuildType {
    /// Every build type, in classification order
    pub const ALL: [Self; 4] = [Self::Browserify, Self::Webpack, Self::Es6, Self::Npm];

    /// Type name, also the manifest property holding its entry
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browserify => "browserify",
            Self::Webpack => "webpack",
            Self::Es6 => "es6",
            Self::Npm => "npm",
        }
    }

    /// Keywords that classify a package as this type
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Browserify => &["browserify"],
            Self::Webpack => &["webpack"],
            Self::Es6 => &["es2017", "es2016", "es2015", "es6"],
            Self::Npm => &["npm"],
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown build type '{s}'"))
    }
}

/// Normalized build environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Dev,
    Test,
    Prod,
}

impl Env {
    /// Map a raw environment name; unknown or missing names are `dev`
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some("production" | "latest" | "prod") => Self::Prod,
            Some("staging" | "test") => Self::Test,
            _ => Self::Dev,
        }
    }

    /// Partition key
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }

    /// Whether dependencies install in production mode
    pub fn is_production(self) -> bool {
        self == Self::Prod
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized description of one build unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub name: String,
    pub version: String,
    pub env: Env,
    /// `None` means no build system could be determined
    #[serde(rename = "type")]
    pub build_type: Option<BuildType>,
    /// `false` only when the manifest opts out with `build: false`
    pub build: bool,
    /// Entry file, when the type's manifest property is a path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    pub locales: Vec<String>,
    pub promote: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
}

impl BuildSpec {
    /// Whether the pipeline should run at all
    pub fn requires_build(&self) -> bool {
        self.build && self.build_type.is_some()
    }

    /// Failure tally key, `name!env!version`
    pub fn key(&self) -> String {
        format!("{}!{}!{}", self.name, self.env, self.version)
    }

    /// Attachment name of the published tarball
    pub fn attachment_name(&self) -> String {
        format!("{}-{}.tgz", self.name, self.version)
    }

    /// Object storage key of the repacked tarball
    pub fn tarball_name(&self) -> String {
        format!("{}-{}.tgz", encode_uri_component(&self.name), self.version)
    }

    /// Stem of the per-attempt working paths
    pub fn path_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            encode_uri_component(&self.name),
            self.version,
            self.env
        )
    }

    /// Dispatch record for one locale
    pub fn record(&self, locale: &str) -> DispatchRecord {
        DispatchRecord {
            name: self.name.clone(),
            env: self.env.as_str().to_string(),
            version: self.version.clone(),
            locale: locale.to_string(),
            build_type: self.build_type.map(|t| t.as_str().to_string()),
            promote: Some(self.promote),
        }
    }
}

/// One locale-scoped build job on the build topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub name: String,
    pub env: String,
    pub version: String,
    pub locale: String,
    #[serde(rename = "type")]
    pub build_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promote: Option<bool>,
}

impl DispatchRecord {
    /// Failure tally key, `name!env!version`
    pub fn key(&self) -> String {
        format!("{}!{}!{}", self.name, self.env, self.version)
    }
}
