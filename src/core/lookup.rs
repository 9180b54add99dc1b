//! Catch-up lookup
//!
//! Compares the per-locale build heads of one package and environment
//! against the newest version any locale reached.

use semver::Version;

use crate::core::spec::DispatchRecord;
use crate::registry::{BuildHead, CachedPackage};

/// Build heads of one package in one environment
#[derive(Debug, Clone)]
pub struct Lookup {
    package: CachedPackage,
    heads: Vec<BuildHead>,
    latest: Version,
}

impl Lookup {
    /// Heads with unparsable versions never count towards the latest version
    pub fn new(package: CachedPackage, heads: Vec<BuildHead>) -> Self {
        let latest = heads
            .iter()
            .filter_map(|head| parse(head))
            .max_by(Version::cmp_precedence)
            .unwrap_or_else(|| Version::new(0, 0, 0));

        Self {
            package,
            heads,
            latest,
        }
    }

    pub fn package(&self) -> &CachedPackage {
        &self.package
    }

    pub fn heads(&self) -> &[BuildHead] {
        &self.heads
    }

    /// Newest version across all heads; build metadata is ignored
    pub fn latest(&self) -> &Version {
        &self.latest
    }

    /// A record for every locale behind the latest version
    pub fn missing(&self) -> Vec<DispatchRecord> {
        self.heads
            .iter()
            .filter(|head| {
                parse(head).is_some_and(|v| v.cmp_precedence(&self.latest).is_lt())
            })
            .map(|head| DispatchRecord {
                name: head.name.clone(),
                env: head.env.clone(),
                version: self.latest.to_string(),
                locale: head.locale.clone(),
                build_type: self.package.build_type.clone(),
                promote: None,
            })
            .collect()
    }
}

fn parse(head: &BuildHead) -> Option<Version> {
    match Version::parse(head.version.trim_start_matches('v')) {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::warn!(
                name = %head.name,
                locale = %head.locale,
                version = %head.version,
                "Skipping build head with invalid version: {}",
                e
            );
            None
        }
    }
}
