//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid package name, optionally scoped
    pub fn package_name() -> impl Strategy<Value = String> {
        (
            prop::option::of("[a-z][a-z0-9-]{0,10}"),
            "[a-z][a-z0-9-]{0,20}[a-z0-9]?",
        )
            .prop_map(|(scope, name)| match scope {
                Some(scope) => format!("@{scope}/{name}"),
                None => name,
            })
    }

    /// Generate a valid semver version string
    pub fn semver_version() -> impl Strategy<Value = String> {
        (0u32..100, 0u32..100, 0u32..100)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate a locale tag like `en-US` or `nl`
    pub fn locale() -> impl Strategy<Value = String> {
        ("[a-z]{2}", prop::option::of("[A-Z]{2}")).prop_map(|(lang, region)| match region {
            Some(region) => format!("{lang}-{region}"),
            None => lang,
        })
    }

    /// Generate a set of distinct locales
    pub fn locales() -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(locale(), 1..6).prop_map(|set| set.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            let bare = name.rsplit('/').next().unwrap();
            prop_assert!(bare.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_semver_version_generator(version in semver_version()) {
            prop_assert!(semver::Version::parse(&version).is_ok());
        }

        #[test]
        fn test_locales_generator(locales in locales()) {
            let mut sorted = locales.clone();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), locales.len());
        }
    }
}
