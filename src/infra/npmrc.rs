//! Isolated npm configuration
//!
//! The installer never reads the user's npmrc; it gets one generated from
//! the service settings instead.

use base64::Engine;
use std::path::Path;

use crate::error::SettingsError;

/// Render npmrc content for `registry`
///
/// Credentials embedded in the registry URL are moved to `_auth`; otherwise
/// `auth` (`user:password`) is used when given.
pub fn render(registry: &str, auth: Option<&str>, loglevel: &str) -> String {
    let (registry, url_auth) = split_credentials(registry);

    let mut content = format!("registry={registry}\n");
    if let Some(auth) = url_auth.as_deref().or(auth) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(auth);
        content.push_str(&format!("_auth={encoded}\n"));
    }
    content.push_str(&format!("loglevel={loglevel}\n"));
    content
}

/// Write the npmrc to `path`
pub fn create_npmrc(
    path: &Path,
    registry: &str,
    auth: Option<&str>,
    loglevel: &str,
) -> Result<(), SettingsError> {
    let write_error = |e: std::io::Error| SettingsError::Write {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    std::fs::write(path, render(registry, auth, loglevel)).map_err(write_error)?;

    tracing::debug!(path = %path.display(), "Wrote npmrc");
    Ok(())
}

fn split_credentials(registry: &str) -> (String, Option<String>) {
    let Ok(mut url) = reqwest::Url::parse(registry) else {
        return (registry.to_string(), None);
    };

    if url.username().is_empty() {
        return (url.to_string(), None);
    }

    let auth = match url.password() {
        Some(password) => format!("{}:{}", url.username(), password),
        None => url.username().to_string(),
    };
    // both setters only fail for cannot-be-a-base URLs, which have no credentials
    let _ = url.set_username("");
    let _ = url.set_password(None);
    (url.to_string(), Some(auth))
}
