//! Build side: turning a step list into a shareable link, and the
//! allowlist deciding which pages replay is allowed to touch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stepwire_core::query::encode_pairs;
use stepwire_core::Step;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid base url `{url}`: {reason}")]
    BadBase { url: String, reason: String },
}

/// Appends the encoded steps to the base URL, reusing an existing query
/// when the base already carries one. The base string is kept verbatim.
pub fn build_link(base: &str, steps: &[Step]) -> Result<String, LinkError> {
    let parsed = Url::parse(base).map_err(|error| LinkError::BadBase {
        url: base.to_string(),
        reason: error.to_string(),
    })?;
    let pairs: Vec<(String, String)> = steps.iter().filter_map(Step::wire_pair).collect();
    if pairs.is_empty() {
        return Ok(base.to_string());
    }
    let encoded = encode_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let separator = if base.ends_with('?') || base.ends_with('&') {
        ""
    } else if parsed.query().is_some() {
        "&"
    } else {
        "?"
    };
    Ok(format!("{base}{separator}{encoded}"))
}

#[derive(Debug, Error)]
pub enum AllowListError {
    #[error("invalid allowlist entry `{url}`: {reason}")]
    Invalid { url: String, reason: String },
    #[error("allowlist entries must be http or https urls")]
    UnsupportedScheme,
    #[error("Failed to read allowlist file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse allowlist file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Base-URL prefixes replay may run under. Entries are normalized URLs;
/// matching is plain prefix matching on the page URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    #[serde(default)]
    pub entries: Vec<String>,
}

impl AllowList {
    pub fn permits(&self, url: &str) -> bool {
        self.entries.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }

    /// Validates, normalizes and stores an entry. Duplicates are ignored.
    pub fn add(&mut self, entry: &str) -> Result<String, AllowListError> {
        let parsed = Url::parse(entry).map_err(|error| AllowListError::Invalid {
            url: entry.to_string(),
            reason: error.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AllowListError::UnsupportedScheme);
        }
        let normalized = parsed.to_string();
        if !self.entries.contains(&normalized) {
            self.entries.push(normalized.clone());
        }
        Ok(normalized)
    }

    /// Removes an entry, accepting either the raw or normalized spelling.
    pub fn remove(&mut self, entry: &str) -> bool {
        let normalized = Url::parse(entry)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| entry.to_string());
        let before = self.entries.len();
        self.entries
            .retain(|existing| existing != entry && existing != &normalized);
        self.entries.len() != before
    }

    /// `~/.stepwire/allowlist.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".stepwire").join("allowlist.yaml"))
    }

    /// Missing file means an empty list, not an error.
    pub async fn load(path: &Path) -> Result<AllowList, AllowListError> {
        if !path.exists() {
            return Ok(AllowList::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<(), AllowListError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let content = serde_yaml::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
