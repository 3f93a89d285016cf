//! Deployment classification.
//!
//! A base URL is classified as cloud when its host equals or ends with one of
//! the configured cloud domains, as server for any other well-formed
//! `http(s)` URL, and as unknown when the URL is absent or malformed.

use std::fmt;

use serde::Serialize;
use tdf_cache::{TtlCache, content_hash};
use url::Url;

/// Deployment flavour of a target instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentKind {
    Cloud,
    Server,
    Unknown,
}

impl DeploymentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one base URL. Replaced, never mutated, on reclassification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    pub base_url: String,
    /// Lowercased host, when the URL has one.
    pub host: Option<String>,
    pub kind: DeploymentKind,
}

/// Classifications cached per base URL.
pub type DeploymentCache = TtlCache<String, DeploymentDescriptor>;

/// Decides the deployment kind of a base URL.
pub trait Classifier: Send + Sync {
    fn classify(&self, base_url: &str) -> DeploymentDescriptor;
}

/// Classifier matching the URL host against cloud domain suffixes.
#[derive(Clone, Debug)]
pub struct UrlPatternClassifier {
    cloud_domains: Vec<String>,
}

impl UrlPatternClassifier {
    #[must_use]
    pub fn new<I, S>(cloud_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            cloud_domains: cloud_domains
                .into_iter()
                .map(|domain| domain.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_cloud(&self, host: &str) -> bool {
        self.cloud_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Default for UrlPatternClassifier {
    fn default() -> Self {
        Self::new(tdf_config::DeploymentConfig::default().cloud_domains)
    }
}

impl Classifier for UrlPatternClassifier {
    fn classify(&self, base_url: &str) -> DeploymentDescriptor {
        let unknown = |host: Option<String>| DeploymentDescriptor {
            base_url: base_url.to_owned(),
            host,
            kind: DeploymentKind::Unknown,
        };

        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return unknown(None);
        }
        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(base_url, error = %e, "Unparseable base URL, deployment unknown");
                return unknown(None);
            }
        };
        if !matches!(url.scheme(), "http" | "https") {
            tracing::debug!(base_url, scheme = url.scheme(), "Unsupported scheme, deployment unknown");
            return unknown(None);
        }
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return unknown(None);
        };

        let kind = if self.is_cloud(&host) {
            DeploymentKind::Cloud
        } else {
            DeploymentKind::Server
        };
        DeploymentDescriptor {
            base_url: base_url.to_owned(),
            host: Some(host),
            kind,
        }
    }
}

/// Stable rollout bucket in `0..100` for a host.
#[must_use]
pub fn rollout_bucket(host: &str) -> u8 {
    let hash = content_hash(&["rollout", host]);
    let prefix = u16::from_str_radix(&hash[..4], 16).unwrap_or_default();
    u8::try_from(prefix % 100).unwrap_or_default()
}
