//! Conversion result returned to callers.

use std::fmt;

use serde::Serialize;
use tdf_renderer::Node;

use crate::deployment::DeploymentKind;

/// Output format of a conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured document tree.
    Tree,
    /// Legacy flat markup string.
    Flat,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::Flat => "flat",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tdf_config::Format> for OutputFormat {
    fn from(format: tdf_config::Format) -> Self {
        match format {
            tdf_config::Format::Tree => Self::Tree,
            tdf_config::Format::Flat => Self::Flat,
        }
    }
}

/// Converted content: a tree or a flat string.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Tree(Node),
    Flat(String),
}

impl Payload {
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        match self {
            Self::Tree(_) => OutputFormat::Tree,
            Self::Flat(_) => OutputFormat::Flat,
        }
    }

    #[must_use]
    pub fn as_tree(&self) -> Option<&Node> {
        match self {
            Self::Tree(node) => Some(node),
            Self::Flat(_) => None,
        }
    }

    #[must_use]
    pub fn as_flat(&self) -> Option<&str> {
        match self {
            Self::Tree(_) => None,
            Self::Flat(text) => Some(text),
        }
    }
}

/// Outcome of [`FormatRouter::convert`](crate::FormatRouter::convert).
///
/// Serializes as
/// `{"format": "tree", "payload": {...}, "deploymentKind": "cloud", "rolloutApplied": false}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub format: OutputFormat,
    pub payload: Payload,
    pub deployment_kind: DeploymentKind,
    /// Whether a rollout flag changed the format the deployment would get.
    pub rollout_applied: bool,
}

impl ConversionResult {
    /// Result whose format always matches its payload.
    #[must_use]
    pub fn new(payload: Payload, deployment_kind: DeploymentKind, rollout_applied: bool) -> Self {
        Self {
            format: payload.format(),
            payload,
            deployment_kind,
            rollout_applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_serializes_camel_case() {
        let result = ConversionResult::new(
            Payload::Flat("h1. Title".to_owned()),
            DeploymentKind::Server,
            true,
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "format": "flat",
                "payload": "h1. Title",
                "deploymentKind": "server",
                "rolloutApplied": true
            })
        );
    }

    #[test]
    fn test_tree_payload_is_inlined() {
        let result = ConversionResult::new(
            Payload::Tree(Node::doc(vec![])),
            DeploymentKind::Cloud,
            false,
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["format"], "tree");
        assert_eq!(value["payload"], json!({"type": "doc", "version": 1}));
    }
}
