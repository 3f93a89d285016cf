//! Error types for rendering and validation.

use crate::node::{MarkKind, NodeKind};
use crate::schema::InvalidAttr;

/// Error from a plugin renderer.
///
/// Never escapes a conversion: the renderer logs it and emits the matched
/// source as plain text.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RenderError {
    /// A required attribute was not given.
    #[error("{plugin}: missing required attribute `{attr}`")]
    MissingAttr {
        /// Plugin name.
        plugin: String,
        /// Attribute name.
        attr: &'static str,
    },

    /// An attribute value is outside its enumeration.
    #[error("{plugin}: {source}")]
    InvalidAttr {
        /// Plugin name.
        plugin: String,
        /// Underlying attribute error.
        source: InvalidAttr,
    },

    /// Plugin-specific failure.
    #[error("{plugin}: {message}")]
    Plugin {
        /// Plugin name.
        plugin: String,
        /// Failure description.
        message: String,
    },
}

impl RenderError {
    pub fn missing(plugin: &str, attr: &'static str) -> Self {
        Self::MissingAttr {
            plugin: plugin.to_owned(),
            attr,
        }
    }

    pub fn invalid(plugin: &str, source: InvalidAttr) -> Self {
        Self::InvalidAttr {
            plugin: plugin.to_owned(),
            source,
        }
    }

    pub fn plugin(plugin: &str, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.to_owned(),
            message: message.into(),
        }
    }
}

/// Schema violation found by the validator.
///
/// `path` locates the node as a JSON-pointer-like string, e.g. `/content/2/content/0`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The `type` is not a known node kind.
    #[error("{path}: unknown node type `{name}`")]
    UnknownType { path: String, name: String },

    /// The node is not shaped like a node at all.
    #[error("{path}: malformed node: {message}")]
    Malformed { path: String, message: String },

    /// The root is not a versioned `doc`.
    #[error("{path}: root must be a `doc` node with a supported version")]
    BadRoot { path: String },

    /// A child type is not allowed inside its parent.
    #[error("{path}: `{child}` is not allowed inside `{parent}`")]
    IllegalChild {
        path: String,
        parent: NodeKind,
        child: NodeKind,
    },

    /// A required attribute is missing or has the wrong value.
    #[error("{path}: `{kind}` attribute `{attr}` {problem}")]
    BadAttr {
        path: String,
        kind: NodeKind,
        attr: &'static str,
        problem: String,
    },

    /// Marks were placed on a non-text node.
    #[error("{path}: `{kind}` nodes cannot carry marks")]
    MarksNotAllowed { path: String, kind: NodeKind },

    /// Two marks on the same text node are not compatible.
    #[error("{path}: marks `{first}` and `{second}` cannot be combined")]
    IncompatibleMarks {
        path: String,
        first: MarkKind,
        second: MarkKind,
    },
}

impl ValidationError {
    /// Location of the offending node.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::UnknownType { path, .. }
            | Self::Malformed { path, .. }
            | Self::BadRoot { path }
            | Self::IllegalChild { path, .. }
            | Self::BadAttr { path, .. }
            | Self::MarksNotAllowed { path, .. }
            | Self::IncompatibleMarks { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_messages() {
        assert_eq!(
            RenderError::missing("media", "id").to_string(),
            "media: missing required attribute `id`"
        );
        let err = RenderError::invalid(
            "status",
            InvalidAttr {
                attr: "color",
                value: "pink".to_owned(),
            },
        );
        assert_eq!(err.to_string(), r#"status: invalid color value: "pink""#);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_error_path() {
        let err = ValidationError::IllegalChild {
            path: "/content/0".to_owned(),
            parent: NodeKind::Table,
            child: NodeKind::Paragraph,
        };
        assert_eq!(err.path(), "/content/0");
        assert_eq!(
            err.to_string(),
            "/content/0: `paragraph` is not allowed inside `table`"
        );
    }
}
