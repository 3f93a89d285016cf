//! Schema validation of document trees.
//!
//! Checks run per node in a fixed order: node type, allowed children,
//! required attributes, then marks. All violations are collected rather than
//! stopping at the first one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::node::{DOC_VERSION, Mark, Node, NodeKind};
use crate::schema::{MediaLayout, MediaType, PanelType, StatusColor, allows, marks_compatible};

/// How strictly a tree is checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Violations make the tree invalid.
    #[default]
    Error,
    /// Violations are logged; the tree is still accepted.
    Warn,
    /// No checks run.
    Skip,
}

impl ValidationLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "skip" | "off" => Ok(Self::Skip),
            other => Err(format!("unknown validation level: {other}")),
        }
    }
}

/// Outcome of [`validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the tree may be used. Always true below [`ValidationLevel::Error`].
    pub is_valid: bool,
    /// Violations found, in document order.
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    fn new(level: ValidationLevel, errors: Vec<ValidationError>) -> Self {
        if level == ValidationLevel::Warn {
            for error in &errors {
                tracing::warn!(path = error.path(), %error, "Schema violation");
            }
        }
        Self {
            is_valid: level != ValidationLevel::Error || errors.is_empty(),
            errors,
        }
    }

    /// The first violation when the tree is invalid.
    pub fn into_result(self) -> Result<(), ValidationError> {
        match (self.is_valid, self.errors.into_iter().next()) {
            (false, Some(error)) => Err(error),
            _ => Ok(()),
        }
    }
}

/// Validate a typed tree.
///
/// # Example
///
/// ```
/// use tdf_renderer::{Node, ValidationLevel, validate};
///
/// let doc = Node::doc(vec![Node::heading(7, vec![Node::text("Too deep")])]);
/// let report = validate(&doc, ValidationLevel::Error);
/// assert!(!report.is_valid);
/// assert_eq!(report.errors[0].path(), "/content/0");
///
/// assert!(validate(&doc, ValidationLevel::Warn).is_valid);
/// ```
#[must_use]
pub fn validate(tree: &Node, level: ValidationLevel) -> ValidationReport {
    if level == ValidationLevel::Skip {
        return ValidationReport::new(level, Vec::new());
    }
    let mut errors = Vec::new();
    if tree.kind != NodeKind::Doc || tree.version != Some(DOC_VERSION) {
        errors.push(ValidationError::BadRoot {
            path: "/".to_owned(),
        });
    }
    check_node(tree, "/", &mut errors);
    ValidationReport::new(level, errors)
}

/// Validate an untyped JSON tree, including node types unknown to [`NodeKind`].
#[must_use]
pub fn validate_value(tree: &Value, level: ValidationLevel) -> ValidationReport {
    if level == ValidationLevel::Skip {
        return ValidationReport::new(level, Vec::new());
    }
    let mut errors = Vec::new();
    check_shape(tree, "/", &mut errors);
    if errors.is_empty() {
        match serde_json::from_value::<Node>(tree.clone()) {
            Ok(node) => return validate(&node, level),
            Err(e) => errors.push(ValidationError::Malformed {
                path: "/".to_owned(),
                message: e.to_string(),
            }),
        }
    }
    ValidationReport::new(level, errors)
}

fn child_path(parent: &str, index: usize) -> String {
    if parent == "/" {
        format!("/content/{index}")
    } else {
        format!("{parent}/content/{index}")
    }
}

/// Check every `type` field so unknown kinds are reported by path.
fn check_shape(value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    let Some(object) = value.as_object() else {
        errors.push(ValidationError::Malformed {
            path: path.to_owned(),
            message: "expected an object".to_owned(),
        });
        return;
    };
    match object.get("type").and_then(Value::as_str) {
        Some(name) => {
            if name.parse::<NodeKind>().is_err() {
                errors.push(ValidationError::UnknownType {
                    path: path.to_owned(),
                    name: name.to_owned(),
                });
                return;
            }
        }
        None => {
            errors.push(ValidationError::Malformed {
                path: path.to_owned(),
                message: "missing `type`".to_owned(),
            });
            return;
        }
    }
    match object.get("content") {
        None => {}
        Some(Value::Array(children)) => {
            for (i, child) in children.iter().enumerate() {
                check_shape(child, &child_path(path, i), errors);
            }
        }
        Some(_) => errors.push(ValidationError::Malformed {
            path: path.to_owned(),
            message: "`content` must be an array".to_owned(),
        }),
    }
}

fn check_node(node: &Node, path: &str, errors: &mut Vec<ValidationError>) {
    for child in &node.content {
        if !allows(node.kind, child.kind) {
            errors.push(ValidationError::IllegalChild {
                path: path.to_owned(),
                parent: node.kind,
                child: child.kind,
            });
        }
    }

    check_attrs(node, path, errors);
    check_marks(node, path, errors);

    for (i, child) in node.content.iter().enumerate() {
        check_node(child, &child_path(path, i), errors);
    }
}

fn check_attrs(node: &Node, path: &str, errors: &mut Vec<ValidationError>) {
    let mut bad = |attr: &'static str, problem: &str| {
        errors.push(ValidationError::BadAttr {
            path: path.to_owned(),
            kind: node.kind,
            attr,
            problem: problem.to_owned(),
        });
    };
    let non_empty = |key: &str| node.attr_str(key).is_some_and(|value| !value.is_empty());

    match node.kind {
        NodeKind::Heading => {
            let level = node.attrs.get("level").and_then(Value::as_u64);
            if !level.is_some_and(|level| (1..=6).contains(&level)) {
                bad("level", "must be an integer from 1 to 6");
            }
        }
        NodeKind::OrderedList => {
            if let Some(order) = node.attrs.get("order")
                && order.as_u64().is_none()
            {
                bad("order", "must be a non-negative integer");
            }
        }
        NodeKind::Panel => {
            if !node.attr_str("panelType").is_some_and(|t| t.parse::<PanelType>().is_ok()) {
                bad("panelType", "must be one of info, warning, error, success, note");
            }
        }
        NodeKind::Media => match node.attr_str("type").map(str::parse::<MediaType>) {
            Some(Ok(MediaType::External)) => {
                if !non_empty("url") {
                    bad("url", "is required for external media");
                }
            }
            Some(Ok(MediaType::File | MediaType::Link)) => {
                if !non_empty("id") {
                    bad("id", "is required");
                }
            }
            _ => bad("type", "must be one of file, link, external"),
        },
        NodeKind::MediaSingle => {
            if let Some(layout) = node.attrs.get("layout")
                && !layout.as_str().is_some_and(|l| l.parse::<MediaLayout>().is_ok())
            {
                bad("layout", "is not a known layout");
            }
        }
        NodeKind::Status => {
            if !non_empty("text") {
                bad("text", "is required");
            }
            if !node.attr_str("color").is_some_and(|c| c.parse::<StatusColor>().is_ok()) {
                bad("color", "is not a known status colour");
            }
        }
        NodeKind::Date => {
            let digits = node
                .attr_str("timestamp")
                .is_some_and(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()));
            if !digits {
                bad("timestamp", "must be epoch milliseconds");
            }
        }
        NodeKind::Mention => {
            if !non_empty("id") {
                bad("id", "is required");
            }
        }
        NodeKind::Emoji => {
            if !non_empty("shortName") {
                bad("shortName", "is required");
            }
        }
        NodeKind::LayoutColumn => {
            let width = node.attrs.get("width").and_then(Value::as_f64);
            if !width.is_some_and(|w| w > 0.0 && w <= 100.0) {
                bad("width", "must be a number in (0, 100]");
            }
        }
        NodeKind::Text => {
            if !node.text.as_deref().is_some_and(|text| !text.is_empty()) {
                bad("text", "must be non-empty");
            }
        }
        _ => {}
    }

    if node.kind != NodeKind::Text && node.text.is_some() {
        errors.push(ValidationError::Malformed {
            path: path.to_owned(),
            message: format!("`{}` nodes cannot carry text", node.kind),
        });
    }
    if node.kind != NodeKind::Doc && node.version.is_some() {
        errors.push(ValidationError::Malformed {
            path: path.to_owned(),
            message: "only the root carries a version".to_owned(),
        });
    }
}

fn check_marks(node: &Node, path: &str, errors: &mut Vec<ValidationError>) {
    if node.marks.is_empty() {
        return;
    }
    if node.kind != NodeKind::Text {
        errors.push(ValidationError::MarksNotAllowed {
            path: path.to_owned(),
            kind: node.kind,
        });
        return;
    }

    for mark in &node.marks {
        let problem = match mark {
            Mark::Link { href } if href.is_empty() => Some(("href", "must be non-empty")),
            Mark::TextColor { color } if !is_hex_color(color) => {
                Some(("color", "must be a #rrggbb colour"))
            }
            _ => None,
        };
        if let Some((attr, problem)) = problem {
            errors.push(ValidationError::BadAttr {
                path: path.to_owned(),
                kind: node.kind,
                attr,
                problem: format!("on `{}` mark {problem}", mark.kind()),
            });
        }
    }

    for (i, first) in node.marks.iter().enumerate() {
        for second in &node.marks[i + 1..] {
            if !marks_compatible(first.kind(), second.kind()) {
                errors.push(ValidationError::IncompatibleMarks {
                    path: path.to_owned(),
                    first: first.kind(),
                    second: second.kind(),
                });
            }
        }
    }
}

fn is_hex_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MarkKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(content: Vec<Node>) -> Node {
        Node::doc(content)
    }

    #[test]
    fn test_valid_tree() {
        let tree = doc(vec![
            Node::heading(2, vec![Node::text("Title")]),
            Node::paragraph(vec![
                Node::marked_text("x", vec![Mark::Code, Mark::link("https://x.test")]),
                Node::new(NodeKind::Status)
                    .with_attr("text", "Done")
                    .with_attr("color", "green"),
            ]),
        ]);
        let report = validate(&tree, ValidationLevel::Error);
        assert_eq!(report.errors, vec![]);
        assert!(report.is_valid);
    }

    #[test]
    fn test_bad_root() {
        let report = validate(&Node::paragraph(vec![]), ValidationLevel::Error);
        assert!(!report.is_valid);
        assert!(matches!(report.errors[0], ValidationError::BadRoot { .. }));
    }

    #[test]
    fn test_illegal_child_path() {
        let table = Node::new(NodeKind::Table).with_content(vec![Node::paragraph(vec![
            Node::text("x"),
        ])]);
        let report = validate(&doc(vec![Node::paragraph(vec![]), table]), ValidationLevel::Error);
        assert_eq!(
            report.errors,
            vec![ValidationError::IllegalChild {
                path: "/content/1".to_owned(),
                parent: NodeKind::Table,
                child: NodeKind::Paragraph,
            }]
        );
    }

    #[test]
    fn test_required_attrs() {
        let tree = doc(vec![
            Node::new(NodeKind::Panel)
                .with_attr("panelType", "danger")
                .with_content(vec![Node::paragraph(vec![])]),
            Node::paragraph(vec![Node::new(NodeKind::Mention)]),
        ]);
        let report = validate(&tree, ValidationLevel::Error);
        let attrs: Vec<_> = report
            .errors
            .iter()
            .map(|e| match e {
                ValidationError::BadAttr { attr, .. } => *attr,
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(attrs, vec!["panelType", "id"]);
    }

    #[test]
    fn test_media_requirements() {
        let external = Node::new(NodeKind::Media).with_attr("type", "external");
        let file = Node::new(NodeKind::Media)
            .with_attr("type", "file")
            .with_attr("id", "abc");
        let tree = doc(vec![
            Node::new(NodeKind::MediaSingle).with_content(vec![external]),
            Node::new(NodeKind::MediaSingle)
                .with_attr("layout", "center")
                .with_content(vec![file]),
        ]);
        let report = validate(&tree, ValidationLevel::Error);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path(), "/content/0/content/0");
    }

    #[test]
    fn test_layout_column_width() {
        let column = |width: f64| {
            Node::new(NodeKind::LayoutColumn)
                .with_attr("width", width)
                .with_content(vec![Node::paragraph(vec![])])
        };
        let tree = doc(vec![
            Node::new(NodeKind::LayoutSection).with_content(vec![column(50.0), column(120.0)]),
        ]);
        let report = validate(&tree, ValidationLevel::Error);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path(), "/content/0/content/1");
    }

    #[test]
    fn test_marks() {
        let tree = doc(vec![Node::paragraph(vec![
            Node::marked_text("x", vec![Mark::Code, Mark::Strong]),
            Node::marked_text("y", vec![Mark::color("red")]),
        ])]);
        let report = validate(&tree, ValidationLevel::Error);
        assert_eq!(
            report.errors[0],
            ValidationError::IncompatibleMarks {
                path: "/content/0/content/0".to_owned(),
                first: MarkKind::Code,
                second: MarkKind::Strong,
            }
        );
        assert!(matches!(
            report.errors[1],
            ValidationError::BadAttr { attr: "color", .. }
        ));

        let mut paragraph = Node::paragraph(vec![]);
        paragraph.marks.push(Mark::Strong);
        let report = validate(&doc(vec![paragraph]), ValidationLevel::Error);
        assert!(matches!(
            report.errors[0],
            ValidationError::MarksNotAllowed { .. }
        ));
    }

    #[test]
    fn test_levels() {
        let tree = doc(vec![Node::heading(0, vec![])]);
        assert!(!validate(&tree, ValidationLevel::Error).is_valid);

        let warn = validate(&tree, ValidationLevel::Warn);
        assert!(warn.is_valid);
        assert_eq!(warn.errors.len(), 1);

        let skip = validate(&tree, ValidationLevel::Skip);
        assert!(skip.is_valid);
        assert!(skip.errors.is_empty());
    }

    #[test]
    fn test_into_result() {
        let tree = doc(vec![Node::heading(9, vec![])]);
        assert!(validate(&tree, ValidationLevel::Error).into_result().is_err());
        assert!(validate(&tree, ValidationLevel::Warn).into_result().is_ok());
    }

    #[test]
    fn test_unknown_type_in_json() {
        let value = json!({
            "type": "doc",
            "version": 1,
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "ok"}]},
                {"type": "blink", "content": []}
            ]
        });
        let report = validate_value(&value, ValidationLevel::Error);
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownType {
                path: "/content/1".to_owned(),
                name: "blink".to_owned(),
            }]
        );
    }

    #[test]
    fn test_json_tree_is_checked_as_node() {
        let value = json!({
            "type": "doc",
            "version": 1,
            "content": [{"type": "heading", "attrs": {"level": 3}, "content": [{"type": "text", "text": "ok"}]}]
        });
        assert!(validate_value(&value, ValidationLevel::Error).is_valid);

        let value = json!({"type": "doc", "version": 1, "content": [{"type": "text"}]});
        let report = validate_value(&value, ValidationLevel::Error);
        assert!(!report.is_valid);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("WARN".parse::<ValidationLevel>(), Ok(ValidationLevel::Warn));
        assert!("loud".parse::<ValidationLevel>().is_err());
        assert_eq!(ValidationLevel::default(), ValidationLevel::Error);
    }
}
