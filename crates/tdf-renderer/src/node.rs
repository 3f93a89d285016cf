//! Document tree nodes for the target document format.
//!
//! A [`Node`] serializes to the JSON shape the content platform accepts:
//! `{"type": ..., "attrs": {...}, "content": [...], "marks": [...], "text": ...}`.
//! Empty collections are omitted from the output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document format version written on the root node.
pub const DOC_VERSION: u32 = 1;

/// Every node type the target schema knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Doc,
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
    Table,
    TableRow,
    TableHeader,
    TableCell,
    Blockquote,
    Panel,
    Expand,
    MediaSingle,
    Media,
    LayoutSection,
    LayoutColumn,
    Status,
    Date,
    Mention,
    Emoji,
    Rule,
    Text,
}

impl NodeKind {
    /// All node kinds, in schema order.
    pub const ALL: [NodeKind; 24] = [
        NodeKind::Doc,
        NodeKind::Paragraph,
        NodeKind::Heading,
        NodeKind::BulletList,
        NodeKind::OrderedList,
        NodeKind::ListItem,
        NodeKind::CodeBlock,
        NodeKind::Table,
        NodeKind::TableRow,
        NodeKind::TableHeader,
        NodeKind::TableCell,
        NodeKind::Blockquote,
        NodeKind::Panel,
        NodeKind::Expand,
        NodeKind::MediaSingle,
        NodeKind::Media,
        NodeKind::LayoutSection,
        NodeKind::LayoutColumn,
        NodeKind::Status,
        NodeKind::Date,
        NodeKind::Mention,
        NodeKind::Emoji,
        NodeKind::Rule,
        NodeKind::Text,
    ];

    /// Schema name of this kind (e.g. `"bulletList"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::BulletList => "bulletList",
            Self::OrderedList => "orderedList",
            Self::ListItem => "listItem",
            Self::CodeBlock => "codeBlock",
            Self::Table => "table",
            Self::TableRow => "tableRow",
            Self::TableHeader => "tableHeader",
            Self::TableCell => "tableCell",
            Self::Blockquote => "blockquote",
            Self::Panel => "panel",
            Self::Expand => "expand",
            Self::MediaSingle => "mediaSingle",
            Self::Media => "media",
            Self::LayoutSection => "layoutSection",
            Self::LayoutColumn => "layoutColumn",
            Self::Status => "status",
            Self::Date => "date",
            Self::Mention => "mention",
            Self::Emoji => "emoji",
            Self::Rule => "rule",
            Self::Text => "text",
        }
    }

    /// Whether nodes of this kind live inside paragraphs, headings and cells.
    #[must_use]
    pub fn is_inline(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Status | Self::Date | Self::Mention | Self::Emoji
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = UnknownNodeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownNodeKind(s.to_owned()))
    }
}

/// Returned when a type name is not part of the schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node type: {0}")]
pub struct UnknownNodeKind(pub String);

/// Superscript or subscript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubSup {
    Sub,
    Sup,
}

/// Formatting mark carried by a text node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "attrs", rename_all = "camelCase")]
pub enum Mark {
    Strong,
    Em,
    Code,
    Strike,
    Link {
        href: String,
    },
    TextColor {
        color: String,
    },
    Subsup {
        #[serde(rename = "type")]
        kind: SubSup,
    },
}

/// Mark discriminant, used by the compatibility matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkKind {
    Strong,
    Em,
    Code,
    Strike,
    Link,
    TextColor,
    Subsup,
}

impl Mark {
    #[must_use]
    pub fn kind(&self) -> MarkKind {
        match self {
            Self::Strong => MarkKind::Strong,
            Self::Em => MarkKind::Em,
            Self::Code => MarkKind::Code,
            Self::Strike => MarkKind::Strike,
            Self::Link { .. } => MarkKind::Link,
            Self::TextColor { .. } => MarkKind::TextColor,
            Self::Subsup { .. } => MarkKind::Subsup,
        }
    }

    /// Link mark with the given target.
    pub fn link(href: impl Into<String>) -> Self {
        Self::Link { href: href.into() }
    }

    /// Text colour mark (`#rrggbb`).
    pub fn color(color: impl Into<String>) -> Self {
        Self::TextColor {
            color: color.into(),
        }
    }
}

impl fmt::Display for MarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strong => "strong",
            Self::Em => "em",
            Self::Code => "code",
            Self::Strike => "strike",
            Self::Link => "link",
            Self::TextColor => "textColor",
            Self::Subsup => "subsup",
        })
    }
}

/// A node in the document tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node type.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Format version, present on the root only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Node attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attrs: Map<String, Value>,
    /// Ordered child nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Node>,
    /// Text of a `text` node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Marks of a `text` node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
}

impl Node {
    /// Create an empty node of the given kind.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            version: None,
            attrs: Map::new(),
            content: Vec::new(),
            text: None,
            marks: Vec::new(),
        }
    }

    /// Root document node.
    #[must_use]
    pub fn doc(content: Vec<Node>) -> Self {
        Self {
            version: Some(DOC_VERSION),
            ..Self::new(NodeKind::Doc).with_content(content)
        }
    }

    /// Plain text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(NodeKind::Text)
        }
    }

    /// Text node carrying marks.
    pub fn marked_text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self {
            marks,
            ..Self::text(text)
        }
    }

    /// Paragraph with the given inline children.
    #[must_use]
    pub fn paragraph(content: Vec<Node>) -> Self {
        Self::new(NodeKind::Paragraph).with_content(content)
    }

    /// Heading of the given level.
    #[must_use]
    pub fn heading(level: u8, content: Vec<Node>) -> Self {
        Self::new(NodeKind::Heading)
            .with_attr("level", level)
            .with_content(content)
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_owned(), value.into());
        self
    }

    /// Replace the children.
    #[must_use]
    pub fn with_content(mut self, content: Vec<Node>) -> Self {
        self.content = content;
        self
    }

    /// String attribute, if present.
    #[must_use]
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    /// Concatenated text of this node and its descendants.
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        match self.kind {
            NodeKind::Status => {
                if let Some(text) = self.attr_str("text") {
                    out.push_str(text);
                }
            }
            NodeKind::Mention | NodeKind::Emoji => {
                if let Some(text) = self.attr_str("text").or_else(|| self.attr_str("shortName")) {
                    out.push_str(text);
                }
            }
            _ => {}
        }
        for child in &self.content {
            child.collect_text(out);
        }
    }

    /// Count descendants (including `self`) of the given kind.
    #[must_use]
    pub fn count(&self, kind: NodeKind) -> usize {
        usize::from(self.kind == kind) + self.content.iter().map(|c| c.count(kind)).sum::<usize>()
    }

    /// Depth-first iterator over this node and its descendants.
    pub fn descendants(&self) -> impl Iterator<Item = &Node> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.content.iter().rev());
            Some(node)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_doc_serializes_with_version() {
        let doc = Node::doc(vec![Node::paragraph(vec![Node::text("hi")])]);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "doc",
                "version": 1,
                "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "hi"}]}
                ]
            })
        );
    }

    #[test]
    fn test_marks_serialize_with_attrs() {
        let node = Node::marked_text(
            "x",
            vec![
                Mark::Strong,
                Mark::link("https://example.com"),
                Mark::Subsup { kind: SubSup::Sup },
            ],
        );
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value["marks"],
            json!([
                {"type": "strong"},
                {"type": "link", "attrs": {"href": "https://example.com"}},
                {"type": "subsup", "attrs": {"type": "sup"}}
            ])
        );
    }

    #[test]
    fn test_node_deserializes() {
        let node: Node = serde_json::from_value(json!({
            "type": "heading",
            "attrs": {"level": 2},
            "content": [{"type": "text", "text": "T", "marks": [{"type": "em"}]}]
        }))
        .unwrap();
        assert_eq!(node.kind, NodeKind::Heading);
        assert_eq!(node.attrs["level"], json!(2));
        assert_eq!(node.content[0].marks, vec![Mark::Em]);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                Value::String(kind.as_str().to_owned())
            );
        }
        assert!("tableFooter".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_plain_text_and_count() {
        let doc = Node::doc(vec![
            Node::paragraph(vec![Node::text("a"), Node::text("b")]),
            Node::paragraph(vec![
                Node::new(NodeKind::Status).with_attr("text", "DONE"),
            ]),
        ]);
        assert_eq!(doc.plain_text(), "abDONE");
        assert_eq!(doc.count(NodeKind::Paragraph), 2);
        assert_eq!(doc.descendants().count(), 6);
    }
}
