//! Fitting nodes into parents that do not allow them.
//!
//! Every rule returns strictly smaller nodes (children or a single wrapper
//! paragraph), so re-attaching the result always terminates.

use crate::node::{Mark, MarkKind, Node, NodeKind};
use crate::schema::{allows, marks_compatible};

/// Replacement nodes for `node`, which `parent` does not accept.
pub(super) fn degrade(node: Node, parent: NodeKind) -> Vec<Node> {
    match node.kind {
        NodeKind::Heading => vec![bold_paragraph(node)],
        NodeKind::Table => table_paragraphs(node),
        NodeKind::CodeBlock => {
            let code = node.plain_text();
            if code.is_empty() {
                Vec::new()
            } else {
                vec![Node::paragraph(vec![Node::marked_text(code, vec![Mark::Code])])]
            }
        }
        NodeKind::MediaSingle | NodeKind::Media => {
            let alt = fallback_text(&node);
            if alt.is_empty() {
                Vec::new()
            } else {
                vec![Node::paragraph(vec![Node::text(alt)])]
            }
        }
        NodeKind::Rule => Vec::new(),
        NodeKind::Paragraph | NodeKind::Text | NodeKind::Status | NodeKind::Date
        | NodeKind::Mention | NodeKind::Emoji => wrap_for_list(node, parent),
        NodeKind::Doc
        | NodeKind::BulletList
        | NodeKind::OrderedList
        | NodeKind::ListItem
        | NodeKind::TableRow
        | NodeKind::TableHeader
        | NodeKind::TableCell
        | NodeKind::Blockquote
        | NodeKind::Panel
        | NodeKind::Expand
        | NodeKind::LayoutSection
        | NodeKind::LayoutColumn => node.content,
    }
}

/// Text standing in for a node inside inline-only parents.
pub(super) fn fallback_text(node: &Node) -> String {
    match node.kind {
        NodeKind::MediaSingle => node.content.first().map(fallback_text).unwrap_or_default(),
        NodeKind::Media => node
            .attr_str("alt")
            .or_else(|| node.attr_str("url"))
            .unwrap_or_default()
            .to_owned(),
        _ => node.plain_text(),
    }
}

/// Paragraph or inline content only fits a list through a list item.
fn wrap_for_list(node: Node, parent: NodeKind) -> Vec<Node> {
    if !allows(parent, NodeKind::ListItem) {
        tracing::debug!(node = %node.kind, parent = %parent, "Dropping node with no legal place");
        return Vec::new();
    }
    let paragraph = if node.kind == NodeKind::Paragraph {
        node
    } else {
        Node::paragraph(vec![node])
    };
    vec![Node::new(NodeKind::ListItem).with_content(vec![paragraph])]
}

fn bold_paragraph(heading: Node) -> Node {
    let content = heading
        .content
        .into_iter()
        .map(|mut child| {
            let can_bold = child
                .marks
                .iter()
                .all(|mark| marks_compatible(mark.kind(), MarkKind::Strong));
            if child.kind == NodeKind::Text && can_bold {
                child.marks.insert(0, Mark::Strong);
            }
            child
        })
        .collect();
    Node::paragraph(content)
}

/// One paragraph per row, cells separated by ` | `.
fn table_paragraphs(table: Node) -> Vec<Node> {
    table
        .content
        .into_iter()
        .filter_map(|row| {
            let mut content = Vec::new();
            for (i, cell) in row.content.into_iter().enumerate() {
                if i > 0 {
                    content.push(Node::text(" | "));
                }
                content.extend(cell.content);
            }
            (!content.is_empty()).then(|| Node::paragraph(content))
        })
        .collect()
}
