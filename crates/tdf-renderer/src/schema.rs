//! Target schema tables: nesting rules, mark compatibility and attribute enums.

use std::fmt;
use std::str::FromStr;

use crate::node::{MarkKind, NodeKind};

use NodeKind::{
    BulletList, CodeBlock, Date, Emoji, Expand, Heading, LayoutColumn, LayoutSection, ListItem,
    Media, MediaSingle, Mention, OrderedList, Panel, Paragraph, Rule, Status, Table, TableCell,
    TableHeader, TableRow, Text,
};

const INLINE: &[NodeKind] = &[Text, Status, Date, Mention, Emoji];

const TOP_LEVEL: &[NodeKind] = &[
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    CodeBlock,
    Table,
    NodeKind::Blockquote,
    Panel,
    Expand,
    MediaSingle,
    LayoutSection,
    Rule,
];

const COLUMN: &[NodeKind] = &[
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    CodeBlock,
    Table,
    NodeKind::Blockquote,
    Panel,
    Expand,
    MediaSingle,
    Rule,
];

const EXPAND: &[NodeKind] = &[
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    CodeBlock,
    Table,
    NodeKind::Blockquote,
    Panel,
    MediaSingle,
    Rule,
];

const PANEL: &[NodeKind] = &[
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    CodeBlock,
    MediaSingle,
    Rule,
];

const LIST_ITEM: &[NodeKind] = &[Paragraph, BulletList, OrderedList, CodeBlock, MediaSingle];

const BLOCKQUOTE: &[NodeKind] = &[Paragraph, BulletList, OrderedList, CodeBlock, MediaSingle];

/// Child types a node of kind `parent` may contain.
#[must_use]
pub fn allowed_children(parent: NodeKind) -> &'static [NodeKind] {
    match parent {
        NodeKind::Doc => TOP_LEVEL,
        Paragraph | Heading | TableHeader | TableCell => INLINE,
        BulletList | OrderedList => &[ListItem],
        ListItem => LIST_ITEM,
        CodeBlock => &[Text],
        Table => &[TableRow],
        TableRow => &[TableHeader, TableCell],
        NodeKind::Blockquote => BLOCKQUOTE,
        Panel => PANEL,
        Expand => EXPAND,
        MediaSingle => &[Media],
        LayoutSection => &[LayoutColumn],
        LayoutColumn => COLUMN,
        Media | Status | Date | Mention | Emoji | Rule | Text => &[],
    }
}

/// Whether `child` may appear directly inside `parent`.
#[must_use]
pub fn allows(parent: NodeKind, child: NodeKind) -> bool {
    allowed_children(parent).contains(&child)
}

/// Whether `parent` hosts inline content (and therefore text runs).
#[must_use]
pub fn hosts_inline(parent: NodeKind) -> bool {
    allows(parent, Text) && parent != CodeBlock
}

/// Whether two marks may be applied to the same text node.
///
/// `code` combines only with `link`; `textColor` never combines with `link`;
/// a mark kind never appears twice.
#[must_use]
pub fn marks_compatible(a: MarkKind, b: MarkKind) -> bool {
    use MarkKind::{Code, Link, TextColor};

    if a == b {
        return false;
    }
    match (a, b) {
        (Code, other) | (other, Code) => other == Link,
        (TextColor, Link) | (Link, TextColor) => false,
        _ => true,
    }
}

/// Error for an attribute value outside its enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {attr} value: {value:?}")]
pub struct InvalidAttr {
    /// Attribute name.
    pub attr: &'static str,
    /// Offending value.
    pub value: String,
}

macro_rules! attr_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $attr:literal, default = $default:ident,
        { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every allowed value.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Schema value.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = InvalidAttr;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lower = s.trim().to_ascii_lowercase();
                match lower.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(InvalidAttr { attr: $attr, value: s.to_owned() }),
                }
            }
        }
    };
}

attr_enum! {
    /// `panel.attrs.panelType`.
    PanelType, "panelType", default = Info,
    { Info => "info", Warning => "warning", Error => "error", Success => "success", Note => "note" }
}

attr_enum! {
    /// `status.attrs.color`.
    StatusColor, "color", default = Neutral,
    {
        Neutral => "neutral",
        Purple => "purple",
        Blue => "blue",
        Red => "red",
        Yellow => "yellow",
        Green => "green",
    }
}

attr_enum! {
    /// `media.attrs.type`.
    MediaType, "type", default = File,
    { File => "file", Link => "link", External => "external" }
}

attr_enum! {
    /// `mediaSingle.attrs.layout`.
    MediaLayout, "layout", default = Center,
    {
        Center => "center",
        Wide => "wide",
        FullWidth => "full-width",
        AlignStart => "align-start",
        AlignEnd => "align-end",
    }
}
