//! Tree renderer: [`TokenStream`] to a `doc` [`Node`].
//!
//! The renderer walks the token stream depth-first and builds the tree in a
//! single pass. It never fails. Plugin failures degrade to the original
//! source text, and nodes the schema does not allow in their position are
//! degraded rather than emitted.
//!
//! # Complexity guards
//!
//! Applied while rendering, not as a separate pass:
//!
//! - **Tables** keep at most [`RenderOptions::max_table_rows`] rows (header
//!   included). The remainder is replaced by one notice paragraph after the
//!   table.
//! - **Lists** nest at most [`RenderOptions::max_list_depth`] levels. Deeper
//!   items become paragraphs in the deepest list item, prefixed with `↳ `.
//!
//! # Example
//!
//! ```
//! use tdf_renderer::{NodeKind, Registry, TreeRenderer, tokenize};
//!
//! let registry = Registry::builtin();
//! let stream = tokenize("# Title\n\n**bold** text", &registry);
//! let doc = TreeRenderer::new(&registry).render(&stream);
//! assert_eq!(doc.kind, NodeKind::Doc);
//! assert_eq!(doc.content[0].kind, NodeKind::Heading);
//! ```

mod degrade;
pub(crate) mod inline;
mod walker;

use crate::node::Node;
use crate::plugin::Registry;
use crate::token::TokenStream;

pub use inline::{HIGHLIGHT_COLOR, INSERT_COLOR};
pub use walker::FLATTENED_MARKER;
pub(crate) use walker::alert_panel;

/// Default cap on table rows, header row included.
pub const DEFAULT_MAX_TABLE_ROWS: usize = 50;

/// Default cap on list nesting.
pub const DEFAULT_MAX_LIST_DEPTH: usize = 10;

/// Complexity guard limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    /// Rows kept per table, header row included.
    pub max_table_rows: usize,
    /// Deepest list nesting rendered as real lists.
    pub max_list_depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_table_rows: DEFAULT_MAX_TABLE_ROWS,
            max_list_depth: DEFAULT_MAX_LIST_DEPTH,
        }
    }
}

/// Rendered document plus the non-fatal problems met on the way.
#[derive(Clone, Debug, PartialEq)]
pub struct Rendered {
    pub doc: Node,
    pub warnings: Vec<String>,
}

/// Renders token streams into document trees.
pub struct TreeRenderer<'r> {
    registry: &'r Registry,
    options: RenderOptions,
}

impl<'r> TreeRenderer<'r> {
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            options: RenderOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Render a token stream into a `doc` node.
    #[must_use]
    pub fn render(&self, stream: &TokenStream) -> Node {
        self.render_with_warnings(stream).doc
    }

    /// Render a token stream, keeping plugin and guard warnings.
    #[must_use]
    pub fn render_with_warnings(&self, stream: &TokenStream) -> Rendered {
        let mut walker = walker::Walker::new(self.registry, &self.options, &stream.abbreviations);
        let doc = walker.render_into(Node::doc(Vec::new()), &stream.tokens);
        Rendered {
            doc,
            warnings: walker.warnings,
        }
    }
}

/// Render with the default guards.
#[must_use]
pub fn render(stream: &TokenStream, registry: &Registry) -> Node {
    TreeRenderer::new(registry).render(stream)
}
