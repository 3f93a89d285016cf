//! Markdown to target document format (TDF) compiler.
//!
//! Conversion runs in three stages:
//!
//! - [`tokenize`] turns markup into an owned [`TokenStream`], recognizing
//!   `:::name` custom blocks before the base grammar sees them
//! - [`TreeRenderer`] walks the stream and builds a schema-conformant
//!   [`Node`] tree, calling plugins from the [`Registry`] and applying the
//!   table row and list depth guards
//! - [`validate`] checks a tree against the schema tables in [`schema`]
//!
//! [`FlatRenderer`] walks the same stream and produces the legacy wiki
//! markup string instead of a tree.
//!
//! # Example
//!
//! ```
//! use tdf_renderer::{Registry, TreeRenderer, ValidationLevel, tokenize, validate};
//!
//! let registry = Registry::builtin();
//! let stream = tokenize(":::panel warning\nMind the **gap**\n:::\n", &registry);
//! let doc = TreeRenderer::new(&registry).render(&stream);
//!
//! assert!(validate(&doc, ValidationLevel::Error).is_valid);
//! assert_eq!(doc.content[0].attr_str("panelType"), Some("warning"));
//! ```

mod error;
mod flat;
mod node;
mod plugin;
mod render;
pub mod schema;
mod token;
mod tokenizer;
mod validate;

pub use error::{RenderError, ValidationError};
pub use flat::FlatRenderer;
pub use node::{DOC_VERSION, Mark, MarkKind, Node, NodeKind, SubSup, UnknownNodeKind};
pub use plugin::{
    BlockPlugin, BlockSpan, DatePlugin, EmojiPlugin, ExpandPlugin, InlinePlugin, InlineSpan,
    MediaPlugin, MentionPlugin, PanelPlugin, Plugin, Registry, RenderContext, StatusPlugin,
    emoji_for,
};
pub use render::{
    DEFAULT_MAX_LIST_DEPTH, DEFAULT_MAX_TABLE_ROWS, FLATTENED_MARKER, HIGHLIGHT_COLOR,
    INSERT_COLOR, RenderOptions, Rendered, TreeRenderer, render,
};
pub use schema::{InvalidAttr, MediaLayout, MediaType, PanelType, StatusColor};
pub use token::{AlertKind, Column, Container, CustomBlock, Token, TokenStream};
pub use tokenizer::{BlockArgs, COLUMN, LAYOUT, parser_options, tokenize};
pub use validate::{ValidationLevel, ValidationReport, validate, validate_value};
