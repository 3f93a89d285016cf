//! Extension plugins for custom block and inline syntax.
//!
//! A plugin is either a [`BlockPlugin`] (handles `:::name` blocks) or an
//! [`InlinePlugin`] (finds spans inside text runs). Both expose the same two
//! steps: recognize, then render a [`Node`].
//!
//! The [`Registry`] is an explicit ordered list. Plugins are consulted in
//! registration order, which makes matching deterministic: for inline
//! plugins, the earliest span in the text wins and ties go to the plugin
//! registered first.
//!
//! # Failure isolation
//!
//! `render` returns `Result<Option<Node>, RenderError>`. `Ok(None)` declines
//! the span; `Err` is logged by the renderer. In both cases the original
//! source is emitted as plain text and the conversion carries on. A plugin
//! that panics is treated like one that returned `Err`, and a span from
//! [`InlinePlugin::find`] that is empty, out of range or not on a character
//! boundary is ignored.
//!
//! # Example
//!
//! ```
//! use tdf_renderer::{
//!     InlinePlugin, InlineSpan, Node, NodeKind, Registry, RenderContext, RenderError,
//! };
//!
//! struct Ticket;
//!
//! impl InlinePlugin for Ticket {
//!     fn name(&self) -> &str { "ticket" }
//!
//!     fn find(&self, text: &str) -> Option<InlineSpan> {
//!         let start = text.find("TICKET-")?;
//!         Some(InlineSpan::new(start, start + 7))
//!     }
//!
//!     fn render(&self, _span: &InlineSpan, _ctx: &mut RenderContext) -> Result<Option<Node>, RenderError> {
//!         Ok(Some(Node::new(NodeKind::Status).with_attr("text", "TICKET").with_attr("color", "blue")))
//!     }
//! }
//!
//! let registry = Registry::builtin().with_inline(Ticket);
//! assert!(registry.has_inline("ticket"));
//! ```

mod block;
mod inline;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::RenderError;
use crate::node::{Node, NodeKind};
use crate::tokenizer::BlockArgs;

pub use block::{ExpandPlugin, MediaPlugin, PanelPlugin};
pub use inline::{DatePlugin, EmojiPlugin, MentionPlugin, StatusPlugin, emoji_for};
pub(crate) use inline::format_timestamp;

/// Inline directive syntax at the start of the input: `:name[content]{attrs}`.
static INLINE_DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:([A-Za-z][A-Za-z0-9_-]*)\[([^\]\n]*)\](?:\{([^}\n]*)\})?").unwrap()
});

/// Find the first `:name[content]{attrs}` directive with the given name.
pub(crate) fn find_inline_directive(text: &str, name: &str) -> Option<InlineSpan> {
    find_inline_directive_before(text, name, text.len())
}

/// Like [`find_inline_directive`], for directives starting before `limit`.
///
/// Only the text up to `limit` is searched for the directive opener.
pub(crate) fn find_inline_directive_before(
    text: &str,
    name: &str,
    limit: usize,
) -> Option<InlineSpan> {
    let opener = format!(":{name}[");
    let mut end = (limit + opener.len()).saturating_sub(1).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    let mut from = 0;
    while let Some(found) = text[from..end].find(&opener) {
        let start = from + found;
        if let Some(caps) = INLINE_DIRECTIVE_RE.captures(&text[start..]) {
            let whole = caps.get(0)?;
            let mut args = BlockArgs::parse(caps.get(3).map_or("", |m| m.as_str()));
            args.content = caps[2].to_owned();
            return Some(InlineSpan {
                start,
                end: start + whole.end(),
                args,
            });
        }
        from = start + 1;
    }
    None
}

/// Run a plugin hook, turning a panic into a [`RenderError`].
pub(crate) fn isolate<T>(
    plugin: &str,
    hook: impl FnOnce() -> Result<T, RenderError>,
) -> Result<T, RenderError> {
    panic::catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|panic| {
        Err(RenderError::plugin(
            plugin,
            format!("panicked: {}", panic_message(panic.as_ref())),
        ))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// First span `plugin` finds in `text`, if it is usable as a slice of `text`.
pub(crate) fn checked_find(plugin: &dyn InlinePlugin, text: &str) -> Option<InlineSpan> {
    let span = match isolate(plugin.name(), || Ok(plugin.find(text))) {
        Ok(span) => span?,
        Err(e) => {
            tracing::warn!(plugin = plugin.name(), error = %e, "Inline plugin search failed");
            return None;
        }
    };
    let usable = span.start < span.end
        && span.end <= text.len()
        && text.is_char_boundary(span.start)
        && text.is_char_boundary(span.end);
    if !usable {
        tracing::warn!(
            plugin = plugin.name(),
            start = span.start,
            end = span.end,
            "Ignoring empty, out-of-range or misaligned span"
        );
        return None;
    }
    Some(span)
}

/// Byte range matched by an inline plugin, with its parsed arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineSpan {
    /// Start offset in the text run.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
    /// Bracket content and brace attributes.
    pub args: BlockArgs,
}

impl InlineSpan {
    /// Span without arguments.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            args: BlockArgs::default(),
        }
    }
}

/// A `:::name` block handed to a [`BlockPlugin`].
#[derive(Debug)]
pub struct BlockSpan<'a> {
    /// Block name from the opening line.
    pub name: &'a str,
    /// Arguments from the opening line.
    pub args: &'a BlockArgs,
    /// Body, already rendered for the plugin's [`body_kind`](BlockPlugin::body_kind).
    pub children: Vec<Node>,
    /// Original block source.
    pub source: &'a str,
}

/// Per-render state shared with plugins.
#[derive(Debug)]
pub struct RenderContext {
    /// Kind of the node the plugin output will be attached to.
    pub parent: NodeKind,
    warnings: Vec<String>,
}

impl RenderContext {
    #[must_use]
    pub fn new(parent: NodeKind) -> Self {
        Self {
            parent,
            warnings: Vec::new(),
        }
    }

    /// Record a non-fatal problem (e.g. a normalized attribute).
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "Render warning");
        self.warnings.push(message);
    }

    /// Warnings recorded so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

/// Handler for `:::name` ... `:::` blocks.
pub trait BlockPlugin: Send + Sync {
    /// Block name (e.g. `panel`).
    fn name(&self) -> &str;

    /// Whether this plugin handles blocks called `name`.
    fn matches(&self, name: &str) -> bool {
        name == self.name()
    }

    /// Node kind the block body is rendered into.
    ///
    /// The renderer uses it to fit body content to the schema before calling
    /// [`render`](Self::render).
    fn body_kind(&self) -> NodeKind {
        NodeKind::Doc
    }

    /// Build the node for a block.
    fn render(
        &self,
        block: BlockSpan<'_>,
        ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError>;
}

/// Handler for inline syntax inside unmarked text runs.
pub trait InlinePlugin: Send + Sync {
    /// Plugin name (e.g. `status`).
    fn name(&self) -> &str;

    /// Find the first span this plugin recognizes in `text`.
    fn find(&self, text: &str) -> Option<InlineSpan>;

    /// Build the inline node for a span found by [`find`](Self::find).
    fn render(
        &self,
        span: &InlineSpan,
        ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError>;
}

/// A registered plugin.
pub enum Plugin {
    Block(Box<dyn BlockPlugin>),
    Inline(Box<dyn InlinePlugin>),
}

impl Plugin {
    /// Plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Block(plugin) => plugin.name(),
            Self::Inline(plugin) => plugin.name(),
        }
    }
}

/// Ordered plugin list consulted by the tokenizer and renderers.
#[derive(Default)]
pub struct Registry {
    plugins: Vec<Plugin>,
}

impl Registry {
    /// Registry without plugins.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in plugins in priority order:
    /// `panel`, `expand`, `media`, `status`, `date`, `mention`, `emoji`.
    #[must_use]
    pub fn builtin() -> Self {
        Self::empty()
            .with_block(PanelPlugin)
            .with_block(ExpandPlugin)
            .with_block(MediaPlugin)
            .with_inline(StatusPlugin)
            .with_inline(DatePlugin)
            .with_inline(MentionPlugin)
            .with_inline(EmojiPlugin)
    }

    /// Append a block plugin (lowest priority so far).
    #[must_use]
    pub fn with_block<P: BlockPlugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Plugin::Block(Box::new(plugin)));
        self
    }

    /// Append an inline plugin (lowest priority so far).
    #[must_use]
    pub fn with_inline<P: InlinePlugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Plugin::Inline(Box::new(plugin)));
        self
    }

    /// All plugins in priority order.
    pub fn plugins(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    /// First block plugin handling `name`.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&dyn BlockPlugin> {
        self.plugins.iter().find_map(|plugin| match plugin {
            Plugin::Block(block) if block.matches(name) => Some(block.as_ref()),
            _ => None,
        })
    }

    /// Whether any block plugin handles `name`.
    #[must_use]
    pub fn has_block(&self, name: &str) -> bool {
        self.block(name).is_some()
    }

    /// Whether an inline plugin called `name` is registered.
    #[must_use]
    pub fn has_inline(&self, name: &str) -> bool {
        self.inline_plugins().any(|plugin| plugin.name() == name)
    }

    /// Inline plugins in priority order.
    pub fn inline_plugins(&self) -> impl Iterator<Item = &dyn InlinePlugin> {
        self.plugins.iter().filter_map(|plugin| match plugin {
            Plugin::Inline(inline) => Some(inline.as_ref()),
            Plugin::Block(_) => None,
        })
    }

    /// Earliest inline match in `text`; ties go to the higher-priority plugin.
    #[must_use]
    pub fn find_inline(&self, text: &str) -> Option<(&dyn InlinePlugin, InlineSpan)> {
        let mut best: Option<(&dyn InlinePlugin, InlineSpan)> = None;
        for plugin in self.inline_plugins() {
            let Some(span) = checked_find(plugin, text) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, current)| span.start < current.start) {
                best = Some((plugin, span));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let names: Vec<_> = Registry::builtin()
            .plugins()
            .map(|plugin| plugin.name().to_owned())
            .collect();
        assert_eq!(
            names,
            ["panel", "expand", "media", "status", "date", "mention", "emoji"]
        );
    }

    #[test]
    fn test_has_block() {
        let registry = Registry::builtin();
        assert!(registry.has_block("panel"));
        assert!(registry.has_block("media"));
        assert!(!registry.has_block("layout"));
        assert!(!Registry::empty().has_block("panel"));
    }

    #[test]
    fn test_find_inline_directive() {
        let span = find_inline_directive("See :status[Done]{color=green} now", "status").unwrap();
        assert_eq!(span.start, 4);
        assert_eq!(span.end, 30);
        assert_eq!(span.args.content, "Done");
        assert_eq!(span.args.get("color"), Some("green"));
        assert!(find_inline_directive(":date[2024-01-01]", "status").is_none());
        assert!(find_inline_directive(":status[open", "status").is_none());
    }

    #[test]
    fn test_find_inline_directive_skips_malformed_openers() {
        let span = find_inline_directive(":status[\n:status[ok]", "status").unwrap();
        assert_eq!((span.start, span.end), (9, 20));
        assert_eq!(span.args.content, "ok");
    }

    #[test]
    fn test_find_inline_directive_before_limit() {
        let text = "ab :emoji[x] cd";
        assert_eq!(find_inline_directive_before(text, "emoji", 4).unwrap().start, 3);
        assert!(find_inline_directive_before(text, "emoji", 3).is_none());
        assert!(find_inline_directive_before("aé", "x", 0).is_none());
    }

    #[test]
    fn test_find_inline_prefers_earliest_span() {
        let registry = Registry::builtin();
        let (plugin, span) = registry
            .find_inline("Due :date[2024-03-01], owner :mention[abc]")
            .unwrap();
        assert_eq!(plugin.name(), "date");
        assert_eq!(span.start, 4);
    }

    struct Everything;

    impl InlinePlugin for Everything {
        fn name(&self) -> &'static str {
            "everything"
        }

        fn find(&self, text: &str) -> Option<InlineSpan> {
            Some(InlineSpan::new(0, text.len()))
        }

        fn render(
            &self,
            _span: &InlineSpan,
            _ctx: &mut RenderContext,
        ) -> Result<Option<Node>, RenderError> {
            Ok(None)
        }
    }

    #[test]
    fn test_ties_go_to_registration_order() {
        let registry = Registry::empty()
            .with_inline(Everything)
            .with_inline(StatusPlugin);
        let (plugin, _) = registry.find_inline(":status[x]").unwrap();
        assert_eq!(plugin.name(), "everything");
    }

    /// Finds a span cutting through the first character.
    struct Misaligned;

    impl InlinePlugin for Misaligned {
        fn name(&self) -> &'static str {
            "misaligned"
        }

        fn find(&self, text: &str) -> Option<InlineSpan> {
            (!text.is_empty()).then(|| InlineSpan::new(1, text.len()))
        }

        fn render(
            &self,
            _span: &InlineSpan,
            _ctx: &mut RenderContext,
        ) -> Result<Option<Node>, RenderError> {
            Ok(None)
        }
    }

    struct PanicsOnFind;

    impl InlinePlugin for PanicsOnFind {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn find(&self, _text: &str) -> Option<InlineSpan> {
            panic!("find exploded")
        }

        fn render(
            &self,
            _span: &InlineSpan,
            _ctx: &mut RenderContext,
        ) -> Result<Option<Node>, RenderError> {
            Ok(None)
        }
    }

    #[test]
    fn test_find_inline_rejects_unusable_spans() {
        let registry = Registry::empty()
            .with_inline(Misaligned)
            .with_inline(PanicsOnFind)
            .with_inline(StatusPlugin);
        assert!(registry.find_inline("é text").is_none());

        let (plugin, span) = registry.find_inline("é :status[ok]").unwrap();
        assert_eq!(plugin.name(), "status");
        assert_eq!(span.start, 3);
        // ASCII text makes the same span valid
        let (plugin, _) = registry.find_inline("e :status[ok]").unwrap();
        assert_eq!(plugin.name(), "misaligned");
    }

    #[test]
    fn test_isolate_turns_panic_into_error() {
        let result: Result<(), RenderError> = isolate("boom", || panic!("bad input"));
        let message = result.unwrap_err().to_string();
        assert_eq!(message, "boom: panicked: bad input");
        assert_eq!(isolate("ok", || Ok(1)).unwrap(), 1);
    }

    #[test]
    fn test_render_context_warnings() {
        let mut ctx = RenderContext::new(NodeKind::Doc);
        ctx.warn("normalized");
        assert_eq!(ctx.warnings(), ["normalized"]);
        assert_eq!(ctx.take_warnings().len(), 1);
        assert!(ctx.warnings().is_empty());
    }
}
