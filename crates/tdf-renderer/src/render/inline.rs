//! Inline run helpers shared by the tree and flat renderers.

use std::sync::LazyLock;

use regex::Regex;

use crate::node::{Mark, MarkKind, Node, NodeKind};
use crate::plugin::{InlinePlugin, InlineSpan, Registry, checked_find};
use crate::schema::marks_compatible;

/// Text colour for `==highlighted==` text.
pub const HIGHLIGHT_COLOR: &str = "#ff991f";

/// Text colour for `++inserted++` text.
pub const INSERT_COLOR: &str = "#36b37e";

static COLOR_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"==([^=\n]+)==|\+\+([^+\n]+)\+\+").unwrap());

/// A `==text==` or `++text++` span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ColorSpan<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
    pub color: &'static str,
}

pub(crate) fn find_color_span(text: &str) -> Option<ColorSpan<'_>> {
    let caps = COLOR_SPAN_RE.captures(text)?;
    let whole = caps.get(0)?;
    let (inner, color) = match (caps.get(1), caps.get(2)) {
        (Some(inner), _) => (inner, HIGHLIGHT_COLOR),
        (None, Some(inner)) => (inner, INSERT_COLOR),
        (None, None) => return None,
    };
    Some(ColorSpan {
        start: whole.start(),
        end: whole.end(),
        text: inner.as_str(),
        color,
    })
}

/// Piece of an unmarked text run.
pub(crate) enum Piece<'t, 'r> {
    Plain(&'t str),
    /// Span claimed by an inline plugin, with offsets into the whole run.
    Plugin {
        plugin: &'r dyn InlinePlugin,
        span: InlineSpan,
        source: &'t str,
    },
    Color(ColorSpan<'t>),
}

/// Split an unmarked run into plain text, plugin spans and coloured spans.
///
/// The earliest span wins. Plugins win ties with colour spans, and among
/// plugins the one registered first wins. Each pending match is remembered
/// and searched for again only once the cursor has moved past its start,
/// so every plugin scans the run about once.
pub(crate) fn split_run<'t, 'r>(registry: &'r Registry, text: &'t str) -> Vec<Piece<'t, 'r>> {
    let plugins: Vec<&dyn InlinePlugin> = registry.inline_plugins().collect();
    let mut upcoming: Vec<Option<InlineSpan>> = plugins
        .iter()
        .map(|plugin| checked_find(*plugin, text))
        .collect();
    let mut color = find_color_span(text);
    let mut pieces = Vec::new();
    let mut cursor = 0;

    while cursor < text.len() {
        let rest = &text[cursor..];
        for (plugin, slot) in plugins.iter().zip(upcoming.iter_mut()) {
            if slot.as_ref().is_some_and(|span| span.start < cursor) {
                *slot = checked_find(*plugin, rest).map(|span| InlineSpan {
                    start: span.start + cursor,
                    end: span.end + cursor,
                    args: span.args,
                });
            }
        }
        if color.is_some_and(|span| span.start < cursor) {
            color = find_color_span(rest).map(|span| ColorSpan {
                start: span.start + cursor,
                end: span.end + cursor,
                ..span
            });
        }

        let first = plugins
            .iter()
            .zip(&upcoming)
            .filter_map(|(plugin, span)| Some((*plugin, span.as_ref()?)))
            .min_by_key(|(_, span)| span.start);

        match (first, color) {
            (Some((plugin, span)), color) if color.is_none_or(|color| span.start <= color.start) => {
                push_plain(&mut pieces, &text[cursor..span.start]);
                pieces.push(Piece::Plugin {
                    plugin,
                    span: span.clone(),
                    source: &text[span.start..span.end],
                });
                cursor = span.end;
            }
            (_, Some(span)) => {
                push_plain(&mut pieces, &text[cursor..span.start]);
                pieces.push(Piece::Color(span));
                cursor = span.end;
            }
            (_, None) => {
                push_plain(&mut pieces, rest);
                break;
            }
        }
    }
    pieces
}

fn push_plain<'t>(pieces: &mut Vec<Piece<'t, '_>>, text: &'t str) {
    if !text.is_empty() {
        pieces.push(Piece::Plain(text));
    }
}

/// Marks to apply from the open mark stack, outermost first.
///
/// A mark that conflicts with one already kept is dropped.
pub(crate) fn effective_marks(stack: &[Mark]) -> Vec<Mark> {
    let mut marks: Vec<Mark> = Vec::with_capacity(stack.len());
    for mark in stack {
        if marks
            .iter()
            .all(|kept| marks_compatible(kept.kind(), mark.kind()))
        {
            marks.push(mark.clone());
        }
    }
    marks
}

/// Marks for an inline code span: `code` wins over every incompatible mark.
pub(crate) fn code_marks(stack: &[Mark]) -> Vec<Mark> {
    let mut marks = effective_marks(stack);
    marks.retain(|mark| marks_compatible(mark.kind(), MarkKind::Code));
    marks.push(Mark::Code);
    marks
}

/// Merge adjacent text nodes that carry identical marks.
pub(crate) fn merge_text(content: &mut Vec<Node>) {
    let mut merged: Vec<Node> = Vec::with_capacity(content.len());
    for node in content.drain(..) {
        if let Some(last) = merged.last_mut()
            && last.kind == NodeKind::Text
            && node.kind == NodeKind::Text
            && last.marks == node.marks
            && let (Some(acc), Some(text)) = (last.text.as_mut(), node.text.as_deref())
        {
            acc.push_str(text);
            continue;
        }
        merged.push(node);
    }
    *content = merged;
}

/// Expands the first whole-word occurrence of each abbreviation.
pub(crate) struct Abbreviations<'a> {
    definitions: &'a [(String, String)],
    expanded: Vec<bool>,
}

impl<'a> Abbreviations<'a> {
    pub(crate) fn new(definitions: &'a [(String, String)]) -> Self {
        Self {
            definitions,
            expanded: vec![false; definitions.len()],
        }
    }

    /// Rewrite `text`, turning the first unexpanded `ABBR` into `ABBR (Expansion)`.
    pub(crate) fn expand(&mut self, text: &str) -> String {
        let mut out = text.to_owned();
        for (i, (abbr, expansion)) in self.definitions.iter().enumerate() {
            if self.expanded[i] {
                continue;
            }
            if let Some(pos) = find_word(&out, abbr) {
                out.insert_str(pos + abbr.len(), &format!(" ({expansion})"));
                self.expanded[i] = true;
            }
        }
        out
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offset of the first occurrence of `word` not embedded in a longer word.
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack.match_indices(word).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}
