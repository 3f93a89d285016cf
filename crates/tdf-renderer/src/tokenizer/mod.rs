//! Tokenizer: markup text to [`TokenStream`].
//!
//! Tokenization runs in two layers:
//!
//! 1. A line scanner recognizes `:::name` ... `:::` custom blocks ahead of
//!    every markdown rule (including fenced code), so a custom block is never
//!    read as something else. Block bodies are tokenized recursively;
//!    `:::layout` bodies are split into `::: column` sub-documents.
//! 2. The remaining markdown goes through `pulldown-cmark` with the extended
//!    grammar enabled (tables, strikethrough, task lists, alerts, definition
//!    lists, superscript and subscript) and is converted to owned tokens.
//!
//! Tokenization never fails: unrecognized or unterminated syntax is kept as
//! [`Token::Literal`] text.

mod args;
mod blocks;
mod fence;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::plugin::Registry;
use crate::token::{Column, Container, CustomBlock, Token, TokenStream};

pub use args::BlockArgs;

/// Name of the built-in multi-column block.
pub const LAYOUT: &str = "layout";

/// Name of the column sub-block inside a layout.
pub const COLUMN: &str = "column";

/// Custom blocks nested deeper than this are kept as literal text.
const MAX_BLOCK_DEPTH: usize = 16;

/// Markdown grammar options for the base tokenizer.
#[must_use]
pub fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_GFM
        | Options::ENABLE_DEFINITION_LIST
        | Options::ENABLE_SUPERSCRIPT
        | Options::ENABLE_SUBSCRIPT
}

/// Tokenize markup text using the block plugins in `registry`.
///
/// # Example
///
/// ```
/// use tdf_renderer::{Registry, Token, tokenize};
///
/// let stream = tokenize(":::panel warning\nMind the gap\n:::\n", &Registry::builtin());
/// assert!(matches!(stream.tokens[0], Token::Custom(_)));
/// ```
#[must_use]
pub fn tokenize(text: &str, registry: &Registry) -> TokenStream {
    tokenize_at(text, registry, 0)
}

fn tokenize_at(text: &str, registry: &Registry, depth: usize) -> TokenStream {
    let mut stream = TokenStream::default();
    let recognized =
        |name: &str| depth < MAX_BLOCK_DEPTH && (name == LAYOUT || registry.has_block(name));

    for segment in blocks::scan(text, &recognized, &mut stream.abbreviations) {
        match segment {
            blocks::Segment::Markdown(markdown) => push_markdown(&markdown, &mut stream.tokens),
            blocks::Segment::Literal(line) => stream.tokens.push(Token::Literal(line)),
            blocks::Segment::Block { name, body, .. } if name == LAYOUT => {
                let layout = tokenize_layout(&body, registry, depth + 1, &mut stream);
                stream.tokens.push(Token::Custom(layout));
            }
            blocks::Segment::Block {
                name,
                args,
                body,
                source,
            } => {
                let mut body = tokenize_at(&body, registry, depth + 1);
                stream.abbreviations.append(&mut body.abbreviations);
                stream.tokens.push(Token::Custom(CustomBlock::Plugin {
                    name,
                    args,
                    body,
                    source,
                }));
            }
        }
    }

    stream
}

/// Split a layout body into columns, each tokenized as its own document.
///
/// Content outside `::: column` blocks becomes an implicit column.
fn tokenize_layout(
    body: &str,
    registry: &Registry,
    depth: usize,
    parent: &mut TokenStream,
) -> CustomBlock {
    let mut columns = Vec::new();
    let is_column = |name: &str| name == COLUMN;

    for segment in blocks::scan(body, &is_column, &mut parent.abbreviations) {
        let (args, mut stream) = match segment {
            blocks::Segment::Block { args, body, .. } => {
                (args, tokenize_at(&body, registry, depth + 1))
            }
            blocks::Segment::Markdown(markdown) if markdown.trim().is_empty() => continue,
            blocks::Segment::Markdown(markdown) => (
                BlockArgs::default(),
                tokenize_at(&markdown, registry, depth + 1),
            ),
            blocks::Segment::Literal(line) => (
                BlockArgs::default(),
                TokenStream {
                    tokens: vec![Token::Literal(line)],
                    abbreviations: Vec::new(),
                },
            ),
        };
        parent.abbreviations.append(&mut stream.abbreviations);
        columns.push(Column { args, body: stream });
    }

    if columns.is_empty() {
        columns.push(Column {
            args: BlockArgs::default(),
            body: TokenStream::default(),
        });
    }

    CustomBlock::Layout { columns }
}

/// Convert markdown through the base grammar and append owned tokens.
fn push_markdown(markdown: &str, out: &mut Vec<Token>) {
    let mut open: Vec<Container> = Vec::new();
    let mut code: Option<(Option<String>, String)> = None;
    let mut html: Option<String> = None;

    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Start(tag) => match tag {
                Tag::CodeBlock(kind) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => {
                            info.split_whitespace().next().map(str::to_owned)
                        }
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((language, String::new()));
                }
                Tag::HtmlBlock => html = Some(String::new()),
                Tag::FootnoteDefinition(_) | Tag::MetadataBlock(_) => {}
                other => {
                    let container = container_for(other);
                    out.push(Token::Start(container.clone()));
                    open.push(container);
                }
            },
            Event::End(tag) => match tag {
                TagEnd::CodeBlock => {
                    if let Some((language, mut content)) = code.take() {
                        if content.ends_with('\n') {
                            content.pop();
                        }
                        out.push(Token::CodeBlock { language, content });
                    }
                }
                TagEnd::HtmlBlock => {
                    if let Some(block) = html.take() {
                        out.push(Token::Literal(block.trim_end().to_owned()));
                    }
                }
                TagEnd::FootnoteDefinition | TagEnd::MetadataBlock(_) => {}
                _ => {
                    if let Some(container) = open.pop() {
                        out.push(Token::End(container));
                    }
                }
            },
            Event::Text(text) => {
                if let Some((_, content)) = code.as_mut() {
                    content.push_str(&text);
                } else {
                    out.push(Token::Text(text.into_string()));
                }
            }
            Event::Html(raw) => match html.as_mut() {
                Some(block) => block.push_str(&raw),
                None => out.push(Token::Literal(raw.trim_end().to_owned())),
            },
            Event::InlineHtml(raw) => out.push(Token::Text(raw.into_string())),
            Event::Code(code_span) => out.push(Token::Code(code_span.into_string())),
            Event::InlineMath(math) | Event::DisplayMath(math) => {
                out.push(Token::Text(math.into_string()));
            }
            Event::FootnoteReference(label) => out.push(Token::Text(format!("[^{label}]"))),
            Event::SoftBreak => out.push(Token::SoftBreak),
            Event::HardBreak => out.push(Token::HardBreak),
            Event::Rule => out.push(Token::Rule),
            Event::TaskListMarker(checked) => out.push(Token::TaskMarker(checked)),
        }
    }
}

fn container_for(tag: Tag<'_>) -> Container {
    match tag {
        Tag::Heading { level, .. } => Container::Heading(heading_level_to_num(level)),
        Tag::BlockQuote(kind) => Container::BlockQuote(kind.map(Into::into)),
        Tag::List(start) => Container::List(start),
        Tag::Item => Container::Item,
        Tag::Table(_) => Container::Table,
        Tag::TableHead => Container::TableHead,
        Tag::TableRow => Container::TableRow,
        Tag::TableCell => Container::TableCell,
        Tag::DefinitionList => Container::DefinitionList,
        Tag::DefinitionListTitle => Container::DefinitionTitle,
        Tag::DefinitionListDefinition => Container::DefinitionDetails,
        Tag::Emphasis => Container::Emphasis,
        Tag::Strong => Container::Strong,
        Tag::Strikethrough => Container::Strikethrough,
        Tag::Superscript => Container::Superscript,
        Tag::Subscript => Container::Subscript,
        Tag::Link { dest_url, .. } => Container::Link {
            href: dest_url.into_string(),
        },
        Tag::Image {
            dest_url, title, ..
        } => Container::Image {
            src: dest_url.into_string(),
            title: title.into_string(),
        },
        // Code blocks, HTML blocks, footnotes and metadata are handled by the caller
        Tag::Paragraph
        | Tag::CodeBlock(_)
        | Tag::HtmlBlock
        | Tag::FootnoteDefinition(_)
        | Tag::MetadataBlock(_) => Container::Paragraph,
    }
}

fn heading_level_to_num(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
