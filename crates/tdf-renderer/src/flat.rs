//! Flat-string generator for deployments without tree support.
//!
//! Walks the same [`TokenStream`] as the tree renderer and emits the legacy
//! wiki markup (`h1.` headings, `*strong*`, `{code}` blocks, `||th||` tables
//! and so on). Plugins are reused: a block plugin is rendered once to obtain
//! its normalized attributes, and its body is generated from the tokens.
//! The table and list guards apply here as well.
//!
//! Source text is escaped so that characters with a meaning in wiki markup
//! (`*`, `_`, braces, brackets, `|`, `^`, `~` and the backslash itself) come
//! out literally.

use std::mem;

use crate::node::{Node, NodeKind};
use crate::plugin::{BlockSpan, Registry, RenderContext, format_timestamp, isolate};
use crate::render::inline::{Abbreviations, Piece, split_run};
use crate::render::{FLATTENED_MARKER, RenderOptions, alert_panel};
use crate::schema::PanelType;
use crate::token::{Column, Container, CustomBlock, Token, TokenStream};
use crate::tokenizer::BlockArgs;

enum Frame {
    Paragraph,
    Heading(u8),
    List(char),
    FlattenedList,
    Item { started: bool },
    FlattenedItem { started: bool },
    Quote,
    Panel(&'static str),
    Table { rows: usize, dropped: usize },
    Row { header: bool, cells: Vec<String> },
    Cell,
    DefinitionTitle,
    Transparent,
}

/// Generates wiki markup from token streams.
pub struct FlatRenderer<'r> {
    registry: &'r Registry,
    options: RenderOptions,
}

impl<'r> FlatRenderer<'r> {
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

    /// Render a token stream as wiki markup.
    ///
    /// # Example
    ///
    /// ```
    /// use tdf_renderer::{FlatRenderer, Registry, tokenize};
    ///
    /// let registry = Registry::builtin();
    /// let stream = tokenize("# Title\n\n**bold** and `code`", &registry);
    /// let flat = FlatRenderer::new(&registry).render(&stream);
    /// assert_eq!(flat, "h1. Title\n\n*bold* and {{code}}");
    /// ```
    #[must_use]
    pub fn render(&self, stream: &TokenStream) -> String {
        let mut writer = Writer {
            registry: self.registry,
            options: &self.options,
            abbreviations: Abbreviations::new(&stream.abbreviations),
            lines: Vec::new(),
            frames: Vec::new(),
            inline: String::new(),
            pending: String::new(),
            mark_depth: 0,
            links: Vec::new(),
            skip: 0,
            image: None,
        };
        writer.walk(&stream.tokens);
        writer.finish()
    }
}

struct Writer<'r> {
    registry: &'r Registry,
    options: &'r RenderOptions,
    abbreviations: Abbreviations<'r>,
    lines: Vec<String>,
    frames: Vec<Frame>,
    inline: String,
    pending: String,
    mark_depth: usize,
    links: Vec<String>,
    skip: usize,
    image: Option<(String, String, usize)>,
}

impl Writer<'_> {
    fn walk(&mut self, tokens: &[Token]) {
        for token in tokens {
            self.token(token);
        }
        self.flush_run();
        self.flush_block();
    }

    fn finish(mut self) -> String {
        while self.lines.last().is_some_and(String::is_empty) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }

    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Closing macro line, directly after the last body line.
    fn close(&mut self, line: &str) {
        while self.lines.last().is_some_and(String::is_empty) {
            self.lines.pop();
        }
        self.line(line);
        self.blank();
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|line| !line.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn token(&mut self, token: &Token) {
        if self.skip > 0 {
            match token {
                Token::Start(_) => self.skip += 1,
                Token::End(_) => self.skip -= 1,
                _ => {}
            }
            return;
        }
        if let Some((src, alt, depth)) = self.image.as_mut() {
            match token {
                Token::Start(Container::Image { .. }) => *depth += 1,
                Token::End(Container::Image { .. }) => {
                    *depth -= 1;
                    if *depth == 0 {
                        let image = if alt.trim().is_empty() {
                            format!("!{src}!")
                        } else {
                            format!("!{src}|alt={}!", alt.trim())
                        };
                        self.inline.push_str(&image);
                        self.image = None;
                    }
                }
                Token::Text(text) | Token::Code(text) => alt.push_str(text),
                _ => {}
            }
            return;
        }

        match token {
            Token::Start(container) => self.start(container),
            Token::End(container) => self.end(container),
            Token::Text(text) => self.pending.push_str(text),
            Token::SoftBreak => self.pending.push(' '),
            Token::HardBreak => {
                self.flush_run();
                self.inline.push_str("\\\\");
            }
            Token::TaskMarker(checked) => {
                self.flush_run();
                self.inline.push_str(if *checked { "[x] " } else { "[ ] " });
            }
            Token::Code(code) => {
                self.flush_run();
                self.inline.push_str(&format!("{{{{{code}}}}}"));
            }
            Token::CodeBlock { language, content } => {
                self.flush_run();
                self.flush_block();
                self.line(match language {
                    Some(language) => format!("{{code:{language}}}"),
                    None => "{code}".to_owned(),
                });
                if !content.is_empty() {
                    self.line(content.as_str());
                }
                self.line("{code}");
                self.blank();
            }
            Token::Rule => {
                self.flush_run();
                self.flush_block();
                self.line("----");
                self.blank();
            }
            Token::Literal(line) => {
                self.flush_run();
                self.flush_block();
                self.literal(line);
            }
            Token::Custom(block) => {
                self.flush_run();
                self.flush_block();
                match block {
                    CustomBlock::Plugin {
                        name,
                        args,
                        body,
                        source,
                    } => self.block_plugin(name, args, body, source),
                    CustomBlock::Layout { columns } => self.layout(columns),
                }
            }
        }
    }

    fn start(&mut self, container: &Container) {
        self.flush_run();
        if is_bare_link(container) {
            return;
        }
        let mark = match container {
            Container::Emphasis => Some("_"),
            Container::Strong => Some("*"),
            Container::Strikethrough => Some("-"),
            Container::Superscript => Some("^"),
            Container::Subscript => Some("~"),
            Container::Link { href } => {
                self.links.push(href.clone());
                Some("[")
            }
            _ => None,
        };
        if let Some(mark) = mark {
            self.inline.push_str(mark);
            self.mark_depth += 1;
            return;
        }
        if let Container::Image { src, .. } = container {
            self.image = Some((src.clone(), String::new(), 1));
            return;
        }

        self.flush_block();
        let frame = match container {
            Container::Paragraph => Frame::Paragraph,
            Container::Heading(level) => Frame::Heading(*level),
            Container::BlockQuote(None) | Container::DefinitionDetails => {
                self.line("{quote}");
                Frame::Quote
            }
            Container::BlockQuote(Some(alert)) => {
                let name = panel_macro(alert_panel(*alert));
                self.line(format!("{{{name}}}"));
                Frame::Panel(name)
            }
            Container::List(start) => {
                let depth = self
                    .frames
                    .iter()
                    .filter(|frame| matches!(frame, Frame::List(_)))
                    .count();
                if depth >= self.options.max_list_depth {
                    Frame::FlattenedList
                } else {
                    Frame::List(if start.is_some() { '#' } else { '*' })
                }
            }
            Container::Item => {
                if matches!(self.frames.last(), Some(Frame::FlattenedList)) {
                    Frame::FlattenedItem { started: false }
                } else {
                    Frame::Item { started: false }
                }
            }
            Container::Table => Frame::Table {
                rows: 0,
                dropped: 0,
            },
            Container::TableHead | Container::TableRow => {
                if !self.admit_row() {
                    self.skip = 1;
                    return;
                }
                Frame::Row {
                    header: matches!(container, Container::TableHead),
                    cells: Vec::new(),
                }
            }
            Container::TableCell => Frame::Cell,
            Container::DefinitionList => Frame::Transparent,
            Container::DefinitionTitle => Frame::DefinitionTitle,
            Container::Emphasis
            | Container::Strong
            | Container::Strikethrough
            | Container::Superscript
            | Container::Subscript
            | Container::Link { .. }
            | Container::Image { .. } => return,
        };
        self.frames.push(frame);
    }

    fn end(&mut self, container: &Container) {
        self.flush_run();
        if is_bare_link(container) {
            return;
        }
        let mark = match container {
            Container::Emphasis => Some("_".to_owned()),
            Container::Strong => Some("*".to_owned()),
            Container::Strikethrough => Some("-".to_owned()),
            Container::Superscript => Some("^".to_owned()),
            Container::Subscript => Some("~".to_owned()),
            Container::Link { .. } => Some(format!("|{}]", self.links.pop().unwrap_or_default())),
            _ => None,
        };
        if let Some(mark) = mark {
            self.inline.push_str(&mark);
            self.mark_depth = self.mark_depth.saturating_sub(1);
            return;
        }
        if matches!(container, Container::Image { .. }) {
            return;
        }

        let Some(frame) = self.frames.pop() else {
            return;
        };
        match frame {
            Frame::Paragraph => {
                let text = mem::take(&mut self.inline);
                self.text_block(&text);
            }
            Frame::DefinitionTitle => {
                let text = mem::take(&mut self.inline);
                self.text_block(&format!("*{}*", text.trim()));
            }
            Frame::Heading(level) => {
                let text = mem::take(&mut self.inline);
                self.line(format!("h{level}. {}", text.trim()));
                self.blank();
            }
            Frame::Cell => {
                let text = mem::take(&mut self.inline).trim().to_owned();
                if let Some(Frame::Row { cells, .. }) = self.frames.last_mut() {
                    cells.push(text);
                }
            }
            Frame::Row { header, cells } => {
                let sep = if header { "||" } else { "|" };
                self.line(format!("{sep}{}{sep}", cells.join(sep)));
            }
            Frame::Table { dropped, .. } => {
                if dropped > 0 {
                    self.line(format!(
                        "_Content truncated: {dropped} more table rows not shown._"
                    ));
                }
                self.blank();
            }
            Frame::Quote => {
                self.flush_block();
                self.close("{quote}");
            }
            Frame::Panel(name) => {
                self.flush_block();
                self.close(&format!("{{{name}}}"));
            }
            Frame::List(_) => {
                if !self.frames.iter().any(|frame| matches!(frame, Frame::List(_))) {
                    self.blank();
                }
            }
            frame @ (Frame::Item { .. } | Frame::FlattenedItem { .. }) => {
                // Tight items carry their text without a paragraph
                self.frames.push(frame);
                self.flush_block();
                self.frames.pop();
            }
            Frame::FlattenedList | Frame::Transparent => {}
        }
    }

    /// Emit inline text left over from a tight list item.
    fn flush_block(&mut self) {
        if self.inline.trim().is_empty() {
            self.inline.clear();
            return;
        }
        let text = mem::take(&mut self.inline);
        self.text_block(&text);
    }

    fn text_block(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let prefix: String = self
            .frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::List(c) => Some(*c),
                _ => None,
            })
            .collect();
        let item = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Item { started } => Some((started, "")),
            Frame::FlattenedItem { started } => Some((started, FLATTENED_MARKER)),
            _ => None,
        });
        match item {
            Some((started, marker)) => {
                let line = if *started {
                    text.to_owned()
                } else {
                    *started = true;
                    format!("{prefix} {marker}{text}")
                };
                self.line(line);
            }
            None => {
                self.line(text);
                self.blank();
            }
        }
    }

    fn admit_row(&mut self) -> bool {
        let max_rows = self.options.max_table_rows;
        let Some(Frame::Table { rows, dropped }) = self
            .frames
            .iter_mut()
            .rev()
            .find(|frame| matches!(frame, Frame::Table { .. }))
        else {
            return true;
        };
        if *rows < max_rows {
            *rows += 1;
            true
        } else {
            *dropped += 1;
            false
        }
    }

    fn flush_run(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = mem::take(&mut self.pending);
        if self.mark_depth > 0 {
            let text = self.abbreviations.expand(&text);
            self.inline.push_str(&escape(&text));
            return;
        }

        let registry = self.registry;
        for piece in split_run(registry, &text) {
            match piece {
                Piece::Plain(plain) => self.push_plain(plain),
                Piece::Plugin {
                    plugin,
                    span,
                    source,
                } => {
                    let mut ctx = RenderContext::new(NodeKind::Paragraph);
                    let markup = match isolate(plugin.name(), || plugin.render(&span, &mut ctx)) {
                        Ok(Some(node)) => inline_markup(&node),
                        Ok(None) => None,
                        Err(e) => {
                            tracing::warn!(plugin = plugin.name(), error = %e, "Inline plugin failed, keeping source text");
                            None
                        }
                    };
                    let markup = markup.unwrap_or_else(|| escape(source));
                    self.inline.push_str(&markup);
                }
                Piece::Color(span) => {
                    self.inline.push_str(&format!(
                        "{{color:{}}}{}{{color}}",
                        span.color,
                        escape(span.text)
                    ));
                }
            }
        }
    }

    fn push_plain(&mut self, text: &str) {
        let text = self.abbreviations.expand(text);
        self.inline.push_str(&escape(&text));
    }

    fn literal(&mut self, line: &str) {
        if !line.trim().is_empty() {
            self.line(line.trim_end());
            self.blank();
        }
    }

    fn literal_source(&mut self, source: &str) {
        for line in source.lines() {
            self.literal(line);
        }
    }

    fn block_plugin(&mut self, name: &str, args: &BlockArgs, body: &TokenStream, source: &str) {
        let registry = self.registry;
        let Some(plugin) = registry.block(name) else {
            self.literal_source(source);
            return;
        };
        let mut ctx = RenderContext::new(NodeKind::Doc);
        let result = isolate(plugin.name(), || {
            plugin.render(
                BlockSpan {
                    name,
                    args,
                    children: Vec::new(),
                    source,
                },
                &mut ctx,
            )
        });
        let node = match result {
            Ok(Some(node)) => node,
            Ok(None) => {
                self.literal_source(source);
                return;
            }
            Err(e) => {
                tracing::warn!(block = name, error = %e, "Block plugin failed, keeping source text");
                self.literal_source(source);
                return;
            }
        };

        match node.kind {
            NodeKind::Panel => {
                let panel_type = node
                    .attr_str("panelType")
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or_default();
                let name = panel_macro(panel_type);
                self.wrapped(&format!("{{{name}}}"), &format!("{{{name}}}"), body);
            }
            NodeKind::Expand => {
                let title = node.attr_str("title").unwrap_or_default();
                let open = if title.is_empty() {
                    "{expand}".to_owned()
                } else {
                    format!("{{expand:{title}}}")
                };
                self.wrapped(&open, "{expand}", body);
            }
            NodeKind::MediaSingle => {
                let target = node
                    .content
                    .first()
                    .and_then(|media| media.attr_str("url").or_else(|| media.attr_str("id")))
                    .unwrap_or_default();
                self.line(format!("!{target}!"));
                self.blank();
            }
            _ => {
                let text = node.plain_text();
                self.text_block(&text);
            }
        }
    }

    fn wrapped(&mut self, open: &str, close: &str, body: &TokenStream) {
        self.line(open);
        let frames = mem::take(&mut self.frames);
        self.walk(&body.tokens);
        self.frames = frames;
        self.close(close);
    }

    fn layout(&mut self, columns: &[Column]) {
        let count = columns.len().max(1);
        let default_width = 100 / count;
        self.line("{section}");
        for column in columns {
            let width = column
                .args
                .get("width")
                .map_or_else(|| default_width.to_string(), |w| w.trim_end_matches('%').to_owned());
            self.wrapped(&format!("{{column:width={width}%}}"), "{column}", &column.body);
        }
        self.close("{section}");
    }
}

/// A link without a target, rendered as its text alone.
fn is_bare_link(container: &Container) -> bool {
    matches!(container, Container::Link { href } if href.is_empty())
}

/// Backslash-escape characters that wiki markup would interpret.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '{' | '}' | '[' | ']' | '|' | '^' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn panel_macro(panel_type: PanelType) -> &'static str {
    match panel_type {
        PanelType::Info => "info",
        PanelType::Note => "note",
        PanelType::Warning | PanelType::Error => "warning",
        PanelType::Success => "tip",
    }
}

/// Wiki markup for an inline plugin node.
fn inline_markup(node: &Node) -> Option<String> {
    match node.kind {
        NodeKind::Status => {
            let title = node.attr_str("text")?;
            let colour = match node.attr_str("color").unwrap_or("neutral") {
                "purple" => "Purple",
                "blue" => "Blue",
                "red" => "Red",
                "yellow" => "Yellow",
                "green" => "Green",
                _ => "Grey",
            };
            Some(format!("{{status:colour={colour}|title={title}}}"))
        }
        NodeKind::Mention => Some(format!("[~accountid:{}]", node.attr_str("id")?)),
        NodeKind::Date => {
            let millis: i64 = node.attr_str("timestamp")?.parse().ok()?;
            Some(format_timestamp(millis))
        }
        NodeKind::Emoji => node
            .attr_str("text")
            .or_else(|| node.attr_str("shortName"))
            .map(str::to_owned),
        _ => Some(node.plain_text()),
    }
}
