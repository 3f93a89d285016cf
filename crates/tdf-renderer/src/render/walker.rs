//! Token walker behind [`TreeRenderer`](super::TreeRenderer).
//!
//! Open containers live on a frame stack. Finished nodes are attached to the
//! nearest frame that carries a node; when the schema rejects a child, it is
//! degraded (see [`degrade`](super::degrade)) rather than dropped. Inline text
//! is buffered and flushed as one run whenever the mark stack or the
//! structure changes.

use std::mem;

use crate::node::{Mark, Node, NodeKind, SubSup};
use crate::plugin::{BlockSpan, InlinePlugin, InlineSpan, Registry, RenderContext, isolate};
use crate::schema::{MediaLayout, MediaType, PanelType, allows, hosts_inline};
use crate::token::{AlertKind, Column, Container, CustomBlock, Token};
use crate::tokenizer::BlockArgs;

use super::RenderOptions;
use super::degrade::{degrade, fallback_text};
use super::inline::{Abbreviations, Piece, code_marks, effective_marks, merge_text, split_run};

/// Prefix for list items flattened by the depth guard.
pub const FLATTENED_MARKER: &str = "↳ ";

#[derive(Debug)]
enum Role {
    /// Root of a document or plugin body.
    Root,
    Block,
    Paragraph,
    /// Paragraph opened for inline content in a block-only container.
    Implicit,
    List,
    /// List past the depth cap: items land in the enclosing list item.
    FlattenedList,
    Table {
        rows: usize,
        dropped: usize,
    },
    HeaderRow,
    /// Container without a node of its own.
    Transparent,
}

struct Frame {
    node: Option<Node>,
    role: Role,
    pushed_mark: bool,
    /// Block nodes met inside a paragraph, attached after it closes.
    deferred: Vec<Node>,
}

impl Frame {
    fn new(node: Node, role: Role) -> Self {
        Self {
            node: Some(node),
            role,
            pushed_mark: false,
            deferred: Vec::new(),
        }
    }

    fn transparent(role: Role) -> Self {
        Self {
            node: None,
            role,
            pushed_mark: false,
            deferred: Vec::new(),
        }
    }
}

struct ImageCapture {
    src: String,
    alt: String,
    depth: usize,
}

pub(super) struct Walker<'r> {
    registry: &'r Registry,
    options: &'r RenderOptions,
    abbreviations: Abbreviations<'r>,
    stack: Vec<Frame>,
    /// Frames below this index belong to an enclosing render.
    floor: usize,
    marks: Vec<Mark>,
    pending: String,
    /// Nesting depth of a skipped (truncated) table row.
    skip: usize,
    image: Option<ImageCapture>,
    marker_pending: bool,
    pub(super) warnings: Vec<String>,
}

impl<'r> Walker<'r> {
    pub(super) fn new(
        registry: &'r Registry,
        options: &'r RenderOptions,
        abbreviations: &'r [(String, String)],
    ) -> Self {
        Self {
            registry,
            options,
            abbreviations: Abbreviations::new(abbreviations),
            stack: Vec::new(),
            floor: 0,
            marks: Vec::new(),
            pending: String::new(),
            skip: 0,
            image: None,
            marker_pending: false,
            warnings: Vec::new(),
        }
    }

    /// Render `tokens` as the children of `root` and return it.
    pub(super) fn render_into(&mut self, root: Node, tokens: &[Token]) -> Node {
        let kind = root.kind;
        let saved_marks = mem::take(&mut self.marks);
        let saved_marker = mem::take(&mut self.marker_pending);
        let saved_floor = self.floor;

        self.stack.push(Frame::new(root, Role::Root));
        self.floor = self.stack.len();

        for token in tokens {
            self.token(token);
        }
        self.flush_run();
        self.image = None;
        self.skip = 0;
        while self.stack.len() > self.floor {
            self.close_top();
        }

        self.floor = saved_floor;
        self.marks = saved_marks;
        self.marker_pending = saved_marker;
        self.stack
            .pop()
            .and_then(|frame| frame.node)
            .unwrap_or_else(|| Node::new(kind))
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

        if let Some(image) = self.image.as_mut() {
            match token {
                Token::Start(Container::Image { .. }) => image.depth += 1,
                Token::End(Container::Image { .. }) => {
                    image.depth -= 1;
                    if image.depth == 0 {
                        self.finish_image();
                    }
                }
                Token::Text(text) | Token::Code(text) => image.alt.push_str(text),
                Token::SoftBreak | Token::HardBreak => image.alt.push(' '),
                _ => {}
            }
            return;
        }

        match token {
            Token::Start(container) => self.start(container),
            Token::End(container) => self.end(container),
            Token::Text(text) => self.pending.push_str(text),
            Token::SoftBreak => self.pending.push(' '),
            Token::HardBreak => self.pending.push('\n'),
            Token::TaskMarker(checked) => {
                self.pending.push_str(if *checked { "[x] " } else { "[ ] " });
            }
            Token::Code(code) => {
                self.flush_run();
                if !code.is_empty() {
                    let marks = code_marks(&self.marks);
                    self.attach(Node::marked_text(code.clone(), marks));
                }
            }
            Token::CodeBlock { language, content } => {
                self.flush_run();
                let mut node = Node::new(NodeKind::CodeBlock);
                if let Some(language) = language {
                    node = node.with_attr("language", language.as_str());
                }
                if !content.is_empty() {
                    node.content.push(Node::text(content.clone()));
                }
                self.attach(node);
            }
            Token::Rule => {
                self.flush_run();
                self.attach(Node::new(NodeKind::Rule));
            }
            Token::Literal(line) => {
                self.flush_run();
                self.literal(line);
            }
            Token::Custom(block) => {
                self.flush_run();
                self.close_implicit();
                match block {
                    CustomBlock::Plugin {
                        name,
                        args,
                        body,
                        source,
                    } => self.block_plugin(name, args, &body.tokens, source),
                    CustomBlock::Layout { columns } => self.layout(columns),
                }
            }
        }
    }

    fn start(&mut self, container: &Container) {
        self.flush_run();
        if let Some(mark) = mark_for(container) {
            self.marks.push(mark);
            return;
        }
        // A link without a target keeps its text unlinked
        if matches!(container, Container::Link { .. }) {
            return;
        }
        if let Container::Image { src, .. } = container {
            self.image = Some(ImageCapture {
                src: src.clone(),
                alt: String::new(),
                depth: 1,
            });
            return;
        }

        self.close_implicit();
        let frame = match container {
            Container::Paragraph => self.paragraph_frame(Role::Paragraph),
            Container::Heading(level) => Frame::new(Node::heading(*level, Vec::new()), Role::Block),
            Container::BlockQuote(None) | Container::DefinitionDetails => {
                Frame::new(Node::new(NodeKind::Blockquote), Role::Block)
            }
            Container::BlockQuote(Some(alert)) => Frame::new(
                Node::new(NodeKind::Panel).with_attr("panelType", alert_panel(*alert).as_str()),
                Role::Block,
            ),
            Container::List(start) => {
                if self.list_depth() >= self.options.max_list_depth {
                    tracing::debug!(
                        max_depth = self.options.max_list_depth,
                        "Flattening list nested past the depth cap"
                    );
                    Frame::transparent(Role::FlattenedList)
                } else {
                    let node = match start {
                        Some(order) => Node::new(NodeKind::OrderedList).with_attr("order", *order),
                        None => Node::new(NodeKind::BulletList),
                    };
                    Frame::new(node, Role::List)
                }
            }
            Container::Item => {
                if self.top_role_is(|role| matches!(role, Role::FlattenedList)) {
                    self.marker_pending = true;
                    Frame::transparent(Role::Transparent)
                } else {
                    Frame::new(Node::new(NodeKind::ListItem), Role::Block)
                }
            }
            Container::Table => Frame::new(
                Node::new(NodeKind::Table),
                Role::Table {
                    rows: 0,
                    dropped: 0,
                },
            ),
            Container::TableHead | Container::TableRow => {
                if !self.admit_row() {
                    self.skip = 1;
                    return;
                }
                let role = if matches!(container, Container::TableHead) {
                    Role::HeaderRow
                } else {
                    Role::Block
                };
                Frame::new(Node::new(NodeKind::TableRow), role)
            }
            Container::TableCell => {
                let kind = if self.top_role_is(|role| matches!(role, Role::HeaderRow)) {
                    NodeKind::TableHeader
                } else {
                    NodeKind::TableCell
                };
                Frame::new(Node::new(kind), Role::Block)
            }
            Container::DefinitionList => Frame::transparent(Role::Transparent),
            Container::DefinitionTitle => {
                let mut frame = self.paragraph_frame(Role::Paragraph);
                self.marks.push(Mark::Strong);
                frame.pushed_mark = true;
                frame
            }
            Container::Emphasis
            | Container::Strong
            | Container::Strikethrough
            | Container::Superscript
            | Container::Subscript
            | Container::Link { .. }
            | Container::Image { .. } => return,
        };
        self.stack.push(frame);
    }

    fn end(&mut self, container: &Container) {
        self.flush_run();
        if mark_for(container).is_some() {
            self.marks.pop();
            return;
        }
        if matches!(container, Container::Link { .. } | Container::Image { .. }) {
            return;
        }
        self.close_implicit();
        if self.stack.len() > self.floor {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        if frame.pushed_mark {
            self.marks.pop();
        }
        let Frame {
            node,
            role,
            deferred,
            ..
        } = frame;

        if let Some(mut node) = node {
            if hosts_inline(node.kind) {
                merge_text(&mut node.content);
            }
            let empty_paragraph =
                matches!(role, Role::Paragraph | Role::Implicit) && node.content.is_empty();
            if !empty_paragraph {
                self.attach(node);
            }
        }
        for node in deferred {
            self.attach(node);
        }
        if let Role::Table { dropped, .. } = role
            && dropped > 0
        {
            self.attach(truncation_notice(dropped));
        }
    }

    fn close_implicit(&mut self) {
        while self.stack.len() > self.floor
            && self
                .stack
                .last()
                .is_some_and(|frame| matches!(frame.role, Role::Implicit))
        {
            self.close_top();
        }
    }

    /// Attach a finished node to the nearest frame carrying a node.
    fn attach(&mut self, node: Node) {
        if !node.kind.is_inline() {
            self.close_implicit();
        }
        let Some(index) = self.host_index() else {
            return;
        };
        let frame = &mut self.stack[index];
        let Some(host) = frame.node.as_mut() else {
            return;
        };
        let parent = host.kind;

        if allows(parent, node.kind) {
            host.content.push(node);
            return;
        }
        if hosts_inline(parent) {
            if matches!(frame.role, Role::Paragraph) {
                frame.deferred.push(node);
            } else {
                let text = fallback_text(&node);
                if !text.is_empty() {
                    host.content.push(Node::text(text));
                }
            }
            return;
        }
        if node.kind.is_inline() && allows(parent, NodeKind::Paragraph) {
            let mut implicit = self.paragraph_frame(Role::Implicit);
            if let Some(paragraph) = implicit.node.as_mut() {
                paragraph.content.push(node);
            }
            self.stack.push(implicit);
            return;
        }

        for child in degrade(node, parent) {
            self.attach(child);
        }
    }

    fn host_index(&self) -> Option<usize> {
        self.stack.iter().rposition(|frame| frame.node.is_some())
    }

    fn host_kind(&self) -> NodeKind {
        self.host_index()
            .and_then(|index| self.stack[index].node.as_ref())
            .map_or(NodeKind::Doc, |node| node.kind)
    }

    fn top_role_is(&self, predicate: impl Fn(&Role) -> bool) -> bool {
        self.stack.last().is_some_and(|frame| predicate(&frame.role))
    }

    fn paragraph_frame(&mut self, role: Role) -> Frame {
        let mut paragraph = Node::paragraph(Vec::new());
        if mem::take(&mut self.marker_pending) {
            paragraph.content.push(Node::text(FLATTENED_MARKER));
        }
        Frame::new(paragraph, role)
    }

    fn list_depth(&self) -> usize {
        self.stack
            .iter()
            .filter(|frame| matches!(frame.role, Role::List))
            .count()
    }

    /// Count a row against the enclosing table's cap.
    fn admit_row(&mut self) -> bool {
        let max_rows = self.options.max_table_rows;
        let table = self.stack.iter_mut().rev().find_map(|frame| match &mut frame.role {
            Role::Table { rows, dropped } => Some((rows, dropped)),
            _ => None,
        });
        let Some((rows, dropped)) = table else {
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
        if self.marks.is_empty() {
            for node in self.expand_run(&text) {
                self.attach(node);
            }
        } else {
            let marks = effective_marks(&self.marks);
            let text = self.abbreviations.expand(&text);
            self.attach(Node::marked_text(text, marks));
        }
    }

    /// Split an unmarked run into text, plugin nodes and coloured spans.
    fn expand_run(&mut self, text: &str) -> Vec<Node> {
        let registry = self.registry;
        let parent = match self.host_kind() {
            kind if hosts_inline(kind) => kind,
            _ => NodeKind::Paragraph,
        };
        let mut nodes = Vec::new();
        for piece in split_run(registry, text) {
            match piece {
                Piece::Plain(plain) => self.push_plain(&mut nodes, plain),
                Piece::Plugin {
                    plugin,
                    span,
                    source,
                } => {
                    let node = self
                        .inline_plugin(plugin, &span, parent)
                        .unwrap_or_else(|| Node::text(source));
                    nodes.push(node);
                }
                Piece::Color(span) => {
                    nodes.push(Node::marked_text(span.text, vec![Mark::color(span.color)]));
                }
            }
        }
        nodes
    }

    fn push_plain(&mut self, nodes: &mut Vec<Node>, text: &str) {
        if !text.is_empty() {
            nodes.push(Node::text(self.abbreviations.expand(text)));
        }
    }

    fn inline_plugin(
        &mut self,
        plugin: &dyn InlinePlugin,
        span: &InlineSpan,
        parent: NodeKind,
    ) -> Option<Node> {
        let mut ctx = RenderContext::new(parent);
        let result = isolate(plugin.name(), || plugin.render(span, &mut ctx));
        self.warnings.extend(ctx.take_warnings());
        match result {
            Ok(Some(node)) if node.kind.is_inline() => Some(node),
            Ok(Some(node)) => {
                tracing::warn!(
                    plugin = plugin.name(),
                    node = %node.kind,
                    "Inline plugin returned a block node, keeping source text"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(plugin = plugin.name(), error = %e, "Inline plugin failed, keeping source text");
                self.warnings.push(e.to_string());
                None
            }
        }
    }

    fn block_plugin(&mut self, name: &str, args: &BlockArgs, body: &[Token], source: &str) {
        let registry = self.registry;
        let Some(plugin) = registry.block(name) else {
            tracing::debug!(block = name, "No block plugin registered, keeping source text");
            self.literal_source(source);
            return;
        };

        let children = self.render_into(Node::new(plugin.body_kind()), body).content;
        let mut ctx = RenderContext::new(self.host_kind());
        let result = isolate(plugin.name(), || {
            plugin.render(
                BlockSpan {
                    name,
                    args,
                    children,
                    source,
                },
                &mut ctx,
            )
        });
        self.warnings.extend(ctx.take_warnings());

        match result {
            Ok(Some(node)) => self.attach(node),
            Ok(None) => self.literal_source(source),
            Err(e) => {
                tracing::warn!(block = name, error = %e, "Block plugin failed, keeping source text");
                self.warnings.push(e.to_string());
                self.literal_source(source);
            }
        }
    }

    fn layout(&mut self, columns: &[Column]) {
        let count = u32::try_from(columns.len()).unwrap_or(u32::MAX).max(1);
        let default_width = (10_000.0 / f64::from(count)).round() / 100.0;

        let mut section = Node::new(NodeKind::LayoutSection);
        for column in columns {
            let width = self.column_width(&column.args, default_width);
            let mut node = self.render_into(Node::new(NodeKind::LayoutColumn), &column.body.tokens);
            if node.content.is_empty() {
                node.content.push(Node::paragraph(Vec::new()));
            }
            section.content.push(node.with_attr("width", width));
        }
        self.attach(section);
    }

    fn column_width(&mut self, args: &BlockArgs, default: f64) -> f64 {
        let Some(raw) = args.get("width") else {
            return default;
        };
        match raw.trim_end_matches('%').parse::<f64>() {
            Ok(width) if width > 0.0 && width <= 100.0 => width,
            _ => {
                self.warnings
                    .push(format!("column: invalid width {raw:?}, using {default}"));
                default
            }
        }
    }

    fn literal(&mut self, line: &str) {
        if !line.trim().is_empty() {
            self.attach(Node::paragraph(vec![Node::text(line.trim_end())]));
        }
    }

    fn literal_source(&mut self, source: &str) {
        for line in source.lines() {
            self.literal(line);
        }
    }

    fn finish_image(&mut self) {
        let Some(image) = self.image.take() else {
            return;
        };
        let mut media = Node::new(NodeKind::Media)
            .with_attr("type", MediaType::External.as_str())
            .with_attr("url", image.src);
        let alt = image.alt.trim();
        if !alt.is_empty() {
            media = media.with_attr("alt", alt);
        }
        self.attach(
            Node::new(NodeKind::MediaSingle)
                .with_attr("layout", MediaLayout::Center.as_str())
                .with_content(vec![media]),
        );
    }
}

fn mark_for(container: &Container) -> Option<Mark> {
    Some(match container {
        Container::Emphasis => Mark::Em,
        Container::Strong => Mark::Strong,
        Container::Strikethrough => Mark::Strike,
        Container::Superscript => Mark::Subsup { kind: SubSup::Sup },
        Container::Subscript => Mark::Subsup { kind: SubSup::Sub },
        Container::Link { href } if !href.is_empty() => Mark::link(href.as_str()),
        _ => return None,
    })
}

pub(crate) fn alert_panel(alert: AlertKind) -> PanelType {
    match alert {
        AlertKind::Note => PanelType::Note,
        AlertKind::Tip => PanelType::Success,
        AlertKind::Important => PanelType::Info,
        AlertKind::Warning => PanelType::Warning,
        AlertKind::Caution => PanelType::Error,
    }
}

fn truncation_notice(dropped: usize) -> Node {
    Node::paragraph(vec![Node::marked_text(
        format!("Content truncated: {dropped} more table rows not shown."),
        vec![Mark::Em],
    )])
}
