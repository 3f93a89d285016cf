//! Built-in block plugins: `panel`, `expand` and `media`.

use crate::error::RenderError;
use crate::node::{Node, NodeKind};
use crate::schema::{MediaLayout, MediaType, PanelType};

use super::{BlockPlugin, BlockSpan, RenderContext};

/// Block containers need at least one child.
fn non_empty(children: Vec<Node>) -> Vec<Node> {
    if children.is_empty() {
        vec![Node::paragraph(Vec::new())]
    } else {
        children
    }
}

/// `:::panel warning` ... `:::`
///
/// The type comes from `type=`/`panelType=` or the first positional word.
/// Unknown types normalize to `info` with a warning.
pub struct PanelPlugin;

impl BlockPlugin for PanelPlugin {
    fn name(&self) -> &'static str {
        "panel"
    }

    fn body_kind(&self) -> NodeKind {
        NodeKind::Panel
    }

    fn render(
        &self,
        block: BlockSpan<'_>,
        ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        let panel_type = match block.args.get_or_content(&["type", "panelType"]) {
            None => PanelType::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                ctx.warn(format!("panel: {e}, using {}", PanelType::default()));
                PanelType::default()
            }),
        };

        Ok(Some(
            Node::new(NodeKind::Panel)
                .with_attr("panelType", panel_type.as_str())
                .with_content(non_empty(block.children)),
        ))
    }
}

/// `:::expand Click to see more` ... `:::`
pub struct ExpandPlugin;

impl BlockPlugin for ExpandPlugin {
    fn name(&self) -> &'static str {
        "expand"
    }

    fn body_kind(&self) -> NodeKind {
        NodeKind::Expand
    }

    fn render(
        &self,
        block: BlockSpan<'_>,
        _ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        let title = block.args.get_or_content(&["title"]).unwrap_or_default();
        Ok(Some(
            Node::new(NodeKind::Expand)
                .with_attr("title", title)
                .with_content(non_empty(block.children)),
        ))
    }
}

/// `:::media id=abc-123 collection=uploads width=400` ... `:::`
///
/// Produces `mediaSingle > media`. Any body is ignored. External media take
/// the URL from `url=` (or the positional content) instead of an id.
pub struct MediaPlugin;

impl BlockPlugin for MediaPlugin {
    fn name(&self) -> &'static str {
        "media"
    }

    fn render(
        &self,
        block: BlockSpan<'_>,
        ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        let args = block.args;
        let media_type: MediaType = match args.get("type") {
            Some(raw) => raw
                .parse()
                .map_err(|e| RenderError::invalid(self.name(), e))?,
            None => MediaType::default(),
        };

        let mut media = Node::new(NodeKind::Media).with_attr("type", media_type.as_str());
        if media_type == MediaType::External {
            let url = args
                .get_or_content(&["url"])
                .ok_or_else(|| RenderError::missing(self.name(), "url"))?;
            media = media.with_attr("url", url);
        } else {
            let id = args
                .get_or_content(&["id", "mediaId"])
                .ok_or_else(|| RenderError::missing(self.name(), "id"))?;
            media = media
                .with_attr("id", id)
                .with_attr("collection", args.get("collection").unwrap_or_default());
        }

        for key in ["width", "height"] {
            if let Some(raw) = args.get(key) {
                let value: u32 = raw.parse().map_err(|_| {
                    RenderError::plugin(self.name(), format!("{key} must be a positive integer"))
                })?;
                media = media.with_attr(key, value);
            }
        }
        if let Some(alt) = args.get("alt") {
            media = media.with_attr("alt", alt);
        }

        let layout = match args.get("layout") {
            None => MediaLayout::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                ctx.warn(format!("media: {e}, using {}", MediaLayout::default()));
                MediaLayout::default()
            }),
        };

        Ok(Some(
            Node::new(NodeKind::MediaSingle)
                .with_attr("layout", layout.as_str())
                .with_content(vec![media]),
        ))
    }
}
