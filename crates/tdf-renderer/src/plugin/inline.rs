//! Built-in inline plugins: `status`, `date`, `mention` and `emoji`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RenderError;
use crate::node::{Node, NodeKind};
use crate::schema::StatusColor;

use super::{
    InlinePlugin, InlineSpan, RenderContext, find_inline_directive, find_inline_directive_before,
};

/// `:name:` emoji shorthand.
static EMOJI_SHORTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-z0-9_+-]+):").unwrap());

/// Shortcodes understood by the `:name:` shorthand.
const EMOJI: &[(&str, &str)] = &[
    ("+1", "👍"),
    ("-1", "👎"),
    ("bug", "🐛"),
    ("bulb", "💡"),
    ("check", "✔️"),
    ("eyes", "👀"),
    ("fire", "🔥"),
    ("grinning", "😀"),
    ("heart", "❤️"),
    ("lock", "🔒"),
    ("memo", "📝"),
    ("question", "❓"),
    ("rocket", "🚀"),
    ("smile", "😄"),
    ("sparkles", "✨"),
    ("star", "⭐"),
    ("tada", "🎉"),
    ("thumbsdown", "👎"),
    ("thumbsup", "👍"),
    ("warning", "⚠️"),
    ("wave", "👋"),
    ("white_check_mark", "✅"),
    ("x", "❌"),
];

/// Unicode rendering of a known emoji shortcode (without colons).
#[must_use]
pub fn emoji_for(name: &str) -> Option<&'static str> {
    EMOJI
        .binary_search_by(|(known, _)| (*known).cmp(name))
        .ok()
        .map(|i| EMOJI[i].1)
}

/// `:status[In progress]{color=blue}`
pub struct StatusPlugin;

impl InlinePlugin for StatusPlugin {
    fn name(&self) -> &'static str {
        "status"
    }

    fn find(&self, text: &str) -> Option<InlineSpan> {
        find_inline_directive(text, self.name())
    }

    fn render(
        &self,
        span: &InlineSpan,
        ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        let text = span.args.content.trim();
        if text.is_empty() {
            return Err(RenderError::missing(self.name(), "text"));
        }
        let color = match span.args.get("color") {
            None => StatusColor::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                ctx.warn(format!("status: {e}, using {}", StatusColor::default()));
                StatusColor::default()
            }),
        };
        Ok(Some(
            Node::new(NodeKind::Status)
                .with_attr("text", text)
                .with_attr("color", color.as_str()),
        ))
    }
}

/// `:date[2024-03-01]` or `:date[1709251200000]`
pub struct DatePlugin;

impl InlinePlugin for DatePlugin {
    fn name(&self) -> &'static str {
        "date"
    }

    fn find(&self, text: &str) -> Option<InlineSpan> {
        find_inline_directive(text, self.name())
    }

    fn render(
        &self,
        span: &InlineSpan,
        _ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        let raw = span.args.content.trim();
        let timestamp = parse_timestamp(raw).ok_or_else(|| {
            RenderError::plugin(
                self.name(),
                format!("expected YYYY-MM-DD or epoch milliseconds, got {raw:?}"),
            )
        })?;
        Ok(Some(
            Node::new(NodeKind::Date).with_attr("timestamp", timestamp.to_string()),
        ))
    }
}

/// Epoch milliseconds from `YYYY-MM-DD` (UTC midnight) or a plain integer.
fn parse_timestamp(raw: &str) -> Option<i64> {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok();
    }

    let mut parts = raw.splitn(3, '-');
    let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return None;
    }
    let year: i64 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return None;
    }

    Some(days_from_civil(year, month, day) * 86_400_000)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month = i64::from(month);
    let day_of_year = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5
        + i64::from(day)
        - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

/// `YYYY-MM-DD` (UTC) for an epoch-millisecond timestamp.
pub(crate) fn format_timestamp(millis: i64) -> String {
    let (year, month, day) = civil_from_days(millis.div_euclid(86_400_000));
    format!("{year:04}-{month:02}-{day:02}")
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z - era * 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (
        year,
        u32::try_from(month).unwrap_or(1),
        u32::try_from(day).unwrap_or(1),
    )
}

/// `:mention[5b10ac8d82e05b22cc7d4ef5]{text="@Ana"}`
pub struct MentionPlugin;

impl InlinePlugin for MentionPlugin {
    fn name(&self) -> &'static str {
        "mention"
    }

    fn find(&self, text: &str) -> Option<InlineSpan> {
        find_inline_directive(text, self.name())
    }

    fn render(
        &self,
        span: &InlineSpan,
        _ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        let id = span.args.content.trim();
        if id.is_empty() {
            return Err(RenderError::missing(self.name(), "id"));
        }
        let text = span
            .args
            .get("text")
            .map_or_else(|| format!("@{id}"), str::to_owned);
        Ok(Some(
            Node::new(NodeKind::Mention)
                .with_attr("id", id)
                .with_attr("text", text),
        ))
    }
}

/// `:emoji[rocket]` or the shorthand `:rocket:` for known shortcodes.
pub struct EmojiPlugin;

impl EmojiPlugin {
    fn find_shortcode(text: &str) -> Option<InlineSpan> {
        EMOJI_SHORTCODE_RE.captures_iter(text).find_map(|caps| {
            let whole = caps.get(0)?;
            let boundary_before = text[..whole.start()]
                .chars()
                .next_back()
                .is_none_or(char::is_whitespace);
            let directive_after = text[whole.end()..].starts_with('[');
            (boundary_before && !directive_after && emoji_for(&caps[1]).is_some()).then(|| {
                let mut span = InlineSpan::new(whole.start(), whole.end());
                caps[1].clone_into(&mut span.args.content);
                span
            })
        })
    }
}

impl InlinePlugin for EmojiPlugin {
    fn name(&self) -> &'static str {
        "emoji"
    }

    fn find(&self, text: &str) -> Option<InlineSpan> {
        let shortcode = Self::find_shortcode(text);
        let limit = shortcode.as_ref().map_or(text.len(), |span| span.start);
        find_inline_directive_before(text, self.name(), limit).or(shortcode)
    }

    fn render(
        &self,
        span: &InlineSpan,
        _ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        let name = span.args.content.trim().trim_matches(':');
        if name.is_empty() {
            return Err(RenderError::missing(self.name(), "shortName"));
        }
        let mut node = Node::new(NodeKind::Emoji).with_attr("shortName", format!(":{name}:"));
        if let Some(unicode) = emoji_for(name) {
            node = node.with_attr("text", unicode);
        }
        Ok(Some(node))
    }
}
