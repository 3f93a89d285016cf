//! Line scanner for `:::name` ... `:::` custom blocks.
//!
//! Runs before the markdown grammar so that custom blocks take priority over
//! every other block rule. Anything it does not recognize is handed on as
//! markdown or kept as literal text.

use super::BlockArgs;
use super::fence::FenceTracker;

/// Piece of source produced by [`scan`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Plain markdown for the base grammar.
    Markdown(String),
    /// A line of unrecognized block syntax, kept verbatim.
    Literal(String),
    /// A terminated custom block.
    Block {
        name: String,
        args: BlockArgs,
        body: String,
        source: String,
    },
}

/// Classified `:::` line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FenceLine<'a> {
    Open { name: &'a str, tail: &'a str },
    Close,
}

/// Parse a whole line as a custom block fence.
///
/// Returns `None` if the line is not a `:::` line.
pub(crate) fn parse_fence_line(line: &str) -> Option<FenceLine<'_>> {
    let trimmed = line.trim();
    if !trimmed.starts_with(":::") {
        return None;
    }

    let colon_count = trimmed.chars().take_while(|&c| c == ':').count();
    let after_colons = trimmed[colon_count..].trim_start();

    if after_colons.is_empty() {
        return Some(FenceLine::Close);
    }

    let name_end = after_colons
        .find(|c: char| c == '[' || c == '{' || c.is_whitespace())
        .unwrap_or(after_colons.len());
    let name = &after_colons[..name_end];

    is_valid_name(name).then(|| FenceLine::Open {
        name,
        tail: &after_colons[name_end..],
    })
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// Parse an abbreviation definition line: `*[HTML]: HyperText Markup Language`.
pub(crate) fn parse_abbreviation(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix("*[")?;
    let (abbr, expansion) = rest.split_once("]:")?;
    let (abbr, expansion) = (abbr.trim(), expansion.trim());
    (!abbr.is_empty() && !expansion.is_empty() && !abbr.contains(']'))
        .then(|| (abbr.to_owned(), expansion.to_owned()))
}

/// Index of the closing line for every opening line, in one pass.
///
/// Every `:::name` line opens a level whether or not its name is recognized,
/// and a bare `:::` closes the innermost open level. Lines inside a code
/// fence are skipped. Openers left on the stack are unterminated.
fn match_closes(lines: &[&str]) -> Vec<Option<usize>> {
    let mut closes = vec![None; lines.len()];
    let mut open = Vec::new();
    let mut fence = FenceTracker::new();

    for (i, line) in lines.iter().enumerate() {
        if fence.in_fence() {
            fence.update(line);
            continue;
        }
        match parse_fence_line(line) {
            Some(FenceLine::Open { .. }) => open.push(i),
            Some(FenceLine::Close) => {
                if let Some(opener) = open.pop() {
                    closes[opener] = Some(i);
                }
            }
            None => fence.update(line),
        }
    }

    closes
}

/// Split `text` into markdown, literal lines and custom blocks.
///
/// `recognized` decides which block names are handled; other `:::name`
/// lines, orphan `:::` lines and unterminated blocks become literals.
/// Abbreviation definitions are removed and pushed onto `abbreviations`.
pub(crate) fn scan(
    text: &str,
    recognized: &dyn Fn(&str) -> bool,
    abbreviations: &mut Vec<(String, String)>,
) -> Vec<Segment> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let closes = match_closes(&lines);
    let mut segments = Vec::new();
    let mut markdown = String::new();
    let mut fence = FenceTracker::new();
    let mut i = 0;

    let flush = |markdown: &mut String, segments: &mut Vec<Segment>| {
        if !markdown.is_empty() {
            segments.push(Segment::Markdown(std::mem::take(markdown)));
        }
    };

    while i < lines.len() {
        let line = lines[i];

        if fence.in_fence() {
            fence.update(line);
            markdown.push_str(line);
            i += 1;
            continue;
        }

        match parse_fence_line(line) {
            Some(FenceLine::Open { name, tail }) if recognized(name) => {
                flush(&mut markdown, &mut segments);
                if let Some(close) = closes[i] {
                    segments.push(Segment::Block {
                        name: name.to_owned(),
                        args: BlockArgs::parse(tail),
                        body: lines[i + 1..close].concat(),
                        source: lines[i..=close].concat(),
                    });
                    i = close + 1;
                } else {
                    tracing::debug!(block = name, line = i + 1, "Unterminated custom block");
                    segments.push(Segment::Literal(line.trim_end().to_owned()));
                    i += 1;
                }
                continue;
            }
            Some(_) => {
                flush(&mut markdown, &mut segments);
                segments.push(Segment::Literal(line.trim_end().to_owned()));
                i += 1;
                continue;
            }
            None => {}
        }

        if let Some(definition) = parse_abbreviation(line) {
            abbreviations.push(definition);
            i += 1;
            continue;
        }

        fence.update(line);
        markdown.push_str(line);
        i += 1;
    }

    flush(&mut markdown, &mut segments);
    segments
}
