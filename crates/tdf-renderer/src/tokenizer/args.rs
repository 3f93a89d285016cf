//! Custom block argument parsing.
//!
//! Parses what follows the block name on an opening line. Three forms are
//! accepted and may be combined:
//!
//! - `[content]`: bracketed content, nesting allowed
//! - `{key=value key2="quoted value"}`: braced attributes
//! - `key=value positional words`: bare attributes and words
//!
//! Bare words become the content when no brackets were given, so
//! `:::panel warning` and `:::expand Click me` work without brackets.
//! `#id` and `.class` items are accepted for compatibility and ignored.

use std::collections::HashMap;

/// Parsed arguments from a custom block opening line.
///
/// # Example
///
/// ```
/// use tdf_renderer::BlockArgs;
///
/// let args = BlockArgs::parse("[Details]{layout=wide} width=50");
/// assert_eq!(args.content, "Details");
/// assert_eq!(args.get("layout"), Some("wide"));
/// assert_eq!(args.get("width"), Some("50"));
///
/// assert_eq!(BlockArgs::parse(" warning").content, "warning");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockArgs {
    /// Bracketed content, or the bare words after the name.
    pub content: String,
    /// Attributes from braces or bare `key=value` items.
    pub attrs: HashMap<String, String>,
}

/// One item of an attribute list.
#[derive(Debug, PartialEq, Eq)]
enum Item<'s> {
    Pair(&'s str, &'s str),
    Word(&'s str),
    Ignored,
}

impl BlockArgs {
    /// Parse everything after the block name.
    #[must_use]
    pub fn parse(tail: &str) -> Self {
        let mut args = Self::default();
        let mut rest = tail.trim_start();

        let bracketed = match split_group(rest, '[', ']') {
            Some((content, after)) => {
                content.clone_into(&mut args.content);
                rest = after;
                true
            }
            None => false,
        };

        if let Some((braced, after)) = split_group(rest, '{', '}') {
            for item in Items::new(braced) {
                args.absorb(item, &mut Vec::new());
            }
            rest = after;
        }

        let mut words = Vec::new();
        for item in Items::new(rest) {
            args.absorb(item, &mut words);
        }
        if !bracketed && !words.is_empty() {
            args.content = words.join(" ");
        }

        args
    }

    fn absorb<'s>(&mut self, item: Item<'s>, words: &mut Vec<&'s str>) {
        match item {
            Item::Pair(key, value) => {
                self.attrs.insert(key.to_owned(), value.to_owned());
            }
            Item::Word(word) => words.push(word),
            Item::Ignored => {}
        }
    }

    /// Attribute value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// First of `keys` present as an attribute, else the content.
    #[must_use]
    pub fn get_or_content(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.get(key))
            .or_else(|| (!self.content.is_empty()).then_some(self.content.as_str()))
    }
}

/// Split a balanced `open ... close` group off the start of `s`.
///
/// Returns the inner text and the remainder, or `None` when `s` does not
/// start with `open` or the group is unclosed.
fn split_group(s: &str, open: char, close: char) -> Option<(&str, &str)> {
    if !s.starts_with(open) {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some((&s[open.len_utf8()..i], &s[i + close.len_utf8()..]));
            }
        }
    }
    None
}

/// Iterator over the items of an attribute list.
struct Items<'s> {
    rest: &'s str,
}

impl<'s> Items<'s> {
    fn new(s: &'s str) -> Self {
        Self { rest: s }
    }

    /// `key=value`, `key="value"` or `key='value'` at the start of the input.
    fn pair(&mut self) -> Option<Item<'s>> {
        let s = self.rest;
        let word_end = s.find(char::is_whitespace).unwrap_or(s.len());
        let eq = s[..word_end].find('=')?;
        let key = &s[..eq];
        if key.is_empty() || key.starts_with(['#', '.']) {
            return None;
        }

        let after_eq = &s[eq + 1..];
        let (value, rest) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let quoted = &after_eq[1..];
                let end = quoted.find(quote)?;
                (&quoted[..end], &quoted[end + 1..])
            }
            _ => {
                let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                after_eq.split_at(end)
            }
        };
        self.rest = rest;
        Some(Item::Pair(key, value))
    }
}

impl<'s> Iterator for Items<'s> {
    type Item = Item<'s>;

    fn next(&mut self) -> Option<Item<'s>> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return None;
        }
        if let Some(pair) = self.pair() {
            return Some(pair);
        }

        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if word.starts_with(['#', '.']) {
            Item::Ignored
        } else {
            Item::Word(word)
        })
    }
}
