//! Code fence state for the custom block scanner.
//!
//! `:::` lines inside a fenced code block are code, not custom blocks.

/// An open code fence: its marker character and run length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    /// Opening fence on `line`, if any.
    ///
    /// Three or more backticks or tildes, indented by at most three spaces.
    /// A backtick info string may not contain backticks.
    fn open(line: &str) -> Option<Self> {
        let body = strip_indent(line)?;
        let marker = body.chars().next().filter(|c| matches!(c, '`' | '~'))?;
        let len = body.chars().take_while(|&c| c == marker).count();
        let info = &body[len..];
        (len >= 3 && !(marker == '`' && info.contains('`'))).then_some(Self { marker, len })
    }

    /// Whether `line` closes this fence.
    fn closed_by(self, line: &str) -> bool {
        let Some(body) = strip_indent(line) else {
            return false;
        };
        let len = body.chars().take_while(|&c| c == self.marker).count();
        len >= self.len && body[len..].trim().is_empty()
    }
}

/// Line content after up to three spaces of indentation.
fn strip_indent(line: &str) -> Option<&str> {
    let spaces = line.len() - line.trim_start_matches(' ').len();
    (spaces <= 3).then(|| &line[spaces..])
}

/// Tracks whether the scanner is inside a fenced code block.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<Fence>,
}

impl FenceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// Feed the next source line.
    pub(crate) fn update(&mut self, line: &str) {
        self.open = match self.open {
            Some(fence) if fence.closed_by(line) => None,
            Some(fence) => Some(fence),
            None => Fence::open(line),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_after(lines: &[&str]) -> FenceTracker {
        let mut tracker = FenceTracker::new();
        for line in lines {
            tracker.update(line);
        }
        tracker
    }

    #[test]
    fn test_custom_fence_inside_code() {
        assert!(tracker_after(&["```rust\n", ":::panel\n"]).in_fence());
        assert!(!tracker_after(&["```rust\n", ":::panel\n", "```\n"]).in_fence());
    }

    #[test]
    fn test_close_needs_same_marker_and_length() {
        assert!(tracker_after(&["~~~~", "```", "~~~"]).in_fence());
        assert!(!tracker_after(&["~~~~", "~~~~~"]).in_fence());
    }

    #[test]
    fn test_not_fences() {
        assert!(!tracker_after(&["``` not ` a fence"]).in_fence());
        assert!(!tracker_after(&["`` short"]).in_fence());
        assert!(!tracker_after(&["    ```"]).in_fence());
    }

    #[test]
    fn test_close_with_trailing_text_stays_open() {
        assert!(tracker_after(&["```", "``` trailing"]).in_fence());
        assert!(!tracker_after(&["  ```", "   ```  \n"]).in_fence());
    }
}
