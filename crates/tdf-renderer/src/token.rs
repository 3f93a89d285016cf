//! Owned token stream produced by the tokenizer.

use crate::tokenizer::BlockArgs;

/// GitHub-style alert kind on a blockquote (`> [!NOTE]`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    Note,
    Tip,
    Important,
    Warning,
    Caution,
}

impl From<pulldown_cmark::BlockQuoteKind> for AlertKind {
    fn from(kind: pulldown_cmark::BlockQuoteKind) -> Self {
        use pulldown_cmark::BlockQuoteKind;
        match kind {
            BlockQuoteKind::Note => Self::Note,
            BlockQuoteKind::Tip => Self::Tip,
            BlockQuoteKind::Important => Self::Important,
            BlockQuoteKind::Warning => Self::Warning,
            BlockQuoteKind::Caution => Self::Caution,
        }
    }
}

/// Block or inline container opened by [`Token::Start`] and closed by [`Token::End`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Container {
    Paragraph,
    Heading(u8),
    BlockQuote(Option<AlertKind>),
    /// Ordered list when the start number is present.
    List(Option<u64>),
    Item,
    Table,
    TableHead,
    TableRow,
    TableCell,
    DefinitionList,
    DefinitionTitle,
    DefinitionDetails,
    Emphasis,
    Strong,
    Strikethrough,
    Superscript,
    Subscript,
    Link { href: String },
    Image { src: String, title: String },
}

/// One token of the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Start(Container),
    End(Container),
    /// Inline text.
    Text(String),
    /// Inline code span.
    Code(String),
    CodeBlock {
        language: Option<String>,
        content: String,
    },
    SoftBreak,
    HardBreak,
    Rule,
    TaskMarker(bool),
    /// Syntax the grammar did not recognize, kept verbatim.
    Literal(String),
    /// `:::name` ... `:::` extension block.
    Custom(CustomBlock),
}

/// A recognized `:::` block with its body already tokenized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CustomBlock {
    /// Block handled by a registered block plugin.
    Plugin {
        /// Directive name (e.g. `panel`).
        name: String,
        /// Arguments from the opening line.
        args: BlockArgs,
        /// Tokenized body.
        body: TokenStream,
        /// Original source, used when the plugin cannot render it.
        source: String,
    },
    /// `:::layout` with one token stream per `::: column`.
    Layout { columns: Vec<Column> },
}

/// One column of a layout block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Arguments from the `::: column` line.
    pub args: BlockArgs,
    /// Column body as its own sub-document.
    pub body: TokenStream,
}

/// Output of the tokenizer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenStream {
    /// Tokens in document order.
    pub tokens: Vec<Token>,
    /// Abbreviation definitions (`*[ABBR]: expansion`), in definition order.
    pub abbreviations: Vec<(String, String)>,
}

impl TokenStream {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }
}

impl<'a> IntoIterator for &'a TokenStream {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}
