// Command line tokenization.
//
// A submitted line is split on single spaces, exactly the way the web
// front-end splits it before handing it to the storage SDK. There is no
// quoting support here: `set key "a b"` yields four tokens. The router only
// looks at the first three tokens to classify a line, and lines that go to
// the service are forwarded verbatim, so quoted values still reach the
// server-side parser intact.

/// A non-blank line typed by the operator, split into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    raw: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> CommandLine<'a> {
    /// Returns `None` when the line is empty after trimming.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(CommandLine {
            raw,
            tokens: trimmed.split(' ').collect(),
        })
    }

    /// The line as typed, untrimmed.
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn tokens(&self) -> &[&'a str] {
        &self.tokens
    }

    /// Lowercased first token.
    pub fn verb(&self) -> String {
        self.tokens[0].to_lowercase()
    }

    /// Lowercased second token, if any.
    pub fn sub_verb(&self) -> Option<String> {
        self.tokens.get(1).map(|t| t.to_lowercase())
    }

    /// Lowercased third token, if any.
    pub fn qualifier(&self) -> Option<String> {
        self.tokens.get(2).map(|t| t.to_lowercase())
    }
}
