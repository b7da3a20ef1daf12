// Response renderer.
//
// The transcript keeps one block per answered command. Markup follows the
// web front-end: `# <command><br><response><br><br>` per block, newest
// first. The terminal gets plain lines derived from that markup.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Keep every block, newest on top.
    #[default]
    Append,
    /// Show only the latest block.
    Replace,
}

impl FromStr for RenderMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(RenderMode::Append),
            "replace" => Ok(RenderMode::Replace),
            other => bail!("unknown render mode {other:?} (expected append or replace)"),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Append => f.write_str("append"),
            RenderMode::Replace => f.write_str("replace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: String,
    pub text: String,
    pub is_error: bool,
}

impl Block {
    pub fn markup(&self) -> String {
        format!("# {}<br>{}<br><br>", self.label, self.text)
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    mode: RenderMode,
    // oldest first
    blocks: Vec<Block>,
}

impl Transcript {
    pub fn new(mode: RenderMode) -> Self {
        Transcript {
            mode,
            blocks: Vec::new(),
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn render(&mut self, label: &str, text: &str) {
        self.push(Block {
            label: label.to_string(),
            text: text.to_string(),
            is_error: false,
        });
    }

    pub fn render_error(&mut self, label: &str, message: &str) {
        self.push(Block {
            label: label.to_string(),
            text: format!("error: {message}"),
            is_error: true,
        });
    }

    fn push(&mut self, block: Block) {
        if self.mode == RenderMode::Replace {
            self.blocks.clear();
        }
        self.blocks.push(block);
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks, newest first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().rev()
    }

    pub fn markup(&self) -> String {
        self.blocks().map(Block::markup).collect()
    }

    /// Plain text lines for the terminal, newest block first. Error blocks
    /// are flagged so the caller can colour them.
    pub fn lines(&self) -> Vec<(String, bool)> {
        self.blocks()
            .flat_map(|b| {
                markup_to_lines(&b.markup())
                    .into_iter()
                    .map(move |line| (line, b.is_error))
            })
            .collect()
    }
}

/// Converts the service's markup to terminal lines. Only the handful of
/// tags and entities the service actually emits are understood.
///
/// Anything else in angle brackets is kept as typed. Usage text such as
/// `set <key> <value>` is meant to be read, and a browser would have
/// swallowed those placeholders as unknown tags.
pub fn markup_to_lines(markup: &str) -> Vec<String> {
    let text = markup
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("<br>", "\n")
        .replace("&ensp;", "  ")
        .replace("&emsp;", "    ")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    // a block ends with two breaks; keep one blank separator line
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}
