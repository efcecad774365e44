/*!
 * Document and annotated text model.
 *
 * A `Document` is the block structure recovered from the converter's
 * Markdown. An `AnnotatedText` is the same content after cue annotation:
 * paragraphs made of plain text and typed pause/emphasis segments.
 */

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// ATX heading, closing hashes are dropped only when separated by whitespace
static HEADING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+)?[ \t]*$").expect("Invalid heading regex")
});

/// Scene break lines (`***`, `- - -`, `___`)
static RULE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\*[ \t]*){3,}$|^(?:-[ \t]*){3,}$|^(?:_[ \t]*){3,}$").expect("Invalid rule regex")
});

/// Inline images, never spoken
static IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("Invalid image regex")
});

/// Inline links, only the label is spoken
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("Invalid link regex")
});

/// Bold/italic markers wrapping a span
static EMPHASIS_MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\*{1,3}|_{2,3})([^*_\s](?:[^*_]*[^*_\s])?)(\*{1,3}|_{2,3})")
        .expect("Invalid emphasis marker regex")
});

/// A block element of the source document, in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Heading of level 1 to 6
    Heading { level: u8, text: String },
    /// Body paragraph
    Paragraph(String),
    /// Quoted paragraph
    Blockquote(String),
}

impl Block {
    /// Spoken text of the block
    pub fn text(&self) -> &str {
        match self {
            Self::Heading { text, .. } => text,
            Self::Paragraph(text) | Self::Blockquote(text) => text,
        }
    }
}

/// Ordered block structure of a book
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pending {
    Paragraph,
    Quote,
}

impl Document {
    /// Recover blocks from Markdown text.
    ///
    /// Blank lines separate paragraphs, lines inside one paragraph are
    /// joined with single spaces, `>` lines form blockquotes and scene break
    /// rules act as paragraph separators. Blocks with no text are dropped.
    pub fn parse(markdown: &str) -> Self {
        let mut blocks = Vec::new();
        let mut lines: Vec<String> = Vec::new();
        let mut pending = Pending::Paragraph;

        for raw_line in markdown.lines() {
            let line = raw_line.trim();

            if line.is_empty() || RULE_PATTERN.is_match(line) {
                flush(&mut blocks, &mut lines, pending);
                continue;
            }

            if let Some(caps) = HEADING_PATTERN.captures(line) {
                flush(&mut blocks, &mut lines, pending);
                let level = caps[1].len() as u8;
                let text = clean_inline(&caps[2]);
                if !text.is_empty() {
                    blocks.push(Block::Heading { level, text });
                }
                continue;
            }

            let (kind, content) = match line.strip_prefix('>') {
                Some(rest) => (Pending::Quote, rest.trim_start_matches('>').trim()),
                None => (Pending::Paragraph, line),
            };

            if kind != pending {
                flush(&mut blocks, &mut lines, pending);
                pending = kind;
            }

            if content.is_empty() {
                // "> " alone separates quoted paragraphs
                flush(&mut blocks, &mut lines, pending);
            } else {
                lines.push(content.to_string());
            }
        }

        flush(&mut blocks, &mut lines, pending);
        Self { blocks }
    }

    /// Number of heading blocks
    pub fn heading_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::Heading { .. }))
            .count()
    }
}

fn flush(blocks: &mut Vec<Block>, lines: &mut Vec<String>, pending: Pending) {
    if lines.is_empty() {
        return;
    }
    let text = clean_inline(&lines.join(" "));
    lines.clear();
    if text.is_empty() {
        return;
    }
    blocks.push(match pending {
        Pending::Paragraph => Block::Paragraph(text),
        Pending::Quote => Block::Blockquote(text),
    });
}

/// Strip inline Markdown syntax that must not be spoken
fn clean_inline(text: &str) -> String {
    let text = IMAGE_PATTERN.replace_all(text, "");
    let text = LINK_PATTERN.replace_all(&text, "$1");
    let text = EMPHASIS_MARKER_PATTERN.replace_all(&text, "$2");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strength of an emphasis cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmphasisLevel {
    Strong,
    Moderate,
    Reduced,
}

impl EmphasisLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Reduced => "reduced",
        }
    }
}

/// One piece of an annotated paragraph: spoken text or a typed cue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Plain spoken text
    Text(String),
    /// Silence of the given length
    Pause { ms: u32 },
    /// Spoken span delivered with emphasis
    Emphasis { level: EmphasisLevel, text: String },
}

impl Segment {
    /// Spoken text of the segment, empty for pauses
    pub fn spoken_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Emphasis { text, .. } => text,
            Self::Pause { .. } => "",
        }
    }

    /// Spoken characters; pauses weigh zero
    pub fn spoken_len(&self) -> usize {
        self.spoken_text().chars().count()
    }
}

/// Role of an annotated paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParagraphKind {
    Heading { level: u8 },
    Body,
}

/// A paragraph after cue annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedParagraph {
    pub kind: ParagraphKind,
    pub segments: Vec<Segment>,
}

impl AnnotatedParagraph {
    pub fn is_heading(&self) -> bool {
        matches!(self.kind, ParagraphKind::Heading { .. })
    }

    /// Heading title, if this paragraph is a heading
    pub fn heading_title(&self) -> Option<String> {
        if !self.is_heading() {
            return None;
        }
        Some(self.plain_text())
    }

    /// Spoken text with cues ignored
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(Segment::spoken_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Paragraph length counted against the chunk budget
    pub fn spoken_len(&self) -> usize {
        self.segments.iter().map(Segment::spoken_len).sum()
    }
}

/// Ordered annotated paragraphs of a whole book
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotatedText {
    pub paragraphs: Vec<AnnotatedParagraph>,
}

impl AnnotatedText {
    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}
