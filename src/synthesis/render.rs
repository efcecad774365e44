/*!
 * Cue rendering for synthesis engines.
 *
 * Typed cue segments are only turned into engine input here. Engines with
 * timed pauses receive SSML-style `<break>` and `<emphasis>` directives;
 * crude engines get textual gaps and upper-cased strong emphasis.
 */

use super::EngineCapabilities;
use crate::text::{AnnotatedParagraph, EmphasisLevel, Segment};

/// Pauses at or above this length become a paragraph gap for crude engines
pub const LONG_PAUSE_MS: u32 = 800;

/// How pause cues reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PausePolicy {
    /// Explicit `<break time="Nms"/>` directives
    Timed,
    /// Removed from the spoken stream and replaced by whitespace
    TextualGap,
}

/// How emphasis cues reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmphasisPolicy {
    /// `<emphasis level="..">` directives
    Structured,
    /// Strong emphasis is upper-cased, weaker levels are left as is
    UpperCase,
}

/// Renders annotated paragraphs into engine input text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueRenderer {
    pub pauses: PausePolicy,
    pub emphasis: EmphasisPolicy,
}

impl CueRenderer {
    /// Pick the policies once from the engine's capabilities
    pub fn for_capabilities(capabilities: EngineCapabilities) -> Self {
        Self {
            pauses: if capabilities.timed_pauses {
                PausePolicy::Timed
            } else {
                PausePolicy::TextualGap
            },
            emphasis: if capabilities.structured_emphasis {
                EmphasisPolicy::Structured
            } else {
                EmphasisPolicy::UpperCase
            },
        }
    }

    /// Renderer producing full markup, used for human-readable previews
    pub fn markup() -> Self {
        Self {
            pauses: PausePolicy::Timed,
            emphasis: EmphasisPolicy::Structured,
        }
    }

    fn escapes(&self) -> bool {
        self.pauses == PausePolicy::Timed || self.emphasis == EmphasisPolicy::Structured
    }

    /// Render a chunk's paragraphs into one text
    pub fn render(&self, paragraphs: &[AnnotatedParagraph]) -> String {
        let mut out = String::new();

        for segment in paragraphs.iter().flat_map(|p| p.segments.iter()) {
            match segment {
                Segment::Text(text) => push_spoken(&mut out, &self.text(text)),
                Segment::Emphasis { level, text } => {
                    let rendered = self.emphasis_span(*level, text);
                    push_spoken(&mut out, &rendered);
                }
                Segment::Pause { ms } => match self.pauses {
                    PausePolicy::Timed => {
                        push_spoken(&mut out, &format!("<break time=\"{}ms\"/>", ms));
                    }
                    PausePolicy::TextualGap => push_gap(&mut out, *ms),
                },
            }
        }

        out.trim_end().to_string()
    }

    fn text(&self, text: &str) -> String {
        if self.escapes() {
            escape_markup(text)
        } else {
            text.to_string()
        }
    }

    fn emphasis_span(&self, level: EmphasisLevel, text: &str) -> String {
        match self.emphasis {
            EmphasisPolicy::Structured => format!(
                "<emphasis level=\"{}\">{}</emphasis>",
                level.as_str(),
                self.text(text)
            ),
            EmphasisPolicy::UpperCase => match level {
                EmphasisLevel::Strong => self.text(&text.to_uppercase()),
                EmphasisLevel::Moderate | EmphasisLevel::Reduced => self.text(text),
            },
        }
    }
}

fn push_spoken(out: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(piece);
}

fn push_gap(out: &mut String, ms: u32) {
    if out.is_empty() {
        return;
    }
    if ms >= LONG_PAUSE_MS {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        out.push_str("\n\n");
    } else if !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

/// Escape text placed inside markup
pub fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
