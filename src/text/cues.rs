/*!
 * Prosody cue annotation.
 *
 * Turns normalized text into annotated paragraphs. Headings are framed by
 * a long leading and a shorter trailing pause around a strongly emphasized
 * title; every other paragraph is followed by a short pause.
 */

use super::document::{
    AnnotatedParagraph, AnnotatedText, Block, Document, EmphasisLevel, ParagraphKind, Segment,
};

/// Pause before a heading
pub const HEADING_LEAD_PAUSE_MS: u32 = 1200;
/// Pause after a heading
pub const HEADING_TRAIL_PAUSE_MS: u32 = 800;
/// Pause after a body paragraph
pub const PARAGRAPH_PAUSE_MS: u32 = 250;

/// Inserts pause and emphasis cues at block boundaries
#[derive(Debug, Clone, Copy, Default)]
pub struct CueAnnotator;

impl CueAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// Annotate normalized Markdown text
    pub fn annotate(&self, normalized: &str) -> AnnotatedText {
        self.annotate_document(&Document::parse(normalized))
    }

    /// Annotate an already parsed document
    pub fn annotate_document(&self, document: &Document) -> AnnotatedText {
        let paragraphs = document
            .blocks
            .iter()
            .filter(|block| !block.text().trim().is_empty())
            .map(annotate_block)
            .collect();

        AnnotatedText { paragraphs }
    }
}

fn annotate_block(block: &Block) -> AnnotatedParagraph {
    match block {
        Block::Heading { level, text } => AnnotatedParagraph {
            kind: ParagraphKind::Heading { level: *level },
            segments: vec![
                Segment::Pause { ms: HEADING_LEAD_PAUSE_MS },
                Segment::Emphasis {
                    level: EmphasisLevel::Strong,
                    text: text.clone(),
                },
                Segment::Pause { ms: HEADING_TRAIL_PAUSE_MS },
            ],
        },
        Block::Paragraph(text) | Block::Blockquote(text) => AnnotatedParagraph {
            kind: ParagraphKind::Body,
            segments: vec![
                Segment::Text(text.clone()),
                Segment::Pause { ms: PARAGRAPH_PAUSE_MS },
            ],
        },
    }
}
