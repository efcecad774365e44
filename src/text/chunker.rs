/*!
 * Budgeted chunking of annotated text.
 *
 * Paragraphs are accumulated until the next one would exceed the character
 * budget; chunk boundaries only ever fall between paragraphs. A paragraph
 * longer than the budget is kept whole as its own chunk.
 */

use log::debug;
use serde::{Deserialize, Serialize};

use super::document::{AnnotatedParagraph, AnnotatedText};
use crate::app_config::ChunkingConfig;

/// One synthesis unit: a contiguous run of annotated paragraphs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position in the manifest
    pub index: usize,

    /// Titles of the headings this chunk contains, in order
    #[serde(default)]
    pub headings: Vec<String>,

    /// Annotated paragraphs
    pub paragraphs: Vec<AnnotatedParagraph>,
}

impl Chunk {
    /// Spoken characters counted against the budget
    pub fn spoken_len(&self) -> usize {
        self.paragraphs.iter().map(AnnotatedParagraph::spoken_len).sum()
    }

    /// Spoken text with cues ignored, paragraphs separated by spaces
    pub fn plain_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(AnnotatedParagraph::plain_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Groups annotated paragraphs into budgeted chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    break_at_headings: bool,
}

impl Chunker {
    pub fn new(max_chars: usize, break_at_headings: bool) -> Self {
        Self {
            max_chars,
            break_at_headings,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.max_chars, config.break_at_headings)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split annotated text into chunks indexed from 0
    pub fn chunk(&self, text: &AnnotatedText) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<AnnotatedParagraph> = Vec::new();
        let mut current_len = 0usize;

        for paragraph in &text.paragraphs {
            let len = paragraph.spoken_len();

            let over_budget = current_len + len > self.max_chars;
            let heading_break = self.break_at_headings && paragraph.is_heading();

            if !current.is_empty() && (over_budget || heading_break) {
                push_chunk(&mut chunks, std::mem::take(&mut current));
                current_len = 0;
            }

            if len > self.max_chars {
                debug!(
                    "Paragraph of {} chars exceeds the {} char budget, keeping it whole in chunk {}",
                    len,
                    self.max_chars,
                    chunks.len()
                );
            }

            current_len += len;
            current.push(paragraph.clone());
        }

        if !current.is_empty() {
            push_chunk(&mut chunks, current);
        }

        chunks
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, paragraphs: Vec<AnnotatedParagraph>) {
    let headings = paragraphs
        .iter()
        .filter_map(AnnotatedParagraph::heading_title)
        .collect();

    chunks.push(Chunk {
        index: chunks.len(),
        headings,
        paragraphs,
    });
}
