/*!
 * Text preparation for speech synthesis.
 *
 * This module turns converted book text into bounded synthesis units.
 * It is split into several submodules:
 *
 * - `document`: Block model of the converted book and typed cue segments
 * - `normalizer`: Whitespace, punctuation and abbreviation canonicalization
 * - `cues`: Pause and emphasis annotation at heading and paragraph boundaries
 * - `chunker`: Budgeted grouping of annotated paragraphs into chunks
 */

pub use self::chunker::{Chunk, Chunker};
pub use self::cues::CueAnnotator;
pub use self::document::{
    AnnotatedParagraph, AnnotatedText, Block, Document, EmphasisLevel, ParagraphKind, Segment,
};
pub use self::normalizer::{AbbreviationTable, Normalizer};

pub mod chunker;
pub mod cues;
pub mod document;
pub mod normalizer;
