/*!
 * Tests for chunk and manifest persistence
 */

use anyhow::Result;
use std::fs;

use bookvox::errors::{AppError, ManifestError};
use bookvox::file_utils::{FileManager, WorkspaceLayout};
use bookvox::manifest::{Manifest, persist_chunks};
use bookvox::text::{Chunk, Chunker, CueAnnotator};
use crate::common;

const SOURCE_HASH: &str = "3f1c";

fn chunks() -> Vec<Chunk> {
    let annotated = CueAnnotator::new().annotate("# One\n\nFirst body.\n\n# Two\n\nSecond body.\n\nThird body.");
    Chunker::new(1200, true).chunk(&annotated)
}

/// Test that persisted chunks load back with the same content
#[test]
fn test_persist_chunks_shouldWriteChunksAndManifest() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let layout = WorkspaceLayout::new(temp_dir.path().join("work"), temp_dir.path().join("book.m4b"));
    let chunks = chunks();

    let manifest = persist_chunks(&layout, &chunks, SOURCE_HASH, false)?;
    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.heading_count(), 2);

    let loaded = Manifest::load(&layout.manifest())?;
    assert_eq!(loaded, manifest);
    assert_eq!(loaded.entries()[1].text_reference, "chunks/chunk_0001.json");
    assert_eq!(loaded.source_hash(), Some(SOURCE_HASH));

    for (entry, chunk) in loaded.entries().iter().zip(&chunks) {
        assert_eq!(&loaded.read_chunk(entry)?, chunk);
        assert!(layout.chunk_preview(entry.index).exists());
    }

    let preview = fs::read_to_string(layout.chunk_preview(0))?;
    assert!(preview.contains(r#"<emphasis level="strong">One</emphasis>"#));
    Ok(())
}

/// Test that an existing manifest is only replaced with force
#[test]
fn test_persist_chunks_withExistingManifest_shouldRequireForce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let layout = WorkspaceLayout::new(temp_dir.path().join("work"), temp_dir.path().join("book.m4b"));

    persist_chunks(&layout, &chunks(), SOURCE_HASH, false)?;
    let result = persist_chunks(&layout, &chunks(), SOURCE_HASH, false);
    assert!(matches!(
        result,
        Err(AppError::Manifest(ManifestError::AlreadyExists(_)))
    ));

    let single = Chunker::new(1200, false).chunk(&CueAnnotator::new().annotate("Only text."));
    let manifest = persist_chunks(&layout, &single, SOURCE_HASH, true)?;
    assert_eq!(manifest.len(), 1);
    assert!(!layout.chunk_file(1).exists(), "stale chunk files are removed");
    Ok(())
}

/// Test that a manifest with a gap in its indices is rejected
#[test]
fn test_load_withBrokenSequence_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "manifest.json",
        r#"{"entries":[{"index":0,"text_reference":"chunks/chunk_0000.json","headings":[]},
            {"index":2,"text_reference":"chunks/chunk_0002.json","headings":[]}]}"#,
    )?;

    let result = Manifest::load(&path);
    assert!(matches!(
        result,
        Err(ManifestError::BrokenSequence { position: 1, found: 2 })
    ));
    Ok(())
}

/// Test loading missing and malformed manifests
#[test]
fn test_load_withMissingOrMalformedFile_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    assert!(matches!(
        Manifest::load(&temp_dir.path().join("nope.json")),
        Err(ManifestError::NotFound(_))
    ));

    let path = common::create_test_file(temp_dir.path(), "manifest.json", "{ not json")?;
    assert!(matches!(Manifest::load(&path), Err(ManifestError::Parse { .. })));
    Ok(())
}

/// Test that a manifest without a recorded source matches no source
#[test]
fn test_load_withoutSourceHash_shouldMatchNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "manifest.json",
        r#"{"entries":[{"index":0,"text_reference":"chunks/chunk_0000.json","headings":[]}]}"#,
    )?;

    let manifest = Manifest::load(&path)?;
    assert_eq!(manifest.source_hash(), None);
    assert!(!manifest.matches_source(&FileManager::sha256_hex(b"# One")));
    Ok(())
}

/// Test the hex digest used to stamp manifests
#[test]
fn test_sha256_hex_shouldMatchKnownDigest() {
    assert_eq!(
        FileManager::sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
