/*!
 * Chunk manifest persistence.
 *
 * The manifest is the ordered list of chunks every later stage works
 * from. It is written once, after all chunk files, through a temporary
 * file and a rename; afterwards it is only read. Manifest order, chunk
 * index order and concatenation order are the same.
 */

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{AppError, ManifestError};
use crate::file_utils::{FileManager, WorkspaceLayout, chunk_stem};
use crate::synthesis::CueRenderer;
use crate::text::Chunk;

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Chunk index, equal to the entry's position
    pub index: usize,
    /// Chunk file path relative to the manifest's directory
    pub text_reference: String,
    /// Headings contained in the chunk
    #[serde(default)]
    pub headings: Vec<String>,
}

/// On-disk layout of `manifest.json`
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    /// SHA-256 of the Markdown the chunks were cut from
    #[serde(default)]
    source_sha256: Option<String>,
    entries: Vec<ManifestEntry>,
}

/// Ordered chunk manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    source_sha256: Option<String>,
    base_dir: PathBuf,
}

impl Manifest {
    /// Manifest describing freshly produced chunks under `base_dir`
    pub fn from_chunks(chunks: &[Chunk], base_dir: &Path) -> Self {
        let entries = chunks
            .iter()
            .map(|chunk| ManifestEntry {
                index: chunk.index,
                text_reference: format!("chunks/{}.json", chunk_stem(chunk.index)),
                headings: chunk.headings.clone(),
            })
            .collect();

        Self {
            entries,
            source_sha256: None,
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Record the hash of the source the chunks were cut from
    pub fn with_source_hash(mut self, hash: impl Into<String>) -> Self {
        self.source_sha256 = Some(hash.into());
        self
    }

    pub fn source_hash(&self) -> Option<&str> {
        self.source_sha256.as_deref()
    }

    /// Whether the manifest was cut from a source with this hash
    pub fn matches_source(&self, hash: &str) -> bool {
        self.source_sha256.as_deref() == Some(hash)
    }

    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let file: ManifestFile =
            serde_json::from_str(&content).map_err(|e| ManifestError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let manifest = Self {
            entries: file.entries,
            source_sha256: file.source_sha256,
            base_dir,
        };
        manifest.validate()?;

        debug!("Loaded manifest with {} entries from {:?}", manifest.len(), path);
        Ok(manifest)
    }

    /// Indices must be exactly 0..n in order
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.index != position {
                return Err(ManifestError::BrokenSequence {
                    position,
                    found: entry.index,
                });
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of headings across all chunks
    pub fn heading_count(&self) -> usize {
        self.entries.iter().map(|e| e.headings.len()).sum()
    }

    /// Absolute path of an entry's chunk file
    pub fn chunk_path(&self, entry: &ManifestEntry) -> PathBuf {
        self.base_dir.join(&entry.text_reference)
    }

    /// Read the persisted chunk of an entry
    pub fn read_chunk(&self, entry: &ManifestEntry) -> Result<Chunk, ManifestError> {
        let path = self.chunk_path(entry);
        let content = std::fs::read_to_string(&path).map_err(|e| ManifestError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let chunk: Chunk = serde_json::from_str(&content).map_err(|e| ManifestError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        if chunk.index != entry.index {
            return Err(ManifestError::ChunkMismatch {
                path,
                expected: entry.index,
                found: chunk.index,
            });
        }
        Ok(chunk)
    }

    /// Write the manifest atomically
    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        let file = ManifestFile {
            source_sha256: self.source_sha256.clone(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AppError::File(format!("Failed to serialize manifest: {}", e)))?;
        FileManager::write_atomic(path, json.as_bytes()).map_err(|e| AppError::File(format!("{:#}", e)))
    }
}

/// Persist chunks and their manifest.
///
/// Each chunk is written as typed segments plus a readable markup preview;
/// the manifest goes last, stamped with `source_hash`. An existing
/// manifest is only replaced when `force` is set.
pub fn persist_chunks(
    layout: &WorkspaceLayout,
    chunks: &[Chunk],
    source_hash: &str,
    force: bool,
) -> Result<Manifest, AppError> {
    let manifest_path = layout.manifest();
    if manifest_path.exists() && !force {
        return Err(ManifestError::AlreadyExists(manifest_path).into());
    }

    let to_app_error = |e: anyhow::Error| AppError::File(format!("{:#}", e));

    if force {
        FileManager::remove_dir_if_exists(layout.chunks_dir()).map_err(to_app_error)?;
    }
    FileManager::ensure_dir(layout.chunks_dir()).map_err(to_app_error)?;

    let preview = CueRenderer::markup();
    for chunk in chunks {
        let json = serde_json::to_string_pretty(chunk)
            .map_err(|e| AppError::File(format!("Failed to serialize chunk {}: {}", chunk.index, e)))?;
        FileManager::write_atomic(layout.chunk_file(chunk.index), json.as_bytes())
            .map_err(to_app_error)?;
        FileManager::write_to_file(
            layout.chunk_preview(chunk.index),
            &preview.render(&chunk.paragraphs),
        )
        .map_err(to_app_error)?;
    }

    let manifest = Manifest::from_chunks(chunks, &layout.work_dir).with_source_hash(source_hash);
    manifest.write(&manifest_path)?;

    info!("Wrote {} chunks and manifest to {:?}", chunks.len(), layout.work_dir);
    Ok(manifest)
}
