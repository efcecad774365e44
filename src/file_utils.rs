use anyhow::{Context, Result};
use chrono::Local;
use sha2::{Digest, Sha256};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Find files with a specific extension in a directory (non-recursive)
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        let normalized_ext = extension.trim_start_matches('.');

        if !Self::dir_exists(&dir) {
            return Ok(result);
        }

        for entry in WalkDir::new(dir.as_ref()).min_depth(1).max_depth(1) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension() {
                    if ext.to_string_lossy().eq_ignore_ascii_case(normalized_ext) {
                        result.push(path.to_path_buf());
                    }
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Write bytes through a temporary file in the same directory, then rename.
    ///
    /// Readers either see the previous content or the complete new content.
    pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temporary file in {:?}", parent))?;
        temp.write_all(content)
            .with_context(|| format!("Failed to write temporary file for {:?}", path))?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to move temporary file onto {:?}", path))?;

        Ok(())
    }

    /// Hex SHA-256 of a byte slice
    pub fn sha256_hex(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /// Copy a file from one location to another, ensuring the target directory exists
    pub fn copy_file<P1: AsRef<Path>, P2: AsRef<Path>>(from: P1, to: P2) -> Result<()> {
        let from = from.as_ref();
        let to = to.as_ref();

        if !from.exists() {
            return Err(anyhow::anyhow!("Source file does not exist: {:?}", from));
        }

        // Ensure the target directory exists
        if let Some(parent) = to.parent() {
            Self::ensure_dir(parent)?;
        }

        fs::copy(from, to)
            .with_context(|| format!("Failed to copy {:?} to {:?}", from, to))?;

        Ok(())
    }

    /// Append content to a log file with timestamp
    pub fn append_to_log_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        // Open file in append mode, create if it doesn't exist
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path.as_ref()))?;

        writeln!(file, "[{}] {}", timestamp, content)
            .with_context(|| format!("Failed to write to log file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Remove a file, ignoring one that is already gone
    pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", path)),
        }
    }

    /// Remove a directory tree, ignoring one that is already gone
    pub fn remove_dir_if_exists<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove directory {:?}", path)),
        }
    }

    /// File size in bytes
    pub fn file_size<P: AsRef<Path>>(path: P) -> Result<u64> {
        let metadata = fs::metadata(&path)
            .with_context(|| format!("Failed to stat file: {:?}", path.as_ref()))?;
        Ok(metadata.len())
    }

    /// Human-readable size, e.g. "12.4 MB"
    pub fn format_size(bytes: u64) -> String {
        const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
        let mut size = bytes as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{} {}", bytes, UNITS[0])
        } else {
            format!("{:.1} {}", size, UNITS[unit])
        }
    }
}

/// External name of a chunk or unit index (`chunk_0007`)
pub fn chunk_stem(index: usize) -> String {
    format!("chunk_{:04}", index)
}

/// Every path a run reads or writes, derived from one work directory
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceLayout {
    // @field: Root of all intermediate artifacts
    pub work_dir: PathBuf,
    // @field: Final audiobook
    pub output: PathBuf,
}

impl WorkspaceLayout {
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(work_dir: P1, output: P2) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Converted Markdown of the book
    pub fn markdown(&self) -> PathBuf {
        self.work_dir.join("book.md")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.work_dir.join("chunks")
    }

    pub fn manifest(&self) -> PathBuf {
        self.work_dir.join("manifest.json")
    }

    pub fn wavs_dir(&self) -> PathBuf {
        self.work_dir.join("wavs")
    }

    pub fn mastered_dir(&self) -> PathBuf {
        self.work_dir.join("wavs_master")
    }

    pub fn concat_list(&self) -> PathBuf {
        self.work_dir.join("concat.txt")
    }

    pub fn chapters_file(&self) -> PathBuf {
        self.work_dir.join("chapters.txt")
    }

    /// Persisted typed segments of a chunk
    pub fn chunk_file(&self, index: usize) -> PathBuf {
        self.chunks_dir().join(format!("{}.json", chunk_stem(index)))
    }

    /// Human-readable preview of a chunk
    pub fn chunk_preview(&self, index: usize) -> PathBuf {
        self.chunks_dir().join(format!("{}.txt", chunk_stem(index)))
    }

    /// Raw synthesized unit
    pub fn raw_unit(&self, index: usize) -> PathBuf {
        self.wavs_dir().join(format!("{}.wav", chunk_stem(index)))
    }

    /// Loudness-mastered unit
    pub fn mastered_unit(&self, index: usize) -> PathBuf {
        self.mastered_dir().join(format!("{}.wav", chunk_stem(index)))
    }

    /// Create the directories every stage writes into
    pub fn prepare(&self) -> Result<()> {
        FileManager::ensure_dir(&self.work_dir)?;
        FileManager::ensure_dir(self.chunks_dir())?;
        FileManager::ensure_dir(self.wavs_dir())?;
        FileManager::ensure_dir(self.mastered_dir())?;
        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() {
                FileManager::ensure_dir(parent)?;
            }
        }
        Ok(())
    }
}
