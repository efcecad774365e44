/*!
 * Final audiobook assembly.
 *
 * Mastered units are concatenated strictly in manifest order, chapter
 * marks are derived from the headings recorded in the manifest and the
 * cumulative unit durations, and the muxer is invoked once to produce the
 * chapterized container.
 */

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::PackagingConfig;
use crate::audio::wav_info;
use crate::errors::{AppError, StageName};
use crate::file_utils::{FileManager, WorkspaceLayout};
use crate::manifest::Manifest;
use crate::tools::{ToolInvocation, ToolRunner};

/// A chapter in the final container, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMark {
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// A mastered unit ready for concatenation
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFile {
    pub index: usize,
    pub path: PathBuf,
    pub duration_ms: f64,
}

/// Summary of an assembly run
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub chapters: Vec<ChapterMark>,
    pub total_duration_ms: u64,
    pub size_bytes: u64,
}

/// Locate every mastered unit in manifest order.
///
/// Fails with the first missing index.
pub fn collect_units(manifest: &Manifest, layout: &WorkspaceLayout) -> Result<Vec<UnitFile>, AppError> {
    let mut units = Vec::with_capacity(manifest.len());

    for entry in manifest.entries() {
        let path = layout.mastered_unit(entry.index);
        if !path.exists() {
            return Err(AppError::MissingUnit {
                index: entry.index,
                path,
            });
        }

        let info = wav_info(&path)?;
        units.push(UnitFile {
            index: entry.index,
            path,
            duration_ms: info.duration_ms_f64(),
        });
    }

    Ok(units)
}

/// Chapter marks from manifest headings and unit durations.
///
/// A heading starts at the cumulative duration of every unit before its
/// chunk and ends where the next mark starts, or at the end of the book.
/// Without any heading the whole book is one chapter named after it.
pub fn compute_chapters(manifest: &Manifest, durations_ms: &[f64], book_title: &str) -> Vec<ChapterMark> {
    let total: f64 = durations_ms.iter().sum();
    let total_ms = total.round() as u64;

    let mut starts: Vec<(String, u64)> = Vec::new();
    let mut offset: f64 = 0.0;
    for (entry, duration) in manifest.entries().iter().zip(durations_ms) {
        for heading in &entry.headings {
            starts.push((heading.clone(), offset.round() as u64));
        }
        offset += duration;
    }

    if starts.is_empty() {
        return vec![ChapterMark {
            title: book_title.to_string(),
            start_ms: 0,
            end_ms: total_ms,
        }];
    }

    let mut chapters = Vec::with_capacity(starts.len());
    for (i, (title, start_ms)) in starts.iter().enumerate() {
        let end_ms = starts
            .get(i + 1)
            .map(|(_, next)| *next)
            .unwrap_or(total_ms);
        chapters.push(ChapterMark {
            title: title.clone(),
            start_ms: *start_ms,
            end_ms,
        });
    }
    chapters
}

/// Concat demuxer list: one `file '<path>'` line per unit
pub fn concat_list(units: &[UnitFile]) -> String {
    let mut list = String::new();
    for unit in units {
        let path = unit.path.display().to_string().replace('\'', r"'\''");
        list.push_str(&format!("file '{}'\n", path));
    }
    list
}

fn escape_metadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// FFMETADATA1 document with global tags and millisecond chapters
pub fn render_ffmetadata(config: &PackagingConfig, chapters: &[ChapterMark]) -> String {
    let mut doc = String::from(";FFMETADATA1\n");
    doc.push_str(&format!("title={}\n", escape_metadata(&config.title)));
    doc.push_str(&format!("artist={}\n", escape_metadata(&config.artist)));
    doc.push_str(&format!("album={}\n", escape_metadata(&config.album)));
    doc.push_str("genre=Audiobook\n");

    for chapter in chapters {
        doc.push_str("\n[CHAPTER]\nTIMEBASE=1/1000\n");
        doc.push_str(&format!("START={}\n", chapter.start_ms));
        doc.push_str(&format!("END={}\n", chapter.end_ms));
        doc.push_str(&format!("title={}\n", escape_metadata(&chapter.title)));
    }

    doc
}

/// Assembles mastered units into the final chapterized file
#[derive(Debug)]
pub struct Assembler {
    config: PackagingConfig,
    runner: Arc<dyn ToolRunner>,
}

impl Assembler {
    pub fn new(config: PackagingConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self { config, runner }
    }

    /// Cover image to attach, if configured and present
    fn cover(&self) -> Option<&Path> {
        let cover = self.config.cover.as_deref()?;
        if cover.exists() {
            Some(cover)
        } else {
            warn!("Cover image {:?} not found, packaging without cover", cover);
            None
        }
    }

    /// The single muxer invocation
    pub fn mux_invocation(&self, layout: &WorkspaceLayout, output: &Path) -> ToolInvocation {
        let cover = self.cover();

        let mut invocation = ToolInvocation::new(&self.config.ffmpeg)
            .args(["-y", "-hide_banner", "-nostats", "-f", "concat", "-safe", "0", "-i"])
            .arg(layout.concat_list().display().to_string())
            .arg("-i")
            .arg(layout.chapters_file().display().to_string());

        if let Some(cover) = cover {
            invocation = invocation.arg("-i").arg(cover.display().to_string());
        }

        invocation = invocation.args(["-map", "0:a", "-map_metadata", "1", "-map_chapters", "1"]);

        if cover.is_some() {
            invocation = invocation.args([
                "-map",
                "2:v",
                "-c:v",
                "copy",
                "-disposition:v:0",
                "attached_pic",
            ]);
        }

        invocation
            .args(["-c:a", "aac", "-b:a"])
            .arg(self.config.bitrate.clone())
            .arg("-metadata")
            .arg(format!("title={}", self.config.title))
            .arg("-metadata")
            .arg(format!("artist={}", self.config.artist))
            .arg("-metadata")
            .arg(format!("album={}", self.config.album))
            .args(["-metadata", "genre=Audiobook", "-f", "mp4"])
            .arg(output.display().to_string())
            .timeout(Duration::from_secs(self.config.timeout_secs))
    }

    /// Verify units, write the concat list and chapters, and mux once
    pub async fn run(&self, manifest: &Manifest, layout: &WorkspaceLayout) -> Result<AssemblyReport, AppError> {
        let to_app_error = |e: anyhow::Error| AppError::File(format!("{:#}", e));

        let units = collect_units(manifest, layout)?;
        let durations: Vec<f64> = units.iter().map(|u| u.duration_ms).collect();
        let chapters = compute_chapters(manifest, &durations, &self.config.title);
        let total_duration_ms = durations.iter().sum::<f64>().round() as u64;

        debug!("Assembling {} units into {} chapters", units.len(), chapters.len());

        FileManager::write_to_file(layout.concat_list(), &concat_list(&units)).map_err(to_app_error)?;
        FileManager::write_to_file(layout.chapters_file(), &render_ffmetadata(&self.config, &chapters))
            .map_err(to_app_error)?;

        let output = layout.output.clone();
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                FileManager::ensure_dir(parent).map_err(to_app_error)?;
            }
        }
        let partial = output.with_extension("partial.m4b");

        if let Err(e) = self.runner.run(self.mux_invocation(layout, &partial)).await {
            let _ = FileManager::remove_if_exists(&partial);
            return Err(AppError::external(StageName::Assembly, None, e.to_string()));
        }

        if !partial.exists() {
            return Err(AppError::external(StageName::Assembly, None, "muxer produced no output"));
        }
        std::fs::rename(&partial, &output)?;

        FileManager::remove_if_exists(layout.concat_list()).map_err(to_app_error)?;
        FileManager::remove_if_exists(layout.chapters_file()).map_err(to_app_error)?;

        let size_bytes = FileManager::file_size(&output).map_err(to_app_error)?;
        info!(
            "Audiobook written to {:?} ({}, {} chapters)",
            output,
            FileManager::format_size(size_bytes),
            chapters.len()
        );

        Ok(AssemblyReport {
            output,
            chapters,
            total_duration_ms,
            size_bytes,
        })
    }
}
