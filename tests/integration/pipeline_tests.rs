/*!
 * End-to-end pipeline tests with mock engine and tools
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;

use bookvox::app_controller::{RunOptions, Stage};
use bookvox::audio::wav_info;
use bookvox::errors::{AppError, ManifestError};
use bookvox::manifest::Manifest;
use bookvox::synthesis::mock::MockEngine;
use bookvox::tools::mock::MockToolRunner;
use crate::common;

/// Test a full run from a Markdown book to the packaged audiobook
#[tokio::test]
async fn test_full_run_withChapteredBook_shouldPackageOneChapterPerHeading() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let config = common::config_in(temp_dir.path());
    let runner = Arc::new(MockToolRunner::copying());
    let controller = common::mock_controller(config, Arc::new(MockEngine::working()), runner.clone())?;

    let report = controller.run(Some(&book), RunOptions::default()).await?;

    assert!(report.output.exists());
    assert_eq!(report.output, temp_dir.path().join("out").join("book.m4b"));
    let titles: Vec<&str> = report.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Chapter One", "Chapter Two", "Chapter Three"]);
    assert_eq!(report.chapters[0].start_ms, 0);
    assert_eq!(report.chapters[2].end_ms, report.total_duration_ms);

    let manifest = Manifest::load(&controller.layout().manifest())?;
    for entry in manifest.entries() {
        assert!(controller.layout().raw_unit(entry.index).exists());
        assert!(controller.layout().mastered_unit(entry.index).exists());
    }

    // scratch files of the muxing step are gone
    assert!(!controller.layout().concat_list().exists());
    assert!(!controller.layout().chapters_file().exists());

    // one mastering call per unit and a single mux
    let mux_calls = runner
        .invocations()
        .iter()
        .filter(|i| i.args.iter().any(|a| a == "concat"))
        .count();
    assert_eq!(mux_calls, 1);
    assert_eq!(runner.call_count(), manifest.len() + 1);
    Ok(())
}

/// Test that abbreviations are expanded before synthesis
#[tokio::test]
async fn test_full_run_shouldSendNormalizedTextToEngine() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let engine = Arc::new(MockEngine::working());
    let controller = common::mock_controller(
        common::config_in(temp_dir.path()),
        engine.clone(),
        Arc::new(MockToolRunner::copying()),
    )?;

    controller.run(Some(&book), RunOptions::default()).await?;

    let texts: Vec<String> = engine.requests().into_iter().map(|r| r.text).collect();
    assert!(texts.iter().any(|t| t.contains("Mister Smith walked home slowly.")));
    assert!(texts.iter().all(|t| !t.contains("Mr.")));
    assert!(texts.iter().any(|t| t.contains(r#"<emphasis level="strong">Chapter Two</emphasis>"#)));
    Ok(())
}

/// Test that a second run reuses the manifest and every unit
#[tokio::test]
async fn test_rerun_withCompleteWorkDir_shouldNotSynthesizeAgain() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let config = common::config_in(temp_dir.path());

    common::working_controller(config.clone())?
        .run(Some(&book), RunOptions::default())
        .await?;
    let manifest_before = fs::read_to_string(temp_dir.path().join("work").join("manifest.json"))?;

    let engine = Arc::new(MockEngine::working());
    let controller = common::mock_controller(config, engine.clone(), Arc::new(MockToolRunner::copying()))?;
    controller
        .run(
            None,
            RunOptions {
                from_stage: Stage::Chunk,
                force: false,
            },
        )
        .await?;

    assert_eq!(engine.request_count(), 0);
    assert_eq!(fs::read_to_string(controller.layout().manifest())?, manifest_before);
    Ok(())
}

/// Test that a new book in a used work dir is chunked and synthesized afresh
#[tokio::test]
async fn test_full_run_withNewBookInSameWorkDir_shouldNotReuseOldAudio() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = common::config_in(temp_dir.path());
    let first = common::create_test_file(temp_dir.path(), "alpha.md", "# Alpha\n\nThe first book.\n")?;
    let second = common::create_test_file(
        temp_dir.path(),
        "beta.md",
        "# Beta\n\nThe second book.\n\n# Gamma\n\nIt has two chapters.\n",
    )?;

    let first_report = common::working_controller(config.clone())?
        .run(Some(&first), RunOptions::default())
        .await?;
    assert_eq!(first_report.chapters.len(), 1);

    let engine = Arc::new(MockEngine::working());
    let controller = common::mock_controller(config, engine.clone(), Arc::new(MockToolRunner::copying()))?;
    let report = controller.run(Some(&second), RunOptions::default()).await?;

    let titles: Vec<&str> = report.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Beta", "Gamma"]);

    let manifest = Manifest::load(&controller.layout().manifest())?;
    assert_eq!(engine.request_count(), manifest.len());
    assert!(engine.requests().iter().all(|r| !r.text.contains("Alpha")));
    assert!(!controller.layout().raw_unit(manifest.len()).exists());
    Ok(())
}

/// Test that forced re-chunking drops audio of the previous chunking
#[tokio::test]
async fn test_chunk_withForce_shouldRemoveStaleUnits() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let controller = common::working_controller(common::config_in(temp_dir.path()))?;

    controller.run(Some(&book), RunOptions::default()).await?;
    assert!(controller.layout().raw_unit(0).exists());

    let markdown = controller.layout().markdown();
    let unforced = controller.chunk(&markdown, false);
    let unforced_error = unforced.err().and_then(|e| e.downcast::<AppError>().ok());
    assert!(matches!(
        unforced_error,
        Some(AppError::Manifest(ManifestError::AlreadyExists(_)))
    ));

    controller.chunk(&markdown, true)?;
    assert!(!controller.layout().raw_unit(0).exists());
    assert!(!controller.layout().mastered_unit(0).exists());
    Ok(())
}

/// Test that starting after chunking without a manifest fails clearly
#[tokio::test]
async fn test_run_fromSynthesize_withoutManifest_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = common::working_controller(common::config_in(temp_dir.path()))?;

    let result = controller
        .run(
            None,
            RunOptions {
                from_stage: Stage::Synthesize,
                force: false,
            },
        )
        .await;

    let error = result.err().map(|e| format!("{:#}", e)).unwrap_or_default();
    assert!(error.contains("Manifest not found"), "error was {}", error);
    Ok(())
}

/// Test status reporting across a run
#[test]
fn test_status_shouldReflectWorkDir() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let controller = common::working_controller(common::config_in(temp_dir.path()))?;

    let empty = controller.status()?;
    assert_eq!(empty.manifest_entries, None);
    assert!(!empty.output_exists);

    tokio_test::block_on(async {
        controller.run(Some(&book), RunOptions::default()).await
    })?;
    let status = controller.status()?;
    let entries = status.manifest_entries.unwrap_or_default();
    assert!(entries >= 3);
    assert_eq!(status.headings, 3);
    assert_eq!(status.raw_units, entries);
    assert_eq!(status.mastered_units, entries);
    assert!(status.output_exists);
    Ok(())
}

/// Test that mastered units keep the duration of their raw unit
#[tokio::test]
async fn test_full_run_shouldPreserveUnitDurations() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let controller = common::working_controller(common::config_in(temp_dir.path()))?;

    let report = controller.run(Some(&book), RunOptions::default()).await?;

    let manifest = Manifest::load(&controller.layout().manifest())?;
    let mut total = 0.0_f64;
    for entry in manifest.entries() {
        let raw = wav_info(&controller.layout().raw_unit(entry.index))?;
        let mastered = wav_info(&controller.layout().mastered_unit(entry.index))?;
        assert_eq!(raw.frames, mastered.frames);
        total += mastered.duration_ms_f64();
    }
    assert_eq!(report.total_duration_ms, total.round() as u64);
    Ok(())
}
