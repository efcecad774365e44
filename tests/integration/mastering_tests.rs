/*!
 * Mastering and packaging tests with mock tools
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;

use bookvox::app_config::SynthesisEngineKind;
use bookvox::app_controller::{Controller, RunOptions, Stage};
use bookvox::errors::{AppError, StageName};
use bookvox::synthesis::SynthesisEngine;
use bookvox::synthesis::fast::FastEngine;
use bookvox::synthesis::mock::MockEngine;
use bookvox::tools::ToolRunner;
use bookvox::tools::mock::{MockToolBehavior, MockToolRunner};
use crate::common;

/// Test that a failed de-essing pass is retried with default parameters
#[tokio::test]
async fn test_mastering_withFailingDeesser_shouldRetryWithDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let mut config = common::config_in(temp_dir.path());
    config.mastering.deess = true;

    let runner = Arc::new(MockToolRunner::new(MockToolBehavior::FailWhenArgContains(
        "deesser".to_string(),
    )));
    let controller = common::mock_controller(config, Arc::new(MockEngine::working()), runner.clone())?;

    controller.convert(&book).await?;
    let manifest = controller.chunk(&controller.layout().markdown(), false)?;
    controller.synthesize().await?;

    let report = controller.master().await?;
    assert_eq!(report.mastered, manifest.len());
    assert_eq!(report.retried, manifest.len());

    let filters: Vec<String> = runner
        .invocations()
        .iter()
        .filter_map(|i| i.arg_after("-af").map(str::to_string))
        .collect();
    assert_eq!(filters.len(), manifest.len() * 2);
    assert_eq!(filters.iter().filter(|f| f.contains("deesser")).count(), manifest.len());

    let issues = fs::read_to_string(controller.layout().work_dir.join("bookvox.issues.log"))?;
    assert!(issues.contains("retrying with defaults"));
    Ok(())
}

/// Test that a unit failing both attempts halts mastering with its index
#[tokio::test]
async fn test_mastering_withFailingTool_shouldReportLowestIndex() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_flat_book(temp_dir.path(), 4)?;
    let controller = common::mock_controller(
        common::config_in(temp_dir.path()),
        Arc::new(MockEngine::working()),
        Arc::new(MockToolRunner::failing()),
    )?;

    let error = controller
        .run(Some(&book), RunOptions::default())
        .await
        .err()
        .expect("mastering should fail");
    let app_error = error.downcast_ref::<AppError>().expect("typed error");
    assert!(matches!(
        app_error,
        AppError::ExternalTool { stage: StageName::Mastering, index: Some(0), .. }
    ));
    assert!(!controller.layout().mastered_unit(0).exists());
    assert!(!controller.layout().mastered_unit(0).with_extension("partial.wav").exists());
    Ok(())
}

/// Test that a mastering pass changing the duration is rejected
#[tokio::test]
async fn test_mastering_withDurationDrift_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_flat_book(temp_dir.path(), 2)?;
    let controller = common::mock_controller(
        common::config_in(temp_dir.path()),
        Arc::new(MockEngine::working()),
        // always writes 50 ms, mock units are several hundred ms long
        Arc::new(MockToolRunner::silent_wav(50, 24000)),
    )?;

    let error = controller
        .run(Some(&book), RunOptions::default())
        .await
        .err()
        .expect("duration drift should fail");
    let message = format!("{:#}", error);
    assert!(message.contains("duration changed"), "error was {}", message);
    assert!(matches!(
        error.downcast_ref::<AppError>(),
        Some(AppError::ExternalTool { stage: StageName::Mastering, .. })
    ));
    Ok(())
}

/// Test that mastering refuses to run over a missing raw unit
#[tokio::test]
async fn test_mastering_withMissingRawUnit_shouldReportIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_flat_book(temp_dir.path(), 3)?;
    let controller = common::working_controller(common::config_in(temp_dir.path()))?;

    controller.convert(&book).await?;
    controller.chunk(&controller.layout().markdown(), false)?;
    controller.synthesize().await?;
    fs::remove_file(controller.layout().raw_unit(1))?;

    let error = controller.master().await.err().expect("missing unit");
    assert!(matches!(
        error.downcast_ref::<AppError>(),
        Some(AppError::MissingUnit { index: 1, .. })
    ));
    Ok(())
}

/// Test that packaging names the first missing mastered unit and writes nothing
#[tokio::test]
async fn test_package_withMissingMasteredUnit_shouldNotWriteOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_flat_book(temp_dir.path(), 4)?;
    let config = common::config_in(temp_dir.path());
    let controller = common::working_controller(config)?;

    controller
        .run(Some(&book), RunOptions::default())
        .await?;
    fs::remove_file(&controller.layout().output)?;
    fs::remove_file(controller.layout().mastered_unit(2))?;
    fs::remove_file(controller.layout().mastered_unit(3))?;

    let error = controller.package().await.err().expect("missing unit");
    let app_error = error.downcast_ref::<AppError>().expect("typed error");
    assert!(matches!(app_error, AppError::MissingUnit { index: 2, .. }));
    assert_eq!(app_error.chunk_index(), Some(2));
    assert!(!controller.layout().output.exists());
    Ok(())
}

/// Test that a failing muxer leaves no partial audiobook behind
#[tokio::test]
async fn test_package_withFailingMuxer_shouldLeaveNoOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_flat_book(temp_dir.path(), 2)?;
    let config = common::config_in(temp_dir.path());

    common::working_controller(config.clone())?
        .run(
            Some(&book),
            RunOptions {
                from_stage: Stage::Convert,
                force: false,
            },
        )
        .await?;
    fs::remove_file(&config.packaging.output)?;

    let controller = common::mock_controller(
        config,
        Arc::new(MockEngine::working()),
        Arc::new(MockToolRunner::new(MockToolBehavior::FailWhenArgContains(
            "concat".to_string(),
        ))),
    )?;
    let error = controller.package().await.err().expect("muxer failure");
    assert!(matches!(
        error.downcast_ref::<AppError>(),
        Some(AppError::ExternalTool { stage: StageName::Assembly, index: None, .. })
    ));
    assert!(!controller.layout().output.exists());
    assert!(!controller.layout().output.with_extension("partial.m4b").exists());
    Ok(())
}

/// Test a full run through the command-line engine
#[tokio::test]
async fn test_full_run_withFastEngine_shouldPackage() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let book = common::create_test_book(temp_dir.path())?;
    let mut config = common::config_in(temp_dir.path());
    config.synthesis.engine = SynthesisEngineKind::Fast;

    let mock = Arc::new(MockToolRunner::silent_wav(200, 22050));
    let runner: Arc<dyn ToolRunner> = mock.clone();
    let engine: Arc<dyn SynthesisEngine> = Arc::new(FastEngine::new("piper", Vec::new(), 30, runner.clone()));
    let controller = Controller::with_components(config, runner, engine)?.with_progress(false);

    let report = controller.run(Some(&book), RunOptions::default()).await?;
    assert!(report.output.exists());
    assert_eq!(report.chapters.len(), 3);

    let synth_calls: Vec<_> = mock
        .invocations()
        .into_iter()
        .filter(|i| i.program == "piper" && i.arg_after("--output_file").is_some())
        .collect();
    assert!(!synth_calls.is_empty());
    for call in &synth_calls {
        let text = call.stdin.clone().unwrap_or_default();
        assert!(!text.contains('<'), "markup sent to the fast engine: {:?}", text);
    }
    Ok(())
}
