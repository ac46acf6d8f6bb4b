// End-to-end tests for the stream session orchestrator.
//
// A scripted in-process recognizer stands in for the remote backend, a
// recording hook captures completion, and all files land in a tempdir.

mod common;

use anyhow::Result;
use callscribe::audio::AudioArchiver;
use callscribe::ledger::TranscriptLedger;
use callscribe::session::{SessionConfig, StreamSession};
use callscribe::stt::RecognitionConfig;
use chrono::Utc;
use common::{fin, interim, silent_payload, FlakyArchive, RecordingHook, RejectingSink, ScriptedRecognizer};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _temp_dir: TempDir,
    config: SessionConfig,
    ledger: Arc<TranscriptLedger>,
    hook: Arc<RecordingHook>,
}

fn harness(call_id: &str) -> Result<Harness> {
    let temp_dir = TempDir::new()?;

    let config = SessionConfig {
        call_id: call_id.to_string(),
        recordings_dir: temp_dir.path().join("recordings"),
        recognition: RecognitionConfig::default(),
        drain_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };

    let ledger = Arc::new(TranscriptLedger::open(
        temp_dir.path().join("transcripts.csv"),
    )?);

    Ok(Harness {
        _temp_dir: temp_dir,
        config,
        ledger,
        hook: Arc::new(RecordingHook::default()),
    })
}

fn ledger_rows(ledger: &TranscriptLedger) -> Vec<String> {
    let contents = std::fs::read_to_string(ledger.path()).unwrap_or_default();
    contents.lines().skip(1).map(str::to_string).collect()
}

#[tokio::test]
async fn test_end_to_end_call() -> Result<()> {
    // [start, media f1..f4 (interim after f3, final after f4), stop]
    let h = harness("CA-e2e")?;
    let recognizer = ScriptedRecognizer::new(vec![interim(3, "hello"), fin(4, "hello world")]);

    let mut session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await?;

    for _ in 0..4 {
        session.handle_media(&silent_payload(160)).await;
    }

    let outcome = session.finish().await?;

    // Four frames of PCM archived
    assert_eq!(outcome.archive.sample_count, 4 * 160);
    assert!((outcome.archive.duration_secs - 0.08).abs() < 1e-9);
    assert_eq!(outcome.stats.frames_received, 4);
    assert_eq!(outcome.stats.frames_archived, 4);
    assert_eq!(outcome.stats.interim_results, 1);
    assert_eq!(outcome.stats.final_results, 1);

    // Exactly one ledger row, carrying the final text
    let rows = ledger_rows(&h.ledger);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains("hello world"));
    assert!(rows[0].contains("CA-e2e"));
    assert!(!rows[0].contains("hello,"), "interim text must not be persisted");

    // Hook fired exactly once with the archive path
    assert_eq!(h.hook.fired(), 1);
    let fired = h.hook.outcomes.lock().unwrap()[0].clone();
    assert_eq!(fired.archive.path, outcome.archive.path);

    // The archive is a playable 8kHz mono WAV
    let reader = hound::WavReader::open(&outcome.archive.path)?;
    assert_eq!(reader.spec().sample_rate, 8000);
    assert_eq!(reader.len(), 4 * 160);

    Ok(())
}

#[tokio::test]
async fn test_stop_before_any_media() -> Result<()> {
    let h = harness("CA-empty")?;
    let recognizer = ScriptedRecognizer::new(vec![]);

    let session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await?;

    let outcome = session.finish().await?;

    assert_eq!(outcome.archive.sample_count, 0);
    assert!(ledger_rows(&h.ledger).is_empty());
    assert_eq!(h.hook.fired(), 1);

    // Zero-length but valid: the header must still parse.
    let reader = hound::WavReader::open(&outcome.archive.path)?;
    assert_eq!(reader.len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_backend_unavailable_degrades_to_archive_only() -> Result<()> {
    let h = harness("CA-degraded")?;
    let recognizer = ScriptedRecognizer::unavailable();

    let mut session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await?;

    session.handle_media(&silent_payload(160)).await;
    session.handle_media(&silent_payload(160)).await;

    let outcome = session.finish().await?;

    // Audio still archived, hook still fired, no transcript rows.
    assert_eq!(outcome.archive.sample_count, 320);
    assert_eq!(outcome.stats.final_results, 0);
    assert!(ledger_rows(&h.ledger).is_empty());
    assert_eq!(h.hook.fired(), 1);

    Ok(())
}

#[tokio::test]
async fn test_interims_never_persisted_finals_in_order() -> Result<()> {
    let h = harness("CA-order")?;
    let recognizer = ScriptedRecognizer::new(vec![
        interim(1, "on"),
        fin(1, "one"),
        interim(2, "tw"),
        fin(2, "two"),
        // Never reaches its threshold; flushed at stop.
        fin(10, "three"),
    ]);

    let mut session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await?;

    session.handle_media(&silent_payload(160)).await;
    session.handle_media(&silent_payload(160)).await;

    let outcome = session.finish().await?;

    assert_eq!(outcome.stats.interim_results, 2);
    assert_eq!(outcome.stats.final_results, 3);

    let rows = ledger_rows(&h.ledger);
    assert_eq!(rows.len(), 3, "exactly the finals, no more, no less");
    assert!(rows[0].contains(",one,"));
    assert!(rows[1].contains(",two,"));
    assert!(rows[2].contains(",three,"));

    Ok(())
}

#[tokio::test]
async fn test_undecodable_frames_are_skipped_not_fatal() -> Result<()> {
    let h = harness("CA-baddata")?;
    let recognizer = ScriptedRecognizer::new(vec![]);

    let mut session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await?;

    session.handle_media("!!!not-base64!!!").await;
    session.handle_media("").await; // decodes to an empty frame
    session.handle_media(&silent_payload(160)).await;

    let outcome = session.finish().await?;

    assert_eq!(outcome.stats.frames_received, 3);
    assert_eq!(outcome.stats.decode_failures, 2);
    assert_eq!(outcome.stats.frames_archived, 1);
    assert_eq!(outcome.archive.sample_count, 160);
    assert_eq!(h.hook.fired(), 1);

    Ok(())
}

#[tokio::test]
async fn test_forward_failure_does_not_stop_archiving() -> Result<()> {
    let h = harness("CA-hangup")?;
    // The stream opens but both endpoints are gone before the first
    // frame: forwarding fails once, then stays off.
    let recognizer = ScriptedRecognizer::hangup();

    let mut session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await?;

    for _ in 0..3 {
        session.handle_media(&silent_payload(160)).await;
    }

    let outcome = session.finish().await?;

    assert_eq!(outcome.stats.forward_failures, 1);
    assert_eq!(outcome.stats.frames_received, 3);
    assert_eq!(outcome.stats.frames_archived, 3);
    assert_eq!(outcome.archive.sample_count, 480);
    assert!(ledger_rows(&h.ledger).is_empty());
    assert_eq!(h.hook.fired(), 1);

    Ok(())
}

#[tokio::test]
async fn test_ledger_failure_is_counted_not_fatal() -> Result<()> {
    let h = harness("CA-badledger")?;
    let recognizer = ScriptedRecognizer::new(vec![fin(2, "lost words")]);

    let mut session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        Arc::new(RejectingSink),
        h.hook.clone(),
    )
    .await?;

    session.handle_media(&silent_payload(160)).await;
    session.handle_media(&silent_payload(160)).await;

    let outcome = session.finish().await?;

    // The final was observed but its row was lost; the session closes
    // normally and the hook still fires.
    assert_eq!(outcome.stats.final_results, 1);
    assert_eq!(outcome.stats.ledger_write_failures, 1);
    assert_eq!(outcome.archive.sample_count, 320);
    assert_eq!(h.hook.fired(), 1);

    Ok(())
}

#[tokio::test]
async fn test_archive_write_failure_is_counted_and_survived() -> Result<()> {
    let h = harness("CA-flaky")?;
    let recognizer = ScriptedRecognizer::new(vec![]);

    let started_at = Utc::now();
    let archiver = AudioArchiver::open(h.config.archive_path(started_at), 8000)?;

    let mut session = StreamSession::with_archive(
        h.config.clone(),
        started_at,
        Box::new(FlakyArchive::new(archiver, 2)),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await;

    for _ in 0..4 {
        session.handle_media(&silent_payload(160)).await;
    }

    let outcome = session.finish().await?;

    // Two frames landed, two were lost to write failures; the session
    // keeps running and still closes a playable archive.
    assert_eq!(outcome.stats.frames_received, 4);
    assert_eq!(outcome.stats.frames_archived, 2);
    assert_eq!(outcome.stats.archive_write_failures, 2);
    assert_eq!(outcome.archive.sample_count, 320);
    assert_eq!(h.hook.fired(), 1);

    let reader = hound::WavReader::open(&outcome.archive.path)?;
    assert_eq!(reader.len(), 320);

    Ok(())
}

#[tokio::test]
async fn test_drain_timeout_still_reports_persisted_finals() -> Result<()> {
    let mut h = harness("CA-stall")?;
    h.config.drain_timeout = Duration::from_millis(500);

    // Emits one final, then never ends the result sequence.
    let recognizer = ScriptedRecognizer::stalling(vec![fin(1, "kept segment")]);

    let mut session = StreamSession::open(
        h.config.clone(),
        &recognizer,
        h.ledger.clone(),
        h.hook.clone(),
    )
    .await?;

    session.handle_media(&silent_payload(160)).await;

    let outcome = session.finish().await?;

    // The drain was cut off by the timeout, but what it persisted
    // before the cutoff is still reported.
    assert_eq!(outcome.stats.final_results, 1);
    let rows = ledger_rows(&h.ledger);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains("kept segment"));
    assert_eq!(h.hook.fired(), 1);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_sessions_stay_isolated() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let ledger = Arc::new(TranscriptLedger::open(
        temp_dir.path().join("transcripts.csv"),
    )?);
    let hook = Arc::new(RecordingHook::default());

    let mut tasks = Vec::new();
    for (call_id, text) in [("CA-first", "alpha"), ("CA-second", "beta")] {
        let config = SessionConfig {
            call_id: call_id.to_string(),
            recordings_dir: temp_dir.path().join("recordings"),
            drain_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        };
        let ledger = Arc::clone(&ledger);
        let hook = hook.clone();
        let text = text.to_string();

        tasks.push(tokio::spawn(async move {
            let recognizer = ScriptedRecognizer::new(vec![fin(3, &text)]);
            let mut session = StreamSession::open(config, &recognizer, ledger, hook)
                .await
                .unwrap();
            for _ in 0..3 {
                session.handle_media(&silent_payload(160)).await;
            }
            session.finish().await.unwrap()
        }));
    }

    let mut paths = Vec::new();
    for task in tasks {
        let outcome = task.await?;
        assert_eq!(outcome.archive.sample_count, 480);
        paths.push(outcome.archive.path);
    }

    // Distinct archives, one per call
    assert_ne!(paths[0], paths[1]);

    // Both rows present and fully formed, whatever the interleaving
    let contents = std::fs::read_to_string(ledger.path())?;
    let rows: Vec<&str> = contents.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.split(',').count(), 4, "interleaved row: {row}");
    }
    assert!(rows.iter().any(|r| r.contains("alpha")));
    assert!(rows.iter().any(|r| r.contains("beta")));

    assert_eq!(hook.fired(), 2);

    Ok(())
}
