//! Cancellation & Concurrency Integration Tests
//!
//! A run blocks its worker thread; cancel, dispose and a second run are
//! issued from other threads while it is in flight.

mod common;

use common::{md5, product, utils, Recorder, ScriptedEngine, ABORTED_CODE};
use plf_uploadr::{ErrorCode, UploadOutcome, Uploader, UploaderState};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn started(engine: &Arc<ScriptedEngine>, recorder: &Arc<Recorder>) -> Uploader {
    let uploader = Uploader::with_engine(engine.clone()).unwrap();
    uploader
        .create("/tmp/fw", utils(), md5(), product(), recorder.listeners("run"))
        .unwrap();
    uploader
}

#[test]
fn test_cancel_during_run_reports_canceled() {
    let engine = Arc::new(ScriptedEngine::slow());
    let recorder = Recorder::new();
    let uploader = started(&engine, &recorder);

    let worker = uploader.runnable().unwrap().spawn().unwrap();
    assert!(recorder.wait_for_progress(WAIT), "run never reported progress");

    assert_eq!(uploader.cancel(), ErrorCode::Ok);
    assert_eq!(worker.join().unwrap(), Ok(()));

    assert_eq!(
        recorder.outcomes(),
        vec![UploadOutcome::Canceled(ABORTED_CODE)]
    );
    assert!(recorder.progress().last().copied().unwrap_or(0) < 100);
    assert_eq!(uploader.dispose(), ErrorCode::Ok);
}

#[test]
fn test_cancel_from_another_thread() {
    let engine = Arc::new(ScriptedEngine::slow());
    let recorder = Recorder::new();
    let uploader = Arc::new(started(&engine, &recorder));

    let task = uploader.runnable().unwrap();
    let canceler = {
        let uploader = uploader.clone();
        let recorder = recorder.clone();
        std::thread::spawn(move || {
            assert!(recorder.wait_for_progress(WAIT));
            uploader.cancel()
        })
    };

    assert_eq!(task.run(), Ok(()));
    assert_eq!(canceler.join().unwrap(), ErrorCode::Ok);

    let outcomes = recorder.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], UploadOutcome::Canceled(_)));
    assert_eq!(uploader.dispose(), ErrorCode::Ok);
}

#[test]
fn test_clean_engine_exit_after_cancel_reports_canceled() {
    let engine = Arc::new(ScriptedEngine::slow().with_clean_abort());
    let recorder = Recorder::new();
    let uploader = started(&engine, &recorder);

    let worker = uploader.runnable().unwrap().spawn().unwrap();
    assert!(recorder.wait_for_progress(WAIT), "run never reported progress");

    assert_eq!(uploader.cancel(), ErrorCode::Ok);
    assert_eq!(worker.join().unwrap(), Ok(()));

    assert_eq!(
        recorder.outcomes(),
        vec![UploadOutcome::Canceled(ErrorCode::Ok)]
    );
    assert_eq!(uploader.dispose(), ErrorCode::Ok);
}

#[test]
fn test_cancel_while_idle_aborts_next_run() {
    let engine = Arc::new(ScriptedEngine::new().with_clean_abort());
    let recorder = Recorder::new();
    let uploader = started(&engine, &recorder);

    assert_eq!(uploader.cancel(), ErrorCode::Ok);
    assert_eq!(uploader.state(), UploaderState::Initialized);

    // The engine keeps the request, so does the handle
    let task = uploader.runnable().unwrap();
    task.run().unwrap();
    task.run().unwrap();

    assert!(recorder.progress().is_empty());
    assert_eq!(
        recorder.outcomes(),
        vec![
            UploadOutcome::Canceled(ErrorCode::Ok),
            UploadOutcome::Canceled(ErrorCode::Ok),
        ]
    );
    assert_eq!(uploader.dispose(), ErrorCode::Ok);
}

#[test]
fn test_dispose_racing_run_start_never_deletes_a_running_uploader() {
    for _ in 0..50 {
        let engine = Arc::new(ScriptedEngine::new());
        let uploader = started(&engine, &Recorder::new());

        let task = uploader.runnable().unwrap();
        let worker = std::thread::spawn(move || task.run());
        let disposed = uploader.dispose();
        let ran = worker.join().unwrap();

        match (disposed, ran) {
            // Dispose won: the task found nothing to run
            (ErrorCode::Ok, Err(ErrorCode::ManagerNotInitialized)) => {
                assert_eq!(engine.runs.load(std::sync::atomic::Ordering::SeqCst), 0);
            }
            // The run won: dispose backed off and succeeds afterwards
            (ErrorCode::ThreadProcessing, Ok(())) => {
                assert_eq!(uploader.dispose(), ErrorCode::Ok);
            }
            // The run finished before dispose looked
            (ErrorCode::Ok, Ok(())) => {
                assert_eq!(engine.runs.load(std::sync::atomic::Ordering::SeqCst), 1);
            }
            other => panic!("unexpected interleaving: {:?}", other),
        }
        assert_eq!(uploader.state(), UploaderState::Disposed);
    }
}

#[test]
fn test_second_concurrent_run_is_rejected() {
    let engine = Arc::new(ScriptedEngine::slow());
    let recorder = Recorder::new();
    let uploader = started(&engine, &recorder);

    let task = uploader.runnable().unwrap();
    let worker = task.spawn().unwrap();
    assert!(recorder.wait_for_progress(WAIT));

    assert_eq!(task.run(), Err(ErrorCode::ThreadProcessing));
    assert_eq!(engine.runs.load(std::sync::atomic::Ordering::SeqCst), 1);

    uploader.cancel();
    assert_eq!(worker.join().unwrap(), Ok(()));
    assert_eq!(recorder.outcomes().len(), 1);
    assert_eq!(uploader.dispose(), ErrorCode::Ok);
}

#[test]
fn test_dispose_during_run_is_refused_then_succeeds() {
    let engine = Arc::new(ScriptedEngine::slow());
    let recorder = Recorder::new();
    let uploader = started(&engine, &recorder);

    let worker = uploader.runnable().unwrap().spawn().unwrap();
    assert!(recorder.wait_for_progress(WAIT));

    assert_eq!(uploader.dispose(), ErrorCode::ThreadProcessing);
    assert_eq!(uploader.state(), UploaderState::Initialized);

    uploader.cancel();
    worker.join().unwrap().unwrap();
    assert!(!engine.is_running());

    assert_eq!(uploader.dispose(), ErrorCode::Ok);
    assert_eq!(uploader.state(), UploaderState::Disposed);
}

#[tokio::test]
async fn test_run_blocking_with_cancel() {
    let engine = Arc::new(ScriptedEngine::slow());
    let recorder = Recorder::new();
    let uploader = started(&engine, &recorder);

    let run = tokio::spawn(uploader.runnable().unwrap().run_blocking());

    let waiter = recorder.clone();
    let saw_progress = tokio::task::spawn_blocking(move || waiter.wait_for_progress(WAIT))
        .await
        .unwrap();
    assert!(saw_progress);

    assert_eq!(uploader.cancel(), ErrorCode::Ok);
    assert_eq!(run.await.unwrap(), Ok(()));
    assert!(matches!(
        recorder.outcomes().as_slice(),
        [UploadOutcome::Canceled(_)]
    ));
    assert_eq!(uploader.dispose(), ErrorCode::Ok);
}
