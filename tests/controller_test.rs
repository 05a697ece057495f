/// Controller runs against a scripted host: single and multi-page runs,
/// stop, resume after a crash, evaluator gating and the abort paths.
mod common;

use common::*;
use listing_scout::core::config::EvaluatorMode;
use listing_scout::core::error::ScoutError;
use listing_scout::core::status::{Status, StatusLine};
use listing_scout::features::evaluator::{Triage, Verdict};
use listing_scout::features::session_store::SessionStore;
use listing_scout::pipeline::{Controller, RunOutcome, StartRequest};
use listing_scout::types::{ExportFormat, Mode, PageKind};
use listing_scout::FileSink;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn request(pages: u32) -> StartRequest {
    StartRequest {
        pages,
        formats: vec![ExportFormat::Xlsx],
    }
}

fn ids(page: u32, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| item_id(page, i)).collect()
}

#[tokio::test(start_paused = true)]
async fn single_page_run_writes_a_timestamped_workbook() {
    init_logger();
    let mut host = FakeHost::jobs(vec![25]);
    host.failing.insert(item_id(1, 7));
    let host = Arc::new(host);
    let store = SessionStore::in_memory();
    let dir = std::env::temp_dir().join(format!("scout-run-{}", uuid::Uuid::new_v4()));

    let controller = Controller::new(
        host.clone(),
        store.clone(),
        Arc::new(ScriptedEvaluator::default()),
        Arc::new(FileSink::new(dir.clone())),
        test_config(EvaluatorMode::Off),
        StatusLine::default(),
    );
    let outcome = controller.start(request(1)).await.unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(summary.mode, Some(Mode::Jobs));
    assert_eq!(summary.records, 24);
    assert_eq!(summary.files.len(), 1);

    let name = summary.files[0]
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap()
        .to_string();
    let pattern = regex::Regex::new(r"^jobs-\d{4}-\d{2}-\d{2}-\d{2}h\d{2}\.xlsx$").unwrap();
    assert!(pattern.is_match(&name), "unexpected file name {}", name);
    assert!(summary.files[0].exists());

    assert!(!store.is_active());
    assert!(store.results().is_empty());
    assert_eq!(controller.status().current(), Status::Done { records: 24 });
    assert!(host.navigations().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn records_follow_discovery_order() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![12]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    let outcome = rig.controller().start(request(1)).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.records == 12));

    let flush = rig.sink.only();
    assert_eq!(flush.mode, Mode::Jobs);
    assert_eq!(flush.ids(), ids(1, 0..12));
    assert_eq!(rig.host.selects(), ids(1, 0..12));
}

#[tokio::test(start_paused = true)]
async fn rejected_summary_never_opens_the_detail() {
    init_logger();
    let mut evaluator = ScriptedEvaluator::available();
    evaluator.triage.insert(item_id(1, 2), Triage::Reject);
    let rig = Rig::new(
        FakeHost::jobs(vec![5]),
        evaluator,
        test_config(EvaluatorMode::ThreeTier),
    );

    rig.controller().start(request(1)).await.unwrap();

    let flush = rig.sink.only();
    assert_eq!(flush.records.len(), 4);
    assert!(!flush.ids().contains(&item_id(1, 2)));
    assert!(!rig.host.selects().contains(&item_id(1, 2)));
    assert_eq!(rig.evaluator.detail_calls.lock().unwrap().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn deferred_item_gets_exactly_one_detail_evaluation() {
    init_logger();
    let mut evaluator = ScriptedEvaluator::available();
    evaluator.triage.insert(item_id(1, 1), Triage::Defer);
    evaluator.triage.insert(item_id(1, 3), Triage::Defer);
    evaluator.detail.insert(item_id(1, 3), Verdict::Reject);
    let rig = Rig::new(
        FakeHost::jobs(vec![5]),
        evaluator,
        test_config(EvaluatorMode::ThreeTier),
    );

    rig.controller().start(request(1)).await.unwrap();

    let flush = rig.sink.only();
    assert_eq!(
        flush.ids(),
        vec![item_id(1, 0), item_id(1, 1), item_id(1, 2), item_id(1, 4)]
    );
    assert_eq!(rig.evaluator.detail_calls_for(&item_id(1, 1)), 1);
    assert_eq!(rig.evaluator.detail_calls_for(&item_id(1, 3)), 1);
    assert_eq!(rig.evaluator.detail_calls.lock().unwrap().len(), 2);
    // both deferred items had their detail opened before the second look
    assert!(rig.host.selects().contains(&item_id(1, 3)));
}

#[tokio::test(start_paused = true)]
async fn failing_evaluator_keeps_everything() {
    init_logger();
    let mut evaluator = ScriptedEvaluator::available();
    evaluator.failing = true;
    let rig = Rig::new(
        FakeHost::jobs(vec![6]),
        evaluator,
        test_config(EvaluatorMode::Binary),
    );

    let outcome = rig.controller().start(request(1)).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.records == 6));
    assert_eq!(rig.evaluator.triage_calls.lock().unwrap().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn unavailable_evaluator_is_never_called() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![4]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::ThreeTier),
    );

    rig.controller().start(request(1)).await.unwrap();
    assert_eq!(rig.sink.only().records.len(), 4);
    assert!(rig.evaluator.triage_calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_mid_item_flushes_what_was_collected() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![25]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    let controller = rig.controller();
    *rig.host.cancel_on.lock().unwrap() = Some((item_id(1, 12), controller.cancel_token()));

    let outcome = controller.start(request(1)).await.unwrap();

    let RunOutcome::Stopped(summary) = outcome else {
        panic!("expected a stop, got {:?}", outcome);
    };
    assert_eq!(summary.records, 12);
    assert_eq!(rig.sink.only().ids(), ids(1, 0..12));
    assert!(!rig.store.is_active());
    assert_eq!(controller.status().current(), Status::Done { records: 12 });
    // nothing past the stopped item was read
    assert_eq!(rig.host.summaries().last(), Some(&item_id(1, 12)));
}

#[tokio::test(start_paused = true)]
async fn stop_before_start_flushes_nothing() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![10]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    let controller = rig.controller();
    controller.stop();

    let outcome = controller.start(request(1)).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Stopped(ref s) if s.records == 0));
    assert!(rig.sink.flushes().is_empty());
    assert!(!rig.store.is_active());
}

#[tokio::test(start_paused = true)]
async fn walks_pages_until_the_target() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![25, 25, 25]),
        ScriptedEvaluator::available(),
        test_config(EvaluatorMode::ThreeTier),
    );

    let outcome = rig.controller().start(request(2)).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.records == 50));

    let navigations = rig.host.navigations();
    assert_eq!(navigations.len(), 1);
    assert!(navigations[0].contains("start=25"), "{}", navigations[0]);
    assert!(navigations[0].contains("keywords=rust"));
    assert_eq!(rig.evaluator.resets(), 2);

    let mut expected = ids(1, 0..25);
    expected.extend(ids(2, 0..25));
    assert_eq!(rig.sink.only().ids(), expected);
}

#[tokio::test(start_paused = true)]
async fn stops_at_the_last_page() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![25, 3]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );

    let outcome = rig.controller().start(request(5)).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.records == 28));
    assert_eq!(rig.host.navigations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_after_crash_matches_an_uninterrupted_run() {
    init_logger();

    let reference = Rig::new(
        FakeHost::jobs(vec![25, 10]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    reference.controller().start(request(2)).await.unwrap();
    let expected = reference.sink.only().ids();
    assert_eq!(expected.len(), 35);

    let rig = Rig::new(
        FakeHost::jobs(vec![25, 10]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    *rig.host.hang_on.lock().unwrap() = Some(item_id(2, 3));
    let hung = rig.host.hung.clone();

    {
        let first = rig.controller();
        tokio::select! {
            outcome = first.start(request(2)) => panic!("run should have hung, got {:?}", outcome),
            _ = hung.notified() => {}
        }
    }

    // the process is gone; only the store survives
    let cursor = rig.store.load_cursor().expect("session persisted");
    assert_eq!(cursor.current_page, 2);
    assert_eq!(cursor.item_index, 3);
    assert_eq!(rig.store.results_len(), 28);
    assert!(rig.sink.flushes().is_empty());

    let outcome = rig.controller().resume().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.records == 35));
    assert_eq!(rig.sink.only().ids(), expected);
    // page 2 was not rediscovered, so nothing was navigated to twice
    assert_eq!(rig.host.navigations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_without_session() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![5]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    assert_eq!(rig.controller().resume().await.unwrap(), RunOutcome::NoSession);
    assert!(rig.host.summaries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn navigation_to_the_wrong_page_aborts_and_flushes() {
    init_logger();
    let mut host = FakeHost::jobs(vec![4, 4]);
    host.navigate_override = Some(FEED_URL.to_string());
    let rig = Rig::new(host, ScriptedEvaluator::default(), test_config(EvaluatorMode::Off));
    let controller = rig.controller();

    let outcome = controller.start(request(2)).await.unwrap();

    let RunOutcome::Aborted { summary, .. } = outcome else {
        panic!("expected an abort, got {:?}", outcome);
    };
    assert_eq!(summary.records, 4);
    assert_eq!(rig.sink.only().records.len(), 4);
    assert!(!rig.store.is_active());
    assert_eq!(
        controller.status().current(),
        Status::WrongPage {
            expected: Some(Mode::Jobs)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn start_on_an_unsupported_page() {
    init_logger();
    let rig = Rig::new(
        FakeHost::new(FEED_URL, vec![5]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    let controller = rig.controller();

    let outcome = controller.start(request(1)).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::WrongPage {
            found: PageKind::Other
        }
    );
    assert!(!rig.store.is_active());
    assert_eq!(controller.status().current(), Status::WrongPage { expected: None });
}

#[tokio::test(start_paused = true)]
async fn start_refuses_a_second_session() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![3]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    *rig.host.hang_on.lock().unwrap() = Some(item_id(1, 1));
    let hung = rig.host.hung.clone();
    {
        let first = rig.controller();
        tokio::select! {
            _ = first.start(request(1)) => panic!("run should have hung"),
            _ = hung.notified() => {}
        }
    }

    let err = rig.controller().start(request(1)).await.unwrap_err();
    assert!(matches!(err, ScoutError::SessionActive { mode: Mode::Jobs, page: 1 }));
    assert!(rig.store.is_active());
}

#[tokio::test(start_paused = true)]
async fn empty_listing_completes_with_nothing() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![0]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    let controller = rig.controller();

    let outcome = controller.start(request(3)).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.records == 0 && s.files.is_empty()));
    assert!(rig.sink.flushes().is_empty());
    assert_eq!(controller.status().current(), Status::NoItems { page: 1 });
    assert!(!rig.store.is_active());
}

#[tokio::test(start_paused = true)]
async fn people_listing_has_no_detail_step() {
    init_logger();
    let rig = Rig::new(
        FakeHost::new(PEOPLE_URL, vec![10, 10]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );

    let outcome = rig
        .controller()
        .start(StartRequest {
            pages: 2,
            formats: vec![ExportFormat::Csv, ExportFormat::Markdown],
        })
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(ref s) if s.records == 20));
    assert!(rig.host.selects().is_empty());

    let flush = rig.sink.only();
    assert_eq!(flush.mode, Mode::People);
    assert_eq!(flush.formats, vec![ExportFormat::Csv, ExportFormat::Markdown]);
    assert!(rig.host.navigations()[0].contains("page=2"));
}

#[tokio::test(start_paused = true)]
async fn csv_is_dropped_for_jobs() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![2]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );

    rig.controller()
        .start(StartRequest {
            pages: 1,
            formats: vec![ExportFormat::Csv],
        })
        .await
        .unwrap();
    assert_eq!(rig.sink.only().formats, vec![ExportFormat::Xlsx]);
}

#[tokio::test(start_paused = true)]
async fn seen_items_are_skipped() {
    init_logger();
    let mut host = FakeHost::jobs(vec![6]);
    host.seen.insert(item_id(1, 0));
    host.seen.insert(item_id(1, 4));
    let rig = Rig::new(host, ScriptedEvaluator::default(), test_config(EvaluatorMode::Off));

    rig.controller().start(request(1)).await.unwrap();
    assert_eq!(
        rig.sink.only().ids(),
        vec![item_id(1, 1), item_id(1, 2), item_id(1, 3), item_id(1, 5)]
    );
}

#[tokio::test(start_paused = true)]
async fn detail_that_never_loads_skips_only_that_item() {
    init_logger();
    let mut host = FakeHost::jobs(vec![4]);
    host.stale_detail.insert(item_id(1, 2));
    let rig = Rig::new(host, ScriptedEvaluator::default(), test_config(EvaluatorMode::Off));

    rig.controller().start(request(1)).await.unwrap();
    assert_eq!(
        rig.sink.only().ids(),
        vec![item_id(1, 0), item_id(1, 1), item_id(1, 3)]
    );
}

#[tokio::test(start_paused = true)]
async fn abandon_flushes_a_session_nothing_drives() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![6]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    *rig.host.hang_on.lock().unwrap() = Some(item_id(1, 4));
    let hung = rig.host.hung.clone();
    {
        let first = rig.controller();
        tokio::select! {
            _ = first.start(request(1)) => panic!("run should have hung"),
            _ = hung.notified() => {}
        }
    }

    let offline = Controller::new(
        Arc::new(listing_scout::scraping::DetachedHost),
        rig.store.clone(),
        rig.evaluator.clone(),
        rig.sink.clone(),
        test_config(EvaluatorMode::Off),
        StatusLine::default(),
    );
    let outcome = offline.abandon().await;
    assert!(matches!(outcome, RunOutcome::Stopped(ref s) if s.records == 4));
    assert_eq!(rig.sink.only().ids(), ids(1, 0..4));
    assert!(!rig.store.is_active());

    assert_eq!(offline.abandon().await, RunOutcome::NoSession);
}

#[tokio::test(start_paused = true)]
async fn result_buffer_only_grows() {
    init_logger();
    let backend = Arc::new(RecordingStore::default());
    let rig = Rig::with_store(
        FakeHost::jobs(vec![8, 8]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
        SessionStore::new(backend.clone()),
    );

    rig.controller().start(request(2)).await.unwrap();

    let lengths = backend.result_lengths.lock().unwrap().clone();
    assert_eq!(lengths.first(), Some(&0));
    assert_eq!(lengths.last(), Some(&16));
    assert!(lengths.windows(2).all(|w| w[0] <= w[1]), "{:?}", lengths);
    assert_eq!(backend.clears.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_export_keeps_the_session_for_a_retry() {
    init_logger();
    let rig = Rig::new(
        FakeHost::jobs(vec![5]),
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
    );
    rig.sink.failing.store(true, Ordering::SeqCst);
    let controller = rig.controller();

    let outcome = controller.start(request(1)).await.unwrap();
    let RunOutcome::Aborted { reason, summary } = outcome else {
        panic!("expected an abort, got {:?}", outcome);
    };
    assert!(reason.contains("read-only"), "{}", reason);
    assert_eq!(summary.records, 5);
    assert!(summary.files.is_empty());
    assert!(matches!(controller.status().current(), Status::Error(_)));

    assert!(rig.store.is_active());
    assert_eq!(rig.store.results().len(), 5);
    assert!(rig.sink.flushes().is_empty());

    rig.sink.failing.store(false, Ordering::SeqCst);
    let retry = rig.controller().abandon().await;
    assert!(matches!(retry, RunOutcome::Stopped(ref s) if s.records == 5));
    assert_eq!(rig.sink.only().ids(), ids(1, 0..5));
    assert!(!rig.store.is_active());
}

#[tokio::test(start_paused = true)]
async fn lagging_detail_pane_never_leaks_into_records() {
    init_logger();
    let host = FakeHost::jobs(vec![4]);
    host.pane_lag.lock().unwrap().insert(item_id(1, 1), 2);
    host.pane_lag.lock().unwrap().insert(item_id(1, 2), usize::MAX);
    let rig = Rig::new(host, ScriptedEvaluator::default(), test_config(EvaluatorMode::Off));

    rig.controller().start(request(1)).await.unwrap();

    let flush = rig.sink.only();
    assert_eq!(flush.ids(), vec![item_id(1, 0), item_id(1, 1), item_id(1, 3)]);
    assert!(flush.ids().iter().all(|id| id != STALE_JOB));
}

#[tokio::test(start_paused = true)]
async fn each_record_advances_the_cursor_in_the_same_write() {
    init_logger();
    let backend = Arc::new(RecordingStore::default());
    let mut host = FakeHost::jobs(vec![5]);
    host.failing.insert(item_id(1, 2));
    let rig = Rig::with_store(
        host,
        ScriptedEvaluator::default(),
        test_config(EvaluatorMode::Off),
        SessionStore::new(backend.clone()),
    );

    rig.controller().start(request(1)).await.unwrap();

    let batches = backend.batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 4, "{:?}", batches);
    assert!(batches
        .iter()
        .all(|keys| keys.contains(&"results".to_string()) && keys.contains(&"item_index".to_string())));
    // Outside a batch the buffer is only written by begin.
    let singles = backend.single_writes.lock().unwrap().clone();
    assert_eq!(singles.iter().filter(|k| *k == "results").count(), 1, "{:?}", singles);
}
