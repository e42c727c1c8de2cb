//! End-to-end pipeline tests with a scripted fetcher and in-memory stores.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{Duration, Instant};

use taxaharvest::config::{DelayRange, HarvestConfig, SoftBlockPolicy};
use taxaharvest::fetch::Fetcher;
use taxaharvest::harvest::{
    shutdown, BatchScheduler, HarvestError, HarvestParts, Harvester, RecoverOptions,
};
use taxaharvest::identity::{Identity, IdentityRotator};
use taxaharvest::merge::MergeStore;
use taxaharvest::models::{CrawlState, Outcome, PassKind, Record};
use taxaharvest::repository::{InMemoryRecordStore, RecordStore};
use taxaharvest::state::MemoryStateStore;

#[derive(Default)]
struct Log {
    calls: Vec<(String, String)>,
    batches: usize,
    shutdowns: usize,
}

/// Fetcher that replays scripted outcomes per target. A target with no
/// script left gets its fallback, or a complete record.
struct ScriptedFetcher {
    scripts: HashMap<String, VecDeque<Outcome>>,
    fallback: HashMap<String, Outcome>,
    trigger_after: Option<(String, shutdown::ShutdownTrigger)>,
    log: Arc<Mutex<Log>>,
}

impl ScriptedFetcher {
    fn new() -> (Self, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            Self {
                scripts: HashMap::new(),
                fallback: HashMap::new(),
                trigger_after: None,
                log: log.clone(),
            },
            log,
        )
    }

    fn script(mut self, target: &str, outcomes: Vec<Outcome>) -> Self {
        self.scripts.insert(target.to_string(), outcomes.into());
        self
    }

    fn always(mut self, target: &str, outcome: Outcome) -> Self {
        self.fallback.insert(target.to_string(), outcome);
        self
    }

    fn interrupt_after(mut self, target: &str, trigger: shutdown::ShutdownTrigger) -> Self {
        self.trigger_after = Some((target.to_string(), trigger));
        self
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&mut self, target: &str, identity: &Identity) -> Outcome {
        self.log
            .lock()
            .unwrap()
            .calls
            .push((target.to_string(), identity.user_agent.clone()));

        if let Some((ref name, ref trigger)) = self.trigger_after {
            if name == target {
                trigger.trigger();
            }
        }

        if let Some(outcome) = self.scripts.get_mut(target).and_then(|q| q.pop_front()) {
            return outcome;
        }
        self.fallback
            .get(target)
            .cloned()
            .unwrap_or_else(|| Outcome::Success(complete_record(target)))
    }

    async fn begin_batch(&mut self, _identity: &Identity) {
        self.log.lock().unwrap().batches += 1;
    }

    async fn shutdown(&mut self) {
        self.log.lock().unwrap().shutdowns += 1;
    }
}

fn required() -> Vec<String> {
    vec!["family".to_string(), "genus".to_string()]
}

fn complete_record(target: &str) -> Record {
    let genus = target.split_whitespace().next().unwrap_or(target);
    Record::new(target)
        .with_field("family", "Rosaceae")
        .with_field("genus", genus)
        .with_field("description", format!("{} description", target))
}

fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn scheduler(batch_size: usize) -> BatchScheduler {
    scheduler_with(
        HarvestConfig {
            batch_size,
            ..HarvestConfig::default()
        }
        .unpaced(),
    )
}

fn scheduler_with(config: HarvestConfig) -> BatchScheduler {
    BatchScheduler::new(
        config,
        IdentityRotator::new(vec!["agent-a".to_string(), "agent-b".to_string()]).unwrap(),
    )
}

struct Fixture {
    harvester: Harvester,
    store: InMemoryRecordStore,
    primary: MemoryStateStore,
    recovery: MemoryStateStore,
}

fn fixture(
    names: &[&str],
    fetcher: ScriptedFetcher,
    primary: MemoryStateStore,
    scheduler: BatchScheduler,
) -> Fixture {
    let store = InMemoryRecordStore::new();
    let recovery = MemoryStateStore::new();
    let harvester = Harvester::new(HarvestParts {
        targets: targets(names),
        fetcher: Box::new(fetcher),
        store: Arc::new(store.clone()),
        required_fields: required(),
        incomplete_log: None,
        primary_state: Box::new(primary.clone()),
        recovery_state: Box::new(recovery.clone()),
        scheduler,
    });
    Fixture {
        harvester,
        store,
        primary,
        recovery,
    }
}

fn called(log: &Arc<Mutex<Log>>) -> Vec<String> {
    log.lock().unwrap().calls.iter().map(|(t, _)| t.clone()).collect()
}

#[tokio::test]
async fn test_merging_same_record_twice_is_single_write() {
    let store = InMemoryRecordStore::new();
    let merge = MergeStore::new(Arc::new(store.clone()), required(), None);
    let record = complete_record("Rosa chinensis");

    merge.merge(&record).await.unwrap();
    merge.merge(&record).await.unwrap();

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot["Rosa chinensis"].fields, record.fields);
    assert_eq!(store.write_count().await, 1);
}

#[tokio::test]
async fn test_incomplete_record_never_replaces_complete_one() {
    let store = InMemoryRecordStore::new();
    let merge = MergeStore::new(Arc::new(store.clone()), required(), None);

    let full = Record::new("Rosa chinensis")
        .with_field("family", "Rosaceae")
        .with_field("genus", "Rosa");
    let degraded = Record::new("Rosa chinensis").with_field("family", "");

    assert!(merge.merge(&full).await.unwrap().complete);
    assert!(!merge.merge(&degraded).await.unwrap().complete);

    let stored = store.get("Rosa chinensis").await.unwrap().unwrap();
    assert!(stored.complete);
    assert_eq!(stored.fields.get("family").map(String::as_str), Some("Rosaceae"));
    assert_eq!(stored.fields.get("genus").map(String::as_str), Some("Rosa"));
}

#[tokio::test]
async fn test_resume_attempts_only_pending_targets() {
    let mut state = CrawlState::new();
    state.mark_completed("A");
    state.mark_failed("B");

    let (fetcher, log) = ScriptedFetcher::new();
    let mut fx = fixture(
        &["A", "B", "C"],
        fetcher,
        MemoryStateStore::with_state(state),
        scheduler(100),
    );

    let summary = fx.harvester.run().await.unwrap();
    assert_eq!(called(&log), vec!["C"]);
    assert_eq!(summary.input, 1);
    assert_eq!(summary.complete, 1);

    let state = fx.primary.current().await;
    assert!(state.completed().contains("C"));
    assert!(state.failed().contains("B"));
}

#[tokio::test]
async fn test_soft_block_aborts_rest_of_batch() {
    let names = ["T1", "T2", "T3", "T4", "T5"];
    let (fetcher, log) = ScriptedFetcher::new();
    let fetcher = fetcher.script("T3", vec![Outcome::SoftBlocked("quota exceeded".into())]);
    let mut fx = fixture(&names, fetcher, MemoryStateStore::new(), scheduler(5));

    let summary = fx.harvester.run().await.unwrap();
    assert_eq!(summary.soft_blocks, 1);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.failed, 0);

    // The save right after the blocked attempt left T3, T4 and T5 pending
    let history = fx.primary.history().await;
    let after_block = &history[2];
    assert!(after_block.is_pending("T3"));
    assert!(after_block.is_pending("T4"));
    assert!(after_block.is_pending("T5"));
    assert!(after_block.failed().is_empty());
    assert_eq!(after_block.soft_block_aborts, 1);

    // The next batch retried T3 first under a new identity
    let log = log.lock().unwrap();
    let calls: Vec<&str> = log.calls.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(calls, vec!["T1", "T2", "T3", "T3", "T4", "T5"]);
    assert_eq!(log.calls[0].1, log.calls[2].1);
    assert_ne!(log.calls[2].1, log.calls[3].1);
    assert_eq!(log.calls[3].1, log.calls[5].1);
    assert_eq!(log.batches, 2);

    let state = fx.primary.current().await;
    assert_eq!(state.completed().len(), 5);
    assert!(state.failed().is_empty());
}

#[tokio::test]
async fn test_soft_block_mark_failed_leaves_target_to_recovery() {
    let names = ["T1", "T2", "T3", "T4", "T5"];
    let (fetcher, log) = ScriptedFetcher::new();
    let fetcher = fetcher.script("T3", vec![Outcome::SoftBlocked("quota exceeded".into())]);
    let config = HarvestConfig {
        batch_size: 5,
        soft_blocked_target: SoftBlockPolicy::MarkFailed,
        ..HarvestConfig::default()
    }
    .unpaced();
    let mut fx = fixture(&names, fetcher, MemoryStateStore::new(), scheduler_with(config));

    let summary = fx.harvester.run().await.unwrap();
    assert_eq!(summary.residual_failed, 1);
    assert_eq!(called(&log), vec!["T1", "T2", "T3", "T4", "T5"]);

    let history = fx.primary.history().await;
    assert!(history[2].failed().contains("T3"));
    assert!(history[2].is_pending("T4"));

    let report = fx.harvester.recover(RecoverOptions::default()).await.unwrap();
    assert_eq!(report.plan.targets, vec!["T3"]);
    assert_eq!(report.summary.residual_failed, 0);
}

#[tokio::test]
async fn test_every_persisted_state_keeps_sets_disjoint() {
    let names = ["A", "B", "C", "D", "E", "F"];
    let (fetcher, _log) = ScriptedFetcher::new();
    let fetcher = fetcher
        .script("B", vec![Outcome::TransientError("timeout".into())])
        .script("D", vec![Outcome::SoftBlocked("alert: 访问受限".into())])
        .always("E", Outcome::FatalError("parse failure".into()))
        .always("F", Outcome::NotFound);
    let mut fx = fixture(&names, fetcher, MemoryStateStore::new(), scheduler(2));

    fx.harvester.run().await.unwrap();
    fx.harvester
        .recover(RecoverOptions { retry_failed: true })
        .await
        .unwrap();

    let snapshots = fx
        .primary
        .history()
        .await
        .into_iter()
        .chain(fx.recovery.history().await);
    for snapshot in snapshots {
        assert!(snapshot.is_consistent());
    }
}

#[tokio::test]
async fn test_repeated_recovery_never_grows_failed_set() {
    let names = ["A", "B", "C"];
    let (fetcher, _log) = ScriptedFetcher::new();
    let fetcher = fetcher
        .always("A", Outcome::TransientError("connection reset".into()))
        .always("C", Outcome::TransientError("timeout".into()));
    let mut fx = fixture(&names, fetcher, MemoryStateStore::new(), scheduler(100));

    let forward = fx.harvester.run().await.unwrap();
    assert_eq!(forward.residual_failed, 2);

    let first = fx.harvester.recover(RecoverOptions::default()).await.unwrap();
    assert_eq!(first.plan.targets, vec!["A", "C"]);
    let second = fx.harvester.recover(RecoverOptions::default()).await.unwrap();
    assert!(second.summary.residual_failed <= first.summary.residual_failed);
    assert_eq!(second.summary.attempted, 0);

    let retried = fx
        .harvester
        .recover(RecoverOptions { retry_failed: true })
        .await
        .unwrap();
    assert_eq!(retried.cleared, 2);
    assert!(retried.summary.residual_failed <= second.summary.residual_failed);

    // Recovery bookkeeping stays out of the forward partition
    assert_eq!(fx.primary.current().await.failed().len(), 2);
}

#[tokio::test]
async fn test_end_to_end_with_not_found_target() {
    let names = ["Abies alba", "Rosa chinensis", "Bogus taxon"];
    let (fetcher, log) = ScriptedFetcher::new();
    let fetcher = fetcher.always("Bogus taxon", Outcome::NotFound);
    let mut fx = fixture(&names, fetcher, MemoryStateStore::new(), scheduler(100));

    let summary = fx.harvester.run().await.unwrap();
    assert_eq!(summary.complete, 2);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.residual_failed, 0);

    let stored = fx.store.snapshot().await;
    assert_eq!(stored.len(), 2);
    assert!(stored.values().all(|r| r.complete));

    let state = fx.primary.current().await;
    assert_eq!(state.completed().len(), 3);
    assert!(state.failed().is_empty());

    // The session is released when the pass returns
    assert_eq!(log.lock().unwrap().shutdowns, 1);
}

#[tokio::test]
async fn test_state_write_failure_ends_run() {
    let primary = MemoryStateStore::new();
    primary.fail_after(1).await;

    let (fetcher, log) = ScriptedFetcher::new();
    let mut fx = fixture(&["A", "B", "C"], fetcher, primary, scheduler(100));

    let err = fx.harvester.run().await.unwrap_err();
    assert!(matches!(err, HarvestError::State(_)));
    // A persisted; B fetched and merged but its save failed; C untouched
    assert_eq!(called(&log), vec!["A", "B"]);
    assert_eq!(fx.primary.current().await.completed().len(), 1);
    assert_eq!(log.lock().unwrap().shutdowns, 1);
}

#[tokio::test]
async fn test_immediate_retry_resolves_transient_error() {
    let config = HarvestConfig {
        immediate_retries: 1,
        ..HarvestConfig::default()
    }
    .unpaced();
    let scheduler = BatchScheduler::new(config, IdentityRotator::with_default_pool());

    let (fetcher, log) = ScriptedFetcher::new();
    let fetcher = fetcher.script("A", vec![Outcome::TransientError("timeout".into())]);
    let mut fx = fixture(&["A"], fetcher, MemoryStateStore::new(), scheduler);

    let summary = fx.harvester.run().await.unwrap();
    assert_eq!(called(&log), vec!["A", "A"]);
    assert_eq!(summary.complete, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_interrupt_stops_between_targets() {
    let (trigger, signal) = shutdown::channel();
    let (fetcher, log) = ScriptedFetcher::new();
    let fetcher = fetcher.interrupt_after("B", trigger);
    let mut fx = fixture(
        &["A", "B", "C", "D"],
        fetcher,
        MemoryStateStore::new(),
        scheduler(100).with_shutdown(signal),
    );

    let summary = fx.harvester.run().await.unwrap();
    assert!(summary.interrupted);
    assert_eq!(called(&log), vec!["A", "B"]);

    // B finished its write before the interrupt was honoured
    let state = fx.primary.current().await;
    assert!(state.completed().contains("B"));
    assert!(state.is_pending("C"));
    assert_eq!(log.lock().unwrap().shutdowns, 1);
}

#[tokio::test]
async fn test_converge_recovers_transient_failures() {
    let (fetcher, _log) = ScriptedFetcher::new();
    let fetcher = fetcher.script("B", vec![Outcome::TransientError("reset".into())]);
    let mut fx = fixture(&["A", "B", "C"], fetcher, MemoryStateStore::new(), scheduler(100));

    let summaries = fx.harvester.converge(3).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].pass, PassKind::Forward);
    assert_eq!(summaries[0].residual_failed, 1);
    assert_eq!(summaries[1].pass, PassKind::Recovery);
    assert_eq!(summaries[1].residual_failed, 0);
    assert!(fx.store.get("B").await.unwrap().is_some());
}

#[tokio::test]
async fn test_status_reports_both_partitions() {
    let (fetcher, _log) = ScriptedFetcher::new();
    let fetcher = fetcher
        .always("B", Outcome::TransientError("timeout".into()))
        .always("C", Outcome::NotFound);
    let mut fx = fixture(&["A", "B", "C"], fetcher, MemoryStateStore::new(), scheduler(100));

    fx.harvester.run().await.unwrap();
    let report = fx.harvester.status().await.unwrap();
    assert_eq!(report.targets, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.pending, 0);
    assert_eq!(report.stored, 1);
    // B failed, C has no record
    assert_eq!(report.recovery_candidates, 2);
    assert_eq!(report.recovery_failed, 0);
}

fn cooldown_only(batch_size: usize, cooldown: DelayRange) -> HarvestConfig {
    HarvestConfig {
        batch_size,
        batch_cooldown_ms: cooldown,
        ..HarvestConfig::default().unpaced()
    }
}

#[tokio::test(start_paused = true)]
async fn test_normal_batch_uses_regular_cooldown() {
    let (fetcher, _log) = ScriptedFetcher::new();
    let config = cooldown_only(2, DelayRange::new(800, 1_000));
    let mut fx = fixture(&["A", "B", "C"], fetcher, MemoryStateStore::new(), scheduler_with(config));

    let start = Instant::now();
    let summary = fx.harvester.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.batches, 2);
    assert!(elapsed >= Duration::from_millis(800), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(1_000), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_soft_block_escalates_cooldown() {
    let (fetcher, _log) = ScriptedFetcher::new();
    let fetcher = fetcher.script("B", vec![Outcome::SoftBlocked("访问受限".into())]);
    let config = cooldown_only(2, DelayRange::new(800, 1_000));
    let mut fx = fixture(&["A", "B", "C"], fetcher, MemoryStateStore::new(), scheduler_with(config));

    let start = Instant::now();
    let summary = fx.harvester.run().await.unwrap();
    let elapsed = start.elapsed();

    // A, B blocked, then B and C after [1.5 x 1000, 2 x 1000] ms
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.soft_blocks, 1);
    assert!(elapsed >= Duration::from_millis(1_500), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2_000), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_every_fetch_is_preceded_by_request_delay() {
    let (fetcher, log) = ScriptedFetcher::new();
    let config = HarvestConfig {
        request_delay_ms: DelayRange::new(100, 150),
        ..HarvestConfig::default().unpaced()
    };
    let names = ["A", "B", "C", "D"];
    let mut fx = fixture(&names, fetcher, MemoryStateStore::new(), scheduler_with(config));

    let start = Instant::now();
    fx.harvester.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(called(&log).len(), 4);
    assert!(elapsed >= Duration::from_millis(400), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(600), "{:?}", elapsed);
}
