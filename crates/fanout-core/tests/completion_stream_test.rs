//! Behavioural tests for the completion stream
//!
//! All timing tests run on a paused tokio clock, so completion times are exact
//! and the yield order is deterministic.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use common::{items_with_delays, Event, ProbeExecutor};
use fanout_core::prelude::*;

fn ids<P>(outcomes: &[Outcome<P>]) -> Vec<&str> {
    outcomes.iter().map(Outcome::id).collect()
}

// ============================================
// Ordering
// ============================================

#[tokio::test(start_paused = true)]
async fn test_yields_in_completion_order() {
    let probe = ProbeExecutor::new();
    let config = RunConfig::new([
        WorkItem::new("A").with_delay(Duration::from_millis(300)),
        WorkItem::new("B").with_delay(Duration::from_millis(100)),
        WorkItem::new("C").with_delay(Duration::from_millis(200)),
    ]);

    let outcomes = collect_outcomes(config, probe).await.unwrap();

    assert_eq!(ids(&outcomes), vec!["B", "C", "A"]);
    let positions: Vec<_> = outcomes.iter().map(Outcome::position).collect();
    assert_eq!(positions, vec![1, 2, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_decreasing_delays_are_reversed() {
    let delays: Vec<u64> = (0..10).map(|i| (10 - i) * 25).collect();
    let probe = ProbeExecutor::new();

    let outcomes = collect_outcomes(RunConfig::new(items_with_delays(&delays)), probe)
        .await
        .unwrap();

    let positions: Vec<_> = outcomes.iter().map(Outcome::position).collect();
    assert_eq!(positions, (0..10).rev().collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_sequential_mode_preserves_submission_order() {
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&[300, 100, 200]))
        .with_concurrency(Concurrency::sequential());

    let outcomes = collect_outcomes(config, probe.clone()).await.unwrap();

    assert_eq!(ids(&outcomes), vec!["item-0", "item-1", "item-2"]);
    assert_eq!(probe.peak(), 1);
}

// ============================================
// Exactly once
// ============================================

#[tokio::test(start_paused = true)]
async fn test_every_item_yielded_exactly_once() {
    for limit in [1, 3, 7, 50] {
        let delays: Vec<u64> = (0..50).map(|i| (i * 37 % 11) + 1).collect();
        let probe = ProbeExecutor::new();
        let config = RunConfig::new(items_with_delays(&delays)).with_limit(limit);

        let outcomes = collect_outcomes(config, probe.clone()).await.unwrap();

        assert_eq!(outcomes.len(), 50, "limit {limit}");
        let unique: HashSet<_> = outcomes.iter().map(Outcome::id).collect();
        assert_eq!(unique.len(), 50, "limit {limit}");
        assert_eq!(probe.calls(), 50);
        assert_eq!(probe.active(), 0);
    }
}

#[tokio::test]
async fn test_empty_input_yields_nothing() {
    let probe = ProbeExecutor::new();
    let mut s = stream(RunConfig::new(Vec::new()).with_limit(4), probe.clone()).unwrap();

    assert!(s.next().await.is_none());
    assert_eq!(probe.calls(), 0);
    assert_eq!(s.stats().launched, 0);
    assert_eq!(s.stats().peak_in_flight, 0);
}

// ============================================
// Concurrency bounds
// ============================================

#[tokio::test(start_paused = true)]
async fn test_sliding_window_respects_limit() {
    let delays: Vec<u64> = (0..20).map(|i| (i * 13 % 7 + 1) * 10).collect();
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&delays)).with_limit(4);

    let mut s = stream(config, probe.clone()).unwrap();
    let mut count = 0;
    while s.next().await.is_some() {
        count += 1;
    }

    assert_eq!(count, 20);
    assert_eq!(probe.peak(), 4);
    assert_eq!(s.stats().peak_in_flight, 4);
}

#[tokio::test(start_paused = true)]
async fn test_sliding_window_refills_on_each_completion() {
    // One slow item must not hold the window hostage.
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&[1_000, 10, 10, 10, 10])).with_limit(2);

    let outcomes = collect_outcomes(config, probe).await.unwrap();

    assert_eq!(
        ids(&outcomes),
        vec!["item-1", "item-2", "item-3", "item-4", "item-0"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_completion_frees_slot_before_it_is_pulled() {
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&[10; 4])).with_limit(2);

    let mut s = stream(config, probe.clone()).unwrap();
    assert!(s.next().await.is_some());

    // The consumer stalls; settled items must still hand their slots on.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(probe.calls(), 4);
    assert_eq!(probe.active(), 0);
    assert_eq!(probe.peak(), 2);

    let stats = s.stats();
    assert_eq!(stats.launched, 4);
    assert_eq!(stats.completed, 4);
    assert_eq!(stats.yielded, 1);
    assert_eq!(stats.in_flight, 0);

    let rest: Vec<_> = s.collect().await;
    assert_eq!(rest.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_launches_everything() {
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&[50; 12]));

    let outcomes = collect_outcomes(config, probe.clone()).await.unwrap();

    assert_eq!(outcomes.len(), 12);
    assert_eq!(probe.peak(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_batches_drain_before_next_batch_starts() {
    let probe = ProbeExecutor::new();
    let config =
        RunConfig::new(items_with_delays(&[500, 10, 10, 10, 10, 10, 10])).with_batch_size(3);

    let outcomes = collect_outcomes(config, probe.clone()).await.unwrap();
    assert_eq!(outcomes.len(), 7);
    assert_eq!(probe.peak(), 3);

    let events = probe.events();
    let index_of = |event: Event| events.iter().position(|e| *e == event).unwrap();
    let first_batch_done = (0..3).map(|p| index_of(Event::End(p))).max().unwrap();
    let second_batch_start = (3..6).map(|p| index_of(Event::Start(p))).min().unwrap();
    let third_batch_start = index_of(Event::Start(6));
    let second_batch_done = (3..6).map(|p| index_of(Event::End(p))).max().unwrap();

    assert!(first_batch_done < second_batch_start);
    assert!(second_batch_done < third_batch_start);
}

// ============================================
// Failure isolation
// ============================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_failure_does_not_abort_others() {
    let probe = ProbeExecutor::failing(&["item-2"]);
    let config = RunConfig::new(items_with_delays(&[10, 20, 30, 40, 50])).with_limit(2);

    let outcomes = collect_outcomes(config, probe).await.unwrap();

    assert_eq!(outcomes.len(), 5);
    for outcome in &outcomes {
        if outcome.id() == "item-2" {
            assert_eq!(outcome.error(), Some("simulated failure"));
        } else {
            assert!(outcome.is_success(), "{} should succeed", outcome.id());
        }
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_executor_panic_becomes_failure() {
    let probe = ProbeExecutor::panicking(&["item-1"]);
    let config = RunConfig::new(items_with_delays(&[10, 20, 30])).with_limit(1);

    let outcomes = collect_outcomes(config, probe.clone()).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    let failed = outcomes.iter().find(|o| o.id() == "item-1").unwrap();
    assert!(failed.error().unwrap().contains("probe exploded on item-1"));
    assert_eq!(failed.position(), 1);
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
    assert_eq!(probe.active(), 0);
}

// ============================================
// Cancellation
// ============================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_abandoned_stream_stops_all_work() {
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&[10_000; 10])).with_limit(2);

    let mut s = stream(config, probe.clone()).unwrap();
    for _ in 0..3 {
        assert!(s.next().await.is_some());
    }
    // Two in flight plus one refill per completion so far.
    let launched = s.stats().launched;
    assert!(launched <= 6);
    drop(s);

    // Give the runtime a chance to process the aborts.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(probe.active(), 0);
    let calls_after_drop = probe.calls();
    assert!(calls_after_drop <= launched);

    // Nothing new is launched later on.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(probe.calls(), calls_after_drop);
    assert_eq!(probe.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_external_token_cancels_stream() {
    let probe = ProbeExecutor::new();
    let token = CancellationToken::new();
    let config = RunConfig::new(items_with_delays(&[100, 5_000, 5_000, 5_000])).with_limit(2);

    let mut s = stream(config, probe.clone())
        .unwrap()
        .with_cancellation(&token);

    let first = s.next_outcome().await.unwrap().unwrap();
    assert_eq!(first.id(), "item-0");

    token.cancel();
    assert_eq!(
        s.next_outcome().await.unwrap_err(),
        StreamError::Cancelled(CancelReason::Token)
    );
    assert!(s.is_cancelled());
    assert!(s.next().await.is_none());

    let stats = s.stats();
    assert_eq!(stats.yielded, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.revoked, 1);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(probe.active(), 0);
}

#[tokio::test]
async fn test_dropping_stream_leaves_parent_token_live() {
    let token = CancellationToken::new();
    let s = stream(RunConfig::new([WorkItem::new("a")]), ProbeExecutor::new())
        .unwrap()
        .with_cancellation(&token);
    let own = s.cancellation_token();

    drop(s);

    assert!(own.is_cancelled());
    assert!(!token.is_cancelled());
}

#[tokio::test]
async fn test_cancel_before_first_pull_launches_nothing() {
    let probe = ProbeExecutor::new();
    let mut s = stream(RunConfig::new(items_with_delays(&[10, 10])), probe.clone()).unwrap();

    s.cancel();

    assert_eq!(
        s.next_outcome().await.unwrap_err(),
        StreamError::Cancelled(CancelReason::Token)
    );
    assert!(s.next().await.is_none());
    assert_eq!(s.stats().launched, 0);
    assert_eq!(s.stats().revoked, 2);
    assert_eq!(probe.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_stream() {
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&[100, 10_000, 20_000]))
        .with_deadline(Duration::from_secs(1));

    let mut s = stream(config, probe.clone()).unwrap();
    let start = tokio::time::Instant::now();

    let first = s.next_outcome().await.unwrap().unwrap();
    assert_eq!(first.id(), "item-0");

    assert!(s.next_outcome().await.unwrap().is_none());
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(
        s.next_outcome().await.unwrap_err(),
        StreamError::Cancelled(CancelReason::Deadline)
    );

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(probe.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_passed_while_idle_fails_next_pull() {
    let probe = ProbeExecutor::new();
    let config = RunConfig::new(items_with_delays(&[100, 10_000, 10_000]))
        .with_limit(2)
        .with_deadline(Duration::from_secs(1));

    let mut s = stream(config, probe.clone()).unwrap();
    let first = s.next_outcome().await.unwrap().unwrap();
    assert_eq!(first.id(), "item-0");

    tokio::time::sleep(Duration::from_secs(2)).await;
    // Work stopped at the deadline even though nobody was pulling.
    assert_eq!(probe.active(), 0);

    assert_eq!(
        s.next_outcome().await.unwrap_err(),
        StreamError::Cancelled(CancelReason::Deadline)
    );
    assert_eq!(s.stats().revoked, 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_not_hit_when_work_finishes_first() {
    let config =
        RunConfig::new(items_with_delays(&[10, 20, 30])).with_deadline(Duration::from_secs(5));

    let mut s = stream(config, ProbeExecutor::new()).unwrap();
    let mut count = 0;
    while let Some(_outcome) = s.next_outcome().await.unwrap() {
        count += 1;
    }

    assert_eq!(count, 3);
    assert!(!s.is_cancelled());
}

// ============================================
// Configuration errors
// ============================================

#[test]
fn test_zero_limit_fails_fast() {
    let probe = ProbeExecutor::new();
    let result = stream(RunConfig::new(items_with_delays(&[1])).with_limit(0), probe.clone());

    assert_eq!(result.unwrap_err(), ConfigError::ZeroConcurrency);
    assert_eq!(probe.calls(), 0);
}

#[test]
fn test_zero_batch_fails_fast() {
    let result = stream(
        RunConfig::new(items_with_delays(&[1])).with_batch_size(0),
        ProbeExecutor::new(),
    );
    assert_eq!(result.unwrap_err(), ConfigError::ZeroBatchSize);
}

// ============================================
// Closure executors
// ============================================

#[tokio::test(start_paused = true)]
async fn test_fn_executor_in_stream() {
    let executor = Arc::new(from_fn(|item: WorkItem| async move {
        if item.id().starts_with("bad") {
            Err(format!("refused {}", item.id()))
        } else {
            Ok(item.id().len())
        }
    }));
    let config = RunConfig::new([
        WorkItem::new("good-one").with_delay(Duration::from_millis(20)),
        WorkItem::new("bad-one").with_delay(Duration::from_millis(10)),
    ]);

    let outcomes = collect_outcomes(config, executor).await.unwrap();

    assert_eq!(outcomes[0].error(), Some("refused bad-one"));
    assert_eq!(outcomes[1].payload(), Some(&8));
    tokio_test::assert_ok!(outcomes[1].clone().into_result());
}
