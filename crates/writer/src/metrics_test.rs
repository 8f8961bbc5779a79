//! Tests for writer metrics

use super::{MetricsSnapshot, WriterMetrics};
use std::sync::Arc;
use std::thread;

#[test]
fn test_metrics_new() {
    let metrics = WriterMetrics::new();
    assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
}

#[test]
fn test_submit_then_flush() {
    let metrics = WriterMetrics::new();

    for _ in 0..3 {
        metrics.record_submitted();
    }
    assert_eq!(metrics.submitted(), 3);
    assert_eq!(metrics.pending(), 3);

    metrics.record_flush(3, 30);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.submitted, 3);
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.bytes_written, 30);
    assert_eq!(snapshot.flushes, 1);
}

#[test]
fn test_discarded_clears_pending() {
    let metrics = WriterMetrics::new();
    metrics.record_submitted();
    metrics.record_submitted();

    metrics.record_partial(4);
    metrics.record_discarded(2);

    assert_eq!(metrics.pending(), 0);
    assert_eq!(metrics.bytes_written(), 4);
    assert_eq!(metrics.flushes(), 0);
}

#[test]
fn test_pending_read_clamps_at_zero() {
    let metrics = WriterMetrics::new();
    metrics.record_discarded(5);
    assert_eq!(metrics.pending(), 0);

    // The internal count still balances once the increments arrive
    for _ in 0..5 {
        metrics.record_submitted();
    }
    assert_eq!(metrics.pending(), 0);
    metrics.record_submitted();
    assert_eq!(metrics.pending(), 1);
}

#[test]
fn test_rejected_does_not_touch_pending() {
    let metrics = WriterMetrics::new();
    metrics.record_rejected();
    metrics.record_rejected();

    assert_eq!(metrics.rejected(), 2);
    assert_eq!(metrics.pending(), 0);
    assert_eq!(metrics.submitted(), 0);
}

#[test]
fn test_shared_across_threads() {
    let metrics = Arc::new(WriterMetrics::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let metrics = Arc::clone(&metrics);
            thread::spawn(move || {
                for _ in 0..1000 {
                    metrics.record_submitted();
                    metrics.record_flush(1, 10);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.submitted, 8000);
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.bytes_written, 80_000);
    assert_eq!(snapshot.flushes, 8000);
}
