//! Operation context pool conformance tests.
//!
//! The pool's contract, exercised both directly against [`OpPool`] and end
//! to end through a lab runtime:
//!
//! - every context is in exactly one of {free, active} at all times
//! - serials assigned by successive acquires strictly increase, across
//!   reuse and across sequential `block_on` runs
//! - a release followed by an acquire reuses the underlying slot, with
//!   the record's completion state reset
//! - an abandoned context stays active until its late completion arrives,
//!   and that completion releases it without waking anyone
//! - teardown releases everything and reports what it found

mod common;

use common::init_test_logging;
use std::sync::Arc;
use weft::metrics::RuntimeMetrics;
use weft::pool::{Abandon, Completion, OpKind, OpPool};
use weft::runtime::RuntimeBuilder;
use weft::types::TaskId;
use weft::{assert_with_log, test_complete, test_phase, Runtime};

fn owner(n: u32) -> TaskId {
    TaskId::new_for_test(n, 0)
}

fn init_test(test_name: &str) {
    init_test_logging();
    test_phase!(test_name);
}

// ============================================================================
// Direct pool contract
// ============================================================================

#[test]
fn reacquire_reuses_the_released_slot_with_clean_state() {
    init_test("reacquire_reuses_the_released_slot_with_clean_state");

    let mut pool = OpPool::new();
    let first = pool.acquire(OpKind::Read, owner(1));
    assert!(!first.reused);

    assert!(matches!(pool.complete(first.op, 9), Completion::Deliver { .. }));
    let claimed = pool.claim(first.op).unwrap();
    assert_eq!(claimed.result, 9);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.free_count(), 1);

    let second = pool.acquire(OpKind::Write, owner(2));
    assert_with_log!(second.reused, "slot recycled", second);
    assert_with_log!(
        second.op.slot() == first.op.slot(),
        "same underlying node",
        (first.op, second.op)
    );
    assert_with_log!(second.op != first.op, "stale id must not alias", second.op);

    // The recycled record starts clean: no completion, no abandonment.
    assert!(pool.claim(second.op).is_none());
    assert!(!pool.is_abandoned(second.op));
    assert_eq!(pool.owner_of(second.op), Some(owner(2)));

    test_complete!("reacquire_reuses_the_released_slot_with_clean_state");
}

#[test]
fn serials_strictly_increase_across_reuse() {
    init_test("serials_strictly_increase_across_reuse");

    let mut pool = OpPool::new();
    let mut serials = Vec::new();
    for round in 0..5u32 {
        let acquired = pool.acquire(OpKind::Connect, owner(round));
        serials.push(acquired.serial);
        assert!(matches!(pool.complete(acquired.op, 0), Completion::Deliver { .. }));
        pool.claim(acquired.op).unwrap();
    }
    assert_with_log!(
        serials.windows(2).all(|pair| pair[1] > pair[0]),
        "strictly increasing serials",
        serials
    );
    assert_eq!(pool.last_serial(), 5);

    test_complete!("serials_strictly_increase_across_reuse");
}

#[test]
fn abandoned_context_stays_active_until_its_completion() {
    init_test("abandoned_context_stays_active_until_its_completion");

    let mut pool = OpPool::new();
    let acquired = pool.acquire(OpKind::Recv, owner(7));

    assert!(matches!(pool.abandon(acquired.op), Abandon::Deferred(OpKind::Recv)));
    assert_eq!(pool.active_count(), 1, "abandoned is still active");
    assert!(pool.is_abandoned(acquired.op));

    // The late completion releases the slot instead of delivering.
    match pool.complete(acquired.op, -5) {
        Completion::ReleasedAbandoned {
            owner: who,
            serial,
            kind,
        } => {
            assert_eq!(who, owner(7));
            assert_eq!(serial, acquired.serial);
            assert_eq!(kind, OpKind::Recv);
        }
        other => unreachable!("expected ReleasedAbandoned, got {other:?}"),
    }
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.free_count(), 1);

    // Anything referring to the released id is stale from here on.
    assert!(matches!(pool.complete(acquired.op, 0), Completion::Stale));
    assert!(matches!(pool.abandon(acquired.op), Abandon::Gone));

    test_complete!("abandoned_context_stays_active_until_its_completion");
}

#[test]
fn teardown_reports_and_empties_the_pool() {
    init_test("teardown_reports_and_empties_the_pool");

    let mut pool = OpPool::new();
    let _in_flight = pool.acquire(OpKind::Read, owner(1));
    let abandoned = pool.acquire(OpKind::Write, owner(2));
    let released = pool.acquire(OpKind::Send, owner(3));

    assert!(matches!(pool.abandon(abandoned.op), Abandon::Deferred(_)));
    assert!(matches!(pool.complete(released.op, 1), Completion::Deliver { .. }));
    pool.claim(released.op).unwrap();

    let report = pool.teardown();
    assert_with_log!(report.in_flight == 1, "in-flight contexts", report);
    assert_with_log!(report.abandoned == 1, "abandoned contexts", report);
    assert_with_log!(report.recycled == 1, "free slots recycled", report);
    assert_with_log!(report.total_acquired == 3, "final serial", report);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.free_count(), 0);

    // Teardown of an empty pool reports nothing new.
    let again = pool.teardown();
    assert_eq!(again.in_flight, 0);
    assert_eq!(again.abandoned, 0);
    assert_eq!(again.recycled, 0);
    assert_eq!(again.total_acquired, 3);

    test_complete!("teardown_reports_and_empties_the_pool");
}

// ============================================================================
// Pool behavior through the runtime
// ============================================================================

#[test]
fn sequential_submissions_recycle_one_context() {
    init_test("sequential_submissions_recycle_one_context");

    let metrics = Arc::new(RuntimeMetrics::new());
    let (mut runtime, lab) = RuntimeBuilder::new()
        .metrics_provider(Arc::clone(&metrics) as _)
        .build_lab();
    lab.auto_complete(0);

    let result = runtime.block_on(|cx| async move {
        cx.submit(OpKind::Read)?.await?;
        cx.submit(OpKind::Write)?.await?;
        cx.submit(OpKind::Recv)?.await?;
        Ok(())
    });
    assert_with_log!(result.is_ok(), "three sequential ops", result);

    assert_eq!(metrics.ops_acquired.get(), 3);
    assert_with_log!(
        metrics.ops_reused.get() == 2,
        "second and third acquisition recycle the first slot",
        metrics.ops_reused.get()
    );
    assert_eq!(metrics.active_ops.get(), 0);
    assert_eq!(lab.submissions(), 3);
    assert_eq!(lab.pending(), 0);

    test_complete!("sequential_submissions_recycle_one_context");
}

#[test]
fn cancelled_awaiter_abandons_and_the_reactor_reclaims() {
    init_test("cancelled_awaiter_abandons_and_the_reactor_reclaims");

    let metrics = Arc::new(RuntimeMetrics::new());
    let (mut runtime, lab) = RuntimeBuilder::new()
        .metrics_provider(Arc::clone(&metrics) as _)
        .build_lab();

    // No script: the operation never completes on its own, so the deadline
    // wins and the awaiter walks away.
    let result: weft::Result<i32> = runtime.block_on(|cx| async move {
        cx.cancel_after(std::time::Duration::from_millis(10), async {
            let value = cx.submit(OpKind::Recv)?.await?;
            Ok(value)
        })
        .await
    });
    assert_with_log!(
        result.as_ref().err().map(weft::Error::kind) == Some(weft::ErrorKind::Cancelled),
        "await unwound by the deadline",
        result
    );

    assert_eq!(metrics.ops_abandoned.get(), 1);
    assert_with_log!(
        metrics.active_ops.get() == 0,
        "late ECANCELED completion released the context",
        metrics.active_ops.get()
    );
    assert_eq!(lab.pending(), 0);

    test_complete!("cancelled_awaiter_abandons_and_the_reactor_reclaims");
}

#[test]
fn serials_stay_monotonic_across_block_on_runs() {
    init_test("serials_stay_monotonic_across_block_on_runs");

    let (mut runtime, lab) = Runtime::lab();
    lab.auto_complete(0);

    let first = runtime
        .block_on(|cx| async move {
            let op = cx.submit(OpKind::Read)?;
            let serial = op.serial();
            op.await?;
            Ok(serial)
        })
        .unwrap();
    let second = runtime
        .block_on(|cx| async move {
            let op = cx.submit(OpKind::Read)?;
            let serial = op.serial();
            op.await?;
            Ok(serial)
        })
        .unwrap();
    assert_with_log!(
        second > first,
        "pool serial survives runtime teardown between runs",
        (first, second)
    );

    test_complete!("serials_stay_monotonic_across_block_on_runs");
}
