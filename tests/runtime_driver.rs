//! Driver-level tests: deadlock detection, failure escalation, mailbox
//! delivery, and the trace/metrics record of a run.
//!
//! Everything here goes through [`Runtime::block_on`] against the lab
//! reactor, so each scenario is a deterministic walk of the full loop:
//! queue, reactor turn, timer wheel, teardown.

mod common;

use common::init_test_logging;
use std::sync::Arc;
use std::time::Duration;
use weft::trace::{TraceEvent, TraceEventKind};
use weft::types::Time;
use weft::{assert_with_log, test_complete, test_phase};
use weft::{Error, ErrorKind, OpKind, Result, Runtime, RuntimeBuilder, RuntimeMetrics};

fn init_test(test_name: &str) {
    init_test_logging();
    test_phase!(test_name);
}

fn count(events: &[TraceEvent], kind: TraceEventKind) -> usize {
    events.iter().filter(|event| event.kind == kind).count()
}

// ============================================================================
// Deadlock detection
// ============================================================================

#[test]
fn a_receive_nobody_will_answer_is_a_deadlock() {
    init_test("a_receive_nobody_will_answer_is_a_deadlock");

    let (mut runtime, _lab) = Runtime::lab();
    let result: Result<u32> = runtime.block_on(|cx| async move {
        // No timer armed, no operation in flight, no sender anywhere.
        cx.receive::<u32>().await
    });

    let error = result.unwrap_err();
    assert_with_log!(
        error.kind() == ErrorKind::Deadlock,
        "stuck receive detected",
        error
    );

    test_complete!("a_receive_nobody_will_answer_is_a_deadlock");
}

#[test]
fn an_unscripted_submission_is_a_deadlock_not_a_hang() {
    init_test("an_unscripted_submission_is_a_deadlock_not_a_hang");

    let (mut runtime, lab) = Runtime::lab();
    // The lab accepted the submission but has no script and nobody calls
    // complete(); the op counts as in flight, so detection happens after
    // the reactor turn comes back empty-handed.
    let result: Result<i32> = runtime.block_on(|cx| async move { cx.submit(OpKind::Read)?.await });

    let error = result.unwrap_err();
    assert_with_log!(
        error.kind() == ErrorKind::Deadlock,
        "unanswerable op detected",
        error
    );
    assert_with_log!(lab.now() == Time::ZERO, "clock never moved", lab.now());

    test_complete!("an_unscripted_submission_is_a_deadlock_not_a_hang");
}

#[test]
fn a_timer_saves_an_otherwise_stuck_run() {
    init_test("a_timer_saves_an_otherwise_stuck_run");

    let (mut runtime, _lab) = Runtime::lab();
    // Same shape as the stuck receive, but raced against a deadline: the
    // armed timer keeps the run alive until the scope fires.
    let result: Result<u32> = runtime.block_on(|cx| async move {
        cx.move_on_after(Duration::from_millis(20), 7, async {
            cx.receive::<u32>().await
        })
        .await
    });

    let value = result.unwrap();
    assert_with_log!(value == 7, "deadline default returned", value);

    test_complete!("a_timer_saves_an_otherwise_stuck_run");
}

// ============================================================================
// Failure escalation
// ============================================================================

#[test]
fn a_dropped_handles_failure_escalates_to_the_spawner() {
    init_test("a_dropped_handles_failure_escalates_to_the_spawner");

    let (mut runtime, _lab) = Runtime::lab();
    let result: Result<()> = runtime.block_on(|cx| async move {
        let handle = cx.spin(|cx| async move {
            cx.sleep(Duration::from_millis(5)).await?;
            Err::<(), _>(Error::io(-7))
        });
        handle.detach();
        // The child's failure lands here, at the next suspension point.
        cx.sleep(Duration::from_millis(50)).await?;
        Ok(())
    });

    let error = result.unwrap_err();
    assert_with_log!(error.kind() == ErrorKind::Io, "escalated kind", error);
    assert_with_log!(error.code() == Some(-7), "escalated code", error.code());
    assert_with_log!(
        runtime.now() == Time::from_millis(5),
        "spawner interrupted mid-sleep",
        runtime.now()
    );

    test_complete!("a_dropped_handles_failure_escalates_to_the_spawner");
}

#[test]
fn a_failure_after_the_root_returns_overrides_its_success() {
    init_test("a_failure_after_the_root_returns_overrides_its_success");

    let (mut runtime, _lab) = Runtime::lab();
    // The child is never polled before the root resolves; its failure
    // surfaces during the shutdown drain, with no parent left to receive
    // the escalation.
    let result: Result<&str> = runtime.block_on(|cx| async move {
        cx.spin(|_cx| async move { Err::<(), _>(Error::io(-5)) })
            .detach();
        Ok("done")
    });

    let error = result.unwrap_err();
    assert_with_log!(
        error.kind() == ErrorKind::Io,
        "orphan failure wins over root success",
        error
    );

    test_complete!("a_failure_after_the_root_returns_overrides_its_success");
}

#[test]
fn a_joined_failure_does_not_escalate() {
    init_test("a_joined_failure_does_not_escalate");

    let (mut runtime, _lab) = Runtime::lab();
    // The same failing child, but observed through its handle: the root
    // decides what to do with the error, and here it swallows it.
    let result: Result<&str> = runtime.block_on(|cx| async move {
        let handle = cx.spin(|_cx| async move { Err::<(), _>(Error::io(-5)) });
        let outcome = handle.join(&cx).await?;
        assert!(outcome.is_failure(), "child failed as arranged: {outcome:?}");
        Ok("handled")
    });

    let value = result.unwrap();
    assert_with_log!(value == "handled", "observed failure stays local", value);

    test_complete!("a_joined_failure_does_not_escalate");
}

// ============================================================================
// Mailboxes
// ============================================================================

#[test]
fn messages_cross_tasks_in_send_order() {
    init_test("messages_cross_tasks_in_send_order");

    let (mut runtime, _lab) = Runtime::lab();
    let total = runtime
        .block_on(|cx| async move {
            let consumer = cx.spin(|cx| async move {
                let mut total = 0_u32;
                for _ in 0..3 {
                    total = total * 10 + cx.receive::<u32>().await?;
                }
                Ok(total)
            });
            for message in [1_u32, 2, 3] {
                consumer.send(&cx, message)?;
                cx.yield_now().await?;
            }
            match consumer.join(&cx).await? {
                weft::Outcome::Ok(total) => Ok(total),
                other => Err(Error::internal(format!("consumer failed: {other:?}"))),
            }
        })
        .unwrap();

    // Positional encoding proves order, not just content.
    assert_with_log!(total == 123, "send order preserved", total);

    test_complete!("messages_cross_tasks_in_send_order");
}

#[test]
fn a_mistyped_message_is_reported_and_consumed() {
    init_test("a_mistyped_message_is_reported_and_consumed");

    let (mut runtime, _lab) = Runtime::lab();
    let value = runtime
        .block_on(|cx| async move {
            let consumer = cx.spin(|cx| async move {
                let mismatch = cx.receive::<u32>().await;
                let Err(error) = mismatch else {
                    return Err(Error::internal("string decoded as u32"));
                };
                if error.kind() != ErrorKind::MailboxTypeMismatch {
                    return Err(error);
                }
                // The offender was consumed; the queue is clean again.
                cx.receive::<u32>().await
            });
            consumer.send(&cx, "not a number".to_string())?;
            consumer.send(&cx, 5_u32)?;
            match consumer.join(&cx).await? {
                weft::Outcome::Ok(value) => Ok(value),
                other => Err(Error::internal(format!("consumer failed: {other:?}"))),
            }
        })
        .unwrap();

    assert_with_log!(value == 5, "queue recovered after mismatch", value);

    test_complete!("a_mistyped_message_is_reported_and_consumed");
}

#[test]
fn sending_to_a_resolved_task_is_disconnected() {
    init_test("sending_to_a_resolved_task_is_disconnected");

    let (mut runtime, _lab) = Runtime::lab();
    let kind = runtime
        .block_on(|cx| async move {
            let worker = cx.spin(|_cx| async move { Ok(()) });
            let outcome = worker.join(&cx).await?;
            assert!(outcome.is_ok(), "worker finished: {outcome:?}");
            let error = match worker.send(&cx, 1_u32) {
                Err(error) => error,
                Ok(()) => return Err(Error::internal("send to a finished task succeeded")),
            };
            Ok(error.kind())
        })
        .unwrap();

    assert_with_log!(kind == ErrorKind::Disconnected, "late send refused", kind);

    test_complete!("sending_to_a_resolved_task_is_disconnected");
}

// ============================================================================
// Trace and metrics
// ============================================================================

#[test]
fn the_trace_reconstructs_a_small_run() {
    init_test("the_trace_reconstructs_a_small_run");

    let (mut runtime, _lab) = Runtime::lab();
    runtime
        .block_on(|cx| async move {
            let sleeper = cx.spin(|cx| async move {
                cx.sleep(Duration::from_millis(10)).await?;
                Ok(())
            });
            let outcome = sleeper.join(&cx).await?;
            assert!(outcome.is_ok(), "sleeper finished: {outcome:?}");
            Ok(())
        })
        .unwrap();

    let events = runtime.trace_snapshot();
    assert_with_log!(!events.is_empty(), "events recorded", events.len());
    assert_with_log!(
        events[0].kind == TraceEventKind::TaskSpawned,
        "run opens with the root spawn",
        events[0].kind
    );
    assert_with_log!(
        count(&events, TraceEventKind::TaskSpawned) == 2,
        "root and sleeper spawned",
        count(&events, TraceEventKind::TaskSpawned)
    );
    assert_with_log!(
        count(&events, TraceEventKind::TaskCompleted) == 2,
        "both completed",
        count(&events, TraceEventKind::TaskCompleted)
    );
    assert_with_log!(
        count(&events, TraceEventKind::TimerArmed) == 1
            && count(&events, TraceEventKind::TimerFired) == 1,
        "one timer armed and fired",
        events.len()
    );
    assert_with_log!(
        count(&events, TraceEventKind::TimeAdvance) >= 1,
        "the clock moved",
        count(&events, TraceEventKind::TimeAdvance)
    );
    let ordered = events.windows(2).all(|pair| {
        pair[0].seq < pair[1].seq && pair[0].time <= pair[1].time
    });
    assert_with_log!(ordered, "sequence dense, time monotone", ordered);

    test_complete!("the_trace_reconstructs_a_small_run");
}

#[test]
fn metrics_account_for_every_task_op_and_timer() {
    init_test("metrics_account_for_every_task_op_and_timer");

    let metrics = Arc::new(RuntimeMetrics::default());
    let (mut runtime, lab) = RuntimeBuilder::new()
        .metrics_provider(Arc::clone(&metrics) as _)
        .build_lab();
    lab.auto_complete(0);

    runtime
        .block_on(|cx| async move {
            let io = cx.spin(|cx| async move {
                let _ = cx.submit(OpKind::Write)?.await?;
                Ok(())
            });
            let nap = cx.spin(|cx| async move {
                cx.sleep(Duration::from_millis(3)).await?;
                Ok(())
            });
            let first = io.join(&cx).await?;
            let second = nap.join(&cx).await?;
            assert!(first.is_ok() && second.is_ok(), "both children finished");
            Ok(())
        })
        .unwrap();

    assert_with_log!(metrics.tasks_spawned.get() == 3, "spawns", metrics.tasks_spawned.get());
    assert_with_log!(
        metrics.tasks_completed.get() == 3,
        "completions",
        metrics.tasks_completed.get()
    );
    assert_with_log!(metrics.live_tasks.get() == 0, "no survivors", metrics.live_tasks.get());
    assert_with_log!(metrics.ops_acquired.get() == 1, "one op", metrics.ops_acquired.get());
    assert_with_log!(metrics.active_ops.get() == 0, "op retired", metrics.active_ops.get());
    assert_with_log!(metrics.timers_fired.get() == 1, "one timer", metrics.timers_fired.get());
    assert_with_log!(
        metrics.signals_injected.get() == 0,
        "clean run needed no signals",
        metrics.signals_injected.get()
    );

    test_complete!("metrics_account_for_every_task_op_and_timer");
}

#[test]
fn sequential_runs_share_the_clock_and_nothing_else() {
    init_test("sequential_runs_share_the_clock_and_nothing_else");

    let (mut runtime, _lab) = Runtime::lab();
    runtime
        .block_on(|cx| async move { cx.sleep(Duration::from_millis(10)).await })
        .unwrap();
    runtime
        .block_on(|cx| async move { cx.sleep(Duration::from_millis(5)).await })
        .unwrap();

    // The lab clock never rewinds between runs; tasks and timers do not
    // survive them.
    assert_with_log!(
        runtime.now() == Time::from_millis(15),
        "clock carried across runs",
        runtime.now()
    );
    let events = runtime.trace_snapshot();
    assert_with_log!(
        count(&events, TraceEventKind::TaskSpawned) == 2,
        "one root per run, no leftovers",
        count(&events, TraceEventKind::TaskSpawned)
    );

    test_complete!("sequential_runs_share_the_clock_and_nothing_else");
}
