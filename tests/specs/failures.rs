//! Failure paths: buffered output is never silently lost.

use std::sync::Arc;

use weft_engine::{context, PoolError};

use super::prelude::*;

#[tokio::test]
async fn work_errors_propagate_without_abandoning_siblings() {
    let (sink, mux, dispatcher) = harness_with_dispatcher();

    let err = dispatcher
        .map(vec![0, 1, 2], serial(), {
            let mux = Arc::clone(&mux);
            move |i: i32| {
                let mux = Arc::clone(&mux);
                async move {
                    mux.line(format!("unit {i}"));
                    if i == 0 {
                        Err(format!("unit {i} exploded"))
                    } else {
                        Ok(())
                    }
                }
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::Work(ref m) if m == "unit 0 exploded"));
    // every sibling still ran to completion and its output is visible
    assert_eq!(sink.contents(), "unit 0\nunit 1\nunit 2\n");
    assert_eq!(mux.queued_units(), 0);
}

#[tokio::test]
async fn release_surfaces_output_of_units_that_never_flushed() {
    let (sink, mux) = harness();
    let holder = mux.root().spawn();
    let victim = mux.root().spawn();

    context::scope(holder, {
        let mux = Arc::clone(&mux);
        async move { mux.line("held") }
    })
    .await;
    // the victim buffers and is then abandoned without a flush
    context::scope(victim, {
        let mux = Arc::clone(&mux);
        async move { mux.line("evidence") }
    })
    .await;
    assert_eq!(sink.contents(), "held\n");

    mux.release();
    assert_eq!(sink.contents(), "held\nevidence\n");
    assert!(!mux.has_buffered_output());
    assert_eq!(mux.queued_units(), 0);
}

#[tokio::test]
async fn a_new_batch_releases_stale_state_from_a_failed_one() {
    let (sink, mux, dispatcher) = harness_with_dispatcher();

    // simulate a crashed batch: one unit held priority, another buffered,
    // neither reached its flush
    let holder = mux.root().spawn();
    let stale = mux.root().spawn();
    context::scope(holder, {
        let mux = Arc::clone(&mux);
        async move { mux.line("old holder") }
    })
    .await;
    context::scope(stale, {
        let mux = Arc::clone(&mux);
        async move { mux.line("old buffered") }
    })
    .await;
    assert!(mux.has_buffered_output());

    dispatcher
        .map(vec![()], serial(), {
            let mux = Arc::clone(&mux);
            move |_| {
                let mux = Arc::clone(&mux);
                async move {
                    mux.line("fresh");
                    Ok::<_, String>(())
                }
            }
        })
        .await
        .unwrap();

    // the stale buffer was drained before the new batch wrote anything
    assert_eq!(sink.contents(), "old holder\nold buffered\nfresh\n");
    assert!(!mux.has_buffered_output());
    assert_eq!(mux.queued_units(), 0);
}

#[tokio::test]
async fn clean_runs_leave_nothing_for_release() {
    let (sink, mux, dispatcher) = harness_with_dispatcher();

    dispatcher
        .map(vec![0, 1], serial(), {
            let mux = Arc::clone(&mux);
            move |i: i32| {
                let mux = Arc::clone(&mux);
                async move {
                    mux.line(format!("w{i}"));
                    Ok::<_, String>(())
                }
            }
        })
        .await
        .unwrap();
    let before = sink.contents();

    mux.release();
    assert_eq!(sink.contents(), before);
}
