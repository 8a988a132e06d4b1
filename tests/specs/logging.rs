//! The durable per-unit log store: tee'd writes, buckets, and outcomes.

use std::sync::Arc;

use weft_core::{ExecutionId, ExecutionUnit};
use weft_engine::{BufferSink, Dispatcher, OutputMux, ParallelOptions, UnitLogStore};

use super::prelude::serial;

fn stored_harness(
    dir: &tempfile::TempDir,
) -> (BufferSink, Arc<OutputMux<BufferSink>>, Arc<UnitLogStore>) {
    let sink = BufferSink::new();
    let store = Arc::new(UnitLogStore::new(dir.path().to_path_buf()));
    let mux = Arc::new(
        OutputMux::new(sink.clone(), ExecutionUnit::root()).with_store(Arc::clone(&store)),
    );
    (sink, mux, store)
}

#[tokio::test]
async fn main_unit_writes_are_mirrored_to_the_main_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, mux, _store) = stored_harness(&dir);

    mux.line("hello");
    mux.write("frag");

    assert_eq!(sink.contents(), "hello\nfrag");
    let logged = std::fs::read_to_string(dir.path().join("main.log")).unwrap();
    assert_eq!(logged, "hello\nfrag");
}

#[tokio::test]
async fn buffered_output_reaches_the_store_in_real_time() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, mux, _store) = stored_harness(&dir);

    let holder = mux.root().spawn();
    let buffered = mux.root().spawn();
    buffered.set_execution_id(ExecutionId::new("slow-unit"));

    weft_engine::context::scope(holder, {
        let mux = Arc::clone(&mux);
        async move { mux.line("holder") }
    })
    .await;
    weft_engine::context::scope(buffered, {
        let mux = Arc::clone(&mux);
        async move { mux.line("not on console yet") }
    })
    .await;

    // console copy still buffered, durable copy already on disk
    assert_eq!(sink.contents(), "holder\n");
    let logged = std::fs::read_to_string(dir.path().join("slow-unit.log")).unwrap();
    assert_eq!(logged, "not on console yet\n");
}

#[tokio::test]
async fn execution_id_override_shares_one_bucket_across_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (_sink, mux, store) = stored_harness(&dir);
    let dispatcher = Dispatcher::new(Arc::clone(&mux)).with_store(Arc::clone(&store));

    let options = ParallelOptions {
        execution_id: Some(ExecutionId::new("nightly-run")),
        ..serial()
    };
    dispatcher
        .map(vec![0, 1, 2], options, {
            let mux = Arc::clone(&mux);
            move |i: i32| {
                let mux = Arc::clone(&mux);
                async move {
                    mux.line(format!("step {i}"));
                    Ok::<_, String>(())
                }
            }
        })
        .await
        .unwrap();

    let logged = std::fs::read_to_string(dir.path().join("nightly-run.log")).unwrap();
    assert_eq!(logged, "step 0\nstep 1\nstep 2\n");
}

#[tokio::test]
async fn outcomes_are_recorded_per_unit() {
    let dir = tempfile::tempdir().unwrap();
    let (_sink, mux, store) = stored_harness(&dir);
    let dispatcher = Dispatcher::new(mux).with_store(store);

    let _ = dispatcher
        .map(vec![0, 1, 2], serial(), |i: i32| async move {
            if i == 1 {
                Err("bad")
            } else {
                Ok(())
            }
        })
        .await;

    let content = std::fs::read_to_string(dir.path().join("outcomes.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines.iter().filter(|l| l.ends_with("success")).count(), 2);
    assert_eq!(lines.iter().filter(|l| l.ends_with("failure")).count(), 1);
}

#[tokio::test]
async fn fresh_buckets_are_generated_when_no_override_is_given() {
    let dir = tempfile::tempdir().unwrap();
    let (_sink, mux, store) = stored_harness(&dir);
    let dispatcher = Dispatcher::new(Arc::clone(&mux))
        .with_store(store)
        .with_id_gen(weft_core::SequentialIdGen::new("run"));

    dispatcher
        .map(vec![0, 1], serial(), {
            let mux = Arc::clone(&mux);
            move |i: i32| {
                let mux = Arc::clone(&mux);
                async move {
                    mux.line(format!("unit {i}"));
                    Ok::<_, String>(())
                }
            }
        })
        .await
        .unwrap();

    let first = std::fs::read_to_string(dir.path().join("run-1.log")).unwrap();
    let second = std::fs::read_to_string(dir.path().join("run-2.log")).unwrap();
    assert_eq!(first, "unit 0\n");
    assert_eq!(second, "unit 1\n");
}
