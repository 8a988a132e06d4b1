//! Shared helpers for behavioral specifications.

#![allow(dead_code)]

use std::sync::Arc;

use weft_core::ExecutionUnit;
use weft_engine::{BufferSink, Concurrency, Dispatcher, OutputMux, ParallelOptions};

/// A multiplexer over an inspectable in-memory sink.
pub fn harness() -> (BufferSink, Arc<OutputMux<BufferSink>>) {
    let sink = BufferSink::new();
    let mux = Arc::new(OutputMux::new(sink.clone(), ExecutionUnit::root()));
    (sink, mux)
}

/// Same, with the dispatcher attached.
pub fn harness_with_dispatcher() -> (
    BufferSink,
    Arc<OutputMux<BufferSink>>,
    Dispatcher<BufferSink>,
) {
    let (sink, mux) = harness();
    let dispatcher = Dispatcher::new(Arc::clone(&mux));
    (sink, mux, dispatcher)
}

/// One worker at a time: batch output order equals input order.
pub fn serial() -> ParallelOptions {
    ParallelOptions {
        concurrency: Concurrency::Limited(1),
        ..Default::default()
    }
}
