#![allow(dead_code)]

use std::sync::Arc;

use plumber::{DependencyGraph, Dispatcher};
use plumber_test_utils::RecordingSink;

pub use plumber_test_utils::init_tracing;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Build a dispatcher over `graph`, set it up with a recording sink and
/// start it.
pub fn started(graph: DependencyGraph<i64>) -> plumber::Result<(Dispatcher<i64>, Arc<RecordingSink>)> {
    init_tracing();
    let dispatcher = Dispatcher::new(graph)?;
    let sink = Arc::new(RecordingSink::new());
    dispatcher.setup(sink.clone())?;
    dispatcher.start()?;
    Ok((dispatcher, sink))
}
