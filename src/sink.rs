//! Result Sink: Trait-based output for Human (CLI) and Machine (JSON) formats
//!
//! ## Architecture
//!
//! - `ResultSink` trait defines the event callbacks; workers invoke them
//!   concurrently, so implementations take `&self` and must be `Send + Sync`
//! - `JsonSink` outputs NDJSON to stdout (for --format=json)
//! - `HumanSink` outputs human-readable text to stderr
//! - `MultiSink` broadcasts to several sinks, `NullSink` discards
//! - `RecordingSink` captures the event stream for assertions
//!
//! ## Stdout Purity
//!
//! When JsonSink is active, ONLY valid JSON goes to stdout. All other
//! output (logs, errors, debug) must go to stderr.
//!
//! ## Callback contract
//!
//! When a test body "throws" (returns `Err`), BOTH finished shapes fire for
//! it: the plain `on_test_finished(name, false)` and
//! `on_test_finished_with_cause(name, false, cause)`. Warnings and finishes
//! are mutually exclusive per operation, and `on_all_tests_finished` is
//! always the last event of a run.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

/// Listener for the structured result events of one run.
pub trait ResultSink: Send + Sync {
    /// Called synchronously, in declaration order, before the test is
    /// dispatched to a worker.
    fn on_test_start(&self, name: &str);

    /// Called once for every `test`-prefixed operation that fails shape
    /// checks; `reason` enumerates every violated rule.
    fn on_test_warning(&self, name: &str, reason: &str);

    /// Called when a test completes with a boolean outcome.
    fn on_test_finished(&self, name: &str, success: bool);

    /// Called in addition to `on_test_finished` when the test threw.
    fn on_test_finished_with_cause(&self, name: &str, success: bool, cause: &anyhow::Error);

    /// Called exactly once, strictly after every other event of the run.
    fn on_all_tests_finished(
        &self,
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    );

    /// Called for malfunctions of the harness itself (instance construction,
    /// lifecycle hooks, completion wait), never for a test's pass/fail.
    fn on_harness_error(&self, cause: &anyhow::Error);
}

/// Machine-readable events for JSON output
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent<'a> {
    TestStart {
        name: &'a str,
    },
    TestWarning {
        name: &'a str,
        reason: &'a str,
    },
    TestFinished {
        name: &'a str,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
    AllTestsFinished {
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    },
    HarnessError {
        message: String,
    },
}

/// JSON Sink - outputs NDJSON to stdout
pub struct JsonSink;

impl JsonSink {
    fn emit(&self, event: &MachineEvent) {
        // ONLY JsonSink touches stdout; println! locks stdout per call, so
        // each event line stays intact under concurrent workers.
        println!("{}", serde_json::to_string(event).unwrap());
    }
}

impl ResultSink for JsonSink {
    fn on_test_start(&self, name: &str) {
        self.emit(&MachineEvent::TestStart { name });
    }

    fn on_test_warning(&self, name: &str, reason: &str) {
        self.emit(&MachineEvent::TestWarning { name, reason });
    }

    fn on_test_finished(&self, name: &str, success: bool) {
        self.emit(&MachineEvent::TestFinished {
            name,
            success,
            cause: None,
        });
    }

    fn on_test_finished_with_cause(&self, name: &str, success: bool, cause: &anyhow::Error) {
        self.emit(&MachineEvent::TestFinished {
            name,
            success,
            cause: Some(format!("{:#}", cause)),
        });
    }

    fn on_all_tests_finished(
        &self,
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    ) {
        self.emit(&MachineEvent::AllTestsFinished {
            successes,
            failed_without_exception,
            failed_with_exception,
        });
    }

    fn on_harness_error(&self, cause: &anyhow::Error) {
        self.emit(&MachineEvent::HarnessError {
            message: format!("{:#}", cause),
        });
    }
}

/// Human Sink - outputs readable text to stderr
///
/// Tracks the start instant of each running test so finishes can print a
/// duration; the map is shared by concurrent workers.
#[derive(Default)]
pub struct HumanSink {
    running: DashMap<String, Instant>,
}

impl HumanSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn elapsed_ms(&self, name: &str) -> u64 {
        self.running
            .remove(name)
            .map(|(_, started)| started.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

impl ResultSink for HumanSink {
    fn on_test_start(&self, name: &str) {
        self.running.insert(name.to_string(), Instant::now());
        eprintln!("  {} ...", name);
    }

    fn on_test_warning(&self, name: &str, reason: &str) {
        eprintln!("  {} ⊘ {}", name, reason);
    }

    fn on_test_finished(&self, name: &str, success: bool) {
        let duration_ms = self.elapsed_ms(name);
        if success {
            eprintln!("  {} ✓ ({}ms)", name, duration_ms);
        } else {
            eprintln!("  {} ✗ ({}ms)", name, duration_ms);
        }
    }

    fn on_test_finished_with_cause(&self, name: &str, _success: bool, cause: &anyhow::Error) {
        eprintln!("  {} ✗ threw: {:#}", name, cause);
    }

    fn on_all_tests_finished(
        &self,
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    ) {
        let total = successes + failed_without_exception + failed_with_exception;
        eprintln!();
        eprintln!(
            "[crucible] {} run: {} passed, {} failed, {} threw",
            total,
            successes,
            failed_without_exception + failed_with_exception,
            failed_with_exception
        );
    }

    fn on_harness_error(&self, cause: &anyhow::Error) {
        eprintln!("[crucible] HARNESS ERROR: {:#}", cause);
    }
}

// =============================================================================
// MultiSink
// =============================================================================

/// MultiSink - broadcasts events to multiple sinks
pub struct MultiSink {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn ResultSink>>) -> Self {
        Self { sinks }
    }
}

impl ResultSink for MultiSink {
    fn on_test_start(&self, name: &str) {
        for s in &self.sinks {
            s.on_test_start(name);
        }
    }

    fn on_test_warning(&self, name: &str, reason: &str) {
        for s in &self.sinks {
            s.on_test_warning(name, reason);
        }
    }

    fn on_test_finished(&self, name: &str, success: bool) {
        for s in &self.sinks {
            s.on_test_finished(name, success);
        }
    }

    fn on_test_finished_with_cause(&self, name: &str, success: bool, cause: &anyhow::Error) {
        for s in &self.sinks {
            s.on_test_finished_with_cause(name, success, cause);
        }
    }

    fn on_all_tests_finished(
        &self,
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    ) {
        for s in &self.sinks {
            s.on_all_tests_finished(successes, failed_without_exception, failed_with_exception);
        }
    }

    fn on_harness_error(&self, cause: &anyhow::Error) {
        for s in &self.sinks {
            s.on_harness_error(cause);
        }
    }
}

/// Shared sinks can be handed to several consumers (e.g. a `MultiSink` and
/// the caller that inspects it afterwards).
impl<T: ResultSink + ?Sized> ResultSink for std::sync::Arc<T> {
    fn on_test_start(&self, name: &str) {
        (**self).on_test_start(name);
    }

    fn on_test_warning(&self, name: &str, reason: &str) {
        (**self).on_test_warning(name, reason);
    }

    fn on_test_finished(&self, name: &str, success: bool) {
        (**self).on_test_finished(name, success);
    }

    fn on_test_finished_with_cause(&self, name: &str, success: bool, cause: &anyhow::Error) {
        (**self).on_test_finished_with_cause(name, success, cause);
    }

    fn on_all_tests_finished(
        &self,
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    ) {
        (**self).on_all_tests_finished(successes, failed_without_exception, failed_with_exception);
    }

    fn on_harness_error(&self, cause: &anyhow::Error) {
        (**self).on_harness_error(cause);
    }
}

/// NullSink - discards every event
pub struct NullSink;

impl ResultSink for NullSink {
    fn on_test_start(&self, _name: &str) {}
    fn on_test_warning(&self, _name: &str, _reason: &str) {}
    fn on_test_finished(&self, _name: &str, _success: bool) {}
    fn on_test_finished_with_cause(&self, _name: &str, _success: bool, _cause: &anyhow::Error) {}
    fn on_all_tests_finished(&self, _s: usize, _f: usize, _e: usize) {}
    fn on_harness_error(&self, _cause: &anyhow::Error) {}
}

// =============================================================================
// RecordingSink
// =============================================================================

/// One observed callback, in a comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Start(String),
    Warning(String, String),
    Finished(String, bool),
    FinishedWithCause(String, bool, String),
    AllFinished(usize, usize, usize),
    HarnessError(String),
}

/// RecordingSink - captures the event stream for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }

    /// Snapshot of every event observed so far, in arrival order.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events concerning one operation name, in arrival order.
    pub fn events_for(&self, name: &str) -> Vec<SinkEvent> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                SinkEvent::Start(n)
                | SinkEvent::Warning(n, _)
                | SinkEvent::Finished(n, _)
                | SinkEvent::FinishedWithCause(n, _, _) => n == name,
                _ => false,
            })
            .collect()
    }

    /// The terminal summary, if the run reached it.
    pub fn summary(&self) -> Option<(usize, usize, usize)> {
        self.events().into_iter().rev().find_map(|e| match e {
            SinkEvent::AllFinished(s, f, x) => Some((s, f, x)),
            _ => None,
        })
    }
}

impl ResultSink for RecordingSink {
    fn on_test_start(&self, name: &str) {
        self.push(SinkEvent::Start(name.to_string()));
    }

    fn on_test_warning(&self, name: &str, reason: &str) {
        self.push(SinkEvent::Warning(name.to_string(), reason.to_string()));
    }

    fn on_test_finished(&self, name: &str, success: bool) {
        self.push(SinkEvent::Finished(name.to_string(), success));
    }

    fn on_test_finished_with_cause(&self, name: &str, success: bool, cause: &anyhow::Error) {
        self.push(SinkEvent::FinishedWithCause(
            name.to_string(),
            success,
            format!("{:#}", cause),
        ));
    }

    fn on_all_tests_finished(
        &self,
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    ) {
        self.push(SinkEvent::AllFinished(
            successes,
            failed_without_exception,
            failed_with_exception,
        ));
    }

    fn on_harness_error(&self, cause: &anyhow::Error) {
        self.push(SinkEvent::HarnessError(format!("{:#}", cause)));
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
