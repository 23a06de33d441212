//! Test Execution Engine with bounded parallel execution
//!
//! Construction validates the class and nothing else; `run` walks the
//! declared operations once on the caller's thread, dispatches runnable
//! tests to a fixed-size worker pool, and blocks until every declared
//! operation has been accounted for exactly once. Nothing escapes `run`
//! as an error: every failure surfaces through the sink.

use crate::classify::{self, Classification, SETUP_NAME, TEARDOWN_NAME};
use crate::registry::{ConstructorFn, HookFn, MethodBody, Registry, ReturnKind, TestFn};
use crate::sink::ResultSink;
use crate::validator::{self, ConstructionError, TestClassDescriptor};
use anyhow::anyhow;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Run max 6 tests at the same time unless configured otherwise.
pub const DEFAULT_WORKERS: usize = 6;

/// Outcome of one runnable test, produced exactly once per execution.
pub enum TestOutcome {
    Success,
    FailedWithoutException,
    FailedWithException(anyhow::Error),
}

/// Shared counters for one run; incremented atomically by workers, read
/// once at the end to produce the summary.
#[derive(Default)]
pub struct ResultTally {
    successes: AtomicUsize,
    failed_without_exception: AtomicUsize,
    failed_with_exception: AtomicUsize,
}

impl ResultTally {
    fn record(&self, outcome: &TestOutcome) {
        let counter = match outcome {
            TestOutcome::Success => &self.successes,
            TestOutcome::FailedWithoutException => &self.failed_without_exception,
            TestOutcome::FailedWithException(_) => &self.failed_with_exception,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failed_without_exception(&self) -> usize {
        self.failed_without_exception.load(Ordering::Relaxed)
    }

    pub fn failed_with_exception(&self) -> usize {
        self.failed_with_exception.load(Ordering::Relaxed)
    }
}

/// Engine for one test class. Construction validates; `run` executes.
pub struct Engine {
    descriptor: TestClassDescriptor,
    sink: Arc<dyn ResultSink>,
    workers: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Validate `class_name` against the registry and bind the sink.
    /// No side effect beyond resolution; nothing is instantiated.
    pub fn new(
        registry: &Registry,
        class_name: &str,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, ConstructionError> {
        let descriptor = validator::validate(registry, class_name)?;
        Ok(Self {
            descriptor,
            sink,
            workers: DEFAULT_WORKERS,
        })
    }

    /// Override the worker pool size (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.descriptor.name
    }

    /// Execute the full lifecycle. Returns only after every declared
    /// operation is accounted for, then emits the terminal summary.
    pub fn run(&self) {
        let set_up = self.resolve_hook(SETUP_NAME);
        let teardown = self.resolve_hook(TEARDOWN_NAME);

        let total = self.descriptor.methods.len();
        let tally = Arc::new(ResultTally::default());
        // Completion signal: exactly one unit message per declared
        // operation, consumed back on this thread.
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(total.max(1));

        // A panicking user closure must not abort the process. The handler
        // only logs; the lost accounting message is what surfaces the
        // malfunction through the sink, on this thread, before the summary.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .panic_handler(|_| eprintln!("[crucible] test worker panicked"))
            .build();
        let pool = match pool {
            Ok(pool) => pool,
            Err(e) => {
                self.sink
                    .on_harness_error(&anyhow::Error::new(e).context("failed to build worker pool"));
                self.sink.on_all_tests_finished(0, 0, 0);
                return;
            }
        };

        for method in &self.descriptor.methods {
            match classify::classify(method) {
                Classification::Ignored => {
                    // Not prefixed "test": accounted, never reported.
                    let _ = done_tx.send(());
                }
                Classification::Malformed { reason } => {
                    self.sink.on_test_warning(&method.name, &reason);
                    let _ = done_tx.send(());
                }
                Classification::Runnable => {
                    let body = match &method.body {
                        MethodBody::Test(body) => body.clone(),
                        // Runnable implies a test body; see MethodSpec::return_kind.
                        _ => unreachable!("runnable operation without a test body"),
                    };
                    self.sink.on_test_start(&method.name);
                    let job = TestJob {
                        name: method.name.clone(),
                        body,
                        constructor: self.descriptor.constructor.construct.clone(),
                        set_up: set_up.clone(),
                        teardown: teardown.clone(),
                        tally: tally.clone(),
                        sink: self.sink.clone(),
                        done: done_tx.clone(),
                    };
                    pool.spawn(move || job.execute());
                }
            }
        }
        drop(done_tx);

        for _ in 0..total {
            if done_rx.recv().is_err() {
                // All senders gone with messages outstanding: a worker died
                // without accounting for its operation.
                self.sink.on_harness_error(&anyhow!(
                    "completion signal lost before all operations were accounted"
                ));
                break;
            }
        }

        self.sink.on_all_tests_finished(
            tally.successes(),
            tally.failed_without_exception(),
            tally.failed_with_exception(),
        );
    }

    /// Resolve an optional lifecycle hook: public, zero-parameter, void.
    /// A same-named method failing the shape check is treated as absent.
    fn resolve_hook(&self, name: &str) -> Option<HookFn> {
        self.descriptor
            .methods
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| {
                if !classify::is_correct_shape(m, 0, ReturnKind::Void) {
                    return None;
                }
                match &m.body {
                    MethodBody::Hook(hook) => Some(hook.clone()),
                    _ => None,
                }
            })
    }
}

/// Everything one worker needs to execute one runnable test.
struct TestJob {
    name: String,
    body: TestFn,
    constructor: ConstructorFn,
    set_up: Option<HookFn>,
    teardown: Option<HookFn>,
    tally: Arc<ResultTally>,
    sink: Arc<dyn ResultSink>,
    done: Sender<()>,
}

impl TestJob {
    fn execute(self) {
        self.run_case();
        // Exactly one accounting message regardless of which branch ran.
        let _ = self.done.send(());
    }

    fn run_case(&self) {
        // Fresh instance per test for isolation between concurrent tests.
        let mut instance = match (self.constructor)() {
            Ok(instance) => instance,
            Err(e) => {
                self.sink.on_harness_error(
                    &e.context(format!("could not construct instance for {}", self.name)),
                );
                return;
            }
        };

        if let Some(hook) = &self.set_up {
            if let Err(e) = hook(&mut instance) {
                // setUp is harness machinery: its failure is fatal to this
                // test, the body and teardown are skipped.
                self.sink
                    .on_harness_error(&e.context(format!("setUp failed before {}", self.name)));
                return;
            }
        }

        let outcome = match (self.body)(&mut instance) {
            Ok(true) => TestOutcome::Success,
            Ok(false) => TestOutcome::FailedWithoutException,
            Err(cause) => TestOutcome::FailedWithException(cause),
        };
        match &outcome {
            TestOutcome::Success => self.sink.on_test_finished(&self.name, true),
            TestOutcome::FailedWithoutException => self.sink.on_test_finished(&self.name, false),
            TestOutcome::FailedWithException(cause) => {
                // Both finished shapes fire for the threw case.
                self.sink.on_test_finished(&self.name, false);
                self.sink.on_test_finished_with_cause(&self.name, false, cause);
            }
        }
        self.tally.record(&outcome);

        if let Some(hook) = &self.teardown {
            if let Err(e) = hook(&mut instance) {
                // Outcome already recorded; teardown failure stays a
                // harness error.
                self.sink
                    .on_harness_error(&e.context(format!("teardown failed after {}", self.name)));
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClassSpec, Visibility};
    use crate::sink::{RecordingSink, SinkEvent};
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    fn run_class(spec: ClassSpec) -> Arc<RecordingSink> {
        let name = spec.name().to_string();
        let mut registry = Registry::new();
        registry.register(spec);
        let sink = Arc::new(RecordingSink::new());
        Engine::new(&registry, &name, sink.clone())
            .unwrap()
            .run();
        sink
    }

    #[test]
    fn test_single_passing_test() {
        let sink = run_class(
            ClassSpec::new("OnePass")
                .constructs(|| Ok(()))
                .test("testAlwaysTrue", |_: &mut ()| Ok(true)),
        );

        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Start("testAlwaysTrue".to_string()),
                SinkEvent::Finished("testAlwaysTrue".to_string(), true),
                SinkEvent::AllFinished(1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_failing_test_counts_without_exception() {
        let sink = run_class(
            ClassSpec::new("OneFail")
                .constructs(|| Ok(()))
                .test("testAlwaysFalse", |_: &mut ()| Ok(false)),
        );
        assert_eq!(sink.summary(), Some((0, 1, 0)));
        assert_eq!(
            sink.events_for("testAlwaysFalse"),
            vec![
                SinkEvent::Start("testAlwaysFalse".to_string()),
                SinkEvent::Finished("testAlwaysFalse".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_throwing_test_fires_both_finished_shapes() {
        let sink = run_class(
            ClassSpec::new("OneThrow")
                .constructs(|| Ok(()))
                .test("testThrows", |_: &mut ()| Err(anyhow!("deliberate"))),
        );

        assert_eq!(sink.summary(), Some((0, 0, 1)));
        let events = sink.events_for("testThrows");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SinkEvent::Start("testThrows".to_string()));
        assert_eq!(events[1], SinkEvent::Finished("testThrows".to_string(), false));
        match &events[2] {
            SinkEvent::FinishedWithCause(_, false, cause) => {
                assert!(cause.contains("deliberate"));
            }
            other => panic!("expected cause-bearing finish, got {:?}", other),
        }
    }

    #[test]
    fn test_unprefixed_operation_produces_no_callback() {
        let sink = run_class(
            ClassSpec::new("Quiet")
                .constructs(|| Ok(()))
                .test("notATest", |_: &mut ()| Ok(true))
                .test("testReal", |_: &mut ()| Ok(true)),
        );

        assert!(sink.events_for("notATest").is_empty());
        // Still accounted: the run terminated and the summary only counts
        // the runnable operation.
        assert_eq!(sink.summary(), Some((1, 0, 0)));
    }

    #[test]
    fn test_malformed_operation_warns_and_is_excluded() {
        let sink = run_class(
            ClassSpec::new("Warned")
                .constructs(|| Ok(()))
                .method(
                    "testHidden",
                    0,
                    Visibility::Private,
                    MethodBody::Test(crate::registry::wrap_test("testHidden", |_: &mut ()| {
                        Ok(true)
                    })),
                ),
        );

        let events = sink.events_for("testHidden");
        assert_eq!(events.len(), 1);
        match &events[0] {
            SinkEvent::Warning(_, reason) => assert!(reason.contains("must be public")),
            other => panic!("expected warning, got {:?}", other),
        }
        assert_eq!(sink.summary(), Some((0, 0, 0)));
    }

    #[test]
    fn test_hooks_run_around_body_on_fresh_instances() {
        #[derive(Default)]
        struct State {
            prepared: bool,
        }
        static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

        let sink = run_class(
            ClassSpec::new("Hooked")
                .constructs(|| {
                    CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
                    Ok(State::default())
                })
                .hook("setUp", |s: &mut State| {
                    s.prepared = true;
                    Ok(())
                })
                .hook("teardown", |s: &mut State| {
                    s.prepared = false;
                    Ok(())
                })
                .test("testPreparedA", |s: &mut State| Ok(s.prepared))
                .test("testPreparedB", |s: &mut State| Ok(s.prepared)),
        );

        // Both tests saw setUp's effect on their own instance.
        assert_eq!(sink.summary(), Some((2, 0, 0)));
        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_malformed_setup_is_treated_as_absent() {
        #[derive(Default)]
        struct State {
            prepared: bool,
        }

        let sink = run_class(
            ClassSpec::new("BadHook")
                .constructs(|| Ok(State::default()))
                // setUp with a parameter fails the shape check: not an
                // error, simply never invoked.
                .method(
                    "setUp",
                    1,
                    Visibility::Public,
                    MethodBody::Hook(crate::registry::wrap_hook("setUp", |s: &mut State| {
                        s.prepared = true;
                        Ok(())
                    })),
                )
                .test("testPrepared", |s: &mut State| Ok(s.prepared)),
        );

        // Hook did not run, so the test observed the default state.
        assert_eq!(sink.summary(), Some((0, 1, 0)));
        assert!(sink
            .events()
            .iter()
            .all(|e| !matches!(e, SinkEvent::HarnessError(_))));
    }

    #[test]
    fn test_constructor_failure_is_harness_error() {
        let sink = run_class(
            ClassSpec::new("NoBuild")
                .constructs::<(), _>(|| Err(anyhow!("backing store offline")))
                .test("testNever", |_: &mut ()| Ok(true)),
        );

        assert_eq!(sink.summary(), Some((0, 0, 0)));
        let events = sink.events();
        assert!(events.iter().any(|e| matches!(
            e,
            SinkEvent::HarnessError(msg) if msg.contains("backing store offline")
        )));
        // Started but never finished: construction failed first.
        assert_eq!(
            sink.events_for("testNever"),
            vec![SinkEvent::Start("testNever".to_string())]
        );
    }

    #[test]
    fn test_setup_failure_skips_body_and_teardown() {
        static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);

        let sink = run_class(
            ClassSpec::new("SetupFails")
                .constructs(|| Ok(()))
                .hook("setUp", |_: &mut ()| Err(anyhow!("fixture missing")))
                .hook("teardown", |_: &mut ()| {
                    TEARDOWNS.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .test("testSkipped", |_: &mut ()| Ok(true)),
        );

        assert_eq!(sink.summary(), Some((0, 0, 0)));
        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), 0);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            SinkEvent::HarnessError(msg) if msg.contains("setUp failed")
        )));
    }

    #[test]
    fn test_teardown_failure_keeps_recorded_outcome() {
        let sink = run_class(
            ClassSpec::new("TeardownFails")
                .constructs(|| Ok(()))
                .hook("teardown", |_: &mut ()| Err(anyhow!("cleanup failed")))
                .test("testStillPasses", |_: &mut ()| Ok(true)),
        );

        assert_eq!(sink.summary(), Some((1, 0, 0)));
        assert!(sink.events().iter().any(|e| matches!(
            e,
            SinkEvent::HarnessError(msg) if msg.contains("teardown failed")
        )));
    }

    #[test]
    fn test_teardown_runs_after_failure_and_throw() {
        static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);

        let sink = run_class(
            ClassSpec::new("AlwaysTornDown")
                .constructs(|| Ok(()))
                .hook("teardown", |_: &mut ()| {
                    TEARDOWNS.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .test("testFalse", |_: &mut ()| Ok(false))
                .test("testThrows", |_: &mut ()| Err(anyhow!("boom"))),
        );

        assert_eq!(sink.summary(), Some((0, 1, 1)));
        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_summary_is_last_and_counters_sum_to_runnable() {
        let sink = run_class(
            ClassSpec::new("Mixed")
                .constructs(|| Ok(()))
                .test("testA", |_: &mut ()| Ok(true))
                .test("testB", |_: &mut ()| Ok(false))
                .test("testC", |_: &mut ()| Err(anyhow!("x")))
                .test("helper", |_: &mut ()| Ok(true))
                .method("testBroken", 2, Visibility::Public, MethodBody::Opaque),
        );

        let events = sink.events();
        assert!(matches!(events.last(), Some(SinkEvent::AllFinished(..))));
        let (s, f, x) = sink.summary().unwrap();
        // 3 runnable operations; helper is ignored, testBroken warned.
        assert_eq!(s + f + x, 3);
        assert_eq!((s, f, x), (1, 1, 1));
    }

    #[test]
    fn test_start_observed_before_finish_per_operation() {
        let sink = run_class(
            ClassSpec::new("Ordering")
                .constructs(|| Ok(()))
                .test("testOne", |_: &mut ()| Ok(true))
                .test("testTwo", |_: &mut ()| Ok(true))
                .test("testThree", |_: &mut ()| Ok(false)),
        );

        for name in ["testOne", "testTwo", "testThree"] {
            let events = sink.events_for(name);
            assert!(
                matches!(events.first(), Some(SinkEvent::Start(_))),
                "{name} must start before finishing"
            );
            assert_eq!(events.len(), 2, "{name} finishes exactly once");
        }
    }

    #[test]
    fn test_class_with_no_operations_still_summarizes() {
        let sink = run_class(ClassSpec::new("Empty").constructs(|| Ok(())));
        assert_eq!(sink.events(), vec![SinkEvent::AllFinished(0, 0, 0)]);
    }

    #[test]
    fn test_panicking_body_surfaces_as_harness_error() {
        let sink = run_class(
            ClassSpec::new("Panics")
                .constructs(|| Ok(()))
                .test("testPanics", |_: &mut ()| panic!("unexpected"))
                .test("testFine", |_: &mut ()| Ok(true)),
        );

        // The run still terminates, the healthy test is still counted, and
        // the summary stays last.
        let events = sink.events();
        assert!(matches!(events.last(), Some(SinkEvent::AllFinished(..))));
        assert!(events
            .iter()
            .any(|e| matches!(e, SinkEvent::HarnessError(_))));
        let (s, _, _) = sink.summary().unwrap();
        assert_eq!(s, 1);
    }
}
