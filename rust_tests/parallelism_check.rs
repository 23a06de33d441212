//! Wall-clock check that runnable tests really execute in parallel on the
//! bounded pool, not sequentially.

use crucible_core::engine::Engine;
use crucible_core::registry::{ClassSpec, Registry};
use crucible_core::sink::RecordingSink;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_MS: u64 = 150;
const TESTS: usize = 6;

fn sleepy_class() -> ClassSpec {
    let mut spec = ClassSpec::new("Sleepy").constructs(|| Ok(()));
    for i in 0..TESTS {
        spec = spec.test(&format!("testSleep{}", i), |_: &mut ()| {
            thread::sleep(Duration::from_millis(SLEEP_MS));
            Ok(true)
        });
    }
    spec
}

fn timed_run(workers: usize) -> (Duration, Arc<RecordingSink>) {
    let mut registry = Registry::new();
    registry.register(sleepy_class());
    let sink = Arc::new(RecordingSink::new());
    let engine = Engine::new(&registry, "Sleepy", sink.clone())
        .expect("class should validate")
        .with_workers(workers);

    let start = Instant::now();
    engine.run();
    (start.elapsed(), sink)
}

#[test]
fn test_six_sleeping_tests_finish_in_one_wave_on_default_pool() {
    let (elapsed, sink) = timed_run(TESTS);

    assert_eq!(sink.summary(), Some((TESTS, 0, 0)));

    // Sequential execution would need TESTS * SLEEP_MS (900ms). One wave on
    // a pool of six needs ~SLEEP_MS; allow generous scheduling slack.
    let sequential = Duration::from_millis(SLEEP_MS * TESTS as u64);
    assert!(
        elapsed < sequential / 2,
        "expected parallel execution, took {:?} of a {:?} sequential budget",
        elapsed,
        sequential
    );
}

#[test]
fn test_pool_size_bounds_concurrency() {
    // With half the workers the same load needs at least two waves.
    let (elapsed, sink) = timed_run(TESTS / 2);

    assert_eq!(sink.summary(), Some((TESTS, 0, 0)));
    assert!(
        elapsed >= Duration::from_millis(SLEEP_MS * 2),
        "three workers cannot finish six sleeps in a single wave, took {:?}",
        elapsed
    );
}

#[test]
fn test_single_worker_serializes_execution() {
    let (elapsed, sink) = timed_run(1);

    assert_eq!(sink.summary(), Some((TESTS, 0, 0)));
    assert!(
        elapsed >= Duration::from_millis(SLEEP_MS * TESTS as u64),
        "one worker must run the sleeps back to back, took {:?}",
        elapsed
    );
}
