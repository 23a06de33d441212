//! JUnit XML Sink for CI Integration
//!
//! Buffers per-test results as they arrive from concurrent workers and
//! writes a JUnit-compatible XML report for Jenkins, GitLab CI, and GitHub
//! Actions when the terminal summary fires.

use crate::sink::ResultSink;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

// =============================================================================
// XML Schema Structs (JUnit Format)
// =============================================================================

#[derive(Serialize)]
#[serde(rename = "testsuites")]
struct TestSuites {
    #[serde(rename = "testsuite")]
    suites: Vec<TestSuite>,
}

#[derive(Serialize)]
struct TestSuite {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@errors")]
    errors: usize,
    #[serde(rename = "@skipped")]
    skipped: usize,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(rename = "testcase")]
    cases: Vec<TestCase>,
}

#[derive(Serialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname")]
    classname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<Skipped>,
}

#[derive(Serialize)]
struct Failure {
    #[serde(rename = "@message")]
    message: String,
}

#[derive(Serialize)]
struct Skipped {
    #[serde(rename = "@message")]
    message: String,
}

// =============================================================================
// JunitSink
// =============================================================================

/// Accumulated state of one run; a single lock keeps case order stable.
#[derive(Default)]
struct Buffer {
    cases: Vec<TestCase>,
    harness_errors: usize,
}

/// Sink that buffers results and writes JUnit XML on completion.
///
/// Warnings (malformed operations) map to skipped cases; harness errors
/// feed the suite's `errors` counter.
pub struct JunitSink {
    output_path: PathBuf,
    classname: String,
    buffer: Mutex<Buffer>,
    start_time: Instant,
}

impl JunitSink {
    pub fn new(path: PathBuf, classname: &str) -> Self {
        Self {
            output_path: path,
            classname: classname.to_string(),
            buffer: Mutex::new(Buffer::default()),
            start_time: Instant::now(),
        }
    }

    fn write_report(&self, suite: TestSuite) {
        let root = TestSuites {
            suites: vec![suite],
        };

        match File::create(&self.output_path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                let _ = writer.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
                match quick_xml::se::to_string(&root) {
                    Ok(xml) => {
                        if let Err(e) = writer.write_all(xml.as_bytes()) {
                            eprintln!("[crucible] Failed to write JUnit report: {}", e);
                        } else {
                            eprintln!(
                                "[crucible] JUnit report written to {}",
                                self.output_path.display()
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("[crucible] Failed to serialize JUnit report: {}", e);
                    }
                }
            }
            Err(e) => {
                eprintln!("[crucible] Failed to create JUnit report: {}", e);
            }
        }
    }
}

impl ResultSink for JunitSink {
    fn on_test_start(&self, _name: &str) {
        // JUnit has no start event; results are buffered on finish.
    }

    fn on_test_warning(&self, name: &str, reason: &str) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.cases.push(TestCase {
            name: name.to_string(),
            classname: self.classname.clone(),
            failure: None,
            skipped: Some(Skipped {
                message: reason.to_string(),
            }),
        });
    }

    fn on_test_finished(&self, name: &str, success: bool) {
        let mut buffer = self.buffer.lock().unwrap();
        let failure = if success {
            None
        } else {
            Some(Failure {
                message: "Test failed".to_string(),
            })
        };
        buffer.cases.push(TestCase {
            name: name.to_string(),
            classname: self.classname.clone(),
            failure,
            skipped: None,
        });
    }

    fn on_test_finished_with_cause(&self, name: &str, _success: bool, cause: &anyhow::Error) {
        // The plain finished event already buffered the case; attach the
        // cause to it.
        let mut buffer = self.buffer.lock().unwrap();
        if let Some(case) = buffer
            .cases
            .iter_mut()
            .rev()
            .find(|c| c.name == name && c.failure.is_some())
        {
            case.failure = Some(Failure {
                message: format!("{:#}", cause),
            });
        }
    }

    fn on_all_tests_finished(
        &self,
        successes: usize,
        failed_without_exception: usize,
        failed_with_exception: usize,
    ) {
        let mut buffer = self.buffer.lock().unwrap();
        let cases = std::mem::take(&mut buffer.cases);
        let skipped = cases.iter().filter(|c| c.skipped.is_some()).count();
        let suite = TestSuite {
            name: self.classname.clone(),
            tests: successes + failed_without_exception + failed_with_exception + skipped,
            failures: failed_without_exception + failed_with_exception,
            errors: buffer.harness_errors,
            skipped,
            time: self.start_time.elapsed().as_millis() as f64 / 1000.0,
            cases,
        };
        drop(buffer);
        self.write_report(suite);
    }

    fn on_harness_error(&self, _cause: &anyhow::Error) {
        self.buffer.lock().unwrap().harness_errors += 1;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
