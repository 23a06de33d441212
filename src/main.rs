//! Crucible CLI driver
//!
//! The engine only knows a registry and a sink; this binary is the
//! surrounding collaborator that builds a registry of example test
//! classes, wires the configured sinks, and maps the final tally to an
//! exit code.

use anyhow::{anyhow, Result};
use clap::Parser;
use crucible_core::config::{self, Cli, Commands, OutputFormat};
use crucible_core::engine::Engine;
use crucible_core::junit::JunitSink;
use crucible_core::registry::{ClassSpec, MethodBody, Registry, Visibility};
use crucible_core::sink::{HumanSink, JsonSink, MultiSink, ResultSink};
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

/// Terminal state of one run, captured for the exit code.
#[derive(Default)]
struct RunStatus {
    failed: Mutex<bool>,
}

impl RunStatus {
    fn is_failed(&self) -> bool {
        *self.failed.lock().unwrap()
    }

    fn mark_failed(&self) {
        *self.failed.lock().unwrap() = true;
    }
}

impl ResultSink for RunStatus {
    fn on_test_start(&self, _name: &str) {}
    fn on_test_warning(&self, _name: &str, _reason: &str) {}

    fn on_test_finished(&self, _name: &str, success: bool) {
        if !success {
            self.mark_failed();
        }
    }

    fn on_test_finished_with_cause(&self, _name: &str, _success: bool, _cause: &anyhow::Error) {}

    fn on_all_tests_finished(&self, _s: usize, failed: usize, threw: usize) {
        if failed + threw > 0 {
            self.mark_failed();
        }
    }

    fn on_harness_error(&self, _cause: &anyhow::Error) {
        self.mark_failed();
    }
}

/// Example registrations the CLI ships with, modelled on a classic
/// showcase class: passing, failing, throwing, and malformed operations
/// plus a setUp/teardown pair.
fn demo_registry() -> Registry {
    #[derive(Default)]
    struct ShowcaseState {
        prepared: bool,
        attempts: usize,
    }

    let showcase = ClassSpec::new("Showcase")
        .constructs(|| Ok(ShowcaseState::default()))
        .hook("setUp", |s: &mut ShowcaseState| {
            s.prepared = true;
            Ok(())
        })
        .hook("teardown", |s: &mut ShowcaseState| {
            s.prepared = false;
            Ok(())
        })
        .test("testPrepared", |s: &mut ShowcaseState| Ok(s.prepared))
        .test("testArithmetic", |_: &mut ShowcaseState| Ok(2 + 2 == 4))
        .test("testAlwaysFails", |_: &mut ShowcaseState| Ok(false))
        .test("testThrows", |s: &mut ShowcaseState| {
            s.attempts += 1;
            Err(anyhow!("deliberate failure on attempt {}", s.attempts))
        })
        .method(
            "testHidden",
            0,
            Visibility::Private,
            MethodBody::Test(crucible_core::registry::wrap_test(
                "testHidden",
                |_: &mut ShowcaseState| Ok(true),
            )),
        )
        .method("testWrongReturnType", 0, Visibility::Public, MethodBody::Opaque)
        .test("helperNotATest", |_: &mut ShowcaseState| Ok(true));

    let clean = ClassSpec::new("AllGreen")
        .constructs(|| Ok(()))
        .test("testOne", |_: &mut ()| Ok(true))
        .test("testTwo", |_: &mut ()| Ok(true));

    let mut registry = Registry::new();
    registry.register(showcase);
    registry.register(clean);
    registry
}

fn run(cli: Cli) -> Result<bool> {
    let registry = demo_registry();
    let file_config = config::load_file_config(Path::new("."));
    let workers = config::effective_workers(cli.workers, &file_config);

    match cli.command {
        Commands::List => {
            for name in registry.class_names() {
                println!("{}", name);
            }
            Ok(true)
        }
        Commands::Run { class } => {
            let status = Arc::new(RunStatus::default());
            let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(status.clone())];
            match cli.format {
                OutputFormat::Human => sinks.push(Box::new(HumanSink::new())),
                OutputFormat::Json => sinks.push(Box::new(JsonSink)),
            }
            if let Some(path) = cli.junit_xml {
                sinks.push(Box::new(JunitSink::new(path, &class)));
            }
            let sink: Arc<dyn ResultSink> = Arc::new(MultiSink::new(sinks));

            let engine = Engine::new(&registry, &class, sink)?;
            engine.with_workers(workers).run();
            Ok(!status.is_failed())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            // Construction errors are the only failures surfaced outside
            // the sink; no partial run has happened at this point.
            eprintln!("[crucible] {}", e);
            ExitCode::FAILURE
        }
    }
}
