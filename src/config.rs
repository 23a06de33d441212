//! Configuration Loader
//! - Provides CLI argument parsing with clap
//! - Reads crucible.toml for engine defaults (worker pool size)

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::engine::DEFAULT_WORKERS;

// =============================================================================
// CLI Configuration
// =============================================================================

/// Output format for crucible results
#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Human-readable CLI output (to stderr)
    #[default]
    Human,
    /// Machine-readable NDJSON (to stdout)
    Json,
}

/// Crucible CLI - Minimal Concurrent Unit-Test Engine
#[derive(Parser)]
#[command(name = "crucible", version, about = "Minimal concurrent unit-test engine")]
pub struct Cli {
    /// Output format (also: CRUCIBLE_FORMAT env var)
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, env = "CRUCIBLE_FORMAT")]
    pub format: OutputFormat,

    /// Path to generate JUnit XML report (also: CRUCIBLE_JUNIT_XML env var)
    #[arg(long, env = "CRUCIBLE_JUNIT_XML")]
    pub junit_xml: Option<std::path::PathBuf>,

    /// Worker pool size (overrides crucible.toml and the built-in default)
    #[arg(long)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the tests of a registered test class
    Run {
        /// Qualified name of the test class
        class: String,
    },
    /// List registered test classes without running anything
    List,
}

// =============================================================================
// File Configuration
// =============================================================================

#[derive(Deserialize, Default)]
pub struct FileConfig {
    engine: Option<EngineSection>,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    workers: Option<usize>,
}

impl FileConfig {
    pub fn workers(&self) -> Option<usize> {
        self.engine.as_ref().and_then(|e| e.workers)
    }
}

/// Load engine defaults from crucible.toml in `root`, if present.
/// Parse problems are reported to stderr and treated as an absent file.
pub fn load_file_config(root: &Path) -> FileConfig {
    let config_path = root.join("crucible.toml");
    if !config_path.exists() {
        return FileConfig::default();
    }

    let contents = match fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[crucible] Failed to read crucible.toml: {}", e);
            return FileConfig::default();
        }
    };

    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[crucible] Failed to parse crucible.toml: {}", e);
            FileConfig::default()
        }
    }
}

/// Worker pool size: CLI flag over file config over the built-in default.
pub fn effective_workers(cli_workers: Option<usize>, file: &FileConfig) -> usize {
    cli_workers
        .or_else(|| file.workers())
        .unwrap_or(DEFAULT_WORKERS)
        .max(1)
}

// =============================================================================
// Unit Tests
// =============================================================================
