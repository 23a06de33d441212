//! Crucible Core Library
//!
//! A minimal concurrent unit-testing engine: test classes register their
//! operations explicitly, the engine validates their shape, runs the
//! runnable ones on a bounded worker pool, and streams results through a
//! callback sink. The binary entry point is in main.rs.

pub mod classify;
pub mod config;
pub mod engine;
pub mod junit;
pub mod registry;
pub mod sink;
pub mod validator;
