//! Capability Validator
//!
//! Decides, before anything executes, whether an identifier names a usable
//! test class: it must resolve in the registry, carry the TestClass
//! capability, and declare a public zero-parameter constructor. Only the
//! first declared constructor is ever considered. Nothing is instantiated
//! here.

use crate::registry::{ConstructorSpec, MethodSpec, Registry, Visibility};
use thiserror::Error;

/// The only errors surfaced by the engine's public API; everything after
/// construction flows through the result sink instead.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("no such class: {name}")]
    ClassNotFound { name: String },
    #[error("invalid test class format: {reason}")]
    InvalidFormat { reason: String },
}

/// A validated test class, owned by the engine for its lifetime.
#[derive(Clone)]
pub struct TestClassDescriptor {
    pub name: String,
    pub constructor: ConstructorSpec,
    pub methods: Vec<MethodSpec>,
}

/// Resolve and validate a class identifier against the registry.
pub fn validate(
    registry: &Registry,
    class_name: &str,
) -> Result<TestClassDescriptor, ConstructionError> {
    let spec = registry
        .resolve(class_name)
        .ok_or_else(|| ConstructionError::ClassNotFound {
            name: class_name.to_string(),
        })?;

    if !spec.implements_test_class() {
        return Err(ConstructionError::InvalidFormat {
            reason: "test class must implement the TestClass capability".to_string(),
        });
    }

    let constructor = spec.constructors().first();
    match constructor {
        Some(c) if c.param_count == 0 && c.visibility == Visibility::Public => {
            Ok(TestClassDescriptor {
                name: spec.name().to_string(),
                constructor: c.clone(),
                methods: spec.methods().to_vec(),
            })
        }
        _ => Err(ConstructionError::InvalidFormat {
            reason: "constructor must be public with no parameters".to_string(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
