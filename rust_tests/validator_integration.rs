//! Construction error table through the public Engine API

use crucible_core::engine::Engine;
use crucible_core::registry::{ClassSpec, Registry, Visibility};
use crucible_core::sink::NullSink;
use crucible_core::validator::ConstructionError;
use std::sync::Arc;

fn sample_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(
        ClassSpec::new("TestNoImplement")
            .without_capability()
            .constructs(|| Ok(())),
    );
    registry.register(ClassSpec::new("TestConstructorParameter").constructor(
        Visibility::Public,
        1,
        Arc::new(|| Ok(Box::new(()) as crucible_core::registry::Instance)),
    ));
    registry.register(ClassSpec::new("TestNonPublicConstructor").constructor(
        Visibility::Private,
        0,
        Arc::new(|| Ok(Box::new(()) as crucible_core::registry::Instance)),
    ));
    registry.register(
        ClassSpec::new("TestValidConstructor")
            .constructs(|| Ok(()))
            .test("testSuccess", |_: &mut ()| Ok(true)),
    );
    registry
}

fn construct(class: &str) -> Result<Engine, ConstructionError> {
    Engine::new(&sample_registry(), class, Arc::new(NullSink))
}

#[test]
fn test_unknown_class_yields_class_not_found() {
    match construct("TestDontExist") {
        Err(ConstructionError::ClassNotFound { name }) => assert_eq!(name, "TestDontExist"),
        _ => panic!("expected ClassNotFound"),
    }
}

#[test]
fn test_missing_capability_yields_invalid_format() {
    match construct("TestNoImplement") {
        Err(ConstructionError::InvalidFormat { reason }) => {
            assert!(reason.contains("TestClass capability"));
        }
        _ => panic!("expected InvalidFormat"),
    }
}

#[test]
fn test_parameterized_constructor_yields_invalid_format() {
    match construct("TestConstructorParameter") {
        Err(ConstructionError::InvalidFormat { reason }) => {
            assert!(reason.contains("public with no parameters"));
        }
        _ => panic!("expected InvalidFormat"),
    }
}

#[test]
fn test_non_public_constructor_yields_invalid_format() {
    assert!(matches!(
        construct("TestNonPublicConstructor"),
        Err(ConstructionError::InvalidFormat { .. })
    ));
}

#[test]
fn test_valid_constructor_is_accepted() {
    let engine = construct("TestValidConstructor").expect("valid class must construct");
    assert_eq!(engine.class_name(), "TestValidConstructor");
}

#[test]
fn test_construction_errors_are_displayable() {
    let not_found = construct("TestDontExist").unwrap_err();
    assert!(not_found.to_string().contains("no such class"));

    let invalid = construct("TestNoImplement").unwrap_err();
    assert!(invalid.to_string().contains("invalid test class format"));
}
