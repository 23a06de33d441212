//! Operation Classification
//!
//! Pure, stateless shape checks over declared operations. The engine walks
//! the declared list once per run and acts on the classification; nothing
//! here touches the sink or any shared state.

use crate::registry::{MethodSpec, ReturnKind, Visibility};

/// Candidate tests are named with this prefix.
pub const TEST_PREFIX: &str = "test";
/// Optional hook run before each test.
pub const SETUP_NAME: &str = "setUp";
/// Optional hook run after each test.
pub const TEARDOWN_NAME: &str = "teardown";

/// How the engine treats one declared operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Correctly shaped `test`-prefixed operation; will be executed.
    Runnable,
    /// `test`-prefixed but wrongly shaped; warned about, never executed.
    Malformed { reason: String },
    /// Not `test`-prefixed; silently skipped, no callback at all.
    Ignored,
}

/// Classify a declared operation. Pure on the declared shape.
pub fn classify(method: &MethodSpec) -> Classification {
    if !method.name.starts_with(TEST_PREFIX) {
        return Classification::Ignored;
    }
    if is_correct_shape(method, 0, ReturnKind::Bool) {
        Classification::Runnable
    } else {
        Classification::Malformed {
            reason: warning_reason(method),
        }
    }
}

/// Shape predicate shared by test classification and hook resolution.
pub fn is_correct_shape(method: &MethodSpec, param_count: usize, return_kind: ReturnKind) -> bool {
    method.param_count == param_count
        && method.visibility == Visibility::Public
        && method.return_kind() == return_kind
}

/// Why a `test`-prefixed operation will not run. Enumerates every violated
/// rule, not just the first.
pub fn warning_reason(method: &MethodSpec) -> String {
    let mut reason = String::from("Did not run: ");
    if method.param_count != 0 {
        reason.push_str("Method should have no parameters. ");
    }
    if method.visibility != Visibility::Public {
        reason.push_str("Method must be public. ");
    }
    if method.return_kind() != ReturnKind::Bool {
        reason.push_str("Method must return a boolean. ");
    }
    reason
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClassSpec, MethodBody, Visibility};

    fn methods_of(spec: &ClassSpec) -> &[MethodSpec] {
        spec.methods()
    }

    fn sample_class() -> ClassSpec {
        ClassSpec::new("Sample")
            .constructs(|| Ok(()))
            .test("testSuccess", |_: &mut ()| Ok(true))
            .hook("setUp", |_: &mut ()| Ok(()))
            .method(
                "testNonPublic",
                0,
                Visibility::Private,
                MethodBody::Test(crate::registry::wrap_test("testNonPublic", |_: &mut ()| {
                    Ok(true)
                })),
            )
            .method("testWrongReturnType", 0, Visibility::Public, MethodBody::Opaque)
            .method(
                "testParameters",
                1,
                Visibility::Public,
                MethodBody::Test(crate::registry::wrap_test("testParameters", |_: &mut ()| {
                    Ok(true)
                })),
            )
            .test("invalidName", |_: &mut ()| Ok(true))
    }

    fn classify_named(spec: &ClassSpec, name: &str) -> Classification {
        let method = methods_of(spec).iter().find(|m| m.name == name).unwrap();
        classify(method)
    }

    #[test]
    fn test_valid_test_is_runnable() {
        let spec = sample_class();
        assert_eq!(classify_named(&spec, "testSuccess"), Classification::Runnable);
    }

    #[test]
    fn test_unprefixed_is_ignored_even_if_well_shaped() {
        let spec = sample_class();
        assert_eq!(classify_named(&spec, "invalidName"), Classification::Ignored);
        assert_eq!(classify_named(&spec, "setUp"), Classification::Ignored);
    }

    #[test]
    fn test_non_public_is_malformed() {
        let spec = sample_class();
        match classify_named(&spec, "testNonPublic") {
            Classification::Malformed { reason } => {
                assert!(reason.contains("must be public"));
                assert!(!reason.contains("no parameters"));
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_return_type_is_malformed() {
        let spec = sample_class();
        match classify_named(&spec, "testWrongReturnType") {
            Classification::Malformed { reason } => {
                assert!(reason.contains("must return a boolean"));
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_parameterized_is_malformed() {
        let spec = sample_class();
        match classify_named(&spec, "testParameters") {
            Classification::Malformed { reason } => {
                assert!(reason.contains("no parameters"));
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_warning_enumerates_all_violations() {
        let method = MethodSpec {
            name: "testEverythingWrong".to_string(),
            param_count: 2,
            visibility: Visibility::Private,
            body: MethodBody::Opaque,
        };
        let reason = warning_reason(&method);
        assert!(reason.starts_with("Did not run: "));
        assert!(reason.contains("no parameters"));
        assert!(reason.contains("must be public"));
        assert!(reason.contains("must return a boolean"));
    }

    #[test]
    fn test_hook_shape_check() {
        let spec = sample_class();
        let set_up = methods_of(&spec).iter().find(|m| m.name == "setUp").unwrap();
        assert!(is_correct_shape(set_up, 0, crate::registry::ReturnKind::Void));
        assert!(!is_correct_shape(set_up, 0, crate::registry::ReturnKind::Bool));
    }
}
