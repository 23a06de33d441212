//! Class Registration & Lookup
//!
//! Test classes declare themselves to the engine instead of being found by
//! reflection: a `ClassSpec` carries the declared constructor and operation
//! list, each with the shape metadata the validator and classifier inspect
//! (parameter count, visibility, return kind) alongside the invocable body.
//!
//! Shape metadata is deliberately independent of the closure's Rust
//! signature: a method registered with two declared parameters still holds
//! a body, it just never gets invoked. That keeps every warning path of the
//! classifier reachable from a registration.

use anyhow::{anyhow, Result};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-test state object, freshly constructed for every test invocation.
pub type Instance = Box<dyn Any + Send>;

/// Factory producing a fresh instance of the test class.
pub type ConstructorFn = Arc<dyn Fn() -> Result<Instance> + Send + Sync>;

/// Test body: `Ok(true)` passed, `Ok(false)` failed, `Err` models "threw".
pub type TestFn = Arc<dyn Fn(&mut Instance) -> Result<bool> + Send + Sync>;

/// Lifecycle hook body: `Err` is a harness malfunction, never a test result.
pub type HookFn = Arc<dyn Fn(&mut Instance) -> Result<()> + Send + Sync>;

/// Declared visibility of a constructor or method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Declared return kind of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Bool,
    Void,
    Other,
}

/// What a declared method can actually do when invoked.
///
/// The return kind of a method is derived from its body variant, so the
/// declared metadata can never disagree with what is invocable.
#[derive(Clone)]
pub enum MethodBody {
    /// Boolean-returning test body.
    Test(TestFn),
    /// Void-returning lifecycle body.
    Hook(HookFn),
    /// Declared with some other return type; never invocable.
    Opaque,
}

/// One declared operation on a test class.
#[derive(Clone)]
pub struct MethodSpec {
    pub name: String,
    pub param_count: usize,
    pub visibility: Visibility,
    pub body: MethodBody,
}

impl MethodSpec {
    pub fn return_kind(&self) -> ReturnKind {
        match self.body {
            MethodBody::Test(_) => ReturnKind::Bool,
            MethodBody::Hook(_) => ReturnKind::Void,
            MethodBody::Opaque => ReturnKind::Other,
        }
    }
}

/// One declared constructor of a test class.
#[derive(Clone)]
pub struct ConstructorSpec {
    pub visibility: Visibility,
    pub param_count: usize,
    pub construct: ConstructorFn,
}

/// A registered test class: capability marker, constructors, operations.
///
/// Declaration order is the order of the builder calls; the validator only
/// ever looks at the first declared constructor, and the engine walks
/// operations in declaration order.
#[derive(Clone)]
pub struct ClassSpec {
    name: String,
    implements_test_class: bool,
    constructors: Vec<ConstructorSpec>,
    methods: Vec<MethodSpec>,
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            implements_test_class: true,
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Drop the TestClass capability marker (the registration exists but the
    /// type does not satisfy the contract).
    pub fn without_capability(mut self) -> Self {
        self.implements_test_class = false;
        self
    }

    /// Declare a constructor with explicit shape metadata.
    pub fn constructor(
        mut self,
        visibility: Visibility,
        param_count: usize,
        construct: ConstructorFn,
    ) -> Self {
        self.constructors.push(ConstructorSpec {
            visibility,
            param_count,
            construct,
        });
        self
    }

    /// Declare the common case: a public zero-parameter constructor wrapping
    /// a typed state factory.
    pub fn constructs<T, F>(self, factory: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        self.constructor(
            Visibility::Public,
            0,
            Arc::new(move || factory().map(|state| Box::new(state) as Instance)),
        )
    }

    /// Declare an operation with explicit shape metadata.
    pub fn method(
        mut self,
        name: &str,
        param_count: usize,
        visibility: Visibility,
        body: MethodBody,
    ) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            param_count,
            visibility,
            body,
        });
        self
    }

    /// Declare a well-formed test operation over typed state.
    pub fn test<T, F>(self, name: &str, f: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&mut T) -> Result<bool> + Send + Sync + 'static,
    {
        let body = wrap_test(name, f);
        self.method(name, 0, Visibility::Public, MethodBody::Test(body))
    }

    /// Declare a well-formed lifecycle hook over typed state.
    pub fn hook<T, F>(self, name: &str, f: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&mut T) -> Result<()> + Send + Sync + 'static,
    {
        let body = wrap_hook(name, f);
        self.method(name, 0, Visibility::Public, MethodBody::Hook(body))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn implements_test_class(&self) -> bool {
        self.implements_test_class
    }

    pub fn constructors(&self) -> &[ConstructorSpec] {
        &self.constructors
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }
}

/// Wrap a typed test body into the type-erased invocable form.
pub fn wrap_test<T, F>(name: &str, f: F) -> TestFn
where
    T: Send + 'static,
    F: Fn(&mut T) -> Result<bool> + Send + Sync + 'static,
{
    let name = name.to_string();
    Arc::new(move |instance: &mut Instance| {
        let state = instance
            .downcast_mut::<T>()
            .ok_or_else(|| anyhow!("instance type mismatch invoking {}", name))?;
        f(state)
    })
}

/// Wrap a typed hook body into the type-erased invocable form.
pub fn wrap_hook<T, F>(name: &str, f: F) -> HookFn
where
    T: Send + 'static,
    F: Fn(&mut T) -> Result<()> + Send + Sync + 'static,
{
    let name = name.to_string();
    Arc::new(move |instance: &mut Instance| {
        let state = instance
            .downcast_mut::<T>()
            .ok_or_else(|| anyhow!("instance type mismatch invoking {}", name))?;
        f(state)
    })
}

/// Registry holding all registered test classes, keyed by qualified name.
#[derive(Default)]
pub struct Registry {
    classes: HashMap<String, ClassSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ClassSpec) {
        self.classes.insert(spec.name().to_string(), spec);
    }

    pub fn resolve(&self, name: &str) -> Option<&ClassSpec> {
        self.classes.get(name)
    }

    /// Registered class names, sorted for stable listings.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
