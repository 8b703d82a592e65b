//! Resolves task names to executable functions and their injected
//! dependencies (spec.md §4.3). Grounded on `task.py::FunctionFinder`
//! and `lib/dependency_provider.py`.
//!
//! Rust has no runtime reflection over a function's parameter list, so
//! the "introspect signature, look up each parameter's declared type"
//! step happens once, at registration time: each registration is a
//! closure that pulls whatever dependencies it needs out of a
//! [`DependencyProvider`] and returns a bound, zero-argument [`TaskFn`].

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};

use orion_error::{StructError, prelude::*};

use crate::error::{RuntimeError, RuntimeReason, RuntimeResult};
use crate::log_macros::*;
use crate::task::TaskFn;

/// `TypeId → value` registry vended to every registration closure.
/// Built once before compilation; read-only afterwards (spec.md §5).
#[derive(Default)]
pub struct DependencyProvider {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl DependencyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under its concrete type. Fails if a value of
    /// this exact type was already registered: the is-a relationship
    /// spec.md's ambiguity rule allows for doesn't exist between
    /// unrelated Rust types, so a second registration can only be an
    /// authoring mistake, not legitimate polymorphism.
    pub fn register<T: Any + Send + Sync>(&mut self, value: T) -> RuntimeResult<()> {
        let id = TypeId::of::<T>();
        if self.values.contains_key(&id) {
            return Err(binding_err(format!(
                "a value of type '{}' is already registered",
                std::any::type_name::<T>()
            )));
        }
        self.values.insert(id, Box::new(value));
        Ok(())
    }

    /// Looks up the value registered for `T`. Absence is fatal: every
    /// call site is a task registration declaring `T` as a required
    /// dependency, so "not found" always means a missing `register`.
    pub fn get<T: Any + Send + Sync>(&self) -> RuntimeResult<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .ok_or_else(|| {
                binding_err(format!(
                    "no value of type '{}' is registered",
                    std::any::type_name::<T>()
                ))
            })
    }
}

fn binding_err(msg: impl Into<String>) -> RuntimeError {
    StructError::from(RuntimeReason::FunctionBinding).with_detail(msg.into())
}

/// One task-name → implementation binding, registered by the binary
/// crate before compilation (the "module of top-level functions"
/// equivalent).
struct Registration {
    name: String,
    bind: Box<dyn Fn(&DependencyProvider) -> RuntimeResult<TaskFn>>,
}

/// Ordered registry of task implementations, built by the binary crate.
#[derive(Default)]
pub struct FunctionNamespace {
    registrations: Vec<Registration>,
}

impl FunctionNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`'s implementation. `bind` receives the
    /// [`DependencyProvider`] once, at bind time, and must pull out
    /// whatever it needs and return a bound [`TaskFn`].
    pub fn register(
        &mut self,
        name: impl Into<String>,
        bind: impl Fn(&DependencyProvider) -> RuntimeResult<TaskFn> + 'static,
    ) -> &mut Self {
        self.registrations.push(Registration {
            name: name.into(),
            bind: Box::new(bind),
        });
        self
    }
}

/// Resolved task name → implementation map, ready for `Task` construction.
#[derive(Default)]
pub struct FunctionFinder {
    functions: HashMap<String, TaskFn>,
}

impl FunctionFinder {
    /// Binds every registration whose name matches a task in
    /// `task_names` against `provider`, warning about unused
    /// registrations (skipping any name starting with `_`, the
    /// "deliberately unused" convention) and failing fatally if a
    /// registration's dependency resolution errors.
    pub fn bind(
        namespace: FunctionNamespace,
        provider: &DependencyProvider,
        task_names: &[String],
    ) -> RuntimeResult<Self> {
        let known: HashSet<&str> = task_names.iter().map(String::as_str).collect();
        let mut functions = HashMap::new();
        for reg in namespace.registrations {
            if !known.contains(reg.name.as_str()) {
                if !reg.name.starts_with('_') {
                    wf_warn!(conf, name = %reg.name, "registered function does not match any task name");
                }
                continue;
            }
            let task_fn = (reg.bind)(provider)?;
            functions.insert(reg.name, task_fn);
        }
        Ok(Self { functions })
    }

    /// Takes ownership of the bound implementation for `task_name`, if
    /// any (a task with no matching registration is manual-only).
    pub fn take(&mut self, task_name: &str) -> Option<TaskFn> {
        self.functions.remove(task_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting(String);

    #[test]
    fn resolves_registered_dependency() {
        let mut provider = DependencyProvider::new();
        provider.register(Greeting("hi".to_string())).unwrap();

        let mut namespace = FunctionNamespace::new();
        namespace.register("say_hi", |provider| {
            let greeting = provider.get::<Greeting>()?.0.clone();
            Ok(Box::new(move || {
                assert_eq!(greeting, "hi");
                Ok(())
            }) as TaskFn)
        });

        let mut finder = FunctionFinder::bind(namespace, &provider, &["say_hi".to_string()]).unwrap();
        let task_fn = finder.take("say_hi").unwrap();
        task_fn().unwrap();
    }

    #[test]
    fn unmatched_task_name_has_no_function() {
        let provider = DependencyProvider::new();
        let namespace = FunctionNamespace::new();
        let mut finder = FunctionFinder::bind(namespace, &provider, &["manual_task".to_string()]).unwrap();
        assert!(finder.take("manual_task").is_none());
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let provider = DependencyProvider::new();
        let mut namespace = FunctionNamespace::new();
        namespace.register("needs_greeting", |provider| {
            provider.get::<Greeting>()?;
            Ok(Box::new(|| Ok(())) as TaskFn)
        });
        let result = FunctionFinder::bind(namespace, &provider, &["needs_greeting".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_registration_of_same_type_is_rejected() {
        let mut provider = DependencyProvider::new();
        provider.register(Greeting("a".to_string())).unwrap();
        assert!(provider.register(Greeting("b".to_string())).is_err());
    }

    #[test]
    fn unused_registration_outside_underscore_is_allowed_but_unbound() {
        let provider = DependencyProvider::new();
        let mut namespace = FunctionNamespace::new();
        namespace.register("_helper", |_p| Ok(Box::new(|| Ok(())) as TaskFn));
        let mut finder = FunctionFinder::bind(namespace, &provider, &["other_task".to_string()]).unwrap();
        assert!(finder.take("_helper").is_none());
    }
}
