use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use anyhow::{bail, Result};

use super::{error::RuntimeError, natives, value::Value};

/// Resource caps carried by every environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Upper bound on live bindings, shadowed ones included.
    pub max_bindings: usize,
    /// Loop bodies a single `while`/`for` may run.
    pub max_iterations: usize,
    /// Number of recent results kept on the trace.
    pub trace_depth: usize,
    /// Nested function calls allowed before evaluation is aborted.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_bindings: 10_000,
            max_iterations: 5_000,
            trace_depth: 256,
            max_call_depth: 128,
        }
    }
}

#[derive(Debug)]
struct Binding {
    value: Value,
    limit: Option<u64>,
    constant: bool,
}

/// A single flat scope. Every name maps to a stack of bindings; the top one
/// is visible and removing it uncovers the previous one.
#[derive(Debug)]
pub struct Environment {
    store: HashMap<String, Vec<Binding>>,
    live: usize,
    trace: VecDeque<Value>,
    calls: usize,
    limits: Limits,
}

pub fn produce_environment(limits: Limits) -> Rc<RefCell<Environment>> {
    Rc::new(RefCell::new(Environment::new(limits)))
}

impl Environment {
    /// An environment holding the native globals and functions.
    pub fn new(limits: Limits) -> Self {
        let mut env = Self::empty(limits);
        natives::register(&mut env);
        env
    }

    pub fn empty(limits: Limits) -> Self {
        Self {
            store: HashMap::new(),
            live: 0,
            trace: VecDeque::new(),
            calls: 0,
            limits,
        }
    }

    pub fn assign(
        &mut self,
        name: &str,
        value: Value,
        is_const: bool,
        is_ref: bool,
        limit: Option<u64>,
    ) -> Result<Value> {
        if self.live >= self.limits.max_bindings {
            tracing::debug!(name, live = self.live, "binding cap reached");
            bail!(RuntimeError::Resource(format!(
                "cannot bind \"{name}\", the limit of {} live bindings is reached",
                self.limits.max_bindings
            )));
        }
        if self.is_constant(name) {
            bail!(RuntimeError::Type(format!(
                "cannot assign to constant \"{name}\""
            )));
        }

        let value = if is_ref { value } else { value.deep_copy() };
        self.store.entry(name.to_string()).or_default().push(Binding {
            value: value.clone(),
            limit,
            constant: is_const,
        });
        self.live += 1;
        tracing::trace!(name, is_const, is_ref, ?limit, "assign");

        Ok(value)
    }

    pub fn read(&mut self, name: &str) -> Result<Value> {
        let Some(stack) = self.store.get_mut(name) else {
            bail!(unbound(name));
        };
        let Some(binding) = stack.last_mut() else {
            bail!(unbound(name));
        };

        let value = binding.value.clone();
        let exhausted = match binding.limit.as_mut() {
            Some(limit) => {
                *limit = limit.saturating_sub(1);
                *limit == 0
            }
            None => false,
        };
        if exhausted {
            tracing::trace!(name, "access limit exhausted");
            self.remove(name);
        }

        Ok(value)
    }

    /// Removes the top binding of `name` and returns its value.
    pub fn unsign(&mut self, name: &str) -> Result<Value> {
        match self.remove(name) {
            Some(value) => {
                tracing::trace!(name, "unsign");
                Ok(value)
            }
            None => bail!(unbound(name)),
        }
    }

    /// Remaining reads of `name`; unlimited bindings report infinity.
    pub fn lifetime(&self, name: &str) -> Result<f64> {
        match self.top(name) {
            Some(binding) => Ok(binding.limit.map_or(f64::INFINITY, |limit| limit as f64)),
            None => bail!(unbound(name)),
        }
    }

    /// Height of the binding stack of `name`, zero when unbound.
    pub fn depth(&self, name: &str) -> usize {
        self.store.get(name).map_or(0, Vec::len)
    }

    /// Drops the bindings of `name` above `depth`. Bindings below it are
    /// left alone even if some were unsigned in the meantime.
    pub fn truncate(&mut self, name: &str, depth: usize) {
        while self.depth(name) > depth {
            self.remove(name);
        }
    }

    pub fn enter_call(&mut self) -> Result<()> {
        if self.calls >= self.limits.max_call_depth {
            tracing::debug!(calls = self.calls, "call depth exhausted");
            bail!(RuntimeError::Resource(format!(
                "call depth exceeded {} nested calls",
                self.limits.max_call_depth
            )));
        }
        self.calls += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.calls = self.calls.saturating_sub(1);
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.top(name).is_some()
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.top(name).is_some_and(|binding| binding.constant)
    }

    pub fn binding_count(&self) -> usize {
        self.live
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn push_trace(&mut self, value: &Value) {
        self.trace.push_front(value.clone());
        self.trace.truncate(self.limits.trace_depth);
    }

    /// The most recent results, newest first.
    pub fn trace(&self) -> Vec<Value> {
        self.trace.iter().cloned().collect()
    }

    fn top(&self, name: &str) -> Option<&Binding> {
        self.store.get(name).and_then(|stack| stack.last())
    }

    fn remove(&mut self, name: &str) -> Option<Value> {
        let stack = self.store.get_mut(name)?;
        let binding = stack.pop()?;
        if stack.is_empty() {
            self.store.remove(name);
        }
        self.live -= 1;
        Some(binding.value)
    }
}

fn unbound(name: &str) -> RuntimeError {
    RuntimeError::Reference(format!("\"{name}\" is not bound"))
}

impl Clone for Environment {
    fn clone(&self) -> Self {
        let store = self
            .store
            .iter()
            .map(|(name, stack)| {
                let stack = stack
                    .iter()
                    .map(|binding| Binding {
                        value: binding.value.deep_copy(),
                        limit: binding.limit,
                        constant: binding.constant,
                    })
                    .collect();
                (name.clone(), stack)
            })
            .collect();

        Self {
            store,
            live: self.live,
            trace: self.trace.iter().map(Value::deep_copy).collect(),
            calls: self.calls,
            limits: self.limits,
        }
    }
}
