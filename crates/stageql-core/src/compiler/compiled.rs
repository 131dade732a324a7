//! Compiled expression types.
//!
//! An [`Expr`] is compiled into a closure once; the closure is then run any
//! number of times against different root values and capability providers.

use std::fmt;

use crate::{
    Shared,
    capability::CapabilityProvider,
    error::ExecutionError,
    ir::{Expr, Param, ParamId},
    value::Value,
};

/// A compiled expression represented as a dynamically-dispatched closure.
///
/// The closure takes:
/// - `&Env`: placeholder bindings visible at this point
/// - `&dyn CapabilityProvider`: resolves service instances
///
/// ## Example
///
/// ```rust,ignore
/// let compiled: CompiledExpr = Box::new(|_env, _provider| Ok(Value::Int(42)));
/// assert_eq!(compiled(&Env::new(param.id(), &Value::Null), &NoCapabilities)?, Value::Int(42));
/// ```
pub type CompiledExpr = Box<dyn Fn(&Env<'_>, &dyn CapabilityProvider) -> Result<Value, ExecutionError> + Send + Sync>;

/// Placeholder bindings, chained through the stack frames of nested scopes
/// and projections.
#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    binding: (ParamId, &'a Value),
    parent: Option<&'a Env<'a>>,
}

impl<'a> Env<'a> {
    pub fn new(param: ParamId, value: &'a Value) -> Self {
        Self {
            binding: (param, value),
            parent: None,
        }
    }

    pub fn bind(&'a self, param: ParamId, value: &'a Value) -> Env<'a> {
        Env {
            binding: (param, value),
            parent: Some(self),
        }
    }

    pub fn resolve(&self, param: ParamId) -> Option<&'a Value> {
        match self.binding {
            (id, value) if id == param => Some(value),
            _ => self.parent.and_then(|parent| parent.resolve(param)),
        }
    }
}

/// A compiled expression together with the placeholder its root value binds
/// to and, optionally, the placeholder the document variables bind to.
pub struct Executable {
    param: Shared<Param>,
    variables: Option<Shared<Param>>,
    compiled: CompiledExpr,
}

impl Executable {
    pub fn new(param: Shared<Param>, expr: &Expr) -> Self {
        Self {
            compiled: super::compile::compile(expr),
            param,
            variables: None,
        }
    }

    /// Binds the document variables to `variables` on every run.
    pub fn with_variables(mut self, variables: Shared<Param>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn param(&self) -> &Shared<Param> {
        &self.param
    }

    /// Runs with no variables; variable reads yield `Null`.
    pub fn run(&self, root: &Value, provider: &dyn CapabilityProvider) -> Result<Value, ExecutionError> {
        self.run_with(root, &Value::Null, provider)
    }

    pub fn run_with(
        &self,
        root: &Value,
        variables: &Value,
        provider: &dyn CapabilityProvider,
    ) -> Result<Value, ExecutionError> {
        let env = Env::new(self.param.id(), root);
        match &self.variables {
            Some(param) => (self.compiled)(&env.bind(param.id(), variables), provider),
            None => (self.compiled)(&env, provider),
        }
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("param", &self.param.name())
            .field("variables", &self.variables.as_ref().map(|param| param.name()))
            .finish_non_exhaustive()
    }
}
