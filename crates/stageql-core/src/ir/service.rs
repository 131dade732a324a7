use std::{any::Any, fmt};

use smol_str::SmolStr;

use super::Expr;
use crate::{
    BoxError, Shared,
    capability::{Capability, Instance},
    shape::Shape,
    value::Value,
};

/// Type-erased service method: receives the resolved capability instance and
/// the evaluated arguments.
pub type ServiceFn = dyn Fn(&(dyn Any + Send + Sync), &[Value]) -> Result<Value, BoxError> + Send + Sync;

/// A call into an externally resolved capability.
///
/// Expressions containing a `ServiceCall` are never evaluated in stage 1.
#[derive(Clone)]
pub struct ServiceCall {
    capability: Capability,
    method: SmolStr,
    args: Vec<Expr>,
    shape: Shape,
    resolve: Shared<ServiceFn>,
}

impl ServiceCall {
    /// Builds a call on capability `S`.
    ///
    /// ```ignore
    /// ServiceCall::new::<Ratings, _>("rating", vec![movie.member("id")], Shape::int(), |ratings, args| {
    ///     Ok(ratings.for_movie(args[0].as_i64().unwrap_or_default()).into())
    /// })
    /// ```
    pub fn new<S, F>(method: impl Into<SmolStr>, args: Vec<Expr>, shape: Shape, f: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let capability = Capability::of::<S>();
        let resolve = move |instance: &(dyn Any + Send + Sync), args: &[Value]| match instance.downcast_ref::<S>() {
            Some(service) => f(service, args),
            None => Err(format!("instance registered for `{capability}` has a different type").into()),
        };

        Self {
            capability,
            method: method.into(),
            args,
            shape,
            resolve: Shared::new(resolve),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn with_args(&self, args: Vec<Expr>) -> Self {
        Self {
            args,
            ..self.clone()
        }
    }

    pub fn call(&self, instance: &Instance, args: &[Value]) -> Result<Value, BoxError> {
        (self.resolve)(instance.as_ref(), args)
    }
}

impl fmt::Debug for ServiceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCall")
            .field("capability", &self.capability)
            .field("method", &self.method)
            .field("args", &self.args)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ServiceCall {
    fn eq(&self, other: &Self) -> bool {
        self.capability == other.capability
            && self.method == other.method
            && self.shape == other.shape
            && self.args == other.args
    }
}
