use std::{
    any::Any,
    fmt,
    future::{Future, IntoFuture},
};

use futures::{FutureExt, TryFutureExt, future::BoxFuture};

use super::validation::Validator;
use crate::{
    BoxError, Shared,
    argument::ArgumentSet,
    capability::{Capability, Instance},
    error::MutationError,
    value::Value,
};

/// One declared parameter of a mutation procedure, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureParam {
    /// Receives the bound argument instance.
    Arguments,
    /// Receives the request context when its type matches.
    Context(Capability),
    /// Receives the [`Validator`] of the invocation.
    Validator,
    /// Resolved by type from the capability provider.
    Capability(Capability),
}

impl ProcedureParam {
    pub fn context<T: Send + Sync + 'static>() -> Self {
        ProcedureParam::Context(Capability::of::<T>())
    }

    pub fn capability<T: Send + Sync + 'static>() -> Self {
        ProcedureParam::Capability(Capability::of::<T>())
    }
}

/// A value assembled for one procedure parameter.
#[derive(Clone)]
pub enum CallArg {
    Arguments(ArgumentSet),
    Context(Instance),
    Validator(Validator),
    Capability(Instance),
}

impl fmt::Debug for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Arguments(arguments) => f.debug_tuple("Arguments").field(arguments).finish(),
            CallArg::Context(_) => f.write_str("Context(..)"),
            CallArg::Validator(validator) => f.debug_tuple("Validator").field(validator).finish(),
            CallArg::Capability(_) => f.write_str("Capability(..)"),
        }
    }
}

/// Positional call arguments of a procedure invocation.
#[derive(Debug, Clone, Default)]
pub struct CallArgs(Vec<CallArg>);

impl CallArgs {
    pub(crate) fn new(args: Vec<CallArg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CallArg> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallArg> {
        self.0.iter()
    }

    pub fn arguments(&self) -> Option<&ArgumentSet> {
        self.0.iter().find_map(|arg| match arg {
            CallArg::Arguments(arguments) => Some(arguments),
            _ => None,
        })
    }

    pub fn context<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.0.iter().find_map(|arg| match arg {
            CallArg::Context(instance) => instance.downcast_ref::<T>(),
            _ => None,
        })
    }

    pub fn validator(&self) -> Option<&Validator> {
        self.0.iter().find_map(|arg| match arg {
            CallArg::Validator(validator) => Some(validator),
            _ => None,
        })
    }

    pub fn capability<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.0.iter().find_map(|arg| match arg {
            CallArg::Capability(instance) => instance.downcast_ref::<T>(),
            _ => None,
        })
    }

    pub(crate) fn replace_arguments(&mut self, arguments: &ArgumentSet) {
        for arg in &mut self.0 {
            if let CallArg::Arguments(slot) = arg {
                *slot = arguments.clone();
            }
        }
    }
}

type SyncFn = dyn Fn(&(dyn Any + Send + Sync), CallArgs) -> Result<Value, BoxError> + Send + Sync;
type AsyncFn = dyn Fn(Instance, CallArgs) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;

/// A mutation procedure and its execution mode, fixed at registration.
#[derive(Clone)]
pub enum Procedure {
    Sync { declaring: Capability, call: Shared<SyncFn> },
    Async { declaring: Capability, call: Shared<AsyncFn> },
}

impl Procedure {
    /// A synchronous procedure declared on `T`.
    pub fn sync<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, CallArgs) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let declaring = Capability::of::<T>();
        let call = move |instance: &(dyn Any + Send + Sync), args: CallArgs| match instance.downcast_ref::<T>() {
            Some(instance) => f(instance, args),
            None => Err(format!("expected an instance of `{declaring}`").into()),
        };
        Procedure::Sync {
            declaring,
            call: Shared::new(call),
        }
    }

    /// An asynchronous procedure declared on `T`.
    pub fn asynchronous<T, F, Fut>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Shared<T>, CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let declaring = Capability::of::<T>();
        let call = move |instance: Instance, args: CallArgs| match instance.downcast::<T>() {
            Ok(instance) => f(instance, args).boxed(),
            Err(_) => futures::future::ready(Err(format!("expected an instance of `{declaring}`").into())).boxed(),
        };
        Procedure::Async {
            declaring,
            call: Shared::new(call),
        }
    }

    pub fn declaring(&self) -> Capability {
        match self {
            Procedure::Sync { declaring, .. } | Procedure::Async { declaring, .. } => *declaring,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Procedure::Async { .. })
    }

    pub(crate) fn call(&self, instance: Instance, args: CallArgs) -> Invocation {
        match self {
            // The procedure's own error is surfaced as-is.
            Procedure::Sync { call, .. } => Invocation::Ready(
                call(instance.as_ref(), args)
                    .map(Some)
                    .map_err(MutationError::Procedure),
            ),
            Procedure::Async { call, .. } => {
                Invocation::Pending(call(instance, args).map_ok(Some).map_err(MutationError::Procedure).boxed())
            }
        }
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_async() { "Async" } else { "Sync" };
        f.debug_struct(mode).field("declaring", &self.declaring()).finish_non_exhaustive()
    }
}

pub type InvocationResult = Result<Option<Value>, MutationError>;

/// Outcome of starting a mutation invocation.
///
/// Synchronous procedures (and invocations that fail before reaching the
/// procedure) complete immediately; asynchronous ones are pending until
/// awaited.
pub enum Invocation {
    Ready(InvocationResult),
    Pending(BoxFuture<'static, InvocationResult>),
}

impl Invocation {
    /// The result, when the invocation has already completed.
    pub fn ready(self) -> Option<InvocationResult> {
        match self {
            Invocation::Ready(result) => Some(result),
            Invocation::Pending(_) => None,
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Invocation::Pending(_) => f.write_str("Pending"),
        }
    }
}

impl IntoFuture for Invocation {
    type Output = InvocationResult;

    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Invocation::Ready(result) => futures::future::ready(result).boxed(),
            Invocation::Pending(future) => future,
        }
    }
}
