//! Mutation declaration and invocation.
//!
//! A [`MutationDescriptor`] is built once from a [`MutationBuilder`] and
//! immutable afterwards. Each invocation binds request arguments into one
//! argument instance, assembles the procedure's positional parameters,
//! runs argument validators and calls the procedure.

mod procedure;
mod validation;

use std::fmt;

use smol_str::SmolStr;
use tracing::debug;

use crate::{
    Shared,
    argument::{ArgKind, ArgType, ArgumentBinding, ArgumentSet, InputShape, RequestArguments, Variables},
    capability::{Capability, CapabilityProvider, Instance},
    error::{CompileError, MutationError},
    schema::{FieldNamer, TypeRegistry},
    shape::Shape,
};

pub use procedure::{CallArg, CallArgs, Invocation, InvocationResult, Procedure, ProcedureParam};
pub use validation::{ArgumentValidationContext, ArgumentValidator, ValidationError, ValidationErrors, Validator};

type InstanceFactory = Shared<dyn Fn() -> Instance + Send + Sync>;

/// Declaration of a mutation.
pub struct MutationBuilder {
    name: SmolStr,
    description: Option<SmolStr>,
    deprecation: Option<SmolStr>,
    returns: Shape,
    params: Vec<ProcedureParam>,
    argument_shape: Option<InputShape>,
    ignored: Vec<SmolStr>,
    validators: Vec<ArgumentValidator>,
    procedure: Procedure,
    instance: Option<Instance>,
    factory: Option<InstanceFactory>,
}

impl MutationBuilder {
    pub fn new(name: impl Into<SmolStr>, procedure: Procedure) -> Self {
        Self {
            name: name.into(),
            description: None,
            deprecation: None,
            returns: Shape::Any,
            params: Vec::new(),
            argument_shape: None,
            ignored: Vec::new(),
            validators: Vec::new(),
            procedure,
            instance: None,
            factory: None,
        }
    }

    pub fn description(mut self, description: impl Into<SmolStr>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn deprecate(mut self, reason: impl Into<SmolStr>) -> Self {
        self.deprecation = Some(reason.into());
        self
    }

    /// Result shape; a list shape makes the mutation return a list.
    pub fn returns(mut self, shape: Shape) -> Self {
        self.returns = shape;
        self
    }

    /// Appends a procedure parameter. Parameters are passed in the order added.
    pub fn param(mut self, param: ProcedureParam) -> Self {
        self.params.push(param);
        self
    }

    /// Shape of the arguments parameter. Field names are member names; the
    /// schema names are produced by the field namer at build time.
    pub fn arguments(mut self, shape: InputShape) -> Self {
        self.argument_shape = Some(shape);
        self
    }

    /// Excludes a member of the argument shape from the schema arguments.
    pub fn ignore(mut self, member: impl Into<SmolStr>) -> Self {
        self.ignored.push(member.into());
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&mut ArgumentValidationContext<'_>) + Send + Sync + 'static,
    {
        self.validators.push(Shared::new(validator));
        self
    }

    /// Uses `instance` as the declaring-type instance for every call.
    pub fn instance<T: Send + Sync + 'static>(mut self, instance: T) -> Self {
        self.instance = Some(Shared::new(instance));
        self
    }

    /// Default-constructs the declaring type when no instance is bound or provided.
    pub fn default_instance<T: Default + Send + Sync + 'static>(mut self) -> Self {
        self.factory = Some(Shared::new(|| Shared::new(T::default()) as Instance));
        self
    }

    pub fn build(
        self,
        registry: &mut dyn TypeRegistry,
        namer: FieldNamer,
        auto_add_input_types: bool,
    ) -> Result<MutationDescriptor, CompileError> {
        let invalid = |reason: &str| CompileError::InvalidMutation {
            mutation: self.name.clone(),
            reason: reason.into(),
        };

        match (
            self.params.iter().filter(|p| **p == ProcedureParam::Arguments).count(),
            self.argument_shape.is_some(),
        ) {
            (0, true) => return Err(invalid("an argument shape is declared but no parameter receives it")),
            (1, false) => return Err(invalid("the arguments parameter has no declared argument shape")),
            (n, _) if n > 1 => return Err(invalid("only one parameter may receive the arguments")),
            _ => {}
        }

        if let (Some(instance), declaring) = (&self.instance, self.procedure.declaring())
            && !declaring.matches(instance)
        {
            return Err(invalid("the bound instance does not match the declaring type"));
        }

        let arguments = self
            .argument_shape
            .iter()
            .flat_map(|shape| shape.fields())
            .filter(|field| !self.ignored.contains(&field.member))
            .map(|field| {
                if auto_add_input_types {
                    register_input_types(registry, &field.ty);
                }
                ArgumentBinding::new(namer(&field.member), field.ty.clone()).with_member(field.member.clone())
            })
            .collect();

        Ok(MutationDescriptor {
            name: self.name,
            description: self.description,
            deprecation: self.deprecation,
            returns: self.returns,
            params: self.params,
            has_arguments: self.argument_shape.is_some(),
            arguments,
            validators: self.validators,
            procedure: self.procedure,
            instance: self.instance,
            factory: self.factory,
        })
    }
}

fn register_input_types(registry: &mut dyn TypeRegistry, ty: &ArgType) {
    match ty.kind() {
        ArgKind::List(item) => register_input_types(registry, item),
        ArgKind::Input(shape) if !registry.has_type(shape.name()) => {
            registry.add_input_type(Shared::clone(shape));
            for field in shape.fields() {
                register_input_types(registry, &field.ty);
            }
        }
        _ => {}
    }
}

/// An immutable mutation declaration.
pub struct MutationDescriptor {
    name: SmolStr,
    description: Option<SmolStr>,
    deprecation: Option<SmolStr>,
    returns: Shape,
    params: Vec<ProcedureParam>,
    has_arguments: bool,
    arguments: Vec<ArgumentBinding>,
    validators: Vec<ArgumentValidator>,
    procedure: Procedure,
    instance: Option<Instance>,
    factory: Option<InstanceFactory>,
}

impl MutationDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation.is_some()
    }

    pub fn deprecation_reason(&self) -> Option<&str> {
        self.deprecation.as_deref()
    }

    pub fn returns(&self) -> &Shape {
        &self.returns
    }

    pub fn returns_list(&self) -> bool {
        self.returns.is_list()
    }

    pub fn params(&self) -> &[ProcedureParam] {
        &self.params
    }

    /// Schema arguments, named through the field namer.
    pub fn arguments(&self) -> &[ArgumentBinding] {
        &self.arguments
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    /// Invokes the procedure.
    ///
    /// Without a context there is nothing to mutate and the invocation yields
    /// no result. Validation failures and unresolved capabilities are reported
    /// before the procedure runs.
    pub fn invoke(
        &self,
        context: Option<Instance>,
        request: &RequestArguments,
        validator: Validator,
        provider: Option<&dyn CapabilityProvider>,
        variables: Option<&Variables>,
    ) -> Invocation {
        let Some(context) = context else {
            debug!(mutation = %self.name, "no context, skipping invocation");
            return Invocation::Ready(Ok(None));
        };

        match self.prepare(context, request, validator, provider, variables) {
            Ok((instance, args)) => {
                debug!(
                    mutation = %self.name,
                    args = args.len(),
                    is_async = self.procedure.is_async(),
                    "invoking mutation"
                );
                self.procedure.call(instance, args)
            }
            Err(err) => {
                debug!(mutation = %self.name, error = %err, "mutation rejected before invocation");
                Invocation::Ready(Err(err))
            }
        }
    }

    fn prepare(
        &self,
        context: Instance,
        request: &RequestArguments,
        validator: Validator,
        provider: Option<&dyn CapabilityProvider>,
        variables: Option<&Variables>,
    ) -> Result<(Instance, CallArgs), MutationError> {
        let arguments = if self.has_arguments {
            ArgumentSet::bind(&self.name, &self.arguments, request, variables)?
        } else {
            ArgumentSet::new()
        };

        let mut args = CallArgs::new(
            self.params
                .iter()
                .map(|param| match param {
                    ProcedureParam::Arguments => Ok(CallArg::Arguments(arguments.clone())),
                    ProcedureParam::Context(ty) if ty.matches(&context) => Ok(CallArg::Context(Shared::clone(&context))),
                    ProcedureParam::Validator => Ok(CallArg::Validator(validator.clone())),
                    ProcedureParam::Context(ty) => self.resolve(*ty, provider).map(CallArg::Context),
                    ProcedureParam::Capability(ty) => self.resolve(*ty, provider).map(CallArg::Capability),
                })
                .collect::<Result<Vec<_>, _>>()?,
        );

        if !self.validators.is_empty() {
            let mut ctx = ArgumentValidationContext::new(&self.name, arguments);
            for validate in &self.validators {
                validate(&mut ctx);
            }
            args.replace_arguments(&ctx.finish()?);
        }

        Ok((self.declaring_instance(provider)?, args))
    }

    fn resolve(&self, capability: Capability, provider: Option<&dyn CapabilityProvider>) -> Result<Instance, MutationError> {
        provider
            .and_then(|provider| provider.resolve(&capability))
            .ok_or_else(|| MutationError::MissingCapability {
                mutation: self.name.clone(),
                capability,
            })
    }

    fn declaring_instance(&self, provider: Option<&dyn CapabilityProvider>) -> Result<Instance, MutationError> {
        let declaring = self.procedure.declaring();
        self.instance
            .clone()
            .or_else(|| provider.and_then(|provider| provider.resolve(&declaring)))
            .or_else(|| self.factory.as_ref().map(|factory| factory()))
            .ok_or_else(|| MutationError::MissingInstance {
                mutation: self.name.clone(),
                declaring: declaring.name(),
            })
    }
}

impl fmt::Debug for MutationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationDescriptor")
            .field("name", &self.name)
            .field("returns", &self.returns)
            .field("params", &self.params)
            .field("arguments", &self.arguments)
            .field("procedure", &self.procedure)
            .finish_non_exhaustive()
    }
}
