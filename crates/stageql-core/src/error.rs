use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::{BoxError, capability::Capability, mutation::ValidationErrors, shape::ScalarKind};

/// Structural failures found while building or compiling a selection tree.
///
/// These abort the whole compilation. A field that simply cannot contribute
/// to a pass is not an error.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum CompileError {
    #[error("Unknown argument \"{argument}\" on field \"{field}\"")]
    #[diagnostic(code(stageql::compile::unknown_argument))]
    UnknownArgument { field: SmolStr, argument: SmolStr },

    #[error("Missing required argument \"{argument}\" on field \"{field}\"")]
    #[diagnostic(code(stageql::compile::missing_argument))]
    MissingArgument { field: SmolStr, argument: SmolStr },

    #[error("Invalid value for argument \"{argument}\" on field \"{field}\": expected {expected}, got {found}")]
    #[diagnostic(code(stageql::compile::invalid_argument))]
    InvalidArgument {
        field: SmolStr,
        argument: SmolStr,
        expected: String,
        found: String,
    },

    #[error("Variable \"${0}\" is not defined")]
    #[diagnostic(code(stageql::compile::undefined_variable))]
    UndefinedVariable(SmolStr),

    #[error("Fragment \"{0}\" is not defined")]
    #[diagnostic(code(stageql::compile::unknown_fragment))]
    UnknownFragment(SmolStr),

    #[error("Fragment \"{0}\" spreads itself")]
    #[diagnostic(code(stageql::compile::fragment_cycle))]
    FragmentCycle(SmolStr),

    #[error("Field \"{field}\" is selected more than once in \"{parent}\"")]
    #[diagnostic(code(stageql::compile::duplicate_field))]
    DuplicateField { parent: SmolStr, field: SmolStr },

    #[error("Field \"{field}\" of type {shape} has no selectable members")]
    #[diagnostic(code(stageql::compile::not_selectable))]
    NotSelectable { field: SmolStr, shape: String },

    #[error("Requested page size {requested} on field \"{field}\" exceeds the maximum of {max}")]
    #[diagnostic(code(stageql::compile::page_size_exceeded))]
    PageSizeExceeded { field: SmolStr, requested: i64, max: usize },

    #[error("Invalid mutation \"{mutation}\": {reason}")]
    #[diagnostic(code(stageql::compile::invalid_mutation))]
    InvalidMutation { mutation: SmolStr, reason: String },

    #[error("Field \"{0}\" is not a mutation")]
    #[diagnostic(code(stageql::compile::not_a_mutation))]
    NotAMutation(SmolStr),
}

/// Failures raised while running a compiled stage.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutionError {
    #[error("No instance of capability `{0}` is available")]
    #[diagnostic(code(stageql::execution::missing_capability))]
    MissingCapability(Capability),

    #[error("Service `{capability}::{method}` failed: {source}")]
    #[diagnostic(code(stageql::execution::service))]
    Service {
        capability: Capability,
        method: SmolStr,
        #[source]
        source: BoxError,
    },

    #[error("Type mismatch in \"{operation}\": expected {expected}, got {found}")]
    #[diagnostic(code(stageql::execution::type_mismatch))]
    TypeMismatch {
        operation: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cannot convert {value} to {to}")]
    #[diagnostic(code(stageql::execution::conversion))]
    Conversion { value: String, to: ScalarKind },

    #[error("Placeholder \"${0}\" is not bound")]
    #[diagnostic(code(stageql::execution::unbound_param))]
    UnboundParam(SmolStr),
}

/// Failures raised while invoking a mutation procedure.
#[derive(Debug, Error, Diagnostic)]
pub enum MutationError {
    #[error(transparent)]
    #[diagnostic(code(stageql::mutation::arguments))]
    Arguments(#[from] CompileError),

    #[error("Mutation \"{mutation}\" requires capability `{capability}` but no instance is available")]
    #[diagnostic(code(stageql::mutation::missing_capability))]
    MissingCapability { mutation: SmolStr, capability: Capability },

    #[error("Mutation \"{mutation}\" could not obtain an instance of `{declaring}`")]
    #[diagnostic(code(stageql::mutation::missing_instance))]
    MissingInstance { mutation: SmolStr, declaring: &'static str },

    #[error(transparent)]
    #[diagnostic(code(stageql::mutation::validation))]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    #[diagnostic(code(stageql::mutation::procedure))]
    Procedure(BoxError),
}

/// Any error produced by this crate.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Mutation(#[from] MutationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        Error::Compile(CompileError::UndefinedVariable("id".into())),
        "Variable \"$id\" is not defined",
        "stageql::compile::undefined_variable"
    )]
    #[case(
        Error::Execution(ExecutionError::UnboundParam("ctx".into())),
        "Placeholder \"$ctx\" is not bound",
        "stageql::execution::unbound_param"
    )]
    #[case(
        Error::Mutation(MutationError::Procedure("boom".into())),
        "boom",
        "stageql::mutation::procedure"
    )]
    fn test_error_message_and_code(#[case] error: Error, #[case] message: &str, #[case] code: &str) {
        assert_eq!(error.to_string(), message);
        assert_eq!(error.code().map(|c| c.to_string()), Some(code.to_string()));
    }
}
