use std::{
    fmt::{self, Display, Formatter},
    sync::{Mutex, PoisonError},
};

use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

use crate::{Shared, argument::ArgumentSet};

/// One named argument error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// All errors recorded by a validation run, surfaced as one failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("Validation failed: {}", .0.iter().join("; "))]
#[diagnostic(code(stageql::mutation::validation))]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }
}

/// Mutable state threaded through the argument validators of one invocation.
#[derive(Debug)]
pub struct ArgumentValidationContext<'a> {
    mutation: &'a str,
    arguments: ArgumentSet,
    errors: Vec<ValidationError>,
}

impl<'a> ArgumentValidationContext<'a> {
    pub(crate) fn new(mutation: &'a str, arguments: ArgumentSet) -> Self {
        Self {
            mutation,
            arguments,
            errors: Vec::new(),
        }
    }

    pub fn mutation(&self) -> &str {
        self.mutation
    }

    pub fn arguments(&self) -> &ArgumentSet {
        &self.arguments
    }

    /// Replaces the argument instance passed to the procedure.
    pub fn set_arguments(&mut self, arguments: ArgumentSet) {
        self.arguments = arguments;
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(ValidationError::new(message));
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub(crate) fn finish(self) -> Result<ArgumentSet, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(self.arguments)
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

/// An argument validation step.
pub type ArgumentValidator = Shared<dyn Fn(&mut ArgumentValidationContext<'_>) + Send + Sync>;

/// Error sink handed to procedures that declare a validator parameter.
///
/// Clones share the same error list.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    errors: Shared<Mutex<Vec<ValidationError>>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&self, message: impl Into<String>) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ValidationError::new(message));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    pub fn errors(&self) -> Vec<ValidationError> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn into_result(self) -> Result<(), ValidationErrors> {
        let errors = self.errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}
