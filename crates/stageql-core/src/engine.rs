use tracing::debug;

use crate::{
    StageqlResult,
    capability::{CapabilityProvider, Instance},
    compiler::{CompiledQuery, Compiler},
    error::{CompileError, MutationError},
    mutation::Validator,
    selection::{FieldId, FieldKind, SelectionTree},
    value::{Object, Value},
};

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Compile IR only; nothing is runnable and execution yields no value.
    pub no_execution: bool,
}

/// Execution driver: compiles selection trees and runs them.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    pub(crate) options: Options,
}

impl Engine {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn set_no_execution(&mut self, no_execution: bool) {
        self.options.no_execution = no_execution;
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    fn compiler(&self) -> Compiler {
        Compiler::new(self.options.no_execution)
    }

    pub fn compile(&self, tree: &SelectionTree) -> CompiledQuery {
        self.compiler().compile(tree)
    }

    pub fn compile_mutation(&self, tree: &SelectionTree, id: FieldId) -> Result<CompiledQuery, CompileError> {
        self.compiler().compile_mutation(tree, id)
    }

    /// Compiles the operation's query fields and runs them over `root`.
    pub fn execute(
        &self,
        tree: &SelectionTree,
        root: &Value,
        provider: &dyn CapabilityProvider,
    ) -> StageqlResult<Option<Value>> {
        Ok(self.compile(tree).execute(root, provider)?)
    }

    /// Invokes mutation field `id`, then runs its selection over the
    /// procedure's result. The value is `{ <mutation name>: <selection> }`.
    ///
    /// Errors recorded on `validator` by the procedure itself fail the call.
    pub async fn execute_mutation(
        &self,
        tree: &SelectionTree,
        id: FieldId,
        context: Option<Instance>,
        validator: Validator,
        provider: &dyn CapabilityProvider,
    ) -> StageqlResult<Option<Value>> {
        let field = tree.field(id);
        let FieldKind::Mutation(mutation) = field.kind() else {
            return Err(CompileError::NotAMutation(field.name().into()).into());
        };
        let compiled = self.compile_mutation(tree, id)?;

        let result = mutation
            .descriptor
            .invoke(
                context,
                &mutation.request,
                validator.clone(),
                Some(provider),
                mutation.variables.as_ref(),
            )
            .await?;
        validator.into_result().map_err(MutationError::Validation)?;

        let Some(result) = result else {
            debug!(mutation = %field.name(), "mutation produced no result");
            return Ok(None);
        };
        let Some(value) = compiled.execute(&result, provider)? else {
            return Ok(None);
        };

        let mut object = Object::with_capacity(1);
        object.insert(field.name(), value);
        Ok(Some(Value::Object(object)))
    }
}
